#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use pulith_mirror::{ByteStream, FetchOptions, Fetcher, TransferError, TransferErrorKind};

/// Fetcher that fails for every URL under one of its failing bases and serves the
/// URL itself as the body otherwise.
#[derive(Debug, Default)]
pub struct MockFetcher {
    failing: Mutex<HashSet<String>>,
    calls:   Mutex<Vec<(String, FetchOptions)>>,
    status:  Option<u16>,
    default: FetchOptions,
}

impl MockFetcher {
    pub fn new() -> Self { Self::default() }

    pub fn failing(bases: &[&str]) -> Self {
        let fetcher = Self::new();
        for base in bases {
            fetcher.fail(base);
        }
        fetcher
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_defaults(mut self, defaults: FetchOptions) -> Self {
        self.default = defaults;
        self
    }

    pub fn fail(&self, base: &str) { self.failing.lock().unwrap().insert(base.to_string()); }

    pub fn heal(&self, base: &str) { self.failing.lock().unwrap().remove(base); }

    pub fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect() }

    pub fn options_of_call(&self, index: usize) -> FetchOptions { self.calls.lock().unwrap()[index].1.clone() }

    fn attempt(&self, url: &str, options: &FetchOptions) -> Result<(), TransferError> {
        self.calls.lock().unwrap().push((url.to_string(), options.clone()));
        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|base| url.starts_with(base.as_str())) {
            let kind = match self.status {
                Some(status) => TransferErrorKind::Http(status),
                None => TransferErrorKind::Network,
            };
            return Err(TransferError::new(kind, format!("cannot reach {url}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn options(&self) -> FetchOptions { self.default.clone() }

    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        options: &FetchOptions,
    ) -> Result<PathBuf, TransferError> {
        self.attempt(url, options)?;
        tokio::fs::write(destination, url.as_bytes()).await?;
        Ok(destination.to_path_buf())
    }

    async fn open_stream(&self, url: &str, options: &FetchOptions) -> Result<ByteStream, TransferError> {
        self.attempt(url, options)?;
        let body = Bytes::from(url.to_string());
        Ok(Box::pin(futures_util::stream::once(async move { Ok(body) })))
    }

    async fn read_all(
        &self,
        url: &str,
        limit: Option<usize>,
        options: &FetchOptions,
    ) -> Result<Bytes, TransferError> {
        self.attempt(url, options)?;
        if limit.is_some_and(|limit| url.len() > limit) {
            return Err(TransferError::new(TransferErrorKind::SizeLimit, "exceeded limit"));
        }
        Ok(Bytes::from(url.to_string()))
    }
}
