#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use bytes::{Bytes, BytesMut};
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tracing::debug;

    use crate::data::FetchOptions;
    use crate::data::fetcher::{ByteStream, Fetcher};
    use crate::effects::timings::HostTimings;
    use crate::error::{Result, TransferError, TransferErrorKind};

    fn map_error(e: reqwest::Error) -> TransferError {
        if e.is_timeout() {
            TransferError::timeout(e.to_string())
        } else if let Some(status) = e.status() {
            TransferError::http(status.as_u16(), e.to_string())
        } else {
            TransferError::network(e.to_string())
        }
    }

    fn backoff(base: Duration, retry: u32) -> Duration { base.saturating_mul(2_u32.saturating_pow(retry)) }

    /// HTTP(S) fetcher built on `reqwest`.
    ///
    /// Non-2xx responses are failures. Connection errors and 5xx responses are
    /// retried up to [`FetchOptions::max_retries`] times before the attempt is
    /// reported as failed.
    #[derive(Debug, Clone)]
    pub struct ReqwestFetcher {
        client:   reqwest::Client,
        defaults: FetchOptions,
        timings:  Option<Arc<HostTimings>>,
    }

    impl ReqwestFetcher {
        pub fn new() -> Result<Self> {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| crate::error::Error::Config(e.to_string()))?;
            Ok(Self::with_client(client))
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self {
                client,
                defaults: FetchOptions::default(),
                timings: None,
            }
        }

        #[must_use]
        pub fn defaults(mut self, defaults: FetchOptions) -> Self {
            self.defaults = defaults;
            self
        }

        /// Feed transfer outcomes into `timings`, for use as the group's speed estimator.
        #[must_use]
        pub fn timings(mut self, timings: Arc<HostTimings>) -> Self {
            self.timings = Some(timings);
            self
        }

        fn record(&self, url: &str, outcome: &Result<u64, TransferError>, started: Instant) {
            let Some(timings) = &self.timings else { return };
            match outcome {
                Ok(bytes) => timings.record_success(url, *bytes, started.elapsed()),
                Err(_) => timings.record_failure(url),
            }
        }

        async fn send(&self, url: &str, options: &FetchOptions) -> Result<reqwest::Response, TransferError> {
            let mut retry = 0;
            loop {
                let mut request = self.client.get(url);
                for (key, value) in options.headers.iter() {
                    request = request.header(key, value);
                }
                if let Some(timeout) = options.timeout {
                    request = request.timeout(timeout);
                }

                let result = request
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(map_error);
                let retryable = match &result {
                    Ok(_) => false,
                    Err(e) => match e.kind {
                        TransferErrorKind::Http(status) => status >= 500,
                        TransferErrorKind::Network | TransferErrorKind::Timeout => true,
                        _ => false,
                    },
                };
                if !retryable || retry >= options.max_retries {
                    return result;
                }

                debug!(url, retry, "transport retry");
                tokio::time::sleep(backoff(options.retry_backoff, retry)).await;
                retry += 1;
            }
        }

        async fn download(&self, url: &str, destination: &Path, options: &FetchOptions) -> Result<u64, TransferError> {
            let response = self.send(url, options).await?;
            let mut body = response.bytes_stream();
            let mut file = tokio::fs::File::create(destination).await?;
            let mut written = 0u64;

            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(map_error)?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(written)
        }
    }

    #[async_trait]
    impl Fetcher for ReqwestFetcher {
        fn options(&self) -> FetchOptions { self.defaults.clone() }

        async fn fetch_to_file(
            &self,
            url: &str,
            destination: &Path,
            options: &FetchOptions,
        ) -> Result<PathBuf, TransferError> {
            let started = Instant::now();
            let outcome = self.download(url, destination, options).await;
            self.record(url, &outcome, started);

            match outcome {
                Ok(_) => Ok(destination.to_path_buf()),
                Err(e) => {
                    if let Err(cleanup) = tokio::fs::remove_file(destination).await {
                        debug!(path = %destination.display(), error = %cleanup, "partial download not removed");
                    }
                    Err(e)
                }
            }
        }

        async fn open_stream(&self, url: &str, options: &FetchOptions) -> Result<ByteStream, TransferError> {
            let response = self.send(url, options).await;
            if let (Err(_), Some(timings)) = (&response, &self.timings) {
                timings.record_failure(url);
            }
            let stream = response?.bytes_stream().map(|chunk| chunk.map_err(map_error));
            Ok(Box::pin(stream))
        }

        async fn read_all(
            &self,
            url: &str,
            limit: Option<usize>,
            options: &FetchOptions,
        ) -> Result<Bytes, TransferError> {
            let started = Instant::now();
            let outcome = async {
                let response = self.send(url, options).await?;
                let mut body = response.bytes_stream();
                let mut buffer = BytesMut::new();
                while let Some(chunk) = body.next().await {
                    let chunk = chunk.map_err(map_error)?;
                    if limit.is_some_and(|limit| buffer.len() + chunk.len() > limit) {
                        return Err(TransferError::new(
                            TransferErrorKind::SizeLimit,
                            format!("exceeded limit ({} bytes)", limit.unwrap_or_default()),
                        ));
                    }
                    buffer.extend_from_slice(&chunk);
                }
                Ok::<Bytes, TransferError>(buffer.freeze())
            }
            .await;

            self.record(url, &outcome.as_ref().map(|b| b.len() as u64).map_err(Clone::clone), started);
            outcome
        }
    }

}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestFetcher;
