use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::data::options::FetchOptions;
use crate::error::TransferError;

/// A boxed stream type for response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Body of an opened transfer.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Transfer backend used for every mirror attempt.
///
/// The mirror group never looks inside a transfer: implementations own
/// connection handling, protocol details, timeouts and any transport-level
/// retries, and report the final outcome of one attempt as a [`TransferError`].
///
/// # Implementations
///
/// - [`ReqwestFetcher`](crate::ReqwestFetcher): HTTP(S) using `reqwest`
/// - Mock implementations for testing
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Default options, layered under per-mirror and per-call overrides.
    fn options(&self) -> FetchOptions { FetchOptions::default() }

    /// Download `url` into `destination` and return the written path.
    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        options: &FetchOptions,
    ) -> Result<PathBuf, TransferError>;

    /// Open `url` and hand back its body as a stream.
    ///
    /// Only failures before the stream is returned count as a failed attempt.
    async fn open_stream(&self, url: &str, options: &FetchOptions) -> Result<ByteStream, TransferError>;

    /// Read the whole body of `url`, failing once it grows past `limit` bytes.
    async fn read_all(
        &self,
        url: &str,
        limit: Option<usize>,
        options: &FetchOptions,
    ) -> Result<Bytes, TransferError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::descriptor::MirrorDescriptor;
    use crate::error::TransferErrorKind;

    struct Refusing;

    #[async_trait]
    impl Fetcher for Refusing {
        async fn fetch_to_file(&self, url: &str, _: &Path, _: &FetchOptions) -> Result<PathBuf, TransferError> {
            Err(TransferError::network(format!("refused {url}")))
        }

        async fn open_stream(&self, url: &str, _: &FetchOptions) -> Result<ByteStream, TransferError> {
            Err(TransferError::network(format!("refused {url}")))
        }

        async fn read_all(&self, url: &str, _: Option<usize>, _: &FetchOptions) -> Result<Bytes, TransferError> {
            Err(TransferError::new(TransferErrorKind::Other, format!("refused {url}")))
        }
    }

    #[test]
    fn test_default_options() {
        assert_eq!(Refusing.options(), FetchOptions::default());
    }

    #[test]
    fn test_descriptor_fetcher_identity() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(Refusing);
        let a = MirrorDescriptor::new("http://a/").fetcher(Arc::clone(&fetcher));
        let b = MirrorDescriptor::new("http://a/").fetcher(fetcher);
        let c = MirrorDescriptor::new("http://a/").fetcher(Arc::new(Refusing));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, MirrorDescriptor::new("http://a/"));
    }
}
