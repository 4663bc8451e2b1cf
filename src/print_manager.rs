use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{FetchError, PrintError};
use crate::hw::{JobOutcome, Printer};
use crate::protocol::{PrintRequest, RequestMode};

/// Fetches image bytes for URL-mode print requests.
#[async_trait]
pub trait ImageFetcher: Debug + Send + Sync {
    /// Returns the body of a successful response.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or a non-2xx status.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP fetcher built on `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for ReqwestFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(request_error)?;
        debug!(bytes = body.len(), "fetched image");
        Ok(body.to_vec())
    }
}

/// Fetcher serving canned bodies, for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct FixtureFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl FixtureFetcher {
    #[must_use]
    pub fn with_body(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.bodies.insert(url.into(), body);
        self
    }
}

#[async_trait]
impl ImageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::MissingFixture {
                url: url.to_string(),
            })
    }
}

/// Turns print requests for one printer into print jobs.
#[derive(Debug)]
pub struct PrintManager {
    printer: Arc<dyn Printer>,
    fetcher: Arc<dyn ImageFetcher>,
}

impl PrintManager {
    #[must_use]
    pub fn new(printer: Arc<dyn Printer>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { printer, fetcher }
    }

    #[must_use]
    pub fn printer(&self) -> &Arc<dyn Printer> {
        &self.printer
    }

    /// Resolves the request payload to an image and prints it.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload cannot be turned into an image.
    /// Device-side failures are reported through the [`JobOutcome`].
    #[instrument(skip(self, request), fields(serial = request.serial(), mode = %request.mode()))]
    pub async fn handle(&self, request: &PrintRequest) -> Result<JobOutcome, PrintError> {
        let bytes = match request.mode() {
            RequestMode::Png => request.payload().to_vec(),
            RequestMode::Url => {
                let url = String::from_utf8(request.payload().to_vec())
                    .map_err(PrintError::InvalidUrl)?;
                self.fetcher
                    .fetch(url.trim())
                    .await
                    .map_err(PrintError::FetchFailed)?
            }
        };
        let image = image::load_from_memory(&bytes).map_err(PrintError::InvalidImage)?;

        Ok(self.printer.print_image(image, request.red()).await)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use image::{DynamicImage, ImageFormat};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::MockPrinter;

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::new_luma8(32, 32)
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("png should encode");
        bytes.into_inner()
    }

    fn manager(fetcher: FixtureFetcher) -> PrintManager {
        let printer = Arc::new(MockPrinter::new("A1", "mock://a", Duration::ZERO));
        PrintManager::new(printer, Arc::new(fetcher))
    }

    #[tokio::test]
    async fn png_request_prints() {
        let request = PrintRequest::new("A1", RequestMode::Png, png_bytes());
        let outcome = manager(FixtureFetcher::default()).handle(&request).await;
        assert_matches!(outcome, Ok(JobOutcome::Success));
    }

    #[tokio::test]
    async fn garbage_png_is_invalid_image() {
        let request = PrintRequest::new("A1", RequestMode::Png, b"not a png".to_vec());
        let outcome = manager(FixtureFetcher::default()).handle(&request).await;
        assert_matches!(outcome, Err(PrintError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn url_request_fetches_then_prints() {
        let fetcher = FixtureFetcher::default().with_body("http://labels/a.png", png_bytes());
        let request = PrintRequest::new("A1", RequestMode::Url, b"http://labels/a.png".to_vec());
        let outcome = manager(fetcher).handle(&request).await;
        assert_matches!(outcome, Ok(JobOutcome::Success));
    }

    #[tokio::test]
    async fn non_utf8_url_is_rejected() {
        let request = PrintRequest::new("A1", RequestMode::Url, vec![0xFF, 0xFE]);
        let outcome = manager(FixtureFetcher::default()).handle(&request).await;
        assert_matches!(outcome, Err(PrintError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn missing_url_is_fetch_failure() {
        let request = PrintRequest::new("A1", RequestMode::Url, b"http://labels/none".to_vec());
        let outcome = manager(FixtureFetcher::default()).handle(&request).await;
        assert_matches!(
            outcome,
            Err(PrintError::FetchFailed(FetchError::MissingFixture { url })) if url == "http://labels/none"
        );
    }

    #[tokio::test]
    async fn fetched_non_image_is_invalid_image() {
        let fetcher = FixtureFetcher::default().with_body("http://labels/a.txt", b"hi".to_vec());
        let request = PrintRequest::new("A1", RequestMode::Url, b"http://labels/a.txt".to_vec());
        let outcome = manager(fetcher).handle(&request).await;
        assert_matches!(outcome, Err(PrintError::InvalidImage(_)));
        assert_eq!(RequestMode::Url, request.mode());
    }
}
