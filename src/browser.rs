use async_trait::async_trait;
use thiserror::Error;

/// Anything the session can do wrong is session-fatal for the scroll loop:
/// these errors are never retried in place, they tear the session down.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser session: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("element interaction failed: {0}")]
    Element(String),
}

/// Narrow capability surface over one live browser session. The scroll
/// driver is written against this trait so it can run on canned snapshots
/// in tests; the real implementation drives a local Chrome.
#[async_trait]
pub trait Browser: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    /// Full serialized page content at this moment.
    async fn page_source(&mut self) -> Result<String, BrowserError>;
    async fn scroll_to(&mut self, y: i64) -> Result<(), BrowserError>;
    async fn page_height(&mut self) -> Result<i64, BrowserError>;
    /// Click the element matching `selector` if it exists right now.
    /// Returns whether a click happened.
    async fn click_if_present(&mut self, selector: &str) -> Result<bool, BrowserError>;
}

/// Builds fresh sessions. Session recovery discards a crashed session and
/// asks the provider for a new one.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn create(&self) -> Result<Box<dyn Browser>, BrowserError>;
}

// ── Chrome implementation ──

#[cfg(feature = "browser")]
pub use chrome::ChromeProvider;

#[cfg(feature = "browser")]
mod chrome {
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::{BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::debug;

    use super::{Browser, BrowserError, BrowserProvider};

    /// Only the page-load step carries a bounded timeout; individual script
    /// and click calls complete or fail on their own.
    const NAV_TIMEOUT: Duration = Duration::from_secs(60);

    pub struct ChromeProvider;

    impl ChromeProvider {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl BrowserProvider for ChromeProvider {
        async fn create(&self) -> Result<Box<dyn Browser>, BrowserError> {
            let config = BrowserConfig::builder()
                .build()
                .map_err(BrowserError::Launch)?;

            let (browser, mut handler) = chromiumoxide::Browser::launch(config)
                .await
                .map_err(|e| BrowserError::Launch(e.to_string()))?;

            // The handler must be polled for the CDP connection to make
            // progress; it ends when the browser process goes away.
            let events: JoinHandle<()> = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::Launch(e.to_string()))?;

            debug!("launched chrome session");
            Ok(Box::new(ChromeSession {
                _browser: browser,
                page,
                events,
            }))
        }
    }

    struct ChromeSession {
        _browser: chromiumoxide::Browser,
        page: Page,
        events: JoinHandle<()>,
    }

    impl Drop for ChromeSession {
        fn drop(&mut self) {
            self.events.abort();
        }
    }

    #[async_trait]
    impl Browser for ChromeSession {
        async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            let load = async {
                self.page.goto(url).await?;
                self.page.wait_for_navigation().await?;
                Ok::<_, chromiumoxide::error::CdpError>(())
            };
            match tokio::time::timeout(NAV_TIMEOUT, load).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: format!("page load timed out after {:?}", NAV_TIMEOUT),
                }),
            }
        }

        async fn page_source(&mut self) -> Result<String, BrowserError> {
            self.page
                .content()
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))
        }

        async fn scroll_to(&mut self, y: i64) -> Result<(), BrowserError> {
            self.page
                .evaluate(format!("window.scrollTo(0, {y});"))
                .await
                .map(|_| ())
                .map_err(|e| BrowserError::Script(e.to_string()))
        }

        async fn page_height(&mut self) -> Result<i64, BrowserError> {
            self.page
                .evaluate("document.body.scrollHeight")
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?
                .into_value::<i64>()
                .map_err(|e| BrowserError::Script(e.to_string()))
        }

        async fn click_if_present(&mut self, selector: &str) -> Result<bool, BrowserError> {
            match self.page.find_element(selector).await {
                Ok(element) => element
                    .click()
                    .await
                    .map(|_| true)
                    .map_err(|e| BrowserError::Element(e.to_string())),
                // Absent element is the common case, not an error.
                Err(_) => Ok(false),
            }
        }
    }
}
