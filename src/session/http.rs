//! HTTP + HTML session backend.
//!
//! Fetches the target with `reqwest` and parses it with `scraper`. Listing
//! pages that fill their tables asynchronously are re-fetched at the poll
//! interval until the marker shows up or the navigation timeout elapses.
//!
//! No JavaScript is executed; use the Chromium backend for pages that only
//! render client-side or paginate through click handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::Selector;
use tokio::time::Instant;
use tracing::{debug, instrument};
use url::Url;

use super::extract::has_match;
use super::{
    MarkerLocator, Navigation, PageProfile, RenderedPage, Session, SessionError, SessionFactory,
};
use crate::resolver::SlotCandidates;

/// Browser-like User-Agent; listing sites tend to reject library defaults.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Connect timeout for page fetches.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens [`HttpSession`]s, each with its own client and cookie store.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    locator: Arc<MarkerLocator>,
    navigation_timeout: Duration,
    poll_interval: Duration,
}

impl HttpSessionFactory {
    /// Creates a factory for `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Init`] if the profile's selector is invalid.
    pub fn new(profile: &PageProfile) -> Result<Self, SessionError> {
        Ok(Self {
            locator: Arc::new(MarkerLocator::new(profile)?),
            navigation_timeout: profile.navigation_timeout(),
            poll_interval: profile.poll_interval(),
        })
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self) -> Result<Box<dyn Session>, SessionError> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .cookie_store(true)
            .gzip(true)
            .build()
            .map_err(|e| SessionError::init(format!("failed to build HTTP client: {e}")))?;

        Ok(Box::new(HttpSession {
            client,
            locator: Arc::clone(&self.locator),
            navigation_timeout: self.navigation_timeout,
            poll_interval: self.poll_interval,
        }))
    }
}

/// One HTTP session. Cookies persist across the jobs it serves.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    locator: Arc<MarkerLocator>,
    navigation_timeout: Duration,
    poll_interval: Duration,
}

impl HttpSession {
    /// Fetches `url` once, returning the final URL and body.
    async fn fetch(&self, url: &Url, target: &str) -> Result<(Url, String), SessionError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SessionError::navigation(target, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::navigation(target, format!("HTTP {status}")));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::navigation(target, e.to_string()))?;
        Ok((final_url, body))
    }

    /// Re-fetches `url` until `ready` accepts the page or the navigation
    /// timeout elapses.
    async fn poll_until<T, F>(&self, url: &Url, target: &str, ready: F) -> Result<T, SessionError>
    where
        F: Fn(&str, &Url) -> Option<T> + Send + Sync,
        T: Send,
    {
        let deadline = Instant::now() + self.navigation_timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (page_url, body) = tokio::time::timeout(remaining, self.fetch(url, target))
                .await
                .map_err(|_| SessionError::timeout(target, self.navigation_timeout))??;

            if let Some(found) = ready(&body, &page_url) {
                debug!(attempt, "page ready");
                return Ok(found);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::timeout(target, self.navigation_timeout));
            }
            debug!(attempt, "page not ready yet; waiting");
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

fn parse_target(target: &str) -> Result<Url, SessionError> {
    Url::parse(target).map_err(|e| SessionError::navigation(target, format!("invalid locator: {e}")))
}

#[async_trait]
impl Session for HttpSession {
    #[instrument(skip(self), fields(backend = "http"))]
    async fn extract(&mut self, target: &str) -> Result<SlotCandidates, SessionError> {
        let url = parse_target(target)?;
        let locator = Arc::clone(&self.locator);
        self.poll_until(&url, target, |body, page_url| locator.extract(body, page_url))
            .await
    }

    #[instrument(skip(self, navigation, ready), fields(backend = "http", navigation = %navigation))]
    async fn render(
        &mut self,
        navigation: &Navigation,
        ready: &Selector,
    ) -> Result<RenderedPage, SessionError> {
        let target = match navigation {
            Navigation::Goto(target) => target.as_str(),
            Navigation::Click(_) => {
                return Err(SessionError::navigation(
                    navigation.to_string(),
                    "page controls can only be clicked by the chromium backend",
                ));
            }
        };
        let url = parse_target(target)?;
        self.poll_until(&url, target, |body, page_url| {
            has_match(body, ready).then(|| RenderedPage {
                url: page_url.clone(),
                html: body.to_string(),
            })
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        // Dropping the client closes its pooled connections.
        Ok(())
    }
}
