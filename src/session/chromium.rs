//! Headless Chromium session backend (cargo feature `chromium`).
//!
//! Every session launches its own browser process with one page, mirroring
//! the one-browser-per-worker layout: CDP pages are not safe to drive from
//! several workers at once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use scraper::Selector;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use super::extract::has_match;
use super::{
    MarkerLocator, Navigation, PageProfile, RenderedPage, Session, SessionError, SessionFactory,
};
use crate::resolver::SlotCandidates;

/// Opens [`ChromiumSession`]s.
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    locator: Arc<MarkerLocator>,
    navigation_timeout: Duration,
    poll_interval: Duration,
    headless: bool,
}

impl ChromiumSessionFactory {
    /// Creates a factory for `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Init`] if the profile's selector is invalid.
    pub fn new(profile: &PageProfile, headless: bool) -> Result<Self, SessionError> {
        Ok(Self {
            locator: Arc::new(MarkerLocator::new(profile)?),
            navigation_timeout: profile.navigation_timeout(),
            poll_interval: profile.poll_interval(),
            headless,
        })
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn open(&self) -> Result<Box<dyn Session>, SessionError> {
        let mut builder = BrowserConfig::builder();
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SessionError::init)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::init(format!("failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the browser connection to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(SessionError::init(format!("failed to open page: {e}")));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page: Some(page),
            handler_task,
            locator: Arc::clone(&self.locator),
            navigation_timeout: self.navigation_timeout,
            poll_interval: self.poll_interval,
        }))
    }
}

/// One browser process plus the page it drives.
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    locator: Arc<MarkerLocator>,
    navigation_timeout: Duration,
    poll_interval: Duration,
}

#[async_trait]
impl Session for ChromiumSession {
    #[instrument(skip(self), fields(backend = "chromium"))]
    async fn extract(&mut self, target: &str) -> Result<SlotCandidates, SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::Closed)?;
        let base = Url::parse(target)
            .map_err(|e| SessionError::navigation(target, format!("invalid locator: {e}")))?;
        let deadline = Instant::now() + self.navigation_timeout;

        tokio::time::timeout(self.navigation_timeout, page.goto(target))
            .await
            .map_err(|_| SessionError::timeout(target, self.navigation_timeout))?
            .map_err(|e| SessionError::navigation(target, e.to_string()))?;

        loop {
            let html = page
                .content()
                .await
                .map_err(|e| SessionError::extraction(target, e.to_string()))?;

            if let Some(slots) = self.locator.extract(&html, &base) {
                return Ok(slots);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::timeout(target, self.navigation_timeout));
            }
            debug!("marker not rendered yet; waiting");
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    #[instrument(skip(self, navigation, ready), fields(backend = "chromium", navigation = %navigation))]
    async fn render(
        &mut self,
        navigation: &Navigation,
        ready: &Selector,
    ) -> Result<RenderedPage, SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::Closed)?;
        let target = navigation.to_string();

        // After a click the table re-renders in place; wait for new content.
        let previous = match navigation {
            Navigation::Goto(url) => {
                tokio::time::timeout(self.navigation_timeout, page.goto(url.as_str()))
                    .await
                    .map_err(|_| SessionError::timeout(&target, self.navigation_timeout))?
                    .map_err(|e| SessionError::navigation(&target, e.to_string()))?;
                None
            }
            Navigation::Click(selector) => {
                let before = page
                    .content()
                    .await
                    .map_err(|e| SessionError::extraction(&target, e.to_string()))?;
                page.find_element(selector.as_str())
                    .await
                    .map_err(|e| SessionError::navigation(&target, e.to_string()))?
                    .click()
                    .await
                    .map_err(|e| SessionError::navigation(&target, e.to_string()))?;
                Some(before)
            }
        };

        let deadline = Instant::now() + self.navigation_timeout;
        loop {
            let html = page
                .content()
                .await
                .map_err(|e| SessionError::extraction(&target, e.to_string()))?;

            let changed = previous.as_ref().is_none_or(|before| *before != html);
            if changed && has_match(&html, ready) {
                let url = page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .and_then(|url| Url::parse(&url).ok())
                    .ok_or_else(|| SessionError::extraction(&target, "page has no URL"))?;
                return Ok(RenderedPage { url, html });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::timeout(&target, self.navigation_timeout));
            }
            debug!("page not rendered yet; waiting");
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        let mut this = self;
        if let Some(page) = this.page.take()
            && let Err(e) = page.close().await
        {
            warn!(error = %e, "failed to close page");
        }

        let result = match this.browser.close().await {
            Ok(_) => {
                if let Err(e) = this.browser.wait().await {
                    warn!(error = %e, "browser process did not exit cleanly");
                }
                Ok(())
            }
            Err(e) => Err(SessionError::Shutdown {
                reason: format!("failed to close browser: {e}"),
            }),
        };

        this.handler_task.abort();
        result
    }
}
