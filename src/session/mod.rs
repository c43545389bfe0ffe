//! Extraction sessions: "given a page, what candidates are on it".
//!
//! A [`SessionFactory`] opens one long-lived [`Session`] per worker. Sessions
//! are not shared: a rendering context is not safe for concurrent use.
//!
//! # Backends
//!
//! - [`HttpSessionFactory`] - plain HTTP fetch + HTML parsing; re-fetches
//!   until the marker appears or the navigation timeout elapses
//! - `ChromiumSessionFactory` - headless Chromium via CDP, for pages that
//!   only render their tables with JavaScript (cargo feature `chromium`)
//!
//! Both backends hand the page HTML to [`MarkerLocator`], so the slot rules
//! are identical regardless of how the page was rendered.
//!
//! Sessions also serve whole pages through [`Session::render`], which the
//! listing crawl uses to walk paginated tables. Only the Chromium backend can
//! follow a [`Navigation::Click`].
//!
//! # Release discipline
//!
//! Sessions hold external resources (browser processes, connection pools).
//! Wrap them in a [`SessionGuard`]: call [`SessionGuard::close`] on the
//! normal path; if the guard is dropped without it (early return, panic
//! unwinding) a best-effort close is spawned on the runtime.

#[cfg(feature = "chromium")]
mod chromium;
mod error;
mod extract;
mod http;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumSessionFactory;
pub use error::SessionError;
pub use extract::MarkerLocator;
pub use http::{BROWSER_USER_AGENT, HttpSessionFactory};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use scraper::Selector;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::resolver::SlotCandidates;

/// Default marker selector (the table cell naming the document kind).
pub const DEFAULT_MARKER_SELECTOR: &str = "td";

/// Default marker text.
pub const DEFAULT_MARKER_TEXT: &str = "招股说明书";

/// Default bound on waiting for the marker, in seconds.
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// Default interval between marker checks, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How to find the slots on a listing page and how long to wait for them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageProfile {
    /// CSS selector of the marker element.
    pub marker_selector: String,
    /// Text the marker element must contain; `None` matches on selector only.
    pub marker_text: Option<String>,
    /// Upper bound on waiting for the marker after navigation.
    pub navigation_timeout_secs: u64,
    /// Interval between marker checks while waiting.
    pub poll_interval_ms: u64,
}

impl PageProfile {
    /// Returns the navigation timeout.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Returns the marker poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            marker_selector: DEFAULT_MARKER_SELECTOR.to_string(),
            marker_text: Some(DEFAULT_MARKER_TEXT.to_string()),
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// How a session reaches the page to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Load this absolute URL.
    Goto(String),
    /// Click the first element matching this CSS selector on the current page.
    Click(String),
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goto(url) => f.write_str(url),
            Self::Click(selector) => write!(f, "click '{selector}'"),
        }
    }
}

/// A rendered page and the URL it was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Final URL, after redirects; relative links resolve against it.
    pub url: Url,
    /// Page HTML.
    pub html: String,
}

/// One rendering context, used by exactly one worker.
#[async_trait]
pub trait Session: Send {
    /// Navigates to `target`, waits for the marker and returns the per-slot
    /// candidates. A slot without links is an empty set, never an error.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NavigationTimeout`] if the marker did not appear in time
    /// - [`SessionError::Navigation`] / [`SessionError::Extraction`] on other failures
    async fn extract(&mut self, target: &str) -> Result<SlotCandidates, SessionError>;

    /// Performs `navigation`, waits until `ready` matches and returns the page.
    ///
    /// Backends that cannot serve whole pages keep this default, which
    /// rejects every request.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NavigationTimeout`] if `ready` did not match in time
    /// - [`SessionError::Navigation`] if the backend cannot perform `navigation`
    async fn render(
        &mut self,
        navigation: &Navigation,
        ready: &Selector,
    ) -> Result<RenderedPage, SessionError> {
        let _ = ready;
        Err(SessionError::navigation(
            navigation.to_string(),
            "this backend cannot render listing pages",
        ))
    }

    /// Releases the session's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to shut down cleanly. The
    /// session is released either way.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Opens sessions. Shared by all workers.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Opens a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Init`] if the rendering engine cannot start.
    async fn open(&self) -> Result<Box<dyn Session>, SessionError>;
}

/// Scoped owner of a [`Session`] that guarantees release.
pub struct SessionGuard {
    session: Option<Box<dyn Session>>,
    runtime: tokio::runtime::Handle,
}

impl SessionGuard {
    /// Opens a session from `factory` and wraps it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates the factory's [`SessionError::Init`].
    pub async fn open(factory: &dyn SessionFactory) -> Result<Self, SessionError> {
        let session = factory.open().await?;
        debug!(backend = factory.name(), "session opened");
        Ok(Self {
            session: Some(session),
            runtime: tokio::runtime::Handle::current(),
        })
    }

    /// Extracts candidates through the wrapped session.
    ///
    /// # Errors
    ///
    /// See [`Session::extract`]; [`SessionError::Closed`] after `close`.
    pub async fn extract(&mut self, target: &str) -> Result<SlotCandidates, SessionError> {
        match self.session.as_mut() {
            Some(session) => session.extract(target).await,
            None => Err(SessionError::Closed),
        }
    }

    /// Renders a page through the wrapped session.
    ///
    /// # Errors
    ///
    /// See [`Session::render`]; [`SessionError::Closed`] after `close`.
    pub async fn render(
        &mut self,
        navigation: &Navigation,
        ready: &Selector,
    ) -> Result<RenderedPage, SessionError> {
        match self.session.as_mut() {
            Some(session) => session.render(navigation, ready).await,
            None => Err(SessionError::Closed),
        }
    }

    /// Closes the session, consuming the guard.
    ///
    /// # Errors
    ///
    /// See [`Session::close`].
    pub async fn close(mut self) -> Result<(), SessionError> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("session dropped without close; releasing in background");
            self.runtime.spawn(async move {
                if let Err(e) = session.close().await {
                    warn!(error = %e, "background session close failed");
                }
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Session for CountingSession {
        async fn extract(&mut self, _target: &str) -> Result<SlotCandidates, SessionError> {
            Ok(Default::default())
        }

        async fn close(self: Box<Self>) -> Result<(), SessionError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingFactory {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn open(&self) -> Result<Box<dyn Session>, SessionError> {
            Ok(Box::new(CountingSession {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[tokio::test]
    async fn test_guard_close_releases_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            closed: Arc::clone(&closed),
        };

        let mut guard = SessionGuard::open(&factory).await.unwrap();
        guard.extract("http://x").await.unwrap();
        guard.close().await.unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_drop_releases_in_background() {
        let closed = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            closed: Arc::clone(&closed),
        };

        {
            let _guard = SessionGuard::open(&factory).await.unwrap();
        }

        for _ in 0..50 {
            if closed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_defaults_to_unsupported() {
        let factory = CountingFactory {
            closed: Arc::new(AtomicUsize::new(0)),
        };
        let mut guard = SessionGuard::open(&factory).await.unwrap();
        let ready = Selector::parse("tr").unwrap();

        let result = guard
            .render(&Navigation::Goto("http://x/list".to_string()), &ready)
            .await;
        guard.close().await.unwrap();

        assert!(matches!(result, Err(SessionError::Navigation { .. })));
    }

    #[test]
    fn test_navigation_display() {
        assert_eq!(Navigation::Goto("http://x/p2".to_string()).to_string(), "http://x/p2");
        assert_eq!(
            Navigation::Click("li.next".to_string()).to_string(),
            "click 'li.next'"
        );
    }

    #[test]
    fn test_page_profile_defaults() {
        let profile = PageProfile::default();
        assert_eq!(profile.marker_selector, "td");
        assert_eq!(profile.marker_text.as_deref(), Some("招股说明书"));
        assert_eq!(profile.navigation_timeout(), Duration::from_secs(30));
        assert_eq!(profile.poll_interval(), Duration::from_millis(500));
    }
}
