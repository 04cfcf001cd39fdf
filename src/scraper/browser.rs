//! Browser automation using chromiumoxide.
//!
//! [`Session`] is one live automation session; [`Launcher`] creates fresh
//! ones so the session manager can replace a stuck or crashed browser.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use thiserror::Error;
use tracing::debug;

/// Failure inside a single automation session.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SessionError(pub String);

impl From<chromiumoxide::error::CdpError> for SessionError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        SessionError(e.to_string())
    }
}

/// A live automation session that navigates to a URL and exposes the
/// rendered markup.
#[async_trait]
pub trait Session: Send {
    /// Identity of this session; a replacement always has a new id.
    fn id(&self) -> u64;

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    async fn page_source(&mut self) -> Result<String, SessionError>;

    async fn close(&mut self);
}

/// Creates fresh sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Session: Session;

    async fn launch(&self) -> Result<Self::Session, SessionError>;
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Launches headless Chrome instances.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }

    fn executable(&self) -> PathBuf {
        if let Some(path) = &self.chrome_path {
            return path.clone();
        }
        let default = if cfg!(target_os = "macos") {
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
        } else if cfg!(target_os = "windows") {
            "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
        } else {
            "google-chrome"
        };
        PathBuf::from(default)
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession, SessionError> {
        let config = BrowserConfig::builder()
            .chrome_executable(self.executable())
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--mute-audio")
            .window_size(1920, 1080)
            .build()
            .map_err(|e| SessionError(format!("failed to build browser config: {}", e)))?;

        let (browser, mut handler) = ChromeBrowser::launch(config).await?;

        // Handler task must keep running for the browser to work
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    continue;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        let id = next_session_id();
        debug!(session = id, "browser launched");

        Ok(ChromeSession {
            id,
            browser,
            page,
            handle,
        })
    }
}

/// One headless Chrome instance with a single reused tab.
pub struct ChromeSession {
    id: u64,
    browser: ChromeBrowser,
    page: Page,
    handle: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl Session for ChromeSession {
    fn id(&self) -> u64 {
        self.id
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        Ok(self.page.content().await?)
    }

    async fn close(&mut self) {
        let _ = self.browser.close().await;
        self.handle.abort();
        debug!(session = self.id, "browser closed");
    }
}
