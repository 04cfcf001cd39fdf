//! Fetch pages through a replaceable automation session.
//!
//! The session handle is owned by the caller and moved through
//! [`SessionManager::fetch`]: it comes back alongside the result, and it may
//! be a different session than the one passed in if recovery replaced it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::browser::{Launcher, Session, SessionError};
use super::cache::PageCache;
use crate::config::ScraperConfig;
use crate::error::{Error, Result};

/// Markup of a page after client-side rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    url: String,
    html: Arc<str>,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<Arc<str>>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

/// Bounded-retry page fetcher with session replacement on failure.
pub struct SessionManager<L: Launcher> {
    launcher: L,
    settle: Duration,
    cooldown: Duration,
    attempts: u32,
    cache: PageCache,
}

impl<L: Launcher> SessionManager<L> {
    pub fn new(launcher: L, config: &ScraperConfig) -> Self {
        Self {
            launcher,
            settle: config.settle(),
            cooldown: config.cooldown(),
            attempts: config.retry_count.max(1),
            cache: PageCache::new(config.cache_size),
        }
    }

    /// Start the first session.
    pub async fn launch(&self) -> Result<L::Session> {
        self.launcher.launch().await.map_err(|e| Error::Fetch {
            url: "about:blank".to_string(),
            attempts: 1,
            reason: format!("failed to launch browser: {}", e),
        })
    }

    /// Fetch `url`, settling after navigation. On failure, cool down and
    /// replace the session before the next attempt.
    pub async fn fetch(&mut self, mut session: L::Session, url: &str) -> (L::Session, Result<RenderedPage>) {
        if let Some(page) = self.cache.get(url) {
            debug!(url, "page cache hit");
            return (session, Ok(page));
        }

        let mut reason = String::new();
        for attempt in 1..=self.attempts {
            match self.load(&mut session, url).await {
                Ok(html) => {
                    let page = RenderedPage::new(url, html);
                    self.cache.insert(page.clone());
                    return (session, Ok(page));
                }
                Err(e) => {
                    warn!(
                        url,
                        attempt,
                        session = session.id(),
                        error = %e,
                        "fetch failed, replacing session in {:?}",
                        self.cooldown
                    );
                    reason = e.to_string();
                    sleep(self.cooldown).await;
                    session = self.replace(session).await;
                }
            }
        }

        let error = Error::Fetch {
            url: url.to_string(),
            attempts: self.attempts,
            reason,
        };
        (session, Err(error))
    }

    /// Drop every cached page.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    async fn load(&self, session: &mut L::Session, url: &str) -> std::result::Result<String, SessionError> {
        session.navigate(url).await?;
        sleep(self.settle).await;
        session.page_source().await
    }

    async fn replace(&self, mut old: L::Session) -> L::Session {
        match self.launcher.launch().await {
            Ok(fresh) => {
                info!(old = old.id(), new = fresh.id(), "session replaced");
                old.close().await;
                fresh
            }
            Err(e) => {
                warn!(session = old.id(), error = %e, "failed to launch replacement session, keeping the old one");
                old
            }
        }
    }
}
