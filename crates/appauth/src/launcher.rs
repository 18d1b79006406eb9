//! External user agent contract
//!
//! The core never opens a browser itself. An [`ExternalAgent`] presents the
//! authorization (or logout) URL and resolves with the redirect that came
//! back, or with [`LaunchOutcome::Cancelled`] when the user dismissed it.
//!
//! [`CallbackAgent`] adapts hosts whose redirects arrive through a separate
//! entry point (deep-link handlers, loopback listeners): the host opens the
//! URL in its opener closure and later hands the redirect to
//! [`CallbackAgent::deliver_redirect`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::validation::matches_redirect_prefix;

/// How a launch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The agent captured a redirect starting with the redirect prefix
    Redirect(String),
    /// The user closed the agent
    Cancelled,
}

/// Presents URLs to the user and captures the redirect
#[async_trait]
pub trait ExternalAgent: Send + Sync {
    /// Open `url` and wait for a navigation that starts with `redirect_prefix`
    ///
    /// The returned future may be dropped when the flow is aborted or times
    /// out; implementations should dismiss their UI in that case.
    async fn launch(&self, url: &Url, redirect_prefix: &str) -> Result<LaunchOutcome>;
}

type Opener = Box<dyn Fn(&Url) -> Result<()> + Send + Sync>;

struct PendingLaunch {
    id: u64,
    redirect_prefix: String,
    sender: oneshot::Sender<LaunchOutcome>,
}

/// [`ExternalAgent`] fed by host callbacks
pub struct CallbackAgent {
    opener: Opener,
    pending: Mutex<Option<PendingLaunch>>,
    next_id: AtomicU64,
}

impl CallbackAgent {
    /// Create an agent that opens URLs with `opener`
    pub fn new<F>(opener: F) -> Self
    where
        F: Fn(&Url) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            opener: Box::new(opener),
            pending: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hand a redirect to the waiting launch
    ///
    /// Returns `false` when nothing is waiting or the URL is not the expected
    /// redirect URL followed by a query or fragment; such deliveries are
    /// dropped.
    pub fn deliver_redirect(&self, redirect: &str) -> bool {
        let mut pending = self.pending.lock();
        match pending.take() {
            Some(launch) if matches_redirect_prefix(redirect, &launch.redirect_prefix) => {
                debug!(launch = launch.id, "redirect delivered");
                launch.sender.send(LaunchOutcome::Redirect(redirect.to_string())).is_ok()
            }
            Some(launch) => {
                warn!(launch = launch.id, "ignoring redirect with unexpected prefix");
                *pending = Some(launch);
                false
            }
            None => {
                warn!("ignoring redirect with no authorization in progress");
                false
            }
        }
    }

    /// Report that the user dismissed the agent
    ///
    /// Returns `false` when nothing was waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(launch) => launch.sender.send(LaunchOutcome::Cancelled).is_ok(),
            None => false,
        }
    }

    /// Whether a launch is waiting for its redirect
    pub fn is_waiting(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl fmt::Debug for CallbackAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAgent")
            .field("opener", &"<fn>")
            .field("waiting", &self.is_waiting())
            .finish()
    }
}

/// Clears the pending slot if the launch future is dropped early
struct PendingGuard<'a> {
    agent: &'a CallbackAgent,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.agent.pending.lock();
        if pending.as_ref().is_some_and(|launch| launch.id == self.id) {
            *pending = None;
        }
    }
}

#[async_trait]
impl ExternalAgent for CallbackAgent {
    async fn launch(&self, url: &Url, redirect_prefix: &str) -> Result<LaunchOutcome> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        // a superseded launch sees its sender dropped and resolves as cancelled
        *self.pending.lock() = Some(PendingLaunch {
            id,
            redirect_prefix: redirect_prefix.to_string(),
            sender,
        });
        let _guard = PendingGuard { agent: self, id };

        (self.opener)(url)?;

        Ok(receiver.await.unwrap_or(LaunchOutcome::Cancelled))
    }
}
