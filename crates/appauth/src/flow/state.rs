//! Per-attempt flow state and the single-flight slot

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfiguration;
use crate::error::{AppAuthError, Result};
use crate::pkce::{PkceContext, new_nonce, new_state};
use crate::types::AuthorizationResult;

/// Where the orchestrator is in the authorization-code flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowPhase {
    /// Nothing outstanding
    Idle,
    /// The external agent is showing the provider
    AwaitingRedirect,
    /// The code is being exchanged for tokens
    ExchangingCode,
    /// The last attempt succeeded
    Completed,
    /// The last attempt failed
    Failed,
}

impl FlowPhase {
    /// Whether an attempt is outstanding
    pub fn is_active(self) -> bool {
        matches!(self, Self::AwaitingRedirect | Self::ExchangingCode)
    }
}

/// Secrets bound to one authorization attempt
///
/// Created when the authorization URL is built and dropped when the attempt
/// ends, however it ends.
#[derive(Clone)]
pub struct FlowState {
    /// CSRF state sent with the request
    pub state: String,
    /// OpenID nonce, when enabled
    pub nonce: Option<String>,
    /// PKCE material, when enabled
    pub pkce: Option<PkceContext>,
    /// When the attempt started
    pub requested_at: DateTime<Utc>,
}

impl FlowState {
    /// Fresh state, plus PKCE and nonce when enabled
    pub fn new(use_pkce: bool, use_nonce: bool) -> Self {
        Self {
            state: new_state(),
            nonce: use_nonce.then(new_nonce),
            pkce: use_pkce.then(PkceContext::generate),
            requested_at: Utc::now(),
        }
    }
}

impl fmt::Debug for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowState")
            .field("state", &self.state)
            .field("nonce", &self.nonce.as_ref().map(|_| "[REDACTED]"))
            .field("pkce", &self.pkce)
            .field("requested_at", &self.requested_at)
            .finish()
    }
}

/// What `only_token_exchange` needs from a preceding `only_authorize`
///
/// The configuration is kept without its client secret.
#[derive(Clone)]
pub(crate) struct PendingExchange {
    pub(crate) config: ClientConfiguration,
    pub(crate) authorization: AuthorizationResult,
}

#[derive(Default)]
struct SlotInner {
    phase: Option<FlowPhase>,
    attempt: Option<u64>,
    next_attempt: u64,
    cancel: Option<CancellationToken>,
    pending: Option<PendingExchange>,
}

/// Holds the one outstanding attempt of an orchestrator
#[derive(Default)]
pub(crate) struct FlowSlot {
    inner: Mutex<SlotInner>,
}

impl FlowSlot {
    pub(crate) fn phase(&self) -> FlowPhase {
        self.inner.lock().phase.unwrap_or(FlowPhase::Idle)
    }

    /// Claim the slot for a new attempt starting in `phase`
    pub(crate) fn begin(&self, phase: FlowPhase) -> Result<Attempt<'_>> {
        let mut inner = self.inner.lock();
        if inner.attempt.is_some() {
            return Err(AppAuthError::FlowInProgress);
        }

        inner.next_attempt += 1;
        let id = inner.next_attempt;
        let cancel = CancellationToken::new();
        inner.attempt = Some(id);
        inner.cancel = Some(cancel.clone());
        inner.phase = Some(phase);
        debug!(attempt = id, ?phase, "flow attempt started");

        Ok(Attempt {
            slot: self,
            id,
            cancel,
            finished: false,
        })
    }

    /// Cancel the outstanding attempt, if any
    pub(crate) fn abort(&self) -> bool {
        match &self.inner.lock().cancel {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn store_pending(&self, pending: PendingExchange) {
        self.inner.lock().pending = Some(pending);
    }

    pub(crate) fn take_pending(&self) -> Option<PendingExchange> {
        self.inner.lock().pending.take()
    }

    fn release(&self, id: u64, phase: FlowPhase) {
        let mut inner = self.inner.lock();
        if inner.attempt == Some(id) {
            inner.attempt = None;
            inner.cancel = None;
            inner.phase = Some(phase);
            debug!(attempt = id, ?phase, "flow attempt ended");
        }
    }
}

/// Exclusive claim on a [`FlowSlot`]
///
/// Dropping an unfinished attempt returns the slot to `Idle`.
pub(crate) struct Attempt<'a> {
    slot: &'a FlowSlot,
    id: u64,
    cancel: CancellationToken,
    finished: bool,
}

impl Attempt<'_> {
    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn advance(&self, phase: FlowPhase) {
        let mut inner = self.slot.inner.lock();
        if inner.attempt == Some(self.id) {
            debug!(attempt = self.id, ?phase, "flow phase changed");
            inner.phase = Some(phase);
        }
    }

    /// End the attempt, recording the phase its outcome implies
    pub(crate) fn finish<T>(mut self, outcome: &Result<T>) {
        let phase = match outcome {
            Ok(_) => FlowPhase::Completed,
            Err(AppAuthError::UserCancelled) => FlowPhase::Idle,
            Err(_) => FlowPhase::Failed,
        };
        self.finished = true;
        self.slot.release(self.id, phase);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.slot.release(self.id, FlowPhase::Idle);
        }
    }
}
