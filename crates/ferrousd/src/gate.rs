//! Confirmation gate - single-slot human approval for destructive commands
//!
//! A caller suspends in [`ConfirmationGate::request`] until a front end
//! resolves the pending request with one boolean. A second request while one
//! is pending fails with `ConfirmationBusy`; it is never queued. Every exit
//! path (approval, rejection, timeout, the waiting future being dropped)
//! empties the slot.

use ferrous_shared::{ConfirmationOutcome, ConfirmationRequest, ControlError};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Slot {
    request: ConfirmationRequest,
    responder: oneshot::Sender<bool>,
}

pub struct ConfirmationGate {
    slot: Mutex<Option<Slot>>,
    pending_tx: watch::Sender<Option<ConfirmationRequest>>,
    timeout: Option<Duration>,
}

impl ConfirmationGate {
    /// `timeout` of `None` waits for the human indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        let (pending_tx, _) = watch::channel(None);
        Self {
            slot: Mutex::new(None),
            pending_tx,
            timeout,
        }
    }

    /// Ask for approval using the gate's configured timeout.
    pub async fn request(
        &self,
        title: &str,
        message: &str,
    ) -> Result<ConfirmationOutcome, ControlError> {
        self.request_with_timeout(title, message, self.timeout).await
    }

    /// Ask for approval; an elapsed timeout resolves to `Rejected`.
    pub async fn request_with_timeout(
        &self,
        title: &str,
        message: &str,
        timeout: Option<Duration>,
    ) -> Result<ConfirmationOutcome, ControlError> {
        let (responder, decision) = oneshot::channel();
        let request = ConfirmationRequest::new(title, message);
        let id = request.id;

        {
            let mut slot = self.lock();
            if let Some(existing) = slot.as_ref() {
                warn!(
                    "Confirmation '{}' refused: '{}' is still pending",
                    title, existing.request.title
                );
                return Err(ControlError::ConfirmationBusy);
            }
            *slot = Some(Slot {
                request: request.clone(),
                responder,
            });
        }
        info!("Confirmation {} pending: {}", id, message);
        self.pending_tx.send_replace(Some(request));

        let _guard = SlotGuard { gate: self, id };

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, decision).await {
                Ok(answer) => Self::outcome_of(answer),
                Err(_) => {
                    info!("Confirmation {} timed out after {:?}", id, limit);
                    ConfirmationOutcome::Rejected
                }
            },
            None => Self::outcome_of(decision.await),
        };

        debug!("Confirmation {} resolved: {:?}", id, outcome);
        Ok(outcome)
    }

    /// Resolve whatever request is pending. Returns false if none was.
    pub fn resolve(&self, approved: bool) -> bool {
        let taken = self.lock().take();
        self.deliver(taken, approved)
    }

    /// Resolve only if `id` is still the pending request.
    pub fn resolve_request(&self, id: Uuid, approved: bool) -> bool {
        let taken = {
            let mut slot = self.lock();
            match slot.as_ref() {
                Some(current) if current.request.id == id => slot.take(),
                _ => None,
            }
        };
        self.deliver(taken, approved)
    }

    /// Reject the pending request, e.g. when its front end goes away.
    pub fn dismiss(&self) -> bool {
        self.resolve(false)
    }

    pub fn pending(&self) -> Option<ConfirmationRequest> {
        self.lock().as_ref().map(|slot| slot.request.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Front ends watch this to render (and clear) the pending prompt.
    pub fn subscribe(&self) -> watch::Receiver<Option<ConfirmationRequest>> {
        self.pending_tx.subscribe()
    }

    fn deliver(&self, taken: Option<Slot>, approved: bool) -> bool {
        let Some(slot) = taken else {
            return false;
        };
        self.pending_tx.send_replace(None);
        info!(
            "Confirmation {} {}",
            slot.request.id,
            if approved { "approved" } else { "rejected" }
        );
        // The requester may already be gone; nothing to wake then.
        let _ = slot.responder.send(approved);
        true
    }

    fn outcome_of(answer: Result<bool, oneshot::error::RecvError>) -> ConfirmationOutcome {
        match answer {
            Ok(approved) => ConfirmationOutcome::from_approval(approved),
            // Responder dropped without an answer
            Err(_) => ConfirmationOutcome::Rejected,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Slot>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Frees the slot if the waiting request is abandoned or times out.
struct SlotGuard<'a> {
    gate: &'a ConfirmationGate,
    id: Uuid,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.gate.lock();
        if slot.as_ref().is_some_and(|s| s.request.id == self.id) {
            *slot = None;
            drop(slot);
            self.gate.pending_tx.send_replace(None);
            debug!("Confirmation {} abandoned, slot cleared", self.id);
        }
    }
}
