// Decides how the arbitration winner gets resolved: automatically, or through
// the single approval surface.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::arbiter::{select_latest, SelectedRequest};
use crate::comm::{Announcement, CommChannel};
use crate::error::CoreError;
use crate::models::{PendingRequest, RequestKey, RequestKind, TransactionRequest};
use crate::queue::SharedQueue;

/// `customPrefix` the wallet puts on messages it asks itself to sign.
pub const INTERNAL_MESSAGE_PREFIX: &str = "framewallet-internal:";
/// Domain whose pages (and subdomains) may issue internal messages.
pub const TRUSTED_DOMAIN: &str = "framewallet.app";

/// Signing and execution layer. Owns the real keys and the records behind
/// every pending request.
#[async_trait(?Send)]
pub trait ExecutionController {
    async fn sign_message(&self, id: u64) -> Result<(), CoreError>;
    async fn sign_personal_message(&self, id: u64) -> Result<(), CoreError>;
    async fn sign_typed_message(&self, id: u64) -> Result<(), CoreError>;
    /// Persist an edited transaction record without approving it.
    async fn update_transaction(&self, tx: &TransactionRequest) -> Result<(), CoreError>;
    async fn approve_transaction(&self, tx: &TransactionRequest) -> Result<(), CoreError>;
    async fn cancel(&self, key: RequestKey) -> Result<(), CoreError>;
}

/// The UI that shows one request and later calls back with the user's
/// decision via [`ConfirmationCoordinator::approve`] or
/// [`ConfirmationCoordinator::deny`].
pub trait ApprovalSurface {
    fn open(&self, descriptor: &ConfirmationDescriptor) -> Result<(), CoreError>;
}

/// Ambient context the UI supplies when presenting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserContext {
    pub selected_address: Option<String>,
    pub balance: Option<String>,
    pub currency: Option<String>,
    pub locale: Option<String>,
    pub theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationDescriptor {
    pub request: SelectedRequest,
    pub context: UserContext,
}

impl ConfirmationDescriptor {
    pub fn key(&self) -> RequestKey {
        self.request.key()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalParams {
    /// Replacement gas price for a transaction, `0x`-hex.
    pub gas_price: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    /// Resolved without asking the user.
    AutoResolved(RequestKey),
    /// Handed to the approval surface; awaiting approve/deny.
    Surfaced(RequestKey),
}

#[derive(Default)]
struct CoordinatorState {
    open_surface: Option<RequestKey>,
    in_flight: HashSet<RequestKey>,
}

pub struct ConfirmationCoordinator<C, S> {
    queue: SharedQueue,
    controller: C,
    surface: S,
    /// Running in a frame embedded by some other page.
    embedded: bool,
    comm: Option<CommChannel>,
    state: Mutex<CoordinatorState>,
}

impl<C: ExecutionController, S: ApprovalSurface> ConfirmationCoordinator<C, S> {
    pub fn new(queue: SharedQueue, controller: C, surface: S, embedded: bool) -> Self {
        Self {
            queue,
            controller,
            surface,
            embedded,
            comm: None,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    /// Announce transaction completion and denial on the comm channel.
    pub fn with_comm(mut self, comm: CommChannel) -> Self {
        self.comm = Some(comm);
        self
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    fn state(&self) -> Result<MutexGuard<'_, CoordinatorState>, CoreError> {
        self.state.lock().map_err(|_| CoreError::Poisoned("coordinator state"))
    }

    fn pending(&self, key: &RequestKey) -> Result<Option<PendingRequest>, CoreError> {
        let queue = self.queue.lock().map_err(|_| CoreError::Poisoned("request queue"))?;
        Ok(queue.get(key).cloned())
    }

    /// Key of the request currently shown on the approval surface.
    pub fn pending_surface(&self) -> Option<RequestKey> {
        self.state().ok().and_then(|state| state.open_surface)
    }

    /// Show (or auto-resolve) the request arbitration picks next.
    pub async fn present_next(&self, context: UserContext) -> Result<Presentation, CoreError> {
        let selected = {
            let queue = self.queue.lock().map_err(|_| CoreError::Poisoned("request queue"))?;
            select_latest(&queue)
        }
        .ok_or_else(|| CoreError::Precondition("no pending request to present".into()))?;
        let key = selected.key();

        if !self.embedded || is_self_signed(&selected) {
            info!("Auto-resolving {}", key);
            self.approve(key, ApprovalParams::default()).await?;
            return Ok(Presentation::AutoResolved(key));
        }

        {
            let mut state = self.state()?;
            if let Some(open) = state.open_surface {
                if self.pending(&open)?.is_some() {
                    return Err(CoreError::Precondition(format!(
                        "approval surface already open for {}",
                        open
                    )));
                }
                debug!("Open surface for {} went stale; replacing it", open);
            }
            state.open_surface = Some(key);
        }

        let descriptor = ConfirmationDescriptor {
            request: selected,
            context,
        };
        if let Err(e) = self.surface.open(&descriptor) {
            self.close_surface(&key);
            return Err(e);
        }
        debug!("Approval surface opened for {}", key);
        Ok(Presentation::Surfaced(key))
    }

    /// Resolve `key` positively. Fails without touching the controller when
    /// the request is no longer pending or is already being resolved.
    pub async fn approve(&self, key: RequestKey, params: ApprovalParams) -> Result<(), CoreError> {
        let request = self.begin(key)?;
        let result = self.dispatch_approval(&request, params).await;
        self.finish(key, result.as_ref().map(|a| a.as_ref()).map_err(|_| ()))?;
        result.map(|_| ())
    }

    pub async fn deny(&self, key: RequestKey) -> Result<(), CoreError> {
        self.begin(key)?;
        let result = self.controller.cancel(key).await;
        let announcement = match (&result, key.kind) {
            (Ok(()), RequestKind::Transaction) => Some(Announcement::DenyTransaction { id: key.id }),
            _ => None,
        };
        self.finish(key, result.as_ref().map(|_| announcement.as_ref()).map_err(|_| ()))?;
        result
    }

    fn begin(&self, key: RequestKey) -> Result<PendingRequest, CoreError> {
        let mut state = self.state()?;
        if state.in_flight.contains(&key) {
            return Err(CoreError::Precondition(format!("{} is already being resolved", key)));
        }
        let request = self
            .pending(&key)?
            .ok_or_else(|| CoreError::Precondition(format!("{} is not pending", key)))?;
        state.in_flight.insert(key);
        Ok(request)
    }

    async fn dispatch_approval(
        &self,
        request: &PendingRequest,
        params: ApprovalParams,
    ) -> Result<Option<Announcement>, CoreError> {
        match request {
            PendingRequest::Message(m) => self.controller.sign_message(m.id).await.map(|_| None),
            PendingRequest::PersonalMessage(m) => self.controller.sign_personal_message(m.id).await.map(|_| None),
            PendingRequest::TypedMessage(m) => self.controller.sign_typed_message(m.id).await.map(|_| None),
            PendingRequest::Transaction(tx) => {
                let approved = match params.gas_price {
                    Some(gas_price) => {
                        let updated = tx.with_gas_price(gas_price);
                        self.controller.update_transaction(&updated).await?;
                        updated
                    }
                    None => tx.clone(),
                };
                self.controller.approve_transaction(&approved).await?;
                Ok(Some(Announcement::CompleteTransaction {
                    id: approved.id,
                    tx_params: approved.tx_params,
                }))
            }
        }
    }

    /// Settle an in-flight resolution. On success the request leaves the
    /// queue; on failure it stays for another attempt.
    fn finish(&self, key: RequestKey, outcome: Result<Option<&Announcement>, ()>) -> Result<(), CoreError> {
        {
            let mut state = self.state()?;
            state.in_flight.remove(&key);
            if outcome.is_ok() && state.open_surface == Some(key) {
                state.open_surface = None;
            }
        }

        let announcement = match outcome {
            Ok(announcement) => announcement,
            Err(()) => {
                warn!("Resolution of {} failed; leaving it pending", key);
                return Ok(());
            }
        };

        self.queue
            .lock()
            .map_err(|_| CoreError::Poisoned("request queue"))?
            .remove(&key);
        info!("Resolved {}", key);

        if let (Some(comm), Some(announcement)) = (&self.comm, announcement) {
            if let Err(e) = comm.announce(announcement) {
                warn!("Failed to announce resolution of {}: {}", key, e);
            }
        }
        Ok(())
    }

    fn close_surface(&self, key: &RequestKey) {
        if let Ok(mut state) = self.state() {
            if state.open_surface.as_ref() == Some(key) {
                state.open_surface = None;
            }
        }
    }
}

/// A message the wallet issued to itself: reserved prefix plus an https
/// origin on the trusted domain.
pub fn is_self_signed(request: &SelectedRequest) -> bool {
    use crate::arbiter::SelectedPayload;

    let prefix_matches = match (&request.kind, &request.payload) {
        (RequestKind::Message | RequestKind::PersonalMessage, SelectedPayload::Message { custom_prefix, .. }) => {
            custom_prefix.as_deref() == Some(INTERNAL_MESSAGE_PREFIX)
        }
        _ => false,
    };
    prefix_matches && is_trusted_origin(&request.origin)
}

pub fn is_trusted_origin(origin: &str) -> bool {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(_) => return false,
    };
    if url.scheme() != "https" {
        return false;
    }
    match url.host_str() {
        Some(host) => {
            host == TRUSTED_DOMAIN
                || host
                    .strip_suffix(TRUSTED_DOMAIN)
                    .map(|sub| sub.ends_with('.'))
                    .unwrap_or(false)
        }
        None => false,
    }
}
