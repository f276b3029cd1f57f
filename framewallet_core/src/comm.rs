// Out-of-band announcements on the `comm` physical channel

use log::debug;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::models::TxParams;
use crate::mux::{Multiplex, SubStreamWriter};

pub const OAUTH_STREAM: &str = "oauth";
pub const APPROVE_TRANSACTION_DISPLAY_STREAM: &str = "approveTransactionDisplay";
pub const COMPLETE_TRANSACTION_STREAM: &str = "completeTransaction";
pub const DENY_TRANSACTION_STREAM: &str = "denyTransaction";

#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    /// A page asked to send a transaction; the embedder should reveal the
    /// wallet frame so the user can review it.
    ApproveTransactionDisplay { origin: String, tx_params: Value },
    CompleteTransaction { id: u64, tx_params: TxParams },
    DenyTransaction { id: u64 },
}

impl Announcement {
    pub fn stream_name(&self) -> &'static str {
        match self {
            Announcement::ApproveTransactionDisplay { .. } => APPROVE_TRANSACTION_DISPLAY_STREAM,
            Announcement::CompleteTransaction { .. } => COMPLETE_TRANSACTION_STREAM,
            Announcement::DenyTransaction { .. } => DENY_TRANSACTION_STREAM,
        }
    }

    fn payload(&self) -> Value {
        match self {
            Announcement::ApproveTransactionDisplay { origin, tx_params } => {
                json!({ "origin": origin, "txParams": tx_params })
            }
            Announcement::CompleteTransaction { id, tx_params } => json!({ "id": id, "txParams": tx_params }),
            Announcement::DenyTransaction { id } => json!({ "id": id }),
        }
    }
}

/// Writers for the outbound-only comm sub-streams, shared by the payload
/// transform and the confirmation coordinator.
#[derive(Clone)]
pub struct CommChannel {
    approve_display: SubStreamWriter,
    complete: SubStreamWriter,
    deny: SubStreamWriter,
}

impl CommChannel {
    pub fn open(mux: &Multiplex) -> Result<Self, CoreError> {
        Ok(Self {
            approve_display: mux.create_outbound(APPROVE_TRANSACTION_DISPLAY_STREAM)?,
            complete: mux.create_outbound(COMPLETE_TRANSACTION_STREAM)?,
            deny: mux.create_outbound(DENY_TRANSACTION_STREAM)?,
        })
    }

    pub fn announce(&self, announcement: &Announcement) -> Result<(), CoreError> {
        let writer = match announcement {
            Announcement::ApproveTransactionDisplay { .. } => &self.approve_display,
            Announcement::CompleteTransaction { .. } => &self.complete,
            Announcement::DenyTransaction { .. } => &self.deny,
        };
        debug!("Announcing {}", announcement.stream_name());
        writer.write(announcement.payload())
    }
}
