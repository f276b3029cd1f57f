use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The four categories of unapproved requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Message,
    PersonalMessage,
    TypedMessage,
    Transaction,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::Message,
        RequestKind::PersonalMessage,
        RequestKind::TypedMessage,
        RequestKind::Transaction,
    ];

    /// Rank used when two requests of different kinds carry the same time.
    /// Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            RequestKind::Message => 0,
            RequestKind::PersonalMessage => 1,
            RequestKind::TypedMessage => 2,
            RequestKind::Transaction => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Message => "message",
            RequestKind::PersonalMessage => "personalMessage",
            RequestKind::TypedMessage => "typedMessage",
            RequestKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown request kind: {}", s)))
    }
}

/// Identity of a pending request. Ids are only unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub kind: RequestKind,
    pub id: u64,
}

impl RequestKey {
    pub fn new(kind: RequestKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Plain or personal message awaiting a signature.
/// `data` is normally a `0x`-prefixed hex string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub id: u64,
    pub time: u64,
    pub data: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedMessageRequest {
    pub id: u64,
    pub time: u64,
    pub data: Value,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Transaction parameters as received from the embedding page.
/// Unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxParams {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub id: u64,
    pub time: u64,
    pub tx_params: TxParams,
    pub origin: String,
}

impl TransactionRequest {
    /// Copy of this record with only the gas price replaced.
    pub fn with_gas_price(&self, gas_price: impl Into<String>) -> Self {
        let mut updated = self.clone();
        updated.tx_params.gas_price = Some(gas_price.into());
        updated
    }
}

/// One unresolved request of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PendingRequest {
    Message(MessageRequest),
    PersonalMessage(MessageRequest),
    TypedMessage(TypedMessageRequest),
    Transaction(TransactionRequest),
}

impl PendingRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            PendingRequest::Message(_) => RequestKind::Message,
            PendingRequest::PersonalMessage(_) => RequestKind::PersonalMessage,
            PendingRequest::TypedMessage(_) => RequestKind::TypedMessage,
            PendingRequest::Transaction(_) => RequestKind::Transaction,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            PendingRequest::Message(m) | PendingRequest::PersonalMessage(m) => m.id,
            PendingRequest::TypedMessage(m) => m.id,
            PendingRequest::Transaction(tx) => tx.id,
        }
    }

    pub fn time(&self) -> u64 {
        match self {
            PendingRequest::Message(m) | PendingRequest::PersonalMessage(m) => m.time,
            PendingRequest::TypedMessage(m) => m.time,
            PendingRequest::Transaction(tx) => tx.time,
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            PendingRequest::Message(m) | PendingRequest::PersonalMessage(m) => &m.origin,
            PendingRequest::TypedMessage(m) => &m.origin,
            PendingRequest::Transaction(tx) => &tx.origin,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.kind(), self.id())
    }
}
