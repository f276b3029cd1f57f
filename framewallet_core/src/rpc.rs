//! JSON-RPC envelopes carried over the `provider` sub-stream.
//!
//! Inbound: `{ id, method, params: [..] }` plus any extra fields the bridge
//! attaches (origin tag, resubmission flags). Outbound: `{ id, result }` or
//! `{ id, error: { code, message } }`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{borrow::Cow, fmt};

use crate::error::CoreError;

/// Request id; the embedder may use numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
}

impl RpcId {
    pub(crate) fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(RpcId::Number),
            Value::String(s) => Some(RpcId::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{}", n),
            RpcId::String(s) => f.write_str(s),
        }
    }
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: RpcId,
    pub method: String,
    pub params: Vec<Value>,
    /// Fields other than `id`/`method`/`params`, passed through untouched.
    pub extra: Map<String, Value>,
}

impl RpcRequest {
    pub fn new(id: RpcId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            extra: Map::new(),
        }
    }

    /// Validate a raw frame. The error names the first missing or mistyped
    /// field, checked in the order `id`, `method`, `params`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            _ => return Err(CoreError::MalformedEnvelope { field: "id" }),
        };

        let id = fields
            .remove("id")
            .as_ref()
            .and_then(RpcId::from_json)
            .ok_or(CoreError::MalformedEnvelope { field: "id" })?;
        let method = match fields.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => return Err(CoreError::MalformedEnvelope { field: "method" }),
        };
        let params = match fields.remove("params") {
            Some(Value::Array(params)) => params,
            _ => return Err(CoreError::MalformedEnvelope { field: "params" }),
        };

        Ok(Self {
            id,
            method,
            params,
            extra: fields,
        })
    }

    /// Best-effort id extraction from a frame that failed validation, so an
    /// error can still be correlated.
    pub fn id_hint(value: &Value) -> Option<RpcId> {
        value.get("id").and_then(RpcId::from_json)
    }

    pub fn to_value(&self) -> Value {
        let mut fields = self.extra.clone();
        fields.insert("id".into(), serde_json::to_value(&self.id).unwrap_or(Value::Null));
        fields.insert("method".into(), Value::String(self.method.clone()));
        fields.insert("params".into(), Value::Array(self.params.clone()));
        Value::Object(fields)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.extra.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn origin(&self) -> Option<&str> {
        self.extra.get("origin").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: RpcId,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcError),
}

impl RpcResponse {
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn failure(id: RpcId, error: RpcError) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Error(error),
        }
    }

    pub fn from_result(id: RpcId, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }
}

/// JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub const fn new(code: ErrorCode) -> Self {
        Self {
            message: Cow::Borrowed(code.summary()),
            code,
            data: None,
        }
    }

    pub fn with_message<M: Into<String>>(code: ErrorCode, message: M) -> Self {
        Self {
            code,
            message: message.into().into(),
            data: None,
        }
    }

    pub const fn method_not_found() -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND)
    }

    pub fn invalid_request<M: Into<String>>(message: M) -> Self {
        Self::with_message(ErrorCode::INVALID_REQUEST, message)
    }

    pub fn invalid_params<M: Into<String>>(message: M) -> Self {
        Self::with_message(ErrorCode::INVALID_PARAMS, message)
    }

    pub fn internal_error<M: Into<String>>(message: M) -> Self {
        Self::with_message(ErrorCode::INTERNAL_ERROR, message)
    }

    pub fn user_rejected<M: Into<String>>(message: M) -> Self {
        Self::with_message(ErrorCode::USER_REJECTED, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.summary(), self.message)
    }
}

impl From<CoreError> for RpcError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedEnvelope { .. } => RpcError::invalid_request(err.to_string()),
            CoreError::Precondition(_) | CoreError::Validation(_) => RpcError::invalid_params(err.to_string()),
            CoreError::Execution(message) => RpcError::internal_error(message),
            other => RpcError::internal_error(other.to_string()),
        }
    }
}

/// Numeric error code on an outbound envelope. The bridge only produces the
/// named codes; codes reported by the execution provider pass through as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMS: Self = Self(-32602);
    pub const INTERNAL_ERROR: Self = Self(-32603);
    /// EIP-1193 user rejection.
    pub const USER_REJECTED: Self = Self(4001);

    pub const fn summary(self) -> &'static str {
        match self.0 {
            -32600 => "Invalid request",
            -32601 => "Method not found",
            -32602 => "Invalid params",
            -32603 => "Internal error",
            4001 => "User rejected the request",
            _ => "Provider error",
        }
    }
}
