// Inbound RPC rewriting applied before the middleware chain

use log::{debug, warn};
use serde_json::Value;

use crate::comm::{Announcement, CommChannel};
use crate::rpc::{RpcId, RpcRequest};

/// Envelope flag: a transaction re-sent by the wallet with an explicit gas price.
pub const GAS_PRICE_RESUBMIT_FLAG: &str = "gasPriceResubmit";
/// Envelope flag: a transaction re-sent after it was completed or denied.
pub const RESOLVED_RESUBMIT_FLAG: &str = "resolvedResubmit";

pub struct PayloadTransform {
    comm: CommChannel,
    referrer: String,
}

impl PayloadTransform {
    pub fn new(comm: CommChannel, referrer: impl Into<String>) -> Self {
        Self {
            comm,
            referrer: referrer.into(),
        }
    }

    /// Rewrite one inbound request. Never fails; anything it cannot rewrite
    /// passes through unchanged.
    pub fn apply(&self, request: RpcRequest) -> RpcRequest {
        match request.method.as_str() {
            "eth_sendTransaction" => self.on_send_transaction(request),
            "eth_call" | "eth_estimateGas" => normalize_from_address(request),
            _ => request,
        }
    }

    fn on_send_transaction(&self, mut request: RpcRequest) -> RpcRequest {
        if request.flag(GAS_PRICE_RESUBMIT_FLAG) || request.flag(RESOLVED_RESUBMIT_FLAG) {
            let tx_id = request
                .params
                .first()
                .and_then(|params| params.get("id"))
                .and_then(RpcId::from_json);
            match tx_id {
                Some(id) => request.id = id,
                None => debug!("Resubmitted transaction carries no id; keeping envelope id {}", request.id),
            }
            return request;
        }

        let announcement = Announcement::ApproveTransactionDisplay {
            origin: self.referrer.clone(),
            tx_params: request.params.first().cloned().unwrap_or(Value::Null),
        };
        if let Err(e) = self.comm.announce(&announcement) {
            warn!("Failed to announce transaction display for request {}: {}", request.id, e);
        }
        request
    }
}

/// Re-encode `params[0].from` from `0x`-hex to raw bytes, which is what the
/// execution layer expects for call and gas estimation. A missing `from`
/// becomes an empty byte list.
pub fn normalize_from_address(mut request: RpcRequest) -> RpcRequest {
    let call = match request.params.first_mut() {
        Some(Value::Object(call)) => call,
        _ => return request,
    };

    let replacement = match call.get("from") {
        None => Some(Value::Array(Vec::new())),
        Some(Value::String(from)) if from.starts_with("0x") => match hex::decode(&from[2..]) {
            Ok(bytes) => Some(Value::Array(bytes.into_iter().map(Value::from).collect())),
            Err(e) => {
                debug!("Leaving `from` as-is for {}: {}", request.method, e);
                None
            }
        },
        Some(_) => None,
    };
    if let Some(from) = replacement {
        call.insert("from".into(), from);
    }
    request
}
