use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::models::{PendingRequest, RequestKey, RequestKind, TxParams};
use crate::queue::RequestQueue;

/// The request picked for display, with its payload prepared for the
/// approval surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedRequest {
    pub kind: RequestKind,
    pub id: u64,
    pub time: u64,
    pub origin: String,
    pub payload: SelectedPayload,
}

impl SelectedRequest {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SelectedPayload {
    #[serde(rename_all = "camelCase")]
    Message {
        /// Hex-decoded text, or the raw data when it is not decodable.
        text: String,
        raw: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_prefix: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TypedMessage {
        data: Value,
        /// Same value as `data`; kept separate so the surface can branch on
        /// typed-data versions later.
        typed_data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Transaction { tx_params: TxParams },
}

/// Pick the request to show next: greatest time wins, and on equal times
/// Transaction > TypedMessage > PersonalMessage > Message. Within one kind the
/// earlier arrival stays in front.
pub fn select_latest(queue: &RequestQueue) -> Option<SelectedRequest> {
    let request = queue.latest()?;
    debug!("Arbitration picked {} at time {}", request.key(), request.time());

    let payload = match request {
        PendingRequest::Message(m) | PendingRequest::PersonalMessage(m) => SelectedPayload::Message {
            text: decode_message_text(&m.data),
            raw: m.data.clone(),
            custom_prefix: m.custom_prefix.clone(),
        },
        PendingRequest::TypedMessage(m) => SelectedPayload::TypedMessage {
            data: m.data.clone(),
            typed_data: m.data.clone(),
            version: m.version.clone(),
        },
        PendingRequest::Transaction(tx) => SelectedPayload::Transaction {
            tx_params: tx.tx_params.clone(),
        },
    };

    Some(SelectedRequest {
        kind: request.kind(),
        id: request.id(),
        time: request.time(),
        origin: request.origin().to_string(),
        payload,
    })
}

/// True iff the arbitration winner is a transaction, i.e. at least one
/// transaction exists and no message-kind request is strictly newer than the
/// newest transaction.
pub fn is_transaction_selected(queue: &RequestQueue) -> bool {
    queue
        .latest()
        .map(|request| request.kind() == RequestKind::Transaction)
        .unwrap_or(false)
}

/// Best-effort decode of hex-encoded UTF-8 message data. Anything that is
/// not valid hex or not valid UTF-8 comes back unchanged.
pub fn decode_message_text(data: &str) -> String {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRequest, TransactionRequest, TypedMessageRequest};
    use serde_json::json;

    const ORIGIN: &str = "https://dapp.example";

    fn message(id: u64, time: u64, data: &str) -> PendingRequest {
        PendingRequest::Message(MessageRequest {
            id,
            time,
            data: data.into(),
            origin: ORIGIN.into(),
            custom_prefix: None,
        })
    }

    fn personal(id: u64, time: u64) -> PendingRequest {
        PendingRequest::PersonalMessage(MessageRequest {
            id,
            time,
            data: "0x6869".into(),
            origin: ORIGIN.into(),
            custom_prefix: None,
        })
    }

    fn typed(id: u64, time: u64) -> PendingRequest {
        PendingRequest::TypedMessage(TypedMessageRequest {
            id,
            time,
            data: json!([{"type": "string", "name": "greeting", "value": "hi"}]),
            origin: ORIGIN.into(),
            version: None,
        })
    }

    fn transaction(id: u64, time: u64) -> PendingRequest {
        PendingRequest::Transaction(TransactionRequest {
            id,
            time,
            tx_params: TxParams {
                from: "0xa".into(),
                to: Some("0xb".into()),
                value: Some("0x1".into()),
                ..Default::default()
            },
            origin: ORIGIN.into(),
        })
    }

    fn queue_of(requests: Vec<PendingRequest>) -> RequestQueue {
        let mut queue = RequestQueue::new();
        for request in requests {
            queue.insert(request);
        }
        queue
    }

    #[test]
    fn empty_queue_selects_nothing() {
        let queue = RequestQueue::new();
        assert!(select_latest(&queue).is_none());
        assert!(!is_transaction_selected(&queue));
    }

    #[test]
    fn newer_transaction_beats_older_message() {
        let queue = queue_of(vec![transaction(1, 10), message(2, 5, "0x00")]);
        let selected = select_latest(&queue).unwrap();
        assert_eq!(selected.key(), RequestKey::new(RequestKind::Transaction, 1));
        assert!(is_transaction_selected(&queue));
    }

    #[test]
    fn newer_typed_message_beats_transaction() {
        let queue = queue_of(vec![transaction(1, 10), typed(3, 12)]);
        let selected = select_latest(&queue).unwrap();
        assert_eq!(selected.key(), RequestKey::new(RequestKind::TypedMessage, 3));
        assert!(!is_transaction_selected(&queue));
    }

    #[test]
    fn ties_resolve_by_kind_priority() {
        let queue = queue_of(vec![message(1, 9, "0x00"), personal(1, 9), typed(1, 9)]);
        assert_eq!(select_latest(&queue).unwrap().kind, RequestKind::TypedMessage);

        let queue = queue_of(vec![message(1, 9, "0x00"), personal(1, 9)]);
        assert_eq!(select_latest(&queue).unwrap().kind, RequestKind::PersonalMessage);

        let queue = queue_of(vec![typed(1, 9), transaction(4, 9)]);
        assert_eq!(select_latest(&queue).unwrap().kind, RequestKind::Transaction);
        assert!(is_transaction_selected(&queue));
    }

    #[test]
    fn selection_and_transaction_check_agree_on_every_layout() {
        // Every combination of presence/time for one item per kind.
        let times = [None, Some(1u64), Some(2), Some(3)];
        for m in times {
            for p in times {
                for t in times {
                    for x in times {
                        let mut requests = Vec::new();
                        if let Some(time) = m {
                            requests.push(message(1, time, "0x00"));
                        }
                        if let Some(time) = p {
                            requests.push(personal(1, time));
                        }
                        if let Some(time) = t {
                            requests.push(typed(1, time));
                        }
                        if let Some(time) = x {
                            requests.push(transaction(1, time));
                        }
                        let queue = queue_of(requests);

                        let newest_message = [m, p, t].into_iter().flatten().max();
                        let expected_tx = match (x, newest_message) {
                            (Some(tx), Some(msg)) => tx >= msg,
                            (Some(_), None) => true,
                            (None, _) => false,
                        };
                        assert_eq!(is_transaction_selected(&queue), expected_tx);

                        let greatest = [m, p, t, x].into_iter().flatten().max();
                        match select_latest(&queue) {
                            Some(selected) => {
                                assert_eq!(Some(selected.time), greatest);
                                assert_eq!(selected.kind == RequestKind::Transaction, expected_tx);
                            }
                            None => assert!(greatest.is_none()),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn superseded_requests_stay_queued() {
        let mut queue = queue_of(vec![message(1, 1, "0x00"), message(2, 2, "0x00")]);
        assert_eq!(select_latest(&queue).unwrap().id, 2);
        queue.remove(&RequestKey::new(RequestKind::Message, 2));
        assert_eq!(select_latest(&queue).unwrap().id, 1);
    }

    #[test]
    fn message_payload_is_hex_decoded() {
        let queue = queue_of(vec![message(1, 1, "0x68656c6c6f")]);
        match select_latest(&queue).unwrap().payload {
            SelectedPayload::Message { text, raw, .. } => {
                assert_eq!(text, "hello");
                assert_eq!(raw, "0x68656c6c6f");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn undecodable_message_falls_back_to_raw() {
        assert_eq!(decode_message_text("not hex at all"), "not hex at all");
        assert_eq!(decode_message_text("0xabc"), "0xabc");
        // Valid hex, invalid UTF-8.
        assert_eq!(decode_message_text("0xff"), "0xff");
        assert_eq!(decode_message_text("6869"), "hi");

        let queue = queue_of(vec![message(1, 1, "zz")]);
        match select_latest(&queue).unwrap().payload {
            SelectedPayload::Message { text, .. } => assert_eq!(text, "zz"),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn typed_message_data_is_aliased() {
        let queue = queue_of(vec![typed(5, 1)]);
        match select_latest(&queue).unwrap().payload {
            SelectedPayload::TypedMessage { data, typed_data, .. } => assert_eq!(data, typed_data),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
