// Unified store for the four kinds of unapproved requests

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::{
    MessageRequest, PendingRequest, RequestKey, RequestKind, TransactionRequest, TypedMessageRequest,
};

/// Position of a request in arbitration order. The greatest key is the one
/// shown next: newest time first, then kind priority, then earliest insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    time: u64,
    priority: u8,
    seq: Reverse<u64>,
}

#[derive(Debug, Clone)]
struct Entry {
    order: OrderKey,
    request: PendingRequest,
}

/// The queue as shared between the bridge, the coordinator and the UI.
pub type SharedQueue = Arc<Mutex<RequestQueue>>;

/// All unresolved requests, indexed by `(kind, id)` and by arbitration order.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    entries: HashMap<RequestKey, Entry>,
    order: BTreeMap<OrderKey, RequestKey>,
    next_seq: u64,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request, replacing any existing one with the same `(kind, id)`.
    /// A replaced request keeps its original insertion position.
    pub fn insert(&mut self, request: PendingRequest) -> Option<PendingRequest> {
        let key = request.key();
        let seq = match self.entries.get(&key) {
            Some(existing) => existing.order.seq.0,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };
        let order = OrderKey {
            time: request.time(),
            priority: key.kind.priority(),
            seq: Reverse(seq),
        };

        let previous = self.entries.insert(key, Entry { order, request });
        if let Some(prev) = &previous {
            self.order.remove(&prev.order);
        }
        self.order.insert(order, key);
        debug!("Queued {} (pending: {})", key, self.entries.len());
        previous.map(|entry| entry.request)
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<PendingRequest> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.order);
        debug!("Removed {} (pending: {})", key, self.entries.len());
        Some(entry.request)
    }

    pub fn get(&self, key: &RequestKey) -> Option<&PendingRequest> {
        self.entries.get(key).map(|entry| &entry.request)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The request that wins arbitration, if any.
    pub fn latest(&self) -> Option<&PendingRequest> {
        let (_, key) = self.order.last_key_value()?;
        self.get(key)
    }

    /// Requests of one kind in insertion order.
    pub fn of_kind(&self, kind: RequestKind) -> Vec<&PendingRequest> {
        let mut items: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, entry)| entry)
            .collect();
        items.sort_by_key(|entry| entry.order.seq.0);
        items.into_iter().map(|entry| &entry.request).collect()
    }

    /// Replace the whole collection of one kind with `requests`.
    /// Surviving requests keep their insertion position; new ones are appended.
    pub fn sync_kind(&mut self, kind: RequestKind, requests: Vec<PendingRequest>) -> Result<(), CoreError> {
        if let Some(wrong) = requests.iter().find(|r| r.kind() != kind) {
            return Err(CoreError::Validation(format!(
                "cannot sync {} into the {} collection",
                wrong.key(),
                kind
            )));
        }

        let incoming: HashSet<RequestKey> = requests.iter().map(PendingRequest::key).collect();
        let stale: Vec<RequestKey> = self
            .entries
            .keys()
            .filter(|key| key.kind == kind && !incoming.contains(key))
            .copied()
            .collect();
        for key in &stale {
            self.remove(key);
        }
        for request in requests {
            self.insert(request);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut snapshot = QueueSnapshot::default();
        for kind in RequestKind::ALL {
            for request in self.of_kind(kind) {
                match request.clone() {
                    PendingRequest::Message(m) => snapshot.messages.push(m),
                    PendingRequest::PersonalMessage(m) => snapshot.personal_messages.push(m),
                    PendingRequest::TypedMessage(m) => snapshot.typed_messages.push(m),
                    PendingRequest::Transaction(tx) => snapshot.transactions.push(tx),
                }
            }
        }
        snapshot
    }

    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut queue = Self::new();
        snapshot
            .messages
            .into_iter()
            .map(PendingRequest::Message)
            .chain(snapshot.personal_messages.into_iter().map(PendingRequest::PersonalMessage))
            .chain(snapshot.typed_messages.into_iter().map(PendingRequest::TypedMessage))
            .chain(snapshot.transactions.into_iter().map(PendingRequest::Transaction))
            .for_each(|request| {
                queue.insert(request);
            });
        queue
    }

    /// Sync every kind from a published snapshot. Requests absent from the
    /// snapshot are dropped.
    pub fn apply_snapshot(&mut self, snapshot: QueueSnapshot) -> Result<(), CoreError> {
        self.sync_kind(
            RequestKind::Message,
            snapshot.messages.into_iter().map(PendingRequest::Message).collect(),
        )?;
        self.sync_kind(
            RequestKind::PersonalMessage,
            snapshot.personal_messages.into_iter().map(PendingRequest::PersonalMessage).collect(),
        )?;
        self.sync_kind(
            RequestKind::TypedMessage,
            snapshot.typed_messages.into_iter().map(PendingRequest::TypedMessage).collect(),
        )?;
        self.sync_kind(
            RequestKind::Transaction,
            snapshot.transactions.into_iter().map(PendingRequest::Transaction).collect(),
        )?;
        debug!("Applied queue snapshot; {} pending", self.len());
        Ok(())
    }
}

/// Serialized form of the queue: one array per kind, as published by the
/// execution collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(rename = "unapprovedMsgs", default)]
    pub messages: Vec<MessageRequest>,
    #[serde(rename = "unapprovedPersonalMsgs", default)]
    pub personal_messages: Vec<MessageRequest>,
    #[serde(rename = "unapprovedTypedMessages", default)]
    pub typed_messages: Vec<TypedMessageRequest>,
    #[serde(rename = "unapprovedTxs", default)]
    pub transactions: Vec<TransactionRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TxParams;
    use serde_json::json;

    fn message(id: u64, time: u64) -> PendingRequest {
        PendingRequest::Message(MessageRequest {
            id,
            time,
            data: "0x00".into(),
            origin: "https://dapp.example".into(),
            custom_prefix: None,
        })
    }

    fn transaction(id: u64, time: u64) -> PendingRequest {
        PendingRequest::Transaction(TransactionRequest {
            id,
            time,
            tx_params: TxParams {
                from: "0xa".into(),
                ..Default::default()
            },
            origin: "https://dapp.example".into(),
        })
    }

    #[test]
    fn same_id_in_different_kinds_does_not_collide() {
        let mut queue = RequestQueue::new();
        queue.insert(message(1, 5));
        queue.insert(transaction(1, 6));
        assert_eq!(queue.len(), 2);

        queue.remove(&RequestKey::new(RequestKind::Message, 1));
        assert!(queue.contains(&RequestKey::new(RequestKind::Transaction, 1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn latest_follows_time_then_kind_then_insertion() {
        let mut queue = RequestQueue::new();
        assert!(queue.latest().is_none());

        // Same kind and time: the request that arrived first stays in front.
        queue.insert(message(1, 10));
        queue.insert(message(2, 10));
        assert_eq!(queue.latest().unwrap().id(), 1);

        queue.insert(transaction(7, 10));
        assert_eq!(queue.latest().unwrap().kind(), RequestKind::Transaction);

        queue.insert(message(3, 11));
        assert_eq!(queue.latest().unwrap().key(), RequestKey::new(RequestKind::Message, 3));
    }

    #[test]
    fn reinserting_keeps_position_and_updates_time() {
        let mut queue = RequestQueue::new();
        queue.insert(message(1, 10));
        queue.insert(message(2, 10));
        let previous = queue.insert(message(1, 10));
        assert!(previous.is_some());
        assert_eq!(queue.latest().unwrap().id(), 1);

        queue.insert(message(2, 12));
        assert_eq!(queue.latest().unwrap().id(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn sync_kind_drops_missing_and_keeps_other_kinds() {
        let mut queue = RequestQueue::new();
        queue.insert(message(1, 1));
        queue.insert(message(2, 2));
        queue.insert(transaction(1, 3));

        queue.sync_kind(RequestKind::Message, vec![message(2, 2), message(3, 4)]).unwrap();

        let ids: Vec<u64> = queue.of_kind(RequestKind::Message).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(queue.contains(&RequestKey::new(RequestKind::Transaction, 1)));
    }

    #[test]
    fn sync_kind_rejects_foreign_items() {
        let mut queue = RequestQueue::new();
        let err = queue.sync_kind(RequestKind::Message, vec![transaction(1, 1)]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn snapshot_uses_collection_names() {
        let raw = json!({
            "unapprovedMsgs": [{"id": 2, "time": 5, "data": "0x00", "origin": "https://a.example"}],
            "unapprovedTxs": [{"id": 1, "time": 10, "txParams": {"from": "0xa"}, "origin": "https://a.example"}]
        });
        let snapshot: QueueSnapshot = serde_json::from_value(raw).unwrap();
        let queue = RequestQueue::from_snapshot(snapshot.clone());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.snapshot(), snapshot);
    }

    #[test]
    fn applying_a_snapshot_resolves_missing_requests() {
        let mut queue = RequestQueue::new();
        queue.insert(message(1, 1));
        queue.insert(transaction(4, 2));

        let snapshot = QueueSnapshot {
            messages: vec![MessageRequest {
                id: 1,
                time: 1,
                data: "0x00".into(),
                origin: "https://dapp.example".into(),
                custom_prefix: None,
            }],
            ..Default::default()
        };
        queue.apply_snapshot(snapshot).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(!queue.contains(&RequestKey::new(RequestKind::Transaction, 4)));
    }
}
