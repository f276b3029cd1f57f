// End-to-end: an embedder sends a transaction over the provider channel, it is
// parked in the queue, the user approves it with a new gas price and the
// response plus the completion announcement flow back.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use framewallet_core::{
    ApprovalParams, ApprovalSurface, BridgeContext, ConfirmationCoordinator, ConfirmationDescriptor, CoreError,
    ExecutionController, ExecutionProvider, MemoryPort, Multiplex, OAuthHandler, PendingRequest, Presentation,
    RequestKey, RequestKind, RequestQueue, RpcError, RpcRequest, RpcResult, SharedQueue, TransactionRequest,
    TransportBridge, TxParams, UserContext,
};
use futures::channel::oneshot;
use futures::StreamExt;
use serde_json::{json, Value};

type Waiters = Rc<RefCell<HashMap<u64, oneshot::Sender<RpcResult>>>>;

/// Parks every `eth_sendTransaction` in the queue until it is resolved.
struct ParkingProvider {
    queue: SharedQueue,
    waiters: Waiters,
    next_id: Cell<u64>,
}

#[async_trait(?Send)]
impl ExecutionProvider for ParkingProvider {
    async fn request(&self, request: &RpcRequest) -> RpcResult {
        match request.method.as_str() {
            "eth_sendTransaction" => {
                let id = self.next_id.get() + 1;
                self.next_id.set(id);
                let tx_params: TxParams = serde_json::from_value(request.params[0].clone())
                    .map_err(|e| RpcError::invalid_params(e.to_string()))?;
                let (tx, rx) = oneshot::channel();
                self.waiters.borrow_mut().insert(id, tx);
                self.queue.lock().unwrap().insert(PendingRequest::Transaction(TransactionRequest {
                    id,
                    time: 100,
                    tx_params,
                    origin: request.origin().unwrap_or_default().to_string(),
                }));
                rx.await.unwrap_or_else(|_| Err(RpcError::internal_error("dropped")))
            }
            "eth_chainId" => Ok(json!("0x1")),
            _ => Err(RpcError::method_not_found()),
        }
    }
}

struct ParkingController {
    waiters: Waiters,
    updates: RefCell<Vec<TransactionRequest>>,
}

impl ParkingController {
    fn settle(&self, id: u64, result: RpcResult) -> Result<(), CoreError> {
        let waiter = self
            .waiters
            .borrow_mut()
            .remove(&id)
            .ok_or_else(|| CoreError::Execution(format!("nothing parked for {}", id)))?;
        let _ = waiter.send(result);
        Ok(())
    }
}

#[async_trait(?Send)]
impl ExecutionController for ParkingController {
    async fn sign_message(&self, _id: u64) -> Result<(), CoreError> {
        unreachable!()
    }
    async fn sign_personal_message(&self, _id: u64) -> Result<(), CoreError> {
        unreachable!()
    }
    async fn sign_typed_message(&self, _id: u64) -> Result<(), CoreError> {
        unreachable!()
    }
    async fn update_transaction(&self, tx: &TransactionRequest) -> Result<(), CoreError> {
        self.updates.borrow_mut().push(tx.clone());
        Ok(())
    }
    async fn approve_transaction(&self, tx: &TransactionRequest) -> Result<(), CoreError> {
        self.settle(tx.id, Ok(json!(format!("0xhash{}", tx.id))))
    }
    async fn cancel(&self, key: RequestKey) -> Result<(), CoreError> {
        self.settle(key.id, Err(RpcError::user_rejected("User denied transaction signature.")))
    }
}

#[derive(Clone, Default)]
struct Surface {
    shown: Rc<RefCell<Vec<RequestKey>>>,
}

impl ApprovalSurface for Surface {
    fn open(&self, descriptor: &ConfirmationDescriptor) -> Result<(), CoreError> {
        self.shown.borrow_mut().push(descriptor.key());
        Ok(())
    }
}

struct NoOAuth;

impl OAuthHandler for NoOAuth {
    fn trigger(&self, _payload: &Value) -> Result<(), CoreError> {
        Ok(())
    }
}

fn send_transaction(id: u64) -> Value {
    json!({
        "name": "provider",
        "data": {
            "id": id,
            "method": "eth_sendTransaction",
            "params": [{ "from": "0xa", "to": "0xb", "gasPrice": "0x1" }]
        }
    })
}

#[tokio::test]
async fn approved_transaction_round_trip() {
    let (provider_port, mut provider_out) = MemoryPort::channel();
    let (comm_port, mut comm_out) = MemoryPort::channel();
    let context = BridgeContext::new(
        Multiplex::new("iframe_provider", provider_port),
        Multiplex::new("iframe_comm", comm_port),
        "https://dapp.example/swap",
    );

    let queue: SharedQueue = Arc::new(Mutex::new(RequestQueue::new()));
    let waiters: Waiters = Rc::default();
    let provider = Arc::new(ParkingProvider {
        queue: queue.clone(),
        waiters: waiters.clone(),
        next_id: Cell::new(0),
    });
    let bridge = TransportBridge::new(&context, provider).unwrap();
    let surface = Surface::default();
    let coordinator = ConfirmationCoordinator::new(
        queue.clone(),
        ParkingController {
            waiters,
            updates: RefCell::new(Vec::new()),
        },
        surface.clone(),
        true,
    )
    .with_comm(bridge.comm());

    let driver = async {
        context.provider.route(send_transaction(7));
        context.provider.route(json!({ "name": "provider", "data": { "id": 8, "method": "eth_chainId", "params": [] } }));

        // The parked transaction does not hold up the chain id query.
        let first = provider_out.next().await.unwrap();
        assert_eq!(first["data"], json!({ "id": 8, "result": "0x1" }));
        let display = comm_out.next().await.unwrap();
        assert_eq!(display["name"], json!("approveTransactionDisplay"));

        let key = RequestKey::new(RequestKind::Transaction, 1);
        while !queue.lock().unwrap().contains(&key) {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            coordinator.present_next(UserContext::default()).await.unwrap(),
            Presentation::Surfaced(key)
        );

        coordinator
            .approve(key, ApprovalParams { gas_price: Some("0x2".into()) })
            .await
            .unwrap();

        let response = provider_out.next().await.unwrap();
        assert_eq!(response["data"], json!({ "id": 7, "result": "0xhash1" }));
        let complete = comm_out.next().await.unwrap();
        assert_eq!(complete["name"], json!("completeTransaction"));
        assert_eq!(complete["data"]["txParams"]["gasPrice"], json!("0x2"));

        context.provider.fail("test finished");
        context.comm.fail("test finished");
    };

    futures::join!(bridge.run(NoOAuth), driver);

    assert!(queue.lock().unwrap().is_empty());
    assert_eq!(*surface.shown.borrow(), vec![RequestKey::new(RequestKind::Transaction, 1)]);
    let updates = coordinator.controller().updates.borrow();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].origin, "https://dapp.example");
}

#[tokio::test]
async fn denied_transaction_is_rejected_to_the_embedder() {
    let (provider_port, mut provider_out) = MemoryPort::channel();
    let (comm_port, mut comm_out) = MemoryPort::channel();
    let context = BridgeContext::new(
        Multiplex::new("iframe_provider", provider_port),
        Multiplex::new("iframe_comm", comm_port),
        "https://dapp.example",
    );

    let queue: SharedQueue = Arc::new(Mutex::new(RequestQueue::new()));
    let waiters: Waiters = Rc::default();
    let provider = Arc::new(ParkingProvider {
        queue: queue.clone(),
        waiters: waiters.clone(),
        next_id: Cell::new(0),
    });
    let bridge = TransportBridge::new(&context, provider).unwrap();
    let coordinator = ConfirmationCoordinator::new(
        queue.clone(),
        ParkingController {
            waiters,
            updates: RefCell::new(Vec::new()),
        },
        Surface::default(),
        true,
    )
    .with_comm(bridge.comm());

    let driver = async {
        context.provider.route(send_transaction(3));
        assert_eq!(comm_out.next().await.unwrap()["name"], json!("approveTransactionDisplay"));

        // Wait for the provider to park the request.
        while queue.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        let key = RequestKey::new(RequestKind::Transaction, 1);
        coordinator.deny(key).await.unwrap();
        assert!(matches!(coordinator.deny(key).await, Err(CoreError::Precondition(_))));

        let response = provider_out.next().await.unwrap();
        assert_eq!(response["data"]["id"], json!(3));
        assert_eq!(response["data"]["error"]["code"], json!(4001));
        assert_eq!(
            comm_out.next().await.unwrap(),
            json!({ "name": "denyTransaction", "data": { "id": 1 } })
        );

        context.provider.fail("test finished");
        context.comm.fail("test finished");
    };

    futures::join!(bridge.run(NoOAuth), driver);
    assert!(queue.lock().unwrap().is_empty());
}
