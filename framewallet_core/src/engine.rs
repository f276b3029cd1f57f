// Local JSON-RPC engine: an ordered middleware chain in front of the
// execution provider.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::rpc::{RpcError, RpcRequest, RpcResponse};

pub type RpcResult = Result<Value, RpcError>;

/// What a middleware decided for a request.
pub enum Flow {
    /// Hand the (possibly modified) request to the next middleware.
    Next,
    /// Stop here and answer with this result.
    Respond(RpcResult),
}

#[async_trait(?Send)]
pub trait Middleware {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: &mut RpcRequest) -> Flow;

    /// Called in reverse order for every middleware the request passed through.
    fn on_response(&self, _request: &RpcRequest, _result: &RpcResult) {}
}

/// The execution layer that ultimately serves RPC calls (and parks
/// transactions until they are approved).
#[async_trait(?Send)]
pub trait ExecutionProvider {
    async fn request(&self, request: &RpcRequest) -> RpcResult;
}

#[derive(Default)]
pub struct RpcEngine {
    middleware: Vec<Box<dyn Middleware>>,
}

impl RpcEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    pub async fn handle(&self, mut request: RpcRequest) -> RpcResponse {
        let mut visited = 0;
        let mut outcome = None;
        for middleware in &self.middleware {
            visited += 1;
            if let Flow::Respond(result) = middleware.handle(&mut request).await {
                outcome = Some(result);
                break;
            }
        }

        let result = outcome.unwrap_or_else(|| {
            debug!("No middleware answered {} ({})", request.method, request.id);
            Err(RpcError::internal_error(format!(
                "request {} for `{}` was not handled",
                request.id, request.method
            )))
        });
        for middleware in self.middleware[..visited].iter().rev() {
            middleware.on_response(&request, &result);
        }
        RpcResponse::from_result(request.id.clone(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcId, RpcOutcome};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        answer: Option<Value>,
    }

    #[async_trait(?Send)]
    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, request: &mut RpcRequest) -> Flow {
            self.log.borrow_mut().push(format!("in:{}", self.name));
            request.extra.insert(self.name.into(), json!(true));
            match &self.answer {
                Some(value) => Flow::Respond(Ok(value.clone())),
                None => Flow::Next,
            }
        }

        fn on_response(&self, _request: &RpcRequest, _result: &RpcResult) {
            self.log.borrow_mut().push(format!("out:{}", self.name));
        }
    }

    fn recorder(name: &'static str, log: &Rc<RefCell<Vec<String>>>, answer: Option<Value>) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
            answer,
        }
    }

    #[tokio::test]
    async fn runs_in_order_and_unwinds_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = RpcEngine::new()
            .with(recorder("a", &log, None))
            .with(recorder("b", &log, Some(json!("0x1"))))
            .with(recorder("c", &log, None));

        let response = engine.handle(RpcRequest::new(RpcId::Number(3), "eth_chainId", vec![])).await;
        assert_eq!(response.id, RpcId::Number(3));
        assert_eq!(response.outcome, RpcOutcome::Result(json!("0x1")));
        assert_eq!(*log.borrow(), vec!["in:a", "in:b", "out:b", "out:a"]);
    }

    #[tokio::test]
    async fn unanswered_request_is_an_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = RpcEngine::new().with(recorder("a", &log, None));
        let response = engine.handle(RpcRequest::new(RpcId::Number(1), "eth_chainId", vec![])).await;
        assert!(response.is_error());
        assert_eq!(engine.middleware_names(), vec!["a"]);
    }
}
