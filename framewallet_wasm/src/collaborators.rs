// Adapters from JS collaborator objects to the core traits

use async_trait::async_trait;
use framewallet_core::{
    ApprovalSurface, ConfirmationDescriptor, CoreError, ErrorCode, ExecutionController, ExecutionProvider,
    RequestKey, RequestKind, RpcError, RpcRequest, RpcResult, TransactionRequest,
};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, CoreError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| CoreError::Validation(format!("Failed to encode for JS: {}", e)))
}

fn describe(err: &JsValue) -> String {
    js_sys::Reflect::get(err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .or_else(|| err.as_string())
        .unwrap_or_else(|| format!("{:?}", err))
}

/// Call `target[method](arg)` and await the result if it is a promise.
async fn invoke(target: &JsValue, method: &str, arg: &JsValue) -> Result<JsValue, JsValue> {
    let function: js_sys::Function = js_sys::Reflect::get(target, &JsValue::from_str(method))?
        .dyn_into()
        .map_err(|_| JsValue::from_str(&format!("collaborator has no `{}` method", method)))?;
    let returned = function.call1(target, arg)?;
    match returned.dyn_into::<js_sys::Promise>() {
        Ok(promise) => JsFuture::from(promise).await,
        Err(value) => Ok(value),
    }
}

/// Wraps the object exposing `signMessage`, `cancelTransaction`, etc.
pub struct JsExecutionController {
    target: JsValue,
}

impl JsExecutionController {
    pub fn new(target: JsValue) -> Self {
        Self { target }
    }

    async fn call(&self, method: &str, arg: JsValue) -> Result<(), CoreError> {
        invoke(&self.target, method, &arg)
            .await
            .map(|_| ())
            .map_err(|e| CoreError::Execution(format!("{} failed: {}", method, describe(&e))))
    }

    async fn call_with_id(&self, method: &str, id: u64) -> Result<(), CoreError> {
        self.call(method, JsValue::from_f64(id as f64)).await
    }
}

#[async_trait(?Send)]
impl ExecutionController for JsExecutionController {
    async fn sign_message(&self, id: u64) -> Result<(), CoreError> {
        self.call_with_id("signMessage", id).await
    }

    async fn sign_personal_message(&self, id: u64) -> Result<(), CoreError> {
        self.call_with_id("signPersonalMessage", id).await
    }

    async fn sign_typed_message(&self, id: u64) -> Result<(), CoreError> {
        self.call_with_id("signTypedMessage", id).await
    }

    async fn update_transaction(&self, tx: &TransactionRequest) -> Result<(), CoreError> {
        self.call("updateTransaction", to_js_value(tx)?).await
    }

    async fn approve_transaction(&self, tx: &TransactionRequest) -> Result<(), CoreError> {
        self.call("updateAndApproveTransaction", to_js_value(tx)?).await
    }

    async fn cancel(&self, key: RequestKey) -> Result<(), CoreError> {
        let method = match key.kind {
            RequestKind::Message => "cancelMessage",
            RequestKind::PersonalMessage => "cancelPersonalMessage",
            RequestKind::TypedMessage => "cancelTypedMessage",
            RequestKind::Transaction => "cancelTransaction",
        };
        self.call_with_id(method, key.id).await
    }
}

/// Wraps an object with a `request(payload)` method resolving to the result.
pub struct JsExecutionProvider {
    target: JsValue,
}

impl JsExecutionProvider {
    pub fn new(target: JsValue) -> Self {
        Self { target }
    }
}

#[async_trait(?Send)]
impl ExecutionProvider for JsExecutionProvider {
    async fn request(&self, request: &RpcRequest) -> RpcResult {
        let payload = to_js_value(&request.to_value()).map_err(RpcError::from)?;
        match invoke(&self.target, "request", &payload).await {
            Ok(result) if result.is_undefined() => Ok(Value::Null),
            Ok(result) => serde_wasm_bindgen::from_value(result)
                .map_err(|e| RpcError::internal_error(format!("unreadable provider result: {}", e))),
            Err(err) => {
                let code = js_sys::Reflect::get(&err, &JsValue::from_str("code"))
                    .ok()
                    .and_then(|c| c.as_f64())
                    .map(|c| ErrorCode(c as i64))
                    .unwrap_or(ErrorCode::INTERNAL_ERROR);
                Err(RpcError::with_message(code, describe(&err)))
            }
        }
    }
}

/// Calls the UI's surface function with each confirmation descriptor.
pub struct JsApprovalSurface {
    open: js_sys::Function,
}

impl JsApprovalSurface {
    pub fn new(open: js_sys::Function) -> Self {
        Self { open }
    }
}

impl ApprovalSurface for JsApprovalSurface {
    fn open(&self, descriptor: &ConfirmationDescriptor) -> Result<(), CoreError> {
        let descriptor = to_js_value(descriptor)?;
        self.open
            .call1(&JsValue::NULL, &descriptor)
            .map(|_| ())
            .map_err(|e| CoreError::Execution(format!("approval surface failed: {}", describe(&e))))
    }
}
