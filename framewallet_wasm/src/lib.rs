// Frame Wallet WASM Bindings
// Entry points for the wallet frame's UI
#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use framewallet_core::wasm::{is_embedded, referrer, ClickOAuth, LocalStorageBackend, WindowChannel};
use framewallet_core::{
    load_theme, select_latest, ApprovalParams, BridgeContext, BridgeSettings, ConfirmationCoordinator, CoreError,
    Presentation, PublicConfig, PublicConfigPublisher, QueueSnapshot, RequestKey, RequestKind, RequestQueue,
    SharedQueue, TransportBridge, UserContext, PendingRequest,
};
use log::info;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

mod collaborators;
use collaborators::{JsApprovalSurface, JsExecutionController, JsExecutionProvider};

// Initialize panic hook and logger for WASM
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

type Coordinator = ConfirmationCoordinator<JsExecutionController, JsApprovalSurface>;

/// The wallet frame's side of the embed bridge.
#[wasm_bindgen]
pub struct WalletFrame {
    settings: BridgeSettings,
    queue: SharedQueue,
    coordinator: Rc<Coordinator>,
    public_config: PublicConfigPublisher,
    bridge: RefCell<Option<TransportBridge>>,
    // Keep the message listeners attached for the frame's lifetime.
    _channels: (WindowChannel, WindowChannel),
}

#[wasm_bindgen]
impl WalletFrame {
    /// `controller` exposes the signing entry points, `provider` a
    /// `request(payload)` method, and `surface` is called with each
    /// confirmation descriptor.
    #[wasm_bindgen(constructor)]
    pub fn new(
        settings_json: &str,
        controller: JsValue,
        provider: JsValue,
        surface: js_sys::Function,
    ) -> Result<WalletFrame, JsValue> {
        let settings = BridgeSettings::from_json(settings_json).map_err(to_js)?;
        let provider_channel = WindowChannel::connect(&settings.provider_channel, &settings.target_origin).map_err(to_js)?;
        let comm_channel = WindowChannel::connect(&settings.comm_channel, &settings.target_origin).map_err(to_js)?;

        let context = BridgeContext::new(provider_channel.mux(), comm_channel.mux(), referrer());
        let bridge = TransportBridge::new(&context, Arc::new(JsExecutionProvider::new(provider)))
            .map_err(to_js)?;

        let queue: SharedQueue = Arc::new(Mutex::new(RequestQueue::new()));
        let embedded = is_embedded();
        let coordinator = ConfirmationCoordinator::new(
            queue.clone(),
            JsExecutionController::new(controller),
            JsApprovalSurface::new(surface),
            embedded,
        )
        .with_comm(bridge.comm());
        info!("Wallet frame created (embedded: {}, referrer: {})", embedded, context.referrer);

        Ok(Self {
            settings,
            queue,
            coordinator: Rc::new(coordinator),
            public_config: bridge.public_config(),
            bridge: RefCell::new(Some(bridge)),
            _channels: (provider_channel, comm_channel),
        })
    }

    /// Start serving the embedder. Can only be called once.
    pub fn start(&self) -> Result<(), JsValue> {
        let bridge = self
            .bridge
            .borrow_mut()
            .take()
            .ok_or_else(|| JsValue::from_str("Bridge is already running"))?;
        let oauth = ClickOAuth {
            button_id: self.settings.oauth_button_id.clone(),
        };
        spawn_local(bridge.run(oauth));
        Ok(())
    }

    /// Replace the queue contents with the execution layer's latest
    /// `{ unapprovedMsgs, unapprovedPersonalMsgs, unapprovedTypedMessages, unapprovedTxs }`.
    pub fn sync_queue(&self, snapshot: JsValue) -> Result<(), JsValue> {
        let snapshot: QueueSnapshot = serde_wasm_bindgen::from_value(snapshot)?;
        self.queue
            .lock()
            .map_err(|_| to_js(CoreError::Poisoned("request queue")))?
            .apply_snapshot(snapshot)
            .map_err(to_js)
    }

    pub fn insert_request(&self, request: JsValue) -> Result<(), JsValue> {
        let request: PendingRequest = serde_wasm_bindgen::from_value(request)?;
        self.queue
            .lock()
            .map_err(|_| to_js(CoreError::Poisoned("request queue")))?
            .insert(request);
        Ok(())
    }

    pub fn remove_request(&self, kind: &str, id: f64) -> Result<bool, JsValue> {
        let key = parse_key(kind, id)?;
        let removed = self
            .queue
            .lock()
            .map_err(|_| to_js(CoreError::Poisoned("request queue")))?
            .remove(&key);
        Ok(removed.is_some())
    }

    /// The request that would be presented next, or `undefined`.
    pub fn selected(&self) -> Result<JsValue, JsValue> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| to_js(CoreError::Poisoned("request queue")))?;
        match select_latest(&queue) {
            Some(selected) => to_value(&selected),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    pub fn is_transaction_selected(&self) -> Result<bool, JsValue> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| to_js(CoreError::Poisoned("request queue")))?;
        Ok(framewallet_core::is_transaction_selected(&queue))
    }

    /// Resolves to `{ kind, id, autoResolved }`.
    pub fn present_next(&self, context: JsValue) -> js_sys::Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let context: UserContext = if context.is_undefined() || context.is_null() {
                UserContext::default()
            } else {
                serde_wasm_bindgen::from_value(context)?
            };
            let (key, auto_resolved) = match coordinator.present_next(context).await.map_err(to_js)? {
                Presentation::AutoResolved(key) => (key, true),
                Presentation::Surfaced(key) => (key, false),
            };
            to_value(&serde_json::json!({ "kind": key.kind, "id": key.id, "autoResolved": auto_resolved }))
        })
    }

    pub fn approve(&self, kind: String, id: f64, params: JsValue) -> js_sys::Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let key = parse_key(&kind, id)?;
            let params: ApprovalParams = if params.is_undefined() || params.is_null() {
                ApprovalParams::default()
            } else {
                serde_wasm_bindgen::from_value(params)?
            };
            coordinator.approve(key, params).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn deny(&self, kind: String, id: f64) -> js_sys::Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let key = parse_key(&kind, id)?;
            coordinator.deny(key).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// `{ kind, id }` of the open approval surface, or `undefined`.
    pub fn pending_surface(&self) -> Result<JsValue, JsValue> {
        match self.coordinator.pending_surface() {
            Some(key) => to_value(&key),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Push `{ selectedAddress, networkVersion }` to the embedder if changed.
    pub fn update_public_config(&self, config: JsValue) -> Result<u32, JsValue> {
        let config: PublicConfig = serde_wasm_bindgen::from_value(config)?;
        let written = self.public_config.update(config).map_err(to_js)?;
        Ok(written as u32)
    }

    /// Persisted display theme, or the configured default.
    pub fn theme(&self) -> js_sys::Promise {
        let prefix = self.settings.preference_prefix.clone();
        let default = self.settings.default_theme.clone();
        future_to_promise(async move {
            let storage = LocalStorageBackend::new(prefix);
            Ok(JsValue::from_str(&load_theme(&storage, &default).await))
        })
    }
}

fn parse_key(kind: &str, id: f64) -> Result<RequestKey, JsValue> {
    let kind: RequestKind = kind.parse().map_err(to_js)?;
    if !id.is_finite() || id < 0.0 || id.fract() != 0.0 {
        return Err(JsValue::from_str(&format!("invalid request id: {}", id)));
    }
    Ok(RequestKey::new(kind, id as u64))
}

fn to_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(Into::into)
}

pub(crate) fn to_js(err: CoreError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
