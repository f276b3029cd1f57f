// window.postMessage physical channel to the embedding page
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, Window};

use crate::error::CoreError;
use crate::mux::{accept_envelope, FramePort, Multiplex};
use crate::settings::ChannelNames;

/// Posts `{ target: <remote>, data: <frame> }` to the parent window.
pub struct WindowPort {
    parent: Window,
    remote: String,
    target_origin: String,
}

impl FramePort for WindowPort {
    fn post(&self, frame: Value) -> Result<(), CoreError> {
        let envelope = serde_json::json!({ "target": self.remote, "data": frame });
        let js = envelope
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| CoreError::Channel(format!("Failed to encode frame: {}", e)))?;
        self.parent
            .post_message(&js, &self.target_origin)
            .map_err(|e| CoreError::Channel(format!("postMessage to {} failed: {:?}", self.remote, e)))
    }
}

/// One physical channel: the multiplexer plus the `message` listener feeding
/// it. Dropping this detaches the listener.
pub struct WindowChannel {
    mux: Multiplex,
    window: Window,
    on_message: Closure<dyn FnMut(MessageEvent)>,
}

impl WindowChannel {
    pub fn connect(names: &ChannelNames, target_origin: &str) -> Result<Self, CoreError> {
        let window = web_sys::window().ok_or_else(|| CoreError::Channel("No window object available".into()))?;
        let parent = window
            .parent()
            .map_err(|e| CoreError::Channel(format!("Parent window not reachable: {:?}", e)))?
            .ok_or_else(|| CoreError::Channel("No parent window".into()))?;

        let mux = Multiplex::new(
            names.local.clone(),
            WindowPort {
                parent: parent.clone(),
                remote: names.remote.clone(),
                target_origin: target_origin.to_string(),
            },
        );

        let router = mux.clone();
        let local = names.local.clone();
        let allowed_origin = target_origin.to_string();
        let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
            // Only the embedding page may speak on this channel.
            let from_parent = e
                .source()
                .map(|source| js_sys::Object::is(&source, &parent))
                .unwrap_or(false);
            if !from_parent {
                return;
            }
            let envelope: Value = match serde_wasm_bindgen::from_value(e.data()) {
                Ok(envelope) => envelope,
                Err(_) => return,
            };
            if let Some(frame) = accept_envelope(&local, &allowed_origin, &e.origin(), envelope) {
                router.route(frame);
            }
        }) as Box<dyn FnMut(_)>);

        window
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
            .map_err(|e| CoreError::Channel(format!("Failed to listen for messages: {:?}", e)))?;
        log::info!("Connected physical channel {} -> {}", names.local, names.remote);

        Ok(Self { mux, window, on_message })
    }

    pub fn mux(&self) -> Multiplex {
        self.mux.clone()
    }
}

impl Drop for WindowChannel {
    fn drop(&mut self) {
        let _ = self
            .window
            .remove_event_listener_with_callback("message", self.on_message.as_ref().unchecked_ref());
        self.mux.fail("channel dropped");
    }
}
