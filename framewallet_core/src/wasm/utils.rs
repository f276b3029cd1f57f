// Browser context probes

use wasm_bindgen::JsCast;
use web_sys::HtmlElement;

use crate::bridge::OAuthHandler;
use crate::error::CoreError;

/// True when this document runs inside another page's frame.
pub fn is_embedded() -> bool {
    let window = match web_sys::window() {
        Some(window) => window,
        None => return false,
    };
    match window.parent() {
        Ok(Some(parent)) => !js_sys::Object::is(&window, &parent),
        _ => false,
    }
}

/// URL of the page that loaded this frame; empty when unknown.
pub fn referrer() -> String {
    web_sys::window()
        .and_then(|w| w.document())
        .map(|d| d.referrer())
        .unwrap_or_default()
}

pub fn click_element(id: &str) -> Result<(), CoreError> {
    let element = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(id))
        .ok_or_else(|| CoreError::Validation(format!("no element with id `{}`", id)))?;
    element
        .dyn_into::<HtmlElement>()
        .map_err(|_| CoreError::Validation(format!("element `{}` is not clickable", id)))?
        .click();
    Ok(())
}

/// OAuth trigger that clicks the login button, as if the user had.
pub struct ClickOAuth {
    pub button_id: String,
}

impl OAuthHandler for ClickOAuth {
    fn trigger(&self, _payload: &serde_json::Value) -> Result<(), CoreError> {
        click_element(&self.button_id)
    }
}
