// Named sub-streams multiplexed over one physical postMessage connection.
//
// Frames on the physical connection are `{ "name": <sub-stream>, "data": <payload> }`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use log::{debug, error, warn};
use serde_json::{json, Value};
use url::Url;

use crate::error::CoreError;

/// Outbound half of a physical duplex connection.
pub trait FramePort {
    fn post(&self, frame: Value) -> Result<(), CoreError>;
}

struct MuxState {
    routes: HashMap<String, UnboundedSender<Value>>,
    created: HashSet<String>,
    closed: Option<String>,
}

struct MuxInner {
    name: String,
    port: Box<dyn FramePort>,
    state: Mutex<MuxState>,
}

/// Multiplexer over one physical connection. Cheap to clone.
#[derive(Clone)]
pub struct Multiplex {
    inner: Arc<MuxInner>,
}

impl Multiplex {
    pub fn new(name: impl Into<String>, port: impl FramePort + 'static) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                name: name.into(),
                port: Box::new(port),
                state: Mutex::new(MuxState {
                    routes: HashMap::new(),
                    created: HashSet::new(),
                    closed: None,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> Result<MutexGuard<'_, MuxState>, CoreError> {
        self.inner.state.lock().map_err(|_| CoreError::Poisoned("multiplex state"))
    }

    fn claim(&self, name: &str) -> Result<(), CoreError> {
        let mut state = self.state()?;
        if let Some(reason) = &state.closed {
            return Err(CoreError::ChannelClosed(format!("{} ({})", self.inner.name, reason)));
        }
        if !state.created.insert(name.to_string()) {
            return Err(CoreError::Channel(format!(
                "sub-stream `{}` already exists on `{}`",
                name, self.inner.name
            )));
        }
        Ok(())
    }

    /// Create a duplex sub-stream. Each name can be created once.
    pub fn create_stream(&self, name: &str) -> Result<SubStream, CoreError> {
        self.claim(name)?;
        let (tx, rx) = unbounded();
        self.state()?.routes.insert(name.to_string(), tx);
        debug!("Created sub-stream {}/{}", self.inner.name, name);
        Ok(SubStream {
            writer: SubStreamWriter {
                name: name.to_string(),
                mux: self.clone(),
            },
            inbound: rx,
        })
    }

    /// Create a sub-stream that is only ever written to.
    pub fn create_outbound(&self, name: &str) -> Result<SubStreamWriter, CoreError> {
        self.claim(name)?;
        debug!("Created outbound sub-stream {}/{}", self.inner.name, name);
        Ok(SubStreamWriter {
            name: name.to_string(),
            mux: self.clone(),
        })
    }

    /// Deliver one inbound physical frame to its sub-stream. Unknown or
    /// malformed frames are logged and dropped.
    pub fn route(&self, frame: Value) {
        let (name, data) = match frame {
            Value::Object(mut fields) => match (fields.remove("name"), fields.remove("data")) {
                (Some(Value::String(name)), Some(data)) => (name, data),
                _ => {
                    warn!("Dropping malformed frame on {}", self.inner.name);
                    return;
                }
            },
            _ => {
                warn!("Dropping non-object frame on {}", self.inner.name);
                return;
            }
        };

        let state = match self.state() {
            Ok(state) => state,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        if state.closed.is_some() {
            debug!("Ignoring frame for {}/{}: channel closed", self.inner.name, name);
            return;
        }
        match state.routes.get(&name) {
            Some(route) => {
                if route.unbounded_send(data).is_err() {
                    warn!("Sub-stream {}/{} has no reader; frame dropped", self.inner.name, name);
                }
            }
            None => warn!("No inbound sub-stream `{}` on {}; frame dropped", name, self.inner.name),
        }
    }

    /// Mark the physical connection as lost. Terminal: readers see end of
    /// stream and every later write fails.
    pub fn fail(&self, reason: &str) {
        error!("Physical channel {} failed: {}", self.inner.name, reason);
        if let Ok(mut state) = self.state() {
            if state.closed.is_none() {
                state.closed = Some(reason.to_string());
            }
            state.routes.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state().map(|state| state.closed.is_some()).unwrap_or(true)
    }

    fn write(&self, name: &str, data: Value) -> Result<(), CoreError> {
        if let Some(reason) = &self.state()?.closed {
            return Err(CoreError::ChannelClosed(format!("{} ({})", self.inner.name, reason)));
        }
        let frame = json!({ "name": name, "data": data });
        self.inner.port.post(frame).map_err(|e| {
            self.fail(&e.to_string());
            e
        })
    }
}

/// Writing half of a sub-stream.
#[derive(Clone)]
pub struct SubStreamWriter {
    name: String,
    mux: Multiplex,
}

impl SubStreamWriter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn write(&self, data: Value) -> Result<(), CoreError> {
        self.mux.write(&self.name, data)
    }
}

/// Duplex sub-stream: ordered inbound payloads plus a writer.
pub struct SubStream {
    writer: SubStreamWriter,
    inbound: UnboundedReceiver<Value>,
}

impl SubStream {
    pub fn writer(&self) -> SubStreamWriter {
        self.writer.clone()
    }

    pub fn write(&self, data: Value) -> Result<(), CoreError> {
        self.writer.write(data)
    }

    pub async fn next(&mut self) -> Option<Value> {
        self.inbound.next().await
    }

    pub fn into_parts(self) -> (SubStreamWriter, UnboundedReceiver<Value>) {
        (self.writer, self.inbound)
    }
}

/// Unwrap a physical envelope `{ target, data }` received from `origin`.
/// Returns the inner frame only when it is addressed to `local` and, unless
/// `target_origin` is `"*"`, was sent from that origin.
pub fn accept_envelope(local: &str, target_origin: &str, origin: &str, envelope: Value) -> Option<Value> {
    if !origin_allowed(target_origin, origin) {
        debug!("Dropping envelope for {} from unexpected origin {}", local, origin);
        return None;
    }
    match envelope {
        Value::Object(mut fields) => {
            if fields.get("target").and_then(Value::as_str) != Some(local) {
                return None;
            }
            fields.remove("data")
        }
        _ => None,
    }
}

fn origin_allowed(target_origin: &str, origin: &str) -> bool {
    if target_origin == "*" {
        return true;
    }
    match Url::parse(target_origin) {
        Ok(url) => url.origin().is_tuple() && url.origin().ascii_serialization() == origin,
        Err(_) => false,
    }
}

/// In-process port: every posted frame lands on the paired receiver.
/// Used by the native harness and in tests.
#[derive(Clone)]
pub struct MemoryPort {
    tx: UnboundedSender<Value>,
}

impl MemoryPort {
    pub fn channel() -> (Self, UnboundedReceiver<Value>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl FramePort for MemoryPort {
    fn post(&self, frame: Value) -> Result<(), CoreError> {
        self.tx
            .unbounded_send(frame)
            .map_err(|_| CoreError::Channel("memory port receiver dropped".to_string()))
    }
}
