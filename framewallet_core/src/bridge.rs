//! Transport bridge between the embedding page and the wallet frame.
//!
//! Two physical channels, each a [`Multiplex`]:
//!
//! * provider: `provider` (JSON-RPC loop) and `publicConfig` (one-way push)
//! * comm: `oauth` (inbound trigger) plus the outbound announcement streams
//!
//! The provider loop parses and transforms frames strictly in arrival order,
//! then lets the engine work on several requests at once so an
//! `eth_sendTransaction` parked for approval does not hold up later calls.

use std::sync::{Arc, Mutex};

use futures::stream::FuturesUnordered;
use futures::{select, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::comm::{CommChannel, OAUTH_STREAM};
use crate::engine::{ExecutionProvider, RpcEngine};
use crate::error::CoreError;
use crate::middleware::{FilterMiddleware, LoggerMiddleware, OriginMiddleware, ProviderMiddleware};
use crate::mux::{Multiplex, SubStream, SubStreamWriter};
use crate::rpc::{RpcError, RpcRequest, RpcResponse};
use crate::transform::PayloadTransform;

pub const PROVIDER_STREAM: &str = "provider";
pub const PUBLIC_CONFIG_STREAM: &str = "publicConfig";

/// Both physical channels plus what is known about the embedder. Built once
/// at startup and handed to everything that writes to the embedder.
pub struct BridgeContext {
    pub provider: Multiplex,
    pub comm: Multiplex,
    /// URL of the embedding page.
    pub referrer: String,
}

impl BridgeContext {
    pub fn new(provider: Multiplex, comm: Multiplex, referrer: impl Into<String>) -> Self {
        Self {
            provider,
            comm,
            referrer: referrer.into(),
        }
    }

    /// Origin of the embedding page, or the raw referrer if it is not a URL.
    pub fn origin(&self) -> String {
        match Url::parse(&self.referrer) {
            Ok(url) if url.origin().is_tuple() => url.origin().ascii_serialization(),
            _ => self.referrer.clone(),
        }
    }
}

/// Origin tagging, logging, filter translation, then the provider.
pub fn build_engine(origin: impl Into<String>, provider: Arc<dyn ExecutionProvider>) -> RpcEngine {
    RpcEngine::new()
        .with(OriginMiddleware::new(origin))
        .with(LoggerMiddleware)
        .with(FilterMiddleware::new(provider.clone()))
        .with(ProviderMiddleware::new(provider))
}

/// Values the embedder needs before its first RPC call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicConfig {
    pub selected_address: Option<String>,
    pub network_version: Option<String>,
}

/// Pushes public config changes down the `publicConfig` sub-stream. Each
/// changed field goes out as its own JSON-stringified object.
#[derive(Clone)]
pub struct PublicConfigPublisher {
    writer: SubStreamWriter,
    current: Arc<Mutex<PublicConfig>>,
}

impl PublicConfigPublisher {
    fn new(writer: SubStreamWriter) -> Self {
        Self {
            writer,
            current: Arc::new(Mutex::new(PublicConfig::default())),
        }
    }

    /// Record `next` and push whatever differs from the last value. Returns
    /// the number of frames written.
    pub fn update(&self, next: PublicConfig) -> Result<usize, CoreError> {
        let changes = {
            let mut current = self.current.lock().map_err(|_| CoreError::Poisoned("public config"))?;
            let mut changes = Vec::new();
            if next.selected_address != current.selected_address {
                changes.push(json!({ "selectedAddress": next.selected_address }));
            }
            if next.network_version != current.network_version {
                changes.push(json!({ "networkVersion": next.network_version }));
            }
            *current = next;
            changes
        };
        for change in &changes {
            self.writer.write(Value::String(change.to_string()))?;
        }
        Ok(changes.len())
    }

    /// Push every known field regardless of change.
    pub fn push_current(&self) -> Result<(), CoreError> {
        let current = self
            .current
            .lock()
            .map_err(|_| CoreError::Poisoned("public config"))?
            .clone();
        if let Some(address) = &current.selected_address {
            self.writer
                .write(Value::String(json!({ "selectedAddress": address }).to_string()))?;
        }
        if let Some(version) = &current.network_version {
            self.writer
                .write(Value::String(json!({ "networkVersion": version }).to_string()))?;
        }
        Ok(())
    }

    pub fn current(&self) -> PublicConfig {
        self.current.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Reacts to an OAuth trigger from the embedder.
pub trait OAuthHandler {
    fn trigger(&self, payload: &Value) -> Result<(), CoreError>;
}

pub struct TransportBridge {
    engine: RpcEngine,
    transform: PayloadTransform,
    provider_stream: SubStream,
    oauth_stream: SubStream,
    public_config: PublicConfigPublisher,
    comm: CommChannel,
}

impl TransportBridge {
    pub fn new(context: &BridgeContext, provider: Arc<dyn ExecutionProvider>) -> Result<Self, CoreError> {
        let provider_stream = context.provider.create_stream(PROVIDER_STREAM)?;
        let public_config = PublicConfigPublisher::new(context.provider.create_outbound(PUBLIC_CONFIG_STREAM)?);
        let oauth_stream = context.comm.create_stream(OAUTH_STREAM)?;
        let comm = CommChannel::open(&context.comm)?;

        let engine = build_engine(context.origin(), provider);
        info!(
            "Bridge ready for {} (middleware: {})",
            context.origin(),
            engine.middleware_names().join(" -> ")
        );

        Ok(Self {
            engine,
            transform: PayloadTransform::new(comm.clone(), context.referrer.clone()),
            provider_stream,
            oauth_stream,
            public_config,
            comm,
        })
    }

    /// Writer for comm announcements, shared with the coordinator.
    pub fn comm(&self) -> CommChannel {
        self.comm.clone()
    }

    pub fn public_config(&self) -> PublicConfigPublisher {
        self.public_config.clone()
    }

    /// Serve both channels until they close.
    pub async fn run(self, oauth: impl OAuthHandler) {
        let TransportBridge {
            engine,
            transform,
            provider_stream,
            oauth_stream,
            public_config,
            ..
        } = self;

        if let Err(e) = public_config.push_current() {
            warn!("Initial public config push failed: {}", e);
        }

        futures::join!(
            serve_provider(&engine, &transform, provider_stream),
            serve_oauth(oauth_stream, oauth)
        );
        info!("Bridge stopped");
    }
}

async fn serve_provider(engine: &RpcEngine, transform: &PayloadTransform, stream: SubStream) {
    let (writer, inbound) = stream.into_parts();
    let mut inbound = inbound.fuse();
    let mut in_flight = FuturesUnordered::new();

    loop {
        select! {
            frame = inbound.next() => match frame {
                Some(frame) => {
                    if let Some(request) = intake(&writer, frame) {
                        in_flight.push(engine.handle(transform.apply(request)));
                    }
                }
                None => break,
            },
            response = in_flight.select_next_some() => respond(&writer, response),
        }
    }

    debug!("Provider stream ended; finishing {} in-flight requests", in_flight.len());
    while let Some(response) = in_flight.next().await {
        respond(&writer, response);
    }
}

/// Validate one inbound frame. A malformed frame that still carries an id is
/// answered with an error; otherwise it is only logged.
fn intake(writer: &SubStreamWriter, frame: Value) -> Option<RpcRequest> {
    let hint = RpcRequest::id_hint(&frame);
    match RpcRequest::from_value(frame) {
        Ok(request) => Some(request),
        Err(e) => {
            warn!("Rejected RPC frame: {}", e);
            if let Some(id) = hint {
                respond(writer, RpcResponse::failure(id, RpcError::from(e)));
            }
            None
        }
    }
}

fn respond(writer: &SubStreamWriter, response: RpcResponse) {
    let id = response.id.clone();
    match serde_json::to_value(&response) {
        Ok(frame) => {
            if let Err(e) = writer.write(frame) {
                error!("Failed to write response {}: {}", id, e);
            }
        }
        Err(e) => error!("Failed to encode response {}: {}", id, e),
    }
}

async fn serve_oauth(stream: SubStream, handler: impl OAuthHandler) {
    let (_, mut inbound) = stream.into_parts();
    while let Some(payload) = inbound.next().await {
        debug!("OAuth trigger received");
        if let Err(e) = handler.trigger(&payload) {
            warn!("OAuth trigger failed: {}", e);
        }
    }
}
