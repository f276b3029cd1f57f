// Middleware making up the bridge's RPC chain:
// origin tagging -> logging -> event-filter translation -> provider dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Map, Value};

use crate::engine::{ExecutionProvider, Flow, Middleware, RpcResult};
use crate::rpc::{RpcError, RpcRequest};

/// Stamps every request with the embedder's origin, overwriting whatever the
/// page itself claimed.
pub struct OriginMiddleware {
    origin: String,
}

impl OriginMiddleware {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into() }
    }
}

#[async_trait(?Send)]
impl Middleware for OriginMiddleware {
    fn name(&self) -> &'static str {
        "origin"
    }

    async fn handle(&self, request: &mut RpcRequest) -> Flow {
        request.extra.insert("origin".into(), Value::String(self.origin.clone()));
        Flow::Next
    }
}

pub struct LoggerMiddleware;

#[async_trait(?Send)]
impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "logger"
    }

    async fn handle(&self, request: &mut RpcRequest) -> Flow {
        debug!(
            "RPC request {} {} from {}",
            request.id,
            request.method,
            request.origin().unwrap_or("<unknown>")
        );
        Flow::Next
    }

    fn on_response(&self, request: &RpcRequest, result: &RpcResult) {
        match result {
            Ok(_) => debug!("RPC response {} {} ok", request.id, request.method),
            Err(e) => warn!("RPC response {} {} failed: {}", request.id, request.method, e),
        }
    }
}

/// Forwards everything that reaches it to the execution provider.
pub struct ProviderMiddleware {
    provider: Arc<dyn ExecutionProvider>,
}

impl ProviderMiddleware {
    pub fn new(provider: Arc<dyn ExecutionProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait(?Send)]
impl Middleware for ProviderMiddleware {
    fn name(&self) -> &'static str {
        "provider"
    }

    async fn handle(&self, request: &mut RpcRequest) -> Flow {
        Flow::Respond(self.provider.request(request).await)
    }
}

#[derive(Debug, Clone)]
enum Filter {
    Log { criteria: Map<String, Value>, last_block: u64 },
    Block { last_block: u64 },
}

impl Filter {
    fn last_block_mut(&mut self) -> &mut u64 {
        match self {
            Filter::Log { last_block, .. } | Filter::Block { last_block } => last_block,
        }
    }

    /// Reserve the blocks after `last_block` up to `current` (at most
    /// `span` of them for block filters) and advance past them. Overlapping
    /// polls of one filter therefore never see the same range twice.
    fn claim(&mut self, current: u64) -> Option<(u64, u64)> {
        let span = match self {
            Filter::Log { .. } => None,
            Filter::Block { .. } => Some(MAX_BLOCK_SPAN),
        };
        let last_block = self.last_block_mut();
        if current <= *last_block {
            return None;
        }
        let from = last_block.saturating_add(1);
        let to = match span {
            Some(span) => current.min(from.saturating_add(span - 1)),
            None => current,
        };
        *last_block = to;
        Some((from, to))
    }

    /// Hand back a claimed range whose query failed, unless a later poll
    /// has already moved past it.
    fn release(&mut self, from: u64, to: u64) {
        let last_block = self.last_block_mut();
        if *last_block == to {
            *last_block = from - 1;
        }
    }
}

/// Most block hashes returned by one `eth_getFilterChanges` on a block filter.
const MAX_BLOCK_SPAN: u64 = 64;
/// Most filters one embedder may hold installed at a time.
const MAX_FILTERS: usize = 256;

#[derive(Default)]
struct FilterState {
    next_id: u64,
    filters: HashMap<String, Filter>,
}

/// Serves the `eth_*Filter*` family locally by polling the provider with
/// `eth_blockNumber`, `eth_getLogs` and `eth_getBlockByNumber`.
pub struct FilterMiddleware {
    provider: Arc<dyn ExecutionProvider>,
    state: Mutex<FilterState>,
}

impl FilterMiddleware {
    pub fn new(provider: Arc<dyn ExecutionProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(FilterState::default()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FilterState) -> T) -> Result<T, RpcError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RpcError::internal_error("filter state lock poisoned"))?;
        Ok(f(&mut state))
    }

    async fn call(&self, origin: &RpcRequest, method: &str, params: Vec<Value>) -> RpcResult {
        let mut sub = RpcRequest::new(origin.id.clone(), method, params);
        sub.extra = origin.extra.clone();
        self.provider.request(&sub).await
    }

    async fn block_number(&self, request: &RpcRequest) -> Result<u64, RpcError> {
        let value = self.call(request, "eth_blockNumber", Vec::new()).await?;
        value
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| RpcError::internal_error(format!("unexpected eth_blockNumber result: {}", value)))
    }

    async fn install(&self, request: &RpcRequest, criteria: Option<Map<String, Value>>) -> RpcResult {
        let last_block = self.block_number(request).await?;
        let filter = match criteria {
            Some(criteria) => Filter::Log { criteria, last_block },
            None => Filter::Block { last_block },
        };
        let id = self.with_state(|state| {
            if state.filters.len() >= MAX_FILTERS {
                return Err(RpcError::invalid_params(format!(
                    "too many installed filters (max {})",
                    MAX_FILTERS
                )));
            }
            state.next_id += 1;
            let id = format!("0x{:x}", state.next_id);
            state.filters.insert(id.clone(), filter);
            Ok(id)
        })??;
        debug!("Installed filter {} at block {}", id, last_block);
        Ok(Value::String(id))
    }

    fn lookup(&self, id: &str) -> Result<Filter, RpcError> {
        self.with_state(|state| state.filters.get(id).cloned())?
            .ok_or_else(|| RpcError::invalid_params(format!("filter not found: {}", id)))
    }

    async fn changes(&self, request: &RpcRequest, id: &str) -> RpcResult {
        self.lookup(id)?;
        let current = self.block_number(request).await?;
        let claimed = self.with_state(|state| {
            state
                .filters
                .get_mut(id)
                .map(|filter| filter.claim(current).map(|range| (filter.clone(), range)))
        })?;
        let (filter, (from, to)) = match claimed {
            Some(Some(claim)) => claim,
            Some(None) => return Ok(json!([])),
            None => return Err(RpcError::invalid_params(format!("filter not found: {}", id))),
        };

        let changes = self.fetch_range(request, &filter, from, to).await;
        if changes.is_err() {
            self.with_state(|state| {
                if let Some(filter) = state.filters.get_mut(id) {
                    filter.release(from, to);
                }
            })?;
        }
        changes
    }

    async fn fetch_range(&self, request: &RpcRequest, filter: &Filter, from: u64, to: u64) -> RpcResult {
        match filter {
            Filter::Log { criteria, .. } => {
                let mut query = criteria.clone();
                query.insert("fromBlock".into(), json!(format_quantity(from)));
                query.insert("toBlock".into(), json!(format_quantity(to)));
                self.call(request, "eth_getLogs", vec![Value::Object(query)]).await
            }
            Filter::Block { .. } => {
                let mut hashes = Vec::new();
                for number in from..=to {
                    let block = self
                        .call(request, "eth_getBlockByNumber", vec![json!(format_quantity(number)), json!(false)])
                        .await?;
                    if let Some(hash) = block.get("hash") {
                        hashes.push(hash.clone());
                    }
                }
                Ok(Value::Array(hashes))
            }
        }
    }
}

#[async_trait(?Send)]
impl Middleware for FilterMiddleware {
    fn name(&self) -> &'static str {
        "filters"
    }

    async fn handle(&self, request: &mut RpcRequest) -> Flow {
        let filter_id = request.params.first().and_then(Value::as_str).map(str::to_string);
        let result = match request.method.as_str() {
            "eth_newFilter" => match request.params.first() {
                Some(Value::Object(criteria)) => self.install(request, Some(criteria.clone())).await,
                _ => Err(RpcError::invalid_params("eth_newFilter expects a filter object")),
            },
            "eth_newBlockFilter" => self.install(request, None).await,
            "eth_uninstallFilter" => match filter_id {
                Some(id) => self
                    .with_state(|state| state.filters.remove(&id).is_some())
                    .map(Value::Bool),
                None => Err(RpcError::invalid_params("missing filter id")),
            },
            "eth_getFilterChanges" => match filter_id {
                Some(id) => self.changes(request, &id).await,
                None => Err(RpcError::invalid_params("missing filter id")),
            },
            "eth_getFilterLogs" => match filter_id.map(|id| self.lookup(&id)) {
                Some(Ok(Filter::Log { criteria, .. })) => {
                    self.call(request, "eth_getLogs", vec![Value::Object(criteria)]).await
                }
                Some(Ok(Filter::Block { .. })) => Err(RpcError::invalid_params("not a log filter")),
                Some(Err(e)) => Err(e),
                None => Err(RpcError::invalid_params("missing filter id")),
            },
            _ => return Flow::Next,
        };
        Flow::Respond(result)
    }
}

fn parse_quantity(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex.strip_prefix("0x")?, 16).ok()
}

fn format_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}
