// Frame Wallet Core Library
// Platform-agnostic request arbitration and embed bridge

pub mod models;
pub mod error;
pub mod queue;
pub mod arbiter;
pub mod coordinator;
pub mod rpc;
pub mod mux;
pub mod comm;
pub mod transform;
pub mod engine;
pub mod middleware;
pub mod bridge;
pub mod settings;
pub mod storage_trait;

#[cfg(feature = "native")]
pub mod native;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use models::*;
pub use queue::{QueueSnapshot, RequestQueue, SharedQueue};
pub use arbiter::{is_transaction_selected, select_latest, SelectedPayload, SelectedRequest};
pub use coordinator::{
    ApprovalParams, ApprovalSurface, ConfirmationCoordinator, ConfirmationDescriptor, ExecutionController,
    Presentation, UserContext,
};
pub use rpc::{ErrorCode, RpcError, RpcId, RpcOutcome, RpcRequest, RpcResponse};
pub use mux::{FramePort, MemoryPort, Multiplex};
pub use comm::{Announcement, CommChannel};
pub use transform::PayloadTransform;
pub use engine::{ExecutionProvider, RpcEngine, RpcResult};
pub use bridge::{BridgeContext, OAuthHandler, PublicConfig, PublicConfigPublisher, TransportBridge};
pub use settings::{BridgeSettings, ChannelNames};
pub use storage_trait::*;
