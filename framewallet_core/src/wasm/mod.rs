// WASM-specific implementations
pub mod port;
pub mod storage_impl;
pub mod utils;

// Re-exports
pub use port::*;
pub use storage_impl::*;
pub use utils::*;
