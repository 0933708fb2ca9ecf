//! Hooks for intercepting requests and responses.

mod chain;
mod traits;

pub use chain::HookChain;
pub use traits::{FnHook, OutgoingRequest, RequestHook, ResponseInfo};
