//! JSON-RPC 2.0 protocol engine
//!
//! Message values, the call context threaded through handlers and clients, and
//! the dispatch table every transport resolves incoming messages against.

pub mod context;
pub mod dispatch;
pub mod message;

pub use context::CallContext;
pub use dispatch::{Dispatcher, Handler};
pub use message::{ErrorCode, ErrorObject, Id, Reply, Request, Response, JSONRPC_VERSION};
