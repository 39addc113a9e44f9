//! JSON-RPC 2.0 clients and servers over HTTP, TCP and stdio
//!
//! All three transports share one message model and one dispatch table, so a
//! method registered once behaves identically whichever way it is reached.

pub mod api;
pub mod calculator;
pub mod config;
pub mod errors;
pub mod http;
mod lines;
pub mod logging;
pub mod protocol;
pub mod stdio;
pub mod tcp;

pub use api::{Client, Server};
pub use errors::{HttpError, MessageError, TransportError};
pub use http::{HttpClient, HttpServer};
pub use protocol::{
    CallContext, Dispatcher, ErrorCode, ErrorObject, Handler, Id, Reply, Request,
    Response, JSONRPC_VERSION,
};
pub use stdio::{StdioClient, StdioServer};
pub use tcp::{TcpClient, TcpServer};
