// Gazette — Gateway Module
//
// Request layer in front of the escrow store: JSON-RPC 2.0 over a Unix
// domain socket, with HTTP-equivalent status codes on every error.

mod handler;
mod protocol;
mod uds;

pub use handler::process_request;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use uds::UdsServer;
