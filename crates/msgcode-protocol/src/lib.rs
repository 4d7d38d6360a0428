//! Wire framing shared by the Transport Adapter and Session Pool: a
//! newline-delimited JSON line codec, and the JSON-RPC 2.0 envelope the
//! desktop host speaks over the same transport.

pub mod jsonrpc;
pub mod linecodec;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use linecodec::{LineCodec, RpcErrorShape, RpcRequest, RpcResponse};
