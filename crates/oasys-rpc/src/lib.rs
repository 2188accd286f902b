// oasys-rpc/src/lib.rs

//! JSON-RPC surface of the consensus engine: the read-only `oasys`
//! namespace (snapshot and validator inspection).

pub mod methods;
pub mod server;
pub mod types;

pub use methods::RpcMethods;
pub use server::{RpcConfig, RpcServer};
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Parse error")]
    ParseError,
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Block not found")]
    BlockNotFound,
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::ParseError => -32700,
            RpcError::InvalidRequest => -32600,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
            RpcError::InternalError(_) => -32603,
            RpcError::ServerError(_) => -32000,
            RpcError::BlockNotFound => -32001,
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
