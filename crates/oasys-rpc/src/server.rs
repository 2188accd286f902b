// oasys-rpc/src/server.rs
use crate::{RpcError, RpcErrorResponse, RpcMethods, RpcRequest, RpcResponse, RpcResult};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub listen_addr: SocketAddr,
    pub cors_origins: Vec<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8545".parse().unwrap(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

pub struct RpcServer {
    config: RpcConfig,
    methods: Arc<RpcMethods>,
}

impl RpcServer {
    pub fn new(config: RpcConfig, methods: RpcMethods) -> Self {
        Self {
            config,
            methods: Arc::new(methods),
        }
    }

    pub async fn start(self: Arc<Self>) -> RpcResult<()> {
        tracing::info!("Starting RPC server on {}", self.config.listen_addr);

        let shared = self.clone();
        let make_svc = make_service_fn(move |_| {
            let server = shared.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                }))
            }
        });

        let server = Server::bind(&self.config.listen_addr).serve(make_svc);

        tracing::info!("RPC server listening on {}", self.config.listen_addr);

        server
            .await
            .map_err(|e| RpcError::ServerError(e.to_string()))?;

        Ok(())
    }

    async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
        let response_builder = Response::builder()
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type");

        if req.method() == Method::OPTIONS {
            return Ok(response_builder
                .status(StatusCode::OK)
                .body(Body::empty())
                .unwrap());
        }

        if req.method() != Method::POST {
            return Ok(response_builder
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .body(Body::from("Method not allowed"))
                .unwrap());
        }

        let body_bytes = hyper::body::to_bytes(req.into_body()).await?;

        let rpc_request: RpcRequest = match serde_json::from_slice(&body_bytes) {
            Ok(req) => req,
            Err(_) => {
                let error_response = RpcResponse {
                    jsonrpc: "2.0".to_string(),
                    result: None,
                    error: Some(RpcErrorResponse {
                        code: -32700,
                        message: "Parse error".to_string(),
                        data: None,
                    }),
                    id: serde_json::Value::Null,
                };
                let json = serde_json::to_string(&error_response).unwrap();
                return Ok(response_builder
                    .status(StatusCode::OK)
                    .body(Body::from(json))
                    .unwrap());
            }
        };

        let response = self.process_request(rpc_request).await;
        let json = serde_json::to_string(&response).unwrap();

        Ok(response_builder
            .status(StatusCode::OK)
            .body(Body::from(json))
            .unwrap())
    }

    async fn process_request(&self, request: RpcRequest) -> RpcResponse {
        match self
            .methods
            .handle(&request.method, request.params.clone())
            .await
        {
            Ok(result) => RpcResponse {
                jsonrpc: "2.0".to_string(),
                result: Some(result),
                error: None,
                id: request.id,
            },
            Err(error) => RpcResponse {
                jsonrpc: "2.0".to_string(),
                result: None,
                error: Some(RpcErrorResponse {
                    code: error.code(),
                    message: error.to_string(),
                    data: None,
                }),
                id: request.id,
            },
        }
    }
}
