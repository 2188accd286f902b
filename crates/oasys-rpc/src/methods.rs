// oasys-rpc/src/methods.rs
use crate::{BlockId, RpcError, RpcResult};
use oasys_consensus::OasysApi;
use oasys_crypto::Hash;

pub struct RpcMethods {
    api: OasysApi,
}

impl RpcMethods {
    pub fn new(api: OasysApi) -> Self {
        Self { api }
    }

    pub async fn handle(&self, method: &str, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        match method {
            "oasys_getSnapshot" => self.oasys_get_snapshot(params).await,
            "oasys_getSnapshotAtHash" => self.oasys_get_snapshot_at_hash(params).await,
            "oasys_getValidators" => self.oasys_get_validators(params).await,
            "oasys_getValidatorsAtHash" => self.oasys_get_validators_at_hash(params).await,
            _ => Err(RpcError::MethodNotFound(method.to_string())),
        }
    }

    // ==================== OASYS NAMESPACE ====================

    async fn oasys_get_snapshot(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let number = parse_block_number(&params)?;
        let snapshot = self
            .api
            .get_snapshot(number)
            .map_err(map_engine_error)?;
        Ok(serde_json::to_value(snapshot).unwrap())
    }

    async fn oasys_get_snapshot_at_hash(
        &self,
        params: serde_json::Value,
    ) -> RpcResult<serde_json::Value> {
        let hash = parse_hash(&params)?;
        let snapshot = self
            .api
            .get_snapshot_at_hash(hash)
            .map_err(map_engine_error)?;
        Ok(serde_json::to_value(snapshot).unwrap())
    }

    async fn oasys_get_validators(
        &self,
        params: serde_json::Value,
    ) -> RpcResult<serde_json::Value> {
        let number = parse_block_number(&params)?;
        let validators = self
            .api
            .get_validators(number)
            .map_err(map_engine_error)?;
        Ok(serde_json::to_value(validators).unwrap())
    }

    async fn oasys_get_validators_at_hash(
        &self,
        params: serde_json::Value,
    ) -> RpcResult<serde_json::Value> {
        let hash = parse_hash(&params)?;
        let validators = self
            .api
            .get_validators_at_hash(hash)
            .map_err(map_engine_error)?;
        Ok(serde_json::to_value(validators).unwrap())
    }
}

fn map_engine_error(e: oasys_consensus::EngineError) -> RpcError {
    match e {
        oasys_consensus::EngineError::UnknownBlock => RpcError::BlockNotFound,
        other => RpcError::InternalError(other.to_string()),
    }
}

fn parse_block_number(params: &serde_json::Value) -> RpcResult<Option<u64>> {
    let params: Vec<BlockId> = match params {
        serde_json::Value::Null => Vec::new(),
        other => serde_json::from_value(other.clone())
            .map_err(|_| RpcError::InvalidParams("expected block id array".into()))?,
    };
    match params.into_iter().next() {
        None => Ok(None),
        Some(BlockId::Number(number)) => Ok(Some(number)),
        Some(BlockId::Tag(tag)) if tag == "latest" => Ok(None),
        Some(BlockId::Tag(tag)) => Err(RpcError::InvalidParams(format!("unknown tag {tag}"))),
        Some(BlockId::Hash(_)) => Err(RpcError::InvalidParams(
            "hash given to a number method".into(),
        )),
    }
}

fn parse_hash(params: &serde_json::Value) -> RpcResult<Hash> {
    let params: Vec<String> = serde_json::from_value(params.clone())
        .map_err(|_| RpcError::InvalidParams("expected array".into()))?;
    let first = params
        .first()
        .ok_or_else(|| RpcError::InvalidParams("expected block hash".into()))?;
    Hash::from_hex(first).map_err(|_| RpcError::InvalidParams("invalid hash".into()))
}
