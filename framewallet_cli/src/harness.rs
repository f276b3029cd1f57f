// In-process stand-ins for the embedder and the execution layer

use async_trait::async_trait;
use framewallet_core::{ExecutionProvider, OAuthHandler, CoreError, RpcRequest, RpcResult};
use log::info;
use serde_json::{json, Value};

/// Answers chain-state queries with fixed values and echoes everything
/// else back, so replays show what reached the execution layer.
pub struct EchoProvider {
    pub block_number: u64,
}

#[async_trait(?Send)]
impl ExecutionProvider for EchoProvider {
    async fn request(&self, request: &RpcRequest) -> RpcResult {
        Ok(match request.method.as_str() {
            "eth_blockNumber" => json!(format!("0x{:x}", self.block_number)),
            "eth_chainId" => json!("0x1"),
            "net_version" => json!("1"),
            "eth_getLogs" => json!([]),
            "eth_getBlockByNumber" => json!({ "number": request.params.first(), "hash": Value::Null }),
            _ => json!({
                "method": request.method,
                "params": request.params,
                "origin": request.origin(),
            }),
        })
    }
}

pub struct LoggingOAuth;

impl OAuthHandler for LoggingOAuth {
    fn trigger(&self, payload: &Value) -> Result<(), CoreError> {
        info!("OAuth trigger: {}", payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framewallet_core::RpcId;

    #[tokio::test]
    async fn echoes_unknown_methods_with_origin() {
        let provider = EchoProvider { block_number: 16 };
        let mut request = RpcRequest::new(RpcId::Number(1), "eth_getBalance", vec![json!("0xa")]);
        request.extra.insert("origin".into(), json!("https://dapp.example"));

        let echoed = provider.request(&request).await.unwrap();
        assert_eq!(echoed["params"], json!(["0xa"]));
        assert_eq!(echoed["origin"], json!("https://dapp.example"));

        let block = provider
            .request(&RpcRequest::new(RpcId::Number(2), "eth_blockNumber", vec![]))
            .await
            .unwrap();
        assert_eq!(block, json!("0x10"));
    }
}
