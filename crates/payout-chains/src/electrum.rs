use async_trait::async_trait;
use reqwest::{
    header::{HeaderValue, ACCEPT},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, instrument};
use url::Url;

use crate::bitcoin::{ChainInfo, UnspentOutput, UtxoGateway};
use crate::error::{HttpSnafu, InvalidGatewayUrlSnafu};
use crate::{Error, Result};

const REQUEST_ID: &str = "1101";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    id: &'static str,
    params: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Electrum-style JSON-RPC 2.0 gateway (`getaddressunspent`, `getinfo`, `broadcast`).
#[derive(Clone)]
pub struct ElectrumGateway {
    url: Url,
    http: Client,
}

impl ElectrumGateway {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).context(InvalidGatewayUrlSnafu { url })?;
        let http = Client::builder().build().context(HttpSnafu)?;
        Ok(Self { url, http })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<String>) -> Result<T> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            method,
            id: REQUEST_ID,
            params,
        };

        let resp = self
            .http
            .post(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(&body)
            .send()
            .await
            .context(HttpSnafu)?;

        let status = resp.status();
        let bytes = resp.bytes().await.context(HttpSnafu)?;
        decode_response(method, status, &bytes)
    }
}

fn decode_response<T: DeserializeOwned>(method: &str, status: StatusCode, bytes: &[u8]) -> Result<T> {
    let body = || String::from_utf8_lossy(bytes).to_string();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status,
            body: body(),
        });
    }

    let response: RpcResponse<T> =
        serde_json::from_slice(bytes).map_err(|source| Error::Decode {
            source,
            body: body(),
        })?;

    if let Some(error) = response.error.filter(|e| !e.is_null()) {
        return Err(Error::GatewayResponse {
            method: method.to_string(),
            message: error.to_string(),
        });
    }
    response.result.ok_or_else(|| Error::GatewayResponse {
        method: method.to_string(),
        message: "response carries no result".to_string(),
    })
}

#[async_trait]
impl UtxoGateway for ElectrumGateway {
    #[instrument(level = "debug", skip(self))]
    async fn address_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let unspent: Vec<UnspentOutput> = self
            .call("getaddressunspent", vec![address.to_string()])
            .await?;
        debug!(count = unspent.len(), "fetched unspent outputs");
        Ok(unspent)
    }

    #[instrument(level = "debug", skip(self))]
    async fn chain_info(&self) -> Result<ChainInfo> {
        self.call("getinfo", Vec::new()).await
    }

    #[instrument(level = "debug", skip(self, raw_tx_hex))]
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
        self.call("broadcast", vec![raw_tx_hex.to_string()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_unspent_outputs() {
        let body = br#"{"id":"1101","jsonrpc":"2.0","result":[
            {"height":2500000,"tx_hash":"aa","tx_pos":1,"value":150000},
            {"height":0,"tx_hash":"bb","tx_pos":0,"value":20000}
        ]}"#;
        let unspent: Vec<UnspentOutput> =
            decode_response("getaddressunspent", StatusCode::OK, body).unwrap();
        assert_eq!(unspent.len(), 2);
        assert_eq!(unspent[0].tx_pos, 1);
        assert_eq!(unspent[0].value, 150_000);
        assert_eq!(unspent[1].height, 0);
    }

    #[test]
    fn decodes_chain_info_ignoring_extra_fields() {
        let body = br#"{"id":"1101","jsonrpc":"2.0","result":{
            "path":"/root/.electrum","server":"electrum.example","blockchain_height":2500123,
            "server_height":2500123,"spv_nodes":8,"connected":true,"auto_connect":true,
            "version":"4.5.5","default_wallet":"","fee_per_kb":2048}}"#;
        let info: ChainInfo = decode_response("getinfo", StatusCode::OK, body).unwrap();
        assert_eq!(
            info,
            ChainInfo {
                height: 2_500_123,
                fee_per_kb: 2048
            }
        );
    }

    #[test]
    fn rpc_error_is_reported() {
        let body = br#"{"id":"1101","jsonrpc":"2.0","error":{"code":1,"message":"bad-txns-inputs-missingorspent"}}"#;
        let err = decode_response::<String>("broadcast", StatusCode::OK, body).unwrap_err();
        match err {
            Error::GatewayResponse { method, message } => {
                assert_eq!(method, "broadcast");
                assert!(message.contains("missingorspent"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn http_failure_keeps_the_body() {
        let err =
            decode_response::<String>("broadcast", StatusCode::BAD_GATEWAY, b"upstream down").unwrap_err();
        assert!(matches!(err, Error::HttpStatus { body, .. } if body == "upstream down"));
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            ElectrumGateway::new("not a url"),
            Err(Error::InvalidGatewayUrl { .. })
        ));
    }
}
