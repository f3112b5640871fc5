use async_trait::async_trait;
use payout_models::ChainType;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use snafu::ResultExt;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{HttpSnafu, InvalidGatewayUrlSnafu};
use crate::tron::{BroadcastResponse, TronGateway, TronTransaction};
use crate::{Error, Result};

pub const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

#[derive(Debug, Deserialize)]
struct CallResult {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    result: CallResult,
    #[serde(default)]
    transaction: Option<TronTransaction>,
    #[serde(default)]
    constant_result: Vec<String>,
}

impl TriggerResponse {
    fn ensure_ok(self, method: &str) -> Result<Self> {
        if self.result.result {
            return Ok(self);
        }
        let reason = BroadcastResponse {
            message: self.result.message.clone(),
            ..Default::default()
        }
        .reason();
        Err(Error::GatewayResponse {
            method: method.to_string(),
            message: format!("{} {reason}", self.result.code.unwrap_or_default()),
        })
    }
}

/// Client for the full node HTTP API (`/wallet/*`), authenticated with a TronGrid API key.
#[derive(Clone)]
pub struct TronHttpGateway {
    base: Url,
    http: Client,
}

impl TronHttpGateway {
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::MissingApiKey {
                chain: ChainType::Tron,
            })?;
        let mut base = Url::parse(url).context(InvalidGatewayUrlSnafu { url })?;
        // endpoint paths are joined relative to the base, which drops a last segment without `/`
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(api_key).map_err(|_| Error::MissingApiKey {
                chain: ChainType::Tron,
            })?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context(HttpSnafu)?;
        Ok(Self { base, http })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let url = self.base.join(path).context(InvalidGatewayUrlSnafu { url: path })?;
        debug!(%url, "tron request");

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .context(HttpSnafu)?;

        let status = resp.status();
        let bytes = resp.bytes().await.context(HttpSnafu)?;
        decode_response(path, status, &bytes)
    }
}

/// Decode a node response; the node reports most failures as `{"Error": "..."}` with status 200.
fn decode_response<T: DeserializeOwned>(path: &str, status: StatusCode, bytes: &[u8]) -> Result<T> {
    let body = || String::from_utf8_lossy(bytes).to_string();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status,
            body: body(),
        });
    }

    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|source| Error::Decode {
        source,
        body: body(),
    })?;
    if let Some(error) = value.get("Error") {
        return Err(Error::GatewayResponse {
            method: path.to_string(),
            message: error.as_str().map_or_else(|| error.to_string(), str::to_string),
        });
    }
    serde_json::from_value(value).map_err(|source| Error::Decode {
        source,
        body: body(),
    })
}

#[async_trait]
impl TronGateway for TronHttpGateway {
    #[instrument(level = "debug", skip(self))]
    async fn create_transfer(&self, owner: &str, to: &str, amount_sun: i64) -> Result<TronTransaction> {
        let body = json!({
            "owner_address": owner,
            "to_address": to,
            "amount": amount_sun,
            "visible": true,
        });
        self.post("wallet/createtransaction", &body).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn token_decimals(&self, owner: &str, contract: &str) -> Result<u8> {
        let body = json!({
            "owner_address": owner,
            "contract_address": contract,
            "function_selector": "decimals()",
            "parameter": "",
            "visible": true,
        });
        let response: TriggerResponse = self.post("wallet/triggerconstantcontract", &body).await?;
        let response = response.ensure_ok("triggerconstantcontract")?;
        parse_decimals(response.constant_result.first().map(String::as_str))
    }

    #[instrument(level = "debug", skip(self))]
    async fn trigger_token_transfer(
        &self,
        owner: &str,
        contract: &str,
        parameter: &str,
        fee_limit: u64,
    ) -> Result<TronTransaction> {
        let body = json!({
            "owner_address": owner,
            "contract_address": contract,
            "function_selector": "transfer(address,uint256)",
            "parameter": parameter,
            "fee_limit": fee_limit,
            "call_value": 0,
            "visible": true,
        });
        let response: TriggerResponse = self.post("wallet/triggersmartcontract", &body).await?;
        response
            .ensure_ok("triggersmartcontract")?
            .transaction
            .ok_or_else(|| Error::GatewayResponse {
                method: "triggersmartcontract".to_string(),
                message: "response carries no transaction".to_string(),
            })
    }

    #[instrument(level = "debug", skip(self, tx), fields(tx_id = %tx.tx_id))]
    async fn broadcast(&self, tx: &TronTransaction) -> Result<BroadcastResponse> {
        self.post("wallet/broadcasttransaction", tx).await
    }
}

fn parse_decimals(word: Option<&str>) -> Result<u8> {
    let invalid = |message: String| Error::GatewayResponse {
        method: "decimals".to_string(),
        message,
    };
    let word = word.ok_or_else(|| invalid("empty constant_result".to_string()))?;
    let digits = word.trim_start_matches('0');
    let value = if digits.is_empty() {
        0
    } else {
        u64::from_str_radix(digits, 16).map_err(|e| invalid(format!("{word}: {e}")))?
    };
    u8::try_from(value).map_err(|_| invalid(format!("{value} decimals")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(matches!(
            TronHttpGateway::new("https://api.trongrid.io", None),
            Err(Error::MissingApiKey { .. })
        ));
        assert!(matches!(
            TronHttpGateway::new("https://api.trongrid.io", Some("  ")),
            Err(Error::MissingApiKey { .. })
        ));
        assert!(TronHttpGateway::new("https://api.trongrid.io", Some("key")).is_ok());
    }

    #[test]
    fn gateway_path_prefix_is_kept() {
        for url in ["https://node.example/tron", "https://node.example/tron/"] {
            let gateway = TronHttpGateway::new(url, Some("key")).unwrap();
            assert_eq!(
                gateway.base.join("wallet/createtransaction").unwrap().as_str(),
                "https://node.example/tron/wallet/createtransaction"
            );
        }
        let gateway = TronHttpGateway::new("https://api.trongrid.io", Some("key")).unwrap();
        assert_eq!(
            gateway.base.join("wallet/broadcasttransaction").unwrap().as_str(),
            "https://api.trongrid.io/wallet/broadcasttransaction"
        );
    }

    #[test]
    fn node_error_field_is_reported() {
        let err = decode_response::<TronTransaction>(
            "wallet/createtransaction",
            StatusCode::OK,
            br#"{"Error":"class org.tron.core.exception.ContractValidateException : Validate TransferContract error, balance is not sufficient."}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::GatewayResponse { message, .. } if message.contains("balance is not sufficient")));
    }

    #[test]
    fn decodes_transaction_envelope() {
        let tx: TronTransaction = decode_response(
            "wallet/createtransaction",
            StatusCode::OK,
            br#"{"visible":true,"txID":"ab12","raw_data":{"expiration":1},"raw_data_hex":"0a02"}"#,
        )
        .unwrap();
        assert_eq!(tx.tx_id, "ab12");
        assert!(tx.signature.is_empty());
        assert!(tx.visible);
    }

    #[test]
    fn decodes_broadcast_result() {
        let ok: BroadcastResponse = decode_response(
            "wallet/broadcasttransaction",
            StatusCode::OK,
            br#"{"result":true,"code":"SUCCESS","txid":"ab12"}"#,
        )
        .unwrap();
        assert!(ok.is_success());

        let failed: BroadcastResponse = decode_response(
            "wallet/broadcasttransaction",
            StatusCode::OK,
            br#"{"code":"SIGERROR","txid":"ab12","message":"76616c6964617465207369676e6174757265206572726f72"}"#,
        )
        .unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.reason(), "validate signature error");
    }

    #[test]
    fn failed_trigger_is_an_error() {
        let response: TriggerResponse = serde_json::from_str(
            r#"{"result":{"code":"CONTRACT_VALIDATE_ERROR","message":"636f6e7472616374206e6f7420666f756e64"}}"#,
        )
        .unwrap();
        let err = response.ensure_ok("triggersmartcontract").unwrap_err();
        assert!(err.to_string().contains("contract not found"));
    }

    #[test]
    fn parses_decimals_word() {
        let word = format!("{:0>64}", "06");
        assert_eq!(parse_decimals(Some(&word)).unwrap(), 6);
        assert_eq!(parse_decimals(Some(&"0".repeat(64))).unwrap(), 0);
        assert!(parse_decimals(None).is_err());
    }
}
