//! Data-provider HTTP client
//!
//! The tabular provider exposes one POST endpoint taking
//! `{api_name, token, params, fields}` and returning columnar
//! `{fields: [...], items: [[...]]}` payloads. This token requires the
//! provider's internal proxy tunnel, so the client honors an explicit
//! proxy URL from configuration.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<ProviderData>,
}

#[derive(Debug, Deserialize)]
struct ProviderData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl ProviderClient {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30));

        if let Some(proxy) = &config.provider_proxy {
            debug!(proxy = %proxy, "Routing data provider through proxy tunnel");
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            token: config.provider_token.clone(),
        })
    }

    /// Call one provider API and decode the columnar payload into row maps.
    pub async fn query(
        &self,
        api_name: &str,
        params: Value,
        fields: &str,
    ) -> Result<Vec<Map<String, Value>>> {
        if self.token.is_empty() {
            return Err(AgentError::ProviderError(
                "TUSHARE_TOKEN is not configured".to_string(),
            ));
        }

        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AgentError::ProviderError(format!("request failed for {}: {}", api_name, e))
            })?;

        let status = response.status();
        let payload: ProviderResponse = response.json().await.map_err(|e| {
            AgentError::ProviderError(format!("invalid JSON from {}: {}", api_name, e))
        })?;

        if !status.is_success() || payload.code != 0 {
            let detail = payload.msg.unwrap_or_else(|| format!("HTTP {}", status));
            warn!(api = api_name, %detail, "Data provider rejected query");
            return Err(AgentError::ProviderError(format!(
                "{} failed: {}",
                api_name, detail
            )));
        }

        let Some(data) = payload.data else {
            return Ok(Vec::new());
        };

        let rows = data
            .items
            .into_iter()
            .map(|item| {
                data.fields
                    .iter()
                    .cloned()
                    .zip(item.into_iter())
                    .collect::<Map<String, Value>>()
            })
            .collect();

        Ok(rows)
    }
}

/// Normalize a date argument to the provider's `YYYYMMDD` form.
pub fn normalize_date(date: &str) -> String {
    date.replace('-', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2025-01-31"), "20250131");
        assert_eq!(normalize_date("20250131"), "20250131");
    }

    #[test]
    fn test_columnar_decode() {
        let raw = r#"{
            "code": 0,
            "data": {
                "fields": ["ts_code", "close"],
                "items": [["000001.SZ", 11.52], ["600519.SH", 1688.0]]
            }
        }"#;
        let parsed: ProviderResponse = serde_json::from_str(raw).unwrap();
        let data = parsed.data.unwrap();
        assert_eq!(data.fields, vec!["ts_code", "close"]);
        assert_eq!(data.items.len(), 2);

        let row: Map<String, Value> = data
            .fields
            .iter()
            .cloned()
            .zip(data.items[0].clone().into_iter())
            .collect();
        assert_eq!(row.get("ts_code").and_then(Value::as_str), Some("000001.SZ"));
    }

    #[test]
    fn test_error_payload_decode() {
        let raw = r#"{"code": 40203, "msg": "token invalid"}"#;
        let parsed: ProviderResponse = serde_json::from_str(raw).unwrap();
        assert_ne!(parsed.code, 0);
        assert_eq!(parsed.msg.as_deref(), Some("token invalid"));
    }
}
