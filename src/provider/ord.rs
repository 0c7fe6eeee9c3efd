use bitcoin::OutPoint;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;

use super::{UtxoAssets, UtxoClassifier};
use crate::{MintError, MintResult};

/// Client for an `ord` server's JSON API.
#[derive(Debug, Clone)]
pub struct OrdClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OutputJson {
    #[serde(default)]
    inscriptions: Option<Vec<String>>,
    #[serde(default)]
    runes: Option<Value>,
}

impl OrdClient {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
        }
    }
}

impl From<OutputJson> for UtxoAssets {
    fn from(output: OutputJson) -> Self {
        UtxoAssets {
            inscriptions: output.inscriptions.unwrap_or_default(),
            runes: rune_names(output.runes),
        }
    }
}

/// Rune balances are keyed by name in current servers and listed as
/// `[name, balance]` pairs in older ones.
fn rune_names(runes: Option<Value>) -> Vec<String> {
    match runes {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(name) => Some(name),
                Value::Array(pair) => pair.first().and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether a lookup found the output; `false` when the server has not
/// indexed it yet.
fn check_output_status(status: StatusCode, body: &str) -> MintResult<bool> {
    if status.is_success() {
        Ok(true)
    } else if status == StatusCode::NOT_FOUND {
        Ok(false)
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(MintError::Network(format!("{status}: {body}")))
    } else {
        Err(MintError::OperationFailed(format!(
            "ord output lookup {status}: {body}"
        )))
    }
}

#[async_trait::async_trait]
impl UtxoClassifier for OrdClient {
    async fn assets(&self, outpoint: &OutPoint) -> MintResult<Option<UtxoAssets>> {
        let url = format!("{}/output/{outpoint}", self.base_url);
        debug!("GET {url}");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            check_output_status(status, &body)?;
            debug!("{outpoint} is not indexed yet");
            return Ok(None);
        }

        let output: OutputJson = response.json().await?;
        Ok(Some(output.into()))
    }
}
