use std::str::FromStr;

use bitcoin::{Address, Amount, FeeRate, Transaction, Txid};
use reqwest::{Response, StatusCode};

use super::{ChainDataProvider, TxInfo};
use crate::utils::fees::fee_rate_from_sat_per_vb;
use crate::utxo::Utxo;
use crate::{MintError, MintResult};

/// Esplora REST client, as served by mempool.space.
#[derive(Debug, Clone)]
pub struct MempoolClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: Txid,
    vout: u32,
    status: EsploraStatus,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
    #[serde(default)]
    block_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedFees {
    fastest_fee: u64,
}

impl From<EsploraUtxo> for Utxo {
    fn from(utxo: EsploraUtxo) -> Self {
        Utxo {
            id: utxo.txid,
            index: utxo.vout,
            amount: Amount::from_sat(utxo.value),
            confirmed: utxo.status.confirmed,
            block_height: utxo.status.block_height,
        }
    }
}

impl MempoolClient {
    /// `url` is the site root, e.g. `https://mempool.space/testnet`.
    pub fn new(url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/api", url.trim_end_matches('/')),
        }
    }

    async fn get(&self, path: &str) -> MintResult<Response> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");
        Ok(self.client.get(&url).send().await?)
    }
}

/// Maps non-success responses onto the error taxonomy.
async fn check_status(response: Response) -> MintResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(MintError::Network(format!("{status}: {body}")))
    } else if status == StatusCode::BAD_REQUEST {
        Err(MintError::InvalidParameters(body))
    } else {
        Err(MintError::OperationFailed(format!("{status}: {body}")))
    }
}

#[async_trait::async_trait]
impl ChainDataProvider for MempoolClient {
    async fn utxos(&self, address: &Address) -> MintResult<Vec<Utxo>> {
        let response = check_status(self.get(&format!("/address/{address}/utxo")).await?).await?;
        let utxos: Vec<EsploraUtxo> = response.json().await?;

        Ok(utxos.into_iter().map(Utxo::from).collect())
    }

    async fn transaction(&self, txid: &Txid) -> MintResult<Option<TxInfo>> {
        let response = self.get(&format!("/tx/{txid}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(check_status(response).await?.json().await?))
    }

    async fn fastest_fee_rate(&self) -> MintResult<FeeRate> {
        let response = check_status(self.get("/v1/fees/recommended").await?).await?;
        let fees: RecommendedFees = response.json().await?;
        debug!("fastest fee: {} sat/vB", fees.fastest_fee);

        fee_rate_from_sat_per_vb(fees.fastest_fee)
    }

    async fn broadcast(&self, transaction: &Transaction) -> MintResult<Txid> {
        let url = format!("{}/tx", self.base_url);
        let tx_hex = bitcoin::consensus::encode::serialize_hex(transaction);
        debug!("broadcasting {} ({} bytes)", transaction.txid(), tx_hex.len() / 2);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(tx_hex)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(if status.is_server_error() && body.is_empty() {
                MintError::Network(status.to_string())
            } else {
                MintError::BroadcastFailed(body)
            });
        }

        Txid::from_str(body.trim())
            .map_err(|err| MintError::OperationFailed(format!("bad txid from broadcast: {err}")))
    }
}
