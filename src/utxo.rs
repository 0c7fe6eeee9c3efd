//! Payment UTXO discovery.

use std::collections::HashSet;
use std::sync::Arc;

use bitcoin::{Address, Amount, OutPoint, Txid};

use crate::provider::{ChainDataProvider, TxInfo, UtxoClassifier};
use crate::utils::constants::DUST_LIMIT;
use crate::utils::retry::{retry, RetryPolicy};
use crate::{MintError, MintResult};

/// Unspent transaction output to be used as input of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: Txid,
    pub index: u32,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub confirmed: bool,
    pub block_height: Option<u32>,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.id,
            vout: self.index,
        }
    }
}

/// Total value of `utxos`, saturating at [`Amount::MAX`].
pub fn total_amount(utxos: &[Utxo]) -> Amount {
    Amount::from_sat(
        utxos
            .iter()
            .fold(0u64, |total, utxo| total.saturating_add(utxo.amount.to_sat())),
    )
}

/// Finds UTXOs that can be spent as plain payment.
///
/// Indexers lag behind broadcasts, so lookups are retried with a fixed delay
/// before giving up.
#[derive(Clone)]
pub struct UtxoSelector {
    chain: Arc<dyn ChainDataProvider>,
    classifier: Arc<dyn UtxoClassifier>,
    retry: RetryPolicy,
}

impl UtxoSelector {
    pub fn new(
        chain: Arc<dyn ChainDataProvider>,
        classifier: Arc<dyn UtxoClassifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            chain,
            classifier,
            retry,
        }
    }

    /// Single lookup of the clean UTXOs of `address`.
    ///
    /// Outputs in `exclude`, outputs at or below the dust limit, outputs the
    /// classifier has not indexed yet and outputs carrying inscriptions or
    /// runes are dropped. The result is ordered by
    /// value, then outpoint, so repeated calls select the same inputs.
    pub async fn clean_utxos(
        &self,
        address: &Address,
        exclude: &HashSet<OutPoint>,
    ) -> MintResult<Vec<Utxo>> {
        let mut clean = Vec::new();

        for utxo in self.chain.utxos(address).await? {
            let outpoint = utxo.outpoint();
            if exclude.contains(&outpoint) {
                debug!("skipping {outpoint}: already spent by a related transaction");
                continue;
            }
            if utxo.amount <= DUST_LIMIT {
                continue;
            }

            let Some(assets) = self.classifier.assets(&outpoint).await? else {
                debug!("skipping {outpoint}: not indexed yet");
                continue;
            };
            if !assets.is_clean() {
                debug!(
                    "skipping {outpoint}: carries {} inscriptions and {} runes",
                    assets.inscriptions.len(),
                    assets.runes.len()
                );
                continue;
            }

            clean.push(utxo);
        }

        clean.sort_by(|a, b| {
            a.amount
                .cmp(&b.amount)
                .then_with(|| a.outpoint().cmp(&b.outpoint()))
        });

        Ok(clean)
    }

    /// Polls until `address` has at least one clean UTXO.
    pub async fn fetch_clean_utxos(
        &self,
        address: &Address,
        exclude: &HashSet<OutPoint>,
    ) -> MintResult<Vec<Utxo>> {
        let utxos = retry(self.retry, |attempt| async move {
            let utxos = self.clean_utxos(address, exclude).await?;
            debug!(
                "attempt {attempt}: {} clean UTXOs for {address}",
                utxos.len()
            );
            Ok((!utxos.is_empty()).then_some(utxos))
        })
        .await?;

        utxos.ok_or_else(|| MintError::NoUsableFunds {
            address: address.to_string(),
            attempts: self.retry.attempts,
        })
    }

    /// Polls until the indexer returns `txid`.
    pub async fn wait_for_transaction(&self, txid: &Txid) -> MintResult<TxInfo> {
        retry(self.retry, |_| self.chain.transaction(txid))
            .await?
            .ok_or_else(|| {
                MintError::Network(format!(
                    "transaction {txid} not visible after {} attempts",
                    self.retry.attempts
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::provider::UtxoAssets;
    use crate::utils::test_utils::{payment_address, txid, utxo, MockChain, MockClassifier};

    fn selector(chain: Arc<MockChain>, classifier: Arc<MockClassifier>) -> UtxoSelector {
        UtxoSelector::new(
            chain,
            classifier,
            RetryPolicy {
                attempts: 3,
                delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_should_filter_dust_tainted_and_excluded() {
        let address = payment_address();
        let chain = Arc::new(MockChain::default());
        chain.set_utxos(
            &address,
            vec![
                utxo(txid(1), 0, 546),
                utxo(txid(2), 0, 20_000),
                utxo(txid(3), 1, 10_000),
                utxo(txid(4), 0, 547),
                utxo(txid(5), 0, 50_000),
            ],
        );
        let classifier = Arc::new(MockClassifier::default());
        classifier.taint(
            OutPoint::new(txid(5), 0),
            UtxoAssets {
                inscriptions: vec!["someinscription".to_string()],
                runes: vec![],
            },
        );

        let exclude = HashSet::from([OutPoint::new(txid(3), 1)]);
        let clean = selector(chain, classifier)
            .clean_utxos(&address, &exclude)
            .await
            .unwrap();

        let amounts: Vec<u64> = clean.iter().map(|u| u.amount.to_sat()).collect();
        assert_eq!(amounts, vec![547, 20_000]);
        assert_eq!(total_amount(&clean), Amount::from_sat(20_547));
    }

    #[test]
    fn test_total_amount_saturates() {
        let utxos = vec![utxo(txid(1), 0, u64::MAX), utxo(txid(2), 0, 1_000)];
        assert_eq!(total_amount(&utxos), Amount::MAX);
        assert_eq!(total_amount(&[]), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_should_fail_with_no_usable_funds() {
        let address = payment_address();
        let chain = Arc::new(MockChain::default());
        chain.set_utxos(&address, vec![utxo(txid(1), 0, 100)]);

        let err = selector(chain.clone(), Arc::new(MockClassifier::default()))
            .fetch_clean_utxos(&address, &HashSet::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MintError::NoUsableFunds { attempts: 3, .. }));
        assert_eq!(chain.utxo_calls(), 3);
    }

    #[tokio::test]
    async fn test_unindexed_outpoint_does_not_block_selection() {
        let address = payment_address();
        let chain = Arc::new(MockChain::default());
        chain.set_utxos(
            &address,
            vec![utxo(txid(1), 0, 30_000), utxo(txid(2), 0, 20_000)],
        );
        let classifier = Arc::new(MockClassifier::default());
        classifier.set_unindexed(OutPoint::new(txid(2), 0), true);

        let utxos = selector(chain.clone(), classifier)
            .fetch_clean_utxos(&address, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].outpoint(), OutPoint::new(txid(1), 0));
        assert_eq!(chain.utxo_calls(), 1);
    }

    #[tokio::test]
    async fn test_should_keep_polling_while_only_unindexed_funds_exist() {
        let address = payment_address();
        let chain = Arc::new(MockChain::default());
        chain.set_utxos(&address, vec![utxo(txid(2), 0, 20_000)]);
        let classifier = Arc::new(MockClassifier::default());
        classifier.set_unindexed(OutPoint::new(txid(2), 0), true);

        let err = selector(chain.clone(), classifier)
            .fetch_clean_utxos(&address, &HashSet::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MintError::NoUsableFunds { attempts: 3, .. }));
        assert_eq!(chain.utxo_calls(), 3);
    }

    #[tokio::test]
    async fn test_should_wait_until_utxos_are_visible() {
        let address = payment_address();
        let chain = Arc::new(MockChain::default());
        chain.set_utxos(&address, vec![utxo(txid(1), 0, 100_000)]);
        chain.hide_utxos_for(1);

        let utxos = selector(chain.clone(), Arc::new(MockClassifier::default()))
            .fetch_clean_utxos(&address, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(utxos.len(), 1);
        assert_eq!(chain.utxo_calls(), 2);
    }

    #[tokio::test]
    async fn test_should_wait_for_transaction() {
        let chain = Arc::new(MockChain::default());
        let selector = selector(chain.clone(), Arc::new(MockClassifier::default()));

        assert!(matches!(
            selector.wait_for_transaction(&txid(9)).await,
            Err(MintError::Network(_))
        ));
    }
}
