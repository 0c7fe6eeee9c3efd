//! Process configuration, read once at startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bitcoin::address::NetworkUnchecked;
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Address, Amount, FeeRate, Network, PrivateKey, PublicKey, XOnlyPublicKey};

use crate::inscription::iid::InscriptionId;
use crate::utils::constants::{
    DEFAULT_FEE_RATE, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, POSTAGE,
};
use crate::utils::fees::fee_rate_from_sat_per_vb;
use crate::utils::retry::RetryPolicy;
use crate::{MintError, MintResult};

pub trait FromEnv: Sized {
    fn from_env() -> MintResult<Self>;
}

/// Who pays the reveal transaction fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealFunding {
    /// The commit output only carries the postage; the reveal adds payment
    /// inputs for its fee.
    #[default]
    PaymentInputs,
    /// The commit output carries the reveal fee on top of the postage.
    CommitOutput,
}

impl RevealFunding {
    /// Value of the commit output funding the reveal, saturating at [`Amount::MAX`].
    pub fn reveal_value(self, reveal_fee: Amount) -> Amount {
        match self {
            RevealFunding::PaymentInputs => POSTAGE,
            RevealFunding::CommitOutput => POSTAGE.checked_add(reveal_fee).unwrap_or(Amount::MAX),
        }
    }
}

impl FromStr for RevealFunding {
    type Err = MintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" | "payment_inputs" => Ok(RevealFunding::PaymentInputs),
            "commit" | "commit_output" => Ok(RevealFunding::CommitOutput),
            other => Err(MintError::Config(format!("unknown reveal funding mode {other}"))),
        }
    }
}

/// The oracle key that passes the parent inscription forward.
///
/// `Debug` never prints the secret.
#[derive(Clone)]
pub struct OracleKey {
    private_key: PrivateKey,
    public_key: PublicKey,
    address: Address,
}

impl fmt::Debug for OracleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleKey")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .finish()
    }
}

impl OracleKey {
    /// Checks that the public key and taproot address belong to `private_key`.
    pub fn new(
        private_key: PrivateKey,
        public_key: Option<PublicKey>,
        address: Address,
    ) -> MintResult<Self> {
        let secp = Secp256k1::new();
        let derived = private_key.public_key(&secp);

        if let Some(public_key) = public_key {
            if public_key != derived {
                return Err(MintError::Config(
                    "oracle public key does not match the oracle private key".to_string(),
                ));
            }
        }

        let (x_only, _) = derived.inner.x_only_public_key();
        let expected = Address::p2tr(&secp, x_only, None, private_key.network);
        if expected != address {
            return Err(MintError::Config(format!(
                "oracle address {address} is not the key-path address {expected} of the oracle key"
            )));
        }

        Ok(Self {
            private_key,
            public_key: derived,
            address,
        })
    }

    /// Oracle key set whose address is derived from the key.
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = private_key.public_key(&secp);
        let (x_only, _) = public_key.inner.x_only_public_key();
        let address = Address::p2tr(&secp, x_only, None, private_key.network);

        Self {
            private_key,
            public_key,
            address,
        }
    }

    /// Fresh random oracle key set.
    #[cfg(feature = "rand")]
    pub fn generate(network: Network) -> Self {
        let secp = Secp256k1::new();
        let keypair = bitcoin::key::Keypair::new(&secp, &mut rand::thread_rng());
        Self::from_private_key(PrivateKey::new(keypair.secret_key(), network))
    }

    /// Parses a WIF or 64-hex-character private key for `network`.
    pub fn parse_private_key(secret: &str, network: Network) -> MintResult<PrivateKey> {
        let secret = secret.trim();

        if secret.len() == 51 || secret.len() == 52 {
            if let Ok(wif) = PrivateKey::from_wif(secret) {
                return Ok(PrivateKey::new(wif.inner, network));
            }
        }

        if secret.len() == 64 {
            if let Some(key) = hex::decode(secret)
                .ok()
                .and_then(|bytes| SecretKey::from_slice(&bytes).ok())
            {
                return Ok(PrivateKey::new(key, network));
            }
        }

        Err(MintError::Config(
            "oracle private key must be WIF or 64 hex characters".to_string(),
        ))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.public_key.inner.x_only_public_key().0
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn network(&self) -> Network {
        self.private_key.network
    }

    pub(crate) fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

#[derive(Debug, Clone)]
pub struct MintConfig {
    pub network: Network,
    pub oracle: OracleKey,
    /// Parent every minted inscription is a child of.
    pub parent_inscription_id: Option<InscriptionId>,
    pub mempool_url: String,
    pub ord_url: String,
    pub default_fee_rate: FeeRate,
    pub reveal_funding: RevealFunding,
    pub retry: RetryPolicy,
}

impl MintConfig {
    /// Config with defaults for everything but the oracle key.
    pub fn new(oracle: OracleKey) -> Self {
        Self {
            network: oracle.network(),
            oracle,
            parent_inscription_id: None,
            mempool_url: "https://mempool.space".to_string(),
            ord_url: "https://ordinals.com".to_string(),
            default_fee_rate: FeeRate::from_sat_per_vb_unchecked(DEFAULT_FEE_RATE),
            reveal_funding: RevealFunding::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Builds the config from variables returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> MintResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| MintError::Config(format!("{name} is not set")))
        };

        let network = match lookup("BITCOIN_NETWORK") {
            Some(network) => parse_network(&network)?,
            None => Network::Bitcoin,
        };

        let private_key =
            OracleKey::parse_private_key(&required("ORACLE_PRIVATE_KEY_WIF")?, network)?;
        let public_key = lookup("ORACLE_COMPRESSED_PUBLIC_KEY")
            .map(|key| {
                PublicKey::from_str(key.trim()).map_err(|err| {
                    MintError::Config(format!("ORACLE_COMPRESSED_PUBLIC_KEY: {err}"))
                })
            })
            .transpose()?;
        let address = required("ORACLE_TAPROOT_ADDRESS")?
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|err| MintError::Config(format!("ORACLE_TAPROOT_ADDRESS: {err}")))?
            .require_network(network)
            .map_err(|err| MintError::Config(format!("ORACLE_TAPROOT_ADDRESS: {err}")))?;
        let oracle = OracleKey::new(private_key, public_key, address)?;

        let parent_inscription_id = lookup("PARENT_INSCRIPTION_ID")
            .map(|iid| {
                iid.parse::<InscriptionId>()
                    .map_err(|err| MintError::Config(format!("PARENT_INSCRIPTION_ID: {err}")))
            })
            .transpose()?;

        let default_fee_rate = fee_rate_from_sat_per_vb(parse_or(
            &lookup,
            "DEFAULT_FEE_RATE",
            DEFAULT_FEE_RATE,
        )?)
        .map_err(|err| MintError::Config(format!("DEFAULT_FEE_RATE: {err}")))?;

        let reveal_funding = match lookup("REVEAL_FUNDING") {
            Some(mode) => mode.parse()?,
            None => RevealFunding::default(),
        };

        let retry = RetryPolicy {
            attempts: parse_or(&lookup, "RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?,
            delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )?),
        };

        Ok(Self {
            network,
            oracle,
            parent_inscription_id,
            mempool_url: required("MEMPOOL_URL")?,
            ord_url: required("ORD_URL")?,
            default_fee_rate,
            reveal_funding,
            retry,
        })
    }
}

impl FromEnv for MintConfig {
    fn from_env() -> MintResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

fn parse_network(network: &str) -> MintResult<Network> {
    match network {
        "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(MintError::Config(format!("unknown network {other}"))),
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> MintResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err| MintError::Config(format!("{name}: {err}"))),
        None => Ok(default),
    }
}
