//! Deterministic inscription content.

use bitcoin::hashes::{sha256, Hash};

use crate::provider::{ContentGenerator, GeneratedContent};
use crate::MintResult;

pub const TEXT_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// One layer of a generative collection.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitLayer {
    pub name: String,
    pub options: Vec<String>,
    /// Chance of the layer being present, in `0.0..=1.0`.
    pub probability: f64,
}

impl TraitLayer {
    pub fn new(name: &str, options: Vec<String>, probability: f64) -> Self {
        Self {
            name: name.to_string(),
            options,
            probability,
        }
    }

    fn numbered(name: &str, count: usize, probability: f64) -> Self {
        let options = (0..count).map(|i| format!("{name}-{i}")).collect();
        Self::new(name, options, probability)
    }
}

/// Picks one option per layer from a seed derived from the minter's address
/// and mint index, and renders the selection as a text manifest.
///
/// Layer `i` uses seed byte `i` to choose its option. Optional layers use seed
/// byte `31 - i` to decide whether they appear.
#[derive(Debug, Clone)]
pub struct TraitContentGenerator {
    layers: Vec<TraitLayer>,
}

impl Default for TraitContentGenerator {
    fn default() -> Self {
        Self::new(vec![
            TraitLayer::numbered("background", 8, 1.0),
            TraitLayer::numbered("body", 6, 1.0),
            TraitLayer::numbered("mouth", 6, 1.0),
            TraitLayer::numbered("eyes", 8, 1.0),
            TraitLayer::numbered("clothes", 10, 0.6),
            TraitLayer::numbered("arms", 4, 0.4),
            TraitLayer::numbered("hat", 12, 1.0),
        ])
    }
}

impl TraitContentGenerator {
    pub fn new(layers: Vec<TraitLayer>) -> Self {
        Self { layers }
    }

    pub fn seed(address: &str, mint_index: u64) -> [u8; 32] {
        sha256::Hash::hash(format!("{address}:{mint_index}").as_bytes()).to_byte_array()
    }

    /// Selected option of every layer, `None` for absent layers.
    pub fn select(&self, address: &str, mint_index: u64) -> Vec<(&str, Option<&str>)> {
        let seed = Self::seed(address, mint_index);

        self.layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let included = layer.probability >= 1.0 || {
                    let roll = seed[(seed.len() - 1 - i % seed.len()) % seed.len()];
                    (roll as f64 / 255.0) < layer.probability
                };

                let option = if included && !layer.options.is_empty() {
                    let index = seed[i % seed.len()] as usize % layer.options.len();
                    Some(layer.options[index].as_str())
                } else {
                    None
                };

                (layer.name.as_str(), option)
            })
            .collect()
    }

    fn render(&self, address: &str, mint_index: u64) -> String {
        self.select(address, mint_index)
            .into_iter()
            .map(|(layer, option)| format!("{layer}: {}\n", option.unwrap_or("none")))
            .collect()
    }
}

#[async_trait::async_trait]
impl ContentGenerator for TraitContentGenerator {
    async fn generate(&self, address: &str, mint_index: u64) -> MintResult<GeneratedContent> {
        Ok(GeneratedContent {
            content_type: TEXT_CONTENT_TYPE.to_string(),
            content: self.render(address, mint_index).into_bytes(),
        })
    }
}

/// Serves the same pre-rendered content for every mint.
#[derive(Debug, Clone)]
pub struct StaticContentGenerator {
    content: GeneratedContent,
}

impl StaticContentGenerator {
    pub fn new(content_type: &str, content: Vec<u8>) -> Self {
        Self {
            content: GeneratedContent {
                content_type: content_type.to_string(),
                content,
            },
        }
    }
}

#[async_trait::async_trait]
impl ContentGenerator for StaticContentGenerator {
    async fn generate(&self, _address: &str, _mint_index: u64) -> MintResult<GeneratedContent> {
        Ok(self.content.clone())
    }
}
