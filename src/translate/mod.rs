//! Per-abstract translation of a combined block into Dutch.
//!
//! The block is split on the abstract delimiter, each unit is translated on
//! its own (concurrently, output order = input order) and the units are
//! joined back. A failing unit never fails its siblings; what happens to the
//! batch is decided by [`FailurePolicy`].

mod units;

pub use units::{Unit, split_units};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{self, Cache, CacheError, Partition};
use crate::llm::{ChatModel, Completion};
use crate::pubmed::ABSTRACT_DELIMITER;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 2000;
const TRANSLATE_CONCURRENCY: usize = 4;
pub const FAILURE_PREFIX: &str = "Fout bij vertalen: ";

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("translation of abstract {index} failed: {reason}")]
    Unit { index: usize, reason: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What to do with the batch when some units fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Embed `Fout bij vertalen: <original>` in place of the failed unit.
    #[default]
    Placeholder,
    /// Fail the whole batch on the first failed unit; nothing is cached.
    FailBatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Translated { text: String },
    Failed { original: String, reason: String },
}

impl UnitOutcome {
    /// Text this unit contributes to the reassembled block.
    pub fn render(&self) -> String {
        match self {
            UnitOutcome::Translated { text } => text.clone(),
            UnitOutcome::Failed { original, .. } => format!("{FAILURE_PREFIX}{original}"),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub text: String,
    pub cached: bool,
    /// Per-unit results; empty on a cache hit since cached blocks are not re-split.
    pub units: Vec<UnitOutcome>,
}

pub fn translation_key(combined: &str) -> String {
    cache::digest(&[combined])
}

pub fn render_prompt(body: &str) -> String {
    format!(
        "
Vertaal de volgende medische abstract naar het Nederlands. Gebruik duidelijke en begrijpelijke taal.
Behoud de PMID referentie en vertaal alleen de abstract tekst.

{body}

Vertaling:
"
    )
}

async fn translate_unit(model: &impl ChatModel, unit: &Unit<'_>) -> UnitOutcome {
    let prompt = render_prompt(unit.body);
    let result = model
        .complete(Completion {
            prompt: &prompt,
            temperature: TEMPERATURE,
            max_tokens: Some(MAX_TOKENS),
        })
        .await;

    match result {
        Ok(translated) => UnitOutcome::Translated {
            text: match unit.marker {
                Some(marker) => format!("{marker} {translated}"),
                None => translated,
            },
        },
        Err(e) => {
            warn!(marker = unit.marker.unwrap_or("-"), error = %e, "unit translation failed");
            UnitOutcome::Failed {
                original: unit.original.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

pub async fn translate(
    model: &impl ChatModel,
    cache: &Cache,
    combined: &str,
    policy: FailurePolicy,
) -> Result<Translation, TranslateError> {
    let key = translation_key(combined);

    let _guard = cache.lock_key(Partition::Translations, &key).await;
    if let Some(text) = cache.get(Partition::Translations, &key).await {
        debug!(key = %key, "translation cache hit");
        return Ok(Translation {
            text,
            cached: true,
            units: Vec::new(),
        });
    }

    let units = split_units(combined);
    let outcomes: Vec<UnitOutcome> = stream::iter(&units)
        .map(|unit| translate_unit(model, unit))
        .buffered(TRANSLATE_CONCURRENCY)
        .collect()
        .await;

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if policy == FailurePolicy::FailBatch
        && let Some((index, reason)) = outcomes.iter().enumerate().find_map(|(i, o)| match o {
            UnitOutcome::Failed { reason, .. } => Some((i, reason.clone())),
            UnitOutcome::Translated { .. } => None,
        })
    {
        return Err(TranslateError::Unit {
            index: index + 1,
            reason,
        });
    }

    let text = outcomes
        .iter()
        .map(UnitOutcome::render)
        .collect::<Vec<_>>()
        .join(ABSTRACT_DELIMITER);

    cache.put(Partition::Translations, &key, text.clone()).await?;
    info!(units = outcomes.len(), failed, "translation complete");
    Ok(Translation {
        text,
        cached: false,
        units: outcomes,
    })
}
