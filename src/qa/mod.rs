//! Question answering over a combined abstract block.

use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{self, Cache, CacheError, Partition};
use crate::llm::{ChatModel, Completion, LlmError};
use crate::normalize::normalize;

pub const CONTRADICTION_TAG: &str = "[TEGENSTRIJDIG]";
pub const NOT_IN_TEXT_TAG: &str = "[NIET IN TEKST]";
const TEMPERATURE: f32 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub cached: bool,
}

/// Cache key: the question is normalized so case, punctuation and spacing
/// variants of the same question share one entry.
pub fn answer_key(combined: &str, question: &str) -> String {
    cache::digest(&[combined, &normalize(question)])
}

pub fn render_prompt(combined: &str, question: &str) -> String {
    format!(
        "
Je bent een Nederlands sprekende medisch expert. Analyseer de volgende teksten uit PubMed en beantwoord de vraag.
Belangrijke instructies:
1. Verwijs naar de specifieke artikelen (PMID) waar je je antwoord op baseert
2. Als er tegenstrijdige informatie is tussen artikelen, markeer dit met {CONTRADICTION_TAG} en leg uit waarom
3. Geef aan welke artikelen elkaar bevestigen en welke elkaar tegenspreken
4. Als het antwoord niet direct in de gegeven teksten staat, markeer dit met {NOT_IN_TEXT_TAG} en geef dan een betrouwbaar antwoord gebaseerd op je medische expertise
5. Gebruik alleen informatie die direct uit de gegeven teksten komt, tenzij je {NOT_IN_TEXT_TAG} gebruikt

Teksten:
{combined}

Vraag:
{question}

Antwoord in het Nederlands, in eenvoudige en begrijpelijke taal:
"
    )
}

/// Wraps every literal tag occurrence in a highlight span.
///
/// Plain substitution: tags are not parsed, and text around them is untouched.
pub fn highlight_tags(answer: &str) -> String {
    [CONTRADICTION_TAG, NOT_IN_TEXT_TAG]
        .iter()
        .fold(answer.to_string(), |text, tag| {
            text.replace(tag, &format!(r#"<span class="contradiction">{tag}</span>"#))
        })
}

pub async fn answer(
    model: &impl ChatModel,
    cache: &Cache,
    combined: &str,
    question: &str,
) -> Result<Answer, QaError> {
    let key = answer_key(combined, question);

    let _guard = cache.lock_key(Partition::Answers, &key).await;
    if let Some(text) = cache.get(Partition::Answers, &key).await {
        debug!(key = %key, "answer cache hit");
        return Ok(Answer { text, cached: true });
    }

    let prompt = render_prompt(combined, question);
    let raw = model
        .complete(Completion {
            prompt: &prompt,
            temperature: TEMPERATURE,
            max_tokens: None,
        })
        .await?;

    let text = highlight_tags(&raw);
    cache.put(Partition::Answers, &key, text.clone()).await?;
    info!(key = %key, chars = text.len(), "answer generated");
    Ok(Answer {
        text,
        cached: false,
    })
}
