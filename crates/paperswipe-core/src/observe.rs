//! Structured events emitted while normalizing an envelope.

use crate::normalize::Strategy;

/// Where a chat-completion content string came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Delta,
    Message,
}

/// How the JSON candidate was cut out of a chat content string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Interior of a ```json fenced block.
    Fenced,
    /// First balanced `{...}` found by the brace scanner.
    Braces,
    /// No fence and no balanced object; the whole trimmed content.
    Whole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeEvent {
    /// The input was classified; `kind` is `papers`, `object`, `encoded` or `unrecognized`.
    Classified { kind: &'static str },
    ContentExtracted { source: ContentSource, len: usize },
    CandidateLocated { source: CandidateSource, len: usize },
    /// The candidate did not decode. `preview` is bounded.
    DecodeFailed { error: String, preview: String },
    /// The candidate decoded, but not to an object with `papers`.
    NoPapersField,
    TrailingCommasRepaired,
    Matched {
        strategy: Strategy,
        key: Option<String>,
        papers: Option<usize>,
    },
    /// No strategy matched; `keys` lists the top-level keys if the input was an object.
    Passthrough { keys: Vec<String> },
}

pub trait NormalizeObserver {
    fn on_event(&self, event: &NormalizeEvent);
}

/// Forwards normalizer events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl NormalizeObserver for TracingObserver {
    fn on_event(&self, event: &NormalizeEvent) {
        match event {
            NormalizeEvent::Classified { kind } => {
                tracing::debug!(kind, "envelope classified");
            }
            NormalizeEvent::ContentExtracted { source, len } => {
                tracing::debug!(?source, len, "chat content extracted");
            }
            NormalizeEvent::CandidateLocated { source, len } => {
                tracing::debug!(?source, len, "json candidate located");
            }
            NormalizeEvent::DecodeFailed { error, preview } => {
                tracing::warn!(%error, %preview, "json candidate failed to decode");
            }
            NormalizeEvent::NoPapersField => {
                tracing::warn!("candidate decoded but has no papers field");
            }
            NormalizeEvent::TrailingCommasRepaired => {
                tracing::info!("candidate decoded after stripping trailing commas");
            }
            NormalizeEvent::Matched {
                strategy,
                key,
                papers,
            } => {
                tracing::info!(?strategy, key = key.as_deref(), papers, "papers located");
            }
            NormalizeEvent::Passthrough { keys } => {
                tracing::warn!(?keys, "unrecognized envelope; returning it unchanged");
            }
        }
    }
}
