//! Recovering a `{papers: [...]}` object from an upstream envelope.
//!
//! The workflow API is driven by a conversational model, so the reply shape is not
//! fixed. Strategies run in a fixed order (cheap structural checks first, text
//! scanning last) and the first hit wins. Nothing here fails: an envelope that
//! matches no strategy is handed back unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::observe::{
    CandidateSource, ContentSource, NormalizeEvent, NormalizeObserver, TracingObserver,
};
use crate::scan::find_balanced_object;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid fenced json regex")
});
static TRAILING_COMMA_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\}").expect("valid trailing comma regex"));
static TRAILING_COMMA_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\]").expect("valid trailing comma regex"));

const PREVIEW_HEAD_CHARS: usize = 200;
const PREVIEW_TAIL_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The envelope itself has `papers`.
    Direct,
    /// A top-level field holds an object with `papers`.
    Nested,
    /// A top-level field holds a JSON string that decodes to an object with `papers`.
    NestedEncoded,
    /// `choices[0].delta.content` or `choices[0].message.content` embeds the object.
    ChatCompletion,
    /// The envelope is a JSON string that decodes to an object with `papers`.
    BareString,
}

/// Shape of an envelope, as far as the strategies care.
#[derive(Debug, Clone, Copy)]
pub enum Envelope<'a> {
    Papers(&'a Map<String, Value>),
    Object(&'a Map<String, Value>),
    Encoded(&'a str),
    Unrecognized,
}

impl<'a> Envelope<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) if map.contains_key("papers") => Envelope::Papers(map),
            Value::Object(map) => Envelope::Object(map),
            Value::String(text) => Envelope::Encoded(text),
            _ => Envelope::Unrecognized,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Papers(_) => "papers",
            Envelope::Object(_) => "object",
            Envelope::Encoded(_) => "encoded",
            Envelope::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Found { value: Value, strategy: Strategy },
    Passthrough(Value),
}

impl Normalized {
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            Normalized::Found { strategy, .. } => Some(*strategy),
            Normalized::Passthrough(_) => None,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Normalized::Found { value, .. } | Normalized::Passthrough(value) => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Normalized::Found { value, .. } | Normalized::Passthrough(value) => value,
        }
    }

    /// Length of the `papers` array, when one was found and it is an array.
    pub fn papers_len(&self) -> Option<usize> {
        match self {
            Normalized::Found { value, .. } => papers_len(value),
            Normalized::Passthrough(_) => None,
        }
    }
}

struct Hit {
    value: Value,
    strategy: Strategy,
    key: Option<String>,
}

enum Located {
    Itself,
    Extracted(Hit),
    Nothing,
}

/// Normalizes with events forwarded to `tracing`.
pub fn normalize(envelope: Value) -> Normalized {
    normalize_with(envelope, &TracingObserver)
}

pub fn normalize_with(envelope: Value, observer: &dyn NormalizeObserver) -> Normalized {
    let located = {
        let shape = Envelope::classify(&envelope);
        observer.on_event(&NormalizeEvent::Classified { kind: shape.kind() });
        match shape {
            Envelope::Papers(_) => Located::Itself,
            Envelope::Object(map) => nested(map)
                .or_else(|| chat_completion(map, observer))
                .map_or(Located::Nothing, Located::Extracted),
            Envelope::Encoded(text) => {
                bare_string(text).map_or(Located::Nothing, Located::Extracted)
            }
            Envelope::Unrecognized => Located::Nothing,
        }
    };

    match located {
        Located::Itself => {
            observer.on_event(&NormalizeEvent::Matched {
                strategy: Strategy::Direct,
                key: None,
                papers: papers_len(&envelope),
            });
            Normalized::Found {
                value: envelope,
                strategy: Strategy::Direct,
            }
        }
        Located::Extracted(hit) => {
            observer.on_event(&NormalizeEvent::Matched {
                strategy: hit.strategy,
                key: hit.key,
                papers: papers_len(&hit.value),
            });
            Normalized::Found {
                value: hit.value,
                strategy: hit.strategy,
            }
        }
        Located::Nothing => {
            let keys = envelope
                .as_object()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
            observer.on_event(&NormalizeEvent::Passthrough { keys });
            Normalized::Passthrough(envelope)
        }
    }
}

fn has_papers(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.contains_key("papers"))
}

fn papers_len(value: &Value) -> Option<usize> {
    value.get("papers").and_then(|p| p.as_array()).map(Vec::len)
}

fn decode_with_papers(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(has_papers)
}

fn nested(map: &Map<String, Value>) -> Option<Hit> {
    for (key, value) in map {
        if has_papers(value) {
            return Some(Hit {
                value: value.clone(),
                strategy: Strategy::Nested,
                key: Some(key.clone()),
            });
        }
        if let Some(decoded) = value.as_str().and_then(decode_with_papers) {
            return Some(Hit {
                value: decoded,
                strategy: Strategy::NestedEncoded,
                key: Some(key.clone()),
            });
        }
    }
    None
}

/// `delta.content` wins whenever the `delta` object carries a `content` key, even a
/// non-string one; `message.content` is only consulted otherwise.
fn chat_content(map: &Map<String, Value>) -> Option<(ContentSource, &str)> {
    let choice = map.get("choices")?.as_array()?.first()?;
    let (source, content) = match choice.get("delta").and_then(|d| d.get("content")) {
        Some(content) => (ContentSource::Delta, content),
        None => (
            ContentSource::Message,
            choice.get("message").and_then(|m| m.get("content"))?,
        ),
    };
    content
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| (source, s))
}

fn locate_candidate(content: &str) -> (CandidateSource, &str) {
    if let Some(inner) = FENCED_JSON.captures(content).and_then(|c| c.get(1)) {
        return (CandidateSource::Fenced, inner.as_str());
    }
    match find_balanced_object(content) {
        Some(object) => (CandidateSource::Braces, object),
        None => (CandidateSource::Whole, content),
    }
}

pub(crate) fn strip_trailing_commas(text: &str) -> String {
    let fixed = TRAILING_COMMA_OBJECT.replace_all(text, "}");
    TRAILING_COMMA_ARRAY.replace_all(&fixed, "]").into_owned()
}

fn preview(text: &str) -> String {
    let total = text.chars().count();
    if total <= PREVIEW_HEAD_CHARS + PREVIEW_TAIL_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_HEAD_CHARS).collect();
    let tail: String = text.chars().skip(total - PREVIEW_TAIL_CHARS).collect();
    format!("{head} ... {tail}")
}

fn chat_completion(map: &Map<String, Value>, observer: &dyn NormalizeObserver) -> Option<Hit> {
    let (source, content) = chat_content(map)?;
    observer.on_event(&NormalizeEvent::ContentExtracted {
        source,
        len: content.len(),
    });

    let (located, candidate) = locate_candidate(content.trim());
    observer.on_event(&NormalizeEvent::CandidateLocated {
        source: located,
        len: candidate.len(),
    });

    let hit = |value| Hit {
        value,
        strategy: Strategy::ChatCompletion,
        key: None,
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if has_papers(&value) => Some(hit(value)),
        Ok(_) => {
            observer.on_event(&NormalizeEvent::NoPapersField);
            None
        }
        Err(e) => {
            observer.on_event(&NormalizeEvent::DecodeFailed {
                error: e.to_string(),
                preview: preview(candidate),
            });
            let repaired = decode_with_papers(&strip_trailing_commas(candidate))?;
            observer.on_event(&NormalizeEvent::TrailingCommasRepaired);
            Some(hit(repaired))
        }
    }
}

fn bare_string(text: &str) -> Option<Hit> {
    decode_with_papers(text).map(|value| Hit {
        value,
        strategy: Strategy::BareString,
        key: None,
    })
}
