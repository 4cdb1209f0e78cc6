use serde::Serialize;

pub mod normalize;
pub mod observe;
pub mod scan;

pub use normalize::{normalize, normalize_with, Envelope, Normalized, Strategy};
pub use observe::{NormalizeEvent, NormalizeObserver, TracingObserver};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("upstream error ({code}): {message}")]
    Upstream {
        code: i64,
        message: String,
        body: serde_json::Value,
    },
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl Error {
    /// True for errors caused by the caller rather than the upstream or the relay.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A research topic as typed by the user. Only exists for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchQuery(String);

impl ResearchQuery {
    pub fn new(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("research topic is empty".to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Best-effort view of one element of a `papers` array.
///
/// The normalizer never validates or filters with this type; it is for consumers
/// that want to print or count records. Fields of the wrong type read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Paper {
    pub title: Option<String>,
    pub authors: Option<serde_json::Value>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<serde_json::Value>,
    pub venue: Option<String>,
    pub tags: Vec<String>,
}

impl Paper {
    /// `None` unless `value` is an object.
    pub fn from_value(value: &serde_json::Value) -> Option<Paper> {
        let obj = value.as_object()?;
        let text = |k: &str| obj.get(k).and_then(|v| v.as_str()).map(str::to_string);
        let present = |k: &str| obj.get(k).filter(|v| !v.is_null()).cloned();
        Some(Paper {
            title: text("title"),
            authors: present("authors"),
            abstract_text: text("abstract"),
            year: present("year"),
            venue: text("venue"),
            tags: obj
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// One entry per object element of `papers`; non-object elements are skipped.
    pub fn list_from(value: &serde_json::Value) -> Vec<Paper> {
        value
            .get("papers")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(Paper::from_value).collect())
            .unwrap_or_default()
    }
}

/// One upstream call per query; returns the decoded body untouched.
#[async_trait::async_trait]
pub trait PaperGateway: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, query: &ResearchQuery) -> Result<serde_json::Value>;
}
