use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::config::WorkflowConfig;
use paperswipe_core::{Error, PaperGateway, ResearchQuery, Result};

/// Fixed identity the workflow sees for every relay call.
const SYNTHETIC_UID: &str = "123";
const BOT_ID: &str = "paper_recommendation";
const CALLER: &str = "workflow";
const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct WorkflowClient {
    client: reqwest::Client,
    config: WorkflowConfig,
    url: url::Url,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(Error::NotConfigured("timeout must be positive".to_string()));
        }
        let url = config.url()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("paperswipe-local/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10).min(config.timeout))
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config,
            url,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(WorkflowConfig::from_env()?)
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Validates raw text as a query, then calls the workflow.
    pub async fn fetch_text(&self, text: &str) -> Result<Value> {
        let query = ResearchQuery::new(text)?;
        self.run(&query).await
    }

    /// One POST, no retries. Returns the decoded body unless it carries a nonzero `code`.
    pub async fn run(&self, query: &ResearchQuery) -> Result<Value> {
        let req = WorkflowRequest {
            flow_id: &self.config.flow_id,
            uid: SYNTHETIC_UID,
            parameters: Parameters {
                agent_user_input: query.as_str(),
            },
            ext: Ext {
                bot_id: BOT_ID,
                caller: CALLER,
            },
            stream: false,
        };

        let t0 = Instant::now();
        tracing::info!(url = %self.url, query_chars = query.as_str().chars().count(), "workflow request");

        // The upstream negotiates on Accept, but with stream=false it answers with one
        // JSON document, which we buffer whole.
        let resp = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::AUTHORIZATION, self.config.authorization())
            .json(&req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
            let preview = preview(&String::from_utf8_lossy(&bytes));
            tracing::warn!(%status, elapsed_ms, %preview, "workflow response is not json");
            Error::MalformedResponse(format!("HTTP {status}: {e}"))
        })?;

        if let Some((code, message)) = upstream_failure(&body) {
            tracing::warn!(%status, elapsed_ms, code, %message, body = %body, "workflow reported an error");
            return Err(Error::Upstream {
                code,
                message,
                body,
            });
        }

        tracing::info!(%status, elapsed_ms, bytes = bytes.len(), "workflow response");
        tracing::debug!(body = %preview(&body.to_string()), "workflow body");
        Ok(body)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Transport(format!(
                "workflow request timed out after {}s: {e}",
                self.config.timeout.as_secs_f64()
            ))
        } else {
            Error::Transport(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl PaperGateway for WorkflowClient {
    fn name(&self) -> &'static str {
        "workflow"
    }

    async fn fetch(&self, query: &ResearchQuery) -> Result<Value> {
        self.run(query).await
    }
}

#[derive(Debug, Serialize)]
struct WorkflowRequest<'a> {
    flow_id: &'a str,
    uid: &'a str,
    parameters: Parameters<'a>,
    ext: Ext<'a>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Parameters<'a> {
    #[serde(rename = "AGENT_USER_INPUT")]
    agent_user_input: &'a str,
}

#[derive(Debug, Serialize)]
struct Ext<'a> {
    bot_id: &'a str,
    caller: &'a str,
}

/// `(code, message)` when the body is an object whose `code` is present and not zero.
///
/// Numeric strings are read as numbers. Nonzero codes that are not integers, and
/// other non-null values, map to `-1`.
fn upstream_failure(body: &Value) -> Option<(i64, String)> {
    let code = match body.as_object()?.get("code")? {
        Value::Null => return None,
        Value::Number(n) if n.as_f64() == Some(0.0) => 0,
        Value::Number(n) => n.as_i64().unwrap_or(-1),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(-1),
        _ => -1,
    };
    if code == 0 {
        return None;
    }
    let message = body
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    Some((code, message))
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(BODY_PREVIEW_CHARS).collect();
    if text.chars().count() > BODY_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn config_for(addr: SocketAddr) -> WorkflowConfig {
        WorkflowConfig {
            host: format!("http://{addr}"),
            endpoint: crate::config::DEFAULT_ENDPOINT.to_string(),
            api_key: "key-1".to_string(),
            api_secret: "secret-2".to_string(),
            flow_id: "flow-3".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn reply_with(status: StatusCode, body: &'static str) -> Router {
        Router::new().route(
            crate::config::DEFAULT_ENDPOINT,
            post(move || async move { (status, [(header::CONTENT_TYPE, "application/json")], body) }),
        )
    }

    #[tokio::test]
    async fn sends_credentials_and_workflow_body() {
        let seen: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::new(Mutex::new(None));
        let app = Router::new().route(
            crate::config::DEFAULT_ENDPOINT,
            post({
                let seen = seen.clone();
                move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = seen.clone();
                    async move {
                        *seen.lock().unwrap() = Some((headers, body));
                        Json(json!({"code": 0, "message": "Success", "papers": []}))
                    }
                }
            }),
        );
        let addr = serve(app).await;
        let client = WorkflowClient::new(config_for(addr)).unwrap();

        let q = ResearchQuery::new("机器学习在医疗诊断中的应用").unwrap();
        let body = client.fetch(&q).await.unwrap();
        assert_eq!(body["papers"], json!([]));

        let (headers, sent) = seen.lock().unwrap().take().expect("request reached mock");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer key-1:secret-2");
        assert_eq!(headers[header::ACCEPT], "text/event-stream");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            sent,
            json!({
                "flow_id": "flow-3",
                "uid": "123",
                "parameters": {"AGENT_USER_INPUT": "机器学习在医疗诊断中的应用"},
                "ext": {"bot_id": "paper_recommendation", "caller": "workflow"},
                "stream": false
            })
        );
    }

    #[tokio::test]
    async fn nonzero_code_is_an_upstream_error() {
        let addr = serve(reply_with(
            StatusCode::OK,
            r#"{"code": 1, "message": "quota exceeded", "sid": "abc"}"#,
        ))
        .await;
        let client = WorkflowClient::new(config_for(addr)).unwrap();
        let err = client.fetch_text("deep learning").await.unwrap_err();
        match err {
            Error::Upstream {
                code,
                message,
                body,
            } => {
                assert_eq!(code, 1);
                assert_eq!(message, "quota exceeded");
                assert_eq!(body["sid"], "abc");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_message_defaults_to_unknown_error() {
        let addr = serve(reply_with(StatusCode::OK, r#"{"code": "10013"}"#)).await;
        let client = WorkflowClient::new(config_for(addr)).unwrap();
        let err = client.fetch_text("nlp").await.unwrap_err();
        assert!(
            matches!(&err, Error::Upstream { code: 10013, message, .. } if message == "unknown error"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let addr = serve(reply_with(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>")).await;
        let client = WorkflowClient::new(config_for(addr)).unwrap();
        let err = client.fetch_text("nlp").await.unwrap_err();
        match err {
            Error::MalformedResponse(msg) => assert!(msg.contains("502"), "{msg}"),
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_with_json_body_is_returned_as_is() {
        let addr = serve(reply_with(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"papers": [{"title": "x"}]}"#,
        ))
        .await;
        let client = WorkflowClient::new(config_for(addr)).unwrap();
        let body = client.fetch_text("nlp").await.unwrap();
        assert_eq!(body["papers"][0]["title"], "x");
    }

    #[tokio::test]
    async fn empty_query_never_reaches_the_network() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            crate::config::DEFAULT_ENDPOINT,
            post({
                let hits = hits.clone();
                move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Json(json!({"code": 0}))
                    }
                }
            }),
        );
        let addr = serve(app).await;
        let client = WorkflowClient::new(config_for(addr)).unwrap();

        for text in ["", "   "] {
            let err = client.fetch_text(text).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = WorkflowClient::new(config_for(addr)).unwrap();
        let err = client.fetch_text("nlp").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{err:?}");
    }

    #[test]
    fn zero_timeout_is_not_a_usable_client() {
        let mut cfg = config_for("127.0.0.1:9".parse().unwrap());
        cfg.timeout = Duration::ZERO;
        let err = WorkflowClient::new(cfg).unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "{err:?}");
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            crate::config::DEFAULT_ENDPOINT,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"code": 0}))
            }),
        );
        let addr = serve(app).await;
        let mut cfg = config_for(addr);
        cfg.timeout = Duration::from_millis(200);
        let client = WorkflowClient::new(cfg).unwrap();
        let err = client.fetch_text("nlp").await.unwrap_err();
        match err {
            Error::Transport(msg) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn zero_or_null_codes_are_not_failures() {
        assert_eq!(upstream_failure(&json!({"code": 0})), None);
        assert_eq!(upstream_failure(&json!({"code": "0"})), None);
        assert_eq!(upstream_failure(&json!({"code": null})), None);
        assert_eq!(upstream_failure(&json!({"message": "x"})), None);
        assert_eq!(upstream_failure(&json!("a string body")), None);
        assert_eq!(upstream_failure(&json!({"code": 0.0})), None);
        assert_eq!(
            upstream_failure(&json!({"code": "E_QUOTA", "message": "m"})),
            Some((-1, "m".to_string()))
        );
    }

    #[test]
    fn fractional_codes_are_failures() {
        for code in [json!(0.5), json!(-0.9), json!(1.5)] {
            assert_eq!(
                upstream_failure(&json!({"code": code, "message": "m"})),
                Some((-1, "m".to_string())),
                "code={code}"
            );
        }
        assert_eq!(
            upstream_failure(&json!({"code": 10013})),
            Some((10013, "unknown error".to_string()))
        );
    }
}
