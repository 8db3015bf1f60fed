//! E2B hosted sandbox client
//!
//! Control-plane calls (create / kill) go to the API host with the account
//! key. Code runs through the code-interpreter service exposed on port 49999
//! of each sandbox, which answers with newline-delimited JSON events.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ExecutionError, ExecutionLogs, SandboxBackend, SandboxHandle};
use crate::config::GatewayConfig;
use crate::error::SandboxError;

/// Template started when no template id is given
pub const DEFAULT_TEMPLATE: &str = "code-interpreter-v1";
/// Port of the code-interpreter service inside a sandbox
const CODE_INTERPRETER_PORT: u16 = 49999;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct E2bClient {
    client: Client,
    api_key: String,
    api_url: String,
    domain: String,
    sandbox_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSandboxRequest<'a> {
    #[serde(rename = "templateID")]
    template_id: &'a str,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct CreateSandboxResponse {
    #[serde(rename = "sandboxID")]
    sandbox_id: String,
    #[serde(rename = "templateID")]
    template_id: Option<String>,
    #[serde(rename = "envdAccessToken")]
    envd_access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// One line of the execution stream
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ExecutionEvent {
    Stdout {
        text: String,
    },
    Stderr {
        text: String,
    },
    Error {
        #[serde(default)]
        name: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        traceback: String,
    },
    #[serde(other)]
    Other,
}

impl E2bClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        domain: impl Into<String>,
        sandbox_url: Option<String>,
    ) -> Result<Self, SandboxError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_url: api_url.into(),
            domain: domain.into(),
            sandbox_url,
        })
    }

    /// Build a client from gateway configuration; None when no API key is set
    pub fn from_config(config: &GatewayConfig) -> Result<Option<Self>, SandboxError> {
        let Some(api_key) = &config.api_key else {
            return Ok(None);
        };
        Self::new(
            api_key.clone(),
            config.api_url.clone(),
            config.domain.clone(),
            config.sandbox_url.clone(),
        )
        .map(Some)
    }

    /// Base URL for in-sandbox requests
    fn sandbox_base(&self, sandbox: &SandboxHandle) -> String {
        match &self.sandbox_url {
            Some(url) => url.clone(),
            None => format!(
                "https://{}-{}.{}",
                CODE_INTERPRETER_PORT, sandbox.sandbox_id, self.domain
            ),
        }
    }

    fn sandbox_request(&self, sandbox: &SandboxHandle, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .post(format!("{}{}", self.sandbox_base(sandbox), path))
            .header("E2B-Sandbox-Id", &sandbox.sandbox_id)
            .header("E2B-Sandbox-Port", CODE_INTERPRETER_PORT.to_string());
        if let Some(token) = &sandbox.access_token {
            request = request.header("X-Access-Token", token);
        }
        request
    }
}

/// Turn a non-success response into `SandboxError::Api`
async fn check_status(response: Response) -> Result<Response, SandboxError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => parsed.message,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
        Err(_) => body.trim().to_string(),
    };

    Err(SandboxError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse the newline-delimited event stream of one execution
pub fn parse_execution_stream(body: &str) -> Result<ExecutionLogs, SandboxError> {
    let mut logs = ExecutionLogs::default();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let event: ExecutionEvent = serde_json::from_str(line)
            .map_err(|e| SandboxError::protocol(format!("bad execution event {:?}: {}", line, e)))?;
        match event {
            ExecutionEvent::Stdout { text } => logs.stdout.push(text),
            ExecutionEvent::Stderr { text } => logs.stderr.push(text),
            ExecutionEvent::Error {
                name,
                value,
                traceback,
            } => {
                logs.error = Some(ExecutionError {
                    name,
                    value,
                    traceback,
                })
            }
            ExecutionEvent::Other => {}
        }
    }

    Ok(logs)
}

#[async_trait]
impl SandboxBackend for E2bClient {
    async fn create(
        &self,
        template: Option<&str>,
        lifetime: Duration,
    ) -> Result<SandboxHandle, SandboxError> {
        let template_id = template.unwrap_or(DEFAULT_TEMPLATE);
        let body = CreateSandboxRequest {
            template_id,
            timeout: lifetime.as_secs().max(1),
        };

        debug!("Creating sandbox from template {}", template_id);
        let response = self
            .client
            .post(format!("{}/sandboxes", self.api_url))
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let created: CreateSandboxResponse = check_status(response).await?.json().await?;

        Ok(SandboxHandle {
            sandbox_id: created.sandbox_id,
            template_id: created
                .template_id
                .unwrap_or_else(|| template_id.to_string()),
            access_token: created.envd_access_token,
        })
    }

    async fn run_code(
        &self,
        sandbox: &SandboxHandle,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionLogs, SandboxError> {
        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                SandboxError::Timeout(timeout.as_secs())
            } else {
                SandboxError::Http(e)
            }
        };

        let response = self
            .sandbox_request(sandbox, "/execute")
            .timeout(timeout)
            .json(&ExecuteRequest { code })
            .send()
            .await
            .map_err(timed_out)?;
        let body = check_status(response)
            .await?
            .text()
            .await
            .map_err(timed_out)?;

        parse_execution_stream(&body)
    }

    async fn kill(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        let response = self
            .client
            .delete(format!("{}/sandboxes/{}", self.api_url, sandbox.sandbox_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!("Sandbox {} was already gone", sandbox.sandbox_id);
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct MockState {
        created: Arc<Mutex<Vec<Value>>>,
        executed: Arc<Mutex<Vec<(Option<String>, Value)>>>,
        killed: Arc<Mutex<Vec<String>>>,
    }

    async fn create_handler(
        State(state): State<MockState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("X-API-Key").and_then(|v| v.to_str().ok()) != Some("e2b_test") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": 401, "message": "Invalid API key" })),
            );
        }
        if body["templateID"] == "missing" {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "code": 404, "message": "template 'missing' not found" })),
            );
        }
        state.created.lock().unwrap().push(body.clone());
        (
            StatusCode::CREATED,
            Json(json!({
                "sandboxID": "sbx42",
                "clientID": "c0",
                "templateID": body["templateID"],
                "envdAccessToken": "tok"
            })),
        )
    }

    async fn execute_handler(
        State(state): State<MockState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        let token = headers
            .get("X-Access-Token")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        state.executed.lock().unwrap().push((token, body.clone()));

        if body["code"] == "sleep" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        let stream = [
            json!({ "type": "stdout", "text": "Hello from E2B!\n", "timestamp": 1 }),
            json!({ "type": "stderr", "text": "warning\n", "timestamp": 2 }),
            json!({ "type": "stdout", "text": "done\n", "timestamp": 3 }),
            json!({ "type": "end_of_execution" }),
        ]
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n");
        (StatusCode::OK, stream)
    }

    async fn kill_handler(State(state): State<MockState>, Path(id): Path<String>) -> StatusCode {
        if id == "gone" {
            return StatusCode::NOT_FOUND;
        }
        state.killed.lock().unwrap().push(id);
        StatusCode::NO_CONTENT
    }

    async fn start_mock() -> (String, MockState) {
        let state = MockState::default();
        let app = Router::new()
            .route("/sandboxes", post(create_handler))
            .route("/sandboxes/{id}", delete(kill_handler))
            .route("/execute", post(execute_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    fn client(base: &str, api_key: &str) -> E2bClient {
        E2bClient::new(api_key, base, "e2b.dev", Some(base.to_string())).unwrap()
    }

    #[test]
    fn test_parse_execution_stream() {
        let body = r#"
{"type":"stdout","text":"a\n"}
{"type":"number_of_executions","execution_count":1}
{"type":"stderr","text":"b\n"}
{"type":"stdout","text":"c\n"}
{"type":"error","name":"ZeroDivisionError","value":"division by zero","traceback":"..."}
{"type":"end_of_execution"}
"#;
        let logs = parse_execution_stream(body).unwrap();
        assert_eq!(logs.stdout, vec!["a\n", "c\n"]);
        assert_eq!(logs.stderr, vec!["b\n"]);
        let error = logs.error.unwrap();
        assert_eq!(error.name, "ZeroDivisionError");
        assert_eq!(error.value, "division by zero");
    }

    #[test]
    fn test_parse_execution_stream_rejects_garbage() {
        let err = parse_execution_stream("not json").unwrap_err();
        assert!(matches!(err, SandboxError::Protocol(_)));
    }

    #[test]
    fn test_sandbox_base_uses_port_hostname() {
        let client = E2bClient::new("k", "https://api.e2b.dev", "e2b.dev", None).unwrap();
        let handle = SandboxHandle {
            sandbox_id: "abc".into(),
            template_id: "genapi".into(),
            access_token: None,
        };
        assert_eq!(client.sandbox_base(&handle), "https://49999-abc.e2b.dev");
    }

    #[test]
    fn test_from_config_without_key() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert!(E2bClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_run_kill() {
        let (base, state) = start_mock().await;
        let client = client(&base, "e2b_test");

        let handle = client
            .create(Some("genapi"), Duration::from_secs(40))
            .await
            .unwrap();
        assert_eq!(handle.sandbox_id, "sbx42");
        assert_eq!(handle.template_id, "genapi");
        assert_eq!(handle.access_token.as_deref(), Some("tok"));
        assert_eq!(
            state.created.lock().unwrap()[0],
            json!({ "templateID": "genapi", "timeout": 40 })
        );

        let logs = client
            .run_code(&handle, "print('Hello from E2B!')", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(logs.stdout, vec!["Hello from E2B!\n", "done\n"]);
        assert_eq!(logs.stderr, vec!["warning\n"]);
        let executed = state.executed.lock().unwrap().clone();
        assert_eq!(executed[0].0.as_deref(), Some("tok"));
        assert_eq!(executed[0].1["code"], "print('Hello from E2B!')");

        tokio_test::assert_ok!(client.kill(&handle).await);
        assert_eq!(*state.killed.lock().unwrap(), vec!["sbx42".to_string()]);
    }

    #[tokio::test]
    async fn test_default_template_when_none() {
        let (base, state) = start_mock().await;
        let handle = client(&base, "e2b_test")
            .create(None, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(handle.template_id, DEFAULT_TEMPLATE);
        assert_eq!(state.created.lock().unwrap()[0]["templateID"], DEFAULT_TEMPLATE);
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let (base, _state) = start_mock().await;

        let err = client(&base, "wrong")
            .create(Some("genapi"), Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            SandboxError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = client(&base, "e2b_test")
            .create(Some("missing"), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("template 'missing' not found"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let (base, _state) = start_mock().await;
        let client = client(&base, "e2b_test");
        let handle = client.create(Some("genapi"), Duration::from_secs(10)).await.unwrap();

        let err = client
            .run_code(&handle, "sleep", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_kill_missing_sandbox_is_ok() {
        let (base, state) = start_mock().await;
        let handle = SandboxHandle {
            sandbox_id: "gone".into(),
            template_id: "genapi".into(),
            access_token: None,
        };
        tokio_test::assert_ok!(client(&base, "e2b_test").kill(&handle).await);
        assert!(state.killed.lock().unwrap().is_empty());
    }
}
