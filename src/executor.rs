//! Code execution over the template chain
//!
//! Tries each template in order, one fresh sandbox per attempt, and reports
//! the first successful run. When every template fails, the last error is
//! returned.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::SandboxError;
use crate::sandbox::{ExecutionLogs, SandboxBackend, SandboxSession};
use crate::templates::{TemplateCandidate, TemplateChain};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const NO_OUTPUT: &str = "Code executed successfully (no output)";

/// Body of `POST /execute`
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    /// Seconds; null or absent means the default
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ExecuteRequest {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

/// Result of `POST /execute`
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub execution_time: Option<f64>,
}

pub struct Executor {
    backend: Arc<dyn SandboxBackend>,
    chain: TemplateChain,
    /// Extra sandbox lifetime on top of the request timeout
    lifetime_padding: Duration,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn SandboxBackend>,
        chain: TemplateChain,
        lifetime_padding: Duration,
    ) -> Self {
        Self {
            backend,
            chain,
            lifetime_padding,
        }
    }

    /// Run code, falling back through the chain
    pub async fn execute(&self, code: &str, timeout_secs: u64) -> ExecuteResponse {
        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_secs);
        let mut last_error = None;

        for (idx, candidate) in self.chain.candidates().iter().enumerate() {
            match self.attempt(candidate, code, timeout).await {
                Ok(logs) => {
                    let execution_time = start.elapsed().as_secs_f64();
                    info!(
                        "Execution succeeded on {} after {} attempt(s) in {:.3}s",
                        candidate.description,
                        idx + 1,
                        execution_time
                    );

                    if let Some(error) = &logs.error {
                        debug!("Code raised {}: {}\n{}", error.name, error.value, error.traceback);
                    }

                    let mut output = format_output(&logs);
                    if self.chain.is_fallback() {
                        output.push_str(&format!(" (using {})", candidate.description));
                    }
                    return ExecuteResponse {
                        success: true,
                        output,
                        error: None,
                        execution_time: Some(execution_time),
                    };
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} on {} failed: {}",
                        idx + 1,
                        self.chain.len(),
                        candidate.description,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        let execution_time = start.elapsed().as_secs_f64();
        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no sandbox templates configured".to_string());
        let error = if self.chain.is_fallback() {
            format!("All templates failed. Last error: {}", last_error)
        } else {
            last_error
        };

        ExecuteResponse {
            success: false,
            output: String::new(),
            error: Some(error),
            execution_time: Some(execution_time),
        }
    }

    /// One sandbox, one run, always released
    async fn attempt(
        &self,
        candidate: &TemplateCandidate,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionLogs, SandboxError> {
        let session = SandboxSession::open(
            Arc::clone(&self.backend),
            candidate.id.as_deref(),
            timeout.saturating_add(self.lifetime_padding),
        )
        .await?;

        let result = session.run_code(&candidate.wrap_code(code), timeout).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close sandbox: {}", e);
        }

        result
    }
}

/// Join captured output: stdout chunks, then prefixed stderr chunks, then the
/// in-sandbox error if any
pub fn format_output(logs: &ExecutionLogs) -> String {
    let mut lines: Vec<String> = logs.stdout.clone();
    lines.extend(logs.stderr.iter().map(|line| format!("STDERR: {}", line)));
    if let Some(error) = &logs.error {
        lines.push(format!("ERROR: {}: {}", error.name, error.value));
    }

    if lines.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        lines.join("\n")
    }
}
