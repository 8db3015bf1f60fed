//! Sandbox module - Hosted sandbox abstraction
//!
//! This module provides a narrow interface over a remote code-execution
//! sandbox:
//! - `SandboxBackend`: create / run / kill against a provider
//! - `SandboxSession`: one sandbox scoped to one attempt, always torn down
//! - `e2b::E2bClient`: the E2B implementation
//!
//! The sandbox module does NOT:
//! - Format output for HTTP clients
//! - Decide which template to try next
//! - Measure request timing

pub mod e2b;
pub mod session;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::SandboxError;

pub use e2b::E2bClient;
pub use session::SandboxSession;

/// A live sandbox on the provider side
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxHandle {
    pub sandbox_id: String,
    /// Template the provider actually started
    pub template_id: String,
    /// Token for in-sandbox requests, when the provider issues one
    pub access_token: Option<String>,
}

/// Error raised by the executed code itself (not by the provider)
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    pub traceback: String,
}

/// Captured output of one code run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionLogs {
    /// Stdout chunks in arrival order
    pub stdout: Vec<String>,
    /// Stderr chunks in arrival order
    pub stderr: Vec<String>,
    pub error: Option<ExecutionError>,
}

/// Backend trait for hosted sandboxes
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Start a sandbox. `template` of None selects the provider default.
    /// `lifetime` bounds how long the provider keeps it alive.
    async fn create(
        &self,
        template: Option<&str>,
        lifetime: Duration,
    ) -> Result<SandboxHandle, SandboxError>;

    /// Run code inside a started sandbox
    async fn run_code(
        &self,
        sandbox: &SandboxHandle,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionLogs, SandboxError>;

    /// Terminate a sandbox
    async fn kill(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory backend shared by tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the fake does when a template is used
    #[derive(Debug, Clone)]
    pub enum Script {
        CreateFails(String),
        RunFails(String),
        Runs(ExecutionLogs),
    }

    #[derive(Default)]
    pub struct FakeBackend {
        scripts: Mutex<VecDeque<Script>>,
        pub created: Mutex<Vec<Option<String>>>,
        pub lifetimes: Mutex<Vec<Duration>>,
        pub codes: Mutex<Vec<String>>,
        pub killed: Mutex<Vec<String>>,
        counter: Mutex<u32>,
    }

    impl FakeBackend {
        pub fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                ..Default::default()
            }
        }

        pub fn stdout(lines: &[&str]) -> Script {
            Script::Runs(ExecutionLogs {
                stdout: lines.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            })
        }

        fn current(&self) -> Script {
            self.scripts
                .lock()
                .unwrap()
                .front()
                .cloned()
                .unwrap_or_else(|| Script::CreateFails("no script left".into()))
        }

        fn advance(&self) {
            self.scripts.lock().unwrap().pop_front();
        }
    }

    #[async_trait]
    impl SandboxBackend for FakeBackend {
        async fn create(
            &self,
            template: Option<&str>,
            lifetime: Duration,
        ) -> Result<SandboxHandle, SandboxError> {
            self.created.lock().unwrap().push(template.map(String::from));
            self.lifetimes.lock().unwrap().push(lifetime);
            if let Script::CreateFails(message) = self.current() {
                self.advance();
                return Err(SandboxError::Api {
                    status: 400,
                    message,
                });
            }
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Ok(SandboxHandle {
                sandbox_id: format!("sbx-{}", *counter),
                template_id: template.unwrap_or("default").to_string(),
                access_token: None,
            })
        }

        async fn run_code(
            &self,
            _sandbox: &SandboxHandle,
            code: &str,
            _timeout: Duration,
        ) -> Result<ExecutionLogs, SandboxError> {
            self.codes.lock().unwrap().push(code.to_string());
            let script = self.current();
            self.advance();
            match script {
                Script::Runs(logs) => Ok(logs),
                Script::RunFails(message) => Err(SandboxError::protocol(message)),
                Script::CreateFails(message) => Err(SandboxError::protocol(message)),
            }
        }

        async fn kill(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
            self.killed.lock().unwrap().push(sandbox.sandbox_id.clone());
            Ok(())
        }
    }
}
