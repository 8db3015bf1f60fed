//! Scoped sandbox lifetime
//!
//! A session owns one provider sandbox from `open` until `close`. A session
//! dropped without `close` (early return, cancelled request) schedules the
//! kill on the runtime instead.
//!
//! Creation runs on its own task. If `open` is cancelled before the provider
//! answers, that task kills the sandbox as soon as it exists.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{ExecutionLogs, SandboxBackend, SandboxHandle};
use crate::error::SandboxError;

pub struct SandboxSession {
    backend: Arc<dyn SandboxBackend>,
    handle: Option<SandboxHandle>,
}

impl SandboxSession {
    /// Create a sandbox on the provider
    pub async fn open(
        backend: Arc<dyn SandboxBackend>,
        template: Option<&str>,
        lifetime: Duration,
    ) -> Result<Self, SandboxError> {
        let (tx, rx) = oneshot::channel();
        let task_backend = Arc::clone(&backend);
        let template = template.map(str::to_owned);
        tokio::spawn(async move {
            let created = task_backend.create(template.as_deref(), lifetime).await;
            // Receiver gone: the caller was cancelled mid-create
            if let Err(Ok(handle)) = tx.send(created) {
                match task_backend.kill(&handle).await {
                    Ok(()) => debug!("Killed orphaned sandbox {}", handle.sandbox_id),
                    Err(e) => warn!("Failed to kill orphaned sandbox {}: {}", handle.sandbox_id, e),
                }
            }
        });

        let handle = rx
            .await
            .map_err(|_| SandboxError::protocol("sandbox creation task aborted"))??;
        info!(
            "Opened sandbox {} (template: {})",
            handle.sandbox_id, handle.template_id
        );
        Ok(Self {
            backend,
            handle: Some(handle),
        })
    }

    /// Run code in this session's sandbox
    pub async fn run_code(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionLogs, SandboxError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| SandboxError::protocol("sandbox session already closed"))?;
        debug!(
            "Running {} bytes of code in sandbox {}",
            code.len(),
            handle.sandbox_id
        );
        self.backend.run_code(handle, code, timeout).await
    }

    /// Kill the sandbox
    pub async fn close(mut self) -> Result<(), SandboxError> {
        if let Some(handle) = self.handle.take() {
            self.backend.kill(&handle).await?;
            info!("Closed sandbox {}", handle.sandbox_id);
        }
        Ok(())
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let backend = Arc::clone(&self.backend);
                runtime.spawn(async move {
                    if let Err(e) = backend.kill(&handle).await {
                        warn!("Failed to kill abandoned sandbox {}: {}", handle.sandbox_id, e);
                    } else {
                        debug!("Killed abandoned sandbox {}", handle.sandbox_id);
                    }
                });
            }
            Err(_) => warn!(
                "Sandbox {} dropped outside a runtime; it will expire on its own",
                handle.sandbox_id
            ),
        }
    }
}
