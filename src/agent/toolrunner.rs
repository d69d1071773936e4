//! Serialized runner for external update-tool invocations.
//!
//! The update tool (steamcmd and friends) keeps process-wide locks on its
//! installation directory; concurrent runs corrupt shared state. A single
//! worker task drains a FIFO channel one invocation at a time. Enqueuing is
//! fire-and-forget; completion comes back on a separate channel so the
//! owning work item and server state can be resolved afterward.

use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// One queued run of the external tool.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Work item this run resolves on completion.
    pub work_id: u64,
    pub server_id: u64,
    pub tool: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ToolCompletion {
    pub work_id: u64,
    pub server_id: u64,
    pub success: bool,
    pub detail: String,
}

/// Cheap cloneable producer side of the tool queue.
#[derive(Clone)]
pub struct ToolRunnerHandle {
    tx: mpsc::UnboundedSender<ToolInvocation>,
}

impl ToolRunnerHandle {
    /// Fire-and-forget enqueue. A closed runner means the agent is shutting
    /// down; the invocation is dropped with a warning.
    pub fn enqueue(&self, invocation: ToolInvocation) {
        if self.tx.send(invocation).is_err() {
            warn!("tool runner is gone, dropping invocation");
        }
    }
}

pub struct ToolRunner {
    rx: mpsc::UnboundedReceiver<ToolInvocation>,
    done_tx: mpsc::UnboundedSender<ToolCompletion>,
}

/// Build the tool queue: a handle for producers, the runner to spawn, and
/// the completion stream for the consumer.
pub fn channel() -> (
    ToolRunnerHandle,
    ToolRunner,
    mpsc::UnboundedReceiver<ToolCompletion>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    (ToolRunnerHandle { tx }, ToolRunner { rx, done_tx }, done_rx)
}

impl ToolRunner {
    /// Drain invocations strictly one at a time until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("tool runner started");
        loop {
            tokio::select! {
                invocation = self.rx.recv() => {
                    let Some(invocation) = invocation else { break };
                    let completion = run_tool(invocation).await;
                    if self.done_tx.send(completion).is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("tool runner stopping");
                    break;
                }
            }
        }
    }
}

/// Blocking on tool completion is allowed here and only here; the runner is
/// isolated so a hung tool cannot starve check-ins or command intake.
async fn run_tool(invocation: ToolInvocation) -> ToolCompletion {
    info!(
        work_id = invocation.work_id,
        server_id = invocation.server_id,
        tool = %invocation.tool,
        "running update tool"
    );

    let output = Command::new(&invocation.tool)
        .args(&invocation.args)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => ToolCompletion {
            work_id: invocation.work_id,
            server_id: invocation.server_id,
            success: true,
            detail: String::new(),
        },
        Ok(out) => {
            let detail = format!(
                "{} exited with {}: {}",
                invocation.tool,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
            warn!(work_id = invocation.work_id, detail = %detail, "update tool failed");
            ToolCompletion {
                work_id: invocation.work_id,
                server_id: invocation.server_id,
                success: false,
                detail,
            }
        }
        Err(e) => {
            let detail = format!("could not run {}: {}", invocation.tool, e);
            warn!(work_id = invocation.work_id, detail = %detail, "update tool failed");
            ToolCompletion {
                work_id: invocation.work_id,
                server_id: invocation.server_id,
                success: false,
                detail,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invocations_run_in_fifo_order_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let (handle, runner, mut done_rx) = channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(runner.run(shutdown_rx));

        for tag in ["first", "second", "third"] {
            handle.enqueue(ToolInvocation {
                work_id: 1,
                server_id: 1,
                tool: "sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    format!("echo {} >> {}", tag, log.display()),
                ],
            });
        }

        for _ in 0..3 {
            let completion = done_rx.recv().await.unwrap();
            assert!(completion.success);
        }

        let content = tokio::fs::read_to_string(&log).await.unwrap();
        assert_eq!(content, "first\nsecond\nthird\n");

        let _ = shutdown_tx.send(true);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn failures_come_back_as_unsuccessful_completions() {
        let (handle, runner, mut done_rx) = channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(runner.run(shutdown_rx));

        handle.enqueue(ToolInvocation {
            work_id: 42,
            server_id: 7,
            tool: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 3".to_string()],
        });
        handle.enqueue(ToolInvocation {
            work_id: 43,
            server_id: 7,
            tool: "/nonexistent/tool".to_string(),
            args: vec![],
        });

        let completion = done_rx.recv().await.unwrap();
        assert_eq!(completion.work_id, 42);
        assert!(!completion.success);

        let completion = done_rx.recv().await.unwrap();
        assert_eq!(completion.work_id, 43);
        assert!(!completion.success);
        assert!(completion.detail.contains("could not run"));
    }
}
