// src/exec/command.rs

//! Shell-command task bodies used by the `schedex` binary.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run `cmd` through the platform shell until it exits or `token` fires.
///
/// - stdout lines are logged at `info`, stderr lines at `debug`.
/// - A non-zero exit status is an error.
/// - On cancellation the child is killed and the run counts as a success:
///   the caller asked for it to stop.
pub async fn run_command(job: &str, cmd: &str, token: CancellationToken) -> Result<()> {
    info!(job = %job, cmd = %cmd, "starting job process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for job '{job}'"))?;

    if let Some(stdout) = child.stdout.take() {
        let job = job.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(job = %job, "stdout: {}", line);
            }
        });
    }

    // Always consume stderr so buffers don't fill.
    if let Some(stderr) = child.stderr.take() {
        let job = job.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %job, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("waiting for process of job '{job}'"))?;
            let code = status.code().unwrap_or(-1);
            info!(job = %job, exit_code = code, success = status.success(), "job process exited");
            if !status.success() {
                bail!("job '{job}' exited with code {code}");
            }
        }
        _ = token.cancelled() => {
            info!(job = %job, "cancellation requested; killing job process");
            if let Err(e) = child.kill().await {
                warn!(job = %job, error = %e, "failed to kill job process on cancellation");
            }
        }
    }

    Ok(())
}

/// Build a reusable body for [`crate::Executor`] submissions.
pub fn command_body(
    job: impl Into<String>,
    cmd: impl Into<String>,
) -> impl Fn(CancellationToken) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
+ Send
+ Sync
+ 'static {
    let job: Arc<str> = Arc::from(job.into());
    let cmd: Arc<str> = Arc::from(cmd.into());
    move |token| {
        let job = Arc::clone(&job);
        let cmd = Arc::clone(&cmd);
        Box::pin(async move { run_command(&job, &cmd, token).await })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn successful_command_is_ok() {
        let result = run_command("ok", "true", CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let err = run_command("bad", "exit 3", CancellationToken::new())
            .await
            .expect_err("non-zero exit");
        assert!(err.to_string().contains("code 3"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_command("sleeper", "sleep 30", token),
        )
        .await
        .expect("cancellation should stop the process promptly");
        assert!(result.is_ok());
    }
}
