// tests/executor_shutdown.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use schedex::{
    CancellationToken, DefaultExecutor, Executor, ExecutorStatus, SchedexError, TaskFuture,
};
use schedex_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Submit a body that ignores its token and only returns once `release`
/// is notified.
fn submit_stubborn(
    exec: &DefaultExecutor,
    release: &Arc<Notify>,
) -> Result<Arc<dyn TaskFuture>, SchedexError> {
    let release = Arc::clone(release);
    exec.submit(move |_token| {
        let release = Arc::clone(&release);
        async move {
            release.notified().await;
            Ok(())
        }
    })
}

#[tokio::test]
async fn cancel_now_returns_only_queued_work_and_waits_for_running() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 1, -1);
    let release = Arc::new(Notify::new());

    let running = submit_stubborn(&exec, &release)?;
    let queued = exec.submit(|_token| async { Ok(()) })?;
    assert_eq!(exec.queue_length().await, 1);

    assert!(exec.cancel().await);
    let drained = exec.cancel_now().await;
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].id(), queued.id());
    assert!(!drained[0].is_done(), "drained tasks are left for the caller");
    assert_eq!(exec.queue_length().await, 0);

    assert!(!exec.is_terminated());
    assert!(!exec.await_termination(Duration::from_millis(50)).await);
    assert_eq!(exec.status(), ExecutorStatus::WaitingTermination);

    assert!(drained[0].cancel());
    assert!(queued.err().is_some_and(|e| e.is_canceled()));

    release.notify_one();
    assert!(exec.await_termination(Duration::from_secs(5)).await);
    assert!(exec.is_terminated());
    assert!(running.err().is_none());
    Ok(())
}

#[tokio::test]
async fn cancel_is_idempotent() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), -1, -1);
    let parked = exec.schedule(|_token| async { Ok(()) }, Duration::from_secs(3600))?;

    assert!(parked.cancel());
    assert!(!parked.cancel());
    assert!(parked.is_canceled());
    assert!(parked.is_done());
    assert_eq!(exec.queue_length().await, 0);

    assert!(exec.cancel().await);
    assert!(!exec.cancel().await);
    assert!(exec.is_canceled());
    assert!(exec.await_termination(Duration::from_secs(1)).await);
    assert!(!exec.cancel().await);
    Ok(())
}

#[tokio::test]
async fn graceful_shutdown_drains_queued_work() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 1, -1);

    let futures = (0..3)
        .map(|_| {
            exec.submit(|_token| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    assert!(exec.cancel().await);
    assert!(matches!(
        exec.submit(|_token| async { Ok(()) }),
        Err(SchedexError::ExecutorCanceled)
    ));

    assert!(exec.await_termination(Duration::from_secs(5)).await);
    for future in &futures {
        assert!(future.is_done());
        assert!(future.err().is_none());
    }
    Ok(())
}

#[tokio::test]
async fn parent_token_cancellation_shuts_the_executor_down() -> TestResult {
    init_tracing();
    let parent = CancellationToken::new();
    let exec = DefaultExecutor::new(&parent, -1, -1);

    let watcher = exec.submit(|token| async move {
        token.cancelled().await;
        Ok(())
    })?;

    parent.cancel();
    assert!(exec.await_termination(Duration::from_secs(5)).await);
    assert!(exec.is_canceled());
    assert!(watcher.is_done());
    assert!(!exec.cancel().await);
    assert!(matches!(
        exec.submit(|_token| async { Ok(()) }),
        Err(SchedexError::ExecutorCanceled)
    ));
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_task_is_cooperative() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 1, -1);
    let started = Arc::new(Notify::new());

    let signal = Arc::clone(&started);
    let worker = exec.submit(move |token| {
        let signal = Arc::clone(&signal);
        async move {
            signal.notify_one();
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }
    })?;
    with_timeout(started.notified()).await;

    assert!(worker.cancel());
    assert!(!worker.cancel());
    assert!(worker.is_canceled());
    assert!(!worker.is_done(), "the body has not returned yet");

    with_timeout(worker.wait()).await;
    assert!(worker.err().is_some_and(|e| e.is_canceled()));

    // The slot is free again.
    let next = exec.submit(|_token| async { Ok(()) })?;
    with_timeout(next.wait()).await;
    assert!(next.err().is_none());
    Ok(())
}

#[tokio::test]
async fn dropping_the_last_handle_shuts_down_gracefully() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), -1, -1);

    let once = exec.schedule(|_token| async { Ok(()) }, Duration::from_millis(30))?;
    let ticking = exec.schedule_with_fixed_rate(
        |_token| async { Ok(()) },
        Duration::ZERO,
        Duration::from_millis(10),
    )?;
    drop(exec);

    // Queued work still runs; periodic work is not re-armed.
    with_timeout(once.wait()).await;
    assert!(once.err().is_none());
    with_timeout(ticking.wait()).await;
    assert!(ticking.err().is_some_and(|e| e.is_canceled()));
    Ok(())
}

#[tokio::test]
async fn submission_racing_a_pending_cancel_still_completes() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), -1, -1);

    // Poll `cancel` once so its request is queued, without letting the
    // loop run before the next submission lands behind it.
    let mut cancel = exec.cancel();
    let early = tokio::select! {
        biased;
        answered = &mut cancel => Some(answered),
        _ = std::future::ready(()) => None,
    };
    assert!(early.is_none());

    let late = exec.submit(|_token| async { Ok(()) })?;
    assert!(cancel.await);

    with_timeout(late.wait()).await;
    assert!(late.is_done());
    assert!(late.err().is_some_and(|e| e.is_canceled()));
    assert!(exec.await_termination(Duration::from_secs(1)).await);
    Ok(())
}
