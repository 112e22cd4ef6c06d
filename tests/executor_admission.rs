// tests/executor_admission.rs

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use schedex::{CancellationToken, DefaultExecutor, Executor, SchedexError, TaskFuture};
use schedex_test_utils::{ConcurrencyProbe, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

type BlockedBody = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A body that blocks until `release` is notified.
fn blocked(release: &Arc<Notify>) -> impl Fn(CancellationToken) -> BlockedBody + Send + Sync + 'static {
    let release = Arc::clone(release);
    move |_token| -> BlockedBody {
        let release = Arc::clone(&release);
        Box::pin(async move {
            release.notified().await;
            Ok(())
        })
    }
}

#[tokio::test]
async fn third_submission_is_rejected_when_slot_and_queue_are_full() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 1, 1);
    let release = Arc::new(Notify::new());

    let first = exec.submit(blocked(&release))?;
    let second = exec.submit(blocked(&release))?;
    assert_eq!(exec.queue_length().await, 1);

    let third = exec.submit(blocked(&release));
    assert!(matches!(third, Err(SchedexError::ExecutorQueueFull)));

    // Freeing the slot lets the queued task run, and makes room again.
    release.notify_one();
    with_timeout(first.wait()).await;
    assert!(first.err().is_none());

    release.notify_one();
    with_timeout(second.wait()).await;
    assert!(second.err().is_none());
    assert_eq!(exec.queue_length().await, 0);

    let fourth = exec.submit(|_token| async { Ok(()) })?;
    with_timeout(fourth.wait()).await;
    Ok(())
}

#[tokio::test]
async fn running_bodies_never_exceed_concurrency() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 2, -1);
    let probe = ConcurrencyProbe::new();

    let mut futures = Vec::new();
    for _ in 0..8 {
        let probe = probe.clone();
        futures.push(exec.submit(move |_token| {
            let probe = probe.clone();
            async move {
                let _guard = probe.enter();
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }
        })?);
    }

    for future in &futures {
        with_timeout(future.wait()).await;
    }
    assert_eq!(probe.started(), 8);
    assert!(probe.peak() <= 2, "peak was {}", probe.peak());
    assert_eq!(probe.peak(), 2);
    Ok(())
}

#[tokio::test]
async fn raising_limits_at_runtime_admits_more_work() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 0, 0);

    assert!(matches!(
        exec.submit(|_token| async { Ok(()) }),
        Err(SchedexError::ExecutorQueueFull)
    ));

    exec.set_queue_capacity(2).await?;
    assert_eq!(exec.queue_capacity(), 2);
    let a = exec.submit(|_token| async { Ok(()) })?;
    let b = exec.submit(|_token| async { Ok(()) })?;
    assert_eq!(exec.queue_length().await, 2);
    assert!(!a.is_done());

    exec.set_concurrency(-1).await?;
    assert_eq!(exec.concurrency(), -1);
    with_timeout(a.wait()).await;
    with_timeout(b.wait()).await;
    assert_eq!(exec.queue_length().await, 0);
    Ok(())
}

#[tokio::test]
async fn unbounded_executor_accepts_everything() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), -1, -1);
    let futures = (0..100)
        .map(|i| exec.submit_producer(move |_token| async move { Ok(i) }))
        .collect::<Result<Vec<_>, _>>()?;

    for (i, future) in futures.iter().enumerate() {
        with_timeout(future.wait()).await;
        assert_eq!(future.value(), Some(&i));
    }
    Ok(())
}

#[tokio::test]
async fn ready_tasks_start_in_submission_order() -> TestResult {
    init_tracing();
    let exec = DefaultExecutor::new(&CancellationToken::new(), 1, -1);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut futures = Vec::new();
    for i in 0..5 {
        let order = Arc::clone(&order);
        futures.push(exec.submit(move |_token| {
            let order = Arc::clone(&order);
            async move {
                order.lock().expect("lock").push(i);
                Ok(())
            }
        })?);
    }

    for future in &futures {
        with_timeout(future.wait()).await;
    }
    assert_eq!(*order.lock().expect("lock"), vec![0, 1, 2, 3, 4]);
    Ok(())
}
