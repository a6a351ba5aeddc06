//! Polling loop around [`CheckCycle`](crate::cycle::CheckCycle).

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::cycle::CycleReport;

/// Runs `run_cycle` immediately, then once per `interval` until `shutdown`
/// is cancelled. Returns the number of cycles started.
///
/// Cancellation is only observed between cycles; a running cycle always
/// completes. A panicking cycle is logged and the loop carries on. With
/// `once` set, exactly one cycle runs.
pub async fn run<F, Fut>(
    mut run_cycle: F,
    interval: Duration,
    once: bool,
    shutdown: CancellationToken,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CycleReport>,
{
    let mut cycles = 0u64;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        cycles += 1;
        tracing::info!(cycle = cycles, "starting check cycle");
        match AssertUnwindSafe(run_cycle()).catch_unwind().await {
            Ok(report) => tracing::debug!(cycle = cycles, ?report, "check cycle finished"),
            Err(panic) => {
                tracing::error!(
                    cycle = cycles,
                    panic = %panic_message(panic.as_ref()),
                    "check cycle panicked"
                );
            }
        }

        if once {
            break;
        }

        tracing::info!(next_check_in_secs = interval.as_secs(), "waiting for next check");
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(cycles, "scheduler stopped");
    cycles
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn once_runs_a_single_cycle() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let cycles = run(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { CycleReport::default() }
            },
            Duration::from_secs(3600),
            true,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(cycles, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let cycles = run(
            || async { CycleReport::default() },
            Duration::ZERO,
            false,
            token,
        )
        .await;
        assert_eq!(cycles, 0);
    }

    #[tokio::test]
    async fn cancellation_waits_for_the_running_cycle() {
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&finished);
        let t = token.clone();
        let cycles = run(
            move || {
                let f = Arc::clone(&f);
                let t = t.clone();
                async move {
                    t.cancel();
                    tokio::task::yield_now().await;
                    f.fetch_add(1, Ordering::SeqCst);
                    CycleReport::default()
                }
            },
            Duration::from_secs(3600),
            false,
            token,
        )
        .await;

        assert_eq!(cycles, 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_cycle_does_not_stop_the_loop() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let t = token.clone();
        let cycles = run(
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                let t = t.clone();
                async move {
                    assert!(n != 0, "first cycle blows up");
                    if n >= 2 {
                        t.cancel();
                    }
                    CycleReport::default()
                }
            },
            Duration::ZERO,
            false,
            token,
        )
        .await;

        assert_eq!(cycles, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
