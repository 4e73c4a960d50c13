//! Scheduler driving [`MetricsCollector::tick`] on a fixed interval.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{MetricsCollector, ProcessTable};
use crate::metrics::GaugeSink;
use crate::session::SessionRegistry;

/// Runs ticks every `interval` until `cancel` fires, returning how many ran.
///
/// Each tick is awaited before the next one is scheduled, so ticks never
/// overlap. Ticks that come due while one is still running are skipped.
/// Cancellation is observed between ticks; a tick in flight finishes first.
///
/// A zero `interval` cannot be scheduled: the loop logs a warning and
/// returns without ticking.
pub async fn run_tick_loop<R, T, S>(
    mut collector: MetricsCollector<R, T, S>,
    interval: Duration,
    cancel: CancellationToken,
) -> u64
where
    R: SessionRegistry,
    T: ProcessTable,
    S: GaugeSink,
{
    if interval.is_zero() {
        warn!("tick interval is zero, not sampling");
        return 0;
    }

    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick_count: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let t0 = Instant::now();
        let report = collector.tick().await;
        let elapsed = t0.elapsed();
        tick_count += 1;

        if tick_count == 1 {
            info!(
                duration_ms = elapsed.as_millis() as u64,
                sessions = report.sessions,
                kernels = report.kernels_resolved,
                total_rss = report.total_rss,
                "first tick collected"
            );
        } else {
            debug!(
                duration_ms = elapsed.as_millis() as u64,
                sessions_ms = report.timing.sessions.as_millis() as u64,
                tick_count,
                "tick completed"
            );
        }

        if elapsed > interval / 2 {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "tick exceeded 50% of interval"
            );
        }
    }

    info!(tick_count, "tick loop stopped");
    tick_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorConfig;
    use crate::collector::mock::MockProcessTable;
    use crate::metrics::{RecordingSink, TOTAL_MEMORY_USAGE};
    use crate::session::{RegistryError, Session};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Registry whose query takes `delay` and records how many run at once.
    struct SlowRegistry {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowRegistry {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SessionRegistry for SlowRegistry {
        async fn list_sessions(&self) -> Result<Vec<Session>, RegistryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn table() -> MockProcessTable {
        let mut table = MockProcessTable::new().with_total_memory(1 << 30);
        table.add_process(100, 1, &["jupyter-notebook"], 1_000_000);
        table
    }

    fn config() -> CollectorConfig {
        CollectorConfig {
            root_pid: 100,
            ..CollectorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_never_overlap() {
        let registry = Arc::new(SlowRegistry::new(Duration::from_millis(250)));
        let sink = Arc::new(RecordingSink::new());
        let collector = MetricsCollector::new(registry.clone(), table(), sink.clone(), config());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_tick_loop(
            collector,
            Duration::from_millis(100),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let ticks = handle.await.unwrap();

        assert_eq!(registry.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(registry.calls.load(Ordering::SeqCst) as u64, ticks);
        // Ten intervals elapsed, but each tick takes two and a half of them.
        assert!((3..=5).contains(&ticks), "ticks = {ticks}");
        assert_eq!(sink.get(TOTAL_MEMORY_USAGE, &[]), Some(1_000_000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval() {
        let registry = Arc::new(SlowRegistry::new(Duration::ZERO));
        let sink = Arc::new(RecordingSink::new());
        let collector = MetricsCollector::new(registry.clone(), table(), sink, config());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_tick_loop(
            collector,
            Duration::from_millis(100),
            cancel.clone(),
        ));
        // Ticks fire at 0, 100, ..., 1000 ms.
        tokio::time::sleep(Duration::from_millis(1050)).await;
        cancel.cancel();
        let ticks = handle.await.unwrap();

        assert!((10..=11).contains(&ticks), "ticks = {ticks}");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = Arc::new(SlowRegistry::new(Duration::ZERO));
        let collector = MetricsCollector::new(
            registry.clone(),
            table(),
            Arc::new(RecordingSink::new()),
            config(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ticks = run_tick_loop(collector, Duration::from_secs(1), cancel).await;

        assert_eq!(ticks, 0);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_returns_without_ticking() {
        let registry = Arc::new(SlowRegistry::new(Duration::ZERO));
        let sink = Arc::new(RecordingSink::new());
        let collector = MetricsCollector::new(registry.clone(), table(), sink.clone(), config());

        let ticks = run_tick_loop(collector, Duration::ZERO, CancellationToken::new()).await;

        assert_eq!(ticks, 0);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.get(TOTAL_MEMORY_USAGE, &[]), None);
    }
}
