//! Periodic probing loop.
//!
//! One loop per target. Each tick probes, then appends the result, and only
//! then waits for the next deadline, so two ticks never overlap and their
//! appends never interleave. Deadlines missed while a slow probe was in
//! flight are skipped rather than replayed in a burst. Failures of any kind
//! are recorded or logged and the loop keeps ticking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::probe::Probe;
use crate::storage::{LogRecord, LogStore};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Recorded {
        partition: String,
        success: bool,
        latency_ms: u64,
    },
    /// The probe ran but its result could not be persisted.
    AppendFailed,
}

/// Running totals, returned when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectorStats {
    pub ticks: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub append_errors: u64,
}

impl CollectorStats {
    /// Ticks whose result reached the store.
    pub fn recorded(&self) -> u64 {
        self.succeeded + self.failed
    }
}

pub struct Collector<P: Probe> {
    prober: P,
    store: Arc<LogStore>,
    interval: Duration,
}

impl<P: Probe> Collector<P> {
    /// `interval` must be non-zero.
    pub fn new(prober: P, store: Arc<LogStore>, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "collector interval must be non-zero");
        Self {
            prober,
            store,
            interval,
        }
    }

    /// Probes once and appends the result to today's partition.
    pub async fn tick(&self) -> TickOutcome {
        let probe = self.prober.probe().await;
        let success = probe.success;
        let latency_ms = probe.latency_ms;

        let record = LogRecord::new(Utc::now(), self.store.zone().name(), probe);
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.append(record)).await {
            Ok(Ok(partition)) => TickOutcome::Recorded {
                partition,
                success,
                latency_ms,
            },
            Ok(Err(e)) => {
                error!("Failed to append probe result: {}", e);
                TickOutcome::AppendFailed
            }
            Err(e) => {
                error!("Append task panicked: {}", e);
                TickOutcome::AppendFailed
            }
        }
    }

    /// Ticks every interval until `shutdown` becomes true (or its sender is
    /// dropped). A tick already in progress is allowed to finish, so no
    /// append is left half done; the probe bound limits how long that takes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> CollectorStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = CollectorStats::default();

        info!(
            "Collector started: interval={}ms, zone={}, dir={}",
            self.interval.as_millis(),
            self.store.zone().name(),
            self.store.base_path().display()
        );

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            let t0 = Instant::now();
            let outcome = self.tick().await;
            let elapsed = t0.elapsed();
            stats.ticks += 1;

            match outcome {
                TickOutcome::Recorded {
                    partition,
                    success,
                    latency_ms,
                } => {
                    if success {
                        stats.succeeded += 1;
                    } else {
                        stats.failed += 1;
                    }
                    if stats.recorded() == 1 {
                        info!(
                            "First probe recorded: up={}, latency={}ms, partition={}",
                            success, latency_ms, partition
                        );
                    } else {
                        debug!(
                            "Tick #{}: up={}, latency={}ms, partition={}",
                            stats.ticks, success, latency_ms, partition
                        );
                    }
                }
                TickOutcome::AppendFailed => stats.append_errors += 1,
            }

            if elapsed > self.interval / 2 {
                warn!(
                    "Tick took {}ms, more than half of the {}ms interval",
                    elapsed.as_millis(),
                    self.interval.as_millis()
                );
            }
        }

        info!(
            "Collector stopped after {} ticks ({} up, {} down, {} append errors)",
            stats.ticks, stats.succeeded, stats.failed, stats.append_errors
        );
        stats
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::{ScriptedProber, Step};
    use crate::timezone::ZoneResolver;
    use tempfile::tempdir;

    fn total_records(store: &LogStore) -> usize {
        store
            .load_recent(7)
            .unwrap()
            .partitions
            .iter()
            .map(|p| p.records.len())
            .sum()
    }

    #[tokio::test]
    async fn test_three_ticks_record_latencies_in_order() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), ZoneResolver::utc()).unwrap());
        let prober = ScriptedProber::new([Step::up(12), Step::up(45), Step::up(8)]);
        let collector = Collector::new(prober, store.clone(), Duration::from_millis(30_000));

        let mut partitions = Vec::new();
        for _ in 0..3 {
            match collector.tick().await {
                TickOutcome::Recorded { partition, .. } => partitions.push(partition),
                TickOutcome::AppendFailed => panic!("append failed"),
            }
        }

        assert_eq!(partitions.len(), 3);
        let outcome = store.load_recent(7).unwrap();
        let records: Vec<_> = outcome
            .partitions
            .iter()
            .rev()
            .flat_map(|p| p.records.iter())
            .collect();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.probe.success));
        let latencies: Vec<u64> = records.iter().map(|r| r.probe.latency_ms).collect();
        assert_eq!(latencies, vec![12, 45, 8]);
        assert!(records.iter().all(|r| r.timezone_label == "UTC"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_produces_one_record_per_interval() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), ZoneResolver::utc()).unwrap());
        let interval = Duration::from_secs(30);
        let collector = Collector::new(ScriptedProber::always(Step::up(1)), store.clone(), interval);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(collector.run(rx));

        let run_for = Duration::from_secs(300);
        tokio::time::sleep(run_for).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        let expected = (run_for.as_secs() / interval.as_secs()) as usize;
        let recorded = total_records(&store);
        assert_eq!(recorded as u64, stats.ticks);
        assert!(
            recorded + 1 >= expected && recorded <= expected + 1,
            "recorded {} for expected {}",
            recorded,
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probes_never_overlap() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), ZoneResolver::utc()).unwrap());
        let interval = Duration::from_secs(10);
        // Every probe takes two and a half intervals.
        let prober = ScriptedProber::always(Step::down(5000).with_delay(interval * 5 / 2));
        let collector = Collector::new(prober, store.clone(), interval);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(collector.run(rx));

        let run_for = Duration::from_secs(100);
        tokio::time::sleep(run_for).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        let ceiling = (run_for.as_secs() / interval.as_secs()) as u64 + 1;
        assert!(stats.ticks >= 1);
        assert!(stats.ticks <= ceiling);
        assert_eq!(stats.failed, stats.ticks);
        assert_eq!(total_records(&store) as u64, stats.ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlap_guard_reports_single_in_flight() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), ZoneResolver::utc()).unwrap());
        let interval = Duration::from_secs(1);
        let prober = Arc::new(ScriptedProber::always(
            Step::up(900).with_delay(Duration::from_millis(2500)),
        ));
        let collector = Collector::new(SharedProber(prober.clone()), store, interval);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(collector.run(rx));
        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(prober.calls() >= 2);
        assert_eq!(prober.max_in_flight(), 1);
    }

    struct SharedProber(Arc<ScriptedProber>);

    impl Probe for SharedProber {
        async fn probe(&self) -> crate::storage::ProbeResult {
            self.0.probe().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_append_failures() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let store = Arc::new(LogStore::open(&log_dir, ZoneResolver::utc()).unwrap());
        // Replace the directory with a plain file so every append fails.
        std::fs::remove_dir(&log_dir).unwrap();
        std::fs::write(&log_dir, b"not a directory").unwrap();

        let interval = Duration::from_secs(5);
        let collector = Collector::new(ScriptedProber::always(Step::up(1)), store, interval);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(collector.run(rx));

        tokio::time::sleep(Duration::from_secs(30)).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert!(stats.ticks >= 5);
        assert_eq!(stats.append_errors, stats.ticks);
        assert_eq!(stats.recorded(), 0);
    }

    #[test]
    fn test_recorded_excludes_append_failures() {
        let stats = CollectorStats {
            ticks: 2,
            succeeded: 1,
            failed: 0,
            append_errors: 1,
        };
        // First tick failed to append; the second is the first recorded probe.
        assert_eq!(stats.recorded(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), ZoneResolver::utc()).unwrap());
        let collector = Collector::new(ScriptedProber::always(Step::up(1)), store.clone(), Duration::from_secs(60));

        let (tx, rx) = watch::channel(true);
        let stats = collector.run(rx).await;
        drop(tx);

        assert_eq!(stats.ticks, 0);
        assert_eq!(total_records(&store), 0);
    }
}
