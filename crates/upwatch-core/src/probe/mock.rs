//! Scripted prober for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::probe::Probe;
use crate::storage::model::ProbeResult;

/// One scripted probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub success: bool,
    pub latency_ms: u64,
    /// How long the probe takes to complete.
    pub delay: Duration,
}

impl Step {
    pub fn up(latency_ms: u64) -> Self {
        Self {
            success: true,
            latency_ms,
            delay: Duration::ZERO,
        }
    }

    pub fn down(latency_ms: u64) -> Self {
        Self {
            success: false,
            latency_ms,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays a queue of steps, then repeats `fallback` forever.
/// Also tracks how many probes were ever in flight at once.
pub struct ScriptedProber {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self::with_fallback(steps, Step::up(1))
    }

    pub fn with_fallback(steps: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Repeats `step` for every probe.
    pub fn always(step: Step) -> Self {
        Self::with_fallback(Vec::new(), step)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        steps.pop_front().unwrap_or(self.fallback)
    }
}

impl Probe for ScriptedProber {
    async fn probe(&self) -> ProbeResult {
        let step = self.next_step();
        let instant = Utc::now();

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        ProbeResult {
            instant,
            success: step.success,
            latency_ms: step.latency_ms,
            status_code: Some(if step.success { 200 } else { 503 }),
        }
    }
}
