//! Operation timing with periodic summaries

use std::{
    collections::BTreeMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Accumulated timings of one named operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationSummary {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl OperationSummary {
    fn new(elapsed: Duration) -> Self {
        Self {
            count: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn add(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / self.count as u32
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    operations: BTreeMap<&'static str, OperationSummary>,
}

/// Records how long pipeline operations take and logs a summary every
/// `interval`. Shared between the tick, completions and workers.
#[derive(Debug)]
pub struct Instrumentation {
    interval: Duration,
    window: Mutex<Window>,
}

impl Instrumentation {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window: Mutex::new(Window {
                started: Instant::now(),
                operations: BTreeMap::new(),
            }),
        }
    }

    /// Add one sample for `operation`
    pub fn record(&self, operation: &'static str, elapsed: Duration) {
        let mut window = self.window.lock().unwrap();
        window
            .operations
            .entry(operation)
            .and_modify(|s| s.add(elapsed))
            .or_insert_with(|| OperationSummary::new(elapsed));
    }

    /// Run `f`, recording its duration under `operation`
    pub fn time<R>(&self, operation: &'static str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(operation, start.elapsed());
        result
    }

    /// Current window contents
    pub fn snapshot(&self) -> BTreeMap<&'static str, OperationSummary> {
        self.window.lock().unwrap().operations.clone()
    }

    /// Log and reset the window if `interval` has elapsed since it opened.
    /// Returns whether a summary was emitted.
    pub fn maybe_emit(&self, now: Instant) -> bool {
        let operations = {
            let mut window = self.window.lock().unwrap();
            if now.saturating_duration_since(window.started) < self.interval {
                return false;
            }
            window.started = now;
            std::mem::take(&mut window.operations)
        };

        for (name, summary) in &operations {
            log::info!(
                "timing {}: n={} mean={:.3}ms min={:.3}ms max={:.3}ms",
                name,
                summary.count,
                summary.mean().as_secs_f64() * 1e3,
                summary.min.as_secs_f64() * 1e3,
                summary.max.as_secs_f64() * 1e3,
            );
        }
        true
    }
}

/// Record into `instrumentation` when it is enabled
pub(crate) fn record(
    instrumentation: &Option<std::sync::Arc<Instrumentation>>,
    operation: &'static str,
    elapsed: Duration,
) {
    if let Some(instr) = instrumentation {
        instr.record(operation, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let instr = Instrumentation::new(Duration::from_secs(60));
        instr.record("encode", Duration::from_millis(2));
        instr.record("encode", Duration::from_millis(4));
        instr.record("send", Duration::from_millis(1));

        let snap = instr.snapshot();
        let encode = snap["encode"];
        assert_eq!(encode.count, 2);
        assert_eq!(encode.min, Duration::from_millis(2));
        assert_eq!(encode.max, Duration::from_millis(4));
        assert_eq!(encode.mean(), Duration::from_millis(3));
        assert_eq!(snap["send"].count, 1);
    }

    #[test]
    fn test_emit_resets_window() {
        let instr = Instrumentation::new(Duration::from_millis(10));
        let value = instr.time("work", || 41 + 1);
        assert_eq!(value, 42);

        let start = Instant::now();
        assert!(!instr.maybe_emit(start));
        assert!(instr.maybe_emit(start + Duration::from_millis(50)));
        assert!(instr.snapshot().is_empty());
    }
}
