//! Wall-clock timings for named operations (scene save/load, bulk inserts)

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulated time and call count of one named operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub total: Duration,
    pub calls: u32,
}

impl Timing {
    /// Mean duration per call.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls
        }
    }
}

#[derive(Debug, Default)]
pub struct SystemProfiler {
    timings: HashMap<String, Timing>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, charging its wall-clock time to `name`.
    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let timing = self.timings.entry(name.to_string()).or_default();
        timing.total += start.elapsed();
        timing.calls = timing.calls.saturating_add(1);
        result
    }

    pub fn get_timing(&self, name: &str) -> Timing {
        self.timings.get(name).copied().unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    /// Timings sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Timing)> {
        let mut out: Vec<_> = self
            .timings
            .iter()
            .map(|(name, timing)| (name.clone(), *timing))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
