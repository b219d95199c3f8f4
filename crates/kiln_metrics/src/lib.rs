//! Kiln Metrics - counters and timings for scene storage
//!
//! Provides zero-cost abstractions for metrics collection that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use kiln_metrics::{Counter, SystemProfiler};
//!
//! let mut counter = Counter::new();
//! counter.increment("reallocations", 1);
//!
//! let mut profiler = SystemProfiler::new();
//! let bytes = profiler.time_system("serialize", || encode(&scene));
//! ```
//!
//! In production builds (without `metrics` feature), all instrumentation
//! is compiled out to zero overhead.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod system_profiler;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use system_profiler::{SystemProfiler, Timing};

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _key: &'static str, _by: usize) {}
    pub fn get(&self, _key: &str) -> usize { 0 }
    pub fn snapshot(&self) -> Vec<(&'static str, usize)> { Vec::new() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub total: std::time::Duration,
    pub calls: u32,
}

#[cfg(not(feature = "metrics"))]
impl Timing {
    pub fn average(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct SystemProfiler;

#[cfg(not(feature = "metrics"))]
impl SystemProfiler {
    pub fn new() -> Self { Self }
    pub fn time_system<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn get_timing(&self, _name: &str) -> Timing { Timing::default() }
    pub fn reset(&mut self) {}
    pub fn snapshot(&self) -> Vec<(String, Timing)> { Vec::new() }
}
