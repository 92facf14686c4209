//! Tether Metrics - bridge bookkeeping counters
//!
//! Counts lifetime transitions (wraps, pins, finalizations, rescues) so
//! leaks and double frees show up as numbers instead of crashes.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable counter collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tether_metrics::Counter;
//!
//! let mut counter = Counter::new();
//! counter.increment("wraps", 1);
//! println!("wraps: {}", counter.get("wraps"));
//! ```
//!
//! In production builds (without `metrics` feature), all instrumentation
//! is compiled out to zero overhead.

#[cfg(feature = "metrics")]
mod counter;

#[cfg(feature = "metrics")]
pub use counter::Counter;

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
///
/// The `cfg` is evaluated in the calling crate, so callers forward their own
/// `metrics` feature to `tether_metrics/metrics`.
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
}
