/// Instrumentation for the frame pipeline: per-subsystem call counters,
/// feature-gated so release builds pay nothing.
pub mod profiling;

pub use profiling::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};
