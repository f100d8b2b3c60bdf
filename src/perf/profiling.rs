/// Function call counters for the frame pipeline. Compiled to no-ops unless
/// the `profiling` feature is enabled.
use std::sync::atomic::{AtomicU64, Ordering};

pub struct FunctionCounters {
    // Streaming counters
    pub chunk_generation_calls: AtomicU64,
    pub chunk_load_calls: AtomicU64,

    // Lighting counters
    pub lighting_stage1_calls: AtomicU64,
    pub lighting_stage2_calls: AtomicU64,
    pub relight_chunk_calls: AtomicU64,

    // Meshing counters
    pub mesh_chunk_calls: AtomicU64,
    pub mesh_frontier_calls: AtomicU64,
    pub remesh_chunk_calls: AtomicU64,
}

impl FunctionCounters {
    pub const fn new() -> Self {
        Self {
            chunk_generation_calls: AtomicU64::new(0),
            chunk_load_calls: AtomicU64::new(0),
            lighting_stage1_calls: AtomicU64::new(0),
            lighting_stage2_calls: AtomicU64::new(0),
            relight_chunk_calls: AtomicU64::new(0),
            mesh_chunk_calls: AtomicU64::new(0),
            mesh_frontier_calls: AtomicU64::new(0),
            remesh_chunk_calls: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.chunk_generation_calls.store(0, Ordering::Relaxed);
        self.chunk_load_calls.store(0, Ordering::Relaxed);
        self.lighting_stage1_calls.store(0, Ordering::Relaxed);
        self.lighting_stage2_calls.store(0, Ordering::Relaxed);
        self.relight_chunk_calls.store(0, Ordering::Relaxed);
        self.mesh_chunk_calls.store(0, Ordering::Relaxed);
        self.mesh_frontier_calls.store(0, Ordering::Relaxed);
        self.remesh_chunk_calls.store(0, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            chunk_generation_calls: self.chunk_generation_calls.load(Ordering::Relaxed),
            chunk_load_calls: self.chunk_load_calls.load(Ordering::Relaxed),
            lighting_stage1_calls: self.lighting_stage1_calls.load(Ordering::Relaxed),
            lighting_stage2_calls: self.lighting_stage2_calls.load(Ordering::Relaxed),
            relight_chunk_calls: self.relight_chunk_calls.load(Ordering::Relaxed),
            mesh_chunk_calls: self.mesh_chunk_calls.load(Ordering::Relaxed),
            mesh_frontier_calls: self.mesh_frontier_calls.load(Ordering::Relaxed),
            remesh_chunk_calls: self.remesh_chunk_calls.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    pub chunk_generation_calls: u64,
    pub chunk_load_calls: u64,
    pub lighting_stage1_calls: u64,
    pub lighting_stage2_calls: u64,
    pub relight_chunk_calls: u64,
    pub mesh_chunk_calls: u64,
    pub mesh_frontier_calls: u64,
    pub remesh_chunk_calls: u64,
}

impl CounterSnapshot {
    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n=== Frame Pipeline Counters ===");
        println!("\nStreaming:");
        println!("  chunk_generation calls: {:12}", self.chunk_generation_calls);
        println!("  chunk_load calls:       {:12}", self.chunk_load_calls);

        println!("\nLighting:");
        println!("  lighting_stage1 calls:  {:12}", self.lighting_stage1_calls);
        println!("  lighting_stage2 calls:  {:12}", self.lighting_stage2_calls);
        println!("  relight_chunk calls:    {:12}", self.relight_chunk_calls);

        println!("\nMeshing:");
        println!("  mesh_chunk calls:       {:12}", self.mesh_chunk_calls);
        println!("  mesh_frontier calls:    {:12}", self.mesh_frontier_calls);
        println!("  remesh_chunk calls:     {:12}", self.remesh_chunk_calls);

        println!();
    }
}

/// Global function counters instance
pub static FUNCTION_COUNTERS: FunctionCounters = FunctionCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value, std::sync::atomic::Ordering::Relaxed);
        }
    };
}
