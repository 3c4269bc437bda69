use crate::utils::time::Stopwatch;
use crate::api::{Device, GpuTimer};

/// Per-pass measurements of the last rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderStatistics {
    pub cpu_time_ms: f64,
    pub gpu_time_ms: f64,
    pub primitives: u64,
}

/// CPU and GPU timers of one pass.
#[derive(Debug, Default)]
pub(crate) struct PassTimers {
    cpu: Stopwatch,
    gpu: GpuTimer,
    stats: RenderStatistics,
}

impl PassTimers {
    pub fn begin(&mut self, device: &mut dyn Device) {
        self.cpu.start();
        self.gpu.begin(device);
    }

    pub fn end(&mut self, device: &mut dyn Device, primitives: u64) {
        self.gpu.end(device);
        self.stats.cpu_time_ms = self.cpu.stop();
        self.stats.primitives = primitives;
    }

    /// Statistics with the GPU time resolved. Blocks on a pending query.
    pub fn read(&mut self, device: &mut dyn Device) -> RenderStatistics {
        self.stats.gpu_time_ms = self.gpu.fetch_elapsed_ms(device);
        self.stats
    }

    /// Statistics without touching the GPU timer.
    pub fn peek(&self) -> RenderStatistics {
        self.stats
    }
}
