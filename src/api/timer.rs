use crate::api::device::Device;
use crate::api::handle::SharedResource;

/// GPU stopwatch built on a timer query.
///
/// The query is started before a pass and ended right after it. Its result is
/// only read in [`fetch_elapsed_ms`](Self::fetch_elapsed_ms), which blocks, so
/// statistics readers decide when to pay for the sync.
#[derive(Debug, Default)]
pub struct GpuTimer {
    query: Option<SharedResource>,
    running: bool,
    pending: bool,
    elapsed_ms: f64,
}

impl GpuTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, device: &mut dyn Device) {
        if self.query.is_none() {
            match device.create_timer_query() {
                Ok(query) => self.query = Some(query),
                Err(err) => {
                    log::debug!("GPU timer unavailable: {err}");
                    return;
                }
            }
        }
        if let Some(query) = &self.query {
            device.begin_timer(query.handle());
            self.running = true;
        }
    }

    pub fn end(&mut self, device: &mut dyn Device) {
        if !self.running {
            return;
        }
        if let Some(query) = &self.query {
            device.end_timer(query.handle());
            self.pending = true;
        }
        self.running = false;
    }

    /// Elapsed time of the last finished measurement.
    pub fn fetch_elapsed_ms(&mut self, device: &mut dyn Device) -> f64 {
        if self.pending
            && let Some(query) = &self.query
        {
            if let Some(ns) = device.timer_result_ns(query.handle()) {
                self.elapsed_ms = ns as f64 / 1_000_000.0;
            }
            self.pending = false;
        }
        self.elapsed_ms
    }

    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
