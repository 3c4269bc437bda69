use std::time::{Duration, Instant};

/// Frame clock: time since the last tick and since creation.
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Time since last tick
    pub delta: Duration,
    /// Total elapsed time since creation
    pub elapsed: Duration,
    /// Total number of ticks
    pub frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
    }

    #[must_use]
    pub fn dt_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// CPU stopwatch for a single measured section.
#[derive(Debug, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    last_ms: f64,
}

impl Stopwatch {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stops and returns the elapsed milliseconds. Without a start, returns
    /// the previous measurement.
    pub fn stop(&mut self) -> f64 {
        if let Some(start) = self.started.take() {
            self.last_ms = start.elapsed().as_secs_f64() * 1000.0;
        }
        self.last_ms
    }

    #[inline]
    #[must_use]
    pub fn last_ms(&self) -> f64 {
        self.last_ms
    }
}
