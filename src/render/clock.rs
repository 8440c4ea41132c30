/// Simulation clock shared by the animation loop and the renderer.
///
/// In interactive use the clock free-runs (`advance` adds wall-clock deltas while running). During
/// export it is stopped and driven to explicit timestamps with `set_time`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clock {
    time_ms: f64,
    running: bool,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// A running clock at t=0.
    pub fn new() -> Self {
        Self {
            time_ms: 0.0,
            running: true,
        }
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn reset(&mut self) {
        self.time_ms = 0.0;
    }

    /// Jump to an absolute timestamp, regardless of the running state.
    pub fn set_time(&mut self, time_ms: f64) {
        self.time_ms = time_ms;
    }

    /// Add `delta_ms` when running; a stopped clock ignores deltas.
    pub fn advance(&mut self, delta_ms: f64) {
        if self.running {
            self.time_ms += delta_ms;
        }
    }
}
