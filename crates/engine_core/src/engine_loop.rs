// crates/engine_core/src/engine_loop.rs

use std::time::Instant;

use engine_shared::events::Update;
use engine_shared::HostContext;

/// Fixed-timestep bookkeeping (frame timer, accumulator, step cap).
///
/// Each step advances the host clock and publishes `Update` on the bus.
pub struct EngineLoop {
    last_frame_time: Instant,
    sim_accumulator: f32,
    sim_dt: f32,
    max_steps_per_frame: u32,
}

impl EngineLoop {
    pub fn new(sim_dt: f32, max_steps_per_frame: u32) -> Self {
        Self {
            last_frame_time: Instant::now(),
            sim_accumulator: 0.0,
            sim_dt,
            max_steps_per_frame: max_steps_per_frame.max(1),
        }
    }

    pub fn sim_dt(&self) -> f32 {
        self.sim_dt
    }

    /// Restarts the frame timer and forgets any accumulated time.
    pub fn reset(&mut self) {
        self.last_frame_time = Instant::now();
        self.sim_accumulator = 0.0;
    }

    /// Update the frame timer and return the clamped frame delta.
    /// Clamps to 0.25s to avoid giant spikes after a stall (breakpoints, slow I/O).
    pub fn tick_timer(&mut self) -> f32 {
        let now = Instant::now();
        let frame_dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        frame_dt.min(0.25)
    }

    /// Runs fixed steps until the accumulator is caught up or the step cap is
    /// hit. A backlog left at the cap is dropped rather than chased.
    pub fn update_simulation(&mut self, frame_dt: f32, host: &HostContext) -> u32 {
        self.sim_accumulator += frame_dt;

        let mut steps = 0;
        while self.sim_accumulator >= self.sim_dt && steps < self.max_steps_per_frame {
            let time = host.advance(self.sim_dt);
            host.bus().publish(&Update {
                frame: time.frame,
                dt: self.sim_dt,
            });
            self.sim_accumulator -= self.sim_dt;
            steps += 1;
        }

        // Prevent unbounded backlog if we're constantly saturated.
        if steps == self.max_steps_per_frame && self.sim_accumulator >= self.sim_dt {
            self.sim_accumulator = 0.0;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use engine_shared::{Event, EventListener, EventRef, Listener};

    use super::*;

    #[derive(Default)]
    struct Frames(RefCell<Vec<u64>>);

    impl EventListener for Frames {
        fn on_event(&self, event: &EventRef<'_>) {
            if let Some(update) = event.get::<Update>() {
                self.0.borrow_mut().push(update.frame);
            }
        }
    }

    #[test]
    fn runs_whole_steps_and_keeps_the_remainder() {
        let host = HostContext::new();
        let mut engine_loop = EngineLoop::new(0.25, 5);

        assert_eq!(engine_loop.update_simulation(0.625, &host), 2);
        assert_eq!(host.time().frame, 2);
        assert_eq!(engine_loop.update_simulation(0.125, &host), 1);
        assert_eq!(host.time().frame, 3);
        assert_eq!(engine_loop.update_simulation(0.125, &host), 0);
    }

    #[test]
    fn drops_backlog_at_the_step_cap() {
        let host = HostContext::new();
        let mut engine_loop = EngineLoop::new(0.25, 3);

        assert_eq!(engine_loop.update_simulation(10.0, &host), 3);
        assert_eq!(engine_loop.update_simulation(0.0, &host), 0);
        assert_eq!(host.time().frame, 3);
    }

    #[test]
    fn publishes_an_update_per_step() {
        let host = HostContext::new();
        let frames = Listener::new(host.bus(), Frames::default());
        frames.subscribe::<Update>();

        let mut engine_loop = EngineLoop::new(0.5, 5);
        engine_loop.update_simulation(1.5, &host);

        assert_eq!(*frames.0.borrow(), vec![1, 2, 3]);
        assert_eq!(host.bus().listener_count(Update::ID), 1);
        assert_eq!(host.time().elapsed, 1.5);
    }
}
