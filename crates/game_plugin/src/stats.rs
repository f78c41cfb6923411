// crates/game_plugin/src/stats.rs

use engine_shared::events::KeyInput;
use glam::Vec2;

/// What the plugin has seen since it was attached.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub loads: u32,
    pub updates: u64,
    pub simulated: f64,
    pub key_presses: u64,
    pub cursor_travel: f32,
    last_cursor: Option<Vec2>,
}

impl SessionStats {
    pub fn record_update(&mut self, dt: f32) {
        self.updates += 1;
        self.simulated += f64::from(dt);
    }

    /// Auto-repeat and releases don't count.
    pub fn record_key(&mut self, input: &KeyInput) {
        if input.pressed && !input.repeat {
            self.key_presses += 1;
        }
    }

    pub fn record_cursor(&mut self, position: Vec2) {
        if let Some(last) = self.last_cursor {
            self.cursor_travel += last.distance(position);
        }
        self.last_cursor = Some(position);
    }

    pub fn summary(&self) -> String {
        format!(
            "{} updates, {:.2}s simulated, {} key presses, cursor travelled {:.0}px",
            self.updates, self.simulated, self.key_presses, self.cursor_travel
        )
    }
}
