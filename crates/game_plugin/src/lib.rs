// crates/game_plugin/src/lib.rs
//! Sample plugin: keeps session statistics and reports them through the
//! host log.

mod stats;

use std::cell::RefCell;

use engine_shared::events::{CursorMoved, KeyInput, Load, Unload, Update};
use engine_shared::{
    Event, EventListener, EventRef, EventTypeId, HostContext, HostRef, LogLevel, Plugin,
    PluginContext,
};

use stats::SessionStats;

/// Updates between two progress reports.
const REPORT_EVERY: u64 = 600;

pub struct GamePlugin {
    host: HostRef,
    stats: RefCell<SessionStats>,
}

impl EventListener for GamePlugin {
    fn on_event(&self, event: &EventRef<'_>) {
        let mut stats = self.stats.borrow_mut();

        if let Some(update) = event.get::<Update>() {
            stats.record_update(update.dt);
            if update.frame % REPORT_EVERY == 0 {
                self.host.log(LogLevel::Info, &stats.summary());
            }
        } else if let Some(input) = event.get::<KeyInput>() {
            stats.record_key(input);
        } else if let Some(moved) = event.get::<CursorMoved>() {
            stats.record_cursor(moved.position);
        } else if event.is::<Load>() {
            stats.loads += 1;
            self.host.log(LogLevel::Info, "game plugin running");
        } else if event.is::<Unload>() {
            self.host.log(LogLevel::Info, &format!("session over: {}", stats.summary()));
        }
    }
}

impl Plugin for GamePlugin {
    const NAME: &'static str = "game_plugin";
    const SUBSCRIPTIONS: &'static [EventTypeId] = &[
        Load::ID,
        Update::ID,
        Unload::ID,
        KeyInput::ID,
        CursorMoved::ID,
    ];

    fn attach(ctx: &PluginContext) -> Option<Self> {
        let host = ctx.host();
        host.log(
            LogLevel::Debug,
            &format!("game plugin attached at frame {}", host.time().frame),
        );

        Some(Self {
            host,
            stats: RefCell::new(SessionStats::default()),
        })
    }

    fn detach(&self, host: &HostContext) {
        let stats = self.stats.borrow();
        host.log(
            LogLevel::Debug,
            &format!("game plugin detached after {} updates", stats.updates),
        );
    }
}

engine_shared::export_plugin!(GamePlugin);
