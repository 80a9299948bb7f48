//! Structured progress events.
//!
//! The pipeline never configures logging itself: it hands [`Event`]s to an
//! injected [`EventSink`]. [`TracingSink`] forwards them to `tracing` (which in
//! turn reaches `log`), [`MemorySink`] keeps them for inspection.

use compact_str::CompactString;
use parking_lot::Mutex;

use crate::error::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub stage: Stage,
    pub view: Option<CompactString>,
    pub count: Option<usize>,
    pub detail: Option<String>,
}

impl Event {
    #[must_use]
    pub const fn new(level: Level, stage: Stage) -> Self {
        Self {
            level,
            stage,
            view: None,
            count: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn view(mut self, view: &str) -> Self {
        self.view = Some(view.into());
        self
    }

    #[must_use]
    pub const fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events to `tracing`, one target per stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        let view = event.view.as_deref().unwrap_or("-");
        let count = event
            .count
            .map(|n| format!(" \x1b[36m{n}\x1b[0m"))
            .unwrap_or_default();
        let detail = event.detail.as_deref().unwrap_or_default();

        macro_rules! forward {
            ($mac:ident) => {
                match event.stage {
                    Stage::Launch => tracing::$mac!(target: "launch", "[{view}]{count} {detail}"),
                    Stage::Login => tracing::$mac!(target: "login", "[{view}]{count} {detail}"),
                    Stage::Collect => tracing::$mac!(target: "collect", "[{view}]{count} {detail}"),
                    Stage::Classify => tracing::$mac!(target: "classify", "[{view}]{count} {detail}"),
                }
            };
        }

        match event.level {
            Level::Debug => forward!(debug),
            Level::Info => forward!(info),
            Level::Warn => forward!(warn),
            Level::Error => forward!(error),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn at_least(&self, level: Level) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level >= level)
            .cloned()
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}
