extern crate self as happenstance;

#[macro_use]
mod macros;
mod api;
mod args;
mod engine;
mod groups;
mod happen;
mod happen_set;

pub use api::{Binder, Engine, HappenConfig, WorldData};
pub use args::{Arg, ArgSet, VarSource};
pub use engine::{
    CORE_WINDOW, Expect, FrameSampler, HISTORY_CAP, ParseError, PerfReport, PredicateFn,
    PredicateTree, REALIZED_WINDOW, RegistryError, Trigger, TriggerDescriptor, TriggerFactory,
    TriggerInit, TriggerRegistry,
};
pub use groups::{GroupResolver, GroupTerm, Sign, parse_where};
pub use happen::{AbstractFn, CallbackId, CoreFn, Happen, HappenId, InitFn, RealizedFn};
pub use happen_set::{BuildError, HappenSet};

// --- Shared host-facing types -----------------------------------------------

/// Identifier of a spatial zone (a room). The two zone-scoped update phases
/// are keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        ZoneId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        ZoneId(s.to_string())
    }
}

impl From<String> for ZoneId {
    fn from(s: String) -> Self {
        ZoneId(s)
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-session tick context handed to core-update subscribers.
///
/// The engine never reads the wall clock for simulation decisions; `tick` is
/// the only notion of time it advances on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Number of completed core-update ticks for the current session.
    pub tick: u64,
}
