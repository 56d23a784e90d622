//! Host boundary.
//!
//! The host owns the simulation loop and the configuration loader; this
//! module is everything it talks to. [`Engine`] is the process-wide state
//! (trigger registry, binder list, current session); the `on_*` entry points
//! are the hooks the host calls from its own scheduling, in its order, on its
//! thread. The engine initiates nothing.

use crate::engine::TriggerRegistry;
use crate::happen::Happen;
use crate::happen_set::HappenSet;
use crate::ZoneId;

/// Configuration record for one Happen, as produced by the host's loader.
///
/// `actions` maps action names to their raw argument tokens, in source order;
/// `conditions` is the WHEN clause (absent means always active); `zones` holds
/// one or more WHERE clauses, which union together.
#[derive(Debug, Clone, Default)]
pub struct HappenConfig {
    pub name: String,
    pub actions: Vec<(String, Vec<String>)>,
    pub conditions: Option<String>,
    pub zones: Vec<String>,
}

/// Everything a session build needs: group definitions plus the Happen
/// configuration records, both in source order.
#[derive(Debug, Clone, Default)]
pub struct WorldData {
    /// `(group name, WHERE-style member expression)` pairs.
    pub groups: Vec<(String, String)>,
    pub happens: Vec<HappenConfig>,
}

/// Callback offered each newly built Happen, once, so behavior code can
/// subscribe lifecycle callbacks before the session starts ticking.
pub type Binder = Box<dyn FnMut(&mut Happen) -> anyhow::Result<()>>;

/// Process-wide engine state. Trigger types and binders are registered once
/// at host init and survive across sessions; the [`HappenSet`] is per-session.
#[derive(Default)]
pub struct Engine {
    registry: TriggerRegistry,
    binders: Vec<Binder>,
    current: Option<HappenSet>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    /// Trigger type registration surface, for host init.
    pub fn registry_mut(&mut self) -> &mut TriggerRegistry {
        &mut self.registry
    }

    /// Registers a binder. Binders run once per Happen built in every later
    /// session.
    pub fn register_binder(&mut self, binder: Binder) {
        self.binders.push(binder);
    }

    /// The current session's Happen set, if a session is loaded.
    pub fn current(&self) -> Option<&HappenSet> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut HappenSet> {
        self.current.as_mut()
    }

    // --- Host entry points ---------------------------------------------------

    /// Session start: builds a fresh set, replacing any previous session.
    /// Per-Happen build failures are logged and skipped; a set with zero
    /// surviving Happens is still a session.
    pub fn on_session_loaded(&mut self, data: &WorldData) -> Option<&HappenSet> {
        if self.current.is_some() {
            tracing::warn!("session loaded over a live session; dropping the old set");
        }
        self.current = Some(HappenSet::build(data, &self.registry, &mut self.binders));
        self.current.as_ref()
    }

    /// Session end: drops the set. Triggers, callbacks, and samplers go with
    /// it; the registry and binders stay.
    pub fn on_session_ended(&mut self) {
        self.current = None;
    }

    /// One core tick for every Happen. No-op outside a session.
    pub fn on_session_tick(&mut self) {
        if let Some(set) = &mut self.current {
            set.core_tick();
        }
    }

    /// Coarse update for one zone. No-op outside a session.
    pub fn on_zone_abstract_tick(&mut self, zone: &ZoneId, elapsed: u32) {
        if let Some(set) = &mut self.current {
            set.zone_abstract_tick(zone, elapsed);
        }
    }

    /// Full-detail update for one zone. No-op outside a session.
    pub fn on_zone_realized_tick(&mut self, zone: &ZoneId) {
        if let Some(set) = &mut self.current {
            set.zone_realized_tick(zone);
        }
    }
}
