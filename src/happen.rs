//! The Happen entity: one named world event with a compiled activation
//! condition, an action table, and four multicast callback lists.
//!
//! A Happen never runs behavior itself. Behavior code subscribes closures to
//! the lifecycle lists (init, abstract-update, realized-update, core-update)
//! and the Happen dispatches them at the right phase of the tick:
//!
//! ```text
//! every tick          core_update:   step triggers -> eval tree -> notify
//!                                    triggers -> core list -> sample time
//! while active, per   abstract_update: init list (first time) -> abstract list
//! applicable zone     realized_update: init list (first time) -> realized
//!                                      list -> sample time
//! ```
//!
//! Subscribers are untrusted extension code. An `Err` from a subscriber is
//! reported and permanently unsubscribes it (init subscribers are only
//! reported); an `Err` from a trigger's own update is reported and the trigger
//! is kept. No failure crosses to a sibling callback, trigger, or Happen.

use crate::api::HappenConfig;
use crate::engine::{
    CORE_WINDOW, FrameSampler, PerfReport, PredicateFn, PredicateTree, REALIZED_WINDOW, Trigger,
    TriggerInit, TriggerRegistry,
};
use crate::happen_set::BuildError;
use crate::{ArgSet, SessionInfo, ZoneId};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-unique Happen identifier. Ordering and equality only; ids are never
/// reused within a process but carry no other meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HappenId(u64);

impl HappenId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        HappenId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle returned by the subscribe methods; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Init subscriber: runs once, before the first zone-scoped dispatch. The
/// argument is the zone whose tick triggered initialization.
pub type InitFn = Box<dyn FnMut(&ZoneId) -> anyhow::Result<()>>;
/// Abstract-update subscriber: coarse zone simulation, with the host's elapsed
/// tick delta.
pub type AbstractFn = Box<dyn FnMut(&ZoneId, u32) -> anyhow::Result<()>>;
/// Realized-update subscriber: full-detail zone simulation, every tick.
pub type RealizedFn = Box<dyn FnMut(&ZoneId) -> anyhow::Result<()>>;
/// Core-update subscriber: runs every session tick regardless of zones.
pub type CoreFn = Box<dyn FnMut(&SessionInfo) -> anyhow::Result<()>>;

// --- Callback lists ----------------------------------------------------------

/// One multicast list. Dispatch order is subscription order; dispatch walks a
/// snapshot of ids taken at entry, so a removal mid-pass neither re-delivers
/// nor skips a surviving subscriber.
struct CallbackList<F> {
    label: &'static str,
    next_id: u64,
    entries: Vec<(CallbackId, F)>,
}

impl<F> CallbackList<F> {
    fn new(label: &'static str) -> Self {
        CallbackList { label, next_id: 0, entries: Vec::new() }
    }

    fn subscribe(&mut self, f: F) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, f));
        id
    }

    fn unsubscribe(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(eid, _)| *eid != id);
        self.entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Dispatches to every subscriber; an `Err` unsubscribes the offender.
    fn dispatch(&mut self, owner: &str, mut call: impl FnMut(&mut F) -> anyhow::Result<()>) {
        let snapshot: Vec<CallbackId> = self.entries.iter().map(|(id, _)| *id).collect();
        for id in snapshot {
            let Some(ix) = self.entries.iter().position(|(eid, _)| *eid == id) else {
                continue;
            };
            if let Err(err) = call(&mut self.entries[ix].1) {
                tracing::error!(
                    happen = owner,
                    list = self.label,
                    %err,
                    "subscriber raised an error; unsubscribing it"
                );
                self.entries.remove(ix);
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch) but keeps failing subscribers (used
    /// for the one-shot init list, where unsubscribing changes nothing).
    fn dispatch_keep(&mut self, owner: &str, mut call: impl FnMut(&mut F) -> anyhow::Result<()>) {
        for (_, f) in &mut self.entries {
            if let Err(err) = call(f) {
                tracing::error!(
                    happen = owner,
                    list = self.label,
                    %err,
                    "subscriber raised an error during init"
                );
            }
        }
    }
}

// --- Happen ------------------------------------------------------------------

/// One named world event.
pub struct Happen {
    id: HappenId,
    name: String,
    actions: Vec<(String, ArgSet)>,
    conditions: Option<PredicateTree>,
    /// One trigger per condition atom, in leaf order. Shared only with the
    /// tree's bound predicate closures, never across Happens.
    triggers: Vec<Rc<RefCell<Box<dyn Trigger>>>>,
    init: CallbackList<InitFn>,
    on_abstract: CallbackList<AbstractFn>,
    on_realized: CallbackList<RealizedFn>,
    on_core: CallbackList<CoreFn>,
    active: bool,
    init_ran: bool,
    core_sampler: FrameSampler,
    realized_sampler: FrameSampler,
}

impl Happen {
    /// Builds a Happen from its configuration record.
    ///
    /// Missing actions or a missing WHEN clause are configuration warnings: the
    /// Happen is built with an empty action table or as always-active. A WHEN
    /// clause that fails to parse, or that references an unknown trigger type,
    /// aborts this Happen only.
    pub fn new(cfg: &HappenConfig, registry: &TriggerRegistry) -> Result<Self, BuildError> {
        let name = cfg.name.clone();
        if cfg.actions.is_empty() {
            tracing::warn!(happen = %name, "no actions configured; happen will drive no behavior");
        }
        let actions: Vec<(String, ArgSet)> = cfg
            .actions
            .iter()
            .map(|(action, raw)| (action.clone(), ArgSet::new(raw)))
            .collect();

        let mut triggers: Vec<Rc<RefCell<Box<dyn Trigger>>>> = Vec::new();
        let conditions = match &cfg.conditions {
            None => {
                tracing::warn!(happen = %name, "no activation condition; happen is always active");
                None
            }
            Some(src) => {
                let mut tree = PredicateTree::parse(src)
                    .map_err(|source| BuildError::Parse { happen: name.clone(), source })?;
                let init = TriggerInit { happen_name: &name };
                tree.populate(|type_name, args| {
                    let trigger = registry.create(type_name, args, &init)?;
                    let shared = Rc::new(RefCell::new(trigger));
                    triggers.push(Rc::clone(&shared));
                    Ok(Box::new(move || shared.borrow().should_run()) as PredicateFn)
                })
                .map_err(|source| BuildError::Trigger { happen: name.clone(), source })?;
                Some(tree)
            }
        };

        let active = conditions.is_none();
        Ok(Happen {
            id: HappenId::next(),
            name,
            actions,
            conditions,
            triggers,
            init: CallbackList::new("init"),
            on_abstract: CallbackList::new("abstract-update"),
            on_realized: CallbackList::new("realized-update"),
            on_core: CallbackList::new("core-update"),
            active,
            init_ran: false,
            core_sampler: FrameSampler::new(CORE_WINDOW),
            realized_sampler: FrameSampler::new(REALIZED_WINDOW),
        })
    }

    pub fn id(&self) -> HappenId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Action table in source order.
    pub fn actions(&self) -> &[(String, ArgSet)] {
        &self.actions
    }

    /// Result of the last condition evaluation (true when no condition).
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn init_ran(&self) -> bool {
        self.init_ran
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    // --- Subscription --------------------------------------------------------

    pub fn subscribe_init(&mut self, f: InitFn) -> CallbackId {
        self.init.subscribe(f)
    }

    pub fn subscribe_abstract(&mut self, f: AbstractFn) -> CallbackId {
        self.on_abstract.subscribe(f)
    }

    pub fn subscribe_realized(&mut self, f: RealizedFn) -> CallbackId {
        self.on_realized.subscribe(f)
    }

    pub fn subscribe_core(&mut self, f: CoreFn) -> CallbackId {
        self.on_core.subscribe(f)
    }

    pub fn unsubscribe_init(&mut self, id: CallbackId) -> bool {
        self.init.unsubscribe(id)
    }

    pub fn unsubscribe_abstract(&mut self, id: CallbackId) -> bool {
        self.on_abstract.unsubscribe(id)
    }

    pub fn unsubscribe_realized(&mut self, id: CallbackId) -> bool {
        self.on_realized.unsubscribe(id)
    }

    pub fn unsubscribe_core(&mut self, id: CallbackId) -> bool {
        self.on_core.unsubscribe(id)
    }

    // --- Lifecycle dispatch --------------------------------------------------

    /// One session tick. Runs the full core protocol:
    ///
    /// 1. step every trigger (faults reported, trigger kept),
    /// 2. re-evaluate the condition tree into `active`,
    /// 3. notify every trigger of the overall result,
    /// 4. dispatch the core-update list,
    /// 5. record elapsed time into the core sampler.
    pub fn core_update(&mut self, session: &SessionInfo) {
        let started = Instant::now();
        let owner = self.to_string();

        for trigger in &self.triggers {
            if let Err(err) = trigger.borrow_mut().update() {
                tracing::error!(happen = %owner, %err, "trigger update failed; keeping trigger");
            }
        }

        self.active = match &self.conditions {
            Some(tree) => tree.eval(),
            None => true,
        };

        let active = self.active;
        for trigger in &self.triggers {
            trigger.borrow_mut().eval_results(active);
        }

        self.on_core.dispatch(&owner, |f| f(session));
        self.core_sampler.record(started.elapsed());
    }

    /// Abstract (coarse) update for one applicable zone. Caller gates on
    /// [`is_active`](Self::is_active).
    pub fn abstract_update(&mut self, zone: &ZoneId, elapsed: u32) {
        self.run_init(zone);
        let owner = self.to_string();
        self.on_abstract.dispatch(&owner, |f| f(zone, elapsed));
    }

    /// Realized (full-detail) update for one applicable zone. Caller gates on
    /// [`is_active`](Self::is_active).
    pub fn realized_update(&mut self, zone: &ZoneId) {
        self.run_init(zone);
        let started = Instant::now();
        let owner = self.to_string();
        self.on_realized.dispatch(&owner, |f| f(zone));
        self.realized_sampler.record(started.elapsed());
    }

    /// Runs the init list once, best-effort: failing subscribers are reported
    /// but `init_ran` flips regardless, so init never re-runs.
    fn run_init(&mut self, zone: &ZoneId) {
        if self.init_ran {
            return;
        }
        self.init_ran = true;
        let owner = self.to_string();
        self.init.dispatch_keep(&owner, |f| f(zone));
    }

    /// Point-in-time profiling summary. Averages are NaN until the first
    /// sampling window completes.
    pub fn perf_record(&self) -> PerfReport {
        PerfReport {
            name: self.name.clone(),
            avg_core_ms: self.core_sampler.average_ms(),
            core_samples: self.core_sampler.samples(),
            avg_realized_ms: self.realized_sampler.average_ms(),
            realized_samples: self.realized_sampler.samples(),
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.init.len() + self.on_abstract.len() + self.on_realized.len() + self.on_core.len()
    }
}

impl std::fmt::Display for Happen {
    /// `name[action, names](N triggers)`, the form used in fault reports.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let acts: Vec<&str> = self.actions.iter().map(|(a, _)| a.as_str()).collect();
        write!(f, "{}[{}]({} triggers)", self.name, acts.join(", "), self.triggers.len())
    }
}

impl PartialEq for Happen {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Happen {}

impl PartialOrd for Happen {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Happen {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::fmt::Debug for Happen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Happen")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("actions", &self.actions)
            .field("triggers", &self.triggers.len())
            .field("active", &self.active)
            .field("init_ran", &self.init_ran)
            .finish()
    }
}
