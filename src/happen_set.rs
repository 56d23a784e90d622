//! Session-scoped aggregate of every Happen, with the zone applicability
//! index and the per-tick fanout entry points.
//!
//! A [`HappenSet`] is built once from the session's [`WorldData`] and dropped
//! when the session ends. Construction is isolating: a Happen whose WHEN or
//! WHERE clause is bad is reported and skipped, and its siblings build
//! normally. The zone index is inverted once at construction and never
//! changes afterwards.

use crate::api::{Binder, WorldData};
use crate::engine::{ParseError, PerfReport, TriggerRegistry};
use crate::groups::{GroupResolver, parse_where};
use crate::happen::Happen;
use crate::{SessionInfo, ZoneId};
use std::collections::{HashMap, HashSet};

/// Per-Happen construction failure. Aborts the one Happen it names, never the
/// set build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("happen `{happen}`: WHEN clause: {source}")]
    Parse {
        happen: String,
        #[source]
        source: ParseError,
    },
    #[error("happen `{happen}`: trigger construction: {source}")]
    Trigger {
        happen: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("happen `{happen}`: WHERE clause: {source}")]
    Where {
        happen: String,
        #[source]
        source: ParseError,
    },
}

/// All Happens of one session plus the zone index they dispatch through.
pub struct HappenSet {
    happens: Vec<Happen>,
    resolver: GroupResolver,
    by_zone: HashMap<ZoneId, Vec<usize>>,
    tick: u64,
}

impl HappenSet {
    /// Builds the set. Bad group definitions and bad Happens are reported and
    /// skipped; the returned set may be empty and that is still a session.
    ///
    /// Each surviving Happen is offered to every binder exactly once so
    /// behavior code can subscribe its lifecycle callbacks.
    pub fn build(data: &WorldData, registry: &TriggerRegistry, binders: &mut [Binder]) -> Self {
        let mut resolver = GroupResolver::new();
        for (name, expr) in &data.groups {
            if let Err(err) = resolver.define_expr(name.clone(), expr) {
                tracing::warn!(group = %name, %err, "bad group definition; skipping group");
            }
        }

        let mut happens = Vec::new();
        let mut by_zone: HashMap<ZoneId, Vec<usize>> = HashMap::new();
        for cfg in &data.happens {
            let (mut happen, zones) = match Self::build_one(cfg, registry, &mut resolver) {
                Ok(built) => built,
                Err(err) => {
                    tracing::error!(%err, "skipping happen");
                    continue;
                }
            };
            for binder in binders.iter_mut() {
                if let Err(err) = binder(&mut happen) {
                    tracing::error!(happen = %happen, %err, "binder failed for happen");
                }
            }
            let ix = happens.len();
            for zone in zones {
                by_zone.entry(zone).or_default().push(ix);
            }
            happens.push(happen);
        }

        HappenSet { happens, resolver, by_zone, tick: 0 }
    }

    /// Builds one Happen and resolves its applicable zones. Multiple WHERE
    /// clauses union together.
    fn build_one(
        cfg: &crate::HappenConfig,
        registry: &TriggerRegistry,
        resolver: &mut GroupResolver,
    ) -> Result<(Happen, HashSet<ZoneId>), BuildError> {
        let happen = Happen::new(cfg, registry)?;
        let mut zones = HashSet::new();
        for clause in &cfg.zones {
            let terms = parse_where(clause)
                .map_err(|source| BuildError::Where { happen: cfg.name.clone(), source })?;
            zones.extend(resolver.resolve_terms(&terms));
        }
        if zones.is_empty() {
            tracing::warn!(happen = %happen, "no applicable zones; happen will only core-update");
        }
        Ok((happen, zones))
    }

    /// One session tick: core update for every Happen in creation order, then
    /// the tick counter advances.
    pub fn core_tick(&mut self) {
        let session = SessionInfo { tick: self.tick };
        for happen in &mut self.happens {
            happen.core_update(&session);
        }
        self.tick += 1;
    }

    /// Abstract update fanout for one zone, gated on each Happen's activity.
    pub fn zone_abstract_tick(&mut self, zone: &ZoneId, elapsed: u32) {
        let Some(ixs) = self.by_zone.get(zone).cloned() else {
            return;
        };
        for ix in ixs {
            let happen = &mut self.happens[ix];
            if happen.is_active() {
                happen.abstract_update(zone, elapsed);
            }
        }
    }

    /// Realized update fanout for one zone, gated on each Happen's activity.
    pub fn zone_realized_tick(&mut self, zone: &ZoneId) {
        let Some(ixs) = self.by_zone.get(zone).cloned() else {
            return;
        };
        for ix in ixs {
            let happen = &mut self.happens[ix];
            if happen.is_active() {
                happen.realized_update(zone);
            }
        }
    }

    /// Happens applicable to `zone`, active or not, in creation order. Total:
    /// an unknown zone yields an empty vec.
    pub fn happens_for_zone(&self, zone: &ZoneId) -> Vec<&Happen> {
        self.by_zone
            .get(zone)
            .map(|ixs| ixs.iter().map(|&ix| &self.happens[ix]).collect())
            .unwrap_or_default()
    }

    /// First Happen registered under `name`, when duplicates exist.
    pub fn find_by_name(&self, name: &str) -> Option<&Happen> {
        self.happens.iter().find(|h| h.name() == name)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Happen> {
        self.happens.iter_mut().find(|h| h.name() == name)
    }

    /// All Happens in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Happen> {
        self.happens.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Happen> {
        self.happens.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.happens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.happens.is_empty()
    }

    /// Completed core ticks this session.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn groups(&self) -> &GroupResolver {
        &self.resolver
    }

    /// Profiling summaries for every Happen, in creation order.
    pub fn perf_records(&self) -> Vec<PerfReport> {
        self.happens.iter().map(Happen::perf_record).collect()
    }
}

impl std::fmt::Debug for HappenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HappenSet")
            .field("happens", &self.happens)
            .field("zones", &self.by_zone.len())
            .field("tick", &self.tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HappenConfig, Trigger};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixed(bool);

    impl Trigger for Fixed {
        fn should_run(&self) -> bool {
            self.0
        }
    }

    fn registry() -> TriggerRegistry {
        let mut reg = TriggerRegistry::new();
        reg.register("always", Box::new(|_, _| Ok(Box::new(Fixed(true)))));
        reg.register("never", Box::new(|_, _| Ok(Box::new(Fixed(false)))));
        reg
    }

    fn cfg(name: &str, conditions: Option<&str>, zones: &[&str]) -> HappenConfig {
        HappenConfig {
            name: name.to_string(),
            actions: vec![("glow".to_string(), vec![])],
            conditions: conditions.map(str::to_string),
            zones: zones.iter().map(|z| z.to_string()).collect(),
        }
    }

    fn build(data: &WorldData) -> HappenSet {
        HappenSet::build(data, &registry(), &mut [])
    }

    #[test]
    fn bad_happens_are_skipped_and_siblings_survive() {
        let data = WorldData {
            groups: vec![],
            happens: vec![
                cfg("broken-when", Some("a & ("), &["SU_1"]),
                cfg("broken-where", None, &["SU_1 +"]),
                cfg("unknown-trigger", Some("nonesuch"), &["SU_1"]),
                cfg("fine", None, &["SU_1"]),
            ],
        };
        let set = build(&data);
        assert_eq!(set.len(), 1);
        assert!(set.find_by_name("fine").is_some());
    }

    #[test]
    fn where_clauses_union_and_groups_resolve() {
        let data = WorldData {
            groups: vec![("first".to_string(), "SU_3 SU_4".to_string())],
            happens: vec![cfg("h", None, &["first + SU_1 - SU_3", "SU_9"])],
        };
        let set = build(&data);
        for zone in ["SU_1", "SU_4", "SU_9"] {
            assert_eq!(set.happens_for_zone(&ZoneId::from(zone)).len(), 1, "zone {zone}");
        }
        for zone in ["SU_3", "SU_2"] {
            assert!(set.happens_for_zone(&ZoneId::from(zone)).is_empty(), "zone {zone}");
        }
    }

    #[test]
    fn unknown_zone_lookup_is_total() {
        let set = build(&WorldData { groups: vec![], happens: vec![] });
        assert!(set.happens_for_zone(&ZoneId::from("nowhere")).is_empty());
    }

    #[test]
    fn find_by_name_prefers_the_first_registered() {
        let data = WorldData {
            groups: vec![],
            happens: vec![cfg("dup", None, &["SU_1"]), cfg("dup", None, &["SU_2"])],
        };
        let set = build(&data);
        assert_eq!(set.len(), 2);
        let found = set.find_by_name("dup").unwrap();
        assert_eq!(set.happens_for_zone(&ZoneId::from("SU_1"))[0].id(), found.id());
    }

    #[test]
    fn binders_run_once_per_surviving_happen() {
        let data = WorldData {
            groups: vec![],
            happens: vec![
                cfg("a", None, &["SU_1"]),
                cfg("bad", Some("("), &["SU_1"]),
                cfg("b", None, &["SU_1"]),
            ],
        };
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut binders: Vec<Binder> = vec![{
            let seen = Rc::clone(&seen);
            Box::new(move |happen: &mut Happen| {
                seen.borrow_mut().push(happen.name().to_string());
                Ok(())
            })
        }];
        let set = HappenSet::build(&data, &registry(), &mut binders);
        assert_eq!(set.len(), 2);
        assert_eq!(*seen.borrow(), ["a", "b"]);
    }

    #[test]
    fn zone_ticks_are_gated_on_activity() {
        let data = WorldData {
            groups: vec![],
            happens: vec![cfg("gated", Some("never"), &["SU_1"]), cfg("open", None, &["SU_1"])],
        };
        let mut set = build(&data);

        let hits = Rc::new(RefCell::new(Vec::new()));
        for name in ["gated", "open"] {
            let hits = Rc::clone(&hits);
            set.find_by_name_mut(name)
                .unwrap()
                .subscribe_realized(Box::new(move |_| {
                    hits.borrow_mut().push(name);
                    Ok(())
                }));
        }

        let zone = ZoneId::from("SU_1");
        set.core_tick();
        set.zone_realized_tick(&zone);
        assert_eq!(*hits.borrow(), ["open"]);
    }

    #[test]
    fn core_tick_counts_completed_ticks() {
        let data = WorldData { groups: vec![], happens: vec![cfg("h", None, &["SU_1"])] };
        let mut set = build(&data);

        let ticks = Rc::new(RefCell::new(Vec::new()));
        {
            let ticks = Rc::clone(&ticks);
            set.find_by_name_mut("h").unwrap().subscribe_core(Box::new(move |session| {
                ticks.borrow_mut().push(session.tick);
                Ok(())
            }));
        }

        set.core_tick();
        set.core_tick();
        set.core_tick();
        assert_eq!(*ticks.borrow(), [0, 1, 2]);
        assert_eq!(set.tick(), 3);
    }
}
