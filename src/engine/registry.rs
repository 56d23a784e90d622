//! Trigger capability contract and factory registry.
//!
//! A *trigger type* is a case-sensitive name bound to a factory; a *trigger
//! instance* is the stateful object a factory builds for one atom of one
//! Happen's WHEN clause. Types are process-wide and registered once at host
//! init; instances live and die with their owning Happen's session.

use crate::args::ArgSet;
use std::collections::HashMap;

/// The capability contract every trigger instance implements.
///
/// Lifecycle per core-update tick, driven by the owning Happen:
///
/// 1. `update()` - advance internal timers/counters. An `Err` is reported and
///    isolated to this tick; the trigger is not removed.
/// 2. The predicate tree reads `should_run()` as this atom's truth value.
/// 3. `eval_results(active)` - receives the *tree's* overall result, so a
///    trigger can react to whether the larger expression is true, not just
///    its own atom.
pub trait Trigger {
    /// Per-tick step. Default: stateless trigger, nothing to advance.
    fn update(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Current truth value of this atom.
    fn should_run(&self) -> bool;

    /// Notification of the whole expression's result for this tick.
    fn eval_results(&mut self, _active: bool) {}
}

/// Construction-time context handed to a trigger factory.
///
/// The owning Happen is identified by display name rather than by reference;
/// at factory time the Happen is still being built.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInit<'a> {
    pub happen_name: &'a str,
}

/// Factory for one trigger type.
pub type TriggerFactory =
    Box<dyn Fn(&ArgSet, &TriggerInit<'_>) -> anyhow::Result<Box<dyn Trigger>>>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A WHEN clause referenced a trigger type nobody registered. Hard
    /// configuration error for the one Happen that referenced it.
    #[error("unknown trigger type `{0}`")]
    UnknownTrigger(String),
    #[error("trigger factory `{name}` failed: {source}")]
    Factory {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// String-keyed trigger factory registry.
///
/// Lives in the process-wide [`Engine`](crate::Engine) state, distinct from
/// the per-session [`HappenSet`](crate::HappenSet); there is no per-session
/// reset.
#[derive(Default)]
pub struct TriggerRegistry {
    factories: HashMap<String, TriggerFactory>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `type_name`. Re-registering a name replaces
    /// the previous factory (and is almost always a configuration mistake).
    pub fn register(&mut self, type_name: impl Into<String>, factory: TriggerFactory) {
        let type_name = type_name.into();
        if self.factories.insert(type_name.clone(), factory).is_some() {
            tracing::warn!(trigger = %type_name, "trigger type re-registered; replacing factory");
        }
    }

    /// Looks up and invokes the factory for `type_name`.
    pub fn create(
        &self,
        type_name: &str,
        args: &ArgSet,
        init: &TriggerInit<'_>,
    ) -> Result<Box<dyn Trigger>, RegistryError> {
        let Some(factory) = self.factories.get(type_name) else {
            tracing::warn!(
                trigger = type_name,
                registered = ?self.type_names(),
                "unknown trigger type"
            );
            return Err(RegistryError::UnknownTrigger(type_name.to_string()));
        };
        factory(args, init)
            .map_err(|source| RegistryError::Factory { name: type_name.to_string(), source })
    }

    /// Registered type names, sorted for stable output.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    impl Trigger for Fixed {
        fn should_run(&self) -> bool {
            self.0
        }
    }

    fn fixed_factory(value: bool) -> TriggerFactory {
        Box::new(move |_, _| Ok(Box::new(Fixed(value))))
    }

    #[test]
    fn create_is_case_sensitive() {
        let mut reg = TriggerRegistry::new();
        reg.register("Always", fixed_factory(true));

        let init = TriggerInit { happen_name: "test" };
        assert!(reg.create("Always", &argset![], &init).is_ok());
        match reg.create("always", &argset![], &init) {
            Err(RegistryError::UnknownTrigger(name)) => assert_eq!(name, "always"),
            other => panic!("expected UnknownTrigger, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn factory_receives_args_and_owner_name() {
        let mut reg = TriggerRegistry::new();
        reg.register(
            "threshold",
            Box::new(|args, init| {
                assert_eq!(init.happen_name, "storm");
                Ok(Box::new(Fixed(args.by_name(&["min"]).map(|a| a.as_i32() > 0).unwrap_or(false))))
            }),
        );

        let init = TriggerInit { happen_name: "storm" };
        let t = reg.create("threshold", &argset!["min=3"], &init).unwrap();
        assert!(t.should_run());
    }

    #[test]
    fn type_names_are_sorted() {
        let mut reg = TriggerRegistry::new();
        for name in ["karma", "always", "fortune"] {
            reg.register(name, fixed_factory(true));
        }
        assert_eq!(reg.type_names(), ["always", "fortune", "karma"]);
    }

    #[test]
    fn factory_errors_are_wrapped() {
        let mut reg = TriggerRegistry::new();
        reg.register("broken", Box::new(|_, _| anyhow::bail!("bad config")));

        let init = TriggerInit { happen_name: "test" };
        match reg.create("broken", &argset![], &init) {
            Err(RegistryError::Factory { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("expected Factory error, got {:?}", other.map(|_| ())),
        }
    }
}
