//! Predicate-expression engine.
//!
//! This module is the compile-and-evaluate half of the crate: it turns a
//! WHEN-clause string into an evaluable [`PredicateTree`] and provides the
//! trigger machinery its atoms bind to.
//!
//! ## How the parts work together
//!
//! ```text
//! WHEN string ── parse ──> PredicateTree          (parser.rs)
//!                              │ atoms: (type_name, ArgSet)
//!                              v
//!                  populate(bind) ── once, leaf order
//!                              │ bind consults TriggerRegistry (registry.rs)
//!                              │ and returns a PredicateFn per atom
//!                              v
//!                  eval() every core tick ──> bool (the Happen's Active)
//! ```
//!
//! The tree never owns or steps triggers. The owning Happen constructs one
//! trigger instance per atom during population and binds the atom to that
//! instance's truth query; stepping (`Trigger::update`) and the
//! activation-notification protocol (`Trigger::eval_results`) are driven by
//! the Happen's own per-tick update, not by `eval()`.
//!
//! ## Responsibilities by module
//!
//! - `parser.rs`: tokenizer, recursive-descent parser with position-reported
//!   errors, tree population and evaluation.
//! - `registry.rs`: the [`Trigger`] capability trait and the string-keyed
//!   factory registry (process-wide; trigger *types* are static, trigger
//!   *instances* are session-scoped).
//! - `metrics.rs`: fixed-window frame-time sampling with a bounded rolling
//!   history, and the per-Happen performance report.

#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/registry.rs"]
mod registry;

pub use metrics::{CORE_WINDOW, FrameSampler, HISTORY_CAP, PerfReport, REALIZED_WINDOW};
pub use parser::{Expect, ParseError, PredicateFn, PredicateTree, TriggerDescriptor};
pub use registry::{RegistryError, Trigger, TriggerFactory, TriggerInit, TriggerRegistry};
