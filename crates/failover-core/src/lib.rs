// # failover-core
//
// Core library for the DNS failover control plane.
//
// ## Architecture Overview
//
// Two cooperating control loops share a relational results store:
//
// - **Monitor**: probes each provider's authoritative nameservers on a
//   fixed interval and appends scored results (`monitor`).
// - **StateMachine**: reads aggregated health scores and drives the
//   failover lifecycle through a safety-guarded transition graph
//   (`machine`, `safety`), persisting its state as an atomic JSON snapshot
//   (`state`), and moving the domain's NS delegation through a registrar
//   (`traits::Registrar`).
//
// ## Design Principles
//
// 1. **Seams are traits**: storage, probing, and the registrar are trait
//    objects so implementations stay in their own crates and tests can
//    script them.
// 2. **Tick-driven**: both loops are plain periodic evaluators; all
//    ordering within a tick is sequential.
// 3. **Over-cautious**: on any doubt (read errors, missing providers,
//    blocked transitions) the machine stays where it is. A missed failover
//    is cheaper than a spurious one.

pub mod error;
pub mod machine;
pub mod metrics;
pub mod monitor;
pub mod registrar;
pub mod safety;
pub mod score;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use error::{Error, Result};
pub use machine::StateMachine;
pub use monitor::Monitor;
pub use registrar::MockRegistrar;
pub use safety::{validate_transition, SafetyParams, SafetyViolation};
pub use state::{ControllerState, FailoverState, StateSeed, StateStore};
pub use traits::{
    HealthResult, HealthStore, NameserverProbe, ProbeOutcome, Provider, ProviderHealth,
    ProviderStore, Registrar, ResultStore,
};
