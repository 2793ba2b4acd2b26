//! # corrlink
//!
//! An entity correlation engine for asset aggregation: given the caller's
//! current grouping of adapter sightings into entities, discover which
//! records actually refer to the same real-world asset.
//!
//! The pipeline has four stages. A prefilter drops entities no rule could
//! match. A logic pass catches the same vendor record seen by two instances
//! of one adapter type. Heuristic rules then run as sorted, bucketed sweeps
//! so the pass stays near-linear instead of quadratic. Finally,
//! post-processing resolves matches against the working set, honors
//! `strongly_unbound_with` overrides, deduplicates, and deduces correlations
//! through records outside the caller's view.
//!
//! [`CorrelatorEngine`] is the seam for rule families; [`StaticDeviceCorrelator`]
//! and [`StaticUserCorrelator`] are the bundled implementations.

pub mod bucket;
pub mod config;
pub mod correlation;
pub mod device_correlator;
pub mod engine;
pub mod model;
pub mod rules;
pub mod user_correlator;

pub use config::{DeviceRuleConfig, UserRuleConfig};
pub use correlation::{
    CorrelationOutcome, CorrelationReason, CorrelationResult, WarningResult,
};
pub use device_correlator::StaticDeviceCorrelator;
pub use engine::{CorrelatorEngine, Correlations};
pub use model::{AdapterRecord, Association, Entity, RecordData, Tag};
pub use user_correlator::StaticUserCorrelator;
