//! Multi-signal content quality scoring, gating, and source reputation.

pub mod gate;
pub mod reputation;
pub mod scorer;
pub mod signals;

pub use gate::{GateDecision, GateStats, QualityGate};
pub use reputation::{ReputationUpdate, SourceReputationManager};
pub use scorer::{QualityClass, QualityResult, QualityScorer, SignalScore};
pub use signals::{SignalKind, ALGORITHM_VERSION};
