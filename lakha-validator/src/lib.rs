//! The PoCS validator record, its penalty/rehabilitation machinery, and the
//! registry that selects a block producer and aggregates network-wide
//! performance.

pub mod activities;
pub mod registry;
pub mod validator;

pub use activities::{ActivityDefinition, CONTRIBUTION_ACTIVITIES};
pub use registry::{NetworkPerformanceSummary, ValidatorRegistry, PEER_REVIEW_INTERVAL};
pub use validator::{ContributionActivityRecord, PeerRating, PenaltyRecord, PerformanceMetrics, Validator};
