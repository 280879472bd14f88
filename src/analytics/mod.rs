//! Visit analytics
//!
//! The write path (`recorder`) classifies each request and stores one visit
//! record. The read path (`service`) answers calendar queries by aggregating
//! stored records over half-open time windows (`aggregator`).

pub mod aggregator;
pub mod classifier;
pub mod identity;
pub mod ip_extractor;
pub mod models;
pub mod recorder;
pub mod rollup;
pub mod service;

pub use aggregator::{growth_rate, VisitAggregator};
pub use classifier::{classify, Classification};
pub use identity::{IdentityResolver, VisitorIdentity};
pub use ip_extractor::IpHeaders;
pub use recorder::{VisitHandle, VisitRecorder, VisitRequest};
pub use rollup::DailyRollupCache;
pub use service::{DateRange, StatsError, StatsResult, StatsService};
