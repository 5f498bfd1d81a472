//! Signal Ports
//!
//! Port definitions (traits) for the decision engine.
//! These define the boundaries between the decision pipeline and the
//! infrastructure that feeds it.

mod clock;
mod error;
mod feature_provider;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{FetchError, FetchResult};
pub use feature_provider::{FeatureMap, FeatureProvider};
