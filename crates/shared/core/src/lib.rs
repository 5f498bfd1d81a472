//! Signal Core Domain
//!
//! Pure domain types shared by the decision engine and its collaborators.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod feature;
pub mod signal;
pub mod values;

// Re-export commonly used types at crate root
pub use feature::{FEATURE_COUNT, FeatureSnapshot, MalformedSnapshot};
pub use signal::{Action, Signal};
pub use values::{Symbol, Timestamp};
