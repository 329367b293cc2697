//! Clock Port

use chrono::{DateTime, Utc};

/// Time source for every scheduling decision.
///
/// Expiry detection compares store-persisted deadlines against this clock,
/// so implementations must be shared-safe; tests drive it manually to
/// simulate crashed holders and elapsed slots.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
