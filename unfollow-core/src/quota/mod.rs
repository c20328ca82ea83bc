mod clock;
mod store;
mod tracker;

pub use clock::{Clock, SystemClock};
pub use store::{MemoryQuotaStore, QuotaStore, QuotaWindow};
pub use tracker::{QuotaCheck, QuotaIncrement, QuotaPolicy, QuotaStatus, QuotaTracker};
