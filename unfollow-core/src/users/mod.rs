mod filter;
mod identity;
mod record;
mod roster;

pub use filter::{FilterCategory, RosterStats, UserFilter};
pub use identity::IdentitySet;
pub use record::{upsize_avatar, DomEntry, RelationshipStatus, UserIdentity, UserRecord};
pub use roster::{MergeOutcome, UserRoster};
