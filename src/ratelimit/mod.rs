//! Rate limiting logic and state management.

mod clock;
mod identity;
mod janitor;
mod limiter;
mod record;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{
    Identity, IdentityCookie, IdentityResolver, ResolvedIdentity, IDENTITY_COOKIE,
    IDENTITY_COOKIE_MAX_AGE_SECS, IDENTITY_HEADER,
};
pub use janitor::{JanitorHandle, JanitorStats, StoreJanitor, SweepReport};
pub use limiter::{Decision, WindowLimiter};
pub use record::{LimitSettings, WindowRecord};
pub use store::{IdentityStatus, RateLimitStore};
