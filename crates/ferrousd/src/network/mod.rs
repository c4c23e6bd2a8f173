//! Network plumbing around the HTTP endpoint

pub mod discovery;
pub mod idempotency;
pub mod middleware;

pub use discovery::{advertise, AdvertisedAddress};
pub use idempotency::{IdempotencyStore, Lookup, StoredOutcome};
pub use middleware::{rate_limit_middleware, RateLimiter};
