// web-server/src/middleware/mod.rs
pub mod identity;
pub mod rate_limiter;

pub use identity::{verified_identity, IdentityLayer};
pub use rate_limiter::RateLimiter;
