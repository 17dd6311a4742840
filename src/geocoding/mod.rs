pub mod client;
pub mod outcome;
pub mod rate_limiter;
pub mod resolver;

pub use client::{classify_response, DisabledLookup, GeocodeLookup, OpenCageClient, StaticLookup};
pub use outcome::GeocodeOutcome;
pub use rate_limiter::RateLimiter;
pub use resolver::{GeocodeResolver, RetryPolicy};
