//! # ST-05 Gateway - HTTP surface and retrieval pipeline.
//!
//! Sits behind the fronting cache layer and is called on cache misses.
//! Each retrieval runs the same state machine:
//!
//! ```text
//!   Parse -> ClassifyFormat -> CacheLookup -> SelectSource
//!         -> Fetch -> Verify & Stream -> Done
//! ```
//!
//! Failure exits anywhere. Validation failures exit before any network
//! call; verification failures after headers are committed abort the
//! connection without a clean final frame, so the fronting layer never
//! caches a truncated object as complete.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod fixture;
pub mod parse;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use fixture::TestFixture;
pub use routes::build_router;
pub use state::AppState;
