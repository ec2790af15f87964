//! End-to-end retrieval flows through the HTTP router.

pub mod retrieval_flows;
