//! # Stratus Test Suite
//!
//! Unified test crate exercising the full retrieval pipeline through the
//! HTTP router, with upstream sources replaced by in-process doubles.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # State builders and the counting source double
//! └── integration/      # End-to-end retrieval flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p st-tests
//! cargo test -p st-tests integration::
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
