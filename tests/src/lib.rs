//! # NOS Test Suite
//!
//! Cross-crate tests of the event core.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scenarios.rs   # ordering, write visibility, veto, policy, handshake
//!     ├── ordering.rs    # randomized registry order checks
//!     ├── remote.rs      # loopback TCP: handshake, push, pull, request
//!     └── runtime.rs     # full runtime with both buses
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p nos-tests
//! cargo test -p nos-tests integration::remote::
//! cargo bench -p nos-tests
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
