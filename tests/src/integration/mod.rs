//! End-to-end tests over the public API.

pub mod ordering;
pub mod remote;
pub mod runtime;
pub mod scenarios;
