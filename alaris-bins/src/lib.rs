//! Shared plumbing for the Alaris binaries.

pub mod common;
