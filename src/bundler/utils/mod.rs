//! Shared helpers for the build and packaging steps.

pub mod fs;
