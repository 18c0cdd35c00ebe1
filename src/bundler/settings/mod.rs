//! Target matrix types: operating systems, architectures and environment
//! strategies.

mod arch;
mod target;

pub use arch::{Arch, Os};
pub use target::{BuildTarget, EnvironmentStrategy};
