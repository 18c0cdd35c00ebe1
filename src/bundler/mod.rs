//! Building, packaging and fingerprinting the product executables.
//!
//! - [`settings`] - Target matrix types
//! - [`environment`] - Execution layers (native, Rosetta 2)
//! - [`builder`] - Per-target builds and the [`BuildMatrixExecutor`]
//! - [`package`] - Archives, fingerprints and the ledger

pub mod builder;
pub mod environment;
pub mod package;
pub mod settings;
pub(crate) mod utils;

pub use builder::{
    AMBIENT_OVERRIDES, BinaryOutput, BuildMatrixExecutor, Builder, PyInstallerBuilder, TargetPaths,
};
pub use environment::{ExecutionLayer, NativeLayer, RosettaLayer};
pub use package::{Artifact, ArtifactPackager, FingerprintLedger, LEDGER_FILE_NAME};
pub use settings::{Arch, BuildTarget, EnvironmentStrategy, Os};
