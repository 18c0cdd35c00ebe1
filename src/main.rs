//! opendev_release - bump, build, package and publish an opendev release.

use opendev_release::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  → {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
