//! Command line interface for the release orchestrator.
//!
//! Parses arguments, loads the project configuration, wires the real
//! git/gh/PyInstaller/Rosetta implementations into the coordinator and
//! reports the outcome.

mod args;
mod output;

pub use args::{Args, RuntimeConfig};
pub use output::OutputManager;

use crate::bundler::{PyInstallerBuilder, RosettaLayer};
use crate::config::{self, PublishMode};
use crate::error::Result;
use crate::release::{GhCli, GitCli, ReleaseCoordinator, ReleaseReport};
use tokio_util::sync::CancellationToken;

/// Main CLI entry point
///
/// # Returns
///
/// * `Ok(0)` - Release completed
/// * `Ok(1)` - A release step failed; details were printed to stderr
/// * `Err` - Configuration could not be loaded
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    init_logging(args.verbose);
    let runtime = RuntimeConfig::from(&args);
    let out = runtime.output();

    let project_root = args.resolved_project_root()?;
    let config = config::load(&project_root, &args.overrides())?;
    let kind = args.bump_kind();

    out.section(&format!("Releasing {} ({} bump)", config.product.name, kind))?;
    for target in &config.targets {
        out.indent(&format!("{target}: {}", target.strategy))?;
    }
    out.verbose(&format!("Working directory: {}", config.out_dir.display()))?;
    if config.publish == PublishMode::LocalOnly {
        out.warn("local-only release: the tag stays local, nothing is pushed or published")?;
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    let mut coordinator = ReleaseCoordinator::new(
        GitCli::new(&project_root),
        GhCli::new(&project_root),
        PyInstallerBuilder::from_config(&config),
        RosettaLayer::default(),
        cancel,
        config,
    )?;

    match coordinator.run(kind).await {
        Ok(report) => {
            print_report(out, &report)?;
            Ok(0)
        }
        Err(e) => {
            out.error(&e.to_string())?;
            for line in e.recovery_guidance() {
                out.error_detail(&line)?;
            }
            Ok(1)
        }
    }
}

fn print_report(out: &OutputManager, report: &ReleaseReport) -> Result<()> {
    out.section(&format!("Released {}", report.tag))?;
    for artifact in &report.artifacts {
        out.success(&format!(
            "{}  {}",
            artifact.fingerprint,
            artifact.archive_path.display()
        ))?;
    }
    out.indent(&format!("ledger: {}", report.ledger_path.display()))?;
    if !report.descriptor_committed {
        out.indent("formula unchanged, not committed")?;
    }
    for tap in &report.taps_updated {
        out.indent(&format!("tap updated: {}", tap.display()))?;
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .try_init();
}

/// First Ctrl-C cancels the run cooperatively, a second one exits at once.
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        log::warn!("Interrupt received, cancelling release (press Ctrl-C again to force exit)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
