//! # hwdiag Binary
//!
//! Runs the I2C peripheral self-test plan against the devices behind the
//! PCA9548A multiplexer and exits 0 on pass, 1 on fail.
//!
//! # Usage
//!
//! ```bash
//! # Full run with the default plan (/etc/hwdiag/diagnostics.toml)
//! hwdiag
//!
//! # Skip visual/slow tests, print only the verdict
//! hwdiag --quick --quiet
//!
//! # Show the plan, scan the channels, run one unit
//! hwdiag --list
//! hwdiag --scan
//! hwdiag --unit "BMP280 Pressure"
//!
//! # No hardware: simulated bus populated from the plan
//! hwdiag --config config/diagnostics.toml -s -v --report /tmp/report.json
//! ```

use clap::Parser;
use hwdiag::core::{DiagCore, open_hardware_selector, simulated_selector};
use hwdiag::probe_registry::ProbeRegistry;
use hwdiag::report::{Reporter, write_json};
use hwdiag::scan::scan_channels;
use hwdiag_common::prelude::*;
use std::path::PathBuf;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// hwdiag - I2C peripheral self-test behind a PCA9548A multiplexer
#[derive(Parser, Debug)]
#[command(name = "hwdiag")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "I2C peripheral self-test harness behind a PCA9548A multiplexer")]
#[command(long_about = None)]
struct Args {
    /// Path to the diagnostic plan (diagnostics.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Skip visual and slow tests
    #[arg(short, long)]
    quick: bool,

    /// Print only the final verdict
    #[arg(long)]
    quiet: bool,

    /// List configured tests and exit
    #[arg(short, long)]
    list: bool,

    /// Scan every multiplexer channel for acknowledging addresses and exit
    #[arg(long)]
    scan: bool,

    /// Run a single test by name
    #[arg(long, value_name = "NAME")]
    unit: Option<String>,

    /// Use the simulated bus instead of the I2C adapter
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging and probe data output
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Write the run report as JSON to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    let filter = setup_tracing(&args);

    let code = match DiagCore::load_config(&args.config) {
        Ok(config) => {
            let level = effective_level(&args, Some(config.shared.log_level));
            if let Err(e) = filter.reload(env_filter(level)) {
                warn!("Failed to apply plan log level: {}", e);
            }
            run(&args, config).unwrap_or_else(|e| {
                error!("hwdiag failed: {}", e);
                1
            })
        }
        Err(e) => {
            error!("Failed to load {:?}: {}", args.config, e);
            1
        }
    };
    std::process::exit(code);
}

fn run(args: &Args, config: DiagConfig) -> Result<i32, Box<dyn std::error::Error>> {
    info!("hwdiag v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut reporter = Reporter::stdout(args.verbose, args.quiet);

    if args.list {
        reporter.list(&config);
        return Ok(0);
    }

    let selector = if args.simulate {
        info!("Simulation mode enabled");
        simulated_selector(&config)
    } else {
        open_hardware_selector(&config.bus)?
    };

    let report_path = args.report.clone();
    let mux_address = config.bus.mux_address;
    let mut core = DiagCore::new(config, selector, ProbeRegistry::with_builtin())?;

    if args.scan {
        let scans = scan_channels(core.selector_mut(), mux_address);
        reporter.scan(&scans);
        let failed = scans.iter().any(|s| s.devices.is_err());
        return Ok(i32::from(failed));
    }

    if let Some(name) = &args.unit {
        let result = core
            .run_unit(name)
            .ok_or_else(|| format!("no test named '{name}' in the plan"))?;
        reporter.unit_result(&result);
        return Ok(i32::from(result.counts_toward_failure()));
    }

    let report = core.run(args.quick, &mut reporter);
    reporter.summary(&report);

    if let Some(path) = report_path {
        write_json(&report, &path)?;
    }

    info!("hwdiag finished with exit code {}", report.exit_code());
    Ok(report.exit_code())
}

/// Log level from the CLI flags and, once loaded, the `[shared]` level.
///
/// `--verbose` wins; `--quiet` caps the level at WARN.
fn effective_level(args: &Args, plan: Option<LogLevel>) -> Level {
    if args.verbose {
        return Level::DEBUG;
    }
    let level = plan.map_or(Level::INFO, Level::from);
    if args.quiet {
        level.min(Level::WARN)
    } else {
        level
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Setup tracing subscriber based on CLI arguments.
///
/// Logs go to stderr; stdout carries the report. The returned handle swaps
/// in the plan's level after loading.
fn setup_tracing(args: &Args) -> reload::Handle<EnvFilter, Registry> {
    let (filter, handle) = reload::Layer::new(env_filter(effective_level(args, None)));
    let registry = tracing_subscriber::registry().with(filter);

    if args.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(flags: &[&str]) -> Args {
        Args::parse_from(std::iter::once("hwdiag").chain(flags.iter().copied()))
    }

    #[test]
    fn plan_level_applies_by_default() {
        assert_eq!(effective_level(&args(&[]), None), Level::INFO);
        assert_eq!(
            effective_level(&args(&[]), Some(LogLevel::Error)),
            Level::ERROR
        );
        assert_eq!(
            effective_level(&args(&[]), Some(LogLevel::Info)),
            Level::INFO
        );
    }

    #[test]
    fn quiet_caps_at_warn() {
        let quiet = args(&["--quiet"]);
        assert_eq!(effective_level(&quiet, None), Level::WARN);
        assert_eq!(effective_level(&quiet, Some(LogLevel::Info)), Level::WARN);
        assert_eq!(effective_level(&quiet, Some(LogLevel::Error)), Level::ERROR);
    }

    #[test]
    fn verbose_overrides_quiet_and_plan() {
        let both = args(&["--quiet", "-v"]);
        assert_eq!(effective_level(&both, Some(LogLevel::Error)), Level::DEBUG);
    }
}
