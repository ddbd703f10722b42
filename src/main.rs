use anyhow::{bail, Context};
use clap::Parser;
use execd_shim::config::{load_config, parse_duration, single_input, Registry};
use execd_shim::inputs::builtin_registry;
use execd_shim::plugin::Input;
use execd_shim::shim::{PollInterval, Shim};
use log::{error, info, warn, LevelFilter};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the execd shim
#[derive(Parser)]
#[command(
    name = "execd-shim",
    about = "Run one input plugin as a child process of a metrics agent",
    long_about = "Hosts a single input plugin and bridges it to a parent agent over the \
                  standard streams: metrics are written to stdout in line protocol, every \
                  line received on stdin triggers a collection, and closing stdin shuts the \
                  plugin down."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format) declaring exactly one input"
    )]
    config: Option<PathBuf>,

    /// Built-in input to run with default settings
    #[arg(short, long, value_name = "NAME", help = "Run a built-in input with default settings")]
    input: Option<String>,

    /// Interval between scheduled collections
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "1s",
        value_parser = parse_interval,
        help = "How often to collect from polling inputs (e.g. 500ms, 10s, 1m30s)"
    )]
    poll_interval: Duration,

    /// Collect only when a line arrives on stdin
    #[arg(long, help = "Disable scheduled collection; collect only on stdin lines")]
    poll_interval_disabled: bool,

    /// List built-in inputs and exit
    #[arg(long, help = "Print the built-in inputs with their sample configuration")]
    list_inputs: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output on stderr")]
    verbose: bool,
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if self.list_inputs {
            return Ok(());
        }

        match (&self.config, &self.input) {
            (Some(_), Some(_)) => {
                return Err("--config and --input cannot be used together".to_string())
            }
            (None, None) => return Err("Either --config or --input is required".to_string()),
            _ => {}
        }

        if let Some(ref config_path) = self.config {
            if !config_path.exists() {
                return Err(format!(
                    "Configuration file not found: {}",
                    config_path.display()
                ));
            }
            if !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
            if let Some(extension) = config_path.extension() {
                if extension != "toml" {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        if !self.poll_interval_disabled && self.poll_interval.is_zero() {
            return Err(
                "Poll interval must be greater than zero; use --poll-interval-disabled instead"
                    .to_string(),
            );
        }

        Ok(())
    }

    fn poll_interval(&self) -> PollInterval {
        if self.poll_interval_disabled {
            PollInterval::Disabled
        } else {
            PollInterval::Every(self.poll_interval)
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// Print every registered input with its description and sample config
fn print_inputs(registry: &Registry, out: &mut impl Write) -> io::Result<()> {
    for info in registry.describe() {
        writeln!(out, "{}", info.name)?;
        writeln!(out, "  {}", info.description)?;
        if !info.sample_config.is_empty() {
            writeln!(out)?;
            write!(out, "{}", info.sample_config)?;
        }
        writeln!(out)?;
    }
    out.flush()
}

/// Build the input selected on the command line
fn load_input(cli: &Cli, registry: &Registry) -> anyhow::Result<Box<dyn Input>> {
    match (&cli.config, &cli.input) {
        (Some(path), _) => {
            let inputs = load_config(path, registry).with_context(|| {
                format!("Failed to load configuration from {}", path.display())
            })?;
            Ok(single_input(inputs)?)
        }
        (None, Some(name)) => {
            if !registry.contains(name) {
                let known: Vec<&str> = registry.names().collect();
                bail!(
                    "Unknown input '{}'; available inputs: {}",
                    name,
                    known.join(", ")
                );
            }
            registry
                .construct_default(name)
                .with_context(|| format!("Failed to create input '{}'", name))
        }
        (None, None) => bail!("No input selected"),
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let registry = builtin_registry();

    if cli.list_inputs {
        print_inputs(&registry, &mut io::stdout().lock()).context("Failed to list inputs")?;
        return Ok(());
    }

    let input = load_input(cli, &registry)?;
    let mut shim = Shim::new();
    shim.add_input(input).context("Failed to initialize input")?;

    info!("Starting execd shim with {:?}", cli.poll_interval());
    shim.run(cli.poll_interval())?;
    info!("Execd shim shutdown complete");
    Ok(())
}

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
