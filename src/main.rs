use backuper::backup::config::BackupConfig;
use backuper::backup::context::RunContext;
use backuper::backup::interrupt::Interrupt;
use backuper::backup::logging::{self, LogDestination};
use backuper::backup::orchestrator::Orchestrator;
use backuper::backup::result_error::result::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::error;

static DEFAULT_CONFIG: &str = "backup.config";

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CHECK_FAILED: i32 = 3;

/// Backup files and databases of several servers, then report about it
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: TargetArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backup the selected targets (default)
    Run(TargetArgs),
    /// Show the configuration of the selected targets
    Config(TargetArgs),
    /// Check access to sources and destinations of the selected targets
    Check(TargetArgs),
    /// Send a test report through every report target
    CheckReports(CommonArgs),
    /// List archives of the selected targets
    List(TargetArgs),
    /// Remove archives out of retention
    Clean(TargetArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Location of config file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Log destination: stdout, stderr, syslog or a file path
    #[arg(short, long, default_value = "stderr")]
    log: LogDestination,
}

#[derive(Args, Debug)]
struct TargetArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Targets to work on, as `pattern` or `server_pattern:target_pattern`
    targets: Vec<String>,
}

/// A relative config missing from the working directory is looked up next
/// to the executable.
fn resolve_config(config: PathBuf) -> PathBuf {
    if config.is_absolute() || config.exists() {
        return config;
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&config)))
        .filter(|candidate| candidate.exists())
        .unwrap_or(config)
}

fn orchestrator(config: &Path, interrupt: Interrupt) -> Result<Orchestrator> {
    let config = BackupConfig::load(resolve_config(config.to_path_buf()))?;
    Ok(Orchestrator::new(config, RunContext::system(), interrupt))
}

fn execute(command: Command) -> Result<i32> {
    match command {
        Command::Run(args) => {
            let interrupt = Interrupt::new();
            interrupt.install()?;
            orchestrator(&args.common.config, interrupt)?.run(&args.targets)?;
            Ok(EXIT_OK)
        }
        Command::Config(args) => {
            orchestrator(&args.common.config, Interrupt::new())?.config(&args.targets)?;
            Ok(EXIT_OK)
        }
        Command::Check(args) => {
            let problems = orchestrator(&args.common.config, Interrupt::new())?.check(&args.targets)?;
            Ok(if problems > 0 {
                EXIT_CHECK_FAILED
            } else {
                EXIT_OK
            })
        }
        Command::CheckReports(args) => {
            orchestrator(&args.config, Interrupt::new())?.check_reports();
            Ok(EXIT_OK)
        }
        Command::List(args) => {
            orchestrator(&args.common.config, Interrupt::new())?.list(&args.targets)?;
            Ok(EXIT_OK)
        }
        Command::Clean(args) => {
            orchestrator(&args.common.config, Interrupt::new())?.clean(&args.targets)?;
            Ok(EXIT_OK)
        }
    }
}

fn log_destination(command: &Command) -> &LogDestination {
    match command {
        Command::CheckReports(args) => &args.log,
        Command::Run(args)
        | Command::Config(args)
        | Command::Check(args)
        | Command::List(args)
        | Command::Clean(args) => &args.common.log,
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_FAILURE } else { EXIT_OK };
            let _ = e.print();
            exit(code);
        }
    };
    let command = cli.command.unwrap_or(Command::Run(cli.run));

    if let Err(e) = logging::init(log_destination(&command)) {
        eprintln!("{e}");
        exit(EXIT_FAILURE);
    }

    match execute(command) {
        Ok(code) => exit(code),
        Err(e) => {
            error!("{e}");
            exit(EXIT_FAILURE);
        }
    }
}
