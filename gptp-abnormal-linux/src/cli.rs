use std::{ffi::OsString, path::PathBuf};

use clap::Parser;
use gptp_abnormal::FaultSpec;

use crate::{daemon::DaemonOptions, mux::EchoPolicy, runner::RunConfig};

/// The options describing one fault
///
/// The same options are used on the command line and in the argument lists
/// of the built-in scenarios.
#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct FaultArgs {
    /// Message type: sync, pdreq, pdres, fup, pdrfup, anno, sign or mang
    #[clap(short, long, default_value = "sync")]
    pub msgtype: String,

    /// Event type: none, skip, dup, bads, nots or sender
    #[clap(short, long, default_value = "skip")]
    pub evttype: String,

    /// Number of injections, 0 injects every time for as long as the event is
    /// registered
    #[clap(short, long, default_value_t = 0)]
    pub repeat: u32,

    /// Number of messages left alone between two injections
    #[clap(short, long, default_value_t = 0)]
    pub interval: u32,

    /// Event parameter, e.g. the sequenceId delta of `bads`
    #[clap(short = 'n', long, default_value_t = 0, allow_negative_numbers = true)]
    pub eventpara: i32,

    /// Seconds the event stays registered, 0 derives it from the repeat count
    #[clap(short, long, default_value_t = 0.0)]
    pub duration: f64,

    /// Seconds after the start of the run at which the event is registered
    #[clap(short = 'a', long, default_value_t = 2.0)]
    pub startrun: f64,

    /// Seconds of observation after the event is deregistered
    #[clap(short = 't', long, default_value_t = 2.0)]
    pub endrun: f64,

    /// Probability of the event, 0.0 to 1.0
    #[clap(short = 's', long, default_value_t = 1.0)]
    pub prob: f32,
}

impl From<FaultArgs> for FaultSpec {
    fn from(args: FaultArgs) -> Self {
        FaultSpec {
            msgtype: args.msgtype,
            evttype: args.evttype,
            prob: args.prob,
            repeat: args.repeat,
            interval: args.interval,
            eventpara: args.eventpara,
            startrun: args.startrun,
            duration: args.duration,
            endrun: args.endrun,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(no_binary_name = true)]
struct FaultCommand {
    #[clap(flatten)]
    fault: FaultArgs,
}

/// Parse a fault from options like `["-m", "sync", "-e", "skip"]`
pub fn parse_fault_args<I, T>(args: I) -> Result<FaultSpec, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    FaultCommand::try_parse_from(args).map(|command| command.fault.into())
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Set desired logging level
    #[clap(short, long, default_value_t = log::LevelFilter::Info)]
    pub loglevel: log::LevelFilter,

    /// gptp2d program in the executable path
    #[clap(short, long = "proc", default_value = "gptp2d")]
    pub program: PathBuf,

    /// Which daemon output to print: 0 none, 1 master, 2 slave, 3 both
    #[clap(short, long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub verbose: u8,

    /// 0 runs the single fault given on the command line, 1 shows the
    /// scenario menu
    #[clap(short = 'b', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub menu: u8,

    /// Print datagrams arriving on the master's IPC socket
    #[clap(long)]
    pub show_master_ipc: bool,

    /// Print datagrams arriving on the slave's IPC socket
    #[clap(long)]
    pub show_slave_ipc: bool,

    /// Directory for the generated daemon configuration files
    #[clap(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Start the daemon directly instead of through `stdbuf -o0`
    #[clap(long)]
    pub no_stdbuf: bool,

    /// TOML file with additional scenarios for the menu
    #[clap(long)]
    pub scenarios: Option<PathBuf>,

    #[clap(flatten)]
    pub fault: FaultArgs,
}

impl Args {
    pub fn single_mode(&self) -> bool {
        self.menu == 0
    }

    pub fn run_config(&self) -> RunConfig {
        let defaults = DaemonOptions::default();
        let launcher = if self.no_stdbuf {
            Vec::new()
        } else {
            defaults.launcher
        };

        RunConfig {
            daemon: DaemonOptions {
                program: self.program.clone(),
                launcher,
                workdir: self.workdir.clone(),
                ..DaemonOptions::default()
            },
            echo: EchoPolicy {
                master_ipc: self.show_master_ipc,
                slave_ipc: self.show_slave_ipc,
                ..EchoPolicy::from_verbose(self.verbose)
            },
            ..RunConfig::default()
        }
    }
}
