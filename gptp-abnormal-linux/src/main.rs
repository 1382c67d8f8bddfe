use std::{
    fs::File,
    io::{self, BufReader},
    os::fd::AsFd,
    process::ExitCode,
};

use clap::Parser;
use gptp_abnormal::FaultSpec;
use gptp_abnormal_linux::{
    cli::Args,
    run_single_test,
    scenario::{builtin_scenarios, file_scenarios, run_menu},
    setup_logger, RunError, TestRun,
};

const USAGE_ERROR: u8 = 2;
const RUN_ERROR: u8 = 1;

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = setup_logger(args.loglevel) {
        eprintln!("could not set up logging: {error}");
        return ExitCode::from(USAGE_ERROR);
    }

    let config = args.run_config();

    // the menu and the running test share one buffer, so the run sees input
    // that the menu already pulled in
    let mut input = match io::stdin().as_fd().try_clone_to_owned() {
        Ok(fd) => BufReader::new(File::from(fd)),
        Err(error) => {
            log::error!("can't use stdin: {error}");
            return ExitCode::from(RUN_ERROR);
        }
    };

    if args.single_mode() {
        let fault = FaultSpec::from(args.fault.clone());

        return match run_single_test(config, &[fault], Some(&mut input)) {
            Ok(outcome) => {
                log::info!("run finished: {outcome:?}");
                ExitCode::SUCCESS
            }
            Err(RunError::InvalidEventConfig { .. }) => ExitCode::from(USAGE_ERROR),
            Err(_) => ExitCode::from(RUN_ERROR),
        };
    }

    let mut scenarios = match builtin_scenarios() {
        Ok(scenarios) => scenarios,
        Err(error) => {
            log::error!("{error}");
            return ExitCode::from(USAGE_ERROR);
        }
    };

    if let Some(path) = &args.scenarios {
        match file_scenarios(path) {
            Ok(extra) => {
                log::info!("loaded {} scenario(s) from {path:?}", extra.len());
                scenarios.extend(extra);
            }
            Err(error) => {
                log::error!("{path:?}: {error}");
                return ExitCode::from(USAGE_ERROR);
            }
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let result = run_menu(&scenarios, &mut input, &mut out, |scenario, input, out| {
        // failed runs are logged by the run itself, the menu continues
        if let Ok(outcome) =
            TestRun::new(config.clone()).execute(&scenario.faults, Some(input), out)
        {
            log::info!("'{}' finished: {outcome:?}", scenario.title);
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("menu failed: {error}");
            ExitCode::from(RUN_ERROR)
        }
    }
}
