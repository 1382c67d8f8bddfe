//! One end-to-end run: two daemons, a list of faults and the loop between them

use std::{
    io::{self, Write},
    time::{Duration, Instant},
};

use gptp_abnormal::{
    EventTimer, EventType, FaultSpec, InvalidEventConfig, MessageType, ResolvedFault, TimerAction,
};

use crate::{
    daemon::{DaemonError, DaemonInstance, DaemonOptions},
    mux::{Console, Drained, EchoPolicy, Endpoints, Multiplexer, MuxError},
};

/// Index of the daemon that the faults are injected into
const MASTER: u8 = 0;
const SLAVE: u8 = 1;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub daemon: DaemonOptions,
    pub echo: EchoPolicy,
    /// Longest time the loop waits for output before evaluating the timers
    pub tick: Duration,
    /// Pause between attempts to reach a daemon's IPC port
    pub connect_retry: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonOptions::default(),
            echo: EchoPolicy::from_verbose(3),
            tick: Duration::from_millis(100),
            connect_retry: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Running,
    /// Every observation window is over
    Draining,
    /// The operator interrupted the run
    Aborted,
    /// Both daemons are gone
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid event {spec}: {source}")]
    InvalidEventConfig {
        spec: FaultSpec,
        #[source]
        source: InvalidEventConfig,
    },
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error("{role}: sending {event_type} {message_type} at {elapsed}s failed: {source}")]
    Send {
        role: &'static str,
        event_type: EventType,
        message_type: MessageType,
        elapsed: Elapsed,
        #[source]
        source: io::Error,
    },
    #[error("writing to the console failed: {0}")]
    Output(#[source] io::Error),
}

/// Time since the start of a run, shown as `s.mmm`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.0.as_secs(), self.0.subsec_millis())
    }
}

/// Drives one test run
///
/// Both daemons belong to the run. Whatever way [`TestRun::execute`] ends,
/// they are terminated before it returns.
#[derive(Debug)]
pub struct TestRun {
    config: RunConfig,
    master: Option<DaemonInstance>,
    slave: Option<DaemonInstance>,
    state: RunState,
}

impl TestRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            master: None,
            slave: None,
            state: RunState::Initializing,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn master(&self) -> Option<&DaemonInstance> {
        self.master.as_ref()
    }

    pub fn slave(&self) -> Option<&DaemonInstance> {
        self.slave.as_ref()
    }

    /// Run `faults` against a fresh master/slave pair
    ///
    /// Echoed daemon output and the arm/disarm banners are written to `out`.
    /// Any line arriving on `console` ends the run early.
    pub fn execute<C: Console, W: Write>(
        &mut self,
        faults: &[FaultSpec],
        console: Option<&mut C>,
        out: &mut W,
    ) -> Result<RunOutcome, RunError> {
        self.state = RunState::Initializing;

        let result = self.run(faults, console, out);
        self.close();

        if let Err(error) = &result {
            log::error!("test run failed: {error}");
        }

        result
    }

    fn run<C: Console, W: Write>(
        &mut self,
        faults: &[FaultSpec],
        mut console: Option<&mut C>,
        out: &mut W,
    ) -> Result<RunOutcome, RunError> {
        let resolved = resolve_all(faults)?;

        let master = self
            .master
            .insert(DaemonInstance::new(MASTER, &self.config.daemon)?);
        let slave = self
            .slave
            .insert(DaemonInstance::new(SLAVE, &self.config.daemon)?);

        master.start()?;
        slave.start()?;
        master.connect_ipc_retry(self.config.connect_retry)?;
        slave.connect_ipc_retry(self.config.connect_retry)?;

        let run_start = Instant::now();
        let mut timers = resolved
            .iter()
            .zip(faults)
            .map(|(fault, spec)| timer_for(spec, *fault, run_start))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("running {} fault(s)", timers.len());
        self.state = RunState::Running;

        let mux = Multiplexer::new(self.config.echo);

        loop {
            let mut endpoints = Endpoints {
                console: console.as_deref_mut(),
                master: &mut *master,
                slave: &mut *slave,
            };

            if let Some(ready) = mux.poll(&endpoints, self.config.tick)? {
                if mux.drain(ready, &mut endpoints, out)? == Drained::AbortRequested {
                    log::info!("run aborted by the operator");
                    self.state = RunState::Aborted;
                    return Ok(RunOutcome::Aborted);
                }
                continue;
            }

            let now = Instant::now();
            let elapsed = Elapsed(now.saturating_duration_since(run_start));

            for timer in timers.iter_mut() {
                for action in timer.tick(now) {
                    announce(out, &action, elapsed).map_err(RunError::Output)?;

                    let message = action.message();
                    let bytes = message.to_bytes();
                    log::debug!("{}: sending {}", master.role(), hex::encode(bytes));

                    master.send(&bytes).map_err(|source| RunError::Send {
                        role: master.role(),
                        event_type: timer.fault().event_type,
                        message_type: timer.fault().message_type,
                        elapsed,
                        source,
                    })?;
                }
            }

            if timers.iter().all(|timer| timer.is_finished(now)) {
                log::info!("all observation windows are over after {elapsed}s");
                self.state = RunState::Draining;
                return Ok(RunOutcome::Completed);
            }
        }
    }

    fn close(&mut self) {
        for instance in [&mut self.master, &mut self.slave].into_iter().flatten() {
            if let Err(error) = instance.close() {
                log::warn!("{}: could not stop daemon: {error}", instance.role());
            }
        }
        self.state = RunState::Closed;
    }
}

/// Resolve every fault before anything is spawned
fn resolve_all(faults: &[FaultSpec]) -> Result<Vec<ResolvedFault>, RunError> {
    let now = Instant::now();

    faults
        .iter()
        .map(|spec| -> Result<ResolvedFault, RunError> {
            let fault = spec
                .resolve()
                .map_err(|source| invalid_event(spec, source))?;
            // offsets that do not fit an Instant are caught here as well
            timer_for(spec, fault, now)?;
            Ok(fault)
        })
        .collect()
}

fn timer_for(
    spec: &FaultSpec,
    fault: ResolvedFault,
    run_start: Instant,
) -> Result<EventTimer, RunError> {
    EventTimer::new(fault, run_start).map_err(|source| invalid_event(spec, source))
}

fn invalid_event(spec: &FaultSpec, source: InvalidEventConfig) -> RunError {
    RunError::InvalidEventConfig {
        spec: spec.clone(),
        source,
    }
}

fn announce<W: Write>(out: &mut W, action: &TimerAction, elapsed: Elapsed) -> io::Result<()> {
    let message = action.message();
    writeln!(out, "{}", "-".repeat(60))?;

    match action {
        TimerAction::Arm(_) => writeln!(
            out,
            "!!!!! START {elapsed}sec: {} {} prob={:.02} repeat={} interval={}",
            message.event_type,
            message.message_type,
            message.event_rate,
            message.repeat,
            message.interval
        ),
        TimerAction::Disarm(_) => writeln!(
            out,
            "!!!!! STOP {elapsed}sec: {} {}",
            message.event_type, message.message_type
        ),
    }
}

/// Run `faults` with the process' stdout as output
pub fn run_single_test<C: Console>(
    config: RunConfig,
    faults: &[FaultSpec],
    console: Option<&mut C>,
) -> Result<RunOutcome, RunError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    TestRun::new(config).execute(faults, console, &mut out)
}
