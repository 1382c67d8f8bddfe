//! Timing of one fault over the course of a test run

use std::time::{Duration, Instant};

use arrayvec::ArrayVec;
use getset::CopyGetters;

use crate::{
    fault::{FaultSpec, InvalidEventConfig, ResolvedFault},
    ipc::ControlMessage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// The event has not been registered yet
    Pending,
    /// The event is registered on the daemon
    Active,
    /// The event has been deregistered again
    Stopped,
}

/// Something the run has to send to the master daemon
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerAction {
    Arm(ControlMessage),
    Disarm(ControlMessage),
}

impl TimerAction {
    pub fn message(&self) -> &ControlMessage {
        match self {
            TimerAction::Arm(message) | TimerAction::Disarm(message) => message,
        }
    }
}

/// Decides when the event of one fault gets registered and deregistered
///
/// All instants are fixed when the timer is created. [`EventTimer::tick`]
/// only moves the state forward; it never performs I/O itself.
#[derive(Debug, Clone, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct EventTimer {
    fault: ResolvedFault,
    arm_at: Instant,
    disarm_at: Instant,
    end_at: Instant,
    state: TimerState,
}

impl EventTimer {
    /// Resolve `spec` and derive its instants relative to `run_start`
    pub fn initialize(spec: &FaultSpec, run_start: Instant) -> Result<Self, InvalidEventConfig> {
        Self::new(spec.resolve()?, run_start)
    }

    pub fn new(fault: ResolvedFault, run_start: Instant) -> Result<Self, InvalidEventConfig> {
        let arm_at = shift(run_start, "startrun", fault.start_offset)?;
        let active = fault.active_secs();
        let disarm_at = shift(arm_at, "duration", active)?;
        if disarm_at == arm_at {
            return Err(InvalidEventConfig::InvalidOffset {
                field: "duration",
                value: active,
            });
        }
        let end_at = shift(disarm_at, "endrun", fault.end_offset)?;

        log::debug!(
            "{} {}: armed after {:.3}s for {:.3}s, observed for another {:.3}s",
            fault.event_type,
            fault.message_type,
            fault.start_offset,
            active,
            fault.end_offset
        );

        Ok(Self {
            fault,
            arm_at,
            disarm_at,
            end_at,
            state: TimerState::Pending,
        })
    }

    /// Advance the state to `now`
    ///
    /// Returns the messages that have to be sent, in order. A late tick can
    /// both arm and disarm the event.
    pub fn tick(&mut self, now: Instant) -> ArrayVec<TimerAction, 2> {
        let mut actions = ArrayVec::new();

        if self.state == TimerState::Pending && now >= self.arm_at {
            self.state = TimerState::Active;
            actions.push(TimerAction::Arm(ControlMessage::register(&self.fault)));
        }

        if self.state == TimerState::Active && now >= self.disarm_at {
            self.state = TimerState::Stopped;
            actions.push(TimerAction::Disarm(ControlMessage::deregister(&self.fault)));
        }

        actions
    }

    /// Whether the observation window of this fault is over
    pub fn is_finished(&self, now: Instant) -> bool {
        now > self.end_at
    }
}

fn shift(base: Instant, field: &'static str, secs: f64) -> Result<Instant, InvalidEventConfig> {
    let invalid = || InvalidEventConfig::InvalidOffset { field, value: secs };

    let offset = Duration::try_from_secs_f64(secs).map_err(|_| invalid())?;
    base.checked_add(offset).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        datastructures::{EventType, MessageType},
        ipc::SubCommand,
    };

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn sync_skip_window() {
        let start = Instant::now();
        let spec = FaultSpec {
            msgtype: "sync".to_owned(),
            evttype: "skip".to_owned(),
            duration: 5.0,
            startrun: 2.0,
            ..Default::default()
        };
        let mut timer = EventTimer::initialize(&spec, start).unwrap();
        assert_eq!(timer.state(), TimerState::Pending);

        assert!(timer.tick(start + secs(1.9)).is_empty());
        assert_eq!(timer.state(), TimerState::Pending);

        let actions = timer.tick(start + secs(2.1));
        assert_eq!(timer.state(), TimerState::Active);
        assert_eq!(actions.len(), 1);
        let TimerAction::Arm(message) = actions[0] else {
            panic!("expected an arm action, got {:?}", actions[0]);
        };
        assert_eq!(message.subcommand, SubCommand::Register);
        assert_eq!(message.message_type, MessageType::Sync);
        assert_eq!(message.event_type, EventType::Skip);

        assert!(timer.tick(start + secs(5.0)).is_empty());
        assert_eq!(timer.state(), TimerState::Active);

        let actions = timer.tick(start + secs(7.1));
        assert_eq!(timer.state(), TimerState::Stopped);
        assert!(matches!(actions[..], [TimerAction::Disarm(_)]));
        assert_eq!(actions[0].message().subcommand, SubCommand::Deregister);

        assert!(!timer.is_finished(start + secs(9.0)));
        assert!(timer.is_finished(start + secs(9.1)));
        assert!(timer.tick(start + secs(9.1)).is_empty());
    }

    #[test]
    fn derived_disarm_time() {
        let start = Instant::now();
        let spec = FaultSpec {
            repeat: 3,
            interval: 0,
            ..Default::default()
        };
        let timer = EventTimer::initialize(&spec, start).unwrap();

        assert_eq!(timer.arm_at() - start, secs(2.0));
        assert_eq!(timer.disarm_at() - timer.arm_at(), secs(1.5));
        assert_eq!(timer.end_at() - timer.disarm_at(), secs(2.0));
    }

    #[test]
    fn late_tick_arms_and_disarms() {
        let start = Instant::now();
        let spec = FaultSpec {
            msgtype: "anno".to_owned(),
            evttype: "dup".to_owned(),
            startrun: 0.0,
            duration: 0.5,
            ..Default::default()
        };
        let mut timer = EventTimer::initialize(&spec, start).unwrap();

        let actions = timer.tick(start + secs(1.0));
        assert!(matches!(
            actions[..],
            [TimerAction::Arm(_), TimerAction::Disarm(_)]
        ));
        assert_eq!(timer.state(), TimerState::Stopped);
    }

    #[test]
    fn unknown_message_type() {
        let spec = FaultSpec {
            msgtype: "bogus".to_owned(),
            ..Default::default()
        };

        assert_eq!(
            EventTimer::initialize(&spec, Instant::now()).unwrap_err(),
            InvalidEventConfig::UnknownMessageType("bogus".to_owned())
        );
    }

    #[test]
    fn huge_offsets_are_rejected() {
        let spec = FaultSpec {
            startrun: 1e300,
            ..Default::default()
        };

        assert!(EventTimer::initialize(&spec, Instant::now()).is_err());
    }

    #[test]
    fn instants_are_ordered() {
        let mut rng = StdRng::seed_from_u64(0x6770_7470);
        let start = Instant::now();

        for _ in 0..1000 {
            let message_type = MessageType::ALL[rng.gen_range(0..MessageType::ALL.len())];
            let event_type = EventType::ALL[rng.gen_range(0..EventType::ALL.len())];
            let duration = if rng.gen_bool(0.5) {
                0.0
            } else {
                rng.gen_range(0.001..30.0)
            };

            let spec = FaultSpec {
                msgtype: message_type.selector().to_owned(),
                evttype: event_type.selector().to_owned(),
                prob: rng.gen_range(0.0..=1.0),
                repeat: rng.gen_range(0..10),
                interval: rng.gen_range(0..10),
                eventpara: rng.gen(),
                startrun: rng.gen_range(0.0..10.0),
                duration,
                endrun: rng.gen_range(0.0..10.0),
            };

            let timer = EventTimer::initialize(&spec, start).unwrap();
            assert!(timer.arm_at() < timer.disarm_at(), "{spec}");
            assert!(timer.disarm_at() <= timer.end_at(), "{spec}");
            assert!(!timer.is_finished(timer.end_at()), "{spec}");
        }
    }
}
