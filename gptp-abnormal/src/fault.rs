//! Declarative description of one timed fault

use core::fmt;

use serde::Deserialize;

use crate::datastructures::{EventType, MessageType};

/// One fault to inject, as written by the operator
///
/// The selectors are kept as text here; they are resolved exactly once by
/// [`FaultSpec::resolve`], which is where a bad specification is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct FaultSpec {
    /// Message type selector, see [`MessageType::selector`]
    pub msgtype: String,
    /// Event type selector, see [`EventType::selector`]
    pub evttype: String,
    /// Probability of the event happening for a selected message, 0.0 to 1.0
    pub prob: f32,
    /// Number of injections, 0 means every time for as long as the event is
    /// registered
    pub repeat: u32,
    /// Number of messages left alone between two injections
    pub interval: u32,
    /// Event specific parameter, e.g. the sequenceId delta for `bads`
    pub eventpara: i32,
    /// Seconds after the run start at which the event is registered
    pub startrun: f64,
    /// Seconds the event stays registered, 0 derives it from `repeat`
    pub duration: f64,
    /// Seconds of observation after the event is deregistered
    pub endrun: f64,
}

impl Default for FaultSpec {
    fn default() -> Self {
        Self {
            msgtype: MessageType::Sync.selector().to_owned(),
            evttype: EventType::Skip.selector().to_owned(),
            prob: 1.0,
            repeat: 0,
            interval: 0,
            eventpara: 0,
            startrun: 2.0,
            duration: 0.0,
            endrun: 2.0,
        }
    }
}

impl fmt::Display for FaultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{msgtype: {}, evttype: {}, prob: {}, repeat: {}, interval: {}, eventpara: {}, \
             startrun: {}, duration: {}, endrun: {}}}",
            self.msgtype,
            self.evttype,
            self.prob,
            self.repeat,
            self.interval,
            self.eventpara,
            self.startrun,
            self.duration,
            self.endrun
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidEventConfig {
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),
    #[error("probability {0} is outside of 0.0..=1.0")]
    ProbabilityOutOfRange(f32),
    #[error("{field} of {value} seconds is not a valid offset")]
    InvalidOffset { field: &'static str, value: f64 },
    #[error("{field} of {value} does not fit the control message")]
    CountTooLarge { field: &'static str, value: u32 },
}

impl FaultSpec {
    /// Resolve the selectors and check every value against what the daemon
    /// accepts
    pub fn resolve(&self) -> Result<ResolvedFault, InvalidEventConfig> {
        let message_type = self
            .msgtype
            .parse::<MessageType>()
            .map_err(|_| InvalidEventConfig::UnknownMessageType(self.msgtype.clone()))?;
        let event_type = self
            .evttype
            .parse::<EventType>()
            .map_err(|_| InvalidEventConfig::UnknownEventType(self.evttype.clone()))?;

        if !(0.0..=1.0).contains(&self.prob) {
            return Err(InvalidEventConfig::ProbabilityOutOfRange(self.prob));
        }

        let start_offset = offset("startrun", self.startrun)?;
        let duration = offset("duration", self.duration)?;
        let end_offset = offset("endrun", self.endrun)?;

        Ok(ResolvedFault {
            message_type,
            event_type,
            probability: self.prob,
            repeat: count("repeat", self.repeat)?,
            interval: count("interval", self.interval)?,
            event_parameter: self.eventpara,
            start_offset,
            duration,
            end_offset,
        })
    }
}

fn offset(field: &'static str, value: f64) -> Result<f64, InvalidEventConfig> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(InvalidEventConfig::InvalidOffset { field, value })
    }
}

fn count(field: &'static str, value: u32) -> Result<i32, InvalidEventConfig> {
    i32::try_from(value).map_err(|_| InvalidEventConfig::CountTooLarge { field, value })
}

/// A [`FaultSpec`] whose selectors have been resolved and whose values have
/// been checked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFault {
    pub message_type: MessageType,
    pub event_type: EventType,
    pub probability: f32,
    pub repeat: i32,
    pub interval: i32,
    pub event_parameter: i32,
    /// seconds
    pub start_offset: f64,
    /// seconds, 0 means derived
    pub duration: f64,
    /// seconds
    pub end_offset: f64,
}

impl ResolvedFault {
    /// Seconds between registering and deregistering the event
    ///
    /// Without an explicit duration this is the worst case time needed for
    /// `repeat` injections spaced `interval` messages apart, plus one message
    /// period and one second of slack.
    pub fn active_secs(&self) -> f64 {
        if self.duration != 0.0 {
            return self.duration;
        }

        let period = self.message_type.nominal_interval_secs();
        self.repeat as f64 * (self.interval as f64 + 1.0) * period + period + 1.0
    }
}
