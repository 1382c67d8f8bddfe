use core::{fmt, str::FromStr};

use super::EnumConversionError;

/// What the daemon's send hook does to a message it selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EventType {
    /// Nothing happens, used to run without injection
    None = 0,
    /// The message is not sent, its sequenceId is still consumed
    Skip = 1,
    /// The message is sent twice
    Duplicate = 2,
    /// The event parameter is added to the sequenceId. A parameter of 0
    /// inverts the lower 8 bits instead.
    BadSequenceNumber = 3,
    /// The transmit timestamp of the message is dropped
    NoTimestamp = 4,
    /// The send call reports an error
    SenderError = 5,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::None,
        EventType::Skip,
        EventType::Duplicate,
        EventType::BadSequenceNumber,
        EventType::NoTimestamp,
        EventType::SenderError,
    ];

    pub fn to_primitive(self) -> i32 {
        self as i32
    }

    pub fn selector(self) -> &'static str {
        match self {
            EventType::None => "none",
            EventType::Skip => "skip",
            EventType::Duplicate => "dup",
            EventType::BadSequenceNumber => "bads",
            EventType::NoTimestamp => "nots",
            EventType::SenderError => "sender",
        }
    }
}

impl TryFrom<i32> for EventType {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use EventType::*;

        match value {
            0 => Ok(None),
            1 => Ok(Skip),
            2 => Ok(Duplicate),
            3 => Ok(BadSequenceNumber),
            4 => Ok(NoTimestamp),
            5 => Ok(SenderError),
            _ => Err(EnumConversionError),
        }
    }
}

impl FromStr for EventType {
    type Err = EnumConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.selector() == s)
            .ok_or(EnumConversionError)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_resolve() {
        assert_eq!("skip".parse::<EventType>().ok(), Some(EventType::Skip));
        assert_eq!("bads".parse::<EventType>().ok(), Some(EventType::BadSequenceNumber));
        assert_eq!("sender".parse::<EventType>().ok(), Some(EventType::SenderError));
        assert!("drop".parse::<EventType>().is_err());
    }

    #[test]
    fn primitive_values_are_dense() {
        for (i, event_type) in EventType::ALL.into_iter().enumerate() {
            assert_eq!(event_type.to_primitive(), i as i32);
            assert_eq!(EventType::try_from(i as i32).ok(), Some(event_type));
        }
        assert!(EventType::try_from(6).is_err());
        assert!(EventType::try_from(-1).is_err());
    }
}
