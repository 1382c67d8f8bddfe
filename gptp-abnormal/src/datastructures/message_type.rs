use core::{fmt, str::FromStr};

use super::EnumConversionError;

/// The gPTP message types an abnormal event can be attached to
///
/// The primitive values are the `PTPMsgType` numbers used by the daemon, which
/// in turn follow the messageType field of the PTP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum MessageType {
    Sync = 0x0,
    PDelayReq = 0x2,
    PDelayResp = 0x3,
    FollowUp = 0x8,
    PDelayRespFollowUp = 0xa,
    Announce = 0xb,
    Signaling = 0xc,
    Management = 0xd,
}

impl MessageType {
    /// All message types, in the order they are listed to the operator
    pub const ALL: [MessageType; 8] = [
        MessageType::Sync,
        MessageType::PDelayReq,
        MessageType::PDelayResp,
        MessageType::FollowUp,
        MessageType::PDelayRespFollowUp,
        MessageType::Announce,
        MessageType::Signaling,
        MessageType::Management,
    ];

    pub fn to_primitive(self) -> i32 {
        self as i32
    }

    /// Short selector used on the command line and in scenario files
    pub fn selector(self) -> &'static str {
        match self {
            MessageType::Sync => "sync",
            MessageType::PDelayReq => "pdreq",
            MessageType::PDelayResp => "pdres",
            MessageType::FollowUp => "fup",
            MessageType::PDelayRespFollowUp => "pdrfup",
            MessageType::Announce => "anno",
            MessageType::Signaling => "sign",
            MessageType::Management => "mang",
        }
    }

    /// Nominal transmission interval of this message type in milliseconds
    ///
    /// These are the default gPTP intervals the daemon runs with. They only
    /// serve to estimate how long an event with a limited repeat count needs
    /// to stay registered.
    pub fn nominal_interval_ms(self) -> u32 {
        match self {
            MessageType::Sync | MessageType::FollowUp => 125,
            MessageType::PDelayReq
            | MessageType::PDelayResp
            | MessageType::PDelayRespFollowUp
            | MessageType::Announce => 1000,
            MessageType::Signaling | MessageType::Management => 8000,
        }
    }

    pub fn nominal_interval_secs(self) -> f64 {
        self.nominal_interval_ms() as f64 / 1000.0
    }
}

impl TryFrom<i32> for MessageType {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use MessageType::*;

        match value {
            0x0 => Ok(Sync),
            0x2 => Ok(PDelayReq),
            0x3 => Ok(PDelayResp),
            0x8 => Ok(FollowUp),
            0xa => Ok(PDelayRespFollowUp),
            0xb => Ok(Announce),
            0xc => Ok(Signaling),
            0xd => Ok(Management),
            _ => Err(EnumConversionError),
        }
    }
}

impl FromStr for MessageType {
    type Err = EnumConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|message_type| message_type.selector() == s)
            .ok_or(EnumConversionError)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_resolve() {
        assert_eq!("sync".parse::<MessageType>().ok(), Some(MessageType::Sync));
        assert_eq!("pdrfup".parse::<MessageType>().ok(), Some(MessageType::PDelayRespFollowUp));
        assert_eq!("mang".parse::<MessageType>().ok(), Some(MessageType::Management));
        assert!("bogus".parse::<MessageType>().is_err());
        assert!("SYNC".parse::<MessageType>().is_err());
    }

    #[test]
    fn primitive_values() {
        let codes: Vec<i32> = MessageType::ALL.iter().map(|m| m.to_primitive()).collect();
        assert_eq!(codes, [0, 2, 3, 8, 10, 11, 12, 13]);

        for message_type in MessageType::ALL {
            assert_eq!(
                MessageType::try_from(message_type.to_primitive()).ok(),
                Some(message_type)
            );
        }

        assert!(MessageType::try_from(0x1).is_err());
        assert!(MessageType::try_from(0x9).is_err());
    }

    #[test]
    fn nominal_intervals() {
        assert_eq!(MessageType::Sync.nominal_interval_ms(), 125);
        assert_eq!(MessageType::Announce.nominal_interval_ms(), 1000);
        assert_eq!(MessageType::Signaling.nominal_interval_ms(), 8000);
        assert_eq!(MessageType::FollowUp.nominal_interval_secs(), 0.125);
    }
}
