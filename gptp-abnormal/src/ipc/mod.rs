//! The daemon's IPC client request, as far as abnormal events are concerned
//!
//! The daemon reads the request as a packed C structure, so every field has a
//! fixed width and uses the byte order of the host.

use crate::{
    datastructures::{EventType, MessageType, WireFormatError},
    fault::ResolvedFault,
};

mod command;

pub use command::{IpcCommand, SubCommand};

/// Size of an encoded [`ControlMessage`]
pub const CONTROL_MESSAGE_LEN: usize = 44;

/// Largest datagram the daemon sends back over the IPC socket
pub const MAX_IPC_DATAGRAM_LEN: usize = 4096;

/// Register or deregister one abnormal event on the daemon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlMessage {
    pub command: IpcCommand,
    pub domain_number: i32,
    pub domain_index: i32,
    pub port_index: i32,
    pub subcommand: SubCommand,
    pub message_type: MessageType,
    pub event_type: EventType,
    pub event_rate: f32,
    pub repeat: i32,
    pub interval: i32,
    pub event_parameter: i32,
}

impl ControlMessage {
    // Only domain 0 on the first port is exercised by the harness
    const DOMAIN_NUMBER: i32 = 0;
    const DOMAIN_INDEX: i32 = 0;
    const PORT_INDEX: i32 = 1;

    pub fn new(
        subcommand: SubCommand,
        message_type: MessageType,
        event_type: EventType,
        event_rate: f32,
        repeat: i32,
        interval: i32,
        event_parameter: i32,
    ) -> Self {
        Self {
            command: IpcCommand::RegAbnormalEvent,
            domain_number: Self::DOMAIN_NUMBER,
            domain_index: Self::DOMAIN_INDEX,
            port_index: Self::PORT_INDEX,
            subcommand,
            message_type,
            event_type,
            event_rate,
            repeat,
            interval,
            event_parameter,
        }
    }

    /// The message that arms `fault`
    pub fn register(fault: &ResolvedFault) -> Self {
        Self::new(
            SubCommand::Register,
            fault.message_type,
            fault.event_type,
            fault.probability,
            fault.repeat,
            fault.interval,
            fault.event_parameter,
        )
    }

    /// The message that disarms `fault`
    pub fn deregister(fault: &ResolvedFault) -> Self {
        Self::new(
            SubCommand::Deregister,
            fault.message_type,
            fault.event_type,
            1.0,
            0,
            0,
            0,
        )
    }

    pub fn wire_size(&self) -> usize {
        CONTROL_MESSAGE_LEN
    }

    /// Serializes the message into the daemon's request layout.
    ///
    /// Returns the used buffer size or an error.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        let buffer = buffer
            .get_mut(..CONTROL_MESSAGE_LEN)
            .ok_or(WireFormatError::BufferTooShort)?;

        buffer[0..4].copy_from_slice(&self.command.to_primitive().to_ne_bytes());
        buffer[4..8].copy_from_slice(&self.domain_number.to_ne_bytes());
        buffer[8..12].copy_from_slice(&self.domain_index.to_ne_bytes());
        buffer[12..16].copy_from_slice(&self.port_index.to_ne_bytes());
        buffer[16..20].copy_from_slice(&self.subcommand.to_primitive().to_ne_bytes());
        buffer[20..24].copy_from_slice(&self.message_type.to_primitive().to_ne_bytes());
        buffer[24..28].copy_from_slice(&self.event_type.to_primitive().to_ne_bytes());
        buffer[28..32].copy_from_slice(&self.event_rate.to_ne_bytes());
        buffer[32..36].copy_from_slice(&self.repeat.to_ne_bytes());
        buffer[36..40].copy_from_slice(&self.interval.to_ne_bytes());
        buffer[40..44].copy_from_slice(&self.event_parameter.to_ne_bytes());

        Ok(CONTROL_MESSAGE_LEN)
    }

    pub fn to_bytes(&self) -> [u8; CONTROL_MESSAGE_LEN] {
        let mut buffer = [0; CONTROL_MESSAGE_LEN];
        // the buffer has exactly the wire size, so this cannot fail
        let _ = self.serialize(&mut buffer);
        buffer
    }

    /// Deserializes a request from the daemon's layout.
    ///
    /// Returns the message or an error.
    pub fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < CONTROL_MESSAGE_LEN {
            return Err(WireFormatError::BufferTooShort);
        }

        let field = |offset: usize| {
            i32::from_ne_bytes([
                buffer[offset],
                buffer[offset + 1],
                buffer[offset + 2],
                buffer[offset + 3],
            ])
        };

        Ok(Self {
            command: field(0).try_into()?,
            domain_number: field(4),
            domain_index: field(8),
            port_index: field(12),
            subcommand: field(16).try_into()?,
            message_type: field(20).try_into()?,
            event_type: field(24).try_into()?,
            event_rate: f32::from_ne_bytes([buffer[28], buffer[29], buffer[30], buffer[31]]),
            repeat: field(32),
            interval: field(36),
            event_parameter: field(40),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultSpec;

    fn fault(msgtype: &str, evttype: &str, prob: f32, repeat: u32) -> ResolvedFault {
        FaultSpec {
            msgtype: msgtype.to_owned(),
            evttype: evttype.to_owned(),
            prob,
            repeat,
            interval: 2,
            eventpara: -3,
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn register_layout() {
        let message = ControlMessage::register(&fault("pdres", "bads", 0.5, 4));
        let bytes = message.to_bytes();

        let int = |i: usize| i32::from_ne_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());

        assert_eq!(int(0), 9);
        assert_eq!(int(1), 0);
        assert_eq!(int(2), 0);
        assert_eq!(int(3), 1);
        assert_eq!(int(4), 0);
        assert_eq!(int(5), 3);
        assert_eq!(int(6), 3);
        assert_eq!(f32::from_ne_bytes(bytes[28..32].try_into().unwrap()), 0.5);
        assert_eq!(int(8), 4);
        assert_eq!(int(9), 2);
        assert_eq!(int(10), -3);
    }

    #[test]
    fn deregister_resets_parameters() {
        let message = ControlMessage::deregister(&fault("fup", "nots", 0.25, 7));

        assert_eq!(message.subcommand, SubCommand::Deregister);
        assert_eq!(message.message_type, MessageType::FollowUp);
        assert_eq!(message.event_type, EventType::NoTimestamp);
        assert_eq!(message.event_rate, 1.0);
        assert_eq!(message.repeat, 0);
        assert_eq!(message.interval, 0);
        assert_eq!(message.event_parameter, 0);
    }

    #[test]
    fn register_roundtrip() {
        let message = ControlMessage::register(&fault("sync", "skip", 0.3, 3));
        let decoded = ControlMessage::deserialize(&message.to_bytes()).unwrap();

        assert_eq!(decoded.command, IpcCommand::RegAbnormalEvent);
        assert_eq!(decoded.subcommand, SubCommand::Register);
        assert_eq!(decoded.message_type, MessageType::Sync);
        assert_eq!(decoded.event_type, EventType::Skip);
        assert!((decoded.event_rate - 0.3).abs() < f32::EPSILON);
        assert_eq!(decoded, message);
    }

    #[test]
    fn short_buffers() {
        let message = ControlMessage::register(&fault("anno", "dup", 1.0, 0));

        let mut buffer = [0; CONTROL_MESSAGE_LEN - 1];
        assert_eq!(
            message.serialize(&mut buffer),
            Err(WireFormatError::BufferTooShort)
        );
        assert_eq!(
            ControlMessage::deserialize(&message.to_bytes()[..20]),
            Err(WireFormatError::BufferTooShort)
        );

        let mut buffer = [0xff; 64];
        assert_eq!(message.serialize(&mut buffer), Ok(CONTROL_MESSAGE_LEN));
        assert_eq!(buffer[CONTROL_MESSAGE_LEN], 0xff);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let mut bytes = ControlMessage::register(&fault("sync", "skip", 1.0, 0)).to_bytes();
        bytes[20..24].copy_from_slice(&1i32.to_ne_bytes());

        assert_eq!(
            ControlMessage::deserialize(&bytes),
            Err(WireFormatError::EnumConversionError)
        );
    }
}
