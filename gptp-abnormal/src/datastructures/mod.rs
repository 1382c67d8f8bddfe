//! Enumerations shared between the harness and the daemon's abnormal hooks

mod event_type;
mod message_type;

pub use event_type::EventType;
pub use message_type::MessageType;

/// A primitive value or selector did not map onto an enum variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumConversionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireFormatError {
    #[error("enum conversion failed")]
    EnumConversionError,
    #[error("a buffer is too short")]
    BufferTooShort,
}

impl From<EnumConversionError> for WireFormatError {
    fn from(_: EnumConversionError) -> Self {
        Self::EnumConversionError
    }
}
