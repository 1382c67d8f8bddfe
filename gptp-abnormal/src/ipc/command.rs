use crate::datastructures::EnumConversionError;

/// Commands understood by the daemon's IPC server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IpcCommand {
    Nop = 0,
    ReqNdportInfo = 1,
    ReqGportInfo = 2,
    ReqClockInfo = 3,
    ActiveDomainSwitch = 4,
    RunExtScript = 5,
    TsnScheduleControl = 6,
    ReqStatInfo = 7,
    ReqStatInfoReset = 8,
    RegAbnormalEvent = 9,
    Disconnect = 10,
}

impl IpcCommand {
    pub fn to_primitive(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for IpcCommand {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use IpcCommand::*;

        match value {
            0 => Ok(Nop),
            1 => Ok(ReqNdportInfo),
            2 => Ok(ReqGportInfo),
            3 => Ok(ReqClockInfo),
            4 => Ok(ActiveDomainSwitch),
            5 => Ok(RunExtScript),
            6 => Ok(TsnScheduleControl),
            7 => Ok(ReqStatInfo),
            8 => Ok(ReqStatInfoReset),
            9 => Ok(RegAbnormalEvent),
            10 => Ok(Disconnect),
            _ => Err(EnumConversionError),
        }
    }
}

/// Sub command of [`IpcCommand::RegAbnormalEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SubCommand {
    Register = 0,
    Deregister = 1,
}

impl SubCommand {
    pub fn to_primitive(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for SubCommand {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SubCommand::Register),
            1 => Ok(SubCommand::Deregister),
            _ => Err(EnumConversionError),
        }
    }
}
