use std::{fmt, path::Path};

/// The flat `KEY value` configuration file of one gptp2d instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfigFile {
    pub index: u8,
    pub ipc_port: u16,
    pub ovip_port: u16,
    pub priority1: u8,
}

impl DaemonConfigFile {
    const TS2DIFF_CACHE_FACTOR: u32 = 300;
    const DEBUGLOG_MEMORY_SIZE: u32 = 1024;

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_string())
    }
}

impl fmt::Display for DaemonConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CONF_IPC_UDP_PORT {}", self.ipc_port)?;
        writeln!(f, "CONF_OVIP_MODE_STRT_PORTNO {}", self.ovip_port)?;
        writeln!(f, "CONF_PRIMARY_PRIORITY1 {}", self.priority1)?;
        writeln!(f, "CONF_MASTER_CLOCK_SHARED_MEM \"/gptp_mc_shm{}\"", self.index)?;
        writeln!(f, "CONF_DEBUGLOG_MEMORY_FILE \"gptp2d_debugmem{}.log\"", self.index)?;
        writeln!(f, "CONF_TS2DIFF_CACHE_FACTOR {}", Self::TS2DIFF_CACHE_FACTOR)?;
        writeln!(f, "CONF_DEBUGLOG_MEMORY_SIZE {}", Self::DEBUGLOG_MEMORY_SIZE)?;
        writeln!(f, "CONF_LOG_GPTP_CAPABLE_MESSAGE_INTERVAL 1")?;
        writeln!(f, "CONF_ACTIVATE_ABNORMAL_HOOKS 1")
    }
}
