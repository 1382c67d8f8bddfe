//! One gptp2d process together with its IPC socket

use std::{
    ffi::OsStr,
    io,
    net::{Ipv4Addr, UdpSocket},
    os::fd::OwnedFd,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    time::Duration,
};

pub use config::DaemonConfigFile;
pub use output::{DaemonOutput, Fill};

mod config;
mod output;

/// Log selector handed to the daemon through `UBL_GPTP`
pub const DEFAULT_LOG_SELECTOR: &str = "45,ubase:45,cbase:45,gptp:47";

/// First overlay-IP port; instance `n` uses `base + n`
pub const DEFAULT_BASE_PORT: u16 = 5018;

/// Offset between the overlay-IP port and the IPC port of an instance
const IPC_PORT_OFFSET: u16 = 500;

/// Priority1 of instance 0; later instances get a worse priority
const BASE_PRIORITY1: u8 = 246;

/// How the daemons of a run are launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    /// The gptp2d executable
    pub program: PathBuf,
    /// Command the executable is started through, `stdbuf -o0` keeps the
    /// daemon's stdout unbuffered
    pub launcher: Vec<String>,
    /// Value of `UBL_GPTP` in the daemon's environment
    pub log_selector: Option<String>,
    /// Directory the configuration files are written to
    pub workdir: PathBuf,
    pub base_port: u16,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gptp2d"),
            launcher: vec!["stdbuf".to_owned(), "-o0".to_owned()],
            log_selector: Some(DEFAULT_LOG_SELECTOR.to_owned()),
            workdir: PathBuf::from("."),
            base_port: DEFAULT_BASE_PORT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("could not write daemon config {path:?}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{role}: can't run {command}: {source}")]
    Spawn {
        role: &'static str,
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{role}: no port numbers left above base port {base_port}")]
    PortOutOfRange { role: &'static str, base_port: u16 },
    #[error("{role}: daemon exited with {status} before its IPC socket came up")]
    Exited {
        role: &'static str,
        status: ExitStatus,
    },
    #[error("{role}: {source}")]
    Io {
        role: &'static str,
        #[source]
        source: io::Error,
    },
}

/// A gptp2d process and the UDP socket used to control it
///
/// The process and the socket are released by [`DaemonInstance::close`], which
/// also runs when the instance is dropped.
#[derive(Debug)]
pub struct DaemonInstance {
    index: u8,
    ovip_port: u16,
    ipc_port: u16,
    config_path: PathBuf,
    options: DaemonOptions,
    process: Option<Child>,
    stdout: Option<DaemonOutput>,
    ipc: Option<UdpSocket>,
}

impl DaemonInstance {
    /// Derive the ports of instance `index` and write its configuration file
    pub fn new(index: u8, options: &DaemonOptions) -> Result<Self, DaemonError> {
        let role = role_of(index);
        let out_of_range = || DaemonError::PortOutOfRange {
            role,
            base_port: options.base_port,
        };

        let ovip_port = options
            .base_port
            .checked_add(index.into())
            .ok_or_else(out_of_range)?;
        let ipc_port = ovip_port
            .checked_add(IPC_PORT_OFFSET)
            .ok_or_else(out_of_range)?;
        let priority1 = BASE_PRIORITY1.saturating_add(index);

        let config_path = options.workdir.join(format!("gptp2_test{index}.conf"));
        let config = DaemonConfigFile {
            index,
            ipc_port,
            ovip_port,
            priority1,
        };
        config
            .write_to(&config_path)
            .map_err(|source| DaemonError::ConfigWrite {
                path: config_path.clone(),
                source,
            })?;

        log::debug!("{role}: wrote {config_path:?}, IPC port {ipc_port}");

        Ok(Self {
            index,
            ovip_port,
            ipc_port,
            config_path,
            options: options.clone(),
            process: None,
            stdout: None,
            ipc: None,
        })
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn role(&self) -> &'static str {
        role_of(self.index)
    }

    pub fn ipc_port(&self) -> u16 {
        self.ipc_port
    }

    pub fn ovip_port(&self) -> u16 {
        self.ovip_port
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Name of the virtual network device the daemon runs on
    pub fn device(&self) -> String {
        format!("cbeth{}", self.index)
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(Child::id)
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn stdout(&self) -> Option<&DaemonOutput> {
        self.stdout.as_ref()
    }

    pub fn stdout_mut(&mut self) -> Option<&mut DaemonOutput> {
        self.stdout.as_mut()
    }

    pub fn ipc_socket(&self) -> Option<&UdpSocket> {
        self.ipc.as_ref()
    }

    fn command(&self) -> Command {
        let mut parts = self
            .options
            .launcher
            .iter()
            .map(OsStr::new)
            .chain([self.options.program.as_os_str()]);

        // the chain always yields at least the program
        let mut command = Command::new(parts.next().unwrap_or(self.options.program.as_os_str()));
        command
            .args(parts)
            .arg("-d")
            .arg(self.device())
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());

        if let Some(selector) = &self.options.log_selector {
            command.env("UBL_GPTP", selector);
        }

        command
    }

    /// Launch the daemon
    pub fn start(&mut self) -> Result<(), DaemonError> {
        let mut command = self.command();
        let role = self.role();

        let mut child = command.spawn().map_err(|source| DaemonError::Spawn {
            role,
            command: format!("{command:?}"),
            source,
        })?;

        log::info!("{role}: started {command:?} as pid {}", child.id());

        let stdout = child.stdout.take();
        self.process = Some(child);
        self.stdout = stdout
            .map(|stdout| DaemonOutput::new(OwnedFd::from(stdout)))
            .transpose()
            .map_err(|source| DaemonError::Io { role, source })?;

        Ok(())
    }

    /// Open the IPC socket towards the daemon
    ///
    /// Connecting a UDP socket only records the peer address, it succeeds
    /// whether or not the daemon listens yet. Datagrams sent before the daemon
    /// bound its IPC port are lost.
    pub fn connect_ipc(&mut self) -> io::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        socket.connect((Ipv4Addr::LOCALHOST, self.ipc_port))?;

        log::debug!(
            "{}: IPC socket {} -> {}",
            self.role(),
            socket.local_addr()?,
            self.ipc_port
        );

        self.ipc = Some(socket);
        Ok(())
    }

    /// Keep trying [`DaemonInstance::connect_ipc`] every `delay` until it
    /// succeeds
    ///
    /// Gives up only when the daemon process is gone. Only local socket
    /// errors are retried, this does not wait for the daemon's IPC listener.
    pub fn connect_ipc_retry(&mut self, delay: Duration) -> Result<(), DaemonError> {
        let role = self.role();

        loop {
            let error = match self.connect_ipc() {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            log::debug!("{role}: can't connect IPC port {}: {error}", self.ipc_port);

            if let Some(child) = self.process.as_mut() {
                let exited = child
                    .try_wait()
                    .map_err(|source| DaemonError::Io { role, source })?;
                if let Some(status) = exited {
                    return Err(DaemonError::Exited { role, status });
                }
            }

            std::thread::sleep(delay);
        }
    }

    /// Send one datagram over the IPC socket
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        let socket = self
            .ipc
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let sent = socket.send(data)?;
        if sent != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("only {sent} of {} bytes sent", data.len()),
            ));
        }

        Ok(())
    }

    /// Terminate the daemon and close the IPC socket
    ///
    /// Does nothing for the parts that are not there, so this can be called
    /// any number of times.
    pub fn close(&mut self) -> io::Result<()> {
        self.ipc = None;
        self.stdout = None;

        let Some(mut child) = self.process.take() else {
            return Ok(());
        };

        log::debug!("{}: terminating pid {}", self.role(), child.id());

        if let Err(error) = request_termination(&child) {
            log::warn!("{}: SIGTERM failed ({error}), killing", self.role());
            child.kill()?;
        }

        let status = child.wait()?;
        log::info!("{}: daemon exited with {status}", self.role());

        Ok(())
    }
}

impl Drop for DaemonInstance {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("{}: could not close daemon: {error}", self.role());
        }
    }
}

fn role_of(index: u8) -> &'static str {
    match index {
        0 => "master",
        _ => "slave",
    }
}

fn request_termination(child: &Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    // SAFETY: pid belongs to a child that has not been reaped yet, so it
    // cannot have been reused
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::testutil::{fake_daemon, workdir};

    #[test]
    fn derived_ports_and_config() {
        let dir = workdir("derived-ports");
        let options = DaemonOptions {
            workdir: dir.clone(),
            ..Default::default()
        };

        let master = DaemonInstance::new(0, &options).unwrap();
        let slave = DaemonInstance::new(1, &options).unwrap();

        assert_eq!(master.role(), "master");
        assert_eq!(master.ovip_port(), 5018);
        assert_eq!(master.ipc_port(), 5518);
        assert_eq!(master.device(), "cbeth0");
        assert_eq!(slave.role(), "slave");
        assert_eq!(slave.ovip_port(), 5019);
        assert_eq!(slave.ipc_port(), 5519);

        let written = std::fs::read_to_string(slave.config_path()).unwrap();
        assert!(written.starts_with("CONF_IPC_UDP_PORT 5519\n"));
        assert!(written.contains("CONF_PRIMARY_PRIORITY1 247\n"));
        assert_eq!(slave.config_path(), dir.join("gptp2_test1.conf"));
    }

    #[test]
    fn port_overflow() {
        let dir = workdir("port-overflow");
        let options = DaemonOptions {
            workdir: dir,
            base_port: u16::MAX - 100,
            ..Default::default()
        };

        assert!(matches!(
            DaemonInstance::new(0, &options),
            Err(DaemonError::PortOutOfRange { .. })
        ));
    }

    #[test]
    fn launch_arguments() {
        let dir = workdir("launch-arguments");
        let options = fake_daemon(&dir, "echo \"$@\"; exec sleep 30", 42500);

        let mut instance = DaemonInstance::new(0, &options).unwrap();
        instance.start().unwrap();
        assert!(instance.is_running());

        let stdout = instance.stdout_mut().unwrap();
        for _ in 0..100 {
            if stdout.has_line() {
                break;
            }
            assert_eq!(stdout.fill().unwrap(), Fill::Open);
            std::thread::sleep(Duration::from_millis(20));
        }
        let line = String::from_utf8(stdout.next_line().unwrap()).unwrap();
        let expected = format!(
            "gptp2d -d cbeth0 -c {}\n",
            dir.join("gptp2_test0.conf").display()
        );
        assert_eq!(line, expected);

        instance.close().unwrap();
    }

    #[test]
    fn missing_executable() {
        let dir = workdir("missing-executable");
        let options = DaemonOptions {
            program: dir.join("does-not-exist"),
            launcher: vec![],
            workdir: dir,
            ..Default::default()
        };

        let mut instance = DaemonInstance::new(0, &options).unwrap();
        assert!(matches!(
            instance.start(),
            Err(DaemonError::Spawn { role: "master", .. })
        ));
        assert!(!instance.is_running());
        instance.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let dir = workdir("close-idempotent");
        let options = fake_daemon(&dir, "exec sleep 30", 42510);

        let mut instance = DaemonInstance::new(1, &options).unwrap();
        instance.start().unwrap();
        instance.connect_ipc().unwrap();
        assert!(instance.ipc_socket().is_some());

        let started = Instant::now();
        instance.close().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!instance.is_running());
        assert!(instance.ipc_socket().is_none());
        assert!(instance.pid().is_none());

        instance.close().unwrap();
        assert!(!instance.is_running());
    }

    #[test]
    fn connect_does_not_wait_for_listener() {
        let dir = workdir("connect-no-listener");
        let options = DaemonOptions {
            workdir: dir,
            base_port: 42520,
            ..Default::default()
        };

        let mut instance = DaemonInstance::new(0, &options).unwrap();
        instance.connect_ipc_retry(Duration::from_secs(5)).unwrap();
        let peer = instance.ipc_socket().unwrap().peer_addr().unwrap();
        assert_eq!(peer.port(), 43020);
    }

    #[test]
    fn send_requires_connection() {
        let dir = workdir("send-unconnected");
        let options = DaemonOptions {
            workdir: dir,
            ..Default::default()
        };

        let instance = DaemonInstance::new(0, &options).unwrap();
        let error = instance.send(&[0; 4]).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
    }
}
