//! Waiting on the operator console, the daemons' stdout and their IPC sockets
//! at the same time

use std::{
    fmt,
    io::{self, BufRead, BufReader, Read, Write},
    marker::PhantomData,
    os::fd::{AsFd, AsRawFd, BorrowedFd},
    time::Duration,
};

use arrayvec::ArrayVec;
use gptp_abnormal::ipc::MAX_IPC_DATAGRAM_LEN;

use crate::daemon::{DaemonInstance, Fill};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceId {
    Console,
    MasterStdout,
    SlaveStdout,
    MasterIpc,
    SlaveIpc,
}

impl SourceId {
    /// All sources, in the order they are drained
    pub const ALL: [SourceId; 5] = [
        SourceId::Console,
        SourceId::MasterStdout,
        SourceId::SlaveStdout,
        SourceId::MasterIpc,
        SourceId::SlaveIpc,
    ];

    /// Prefix of echoed lines
    pub fn tag(self) -> &'static str {
        match self {
            SourceId::Console => "console",
            SourceId::MasterStdout => "master",
            SourceId::SlaveStdout => "slave",
            SourceId::MasterIpc => "master-ipc",
            SourceId::SlaveIpc => "slave-ipc",
        }
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The sources that have data available
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadySet(u8);

impl ReadySet {
    pub fn insert(&mut self, source: SourceId) {
        self.0 |= source.bit();
    }

    pub fn contains(self, source: SourceId) -> bool {
        self.0 & source.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: ReadySet) -> ReadySet {
        ReadySet(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = SourceId> {
        SourceId::ALL
            .into_iter()
            .filter(move |source| self.contains(*source))
    }
}

impl FromIterator<SourceId> for ReadySet {
    fn from_iter<T: IntoIterator<Item = SourceId>>(iter: T) -> Self {
        let mut set = ReadySet::default();
        for source in iter {
            set.insert(source);
        }
        set
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
    #[error("unexpected event on {origin}: {revents:#x}")]
    UnexpectedPollEvent { origin: SourceId, revents: i16 },
    #[error("{origin} reached end of stream")]
    Closed { origin: SourceId },
    #[error("reading {origin} failed: {error}")]
    Read {
        origin: SourceId,
        #[source]
        error: io::Error,
    },
    #[error("echoing {origin} failed: {error}")]
    Echo {
        origin: SourceId,
        #[source]
        error: io::Error,
    },
}

/// `poll(2)` over a fixed set of sources
///
/// Only plain readability is an acceptable outcome, any other event bit makes
/// [`Poller::wait`] fail.
#[derive(Debug)]
pub struct Poller<'fd> {
    fds: ArrayVec<libc::pollfd, 5>,
    ids: ArrayVec<SourceId, 5>,
    _fds: PhantomData<BorrowedFd<'fd>>,
}

impl<'fd> Default for Poller<'fd> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'fd> Poller<'fd> {
    pub fn new() -> Self {
        Self {
            fds: ArrayVec::new(),
            ids: ArrayVec::new(),
            _fds: PhantomData,
        }
    }

    /// Watch `fd` for readability under the name `id`
    ///
    /// Registering an id a second time replaces its descriptor.
    pub fn register(&mut self, id: SourceId, fd: BorrowedFd<'fd>) {
        let pollfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        match self.ids.iter().position(|known| *known == id) {
            Some(i) => self.fds[i] = pollfd,
            None => {
                // one slot per SourceId, so this never overflows
                self.fds.push(pollfd);
                self.ids.push(id);
            }
        }
    }

    /// Block until a source is readable or `timeout` has passed
    ///
    /// `Ok(None)` means nothing became ready, which includes the wait being
    /// interrupted by a signal.
    pub fn wait(&mut self, timeout: Duration) -> Result<Option<ReadySet>, MuxError> {
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        for pollfd in self.fds.iter_mut() {
            pollfd.revents = 0;
        }

        // SAFETY: fds points to fds.len() initialized pollfd structures, whose
        // descriptors are kept open by the 'fd borrow
        let count = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if count < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(MuxError::Poll(error));
        }

        if count == 0 {
            return Ok(None);
        }

        let mut ready = ReadySet::default();
        for (pollfd, id) in self.fds.iter().zip(self.ids.iter()) {
            match pollfd.revents {
                0 => {}
                libc::POLLIN => ready.insert(*id),
                revents => {
                    log::warn!("unexpected event on {id}: {revents:#x}");
                    return Err(MuxError::UnexpectedPollEvent {
                        origin: *id,
                        revents,
                    });
                }
            }
        }

        Ok(Some(ready))
    }
}

/// Where operator input comes from
///
/// Input the reader already pulled out of the descriptor is invisible to
/// `poll(2)`, so it is reported through [`Console::has_buffered`].
pub trait Console {
    fn fd(&self) -> BorrowedFd<'_>;

    fn has_buffered(&self) -> bool;

    /// Read one line, its content does not matter
    fn next_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;
}

impl<R: Read + AsFd> Console for BufReader<R> {
    fn fd(&self) -> BorrowedFd<'_> {
        self.get_ref().as_fd()
    }

    fn has_buffered(&self) -> bool {
        !self.buffer().is_empty()
    }

    fn next_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.read_until(b'\n', buf)
    }
}

/// Which sources get printed when they deliver data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoPolicy {
    pub master_stdout: bool,
    pub slave_stdout: bool,
    pub master_ipc: bool,
    pub slave_ipc: bool,
}

impl EchoPolicy {
    /// Stdout selection from the verbose level: bit 0 is the master, bit 1 the
    /// slave
    pub fn from_verbose(verbose: u8) -> Self {
        Self {
            master_stdout: verbose & 1 != 0,
            slave_stdout: verbose & 2 != 0,
            ..Default::default()
        }
    }

    pub fn shows(&self, source: SourceId) -> bool {
        match source {
            SourceId::Console => false,
            SourceId::MasterStdout => self.master_stdout,
            SourceId::SlaveStdout => self.slave_stdout,
            SourceId::MasterIpc => self.master_ipc,
            SourceId::SlaveIpc => self.slave_ipc,
        }
    }
}

/// Everything the multiplexer looks at during one call
pub struct Endpoints<'a, C> {
    pub console: Option<&'a mut C>,
    pub master: &'a mut DaemonInstance,
    pub slave: &'a mut DaemonInstance,
}

impl<'a, C> Endpoints<'a, C> {
    fn daemon(&self, source: SourceId) -> &DaemonInstance {
        match source {
            SourceId::MasterStdout | SourceId::MasterIpc => &*self.master,
            _ => &*self.slave,
        }
    }

    fn daemon_mut(&mut self, source: SourceId) -> &mut DaemonInstance {
        match source {
            SourceId::MasterStdout | SourceId::MasterIpc => &mut *self.master,
            _ => &mut *self.slave,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    Continue,
    /// The operator pressed enter
    AbortRequested,
}

#[derive(Debug, Clone, Copy)]
pub struct Multiplexer {
    echo: EchoPolicy,
}

impl Multiplexer {
    pub fn new(echo: EchoPolicy) -> Self {
        Self { echo }
    }

    pub fn echo(&self) -> EchoPolicy {
        self.echo
    }

    /// Wait up to `timeout` for any of the endpoints to have data
    ///
    /// Buffered console input and complete lines already buffered from a
    /// daemon count as ready right away. A partial line does not.
    pub fn poll<C: Console>(
        &self,
        endpoints: &Endpoints<'_, C>,
        timeout: Duration,
    ) -> Result<Option<ReadySet>, MuxError> {
        let mut poller = Poller::new();
        let mut buffered = ReadySet::default();

        if let Some(console) = endpoints.console.as_deref() {
            if console.has_buffered() {
                buffered.insert(SourceId::Console);
            }
            poller.register(SourceId::Console, console.fd());
        }

        for id in [SourceId::MasterStdout, SourceId::SlaveStdout] {
            if let Some(output) = endpoints.daemon(id).stdout() {
                if output.has_line() {
                    buffered.insert(id);
                }
                poller.register(id, output.as_fd());
            }
        }

        for id in [SourceId::MasterIpc, SourceId::SlaveIpc] {
            if let Some(socket) = endpoints.daemon(id).ipc_socket() {
                poller.register(id, socket.as_fd());
            }
        }

        let timeout = if buffered.is_empty() {
            timeout
        } else {
            Duration::ZERO
        };

        let ready = poller.wait(timeout)?.unwrap_or_default().union(buffered);
        Ok((!ready.is_empty()).then_some(ready))
    }

    /// Read one unit from every ready source and echo it when selected
    ///
    /// None of the reads wait: a daemon's stdout gets one non-blocking read
    /// and only a complete line is echoed.
    pub fn drain<C: Console, W: Write>(
        &self,
        ready: ReadySet,
        endpoints: &mut Endpoints<'_, C>,
        out: &mut W,
    ) -> Result<Drained, MuxError> {
        for origin in ready.iter() {
            match origin {
                SourceId::Console => {
                    if let Some(console) = endpoints.console.as_deref_mut() {
                        let mut line = Vec::new();
                        if let Err(error) = console.next_line(&mut line) {
                            log::warn!("reading the console failed: {error}");
                        }
                    }
                    log::info!("console input");
                    return Ok(Drained::AbortRequested);
                }
                SourceId::MasterStdout | SourceId::SlaveStdout => {
                    let Some(output) = endpoints.daemon_mut(origin).stdout_mut() else {
                        continue;
                    };

                    if !output.has_line() {
                        let fill = output
                            .fill()
                            .map_err(|error| MuxError::Read { origin, error })?;

                        if fill == Fill::Eof {
                            if let Some(rest) = output.take_partial() {
                                self.echo_line(origin, &rest, out)?;
                            }
                            return Err(MuxError::Closed { origin });
                        }
                    }

                    if let Some(line) = output.next_line() {
                        self.echo_line(origin, &line, out)?;
                    }
                }
                SourceId::MasterIpc | SourceId::SlaveIpc => {
                    let Some(socket) = endpoints.daemon(origin).ipc_socket() else {
                        continue;
                    };

                    let mut buffer = [0; MAX_IPC_DATAGRAM_LEN];
                    let received = socket
                        .recv(&mut buffer)
                        .map_err(|error| MuxError::Read { origin, error })?;

                    if self.echo.shows(origin) {
                        writeln!(out, "{origin}:{}", hex::encode(&buffer[..received]))
                            .map_err(|error| MuxError::Echo { origin, error })?;
                    }
                }
            }
        }

        Ok(Drained::Continue)
    }

    fn echo_line<W: Write>(
        &self,
        origin: SourceId,
        line: &[u8],
        out: &mut W,
    ) -> Result<(), MuxError> {
        if !self.echo.shows(origin) {
            return Ok(());
        }

        let line = String::from_utf8_lossy(line);
        writeln!(out, "{origin}:{}", line.trim_end())
            .map_err(|error| MuxError::Echo { origin, error })
    }
}
