use std::{
    fs::File,
    io::{self, Read},
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
};

/// Bytes taken from the pipe per readiness event
const READ_CHUNK: usize = 4096;

/// Line oriented view of a daemon's stdout pipe
///
/// The pipe is switched to non-blocking mode, so [`DaemonOutput::fill`] never
/// waits for the rest of a line. Only complete lines leave the buffer.
#[derive(Debug)]
pub struct DaemonOutput {
    file: File,
    pending: Vec<u8>,
}

/// Result of one read from the pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Bytes were added, or nothing was there to read
    Open,
    /// The writing side is gone
    Eof,
}

impl DaemonOutput {
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(fd.as_fd())?;
        Ok(Self {
            file: File::from(fd),
            pending: Vec::new(),
        })
    }

    /// Whether a complete line is waiting in the buffer
    pub fn has_line(&self) -> bool {
        self.pending.contains(&b'\n')
    }

    /// Read whatever the pipe holds right now, at most one chunk
    pub fn fill(&mut self) -> io::Result<Fill> {
        let mut chunk = [0; READ_CHUNK];

        loop {
            match self.file.read(&mut chunk) {
                Ok(0) => return Ok(Fill::Eof),
                Ok(read) => {
                    self.pending.extend_from_slice(&chunk[..read]);
                    return Ok(Fill::Open);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(Fill::Open),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    /// Take the next complete line, including its newline
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|byte| *byte == b'\n')?;
        Some(self.pending.drain(..=end).collect())
    }

    /// Take what is left after the pipe closed without a final newline
    pub fn take_partial(&mut self) -> Option<Vec<u8>> {
        (!self.pending.is_empty()).then(|| std::mem::take(&mut self.pending))
    }
}

impl AsFd for DaemonOutput {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();

    // SAFETY: raw stays open for the duration of the borrow, F_GETFL and
    // F_SETFL only touch the file status flags
    unsafe {
        let flags = libc::fcntl(raw, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}
