use std::{
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::Arc,
};

use tracing::{error, trace};

use crate::{constants::WORK_DELAY_SIZE, pump::ScheduleWork};

/// We usually have a single delay on the pipe, but there can be two if a
/// request arrived while the previous one was being processed.
const MAX_DELAYS_PER_READ: usize = 2;

fn handle_eintr<F: FnMut() -> isize>(mut f: F) -> io::Result<usize> {
    loop {
        let result = f();
        if result >= 0 {
            return Ok(result as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn set_flag(fd: RawFd, get: libc::c_int, set: libc::c_int, flag: libc::c_int) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, get);
        if flags == -1 || libc::fcntl(fd, set, flags | flag) == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

/// Self-pipe carrying 8-byte delay values into the loop thread.
#[derive(Debug)]
pub struct WakeupPipe {
    read: OwnedFd,
    write: Arc<OwnedFd>,
}

impl WakeupPipe {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        for fd in [read.as_raw_fd(), write.as_raw_fd()] {
            set_flag(fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
        }

        // A readable poll without data must not block the loop thread.
        set_flag(read.as_raw_fd(), libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)?;

        Ok(Self {
            read,
            write: Arc::new(write),
        })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub fn writer(&self) -> PipeWriter {
        PipeWriter(self.write.clone())
    }

    /// Reads at most two queued delays. An empty pipe yields nothing.
    pub fn read_delays(&self) -> io::Result<Vec<i64>> {
        let mut buffer = [0u8; WORK_DELAY_SIZE * MAX_DELAYS_PER_READ];

        let result = handle_eintr(|| unsafe {
            libc::read(
                self.read.as_raw_fd(),
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            )
        });

        let num_bytes = match result {
            Ok(num_bytes) => num_bytes,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!("Spurious wakeup of the message pump");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if num_bytes % WORK_DELAY_SIZE != 0 {
            trace!("Ignoring {} trailing wakeup bytes", num_bytes % WORK_DELAY_SIZE);
        }

        Ok(buffer[..num_bytes]
            .chunks_exact(WORK_DELAY_SIZE)
            .map(|chunk| {
                let mut bytes = [0u8; WORK_DELAY_SIZE];
                bytes.copy_from_slice(chunk);
                i64::from_ne_bytes(bytes)
            })
            .collect())
    }
}

/// Write end of the wakeup pipe, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct PipeWriter(Arc<OwnedFd>);

impl PipeWriter {
    pub fn write_delay(&self, delay_ms: i64) -> io::Result<()> {
        let bytes = delay_ms.to_ne_bytes();

        let written = handle_eintr(|| unsafe {
            libc::write(
                self.0.as_raw_fd(),
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
            )
        })?;

        if written != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write of {written} bytes"),
            ));
        }

        Ok(())
    }
}

impl ScheduleWork for PipeWriter {
    fn schedule_message_pump_work(&self, delay_ms: i64) {
        // Called on any thread: only the pipe is touched here, which wakes the
        // loop thread if it is sleeping in poll.
        if let Err(e) = self.write_delay(delay_ms) {
            error!("Could not write to the message loop wakeup pipe: {e}");
        }
    }
}
