//! PTY (pseudo-terminal) management
//!
//! Creates PTY pair with forkpty and spawns the shell (or the `-e`
//! command) in the child process. Provides master side read/write and
//! terminal size setting.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

/// Writes stall at most this long waiting for the child to drain input
const WRITE_STALL_MS: i32 = 1000;

/// Byte channel to the child process
pub trait ProcessChannel {
    /// Write all bytes, in order
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Report a new terminal size
    fn resize(&mut self, cols: u16, rows: u16, xpixel: u16, ypixel: u16) -> Result<()>;

    /// Ask the child to terminate (SIGHUP)
    fn hangup(&mut self) {}
}

/// What to run on the slave side
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// TERM value for the child
    pub term: String,
    /// Command and arguments; empty means a login shell
    pub command: Vec<String>,
    /// Shell override (config), else $SHELL, else /bin/sh
    pub shell: Option<String>,
    /// Exported as WINDOWID
    pub window_id: Option<u32>,
}

/// PTY management structure
pub struct Pty {
    /// Master side file descriptor
    master: OwnedFd,
    /// Child process PID
    child_pid: Pid,
}

impl Pty {
    /// Create PTY and spawn the child
    ///
    /// Specify initial terminal size with `cols`, `rows`,
    /// and pixel size with `xpixel`, `ypixel`.
    pub fn spawn(
        cols: u16,
        rows: u16,
        xpixel: u16,
        ypixel: u16,
        options: &SpawnOptions,
    ) -> Result<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: xpixel,
            ws_ypixel: ypixel,
        };

        // Everything the child needs is prepared before forking
        let (program, argv) = build_argv(options)?;
        debug!("Spawning {:?}", argv);

        let ForkptyResult {
            master,
            fork_result,
        } = unsafe { forkpty(Some(&winsize), None)? };

        match fork_result {
            ForkResult::Child => {
                std::env::set_var("TERM", &options.term);
                std::env::set_var("COLORTERM", "truecolor");
                if let Some(id) = options.window_id {
                    std::env::set_var("WINDOWID", id.to_string());
                }

                let err = match nix::unistd::execvp(&program, &argv) {
                    Ok(infallible) => match infallible {},
                    Err(e) => e,
                };
                eprintln!("glint: exec {:?} failed: {}", program, err);
                unsafe { libc::_exit(127) }
            }
            ForkResult::Parent { child } => {
                info!(
                    "PTY spawned: pid={}, master_fd={}",
                    child,
                    master.as_raw_fd()
                );

                // Set master fd to non-blocking
                let flags = nix::fcntl::fcntl(master.as_raw_fd(), nix::fcntl::FcntlArg::F_GETFL)?;
                let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
                flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
                nix::fcntl::fcntl(master.as_raw_fd(), nix::fcntl::FcntlArg::F_SETFL(flags))?;

                Ok(Self {
                    master,
                    child_pid: child,
                })
            }
        }
    }

    /// Non-blocking read from PTY
    ///
    /// Returns number of bytes read if data available.
    /// Returns Ok(0) if no data. A hung-up child surfaces as EIO.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match nix::unistd::read(self.master.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(0),
            Err(e) => Err(anyhow!("PTY read error: {}", e)),
        }
    }

    /// Master fd, for polling
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }

    /// Block until the master accepts more input
    fn wait_writable(&self) -> Result<()> {
        let mut fds = [PollFd::new(&self.master, PollFlags::POLLOUT)];
        match poll(&mut fds, WRITE_STALL_MS) {
            Ok(0) => Err(anyhow!("PTY write stalled for {}ms", WRITE_STALL_MS)),
            Ok(_) | Err(Errno::EINTR) => Ok(()),
            Err(e) => Err(anyhow!("PTY poll error: {}", e)),
        }
    }

    /// Check if child process is alive
    pub fn is_alive(&self) -> bool {
        match waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(status) => {
                info!("Child exited: {:?}", status);
                false
            }
            Err(_) => false,
        }
    }
}

impl ProcessChannel for Pty {
    fn send(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match nix::unistd::write(self.master.as_raw_fd(), data) {
                Ok(n) => data = &data[n..],
                Err(Errno::EAGAIN) => self.wait_writable()?,
                Err(Errno::EINTR) => {}
                Err(e) => return Err(anyhow!("PTY write error: {}", e)),
            }
        }
        Ok(())
    }

    /// Change terminal size (TIOCSWINSZ) and notify the child
    fn resize(&mut self, cols: u16, rows: u16, xpixel: u16, ypixel: u16) -> Result<()> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: xpixel,
            ws_ypixel: ypixel,
        };

        unsafe {
            let ret = libc::ioctl(
                self.master.as_raw_fd(),
                libc::TIOCSWINSZ,
                &winsize as *const Winsize,
            );
            if ret < 0 {
                return Err(anyhow!("TIOCSWINSZ failed: {}", io::Error::last_os_error()));
            }
        }

        // Send SIGWINCH to child process
        let _ = kill(self.child_pid, Signal::SIGWINCH);

        Ok(())
    }

    fn hangup(&mut self) {
        if let Err(e) = kill(self.child_pid, Signal::SIGHUP) {
            warn!("SIGHUP to pid {} failed: {}", self.child_pid, e);
        }
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        // Send SIGHUP and wait for child process to exit
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let _ = waitpid(self.child_pid, None);
    }
}

/// Program and argv for the child: the command, or a login shell
/// (argv[0] prefixed with '-')
fn build_argv(options: &SpawnOptions) -> Result<(CString, Vec<CString>)> {
    if let Some((program, _)) = options.command.split_first() {
        let program = CString::new(program.as_str()).context("NUL byte in command")?;
        let argv = options
            .command
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .context("NUL byte in command argument")?;
        return Ok((program, argv));
    }

    let shell = options
        .shell
        .clone()
        .or_else(|| std::env::var("SHELL").ok())
        .unwrap_or_else(|| "/bin/sh".to_string());
    let shell_name = std::path::Path::new(&shell)
        .file_name()
        .map(|n| format!("-{}", n.to_string_lossy()))
        .unwrap_or_else(|| "-sh".to_string());
    let program = CString::new(shell).context("NUL byte in shell path")?;
    let argv0 = CString::new(shell_name).context("NUL byte in argv0")?;
    Ok((program, vec![argv0]))
}

/// In-memory channel recording everything sent to the child
#[cfg(test)]
impl ProcessChannel for Vec<u8> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, _cols: u16, _rows: u16, _xpixel: u16, _ypixel: u16) -> Result<()> {
        Ok(())
    }
}
