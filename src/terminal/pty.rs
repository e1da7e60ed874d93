//! PTY allocation and the child shell. Owns the master file descriptor;
//! non-blocking reads/writes only — the sole blocking point in the program
//! is the event loop's poll wait.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::pty::{forkpty, Winsize};
use nix::unistd::ForkResult;
use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

pub struct PtyHandle {
    master: OwnedFd,
    pub child_pid: nix::unistd::Pid,
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL).context("fcntl F_GETFL")?;
    let flags = nix::fcntl::OFlag::from_bits_truncate(flags) | nix::fcntl::OFlag::O_NONBLOCK;
    nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFL(flags)).context("fcntl F_SETFL")?;
    Ok(())
}

fn user_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

impl PtyHandle {
    /// Fork a child attached to a new PTY slave sized to `(rows, cols)`;
    /// the child execs the user's shell with `TERM=xterm-256color`. The
    /// slave keeps the kernel-default line discipline (canonical, echo).
    pub fn spawn(cols: u16, rows: u16) -> Result<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: forkpty's child branch below only calls async-signal-safe
        // libc functions before replacing the process image via execv.
        let result = unsafe { forkpty(Some(&winsize), None) }.context("forkpty")?;

        match result.fork_result {
            ForkResult::Parent { child } => {
                let master = result.master;
                set_nonblocking(master.as_raw_fd())?;
                log::info!("spawned shell {:?} as pid {child}", user_shell());
                Ok(Self { master, child_pid: child })
            }
            ForkResult::Child => {
                let shell = user_shell();
                std::env::set_var("TERM", "xterm-256color");
                let path = CString::new(shell.clone()).unwrap_or_else(|_| CString::new("/bin/sh").unwrap());
                let arg0 = CString::new(shell).unwrap_or_else(|_| CString::new("/bin/sh").unwrap());
                let _ = nix::unistd::execv(&path, &[arg0]);
                // execv only returns on failure.
                unsafe { libc::_exit(127) };
            }
        }
    }

    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Drain everything currently available without blocking. Returns the
    /// bytes read, or `None` on EOF (shell exited).
    pub fn read_nonblocking(&self) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match nix::unistd::read(self.master.as_fd(), &mut buf) {
                Ok(0) => return Ok(None), // EOF
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(Errno::EAGAIN) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).context("reading PTY master"),
            }
        }
        Ok(Some(out))
    }

    /// Single best-effort write attempt; not retried on partial write or
    /// `EAGAIN`. A lost write means the shell sees truncated input, which is
    /// acceptable because typing can be repeated.
    pub fn write_best_effort(&self, data: &[u8]) {
        match nix::unistd::write(self.master.as_fd(), data) {
            Ok(_) => {}
            Err(Errno::EAGAIN) => {}
            Err(e) => log::warn!("write to PTY master failed: {e}"),
        }
    }
}
