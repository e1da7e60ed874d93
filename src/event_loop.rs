//! Event loop + PTY host: the single-threaded, cooperative multiplexer
//! between stdin, the PTY master, and the framebuffer renderer.

use crate::framebuffer::Framebuffer;
use crate::renderer::{self, CellMetrics, FontTable};
use crate::terminal::cell::DEFAULT_BG;
use crate::terminal::grid::{clamp_cols, clamp_rows};
use crate::terminal::pty::PtyHandle;
use crate::terminal::TerminalModel;
use anyhow::{Context, Result};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::termios::{self, SetArg, Termios};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};

/// `Ctrl+Q`, the runtime quit hotkey.
const QUIT_BYTE: u8 = 0x11;

/// ~60 frames per second; also the frame-rate pacing bound and the upper
/// bound on shutdown latency.
const POLL_TIMEOUT_MS: u16 = 17;

static SIGCHLD_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigchld(_signum: i32) {
    SIGCHLD_RECEIVED.store(true, Ordering::Relaxed);
}

pub struct Startup {
    pub fb_path: std::path::PathBuf,
    pub primary_font: std::path::PathBuf,
    pub fallback_fonts: Vec<std::path::PathBuf>,
    pub font_size_px: f64,
    pub palette: crate::palette::Palette,
}

/// Runs until `Ctrl+Q`, child exit, or PTY EOF. Fatal setup errors (fb
/// open/ioctl/mmap, primary font load, `forkpty`) propagate to `main`.
pub fn run(startup: Startup) -> Result<()> {
    let mut fb = Framebuffer::open(&startup.fb_path)?;
    let fonts = FontTable::load(&startup.primary_font, &startup.fallback_fonts)?;
    let metrics = renderer::metrics(&fonts, startup.font_size_px as f32);

    let cols = clamp_cols(fb.width() / metrics.cell_w.max(1) as usize);
    let rows = clamp_rows(fb.height() / metrics.cell_h.max(1) as usize);
    log::info!("grid {}x{} (cell {}x{}px)", cols, rows, metrics.cell_w, metrics.cell_h);

    let mut term = TerminalModel::new(cols, rows, startup.palette);
    let pty = PtyHandle::spawn(cols as u16, rows as u16).context("spawning PTY/shell")?;

    let stdin_fd = std::io::stdin();
    let orig_termios = enter_raw_mode(stdin_fd.as_fd())?;

    // SAFETY: the handler only stores to an atomic; no allocation or
    // non-async-signal-safe calls.
    unsafe { signal(Signal::SIGCHLD, SigHandler::Handler(handle_sigchld)) }
        .context("installing SIGCHLD handler")?;

    let result = main_loop(&mut fb, &fonts, &metrics, &mut term, &pty, stdin_fd.as_fd());

    teardown(stdin_fd.as_fd(), &orig_termios, &mut fb);
    result
}

fn main_loop(
    fb: &mut Framebuffer,
    fonts: &FontTable,
    metrics: &CellMetrics,
    term: &mut TerminalModel,
    pty: &PtyHandle,
    stdin: BorrowedFd,
) -> Result<()> {
    let pty_fd = unsafe { BorrowedFd::borrow_raw(pty.master_fd()) };
    let timeout = PollTimeout::try_from(POLL_TIMEOUT_MS).unwrap_or(PollTimeout::MAX);
    let mut running = true;

    while running {
        let mut fds = [
            PollFd::new(stdin, PollFlags::POLLIN),
            PollFd::new(pty_fd, PollFlags::POLLIN),
        ];
        match poll(&mut fds, timeout) {
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => {}
            Err(e) => return Err(e).context("poll"),
        }

        if let Some(events) = fds[0].revents() {
            if events.contains(PollFlags::POLLIN) {
                if let Some(quit) = forward_stdin(pty) {
                    if quit {
                        running = false;
                    }
                }
            }
        }

        let mut dirty = false;
        match pty.read_nonblocking() {
            Ok(Some(data)) if !data.is_empty() => {
                term.feed(&data);
                dirty = true;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                log::info!("PTY master EOF, shutting down");
                running = false;
            }
            Err(e) => {
                log::warn!("PTY read error: {e}");
                running = false;
            }
        }

        let replies = term.take_replies();
        if !replies.is_empty() {
            pty.write_best_effort(&replies);
        }

        if SIGCHLD_RECEIVED.swap(false, Ordering::Relaxed) {
            log::info!("child shell exited");
            running = false;
        }

        if dirty {
            render_frame(fb, fonts, metrics, term);
        }
    }

    Ok(())
}

/// Reads whatever is waiting on stdin and forwards it verbatim to the PTY
/// master, except `Ctrl+Q` which is never forwarded and instead signals
/// shutdown. Returns `Some(true)` if a quit byte was seen, `Some(false)`
/// if bytes were forwarded with no quit, `None` if nothing was read.
fn forward_stdin(pty: &PtyHandle) -> Option<bool> {
    let mut buf = [0u8; 4096];
    loop {
        match nix::unistd::read(std::io::stdin().as_fd(), &mut buf) {
            Ok(0) => return None,
            Ok(n) => {
                if let Some(pos) = buf[..n].iter().position(|&b| b == QUIT_BYTE) {
                    if pos > 0 {
                        pty.write_best_effort(&buf[..pos]);
                    }
                    return Some(true);
                }
                pty.write_best_effort(&buf[..n]);
                return Some(false);
            }
            Err(nix::errno::Errno::EAGAIN) => return None,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => return None,
        }
    }
}

fn render_frame(fb: &mut Framebuffer, fonts: &FontTable, metrics: &CellMetrics, term: &TerminalModel) {
    let grid = term.grid();
    for y in 0..grid.rows {
        for x in 0..grid.cols {
            let cell = grid.cell(x, y);
            let px = (x * metrics.cell_w as usize) as i32;
            let py = (y * metrics.cell_h as usize) as i32;
            let (fg, bg) = if grid.cursor_visible && x == grid.cursor_x && y == grid.cursor_y {
                (cell.bg, cell.fg) // reverse-video cursor block
            } else {
                (cell.fg, cell.bg)
            };
            renderer::render_cell(fb, fonts, metrics, px, py, cell.codepoint, fg, bg);
        }
    }
}

fn enter_raw_mode(stdin: BorrowedFd) -> Result<Termios> {
    let original = termios::tcgetattr(stdin).context("tcgetattr(stdin)")?;
    let mut raw = original.clone();
    termios::cfmakeraw(&mut raw);
    termios::tcsetattr(stdin, SetArg::TCSANOW, &raw).context("tcsetattr(stdin, raw)")?;

    let flags = nix::fcntl::fcntl(stdin, nix::fcntl::FcntlArg::F_GETFL).context("fcntl F_GETFL(stdin)")?;
    let flags = nix::fcntl::OFlag::from_bits_truncate(flags) | nix::fcntl::OFlag::O_NONBLOCK;
    nix::fcntl::fcntl(stdin, nix::fcntl::FcntlArg::F_SETFL(flags)).context("fcntl F_SETFL(stdin)")?;

    Ok(original)
}

/// Restore stdin attributes, re-show the outer console cursor, clear the
/// framebuffer, and free resources. Restoring the outer console's own
/// cursor visibility is the console's job, not this program's; this just
/// writes the conventional show-cursor sequence and otherwise leaves it
/// alone.
fn teardown(stdin: BorrowedFd, original: &Termios, fb: &mut Framebuffer) {
    if let Err(e) = termios::tcsetattr(stdin, SetArg::TCSANOW, original) {
        log::warn!("failed to restore terminal attributes: {e}");
    }
    print!("\x1b[?25h");
    use std::io::Write;
    let _ = std::io::stdout().flush();
    fb.clear(DEFAULT_BG);
}
