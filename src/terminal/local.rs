//! Process terminal (stdin/stdout)
//!
//! Raw mode via termios, size via TIOCGWINSZ, resizes via SIGWINCH.
//! Termination signals restore the terminal before the process exits.

use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nix::libc::c_int;
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg, Termios};
use tokio::io::{Stdin, Stdout};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::error::TerminalError;
use super::multiplexer::{LocalTerminal, TerminalIo};
use super::protocol::TerminalGeometry;

nix::ioctl_read_bad!(tiocgwinsz, nix::libc::TIOCGWINSZ, nix::libc::winsize);

/// Current size of the terminal on stdout, or 80x24 when it cannot be read
/// (not a tty, or the kernel reports zero cells).
pub fn window_size() -> TerminalGeometry {
    let mut size = nix::libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes exactly one winsize into `size`
    match unsafe { tiocgwinsz(io::stdout().as_raw_fd(), &mut size) } {
        Ok(_) if size.ws_col > 0 && size.ws_row > 0 => {
            TerminalGeometry::new(size.ws_col, size.ws_row)
        }
        _ => TerminalGeometry::default(),
    }
}

/// Settings in force before raw mode, while raw mode is active.
static SAVED_TERMIOS: Mutex<Option<Termios>> = Mutex::new(None);

fn saved_termios() -> MutexGuard<'static, Option<Termios>> {
    SAVED_TERMIOS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restore the settings saved by [`RawModeGuard::enter`], if any.
///
/// Safe to call from any exit path; a second call is a no-op.
pub fn restore_terminal() {
    let Some(original) = saved_termios().take() else {
        return;
    };
    match tcsetattr(io::stdin().as_fd(), SetArg::TCSAFLUSH, &original) {
        Ok(()) => debug!("Restored terminal settings"),
        Err(e) => warn!("Failed to restore terminal settings: {}", e),
    }
}

/// True while some [`RawModeGuard`] holds the terminal in raw mode.
pub fn raw_mode_active() -> bool {
    saved_termios().is_some()
}

/// Restores the saved termios on drop.
pub struct RawModeGuard {
    _saved: (),
}

impl RawModeGuard {
    pub fn enter() -> Result<Self, TerminalError> {
        let stdin = io::stdin();
        let original = tcgetattr(stdin.as_fd()).map_err(io::Error::from)?;

        let mut raw = original.clone();
        cfmakeraw(&mut raw);
        *saved_termios() = Some(original);
        if let Err(e) = tcsetattr(stdin.as_fd(), SetArg::TCSAFLUSH, &raw) {
            saved_termios().take();
            return Err(io::Error::from(e).into());
        }
        debug!("Entered raw terminal mode");

        Ok(Self { _saved: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Shell-style exit status for a process ended by `signo`.
fn exit_status(signo: c_int) -> i32 {
    128 + signo
}

/// Restore the terminal and exit on a termination signal.
///
/// Registering replaces the default disposition, so the process must still
/// exit once the terminal is back in cooked mode.
fn watch_termination() -> Result<(), TerminalError> {
    let mut term = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::spawn(async move {
        let signo = tokio::select! {
            _ = term.recv() => nix::libc::SIGTERM,
            _ = hangup.recv() => nix::libc::SIGHUP,
            _ = quit.recv() => nix::libc::SIGQUIT,
        };
        warn!("Received signal {}, restoring terminal", signo);
        restore_terminal();
        std::process::exit(exit_status(signo));
    });
    Ok(())
}

/// The controlling terminal of this process.
pub struct StdTerminal {
    resize: watch::Receiver<TerminalGeometry>,
}

impl StdTerminal {
    /// Must be called inside a tokio runtime: installs the SIGWINCH watcher
    /// and the termination handlers.
    pub fn new() -> Result<Self, TerminalError> {
        watch_termination()?;

        let mut winch = signal(SignalKind::window_change())?;
        let (tx, resize) = watch::channel(window_size());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = winch.recv() => {
                        if received.is_none() {
                            break;
                        }
                        if tx.send(window_size()).is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            debug!("SIGWINCH watcher stopped");
        });

        Ok(Self { resize })
    }
}

impl LocalTerminal for StdTerminal {
    type Input = Stdin;
    type Output = Stdout;
    type RawMode = RawModeGuard;

    fn enter_raw_mode(&mut self) -> Result<RawModeGuard, TerminalError> {
        RawModeGuard::enter()
    }

    fn size(&self) -> Result<TerminalGeometry, TerminalError> {
        Ok(window_size())
    }

    fn into_io(self) -> TerminalIo<Stdin, Stdout> {
        TerminalIo {
            input: tokio::io::stdin(),
            output: tokio::io::stdout(),
            resize: self.resize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_is_never_zero() {
        let size = window_size();
        assert!(size.cols > 0);
        assert!(size.rows > 0);
    }

    #[tokio::test]
    async fn test_std_terminal_starts_with_current_size() {
        let terminal = StdTerminal::new().unwrap();
        assert_eq!(*terminal.resize.borrow(), window_size());
        assert_eq!(terminal.size().unwrap(), window_size());
    }

    #[test]
    fn test_exit_status_follows_shell_convention() {
        assert_eq!(exit_status(nix::libc::SIGTERM), 143);
        assert_eq!(exit_status(nix::libc::SIGHUP), 129);
        assert_eq!(exit_status(nix::libc::SIGQUIT), 131);
    }

    #[test]
    fn test_restore_terminal_clears_saved_settings() {
        // Without a tty on stdin enter() fails and nothing is saved
        if let Ok(guard) = RawModeGuard::enter() {
            assert!(raw_mode_active());
            restore_terminal();
            assert!(!raw_mode_active());
            drop(guard);
        }
        assert!(!raw_mode_active());
        restore_terminal();
        assert!(!raw_mode_active());
    }
}
