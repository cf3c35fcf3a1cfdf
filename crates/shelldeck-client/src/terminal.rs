//! Stdio-backed terminal surface.
//!
//! Drives the controlling TTY as the rendering surface for the CLI
//! driver: raw-mode setup/restore, window size detection, and a
//! background stdin reader that emits keystroke units.

use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use shelldeck_core::protocol::Geometry;
use shelldeck_core::surface::TerminalSurface;
use shelldeck_core::{Error, Result};

/// Guard that keeps the TTY in raw mode and restores it on drop.
struct RawModeGuard {
    fd: i32,
    original: libc::termios,
}

impl RawModeGuard {
    /// Switch stdin to raw mode.
    fn enter() -> Result<Self> {
        let fd = io::stdin().as_raw_fd();

        let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
        if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let original = unsafe { termios.assume_init() };

        let mut raw = original;
        // Input: no break signal, CR->NL mapping, parity check, bit
        // stripping, or flow control
        raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        // Output: no post-processing
        raw.c_oflag &= !libc::OPOST;
        // 8-bit characters
        raw.c_cflag |= libc::CS8;
        // Local: no echo, canonical mode, signals, or extended input
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
        // Reads return after one byte, no timeout
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;

        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &raw) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        debug!("entered raw terminal mode");
        Ok(Self { fd, original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.original) } != 0 {
            warn!("failed to restore terminal settings");
        } else {
            debug!("restored terminal settings");
        }
    }
}

/// Probe the TTY for its current size, falling back to the default
/// geometry when the ioctl fails (e.g. not a terminal).
fn probe_geometry() -> Geometry {
    let fd = io::stdout().as_raw_fd();
    let mut winsize = std::mem::MaybeUninit::<libc::winsize>::uninit();
    if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, winsize.as_mut_ptr()) } != 0 {
        return Geometry::default();
    }
    let winsize = unsafe { winsize.assume_init() };
    if winsize.ws_col == 0 || winsize.ws_row == 0 {
        return Geometry::default();
    }
    Geometry::new(winsize.ws_col, winsize.ws_row)
}

/// Slot holding the active input subscriber; replaced on re-subscribe.
type InputSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

fn lock_slot(slot: &InputSlot) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Split off the longest complete UTF-8 prefix of `carry` as one input
/// unit, leaving a trailing partial sequence (at most three bytes) for the
/// next read. Invalid bytes are replaced rather than dropped so keystrokes
/// are never silently lost.
fn take_complete_utf8(carry: &mut Vec<u8>) -> Option<String> {
    if carry.is_empty() {
        return None;
    }
    match std::str::from_utf8(carry) {
        Ok(s) => {
            let unit = s.to_string();
            carry.clear();
            Some(unit)
        }
        Err(err) => {
            let valid = err.valid_up_to();
            if err.error_len().is_some() {
                // Hard invalid byte: flush everything, lossily.
                let unit = String::from_utf8_lossy(carry).into_owned();
                carry.clear();
                Some(unit)
            } else if valid == 0 {
                // Only a partial sequence so far; wait for more bytes.
                None
            } else {
                let unit = String::from_utf8_lossy(&carry[..valid]).into_owned();
                carry.drain(..valid);
                Some(unit)
            }
        }
    }
}

/// Background stdin reader: one read per keystroke burst, forwarded as one
/// input unit to the active subscriber.
fn spawn_stdin_reader(slot: InputSlot) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut stdin = stdin.lock();
        let mut buf = [0u8; 4096];
        let mut carry: Vec<u8> = Vec::new();

        loop {
            match stdin.read(&mut buf) {
                Ok(0) => {
                    trace!("stdin EOF");
                    break;
                }
                Ok(n) => {
                    carry.extend_from_slice(&buf[..n]);
                    let Some(unit) = take_complete_utf8(&mut carry) else {
                        continue;
                    };
                    let delivered = match lock_slot(&slot).as_ref() {
                        Some(tx) => tx.send(unit).is_ok(),
                        None => false,
                    };
                    if !delivered {
                        trace!("no input subscriber, keystrokes dropped");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "stdin read error");
                    break;
                }
            }
        }
        trace!("stdin reader thread exiting");
    });
}

/// Terminal surface backed by the process's controlling TTY.
///
/// Mounting enters raw mode; disposing restores the original settings.
/// The display region is the TTY itself, so mount only fails when stdin
/// is not a terminal.
pub struct StdioSurface {
    raw: Option<RawModeGuard>,
    input: InputSlot,
    reader_started: bool,
}

impl StdioSurface {
    /// Create an unmounted stdio surface.
    pub fn new() -> Self {
        Self {
            raw: None,
            input: Arc::new(Mutex::new(None)),
            reader_started: false,
        }
    }
}

impl Default for StdioSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSurface for StdioSurface {
    fn mount(&mut self) -> Result<()> {
        // Replace any previous mount wholesale.
        self.raw = None;
        self.raw = Some(RawModeGuard::enter()?);
        if !self.reader_started {
            spawn_stdin_reader(Arc::clone(&self.input));
            self.reader_started = true;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) {
        let mut stdout = io::stdout().lock();
        if stdout.write_all(data).and_then(|()| stdout.flush()).is_err() {
            // Rendering failures are invisible to the caller.
            trace!("stdout write failed");
        }
    }

    fn subscribe_input(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock_slot(&self.input) = Some(tx);
        rx
    }

    fn fit(&mut self) -> Geometry {
        probe_geometry()
    }

    fn dispose(&mut self) {
        self.raw = None;
        *lock_slot(&self.input) = None;
    }
}
