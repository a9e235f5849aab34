use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use termios::{tcsetattr, Termios, ICANON, TCSANOW};

/// Puts stdin into noncanonical mode for as long as the guard lives, so
/// `,` sees characters as they are typed instead of waiting for a full
/// line. Dropping the guard restores whatever state the terminal was in
/// before, on any exit path that unwinds or returns.
pub struct NoncanonicalMode {
    fd: RawFd,
    previous: Termios,
}

impl NoncanonicalMode {
    /// Fails when stdin has no terminal attached (e.g. piped input), in
    /// which case there is no mode to switch in the first place.
    pub fn new() -> io::Result<NoncanonicalMode> {
        let fd = io::stdin().as_raw_fd();
        let previous = Termios::from_fd(fd)?;

        let mut raw = previous;
        raw.c_lflag &= !ICANON;
        tcsetattr(fd, TCSANOW, &raw)?;

        Ok(NoncanonicalMode { fd, previous })
    }
}

impl Drop for NoncanonicalMode {
    fn drop(&mut self) {
        // nothing sensible left to do if restoring fails
        let _ = tcsetattr(self.fd, TCSANOW, &self.previous);
    }
}
