//-
// Copyright (c) 2026, The Postbox Developers
//
// This file is part of Postbox.
//
// Postbox is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Postbox is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Postbox. If not, see <http://www.gnu.org/licenses/>.

//! Bounded waiting for the next command.

use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use crate::support::system_config::{seconds, ConnectionConfig};

/// The connection limits in effect, shared by every session.
///
/// Sessions read the values on every poll iteration, so changes apply to
/// sessions that are already waiting.
#[derive(Clone, Debug)]
pub struct ConnectionLimits {
    inner: Arc<Mutex<Limits>>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Limits {
    read_polling_interval: Duration,
    command_wait_timeout: Duration,
}

impl ConnectionLimits {
    pub fn new(config: &ConnectionConfig) -> Self {
        ConnectionLimits {
            inner: Arc::new(Mutex::new(Limits {
                read_polling_interval: seconds(
                    config.read_polling_interval_seconds,
                ),
                command_wait_timeout: seconds(
                    config.command_wait_timeout_seconds,
                ),
            })),
        }
    }

    pub fn read_polling_interval(&self) -> Duration {
        self.get().read_polling_interval
    }

    pub fn command_wait_timeout(&self) -> Duration {
        self.get().command_wait_timeout
    }

    pub fn set_read_polling_interval(&self, interval: Duration) {
        self.lock().read_polling_interval = interval;
    }

    pub fn set_command_wait_timeout(&self, timeout: Duration) {
        self.lock().command_wait_timeout = timeout;
    }

    fn get(&self) -> Limits {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Limits> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A buffered input which can report whether reading would block.
pub trait CommandInput: BufRead + Send {
    /// Wait up to `timeout` for input to become available.
    ///
    /// Returns `true` if a read would not block, which includes end of
    /// stream.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;
}

impl<T: Read + AsRawFd + Send> CommandInput for BufReader<T> {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.buffer().is_empty() {
            return Ok(true);
        }

        poll_readable(self.get_ref().as_raw_fd(), timeout)
    }
}

fn poll_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, millis) {
        Ok(n) => Ok(n > 0),
        Err(nix::Error::Sys(Errno::EINTR)) => Ok(false),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}

pub struct ConnectionTimer {
    limits: ConnectionLimits,
}

impl ConnectionTimer {
    pub fn new(limits: ConnectionLimits) -> Self {
        ConnectionTimer { limits }
    }

    /// Wait for `input` to have a command ready.
    ///
    /// Returns `false` if the client stayed silent for the whole command
    /// wait timeout.
    pub fn command_wait(
        &self,
        input: &mut impl CommandInput,
    ) -> io::Result<bool> {
        if self.limits.command_wait_timeout() == Duration::from_secs(0) {
            return input.wait_readable(Duration::from_secs(0));
        }

        let mut waited = Duration::from_secs(0);
        loop {
            // Re-read both values every iteration so that changes take
            // effect for sessions already waiting
            let timeout = self.limits.command_wait_timeout();
            if waited >= timeout {
                return Ok(false);
            }

            let interval = self
                .limits
                .read_polling_interval()
                .max(Duration::from_millis(1))
                .min(timeout - waited);
            if input.wait_readable(interval)? {
                return Ok(true);
            }

            waited += interval;
        }
    }
}
