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

//! A shared/exclusive lock whose acquisition gives up after a timeout.
//!
//! Each user's store is guarded by one of these. Sessions take the shared side
//! for read-only commands and the exclusive side for anything that mutates the
//! store. Once a writer is waiting, new readers queue behind it so that a
//! steady stream of readers cannot starve it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::support::error::Error;

#[derive(Debug, Default)]
struct State {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

#[derive(Debug, Default)]
pub struct ReadWriteLock {
    state: Mutex<State>,
    cond: Condvar,
}

/// Releases the shared side of a `ReadWriteLock` when dropped.
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a ReadWriteLock,
}

/// Releases the exclusive side of a `ReadWriteLock` when dropped.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a ReadWriteLock,
}

impl ReadWriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the shared side, waiting at most `timeout`.
    pub fn read(&self, timeout: Duration) -> Result<ReadGuard<'_>, Error> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.writer || state.waiting_writers > 0 {
            state = match self.wait_until(state, deadline) {
                Some(state) => state,
                None => {
                    return Err(Error::ReadLockTimeout(timeout.as_secs_f64()))
                }
            };
        }

        state.readers += 1;
        Ok(ReadGuard { lock: self })
    }

    /// Acquire the exclusive side, waiting at most `timeout`.
    pub fn write(&self, timeout: Duration) -> Result<WriteGuard<'_>, Error> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            state = match self.wait_until(state, deadline) {
                Some(state) => state,
                None => {
                    let mut state = self.state();
                    state.waiting_writers -= 1;
                    drop(state);
                    // Readers queued behind us may proceed now
                    self.cond.notify_all();
                    return Err(Error::WriteLockTimeout(timeout.as_secs_f64()));
                }
            };
        }

        state.waiting_writers -= 1;
        state.writer = true;
        Ok(WriteGuard { lock: self })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait on the condition variable until notified or `deadline` passes.
    ///
    /// Returns `None` (having released the mutex) if the deadline has passed.
    fn wait_until<'a>(
        &self,
        state: MutexGuard<'a, State>,
        deadline: Instant,
    ) -> Option<MutexGuard<'a, State>> {
        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        let (state, _) = self
            .cond
            .wait_timeout(state, deadline - now)
            .unwrap_or_else(PoisonError::into_inner);
        Some(state)
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state();
        state.readers -= 1;
        if 0 == state.readers {
            drop(state);
            self.lock.cond.notify_all();
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.state().writer = false;
        self.lock.cond.notify_all();
    }
}
