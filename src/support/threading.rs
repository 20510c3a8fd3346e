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

//! Utilities for working with threads.
//!
//! The implementations here are geared more to simplicity than to raw
//! performance. Sessions are driven by one thread each; the only other threads
//! are the IDLE listener and the occasional detached release.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use log::warn;

/// A detached task, as handed to the thread spawner.
type Job = Box<dyn FnOnce() + Send>;

/// Run `task` on a new thread, waiting at most `timeout` for it to finish.
///
/// Returns the task's result if it completed within the timeout. Otherwise,
/// returns `None` and leaves the task running on its own; its eventual result
/// is discarded.
///
/// A zero timeout still gives the task the chance to finish if it can do so
/// without blocking the caller at all. If no thread can be spawned, the task
/// runs to completion on the calling thread.
pub fn run_detachable<T: Send + 'static>(
    name: &str,
    timeout: Duration,
    task: impl FnOnce() -> T + Send + 'static,
) -> Option<T> {
    run_detachable_with(name, timeout, task, |job| {
        thread::Builder::new()
            .name(name.to_owned())
            .spawn(job)
            .map(|_| ())
    })
}

fn run_detachable_with<T: Send + 'static>(
    name: &str,
    timeout: Duration,
    task: impl FnOnce() -> T + Send + 'static,
    spawn: impl FnOnce(Job) -> io::Result<()>,
) -> Option<T> {
    // The task stays in the slot until the job takes it, so that a failed
    // spawn can still run it
    let slot = Arc::new(Mutex::new(Some(task)));
    let job_slot = Arc::clone(&slot);
    let (send, recv) = channel::bounded(1);
    let spawned = spawn(Box::new(move || {
        if let Some(task) = take(&job_slot) {
            // The receiver may have given up already
            let _ = send.send(task());
        }
    }));

    if let Err(e) = spawned {
        warn!("Failed to spawn thread '{}', running inline: {}", name, e);
        return take(&slot).map(|task| task());
    }

    match recv.recv_timeout(timeout) {
        Ok(result) => Some(result),
        Err(_) => None,
    }
}

fn take<F>(slot: &Mutex<Option<F>>) -> Option<F> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}
