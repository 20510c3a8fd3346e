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

//! Fan-out of untagged response lines between sessions open on the same
//! mailbox.
//!
//! Every selected folder subscribes to its mailbox. A session that changes
//! the mailbox publishes the resulting untagged lines; each other subscriber
//! receives them in its own queue, from which they are flushed before the
//! subscriber's next tagged response or forwarded immediately while it idles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use super::MailboxId;

/// An item in a subscriber's queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A complete untagged response line, including the CRLF.
    Line(Vec<u8>),
    /// Tells whoever is draining the queue to stop.
    Wakeup,
}

#[derive(Default)]
pub struct Multicast {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<MailboxId, Vec<(u64, Sender<Notice>)>>,
}

/// One folder's subscription to its mailbox. Unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    mailbox: MailboxId,
    hub: Arc<Multicast>,
    sender: Sender<Notice>,
    receiver: Receiver<Notice>,
}

/// Interrupts a drain of a `Subscription` by queueing a `Notice::Wakeup`.
///
/// Only the first call to `wake` has an effect.
#[derive(Clone)]
pub struct Waker {
    sender: Sender<Notice>,
    woken: Arc<AtomicBool>,
}

impl Multicast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(self: &Arc<Self>, mailbox: MailboxId) -> Subscription {
        let (sender, receiver) = channel::unbounded();
        let mut inner = self.inner();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(mailbox)
            .or_insert_with(Vec::new)
            .push((id, sender.clone()));

        Subscription {
            id,
            mailbox,
            hub: Arc::clone(self),
            sender,
            receiver,
        }
    }

    /// Queue `line` for every subscriber to `mailbox` except `exclude`.
    pub fn publish(
        &self,
        mailbox: MailboxId,
        line: &[u8],
        exclude: Option<u64>,
    ) {
        let inner = self.inner();
        if let Some(subscribers) = inner.subscribers.get(&mailbox) {
            for &(id, ref sender) in subscribers {
                if Some(id) != exclude {
                    // The receiver is owned by the subscription, which
                    // removes itself before dropping it
                    let _ = sender.send(Notice::Line(line.to_vec()));
                }
            }
        }
    }

    pub fn subscriber_count(&self, mailbox: MailboxId) -> usize {
        self.inner()
            .subscribers
            .get(&mailbox)
            .map_or(0, |s| s.len())
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove and return every line currently queued.
    ///
    /// Stale wake-up markers are discarded.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(Notice::Line(line)) => lines.push(line),
                Ok(Notice::Wakeup) => (),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    break
                }
            }
        }
        lines
    }

    /// A receiver sharing this subscription's queue, for use on another
    /// thread.
    pub fn receiver(&self) -> Receiver<Notice> {
        self.receiver.clone()
    }

    pub fn waker(&self) -> Waker {
        Waker {
            sender: self.sender.clone(),
            woken: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.hub.inner();
        if let Some(subscribers) = inner.subscribers.get_mut(&self.mailbox) {
            subscribers.retain(|&(id, _)| id != self.id);
            if subscribers.is_empty() {
                inner.subscribers.remove(&self.mailbox);
            }
        }
    }
}

impl Waker {
    pub fn wake(&self) {
        if !self.woken.swap(true, SeqCst) {
            let _ = self.sender.send(Notice::Wakeup);
        }
    }
}
