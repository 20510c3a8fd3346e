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

//! The selected mailbox of a session.
//!
//! A `Folder` caches the message list of its mailbox as of the store change
//! number it last saw. Every command that uses the folder first calls
//! `ensure_current`, which fails if the mailbox has gone and reloads the list
//! if the store changed in the meantime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use chrono::prelude::*;
use log::info;

use crate::mime::Message;
use crate::store::multicast::{Multicast, Subscription};
use crate::store::pool::StoreHolder;
use crate::store::{FlagSet, MailStore, MailboxId};
use crate::support::error::Error;

/// A message as addressed by the client at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub seq: u32,
    pub uid: u32,
}

pub struct Folder {
    mailbox: MailboxId,
    read_only: bool,
    messages: Vec<MessageRef>,
    change_number: u64,
    subscription: Subscription,
}

impl Folder {
    pub fn open(
        holder: &StoreHolder,
        mailbox: MailboxId,
        read_only: bool,
    ) -> Result<Self, Error> {
        let mut this = Folder {
            mailbox,
            read_only,
            messages: Vec::new(),
            change_number: 0,
            subscription: holder.multicast().subscribe(mailbox),
        };
        this.reload(holder.store())?;
        Ok(this)
    }

    pub fn mailbox(&self) -> MailboxId {
        self.mailbox
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn messages(&self) -> &[MessageRef] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn exists(&self, store: &dyn MailStore) -> bool {
        store.mailbox_name(self.mailbox).is_some()
    }

    /// Fail with `DeletedFolder` if the mailbox is gone; otherwise reload
    /// the message list if the store changed since it was last loaded.
    pub fn ensure_current(&mut self, store: &dyn MailStore) -> Result<(), Error> {
        if !self.exists(store) {
            return Err(Error::DeletedFolder);
        }

        if store.change_number() != self.change_number {
            self.reload(store)?;
        }

        Ok(())
    }

    pub fn reload(&mut self, store: &dyn MailStore) -> Result<(), Error> {
        // Read the change number first so that a concurrent change causes
        // another reload next time rather than being missed
        self.change_number = store.change_number();
        let uids = store.message_uids(self.mailbox)?;
        self.messages = uids
            .into_iter()
            .enumerate()
            .map(|(ix, uid)| MessageRef {
                seq: ix as u32 + 1,
                uid,
            })
            .collect();
        Ok(())
    }

    pub fn by_seq(&self, seq: u32) -> Option<MessageRef> {
        if 0 == seq {
            None
        } else {
            self.messages.get(seq as usize - 1).copied()
        }
    }

    pub fn by_uid(&self, uid: u32) -> Option<MessageRef> {
        self.messages
            .binary_search_by_key(&uid, |m| m.uid)
            .ok()
            .map(|ix| self.messages[ix])
    }

    pub fn max_seq(&self) -> u32 {
        self.messages.len() as u32
    }

    pub fn max_uid(&self) -> u32 {
        self.messages.last().map_or(0, |m| m.uid)
    }

    /// Resolve a sequence set (or UID set if `uid`) to the messages it
    /// names, in ascending order.
    ///
    /// Sequence numbers beyond the end of the folder are an error; UIDs that
    /// do not exist are silently skipped.
    pub fn resolve(&self, raw: &str, uid: bool) -> Result<Vec<MessageRef>, Error> {
        let splat = if uid { self.max_uid() } else { self.max_seq() };
        let set = SeqSet::parse(raw, splat).ok_or_else(|| {
            Error::Syntax(format!("invalid sequence set: {}", raw))
        })?;

        if uid {
            Ok(self
                .messages
                .iter()
                .copied()
                .filter(|m| set.contains(m.uid))
                .collect())
        } else {
            if set.max().map_or(false, |max| max > self.max_seq()) {
                return Err(Error::NxMessage);
            }
            Ok(self
                .messages
                .iter()
                .copied()
                .filter(|m| set.contains(m.seq))
                .collect())
        }
    }

    /// Remove and return the untagged lines other sessions have published to
    /// this mailbox.
    pub fn take_pending(&self) -> Vec<Vec<u8>> {
        self.subscription.drain()
    }

    /// Publish `line` to every other folder on this mailbox.
    pub fn publish(&self, hub: &Multicast, line: &[u8]) {
        hub.publish(self.mailbox, line, Some(self.subscription.id()));
    }

    /// Publish `line` on behalf of a session with no folder on `mailbox`.
    pub fn publish_to(hub: &Arc<Multicast>, mailbox: MailboxId, line: &[u8]) {
        hub.publish(mailbox, line, None);
    }

    /// Called when the folder is deselected.
    ///
    /// A read-write folder clears `\Recent` from every message it showed.
    pub fn close(self, store: &dyn MailStore) -> Result<(), Error> {
        if self.read_only || !self.exists(store) {
            return Ok(());
        }

        let mut cleared = 0;
        for m in &self.messages {
            match store.flags(self.mailbox, m.uid) {
                Ok(flags) if flags.contains(FlagSet::RECENT) => {
                    store.set_flag(
                        self.mailbox,
                        m.uid,
                        crate::store::Flag::Recent,
                        false,
                    )?;
                    cleared += 1;
                }
                // Expunged by another session
                Ok(_) | Err(Error::NxMessage) => (),
                Err(e) => return Err(e),
            }
        }

        if cleared > 0 {
            info!("Cleared \\Recent from {} messages", cleared);
        }
        Ok(())
    }
}

/// A parsed sequence set, such as `1:3,7,10:*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeqSet {
    /// Inclusive ranges, each with start <= end.
    parts: Vec<(u32, u32)>,
}

impl SeqSet {
    /// Parse `raw`, with `*` standing for `splat`.
    ///
    /// Range endpoints may be given in either order.
    pub fn parse(raw: &str, splat: u32) -> Option<Self> {
        fn endpoint(r: &str, splat: u32) -> Option<u32> {
            if "*" == r {
                Some(splat)
            } else if r.starts_with('0') || !r.bytes().all(|b| b.is_ascii_digit())
            {
                None
            } else {
                r.parse().ok()
            }
        }

        let mut parts = Vec::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = endpoint(only, splat)?;
                    parts.push((only, only));
                }
                (Some(start), Some(end), None) => {
                    let start = endpoint(start, splat)?;
                    let end = endpoint(end, splat)?;
                    parts.push((start.min(end), end.max(start)));
                }
                _ => return None,
            }
        }

        Some(SeqSet { parts })
    }

    pub fn contains(&self, value: u32) -> bool {
        self.parts
            .iter()
            .any(|&(start, end)| value >= start && value <= end)
    }

    pub fn max(&self) -> Option<u32> {
        self.parts.iter().map(|&(_, end)| end).max()
    }
}

/// Whether `word` should be treated as a sequence set in a SEARCH key list.
pub fn looks_like_seq_set(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_digit() || '*' == c)
}

/// Parsed messages and per-message metadata for one SEARCH or FETCH pass.
///
/// Messages are parsed on first use and kept until `clear`.
pub struct MessageCache<'s> {
    store: &'s dyn MailStore,
    mailbox: MailboxId,
    parsed: RefCell<HashMap<u32, Rc<Message>>>,
}

impl<'s> MessageCache<'s> {
    pub fn new(store: &'s dyn MailStore, mailbox: MailboxId) -> Self {
        MessageCache {
            store,
            mailbox,
            parsed: RefCell::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &'s dyn MailStore {
        self.store
    }

    pub fn mailbox(&self) -> MailboxId {
        self.mailbox
    }

    pub fn flags(&self, uid: u32) -> Result<FlagSet, Error> {
        self.store.flags(self.mailbox, uid)
    }

    pub fn internal_date(&self, uid: u32) -> Result<DateTime<FixedOffset>, Error> {
        self.store.internal_date(self.mailbox, uid)
    }

    pub fn message(&self, uid: u32) -> Result<Rc<Message>, Error> {
        if let Some(message) = self.parsed.borrow().get(&uid) {
            return Ok(Rc::clone(message));
        }

        let data = self.store.message_data(self.mailbox, uid)?;
        let message = Rc::new(Message::parse(data));
        self.parsed.borrow_mut().insert(uid, Rc::clone(&message));
        Ok(message)
    }

    pub fn cached_count(&self) -> usize {
        self.parsed.borrow().len()
    }

    pub fn clear(&self) {
        self.parsed.borrow_mut().clear();
    }
}
