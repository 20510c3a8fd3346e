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

//! A `MailStore` which keeps everything in memory.
//!
//! `MemoryStore` is a cheap handle; clones refer to the same data, so a
//! `MemoryDirectory` can hand the same store to the pool every time a user
//! logs in.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::prelude::*;
use log::info;

use super::pool::StoreFactory;
use super::{Flag, FlagSet, MailStore, MailboxId};
use crate::support::error::Error;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    aborted: Arc<AtomicBool>,
    syncs: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Inner {
    change_number: u64,
    next_mailbox_id: MailboxId,
    next_uid_validity: u32,
    mailboxes: BTreeMap<MailboxId, Mailbox>,
}

struct Mailbox {
    name: String,
    uid_validity: u32,
    next_uid: u32,
    messages: BTreeMap<u32, StoredMessage>,
}

struct StoredMessage {
    data: Arc<Vec<u8>>,
    internal_date: DateTime<FixedOffset>,
    flags: FlagSet,
}

const INBOX: &str = "INBOX";

impl MemoryStore {
    /// Create a store containing only an empty INBOX.
    pub fn new() -> Self {
        let this = Self::default();
        {
            let mut inner = this.inner();
            inner.next_mailbox_id = 1;
            inner.next_uid_validity = 1;
            inner.add_mailbox(INBOX.to_owned());
        }
        this
    }

    /// Mark the store as having an unfinished transaction, as if a previous
    /// process died in the middle of an update.
    pub fn set_aborted_transaction(&self, aborted: bool) {
        self.aborted.store(aborted, SeqCst);
    }

    /// The number of times `sync` has been called.
    pub fn sync_count(&self) -> usize {
        self.syncs.load(SeqCst)
    }

    /// Insert a message with a specific UID and flags.
    ///
    /// `uid` must be at least the mailbox's next UID.
    pub fn insert_message(
        &self,
        id: MailboxId,
        uid: u32,
        data: &[u8],
        internal_date: DateTime<FixedOffset>,
        flags: FlagSet,
    ) -> Result<(), Error> {
        let mut inner = self.inner();
        let mailbox = inner.mailbox_mut(id)?;
        if uid < mailbox.next_uid {
            return Err(Error::InvalidArgument(format!(
                "UID {} already allocated",
                uid
            )));
        }

        mailbox.next_uid = uid + 1;
        mailbox.messages.insert(
            uid,
            StoredMessage {
                data: Arc::new(data.to_vec()),
                internal_date,
                flags,
            },
        );
        inner.change_number += 1;
        Ok(())
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn add_mailbox(&mut self, name: String) -> MailboxId {
        let id = self.next_mailbox_id;
        self.next_mailbox_id += 1;
        let uid_validity = self.next_uid_validity;
        self.next_uid_validity += 1;
        self.mailboxes.insert(
            id,
            Mailbox {
                name,
                uid_validity,
                next_uid: 1,
                messages: BTreeMap::new(),
            },
        );
        self.change_number += 1;
        id
    }

    fn find(&self, name: &str) -> Option<MailboxId> {
        self.mailboxes
            .iter()
            .find(|&(_, mb)| same_name(&mb.name, name))
            .map(|(&id, _)| id)
    }

    fn mailbox(&self, id: MailboxId) -> Result<&Mailbox, Error> {
        self.mailboxes.get(&id).ok_or(Error::NxMailbox)
    }

    fn mailbox_mut(&mut self, id: MailboxId) -> Result<&mut Mailbox, Error> {
        self.mailboxes.get_mut(&id).ok_or(Error::NxMailbox)
    }

    fn message(&self, id: MailboxId, uid: u32) -> Result<&StoredMessage, Error> {
        self.mailbox(id)?.messages.get(&uid).ok_or(Error::NxMessage)
    }
}

fn same_name(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(INBOX) {
        b.eq_ignore_ascii_case(INBOX)
    } else {
        a == b
    }
}

impl MailStore for MemoryStore {
    fn change_number(&self) -> u64 {
        self.inner().change_number
    }

    fn mailboxes(&self) -> Vec<(MailboxId, String)> {
        let mut ret = self
            .inner()
            .mailboxes
            .iter()
            .map(|(&id, mb)| (id, mb.name.clone()))
            .collect::<Vec<_>>();
        ret.sort_by(|a, b| a.1.cmp(&b.1));
        ret
    }

    fn mailbox_id(&self, name: &str) -> Option<MailboxId> {
        self.inner().find(name)
    }

    fn mailbox_name(&self, id: MailboxId) -> Option<String> {
        self.inner().mailboxes.get(&id).map(|mb| mb.name.clone())
    }

    fn create_mailbox(&self, name: &str) -> Result<MailboxId, Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty mailbox name".to_owned()));
        }

        let mut inner = self.inner();
        if inner.find(name).is_some() {
            return Err(Error::MailboxExists);
        }

        Ok(inner.add_mailbox(name.to_owned()))
    }

    fn rename_mailbox(
        &self,
        id: MailboxId,
        new_name: &str,
    ) -> Result<(), Error> {
        if new_name.is_empty() {
            return Err(Error::InvalidArgument("empty mailbox name".to_owned()));
        }

        let mut inner = self.inner();
        if inner.mailbox(id)?.name == INBOX {
            return Err(Error::InvalidArgument(
                "INBOX cannot be renamed".to_owned(),
            ));
        }
        if inner.find(new_name).is_some() {
            return Err(Error::MailboxExists);
        }

        inner.mailbox_mut(id)?.name = new_name.to_owned();
        inner.change_number += 1;
        Ok(())
    }

    fn delete_mailbox(&self, id: MailboxId) -> Result<(), Error> {
        let mut inner = self.inner();
        if inner.mailbox(id)?.name == INBOX {
            return Err(Error::InvalidArgument(
                "INBOX cannot be deleted".to_owned(),
            ));
        }

        inner.mailboxes.remove(&id);
        inner.change_number += 1;
        Ok(())
    }

    fn uid_validity(&self, id: MailboxId) -> Result<u32, Error> {
        Ok(self.inner().mailbox(id)?.uid_validity)
    }

    fn next_uid(&self, id: MailboxId) -> Result<u32, Error> {
        Ok(self.inner().mailbox(id)?.next_uid)
    }

    fn message_count(&self, id: MailboxId) -> Result<usize, Error> {
        Ok(self.inner().mailbox(id)?.messages.len())
    }

    fn flag_count(&self, id: MailboxId, flag: Flag) -> Result<usize, Error> {
        Ok(self
            .inner()
            .mailbox(id)?
            .messages
            .values()
            .filter(|m| m.flags.has(flag))
            .count())
    }

    fn message_uids(&self, id: MailboxId) -> Result<Vec<u32>, Error> {
        Ok(self.inner().mailbox(id)?.messages.keys().copied().collect())
    }

    fn add_message(
        &self,
        id: MailboxId,
        data: &[u8],
        internal_date: DateTime<FixedOffset>,
    ) -> Result<u32, Error> {
        let mut inner = self.inner();
        let mailbox = inner.mailbox_mut(id)?;
        let uid = mailbox.next_uid;
        mailbox.next_uid += 1;
        mailbox.messages.insert(
            uid,
            StoredMessage {
                data: Arc::new(data.to_vec()),
                internal_date,
                flags: FlagSet::RECENT,
            },
        );
        inner.change_number += 1;
        Ok(uid)
    }

    fn copy_message(
        &self,
        src: MailboxId,
        uid: u32,
        dst: MailboxId,
    ) -> Result<u32, Error> {
        let mut inner = self.inner();
        let (data, internal_date, flags) = {
            let message = inner.message(src, uid)?;
            (
                Arc::clone(&message.data),
                message.internal_date,
                message.flags,
            )
        };

        let mailbox = inner.mailbox_mut(dst)?;
        let new_uid = mailbox.next_uid;
        mailbox.next_uid += 1;
        mailbox.messages.insert(
            new_uid,
            StoredMessage {
                data,
                internal_date,
                flags: flags | FlagSet::RECENT,
            },
        );
        inner.change_number += 1;
        Ok(new_uid)
    }

    fn remove_message(&self, id: MailboxId, uid: u32) -> Result<(), Error> {
        let mut inner = self.inner();
        inner
            .mailbox_mut(id)?
            .messages
            .remove(&uid)
            .ok_or(Error::NxMessage)?;
        inner.change_number += 1;
        Ok(())
    }

    fn message_data(
        &self,
        id: MailboxId,
        uid: u32,
    ) -> Result<Arc<Vec<u8>>, Error> {
        Ok(Arc::clone(&self.inner().message(id, uid)?.data))
    }

    fn internal_date(
        &self,
        id: MailboxId,
        uid: u32,
    ) -> Result<DateTime<FixedOffset>, Error> {
        Ok(self.inner().message(id, uid)?.internal_date)
    }

    fn flags(&self, id: MailboxId, uid: u32) -> Result<FlagSet, Error> {
        Ok(self.inner().message(id, uid)?.flags)
    }

    fn set_flag(
        &self,
        id: MailboxId,
        uid: u32,
        flag: Flag,
        value: bool,
    ) -> Result<(), Error> {
        let mut inner = self.inner();
        let message = inner
            .mailbox_mut(id)?
            .messages
            .get_mut(&uid)
            .ok_or(Error::NxMessage)?;
        if message.flags.has(flag) != value {
            message.flags.set(flag.bits(), value);
            inner.change_number += 1;
        }
        Ok(())
    }

    fn aborted_transaction(&self) -> bool {
        self.aborted.load(SeqCst)
    }

    fn recover(&self) -> Result<(), Error> {
        info!("Recovering in-memory store");
        self.aborted.store(false, SeqCst);
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        self.syncs.fetch_add(1, SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// A set of `MemoryStore`s keyed by user id, which outlive any one login.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    stores: Arc<Mutex<HashMap<String, MemoryStore>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store for `user_id`, creating it if it does not exist yet.
    pub fn store(&self, user_id: &str) -> MemoryStore {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_owned())
            .or_insert_with(MemoryStore::new)
            .clone()
    }

    /// A factory for `StorePool` handing out the stores in this directory.
    pub fn factory(&self) -> StoreFactory {
        let this = self.clone();
        Box::new(move |user_id| {
            Ok(Box::new(this.store(user_id)) as Box<dyn MailStore>)
        })
    }
}
