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

//! The contract between the protocol engine and the mail store, plus the
//! engine-side plumbing that sits in front of each store: the timed
//! read/write lock, the per-user handle pool and the mailbox multicast hub.
//!
//! `memory` holds a complete in-memory store used by the tests and by the
//! scratch server.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bitflags::bitflags;
use chrono::prelude::*;

use crate::support::error::Error;

pub mod lock;
pub mod memory;
pub mod multicast;
pub mod pool;

pub type MailboxId = u32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Answered,
    Flagged,
    Deleted,
    Seen,
    Draft,
    Recent,
}

impl Flag {
    /// Every flag, in the order flags are written in responses.
    pub const ALL: [Flag; 6] = [
        Flag::Answered,
        Flag::Flagged,
        Flag::Deleted,
        Flag::Seen,
        Flag::Draft,
        Flag::Recent,
    ];

    /// The flags a client may set with STORE or APPEND.
    pub const PERMANENT: [Flag; 5] = [
        Flag::Answered,
        Flag::Flagged,
        Flag::Deleted,
        Flag::Seen,
        Flag::Draft,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Flag::Answered => "\\Answered",
            Flag::Flagged => "\\Flagged",
            Flag::Deleted => "\\Deleted",
            Flag::Seen => "\\Seen",
            Flag::Draft => "\\Draft",
            Flag::Recent => "\\Recent",
        }
    }

    pub fn bits(self) -> FlagSet {
        match self {
            Flag::Answered => FlagSet::ANSWERED,
            Flag::Flagged => FlagSet::FLAGGED,
            Flag::Deleted => FlagSet::DELETED,
            Flag::Seen => FlagSet::SEEN,
            Flag::Draft => FlagSet::DRAFT,
            Flag::Recent => FlagSet::RECENT,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Flag::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown flag: {}", s)))
    }
}

bitflags! {
    /// The set of flags on one message.
    pub struct FlagSet: u8 {
        const ANSWERED = 1 << 0;
        const FLAGGED = 1 << 1;
        const DELETED = 1 << 2;
        const SEEN = 1 << 3;
        const DRAFT = 1 << 4;
        const RECENT = 1 << 5;
    }
}

impl FlagSet {
    pub fn has(self, flag: Flag) -> bool {
        self.contains(flag.bits())
    }

    /// Iterate the flags in this set, in response order.
    pub fn iter(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.iter().copied().filter(move |&f| self.has(f))
    }
}

/// A mail store belonging to one user.
///
/// All methods take `&self`: the session layer serialises access through the
/// `StoreHolder` lock, and implementations provide whatever interior
/// synchronisation they need for the individual calls. Messages are keyed by
/// UID within their mailbox; UIDs are allocated by the store and never reused
/// within a mailbox.
pub trait MailStore: Send + Sync {
    /// A counter which changes whenever anything in the store changes.
    fn change_number(&self) -> u64;

    /// All mailboxes, ordered by name.
    fn mailboxes(&self) -> Vec<(MailboxId, String)>;
    fn mailbox_id(&self, name: &str) -> Option<MailboxId>;
    fn mailbox_name(&self, id: MailboxId) -> Option<String>;
    fn create_mailbox(&self, name: &str) -> Result<MailboxId, Error>;
    fn rename_mailbox(&self, id: MailboxId, new_name: &str)
        -> Result<(), Error>;
    fn delete_mailbox(&self, id: MailboxId) -> Result<(), Error>;

    fn uid_validity(&self, id: MailboxId) -> Result<u32, Error>;
    /// The UID the next message added to the mailbox will receive.
    fn next_uid(&self, id: MailboxId) -> Result<u32, Error>;
    fn message_count(&self, id: MailboxId) -> Result<usize, Error>;
    /// The number of messages in the mailbox which have `flag` set.
    fn flag_count(&self, id: MailboxId, flag: Flag) -> Result<usize, Error>;
    /// The UIDs of all messages in the mailbox, ascending.
    fn message_uids(&self, id: MailboxId) -> Result<Vec<u32>, Error>;

    /// Add a message. The new message has the `\Recent` flag.
    fn add_message(
        &self,
        id: MailboxId,
        data: &[u8],
        internal_date: DateTime<FixedOffset>,
    ) -> Result<u32, Error>;
    /// Copy a message, with its flags and internal date, returning the UID
    /// in the destination. The copy has the `\Recent` flag.
    fn copy_message(
        &self,
        src: MailboxId,
        uid: u32,
        dst: MailboxId,
    ) -> Result<u32, Error>;
    fn remove_message(&self, id: MailboxId, uid: u32) -> Result<(), Error>;

    fn message_data(&self, id: MailboxId, uid: u32)
        -> Result<Arc<Vec<u8>>, Error>;
    fn internal_date(
        &self,
        id: MailboxId,
        uid: u32,
    ) -> Result<DateTime<FixedOffset>, Error>;
    fn flags(&self, id: MailboxId, uid: u32) -> Result<FlagSet, Error>;
    fn set_flag(
        &self,
        id: MailboxId,
        uid: u32,
        flag: Flag,
        value: bool,
    ) -> Result<(), Error>;

    /// Whether a previous process left a transaction unfinished.
    fn aborted_transaction(&self) -> bool;
    /// Repair the store after an aborted transaction.
    fn recover(&self) -> Result<(), Error>;
    /// Make everything written so far durable.
    fn sync(&self) -> Result<(), Error>;
    /// Called once when the last handle on the store is released.
    fn close(&self) -> Result<(), Error>;
}
