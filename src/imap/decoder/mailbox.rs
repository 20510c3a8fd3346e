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

//! The authenticated state, and the commands which only need a store.

use std::sync::Arc;

use chrono::prelude::*;
use log::{info, warn};
use regex::{Regex, RegexBuilder};

use super::defs::*;
use super::{Connection, Context};
use crate::imap::connection_timer::CommandInput;
use crate::imap::folder::Folder;
use crate::imap::lex::LexWriter;
use crate::imap::response_writer::{CondResponse, ResponseWriter};
use crate::imap::syntax::{parse_datetime, Args, Node};
use crate::store::pool::StoreHolder;
use crate::store::{Flag, FlagSet, MailStore};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::LockConfig;

/// A session holding the store of one user, with at most one selected
/// folder.
pub struct MailboxSession {
    pub(super) holder: Arc<StoreHolder>,
    pub(super) folder: Option<Folder>,
    pub(super) log_prefix: LogPrefix,
}

impl MailboxSession {
    pub(super) fn new(holder: Arc<StoreHolder>, log_prefix: LogPrefix) -> Self {
        MailboxSession {
            holder,
            folder: None,
            log_prefix,
        }
    }

    pub(super) fn execute<R: CommandInput>(
        &mut self,
        conn: &mut Connection<R>,
        request: &Request<'_>,
    ) -> Result<Reply, Error> {
        let route = match route::<R>(request.kind) {
            Some(route) => route,
            None => return Ok(CondResponse::bad("unknown command").into()),
        };

        if Guard::Selected == route.guard && self.folder.is_none() {
            return Ok(CondResponse::no("not selected").into());
        }

        let cxt = Arc::clone(&conn.cxt);
        let timeouts = &cxt.config.lock;
        let holder = Arc::clone(&self.holder);
        let _read = if LockMode::Shared == route.lock {
            Some(holder.lock().read(timeouts.read_lock_timeout())?)
        } else {
            None
        };
        let _write = if LockMode::Exclusive == route.lock {
            Some(holder.lock().write(timeouts.write_lock_timeout())?)
        } else {
            None
        };

        if Guard::Selected == route.guard {
            self.check_folder(route.lock, timeouts)?;
        }

        (route.handler)(self, conn, request)
    }

    /// Confirm the selected mailbox still exists and bring the message list
    /// up to date.
    fn check_folder(
        &mut self,
        lock: LockMode,
        timeouts: &LockConfig,
    ) -> Result<(), Error> {
        let holder = Arc::clone(&self.holder);
        // Commands without a lock of their own still check under a shared
        // lock
        let _read = if LockMode::None == lock {
            Some(holder.lock().read(timeouts.read_lock_timeout())?)
        } else {
            None
        };

        match self.folder {
            Some(ref mut folder) => folder.ensure_current(holder.store()),
            None => Ok(()),
        }
    }

    fn noop<R>(&mut self, conn: &Connection<R>) -> Result<Reply, Error> {
        if self.folder.is_some() {
            self.check_folder(LockMode::None, &conn.cxt.config.lock)?;
        }
        Ok(CondResponse::completed("NOOP").into())
    }

    /// Write the lines other sessions have published to the selected
    /// mailbox.
    pub(super) fn flush_pending(&self, out: &ResponseWriter) -> Result<(), Error> {
        if let Some(ref folder) = self.folder {
            let pending = folder.take_pending();
            if !pending.is_empty() {
                out.lines(&pending)?;
            }
        }
        Ok(())
    }

    pub(super) fn store(&self) -> &dyn MailStore {
        self.holder.store()
    }

    fn select(
        &mut self,
        out: &ResponseWriter,
        request: &Request<'_>,
        read_only: bool,
    ) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let name = args.astring("mailbox name")?;
        args.finish()?;

        if let Some(old) = self.folder.take() {
            old.close(self.store())?;
        }

        let store = self.holder.store();
        let id = store.mailbox_id(&name).ok_or(Error::NxMailbox)?;
        let folder = Folder::open(&self.holder, id, read_only)?;

        let mut first_unseen = None;
        for m in folder.messages() {
            if !store.flags(id, m.uid)?.has(Flag::Seen) {
                first_unseen = Some(m.seq);
                break;
            }
        }

        out.untagged(&format!("{} EXISTS", folder.len()))?;
        out.untagged(&format!("{} RECENT", store.flag_count(id, Flag::Recent)?))?;
        if let Some(seq) = first_unseen {
            out.untagged(&format!("OK [UNSEEN {}] first unseen", seq))?;
        }
        out.untagged(&format!(
            "OK [UIDVALIDITY {}] UIDs valid",
            store.uid_validity(id)?
        ))?;
        out.untagged(&format!(
            "OK [UIDNEXT {}] predicted next UID",
            store.next_uid(id)?
        ))?;
        let flags = flag_list(&Flag::PERMANENT);
        out.untagged(&format!("FLAGS {}", flags))?;
        if read_only {
            out.untagged("OK [PERMANENTFLAGS ()] read-only folder")?;
        } else {
            out.untagged(&format!("OK [PERMANENTFLAGS {}] flags permitted", flags))?;
        }

        info!(
            "{} Selected {} ({} messages, read-only: {})",
            self.log_prefix,
            name,
            folder.len(),
            read_only
        );
        self.folder = Some(folder);

        Ok(CondResponse::completed(request.kind.name()).with_code(
            if read_only {
                "READ-ONLY"
            } else {
                "READ-WRITE"
            },
        ))
    }

    fn create(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let name = args.astring("mailbox name")?;
        args.finish()?;

        self.store().create_mailbox(&name)?;
        info!("{} Created mailbox {}", self.log_prefix, name);
        Ok(CondResponse::completed("CREATE"))
    }

    fn delete(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let name = args.astring("mailbox name")?;
        args.finish()?;

        let id = self.store().mailbox_id(&name).ok_or(Error::NxMailbox)?;
        self.store().delete_mailbox(id)?;
        info!("{} Deleted mailbox {}", self.log_prefix, name);
        Ok(CondResponse::completed("DELETE"))
    }

    fn rename(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let from = args.astring("existing mailbox name")?;
        let to = args.astring("new mailbox name")?;
        args.finish()?;

        let id = self.store().mailbox_id(&from).ok_or(Error::NxMailbox)?;
        self.store().rename_mailbox(id, &to)?;
        info!("{} Renamed mailbox {} to {}", self.log_prefix, from, to);
        Ok(CondResponse::completed("RENAME"))
    }

    /// Every existing mailbox counts as subscribed.
    fn subscribe(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let name = args.astring("mailbox name")?;
        args.finish()?;

        self.store().mailbox_id(&name).ok_or(Error::NxMailbox)?;
        Ok(CondResponse::completed("SUBSCRIBE"))
    }

    fn unsubscribe(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        args.astring("mailbox name")?;
        args.finish()?;

        Ok(CondResponse::no("not supported"))
    }

    fn list(
        &self,
        out: &ResponseWriter,
        request: &Request<'_>,
        name: &str,
    ) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let reference = args.astring("reference name")?;
        let pattern = args.astring("mailbox pattern")?;
        args.finish()?;

        if pattern.is_empty() {
            out.untagged(&format!("{} (\\Noselect) NIL \"\"", name))?;
            return Ok(CondResponse::completed(name));
        }

        let pattern = format!("{}{}", reference, pattern);
        let matcher = wildcard_regex(&pattern, false)?;
        let inbox_matcher = wildcard_regex(&pattern, true)?;

        let store = self.store();
        for (id, mailbox) in store.mailboxes() {
            let is_inbox = mailbox.eq_ignore_ascii_case("INBOX");
            if !matcher.is_match(&mailbox)
                && !(is_inbox && inbox_matcher.is_match("INBOX"))
            {
                continue;
            }

            let marked = if store.flag_count(id, Flag::Recent)? > 0 {
                "\\Marked"
            } else {
                "\\Unmarked"
            };
            let mut lw = LexWriter::new(
                format!("* {} (\\Noinferiors {}) NIL ", name, marked).into_bytes(),
            );
            lw.astring(&mailbox)?;
            lw.verbatim("\r\n")?;
            out.line(&lw.into_inner())?;
        }

        Ok(CondResponse::completed(name))
    }

    fn status(
        &self,
        out: &ResponseWriter,
        request: &Request<'_>,
    ) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let name = args.astring("mailbox name")?;
        let items = args.group("status items")?;
        args.finish()?;

        if items.is_empty() {
            return Err(Error::Syntax("missing status items".to_owned()));
        }

        let store = self.store();
        let id = store.mailbox_id(&name).ok_or(Error::NxMailbox)?;

        let mut data = Vec::with_capacity(items.len());
        for item in items {
            let item = item
                .word()
                .map(str::to_ascii_uppercase)
                .ok_or_else(|| Error::Syntax("invalid status item".to_owned()))?;
            // UIDNEXT is read under the shared lock, so a concurrent APPEND
            // in another process can make it stale by the time it is sent
            let value = match &*item {
                "MESSAGES" => store.message_count(id)?,
                "RECENT" => store.flag_count(id, Flag::Recent)?,
                "UIDNEXT" => store.next_uid(id)? as usize,
                "UIDVALIDITY" => store.uid_validity(id)? as usize,
                "UNSEEN" => {
                    store.message_count(id)? - store.flag_count(id, Flag::Seen)?
                }
                _ => {
                    return Err(Error::Syntax(format!(
                        "unknown status item: {}",
                        item
                    )))
                }
            };
            data.push(format!("{} {}", item, value));
        }

        let mut lw = LexWriter::new(b"* STATUS ".to_vec());
        lw.astring(&name)?;
        lw.verbatim(&format!(" ({})\r\n", data.join(" ")))?;
        out.line(&lw.into_inner())?;
        Ok(CondResponse::completed("STATUS"))
    }

    fn append(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let name = args.astring("mailbox name")?;

        let mut flags = FlagSet::empty();
        if let Some(group) = args.peek().and_then(Node::group) {
            args.next();
            flags = parse_flags(group)?;
        }

        let mut rest = Vec::new();
        while let Some(node) = args.next() {
            rest.push(node);
        }
        let (date, data) = match rest[..] {
            [data] => (None, data),
            [date, data] => (Some(date), data),
            [] => return Err(Error::Syntax("missing message".to_owned())),
            _ => return Err(Error::Syntax("too many arguments".to_owned())),
        };

        let internal_date = match date {
            Some(date) => parse_datetime(&date.astring().ok_or_else(|| {
                Error::Syntax("invalid date-time".to_owned())
            })?)?,
            None => {
                let now = Local::now();
                now.with_timezone(now.offset())
            }
        };
        let data = data
            .astring_bytes()
            .ok_or_else(|| Error::Syntax("invalid message".to_owned()))?;

        let store = self.store();
        let id = match store.mailbox_id(&name) {
            Some(id) => id,
            None => {
                return Ok(CondResponse::no("not found a mailbox")
                    .with_code("TRYCREATE"))
            }
        };

        let uid = store.add_message(id, data, internal_date)?;
        for flag in flags.iter() {
            store.set_flag(id, uid, flag, true)?;
        }
        let validity = store.uid_validity(id)?;
        let count = store.message_count(id)?;
        Folder::publish_to(
            self.holder.multicast(),
            id,
            format!("* {} EXISTS\r\n", count).as_bytes(),
        );

        info!(
            "{} Appended {} bytes to {} as UID {}",
            self.log_prefix,
            data.len(),
            name,
            uid
        );
        Ok(CondResponse::completed("APPEND")
            .with_code(format!("APPENDUID {} {}", validity, uid)))
    }

    /// Release the store, closing the selected folder first.
    ///
    /// This is given only a short time to obtain the write lock; if it
    /// cannot, the folder is abandoned as it is.
    pub(super) fn dispose(mut self, cxt: &Context) {
        let timeout = cxt.config.lock.cleanup_write_lock_timeout();
        let folder = self.folder.take();

        match self.holder.lock().write(timeout) {
            Ok(_lock) => {
                if let Err(e) = self.close_and_sync(folder) {
                    warn!("{} Error closing session: {}", self.log_prefix, e);
                }
            }
            Err(e) => warn!(
                "{} Abandoning session state without cleanup: {}",
                self.log_prefix, e
            ),
        }

        cxt.pool.release_detached(self.holder, timeout);
    }

    fn close_and_sync(&self, folder: Option<Folder>) -> Result<(), Error> {
        let store = self.store();
        if let Some(mut folder) = folder {
            if folder.exists(store) {
                folder.reload(store)?;
            }
            folder.close(store)?;
        }
        store.sync()
    }
}

/// The guards and handler of each command a `MailboxSession` runs.
///
/// `CAPABILITY` and `LOGOUT` are answered by the decoder and have no route.
fn route<R: CommandInput>(kind: CommandKind) -> Option<Route<R>> {
    use super::defs::CommandKind::*;
    use super::defs::Guard::*;
    use super::defs::LockMode::{Exclusive, Shared};

    Some(match kind {
        Capability | Logout => return None,
        Noop => Route::new(Any, LockMode::None, |s, c, _| s.noop(c)),
        Login | Authenticate => Route::new(Any, LockMode::None, |_, _, _| {
            Ok(CondResponse::no("duplicated login").into())
        }),
        Create => Route::new(Authenticated, Exclusive, |s, _, r| {
            s.create(r).map(Reply::from)
        }),
        Delete => Route::new(Authenticated, Exclusive, |s, _, r| {
            s.delete(r).map(Reply::from)
        }),
        Rename => Route::new(Authenticated, Exclusive, |s, _, r| {
            s.rename(r).map(Reply::from)
        }),
        Append => Route::new(Authenticated, Exclusive, |s, _, r| {
            s.append(r).map(Reply::from)
        }),
        Subscribe => Route::new(Authenticated, Shared, |s, _, r| {
            s.subscribe(r).map(Reply::from)
        }),
        Unsubscribe => Route::new(Authenticated, Shared, |s, _, r| {
            s.unsubscribe(r).map(Reply::from)
        }),
        List => Route::new(Authenticated, Shared, |s, c, r| {
            s.list(&c.out, r, "LIST").map(Reply::from)
        }),
        Lsub => Route::new(Authenticated, Shared, |s, c, r| {
            s.list(&c.out, r, "LSUB").map(Reply::from)
        }),
        Status => Route::new(Authenticated, Shared, |s, c, r| {
            s.status(&c.out, r).map(Reply::from)
        }),
        Select => Route::new(Authenticated, Shared, |s, c, r| {
            s.select(&c.out, r, false).map(Reply::from)
        }),
        Examine => Route::new(Authenticated, Shared, |s, c, r| {
            s.select(&c.out, r, true).map(Reply::from)
        }),
        Check => {
            Route::new(Selected, Exclusive, |s, _, _| s.check().map(Reply::from))
        }
        Close => {
            Route::new(Selected, Exclusive, |s, _, _| s.close().map(Reply::from))
        }
        Expunge => Route::new(Selected, Exclusive, |s, c, r| {
            s.expunge(&c.out, r).map(Reply::from)
        }),
        Store => Route::new(Selected, Exclusive, |s, c, r| {
            s.store_flags(&c.out, r).map(Reply::from)
        }),
        Copy => Route::new(Selected, Exclusive, |s, _, r| {
            s.copy(r).map(Reply::from)
        }),
        Search => Route::new(Selected, Shared, |s, c, r| {
            s.search(&c.out, r).map(Reply::from)
        }),
        Fetch => Route::new(Selected, Shared, |s, c, r| {
            s.fetch(&c.out, r).map(Reply::from)
        }),
        Idle => Route::new(Selected, LockMode::None, MailboxSession::idle),
    })
}

/// Parse a parenthesised flag list as given to APPEND and STORE.
pub(super) fn parse_flags(group: &[Node]) -> Result<FlagSet, Error> {
    let mut flags = FlagSet::empty();
    for node in group {
        let name = node
            .word()
            .ok_or_else(|| Error::Syntax("invalid flag".to_owned()))?;
        let flag = name.parse::<Flag>()?;
        if Flag::Recent == flag {
            return Err(Error::InvalidArgument(
                "\\Recent cannot be stored".to_owned(),
            ));
        }
        flags |= flag.bits();
    }
    Ok(flags)
}

fn flag_list(flags: &[Flag]) -> String {
    let names = flags.iter().map(|f| f.name()).collect::<Vec<_>>();
    format!("({})", names.join(" "))
}

/// Translate a LIST pattern into an anchored regex.
///
/// The namespace is flat, so `%` matches the same as `*`.
fn wildcard_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, Error> {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' | '%' => regex.push_str(".*"),
            ch => regex.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4]))),
        }
    }
    regex.push('$');

    RegexBuilder::new(&regex)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| Error::InvalidArgument(e.to_string()))
}
