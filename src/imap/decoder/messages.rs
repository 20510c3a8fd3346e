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

//! Commands operating on the messages of the selected folder.
//!
//! The decoder has already confirmed that a folder is selected and brought it
//! up to date before any of these run.

use std::fmt::Write as _;

use log::info;

use super::defs::*;
use super::mailbox::{parse_flags, MailboxSession};
use crate::imap::fetch;
use crate::imap::folder::{Folder, MessageCache, MessageRef};
use crate::imap::lex::LexWriter;
use crate::imap::response_writer::{CondResponse, ResponseWriter};
use crate::imap::search::{self, SearchContext};
use crate::imap::syntax::{Args, Node};
use crate::store::{Flag, FlagSet};
use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StoreOp {
    Replace,
    Add,
    Remove,
}

impl MailboxSession {
    fn selected(&self) -> Result<&Folder, Error> {
        self.folder
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("not selected".to_owned()))
    }

    pub(super) fn check(&self) -> Result<CondResponse, Error> {
        self.store().sync()?;
        Ok(CondResponse::completed("CHECK"))
    }

    pub(super) fn close(&mut self) -> Result<CondResponse, Error> {
        if !self.selected()?.read_only() {
            let expunged = self.expunge_deleted(None)?;
            if let Some(ref folder) = self.folder {
                for line in &expunged {
                    folder.publish(self.holder.multicast(), line);
                }
            }
        }

        if let Some(folder) = self.folder.take() {
            folder.close(self.holder.store())?;
        }
        Ok(CondResponse::completed("CLOSE"))
    }

    pub(super) fn expunge(
        &mut self,
        out: &ResponseWriter,
        request: &Request<'_>,
    ) -> Result<CondResponse, Error> {
        let mut args = Args::new(request.args);
        let only = if request.uid {
            let set = args.word("UID set")?;
            Some(self.selected()?.resolve(set, true)?)
        } else {
            None
        };
        args.finish()?;

        if self.selected()?.read_only() {
            return Ok(CondResponse::no("read-only folder"));
        }

        let expunged = self.expunge_deleted(only)?;
        out.lines(&expunged)?;
        if let Some(ref folder) = self.folder {
            for line in &expunged {
                folder.publish(self.holder.multicast(), line);
            }
        }

        Ok(CondResponse::completed(&request.display_name()))
    }

    /// Remove every message with `\Deleted`, restricted to `only` if given,
    /// and reload the folder.
    ///
    /// Returns the `EXPUNGE` lines in the order they must be sent: highest
    /// sequence number first, so that no line renumbers a later one.
    fn expunge_deleted(
        &mut self,
        only: Option<Vec<MessageRef>>,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let holder = std::sync::Arc::clone(&self.holder);
        let store = holder.store();
        let folder = match self.folder {
            Some(ref mut folder) => folder,
            None => return Ok(Vec::new()),
        };
        let mailbox = folder.mailbox();
        let candidates = only.unwrap_or_else(|| folder.messages().to_vec());

        let mut lines = Vec::new();
        for m in candidates.iter().rev() {
            if store.flags(mailbox, m.uid)?.has(Flag::Deleted) {
                store.remove_message(mailbox, m.uid)?;
                lines.push(format!("* {} EXPUNGE\r\n", m.seq).into_bytes());
            }
        }

        folder.reload(store)?;
        if !lines.is_empty() {
            info!("{} Expunged {} messages", self.log_prefix, lines.len());
        }
        Ok(lines)
    }

    pub(super) fn search(
        &self,
        out: &ResponseWriter,
        request: &Request<'_>,
    ) -> Result<CondResponse, Error> {
        let folder = self.selected()?;
        let keys = search::parse(
            request.args,
            SearchContext {
                max_seq: folder.max_seq(),
                max_uid: folder.max_uid(),
            },
        )?;
        let predicate = search::compile(keys)?;
        let cache = MessageCache::new(self.store(), folder.mailbox());
        let hits = search::run(&predicate, &cache, folder.messages())?;

        let mut line = "SEARCH".to_owned();
        for m in hits {
            let _ = write!(line, " {}", if request.uid { m.uid } else { m.seq });
        }
        out.untagged(&line)?;
        Ok(CondResponse::completed(&request.display_name()))
    }

    pub(super) fn fetch(
        &self,
        out: &ResponseWriter,
        request: &Request<'_>,
    ) -> Result<CondResponse, Error> {
        let folder = self.selected()?;
        let (set, atts) = request
            .args
            .split_first()
            .ok_or_else(|| Error::Syntax("missing sequence set".to_owned()))?;
        let set = set
            .word()
            .ok_or_else(|| Error::Syntax("invalid sequence set".to_owned()))?;

        let plan = fetch::compile(fetch::parse(atts, request.uid)?);
        let messages = folder.resolve(set, request.uid)?;
        let cache = MessageCache::new(self.store(), folder.mailbox());
        let response = fetch::run(&plan, &cache, &messages, folder.read_only())?;

        out.lines(&response.lines)?;
        for &(m, flags) in &response.newly_seen {
            folder.publish(self.holder.multicast(), &flags_line(m, flags, false)?);
        }
        Ok(CondResponse::completed(&request.display_name()))
    }

    pub(super) fn store_flags(
        &self,
        out: &ResponseWriter,
        request: &Request<'_>,
    ) -> Result<CondResponse, Error> {
        let folder = self.selected()?;
        let mut args = Args::new(request.args);
        let set = args.word("sequence set")?;
        let item = args.word("store item")?.to_ascii_uppercase();

        let flags = match args.peek() {
            Some(&Node::Group(ref group)) => {
                args.next();
                parse_flags(group)?
            }
            _ => {
                let mut words = Vec::new();
                while let Some(node) = args.next() {
                    words.push(node.clone());
                }
                if words.is_empty() {
                    return Err(Error::Syntax("missing flags".to_owned()));
                }
                parse_flags(&words)?
            }
        };
        args.finish()?;

        let (item, silent) = match item.strip_suffix(".SILENT") {
            Some(item) => (item, true),
            None => (&*item, false),
        };
        let op = match item {
            "FLAGS" => StoreOp::Replace,
            "+FLAGS" => StoreOp::Add,
            "-FLAGS" => StoreOp::Remove,
            _ => {
                return Err(Error::Syntax(format!("invalid store item: {}", item)))
            }
        };

        if folder.read_only() {
            return Ok(CondResponse::no("read-only folder"));
        }

        let messages = folder.resolve(set, request.uid)?;
        let store = self.store();
        let mailbox = folder.mailbox();
        let mut changed = 0;
        for m in messages {
            let current = store.flags(mailbox, m.uid)?;
            let target = match op {
                StoreOp::Replace => flags | (current & FlagSet::RECENT),
                StoreOp::Add => current | flags,
                StoreOp::Remove => current - flags,
            };

            for &flag in &Flag::PERMANENT {
                if current.has(flag) != target.has(flag) {
                    store.set_flag(mailbox, m.uid, flag, target.has(flag))?;
                }
            }

            if target != current {
                changed += 1;
                folder.publish(
                    self.holder.multicast(),
                    &flags_line(m, target, false)?,
                );
            }
            if !silent {
                out.line(&flags_line(m, target, request.uid)?)?;
            }
        }

        if changed > 0 {
            info!("{} Changed flags of {} messages", self.log_prefix, changed);
        }
        Ok(CondResponse::completed(&request.display_name()))
    }

    pub(super) fn copy(&self, request: &Request<'_>) -> Result<CondResponse, Error> {
        let folder = self.selected()?;
        let mut args = Args::new(request.args);
        let set = args.word("sequence set")?;
        let name = args.astring("mailbox name")?;
        args.finish()?;

        let messages = folder.resolve(set, request.uid)?;
        let store = self.store();
        let dst = match store.mailbox_id(&name) {
            Some(id) => id,
            None => {
                return Ok(CondResponse::no("not found a mailbox")
                    .with_code("TRYCREATE"))
            }
        };

        let response = CondResponse::completed(&request.display_name());
        if messages.is_empty() {
            return Ok(response);
        }

        let mut src_uids = Vec::with_capacity(messages.len());
        let mut dst_uids = Vec::with_capacity(messages.len());
        for m in &messages {
            dst_uids.push(store.copy_message(folder.mailbox(), m.uid, dst)?);
            src_uids.push(m.uid);
        }

        Folder::publish_to(
            self.holder.multicast(),
            dst,
            format!("* {} EXISTS\r\n", store.message_count(dst)?).as_bytes(),
        );
        info!(
            "{} Copied {} messages to {}",
            self.log_prefix,
            messages.len(),
            name
        );

        Ok(response.with_code(format!(
            "COPYUID {} {} {}",
            store.uid_validity(dst)?,
            uid_set(&src_uids),
            uid_set(&dst_uids)
        )))
    }
}

/// `* <seq> FETCH ([UID <uid> ]FLAGS (...))`
fn flags_line(m: MessageRef, flags: FlagSet, uid: bool) -> Result<Vec<u8>, Error> {
    let mut lw = LexWriter::new(format!("* {} FETCH (", m.seq).into_bytes());
    if uid {
        lw.verbatim(&format!("UID {} ", m.uid))?;
    }
    lw.verbatim("FLAGS ")?;
    lw.flags(flags)?;
    lw.verbatim(")\r\n")?;
    Ok(lw.into_inner())
}

/// Format ascending UIDs as a compact set, such as `1:3,7`.
fn uid_set(uids: &[u32]) -> String {
    let mut out = String::new();
    let mut ix = 0;
    while ix < uids.len() {
        let start = uids[ix];
        let mut end = start;
        while ix + 1 < uids.len() && uids[ix + 1] == end + 1 {
            ix += 1;
            end = uids[ix];
        }

        if !out.is_empty() {
            out.push(',');
        }
        if start == end {
            let _ = write!(out, "{}", start);
        } else {
            let _ = write!(out, "{}:{}", start, end);
        }
        ix += 1;
    }
    out
}
