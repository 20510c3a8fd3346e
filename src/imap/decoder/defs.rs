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

//! Command kinds and the per-kind routing table.

use std::fmt;

use super::mailbox::MailboxSession;
use super::{Connection, Session};
use crate::imap::response_writer::CondResponse;
use crate::imap::syntax::{Command, Node};
use crate::support::error::Error;

pub(super) static CAPABILITIES: &[&str] =
    &["IMAP4rev1", "IDLE", "SASL-IR", "UIDPLUS"];

/// Added to CAPABILITY for the mail delivery user.
pub(super) static DELIVERY_CAPABILITY: &str = "X-POSTBOX-DELIVERY";

pub(super) static TAGLINE: &str = concat!(
    "postbox v",
    env!("CARGO_PKG_VERSION"),
    " IMAP4rev1 service ready."
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Capability,
    Noop,
    Logout,
    Authenticate,
    Login,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    List,
    Lsub,
    Status,
    Append,
    Select,
    Examine,
    Check,
    Close,
    Expunge,
    Search,
    Fetch,
    Store,
    Copy,
    Idle,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Option<Self> {
        use self::CommandKind::*;

        Some(match name {
            "CAPABILITY" => Capability,
            "NOOP" => Noop,
            "LOGOUT" => Logout,
            "AUTHENTICATE" => Authenticate,
            "LOGIN" => Login,
            "CREATE" => Create,
            "DELETE" => Delete,
            "RENAME" => Rename,
            "SUBSCRIBE" => Subscribe,
            "UNSUBSCRIBE" => Unsubscribe,
            "LIST" => List,
            "LSUB" => Lsub,
            "STATUS" => Status,
            "APPEND" => Append,
            "SELECT" => Select,
            "EXAMINE" => Examine,
            "CHECK" => Check,
            "CLOSE" => Close,
            "EXPUNGE" => Expunge,
            "SEARCH" => Search,
            "FETCH" => Fetch,
            "STORE" => Store,
            "COPY" => Copy,
            "IDLE" => Idle,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use self::CommandKind::*;

        match self {
            Capability => "CAPABILITY",
            Noop => "NOOP",
            Logout => "LOGOUT",
            Authenticate => "AUTHENTICATE",
            Login => "LOGIN",
            Create => "CREATE",
            Delete => "DELETE",
            Rename => "RENAME",
            Subscribe => "SUBSCRIBE",
            Unsubscribe => "UNSUBSCRIBE",
            List => "LIST",
            Lsub => "LSUB",
            Status => "STATUS",
            Append => "APPEND",
            Select => "SELECT",
            Examine => "EXAMINE",
            Check => "CHECK",
            Close => "CLOSE",
            Expunge => "EXPUNGE",
            Search => "SEARCH",
            Fetch => "FETCH",
            Store => "STORE",
            Copy => "COPY",
            Idle => "IDLE",
        }
    }

    /// Whether the command may follow the `UID` prefix.
    pub fn takes_uid_prefix(self) -> bool {
        use self::CommandKind::*;

        matches!(self, Search | Fetch | Store | Copy | Expunge)
    }

}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What must hold before a command's handler runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guard {
    Any,
    /// A store handle is held.
    Authenticated,
    /// A store handle is held and a folder is selected.
    Selected,
}

/// Which side of the store lock is held around the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    None,
    Shared,
    Exclusive,
}

/// Runs a command in a `MailboxSession` once its route's guards hold.
pub(super) type Handler<R> = fn(
    &mut MailboxSession,
    &mut Connection<R>,
    &Request<'_>,
) -> Result<Reply, Error>;

pub(super) struct Route<R> {
    pub(super) guard: Guard,
    pub(super) lock: LockMode,
    pub(super) handler: Handler<R>,
}

impl<R> Route<R> {
    pub(super) fn new(guard: Guard, lock: LockMode, handler: Handler<R>) -> Self {
        Route {
            guard,
            lock,
            handler,
        }
    }
}

/// A command, resolved to its kind.
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    pub tag: &'a str,
    pub kind: CommandKind,
    /// Set for `UID SEARCH`, `UID FETCH` and so on.
    pub uid: bool,
    /// The arguments after the command name (and the `UID` subcommand).
    pub args: &'a [Node],
}

impl<'a> Request<'a> {
    /// Resolve `command`, returning `None` if its name is unknown.
    pub fn resolve(command: &'a Command) -> Option<Self> {
        if "UID" == command.name {
            let (sub, args) = command.args.split_first()?;
            let kind = CommandKind::from_name(&sub.word()?.to_ascii_uppercase())?;
            if !kind.takes_uid_prefix() {
                return None;
            }
            return Some(Request {
                tag: &command.tag,
                kind,
                uid: true,
                args,
            });
        }

        Some(Request {
            tag: &command.tag,
            kind: CommandKind::from_name(&command.name)?,
            uid: false,
            args: &command.args,
        })
    }

    /// The name used in the completion response, such as `UID FETCH`.
    pub fn display_name(&self) -> String {
        if self.uid {
            format!("UID {}", self.kind)
        } else {
            self.kind.name().to_owned()
        }
    }
}

/// How the decoder proceeds after a command.
pub enum Transition {
    Stay,
    Become(Session),
    LogOut,
}

/// A handler's result: the tagged response and the resulting transition.
pub struct Reply {
    pub response: CondResponse,
    pub transition: Transition,
}

impl Reply {
    pub fn become_(response: CondResponse, session: Session) -> Self {
        Reply {
            response,
            transition: Transition::Become(session),
        }
    }
}

impl From<CondResponse> for Reply {
    fn from(response: CondResponse) -> Self {
        Reply {
            response,
            transition: Transition::Stay,
        }
    }
}
