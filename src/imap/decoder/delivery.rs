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

//! The session of the mail delivery user.
//!
//! The delivery user may only APPEND, and does so on behalf of other users.
//! The mailbox argument names both the recipient and the mailbox:
//!
//! ```text
//! b64user-mbox <base64 of the user name> <mailbox name>
//! ```
//!
//! The store of the most recent recipient stays open so that a run of
//! deliveries to one user does not reopen it for every message.

use log::info;

use super::defs::*;
use super::mailbox::MailboxSession;
use super::{Connection, Context};
use crate::imap::connection_timer::CommandInput;
use crate::imap::response_writer::CondResponse;
use crate::imap::syntax::{Atom, Node};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

const TARGET_MARKER: &str = "b64user-mbox";

pub struct DeliverySession {
    log_prefix: LogPrefix,
    /// The unique user id and session of the last recipient.
    cached: Option<(String, MailboxSession)>,
}

impl DeliverySession {
    pub(super) fn new(log_prefix: LogPrefix) -> Self {
        DeliverySession {
            log_prefix,
            cached: None,
        }
    }

    pub(super) fn execute<R: CommandInput>(
        &mut self,
        conn: &mut Connection<R>,
        request: &Request<'_>,
    ) -> Result<Reply, Error> {
        match request.kind {
            CommandKind::Noop => Ok(CondResponse::completed("NOOP").into()),
            CommandKind::Login | CommandKind::Authenticate => {
                Ok(CondResponse::no("duplicated login").into())
            }
            CommandKind::Append => self.deliver(conn, request),
            _ => Ok(CondResponse::no(
                "not allowed command on mail delivery user",
            )
            .into()),
        }
    }

    fn deliver<R: CommandInput>(
        &mut self,
        conn: &mut Connection<R>,
        request: &Request<'_>,
    ) -> Result<Reply, Error> {
        let (target, rest) = request
            .args
            .split_first()
            .ok_or_else(|| Error::Syntax("missing mailbox name".to_owned()))?;
        let target = target
            .astring()
            .ok_or_else(|| Error::Syntax("invalid mailbox name".to_owned()))?;
        let (user, mailbox) = parse_target(&target)?;

        let user_id = match conn.cxt.authenticator.unique_user_id(&user) {
            Some(id) => id,
            None => return Ok(CondResponse::no("not found a user").into()),
        };

        let mut session = match self.cached.take() {
            Some((cached_id, session)) if cached_id == user_id => session,
            previous => {
                if let Some((_, session)) = previous {
                    session.dispose(&conn.cxt);
                }

                let holder = conn.open_store(&user_id)?;
                let log_prefix = self.log_prefix.deep_clone();
                log_prefix.set_delivery_target(Some(user.clone()));
                info!("{} Opened store for delivery", log_prefix);
                MailboxSession::new(holder, log_prefix)
            }
        };

        let mut args = Vec::with_capacity(request.args.len());
        args.push(Node::Atom(Atom::Quoted(mailbox.into_bytes())));
        args.extend(rest.iter().cloned());
        let delegated = Request {
            args: &args,
            ..*request
        };

        let result = session.execute(conn, &delegated);
        self.cached = Some((user_id, session));
        result
    }

    pub(super) fn dispose(self, cxt: &Context) {
        if let Some((_, session)) = self.cached {
            session.dispose(cxt);
        }
    }
}

/// Split a delivery target into the user name and the mailbox name.
fn parse_target(target: &str) -> Result<(String, String), Error> {
    let invalid = || {
        Error::InvalidArgument(format!("invalid delivery target: {}", target))
    };

    let mut parts = target.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(TARGET_MARKER), Some(user), Some(mailbox))
            if !mailbox.is_empty() =>
        {
            let user = base64::decode(user)
                .ok()
                .and_then(|user| String::from_utf8(user).ok())
                .ok_or_else(invalid)?;
            Ok((user, mailbox.to_owned()))
        }
        _ => Err(invalid()),
    }
}
