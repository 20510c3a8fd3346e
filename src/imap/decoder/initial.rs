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

//! The unauthenticated state.

use log::{info, warn};

use super::defs::*;
use super::delivery::DeliverySession;
use super::mailbox::MailboxSession;
use super::{Connection, Session};
use crate::imap::auth_reader::{AuthOutcome, AuthenticationReader};
use crate::imap::connection_timer::CommandInput;
use crate::imap::response_writer::CondResponse;
use crate::imap::syntax::Args;
use crate::support::error::Error;

pub(super) fn execute<R: CommandInput>(
    conn: &mut Connection<R>,
    request: &Request<'_>,
) -> Result<Reply, Error> {
    match request.kind {
        CommandKind::Noop => Ok(CondResponse::completed("NOOP").into()),
        CommandKind::Login => login(conn, request),
        CommandKind::Authenticate => authenticate(conn, request),
        _ => Ok(CondResponse::no("not authenticated").into()),
    }
}

fn login<R: CommandInput>(
    conn: &mut Connection<R>,
    request: &Request<'_>,
) -> Result<Reply, Error> {
    let mut args = Args::new(request.args);
    let user = args.astring("user name")?;
    let password = args.astring("password")?;
    args.finish()?;

    match conn.cxt.authenticator.authenticate_login(&user, &password) {
        Some(user) => authenticated(conn, user, "LOGIN"),
        None => {
            warn!("{} LOGIN failed for {}", conn.log_prefix, user);
            Ok(CondResponse::no("authentication failed").into())
        }
    }
}

fn authenticate<R: CommandInput>(
    conn: &mut Connection<R>,
    request: &Request<'_>,
) -> Result<Reply, Error> {
    let mut args = Args::new(request.args);
    let mechanism = args.word("mechanism")?;
    let initial_response = match args.next() {
        None => None,
        Some(node) => Some(node.astring_bytes().ok_or_else(|| {
            Error::Syntax("invalid initial response".to_owned())
        })?),
    };
    args.finish()?;

    if !conn.cxt.authenticator.supports_mechanism(mechanism) {
        return Ok(CondResponse::bad(format!(
            "unsupported mechanism: {}",
            mechanism
        ))
        .into());
    }

    let cxt = std::sync::Arc::clone(&conn.cxt);
    let outcome = AuthenticationReader::new(
        &mut conn.reader,
        &conn.out,
        &*cxt.authenticator,
    )
    .authenticate(mechanism, initial_response)?;

    match outcome {
        AuthOutcome::Authenticated(user) => {
            authenticated(conn, user, "AUTHENTICATE")
        }
        AuthOutcome::Cancelled => {
            Ok(CondResponse::bad("authentication cancelled").into())
        }
        AuthOutcome::Failed => {
            warn!("{} AUTHENTICATE {} failed", conn.log_prefix, mechanism);
            Ok(CondResponse::no("authentication failed").into())
        }
    }
}

/// Move on from the initial state once `user` has proven their identity.
fn authenticated<R>(
    conn: &mut Connection<R>,
    user: String,
    command: &str,
) -> Result<Reply, Error> {
    let completed = CondResponse::completed(command);

    if user == conn.cxt.config.authentication.mail_delivery_user {
        info!("{} Mail delivery user {} logged in", conn.log_prefix, user);
        conn.log_prefix.set_user(user);
        let session = DeliverySession::new(conn.log_prefix.clone());
        return Ok(Reply::become_(completed, Session::Delivery(session)));
    }

    let user_id = match conn.cxt.authenticator.unique_user_id(&user) {
        Some(id) => id,
        None => {
            warn!("{} No store identity for {}", conn.log_prefix, user);
            return Ok(CondResponse::no("authentication failed").into());
        }
    };

    let holder = conn.open_store(&user_id)?;
    conn.log_prefix.set_user(user);
    info!("{} Logged in", conn.log_prefix);
    let session = MailboxSession::new(holder, conn.log_prefix.clone());
    Ok(Reply::become_(completed, Session::Mailbox(session)))
}
