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

//! The IDLE command (RFC 2177).

use std::thread;

use log::{info, warn};

use super::defs::*;
use super::mailbox::MailboxSession;
use super::Connection;
use crate::imap::connection_timer::CommandInput;
use crate::imap::response_writer::CondResponse;
use crate::imap::syntax::Args;
use crate::store::multicast::Notice;
use crate::support::error::Error;

impl MailboxSession {
    /// Forward pushes from other sessions until the client sends `DONE`.
    ///
    /// A listener thread writes pushed lines while this thread blocks reading
    /// the client. Stopping the listener queues a wake-up marker behind
    /// everything already pushed, so nothing queued before the client's
    /// line is lost and anything after it waits for the next command.
    ///
    /// The wait for `DONE` is bounded by the command wait timeout like any
    /// other command.
    pub(super) fn idle<R: CommandInput>(
        &mut self,
        conn: &mut Connection<R>,
        request: &Request<'_>,
    ) -> Result<Reply, Error> {
        Args::new(request.args).finish()?;
        let folder = match self.folder {
            Some(ref folder) => folder,
            None => return Ok(CondResponse::no("not selected").into()),
        };

        conn.out.continuation("idling")?;
        let pending = folder.take_pending();
        if !pending.is_empty() {
            conn.out.lines(&pending)?;
        }

        let receiver = folder.subscription().receiver();
        let waker = folder.subscription().waker();
        let out = conn.out.clone();
        let log_prefix = self.log_prefix.clone();
        let listener = thread::Builder::new()
            .name("idle-listener".to_owned())
            .spawn(move || {
                for notice in receiver.iter() {
                    match notice {
                        Notice::Wakeup => break,
                        Notice::Line(line) => {
                            if let Err(e) = out.lines(&[line]) {
                                warn!("{} IDLE push failed: {}", log_prefix, e);
                                break;
                            }
                        }
                    }
                }
            })?;

        info!("{} Idling", self.log_prefix);
        let line = match conn.timer.command_wait(conn.reader.get_mut()) {
            Ok(true) => Some(conn.reader.read_line()),
            Ok(false) => None,
            Err(e) => Some(Err(Error::Io(e))),
        };

        waker.wake();
        if listener.join().is_err() {
            warn!("{} IDLE listener panicked", self.log_prefix);
        }

        let line = match line {
            Some(line) => line,
            None => {
                conn.autologout()?;
                return Ok(Reply {
                    response: CondResponse::ok("IDLE terminated"),
                    transition: Transition::LogOut,
                });
            }
        };

        match line {
            Ok(Some(ref done)) if done.eq_ignore_ascii_case(b"DONE") => {
                Ok(CondResponse::ok("IDLE terminated").into())
            }
            Ok(_) => {
                Ok(CondResponse::bad("unexpected client response to IDLE").into())
            }
            Err(Error::Io(e)) => Err(Error::Io(e)),
            Err(e) => {
                info!("{} Bad IDLE response: {}", self.log_prefix, e);
                Ok(CondResponse::bad("unexpected client response to IDLE").into())
            }
        }
    }
}
