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

//! The per-connection session state machine.
//!
//! A `Decoder` owns one connection. It greets the client, then repeatedly
//! waits for a command, reads it, resolves it to a `CommandKind` and hands it
//! to the active `Session`. Each session applies the guards of the command's
//! `Route` (state, lock, folder) before running the handler; whatever error
//! the handler returns is turned into the tagged response here, so that only
//! transport failures end the connection.

use std::io::Write;
use std::mem;
use std::sync::Arc;

use log::{error, info, warn};

use self::defs::*;
use self::delivery::DeliverySession;
use self::mailbox::MailboxSession;
use super::connection_timer::{CommandInput, ConnectionLimits, ConnectionTimer};
use super::request_reader::RequestReader;
use super::response_writer::{CondResponse, ResponseWriter};
use super::syntax::Command;
use crate::auth::Authenticator;
use crate::store::pool::{StoreHolder, StorePool};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

pub mod defs;
mod delivery;
mod idle;
mod initial;
mod mailbox;
mod messages;

/// Everything shared by all connections of one server.
pub struct Context {
    pub config: SystemConfig,
    pub pool: Arc<StorePool>,
    pub authenticator: Arc<dyn Authenticator>,
    pub limits: ConnectionLimits,
}

impl Context {
    pub fn new(
        config: SystemConfig,
        pool: Arc<StorePool>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let limits = ConnectionLimits::new(&config.connection);
        Context {
            config,
            pool,
            authenticator,
            limits,
        }
    }
}

/// The active state of a connection.
pub enum Session {
    /// Not authenticated.
    Initial,
    Mailbox(MailboxSession),
    /// Authenticated as the mail delivery user.
    Delivery(DeliverySession),
}

/// The transport side of a connection, used by every session state.
pub(super) struct Connection<R> {
    reader: RequestReader<R>,
    timer: ConnectionTimer,
    out: ResponseWriter,
    cxt: Arc<Context>,
    log_prefix: LogPrefix,
}

pub struct Decoder<R> {
    conn: Connection<R>,
    session: Session,
}

impl<R: CommandInput> Decoder<R> {
    pub fn new(
        input: R,
        output: impl Write + Send + 'static,
        cxt: Arc<Context>,
        log_prefix: LogPrefix,
    ) -> Self {
        Decoder {
            conn: Connection {
                reader: RequestReader::new(input, cxt.config.protocol.clone()),
                timer: ConnectionTimer::new(cxt.limits.clone()),
                out: ResponseWriter::new(output),
                cxt,
                log_prefix,
            },
            session: Session::Initial,
        }
    }

    /// Serve the connection until the client logs out, disconnects or times
    /// out, then release everything the session holds.
    pub fn run(mut self) -> Result<(), Error> {
        let result = self.serve();
        if let Err(ref e) = result {
            warn!("{} Connection failed: {}", self.conn.log_prefix, e);
        }

        let session = mem::replace(&mut self.session, Session::Initial);
        self.conn.dispose(session);
        info!("{} Connection closed", self.conn.log_prefix);
        result
    }

    fn serve(&mut self) -> Result<(), Error> {
        self.conn.out.untagged_cond(&CondResponse::ok(TAGLINE))?;

        loop {
            if !self.conn.timer.command_wait(self.conn.reader.get_mut())? {
                self.conn.autologout()?;
                self.conn.out.flush()?;
                return Ok(());
            }

            let command = match self.conn.reader.read_command(&self.conn.out) {
                Ok(Some(command)) => command,
                Ok(None) => return Ok(()),
                Err(Error::Io(e)) => return Err(Error::Io(e)),
                Err(e) => {
                    self.reject(&e)?;
                    continue;
                }
            };

            if !self.execute(&command)? {
                return Ok(());
            }
        }
    }

    /// Answer a command which could not be read.
    fn reject(&self, e: &Error) -> Result<(), Error> {
        info!("{} Rejected command: {}", self.conn.log_prefix, e);
        let response = CondResponse::bad(e.to_string());
        match e.request_tag() {
            Some(tag) => self.conn.out.tagged(tag, &response)?,
            None => self.conn.out.untagged_cond(&response)?,
        }
        Ok(())
    }

    /// Execute one command, returning whether to continue with the next.
    fn execute(&mut self, command: &Command) -> Result<bool, Error> {
        let request = match Request::resolve(command) {
            Some(request) => request,
            None => {
                self.conn
                    .out
                    .tagged(&command.tag, &CondResponse::bad("unknown command"))?;
                return Ok(true);
            }
        };

        let reply = match self.dispatch(&request) {
            Ok(reply) => reply,
            Err(e) => self.conn.error_response(e)?.into(),
        };

        if let Session::Mailbox(ref session) = self.session {
            session.flush_pending(&self.conn.out)?;
        }
        self.conn.out.tagged(request.tag, &reply.response)?;

        match reply.transition {
            Transition::Stay => Ok(true),
            Transition::LogOut => Ok(false),
            Transition::Become(session) => {
                let old = mem::replace(&mut self.session, session);
                self.conn.dispose(old);
                Ok(true)
            }
        }
    }

    fn dispatch(&mut self, request: &Request<'_>) -> Result<Reply, Error> {
        match request.kind {
            CommandKind::Capability => return self.capability(),
            CommandKind::Logout => return self.logout(),
            _ => (),
        }

        match self.session {
            Session::Initial => initial::execute(&mut self.conn, request),
            Session::Mailbox(ref mut session) => {
                session.execute(&mut self.conn, request)
            }
            Session::Delivery(ref mut session) => {
                session.execute(&mut self.conn, request)
            }
        }
    }

    fn capability(&self) -> Result<Reply, Error> {
        let mut caps = CAPABILITIES
            .iter()
            .map(|&c| c.to_owned())
            .collect::<Vec<_>>();
        caps.extend(self.conn.cxt.authenticator.capabilities());
        if let Session::Delivery(_) = self.session {
            caps.push(DELIVERY_CAPABILITY.to_owned());
        }

        self.conn
            .out
            .untagged(&format!("CAPABILITY {}", caps.join(" ")))?;
        Ok(CondResponse::completed("CAPABILITY").into())
    }

    fn logout(&self) -> Result<Reply, Error> {
        self.conn.out.untagged("BYE server logout")?;
        Ok(Reply {
            response: CondResponse::completed("LOGOUT"),
            transition: Transition::LogOut,
        })
    }
}

impl<R: CommandInput> Connection<R> {
    /// Convert a handler error into the tagged response.
    ///
    /// I/O errors are passed through since the connection is unusable.
    fn error_response(&self, e: Error) -> Result<CondResponse, Error> {
        match e {
            Error::Io(_) => Err(e),

            Error::Syntax(_)
            | Error::InvalidArgument(_)
            | Error::BadCommandLine { .. }
            | Error::LineTooLong { .. }
            | Error::LiteralTooLarge { .. }
            | Error::CommandTooLarge { .. }
            | Error::ReadLockTimeout(_)
            | Error::WriteLockTimeout(_)
            | Error::DeletedFolder => {
                info!("{} Command failed: {}", self.log_prefix, e);
                Ok(CondResponse::bad(e.to_string()))
            }

            Error::NxMailbox | Error::MailboxExists | Error::NxMessage => {
                Ok(CondResponse::no(e.to_string()))
            }

            Error::Store(_) | Error::Ssl(_) => {
                error!("{} Internal error: {}", self.log_prefix, e);
                Ok(CondResponse::bad("internal server error"))
            }
        }
    }
}

impl<R> Connection<R> {
    fn autologout(&self) -> Result<(), Error> {
        info!("{} Idle timeout", self.log_prefix);
        self.out
            .untagged("BYE server autologout: idle for too long")?;
        Ok(())
    }

    /// Acquire the pooled store of `user_id`, recovering it first if a
    /// previous process left a transaction unfinished.
    fn open_store(&self, user_id: &str) -> Result<Arc<StoreHolder>, Error> {
        let holder = self.cxt.pool.acquire(user_id)?;
        if holder.store().aborted_transaction() {
            if let Err(e) = self.recover(&holder) {
                let timeout = self.cxt.config.lock.cleanup_write_lock_timeout();
                self.cxt.pool.release_detached(holder, timeout);
                return Err(e);
            }
        }

        Ok(holder)
    }

    fn recover(&self, holder: &StoreHolder) -> Result<(), Error> {
        warn!(
            "{} Recovering store of {} after an aborted transaction",
            self.log_prefix,
            holder.user_id()
        );
        self.out.untagged_cond(
            &CondResponse::ok("start user data recovery.").with_code("ALERT"),
        )?;

        {
            let _lock = holder
                .lock()
                .write(self.cxt.config.lock.write_lock_timeout())?;
            // Another session may have finished the recovery while we waited
            if holder.store().aborted_transaction() {
                holder.store().recover()?;
            }
        }

        self.out
            .untagged_cond(&CondResponse::ok("completed user data recovery."))?;
        info!("{} Recovery complete", self.log_prefix);
        Ok(())
    }

    /// Release what `session` holds.
    fn dispose(&self, session: Session) {
        match session {
            Session::Initial => (),
            Session::Mailbox(session) => session.dispose(&self.cxt),
            Session::Delivery(session) => session.dispose(&self.cxt),
        }
    }
}
