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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A command or one of its arguments is malformed.
    #[error("{0}")]
    Syntax(String),
    /// A well-formed argument whose value makes no sense.
    #[error("{0}")]
    InvalidArgument(String),
    /// A command line could not be tokenised or parsed.
    ///
    /// `tag` is set if the tag was still recoverable.
    #[error("{reason}")]
    BadCommandLine { tag: Option<String>, reason: String },
    #[error("too long command line")]
    LineTooLong { tag: Option<String> },
    #[error("too large literal")]
    LiteralTooLarge { tag: Option<String> },
    #[error("too large command")]
    CommandTooLarge { tag: Option<String> },
    #[error("read-lock timeout over {0} seconds")]
    ReadLockTimeout(f64),
    #[error("write-lock timeout over {0} seconds")]
    WriteLockTimeout(f64),
    #[error("deleted folder")]
    DeletedFolder,
    #[error("not found a mailbox")]
    NxMailbox,
    #[error("duplicated mailbox")]
    MailboxExists,
    #[error("not found a message")]
    NxMessage,
    #[error("store error: {0}")]
    Store(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
}

impl Error {
    /// The tag of the command that caused this error, for the errors raised
    /// while the command itself was still being read.
    pub fn request_tag(&self) -> Option<&str> {
        match *self {
            Error::BadCommandLine { ref tag, .. }
            | Error::LineTooLong { ref tag }
            | Error::LiteralTooLarge { ref tag }
            | Error::CommandTooLarge { ref tag } => tag.as_deref(),
            _ => None,
        }
    }

}
