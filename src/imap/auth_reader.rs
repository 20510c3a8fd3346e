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

//! The client side of an `AUTHENTICATE` exchange.
//!
//! Every challenge and response travels base64-encoded on its own line. A
//! response that fails to decode counts as a failed authentication rather
//! than a protocol error.

use std::io;

use log::info;

use super::request_reader::RequestReader;
use super::response_writer::ResponseWriter;
use crate::auth::Authenticator;
use crate::imap::connection_timer::CommandInput;
use crate::support::error::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The exchange succeeded for this user name.
    Authenticated(String),
    /// The client sent `*`.
    Cancelled,
    Failed,
}

pub struct AuthenticationReader<'a, R> {
    reader: &'a mut RequestReader<R>,
    out: &'a ResponseWriter,
    authenticator: &'a dyn Authenticator,
}

impl<'a, R: CommandInput> AuthenticationReader<'a, R> {
    pub fn new(
        reader: &'a mut RequestReader<R>,
        out: &'a ResponseWriter,
        authenticator: &'a dyn Authenticator,
    ) -> Self {
        AuthenticationReader {
            reader,
            out,
            authenticator,
        }
    }

    /// Run the exchange for `mechanism`.
    ///
    /// `initial_response` is the SASL-IR argument of the command, if any,
    /// still base64-encoded. `=` stands for an empty response.
    pub fn authenticate(
        &mut self,
        mechanism: &str,
        initial_response: Option<&[u8]>,
    ) -> Result<AuthOutcome, Error> {
        if "PLAIN".eq_ignore_ascii_case(mechanism) {
            self.plain(initial_response)
        } else if "CRAM-MD5".eq_ignore_ascii_case(mechanism) {
            self.cram_md5()
        } else {
            Err(Error::InvalidArgument(format!(
                "unsupported mechanism: {}",
                mechanism
            )))
        }
    }

    fn plain(
        &mut self,
        initial_response: Option<&[u8]>,
    ) -> Result<AuthOutcome, Error> {
        let response = match initial_response {
            Some(b"=") => Response::Data(Vec::new()),
            Some(b"*") => Response::Cancelled,
            Some(inline) => decode(inline),
            None => self.challenge("")?,
        };

        Ok(match response {
            Response::Cancelled => AuthOutcome::Cancelled,
            Response::Undecodable => AuthOutcome::Failed,
            Response::Data(data) => {
                match self.authenticator.authenticate_plain(&data) {
                    Some(user) => AuthOutcome::Authenticated(user),
                    None => AuthOutcome::Failed,
                }
            }
        })
    }

    fn cram_md5(&mut self) -> Result<AuthOutcome, Error> {
        let challenge = self.authenticator.cram_md5_challenge();
        let response = self.challenge(&base64::encode(&challenge))?;

        Ok(match response {
            Response::Cancelled => AuthOutcome::Cancelled,
            Response::Undecodable => AuthOutcome::Failed,
            Response::Data(data) => {
                match self.authenticator.authenticate_cram_md5(&challenge, &data)
                {
                    Some(user) => AuthOutcome::Authenticated(user),
                    None => AuthOutcome::Failed,
                }
            }
        })
    }

    /// Send `challenge` (already encoded) and read the response line.
    fn challenge(&mut self, challenge: &str) -> Result<Response, Error> {
        self.out.continuation(challenge)?;
        match self.reader.read_line()? {
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "end of stream during authentication",
            ))),
            Some(line) => {
                let line = trim(&line);
                if b"*" == line {
                    Ok(Response::Cancelled)
                } else {
                    Ok(decode(line))
                }
            }
        }
    }
}

enum Response {
    Cancelled,
    Undecodable,
    Data(Vec<u8>),
}

fn decode(encoded: &[u8]) -> Response {
    match base64::decode(trim(encoded)) {
        Ok(data) => Response::Data(data),
        Err(e) => {
            info!("Undecodable authentication response: {}", e);
            Response::Undecodable
        }
    }
}

fn trim(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(s.len());
    let end = s
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |ix| ix + 1);
    &s[start..end]
}
