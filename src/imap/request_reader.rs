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

//! Reading whole commands off the wire.
//!
//! A command is one physical line, plus, for every line ending with a
//! literal marker `{n}`, a continuation prompt, exactly `n` bytes of literal
//! and the next physical line. All three limits in `ProtocolConfig` are
//! checked before the client is asked for more data, so a client is never
//! invited to send a literal the server is going to refuse.

use std::io::{self, BufRead};

use super::response_writer::ResponseWriter;
use super::syntax::{self as s, Atom, Command};
use crate::support::error::Error;
use crate::support::system_config::ProtocolConfig;

pub const CONTINUE_PROMPT: &str = "continue-req";

pub struct RequestReader<R> {
    input: R,
    limits: ProtocolConfig,
}

enum RawLine {
    Eof,
    /// A complete line without its line ending.
    Line(Vec<u8>),
    /// A line over the length limit. The line has been consumed; only its
    /// start is kept.
    TooLong(Vec<u8>),
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(input: R, limits: ProtocolConfig) -> Self {
        RequestReader { input, limits }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    /// Read one physical line, without its line ending.
    ///
    /// Returns `None` at end of stream.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, Error> {
        match self.read_raw_line()? {
            RawLine::Eof => Ok(None),
            RawLine::Line(line) => Ok(Some(line)),
            RawLine::TooLong(_) => Err(Error::LineTooLong { tag: None }),
        }
    }

    /// Read and parse one command.
    ///
    /// Blank lines before the command are skipped. Returns `None` if the
    /// stream ends before a command starts. If the stream ends within a
    /// command, the result is an `Io` error, since the connection is no
    /// longer usable.
    pub fn read_command(
        &mut self,
        out: &ResponseWriter,
    ) -> Result<Option<Command>, Error> {
        let mut atoms = Vec::<Atom>::new();
        let mut tag: Option<String> = None;
        let mut total = 0usize;

        loop {
            let line = match self.read_raw_line()? {
                RawLine::Eof if atoms.is_empty() && tag.is_none() => {
                    return Ok(None)
                }
                RawLine::Eof => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "end of stream within command",
                    )))
                }
                RawLine::TooLong(prefix) => {
                    return Err(Error::LineTooLong {
                        tag: tag.or_else(|| recover_tag(&prefix)),
                    })
                }
                RawLine::Line(line) => line,
            };

            if tag.is_none() && line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if tag.is_none() {
                tag = recover_tag(&line);
            }

            total += line.len() + 2;
            if total > self.limits.command_size_limit {
                return Err(Error::CommandTooLarge { tag });
            }

            let mut line_atoms =
                s::lex_line(&line).map_err(|e| Error::BadCommandLine {
                    tag: tag.clone(),
                    reason: e.to_string(),
                })?;

            let size = match line_atoms.last() {
                Some(&Atom::LiteralMarker(size)) => size,
                _ => {
                    atoms.extend(line_atoms);
                    break;
                }
            };
            line_atoms.pop();
            atoms.extend(line_atoms);

            if size > self.limits.literal_size_limit as u64 {
                return Err(Error::LiteralTooLarge { tag });
            }
            total += size as usize;
            if total > self.limits.command_size_limit {
                return Err(Error::CommandTooLarge { tag });
            }

            out.continuation(CONTINUE_PROMPT)?;
            let mut literal = vec![0u8; size as usize];
            self.input.read_exact(&mut literal)?;
            atoms.push(Atom::Quoted(literal));
        }

        s::parse_command(atoms).map(Some)
    }

    fn read_raw_line(&mut self) -> io::Result<RawLine> {
        let limit = self.limits.line_length_limit;
        let mut line = Vec::new();
        let mut too_long = false;
        let mut saw_any = false;

        loop {
            let (consumed, done) = {
                let buf = match self.input.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if io::ErrorKind::Interrupted == e.kind() => {
                        continue
                    }
                    Err(e) => return Err(e),
                };

                if buf.is_empty() {
                    break;
                }
                saw_any = true;

                let (chunk, consumed, done) = match memchr::memchr(b'\n', buf)
                {
                    Some(ix) => (&buf[..ix], ix + 1, true),
                    None => (buf, buf.len(), false),
                };

                if !too_long {
                    // +1 leaves room for a CR which turns out to be part of
                    // the line ending
                    if line.len() + chunk.len() > limit + 1 {
                        let room = (limit + 1).saturating_sub(line.len());
                        line.extend_from_slice(&chunk[..room.min(chunk.len())]);
                        too_long = true;
                    } else {
                        line.extend_from_slice(chunk);
                    }
                }

                (consumed, done)
            };

            self.input.consume(consumed);
            if done {
                break;
            }
        }

        if !saw_any {
            return Ok(RawLine::Eof);
        }

        if !too_long && line.ends_with(b"\r") {
            line.pop();
        }

        if too_long || line.len() > limit {
            Ok(RawLine::TooLong(line))
        } else {
            Ok(RawLine::Line(line))
        }
    }
}

/// Extract the tag from the start of a raw line, if it looks like one.
fn recover_tag(line: &[u8]) -> Option<String> {
    let end = line
        .iter()
        .position(|&b| b' ' == b)
        .unwrap_or(line.len());
    let tag = &line[..end];

    if tag.is_empty()
        || b'*' == tag[0]
        || b'+' == tag[0]
        || !tag
            .iter()
            .all(|&b| b.is_ascii_graphic() && !b"()[]\"{".contains(&b))
    {
        None
    } else {
        Some(String::from_utf8_lossy(tag).into_owned())
    }
}
