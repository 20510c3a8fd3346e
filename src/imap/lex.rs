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

//! Utilities for *writing* values under IMAP's "lexical rules".
//!
//! Reading is handled by `syntax`, since the lexical syntax of commands is
//! not separable from their grammar.
//!
//! # Encoding Decisions
//!
//! Given the choice between encoding a string as an atom or some other form,
//! we only use an atom if all characters are in the set
//! `a-zA-Z0-9?=+/_.-` and the string is not "NIL".
//!
//! Given the choice between a quoted string and a literal, we only choose the
//! quoted string if it is less than 100 bytes long and contains no controls,
//! backslash, double-quote or 8-bit bytes.

use std::io::{self, Write};

use chrono::prelude::*;

use crate::store::FlagSet;

#[derive(Debug)]
pub struct LexWriter<W> {
    writer: W,
}

impl<W: Write> LexWriter<W> {
    pub fn new(writer: W) -> Self {
        LexWriter { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn verbatim(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())
    }

    pub fn nil(&mut self) -> io::Result<()> {
        self.verbatim("NIL")
    }

    pub fn num(&mut self, value: u64) -> io::Result<()> {
        write!(self.writer, "{}", value)
    }

    /// Write `s` as an atom if possible, else as a string.
    pub fn astring(&mut self, s: &str) -> io::Result<()> {
        if is_conservative_atom(s) {
            self.verbatim(s)
        } else {
            self.string(s.as_bytes())
        }
    }

    /// Write `s` as a quoted string if possible, else as a literal.
    pub fn string(&mut self, s: &[u8]) -> io::Result<()> {
        if is_quotable(s) {
            self.writer.write_all(b"\"")?;
            self.writer.write_all(s)?;
            self.writer.write_all(b"\"")
        } else {
            self.literal(s)
        }
    }

    pub fn nstring(&mut self, s: Option<&[u8]>) -> io::Result<()> {
        match s {
            None => self.nil(),
            Some(s) => self.string(s),
        }
    }

    pub fn literal(&mut self, data: &[u8]) -> io::Result<()> {
        write!(self.writer, "{{{}}}\r\n", data.len())?;
        self.writer.write_all(data)
    }

    /// Write `(\Flag \Flag ...)`.
    pub fn flags(&mut self, flags: FlagSet) -> io::Result<()> {
        self.writer.write_all(b"(")?;
        for (ix, flag) in flags.iter().enumerate() {
            if ix > 0 {
                self.writer.write_all(b" ")?;
            }
            write!(self.writer, "{}", flag)?;
        }
        self.writer.write_all(b")")
    }

    pub fn datetime(
        &mut self,
        datetime: &DateTime<FixedOffset>,
    ) -> io::Result<()> {
        write!(
            self.writer,
            "\"{}\"",
            datetime.format("%_d-%b-%Y %H:%M:%S %z")
        )
    }
}

pub fn is_conservative_atom(s: &str) -> bool {
    !"nil".eq_ignore_ascii_case(s)
        && !s.is_empty()
        && s.bytes().all(|b| {
            matches!(b,
                b'a'..=b'z'
                | b'A'..=b'Z'
                | b'0'..=b'9'
                | b'='
                | b'?'
                | b'/'
                | b'+'
                | b'_'
                | b'.'
                | b'-')
        })
}

pub fn is_quotable(s: &[u8]) -> bool {
    s.len() < 100
        && s.iter().copied().all(|b| match b {
            0..=31 | 127..=255 | b'\\' | b'"' => false,
            _ => true,
        })
}
