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

//! The write side of a connection.
//!
//! The output stream is shared between the session thread and the IDLE
//! listener, so every write of a complete line happens under one mutex and
//! lines from the two threads never interleave.

use std::fmt;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Ok,
    No,
    Bad,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Cond::Ok => "OK",
            Cond::No => "NO",
            Cond::Bad => "BAD",
        })
    }
}

/// A status response: `OK`, `NO` or `BAD` with an optional response code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondResponse {
    pub cond: Cond,
    /// The text inside `[...]`, if any.
    pub code: Option<String>,
    pub quip: String,
}

impl CondResponse {
    pub fn ok(quip: impl Into<String>) -> Self {
        CondResponse {
            cond: Cond::Ok,
            code: None,
            quip: quip.into(),
        }
    }

    pub fn no(quip: impl Into<String>) -> Self {
        CondResponse {
            cond: Cond::No,
            code: None,
            quip: quip.into(),
        }
    }

    pub fn bad(quip: impl Into<String>) -> Self {
        CondResponse {
            cond: Cond::Bad,
            code: None,
            quip: quip.into(),
        }
    }

    /// `<NAME> completed`
    pub fn completed(name: &str) -> Self {
        Self::ok(format!("{} completed", name))
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for CondResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.cond)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if !self.quip.is_empty() {
            write!(f, " {}", self.quip)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ResponseWriter {
    out: Arc<Mutex<BufWriter<Box<dyn Write + Send>>>>,
}

impl ResponseWriter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        ResponseWriter {
            out: Arc::new(Mutex::new(BufWriter::new(Box::new(out)))),
        }
    }

    /// Write `* <text>`.
    pub fn untagged(&self, text: &str) -> io::Result<()> {
        let mut out = self.lock();
        write!(out, "* {}\r\n", text)
    }

    /// Write a complete, already formatted line, including its line ending.
    pub fn line(&self, line: &[u8]) -> io::Result<()> {
        self.lock().write_all(line)
    }

    /// Write each of `lines` and flush.
    pub fn lines(&self, lines: &[Vec<u8>]) -> io::Result<()> {
        let mut out = self.lock();
        for line in lines {
            out.write_all(line)?;
        }
        out.flush()
    }

    /// Write `+ <prompt>` and flush.
    pub fn continuation(&self, prompt: &str) -> io::Result<()> {
        let mut out = self.lock();
        write!(out, "+ {}\r\n", prompt)?;
        out.flush()
    }

    /// Write the final response to a command and flush.
    pub fn tagged(&self, tag: &str, response: &CondResponse) -> io::Result<()> {
        let mut out = self.lock();
        write!(out, "{} {}\r\n", tag, response)?;
        out.flush()
    }

    /// Write `* OK ...` or similar, flushing.
    pub fn untagged_cond(&self, response: &CondResponse) -> io::Result<()> {
        let mut out = self.lock();
        write!(out, "* {}\r\n", response)?;
        out.flush()
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<Box<dyn Write + Send>>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
