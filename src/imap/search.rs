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

//! Compilation of SEARCH key lists.
//!
//! Arguments are first parsed into a `SearchKey` tree, then compiled into a
//! single `Predicate`. A key list is compiled from the right: the end of the
//! list is a predicate which always matches, and each key wraps the
//! predicate for everything after it, only invoking it if the key itself
//! matched. Operands of `NOT` and `OR` are compiled on their own against the
//! same always-true end, so they are never chained to their neighbours.

use chrono::prelude::*;
use encoding_rs::Encoding;
use regex::{Regex, RegexBuilder};

use super::folder::{looks_like_seq_set, MessageCache, MessageRef, SeqSet};
use super::syntax::{self as s, Args, Node};
use crate::mime::{encoding, Message};
use crate::store::{Flag, FlagSet};
use crate::support::error::Error;

#[derive(Clone, Debug)]
pub enum SearchKey {
    All,
    /// A flag test: matches if the flag's presence equals the `bool`.
    Flag(Flag, bool),
    New,
    Old,
    /// `KEYWORD` (`true`) or `UNKEYWORD` (`false`). Keywords are never
    /// stored, so no message has any.
    Keyword(bool),
    /// A header field and the text to look for in it.
    Header(String, String),
    Body(String),
    Text(String),
    Date(DateField, DateOp, NaiveDate),
    Larger(u64),
    Smaller(u64),
    Sequence(SeqSet),
    Uid(SeqSet),
    Not(Box<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    And(Vec<SearchKey>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateField {
    Internal,
    Sent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateOp {
    Before,
    On,
    Since,
}

/// The result of compiling a key list.
pub type Predicate =
    Box<dyn Fn(&MessageCache<'_>, MessageRef) -> Result<bool, Error>>;

/// Values needed to make sense of the key list in the selected folder.
#[derive(Clone, Copy, Debug)]
pub struct SearchContext {
    pub max_seq: u32,
    pub max_uid: u32,
}

/// Parse the arguments of SEARCH (after `UID`, if present).
pub fn parse(
    args: &[Node],
    cxt: SearchContext,
) -> Result<Vec<SearchKey>, Error> {
    let mut args = Args::new(args);
    let mut charset: Option<&'static Encoding> = None;

    if let Some(word) = args.peek().and_then(Node::word) {
        if "CHARSET".eq_ignore_ascii_case(word) {
            args.next();
            let label = args.astring("charset")?;
            charset = Some(encoding::charset(&label).ok_or_else(|| {
                Error::InvalidArgument(format!("unsupported charset: {}", label))
            })?);
        }
    }

    let parser = KeyParser { cxt, charset };
    let keys = parser.list(&mut args)?;
    if keys.is_empty() {
        return Err(Error::Syntax("missing search key".to_owned()));
    }
    Ok(keys)
}

struct KeyParser {
    cxt: SearchContext,
    charset: Option<&'static Encoding>,
}

impl KeyParser {
    fn list(&self, args: &mut Args<'_>) -> Result<Vec<SearchKey>, Error> {
        let mut keys = Vec::new();
        while !args.is_empty() {
            keys.push(self.key(args)?);
        }
        Ok(keys)
    }

    fn key(&self, args: &mut Args<'_>) -> Result<SearchKey, Error> {
        let node = args.node("search key")?;
        if let Some(group) = node.group() {
            let keys = self.list(&mut Args::new(group))?;
            if keys.is_empty() {
                return Err(Error::Syntax("empty search group".to_owned()));
            }
            return Ok(SearchKey::And(keys));
        }

        let word = node.word().ok_or_else(|| {
            Error::Syntax("invalid search key".to_owned())
        })?;

        if looks_like_seq_set(word) {
            return Ok(SearchKey::Sequence(self.seq_set(word, self.cxt.max_seq)?));
        }

        let key = match &*word.to_ascii_uppercase() {
            "ALL" => SearchKey::All,
            "ANSWERED" => SearchKey::Flag(Flag::Answered, true),
            "DELETED" => SearchKey::Flag(Flag::Deleted, true),
            "DRAFT" => SearchKey::Flag(Flag::Draft, true),
            "FLAGGED" => SearchKey::Flag(Flag::Flagged, true),
            "RECENT" => SearchKey::Flag(Flag::Recent, true),
            "SEEN" => SearchKey::Flag(Flag::Seen, true),
            "UNANSWERED" => SearchKey::Flag(Flag::Answered, false),
            "UNDELETED" => SearchKey::Flag(Flag::Deleted, false),
            "UNDRAFT" => SearchKey::Flag(Flag::Draft, false),
            "UNFLAGGED" => SearchKey::Flag(Flag::Flagged, false),
            "UNSEEN" => SearchKey::Flag(Flag::Seen, false),
            "NEW" => SearchKey::New,
            "OLD" => SearchKey::Old,
            "KEYWORD" => {
                args.word("keyword")?;
                SearchKey::Keyword(true)
            }
            "UNKEYWORD" => {
                args.word("keyword")?;
                SearchKey::Keyword(false)
            }
            "BCC" => SearchKey::Header("Bcc".to_owned(), self.string(args)?),
            "CC" => SearchKey::Header("Cc".to_owned(), self.string(args)?),
            "FROM" => SearchKey::Header("From".to_owned(), self.string(args)?),
            "TO" => SearchKey::Header("To".to_owned(), self.string(args)?),
            "SUBJECT" => {
                SearchKey::Header("Subject".to_owned(), self.string(args)?)
            }
            "HEADER" => {
                let name = args.astring("header name")?.into_owned();
                SearchKey::Header(name, self.string(args)?)
            }
            "BODY" => SearchKey::Body(self.string(args)?),
            "TEXT" => SearchKey::Text(self.string(args)?),
            "BEFORE" => self.date(args, DateField::Internal, DateOp::Before)?,
            "ON" => self.date(args, DateField::Internal, DateOp::On)?,
            "SINCE" => self.date(args, DateField::Internal, DateOp::Since)?,
            "SENTBEFORE" => self.date(args, DateField::Sent, DateOp::Before)?,
            "SENTON" => self.date(args, DateField::Sent, DateOp::On)?,
            "SENTSINCE" => self.date(args, DateField::Sent, DateOp::Since)?,
            "LARGER" => SearchKey::Larger(args.number("size")?),
            "SMALLER" => SearchKey::Smaller(args.number("size")?),
            "UID" => {
                let set = args.word("UID set")?;
                SearchKey::Uid(self.seq_set(set, self.cxt.max_uid)?)
            }
            "NOT" => SearchKey::Not(Box::new(self.key(args)?)),
            "OR" => {
                let a = self.key(args)?;
                let b = self.key(args)?;
                SearchKey::Or(Box::new(a), Box::new(b))
            }
            _ => {
                return Err(Error::Syntax(format!(
                    "unknown search key: {}",
                    word
                )))
            }
        };

        Ok(key)
    }

    fn seq_set(&self, raw: &str, splat: u32) -> Result<SeqSet, Error> {
        SeqSet::parse(raw, splat).ok_or_else(|| {
            Error::Syntax(format!("invalid sequence set: {}", raw))
        })
    }

    fn string(&self, args: &mut Args<'_>) -> Result<String, Error> {
        let raw = args.astring_bytes("search string")?;
        Ok(match self.charset {
            Some(charset) => charset.decode_with_bom_removal(raw).0.into_owned(),
            None => String::from_utf8_lossy(raw).into_owned(),
        })
    }

    fn date(
        &self,
        args: &mut Args<'_>,
        field: DateField,
        op: DateOp,
    ) -> Result<SearchKey, Error> {
        let date = s::parse_date(&args.astring("date")?)?;
        Ok(SearchKey::Date(field, op, date))
    }
}

/// Compile `keys` into one predicate which matches if every key matches.
pub fn compile(keys: Vec<SearchKey>) -> Result<Predicate, Error> {
    let mut next: Predicate = Box::new(|_, _| Ok(true));
    for key in keys.into_iter().rev() {
        let test = compile_key(key)?;
        next = Box::new(move |cache, m| Ok(test(cache, m)? && next(cache, m)?));
    }
    Ok(next)
}

fn compile_key(key: SearchKey) -> Result<Predicate, Error> {
    Ok(match key {
        SearchKey::All => Box::new(|_, _| Ok(true)),
        SearchKey::Flag(flag, expected) => Box::new(move |cache, m| {
            Ok(cache.flags(m.uid)?.has(flag) == expected)
        }),
        SearchKey::New => Box::new(|cache, m| {
            let flags = cache.flags(m.uid)?;
            Ok(flags.contains(FlagSet::RECENT) && !flags.contains(FlagSet::SEEN))
        }),
        SearchKey::Old => {
            Box::new(|cache, m| Ok(!cache.flags(m.uid)?.has(Flag::Recent)))
        }
        SearchKey::Keyword(positive) => Box::new(move |_, _| Ok(!positive)),
        SearchKey::Header(name, pattern) => {
            let regex = to_regex(&pattern)?;
            Box::new(move |cache, m| {
                Ok(cache
                    .message(m.uid)?
                    .header_text(&name)
                    .map_or(false, |value| regex.is_match(&value)))
            })
        }
        SearchKey::Body(pattern) => {
            let regex = to_regex(&pattern)?;
            Box::new(move |cache, m| {
                Ok(body_matches(&*cache.message(m.uid)?, &regex))
            })
        }
        SearchKey::Text(pattern) => {
            let regex = to_regex(&pattern)?;
            Box::new(move |cache, m| {
                let message = cache.message(m.uid)?;
                Ok(header_matches(&message, &regex)
                    || body_matches(&message, &regex))
            })
        }
        SearchKey::Date(DateField::Internal, op, date) => {
            Box::new(move |cache, m| {
                let internal = cache.internal_date(m.uid)?;
                Ok(compare_date(op, internal.naive_local().date(), date))
            })
        }
        SearchKey::Date(DateField::Sent, op, date) => {
            Box::new(move |cache, m| {
                Ok(cache.message(m.uid)?.date().map_or(false, |sent| {
                    compare_date(op, sent.naive_local().date(), date)
                }))
            })
        }
        SearchKey::Larger(size) => {
            Box::new(move |cache, m| Ok(message_size(cache, m)? > size))
        }
        SearchKey::Smaller(size) => {
            Box::new(move |cache, m| Ok(message_size(cache, m)? < size))
        }
        SearchKey::Sequence(set) => Box::new(move |_, m| Ok(set.contains(m.seq))),
        SearchKey::Uid(set) => Box::new(move |_, m| Ok(set.contains(m.uid))),
        SearchKey::Not(inner) => {
            let inner = compile_key(*inner)?;
            Box::new(move |cache, m| Ok(!inner(cache, m)?))
        }
        SearchKey::Or(a, b) => {
            let a = compile_key(*a)?;
            let b = compile_key(*b)?;
            Box::new(move |cache, m| Ok(a(cache, m)? || b(cache, m)?))
        }
        SearchKey::And(keys) => compile(keys)?,
    })
}

/// Evaluate `predicate` over `messages`, returning those which match.
///
/// `cache` is cleared once every message has been evaluated.
pub fn run(
    predicate: &Predicate,
    cache: &MessageCache<'_>,
    messages: &[MessageRef],
) -> Result<Vec<MessageRef>, Error> {
    let mut hits = Vec::new();
    let result: Result<(), Error> = messages.iter().try_for_each(|&m| {
        if predicate(cache, m)? {
            hits.push(m);
        }
        Ok(())
    });
    cache.clear();
    result.map(|()| hits)
}

fn compare_date(op: DateOp, actual: NaiveDate, reference: NaiveDate) -> bool {
    match op {
        DateOp::Before => actual < reference,
        DateOp::On => actual == reference,
        DateOp::Since => actual >= reference,
    }
}

fn message_size(cache: &MessageCache<'_>, m: MessageRef) -> Result<u64, Error> {
    Ok(cache
        .store()
        .message_data(cache.mailbox(), m.uid)?
        .len() as u64)
}

fn header_matches(message: &Message, regex: &Regex) -> bool {
    regex.is_match(&encoding::decode_unstructured(message.header_raw()))
}

/// Match against the decoded text of every leaf part, including the headers
/// of embedded messages.
fn body_matches(message: &Message, regex: &Regex) -> bool {
    if message.is_multipart() {
        message.parts().iter().any(|part| body_matches(part, regex))
    } else if let Some(embedded) = message.embedded() {
        header_matches(embedded, regex) || body_matches(embedded, regex)
    } else {
        regex.is_match(&message.body_text())
    }
}

/// Build a case-insensitive substring matcher for `pattern`, where any run of
/// whitespace matches any run of whitespace.
fn to_regex(pattern: &str) -> Result<Regex, Error> {
    let mut regex_str = String::new();
    for (ix, chunk) in pattern.split_whitespace().enumerate() {
        if 0 != ix {
            regex_str.push_str("[ \r\n\t]+");
        }
        regex_str.push_str(&regex::escape(chunk));
    }

    RegexBuilder::new(&regex_str)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("bad search string: {}", e)))
}
