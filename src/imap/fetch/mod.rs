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

//! Compilation of FETCH attribute lists.
//!
//! The attribute list is parsed into `FetchAtt`s, with the `ALL`, `FAST` and
//! `FULL` macros expanded, then compiled into one `Formatter` which writes
//! the parenthesised body of a `FETCH` response. As with SEARCH, the list is
//! folded from the right so that each attribute writes its own item and then
//! hands over to the formatter for the rest of the list.
//!
//! Fetching a body section without `.PEEK` marks the message `\Seen`. That
//! happens in `run`, once per message and before any attribute of that
//! message is formatted, so a `FLAGS` item anywhere in the group shows the
//! new flag.

use log::info;

use self::section::{SectionPart, SectionSpec};
use super::folder::{MessageCache, MessageRef};
use super::lex::LexWriter;
use super::syntax::{Atom, Node};
use crate::store::{Flag, FlagSet};
use crate::support::error::Error;

pub mod section;
pub mod structure;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchAtt {
    Flags,
    InternalDate,
    Envelope,
    Rfc822Size,
    Uid,
    /// `BODY` without a section: the non-extensible body structure.
    Body,
    BodyStructure,
    Section { spec: SectionSpec, peek: bool },
    Rfc822,
    Rfc822Header,
    Rfc822Text,
}

impl FetchAtt {
    /// Whether fetching this attribute implicitly sets `\Seen`.
    pub fn sets_seen(&self) -> bool {
        match *self {
            FetchAtt::Section { peek, .. } => !peek,
            FetchAtt::Rfc822 | FetchAtt::Rfc822Text => true,
            _ => false,
        }
    }
}

/// Writes the items of one message's `FETCH` response.
pub type Formatter =
    Box<dyn Fn(&MessageCache<'_>, MessageRef, &mut Vec<u8>) -> Result<(), Error>>;

pub struct FetchPlan {
    formatter: Formatter,
    sets_seen: bool,
}

impl FetchPlan {
    pub fn sets_seen(&self) -> bool {
        self.sets_seen
    }
}

/// The output of one FETCH pass.
#[derive(Debug, Default)]
pub struct FetchResponse {
    /// Complete `* n FETCH (...)` lines, line endings included.
    pub lines: Vec<Vec<u8>>,
    /// Messages which gained `\Seen` during the pass, with their new flags.
    pub newly_seen: Vec<(MessageRef, FlagSet)>,
}

/// Parse the attribute argument of FETCH: a single attribute, a macro, or a
/// parenthesised list of attributes.
///
/// If `uid` is set (`UID FETCH`), `UID` is added to the front of the list
/// unless it was requested explicitly.
pub fn parse(args: &[Node], uid: bool) -> Result<Vec<FetchAtt>, Error> {
    let mut atts = match args {
        [Node::Group(group)] => {
            if group.is_empty() {
                return Err(Error::Syntax("empty fetch attribute list".to_owned()));
            }
            group.iter().map(parse_att).collect::<Result<Vec<_>, _>>()?
        }
        [node] => match node.word().map(str::to_ascii_uppercase).as_deref() {
            Some("ALL") => vec![
                FetchAtt::Flags,
                FetchAtt::InternalDate,
                FetchAtt::Rfc822Size,
                FetchAtt::Envelope,
            ],
            Some("FAST") => {
                vec![FetchAtt::Flags, FetchAtt::InternalDate, FetchAtt::Rfc822Size]
            }
            Some("FULL") => vec![
                FetchAtt::Flags,
                FetchAtt::InternalDate,
                FetchAtt::Rfc822Size,
                FetchAtt::Envelope,
                FetchAtt::Body,
            ],
            _ => vec![parse_att(node)?],
        },
        [] => return Err(Error::Syntax("missing fetch attributes".to_owned())),
        _ => return Err(Error::Syntax("too many arguments".to_owned())),
    };

    if uid && !atts.contains(&FetchAtt::Uid) {
        atts.insert(0, FetchAtt::Uid);
    }

    Ok(atts)
}

fn parse_att(node: &Node) -> Result<FetchAtt, Error> {
    if let Node::Atom(Atom::BodySection(ref section)) = *node {
        let peek = match section.option.as_deref() {
            None => false,
            Some("PEEK") => true,
            Some(other) => {
                return Err(Error::Syntax(format!(
                    "unknown fetch attribute: BODY.{}",
                    other
                )))
            }
        };
        return Ok(FetchAtt::Section {
            spec: SectionSpec::parse(section)?,
            peek,
        });
    }

    let word = node
        .word()
        .ok_or_else(|| Error::Syntax("invalid fetch attribute".to_owned()))?;
    Ok(match &*word.to_ascii_uppercase() {
        "FLAGS" => FetchAtt::Flags,
        "INTERNALDATE" => FetchAtt::InternalDate,
        "ENVELOPE" => FetchAtt::Envelope,
        "RFC822.SIZE" => FetchAtt::Rfc822Size,
        "UID" => FetchAtt::Uid,
        "BODY" => FetchAtt::Body,
        "BODYSTRUCTURE" => FetchAtt::BodyStructure,
        "RFC822" => FetchAtt::Rfc822,
        "RFC822.HEADER" => FetchAtt::Rfc822Header,
        "RFC822.TEXT" => FetchAtt::Rfc822Text,
        _ => {
            return Err(Error::Syntax(format!(
                "unknown fetch attribute: {}",
                word
            )))
        }
    })
}

/// Compile `atts` into a plan for `run`.
pub fn compile(atts: Vec<FetchAtt>) -> FetchPlan {
    let sets_seen = atts.iter().any(FetchAtt::sets_seen);

    let mut next: Formatter = Box::new(|_, _, _| Ok(()));
    for (ix, att) in atts.into_iter().enumerate().rev() {
        let item = compile_att(att);
        next = Box::new(move |cache, m, out| {
            if ix > 0 {
                out.push(b' ');
            }
            item(cache, m, out)?;
            next(cache, m, out)
        });
    }

    FetchPlan {
        formatter: next,
        sets_seen,
    }
}

fn compile_att(att: FetchAtt) -> Formatter {
    match att {
        FetchAtt::Flags => Box::new(|cache, m, out| {
            let mut lw = LexWriter::new(out);
            lw.verbatim("FLAGS ")?;
            lw.flags(cache.flags(m.uid)?)?;
            Ok(())
        }),
        FetchAtt::Uid => Box::new(|_, m, out| {
            let mut lw = LexWriter::new(out);
            lw.verbatim("UID ")?;
            lw.num(m.uid.into())?;
            Ok(())
        }),
        FetchAtt::InternalDate => Box::new(|cache, m, out| {
            let mut lw = LexWriter::new(out);
            lw.verbatim("INTERNALDATE ")?;
            lw.datetime(&cache.internal_date(m.uid)?)?;
            Ok(())
        }),
        FetchAtt::Rfc822Size => Box::new(|cache, m, out| {
            let size = cache.message(m.uid)?.size();
            let mut lw = LexWriter::new(out);
            lw.verbatim("RFC822.SIZE ")?;
            lw.num(size as u64)?;
            Ok(())
        }),
        FetchAtt::Envelope => Box::new(|cache, m, out| {
            let message = cache.message(m.uid)?;
            let mut lw = LexWriter::new(out);
            lw.verbatim("ENVELOPE ")?;
            structure::write_envelope(&mut lw, &message)
        }),
        FetchAtt::Body => Box::new(|cache, m, out| {
            let message = cache.message(m.uid)?;
            let mut lw = LexWriter::new(out);
            lw.verbatim("BODY ")?;
            structure::write_body_structure(&mut lw, &message, false)
        }),
        FetchAtt::BodyStructure => Box::new(|cache, m, out| {
            let message = cache.message(m.uid)?;
            let mut lw = LexWriter::new(out);
            lw.verbatim("BODYSTRUCTURE ")?;
            structure::write_body_structure(&mut lw, &message, true)
        }),
        FetchAtt::Section { spec, .. } => section_formatter(spec.to_string(), spec),
        FetchAtt::Rfc822 => section_formatter(
            "RFC822".to_owned(),
            SectionSpec::new(vec![], SectionPart::Full),
        ),
        FetchAtt::Rfc822Header => section_formatter(
            "RFC822.HEADER".to_owned(),
            SectionSpec::new(vec![], SectionPart::Header),
        ),
        FetchAtt::Rfc822Text => section_formatter(
            "RFC822.TEXT".to_owned(),
            SectionSpec::new(vec![], SectionPart::Text),
        ),
    }
}

fn section_formatter(name: String, spec: SectionSpec) -> Formatter {
    Box::new(move |cache, m, out| {
        let content = spec.extract(&*cache.message(m.uid)?);
        let mut lw = LexWriter::new(out);
        lw.verbatim(&name)?;
        lw.verbatim(" ")?;
        match content {
            Some(content) => lw.literal(&content)?,
            None => lw.nil()?,
        }
        Ok(())
    })
}

/// Format the `FETCH` responses for `messages`.
///
/// Unless `read_only`, messages lacking `\Seen` gain it first if the plan
/// fetches body content. `cache` is cleared once the whole pass is done.
pub fn run(
    plan: &FetchPlan,
    cache: &MessageCache<'_>,
    messages: &[MessageRef],
    read_only: bool,
) -> Result<FetchResponse, Error> {
    let mut response = FetchResponse::default();
    let result: Result<(), Error> = messages.iter().try_for_each(|&m| {
        if plan.sets_seen && !read_only {
            let flags = cache.flags(m.uid)?;
            if !flags.has(Flag::Seen) {
                cache
                    .store()
                    .set_flag(cache.mailbox(), m.uid, Flag::Seen, true)?;
                response.newly_seen.push((m, flags | FlagSet::SEEN));
            }
        }

        let mut line = format!("* {} FETCH (", m.seq).into_bytes();
        (plan.formatter)(cache, m, &mut line)?;
        line.extend_from_slice(b")\r\n");
        response.lines.push(line);
        Ok(())
    });
    cache.clear();
    result?;

    if !response.newly_seen.is_empty() {
        info!("FETCH set \\Seen on {} messages", response.newly_seen.len());
    }
    Ok(response)
}
