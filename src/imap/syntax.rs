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

//! The lexical and grammatical structure of client commands.
//!
//! A physical line is first lexed into a flat list of `Atom`s. The token
//! classes are tried in this order at every position:
//!
//! - A body section descriptor such as `BODY.PEEK[HEADER.FIELDS (From)]<0.10>`,
//!   taken as a single atom.
//! - One of the bracket characters `(`, `)`, `[` and `]`.
//! - A quoted string, with `\"` and `\\` escapes.
//! - A bare token, running until whitespace, a bracket or a quote.
//!
//! A bare `NIL` (in any case) becomes `Atom::Nil`, and a bare `{n}` at the
//! end of a line becomes `Atom::LiteralMarker`. The request reader replaces
//! each literal marker with a `Quoted` atom holding the literal's content, so
//! after reading, literals and quoted strings are indistinguishable.
//!
//! The atoms of a whole command are then folded by a small recursive descent
//! parser into `Node`s, where `(...)` becomes a `Group` and `[...]` a
//! `Block`.
//!
//! Sequence sets are not interpreted here; they are just bare words, since
//! resolving `*` requires the selected folder.

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag_no_case, take, take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_opt, opt},
    multi::fold_many0,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use crate::support::error::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Atom {
    Word(String),
    Quoted(Vec<u8>),
    GroupOpen,
    GroupClose,
    BlockOpen,
    BlockClose,
    Nil,
    BodySection(BodySection),
    LiteralMarker(u64),
}

/// A `BODY[...]` descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodySection {
    /// Always `BODY`, upper-case.
    pub symbol: String,
    /// The part after the dot, such as `PEEK`, upper-case.
    pub option: Option<String>,
    /// The raw text between the brackets.
    pub section: String,
    /// `section`, lexed and parsed.
    pub section_list: Vec<Node>,
    /// The `<origin.size>` suffix.
    pub partial: Option<(u64, u64)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Atom(Atom),
    Group(Vec<Node>),
    Block(Vec<Node>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub tag: String,
    /// The command name, upper-case.
    pub name: String,
    pub args: Vec<Node>,
}

/// Lex one physical line, without its line ending.
pub fn lex_line(line: &[u8]) -> Result<Vec<Atom>, Error> {
    let mut atoms = Vec::new();
    let mut rest = skip_space(line);

    while !rest.is_empty() {
        match token(rest) {
            Ok((tail, atom)) => {
                atoms.push(atom?);
                rest = skip_space(tail);
            }
            Err(_) if b'"' == rest[0] => {
                return Err(Error::Syntax(
                    "unterminated quoted string".to_owned(),
                ))
            }
            Err(_) => {
                return Err(Error::Syntax(format!(
                    "unexpected character: {:?}",
                    rest[0] as char
                )))
            }
        }
    }

    if let Some(&Atom::Word(ref word)) = atoms.last() {
        if let Some(size) = literal_size(word) {
            atoms.pop();
            atoms.push(Atom::LiteralMarker(size));
        }
    }

    Ok(atoms)
}

/// If `word` is of the form `{n}`, return `n`.
pub fn literal_size(word: &str) -> Option<u64> {
    let inner = word.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    inner.parse().ok()
}

fn skip_space(i: &[u8]) -> &[u8] {
    let start = i
        .iter()
        .position(|&b| b' ' != b && b'\t' != b)
        .unwrap_or(i.len());
    &i[start..]
}

fn is_bare(b: u8) -> bool {
    !b.is_ascii_whitespace() && !b"()[]\"".contains(&b)
}

fn token(i: &[u8]) -> IResult<&[u8], Result<Atom, Error>> {
    alt((
        body_section,
        map(bracket, Ok),
        map(quoted, |q| Ok(Atom::Quoted(q))),
        map(bare, Ok),
    ))(i)
}

fn bracket(i: &[u8]) -> IResult<&[u8], Atom> {
    alt((
        map(char('('), |_| Atom::GroupOpen),
        map(char(')'), |_| Atom::GroupClose),
        map(char('['), |_| Atom::BlockOpen),
        map(char(']'), |_| Atom::BlockClose),
    ))(i)
}

fn quoted(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\\\""), preceded(char('\\'), take(1usize)))),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        char('"'),
    )(i)
}

fn bare(i: &[u8]) -> IResult<&[u8], Atom> {
    map(take_while1(is_bare), |word: &[u8]| {
        let word = String::from_utf8_lossy(word).into_owned();
        if "NIL".eq_ignore_ascii_case(&word) {
            Atom::Nil
        } else {
            Atom::Word(word)
        }
    })(i)
}

fn number(i: &[u8]) -> IResult<&[u8], u64> {
    map_opt(digit1, |d: &[u8]| str::from_utf8(d).ok()?.parse().ok())(i)
}

fn body_section(i: &[u8]) -> IResult<&[u8], Result<Atom, Error>> {
    map(
        tuple((
            tag_no_case("BODY"),
            opt(preceded(
                char('.'),
                take_while1(|b: u8| b.is_ascii_alphanumeric() || b'_' == b),
            )),
            delimited(char('['), take_while(|b: u8| b']' != b), char(']')),
            opt(delimited(
                char('<'),
                separated_pair(number, char('.'), number),
                char('>'),
            )),
        )),
        |(_, option, section, partial): (_, Option<&[u8]>, &[u8], _)| {
            let section_list = parse_nodes(lex_line(section)?)?;
            Ok(Atom::BodySection(BodySection {
                symbol: "BODY".to_owned(),
                option: option.map(|o| {
                    String::from_utf8_lossy(o).to_ascii_uppercase()
                }),
                section: String::from_utf8_lossy(section).into_owned(),
                section_list,
                partial,
            }))
        },
    )(i)
}

/// Fold a flat list of atoms into nodes.
pub fn parse_nodes(atoms: Vec<Atom>) -> Result<Vec<Node>, Error> {
    let mut atoms = atoms.into_iter();
    parse_sequence(&mut atoms, None)
}

fn parse_sequence(
    atoms: &mut impl Iterator<Item = Atom>,
    closer: Option<Atom>,
) -> Result<Vec<Node>, Error> {
    let mut nodes = Vec::new();
    loop {
        let atom = match atoms.next() {
            Some(atom) => atom,
            None => {
                return match closer {
                    None => Ok(nodes),
                    Some(Atom::GroupClose) => {
                        Err(Error::Syntax("unterminated group".to_owned()))
                    }
                    Some(_) => {
                        Err(Error::Syntax("unterminated block".to_owned()))
                    }
                }
            }
        };

        match atom {
            Atom::GroupOpen => nodes.push(Node::Group(parse_sequence(
                atoms,
                Some(Atom::GroupClose),
            )?)),
            Atom::BlockOpen => nodes.push(Node::Block(parse_sequence(
                atoms,
                Some(Atom::BlockClose),
            )?)),
            Atom::GroupClose | Atom::BlockClose => {
                if closer.as_ref() == Some(&atom) {
                    return Ok(nodes);
                }

                return Err(Error::Syntax(format!(
                    "unexpected '{}'",
                    if Atom::GroupClose == atom { ')' } else { ']' }
                )));
            }
            atom => nodes.push(Node::Atom(atom)),
        }
    }
}

/// Build a command from the atoms of all its lines.
pub fn parse_command(mut atoms: Vec<Atom>) -> Result<Command, Error> {
    let tag = match atoms.first() {
        Some(&Atom::Word(ref tag))
            if !tag.starts_with('*') && !tag.starts_with('+') =>
        {
            tag.clone()
        }
        _ => {
            return Err(Error::BadCommandLine {
                tag: None,
                reason: "invalid tag".to_owned(),
            })
        }
    };

    if atoms.len() < 2 {
        return Err(Error::BadCommandLine {
            tag: Some(tag),
            reason: "missing command name".to_owned(),
        });
    }

    let mut rest = atoms.split_off(1).into_iter();
    let name = match rest.next() {
        Some(Atom::Word(name)) => name.to_ascii_uppercase(),
        _ => {
            return Err(Error::BadCommandLine {
                tag: Some(tag),
                reason: "invalid command name".to_owned(),
            })
        }
    };

    match parse_sequence(&mut rest, None) {
        Ok(args) => Ok(Command { tag, name, args }),
        Err(e) => Err(Error::BadCommandLine {
            tag: Some(tag),
            reason: e.to_string(),
        }),
    }
}

impl Node {
    pub fn word(&self) -> Option<&str> {
        match *self {
            Node::Atom(Atom::Word(ref w)) => Some(w),
            _ => None,
        }
    }

    /// The value of a word, quoted string or literal.
    pub fn astring(&self) -> Option<Cow<'_, str>> {
        match *self {
            Node::Atom(Atom::Word(ref w)) => Some(Cow::Borrowed(w)),
            Node::Atom(Atom::Quoted(ref q)) => Some(String::from_utf8_lossy(q)),
            _ => None,
        }
    }

    /// Like `astring`, but without any charset interpretation.
    pub fn astring_bytes(&self) -> Option<&[u8]> {
        match *self {
            Node::Atom(Atom::Word(ref w)) => Some(w.as_bytes()),
            Node::Atom(Atom::Quoted(ref q)) => Some(q),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<&[Node]> {
        match *self {
            Node::Group(ref g) => Some(g),
            _ => None,
        }
    }
}

/// A cursor over the arguments of a command.
pub struct Args<'a> {
    args: &'a [Node],
}

impl<'a> Args<'a> {
    pub fn new(args: &'a [Node]) -> Self {
        Args { args }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn peek(&self) -> Option<&'a Node> {
        self.args.first()
    }

    pub fn next(&mut self) -> Option<&'a Node> {
        let (first, rest) = self.args.split_first()?;
        self.args = rest;
        Some(first)
    }

    pub fn node(&mut self, what: &str) -> Result<&'a Node, Error> {
        self.next()
            .ok_or_else(|| Error::Syntax(format!("missing {}", what)))
    }

    pub fn word(&mut self, what: &str) -> Result<&'a str, Error> {
        self.node(what)?
            .word()
            .ok_or_else(|| Error::Syntax(format!("invalid {}", what)))
    }

    pub fn astring(&mut self, what: &str) -> Result<Cow<'a, str>, Error> {
        self.node(what)?
            .astring()
            .ok_or_else(|| Error::Syntax(format!("invalid {}", what)))
    }

    pub fn astring_bytes(&mut self, what: &str) -> Result<&'a [u8], Error> {
        self.node(what)?
            .astring_bytes()
            .ok_or_else(|| Error::Syntax(format!("invalid {}", what)))
    }

    pub fn number(&mut self, what: &str) -> Result<u64, Error> {
        self.word(what)?
            .parse()
            .map_err(|_| Error::Syntax(format!("invalid {}", what)))
    }

    pub fn group(&mut self, what: &str) -> Result<&'a [Node], Error> {
        self.node(what)?
            .group()
            .ok_or_else(|| Error::Syntax(format!("invalid {}", what)))
    }

    /// Fail if any arguments remain.
    pub fn finish(&self) -> Result<(), Error> {
        if self.args.is_empty() {
            Ok(())
        } else {
            Err(Error::Syntax("too many arguments".to_owned()))
        }
    }
}

/// Parse a `date` such as `1-Feb-1994`.
pub fn parse_date(s: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(s.trim(), "%d-%b-%Y")
        .map_err(|_| Error::Syntax(format!("invalid date: {}", s)))
}

/// Parse a `date-time` such as `17-Jul-1996 02:44:25 -0700`. The day may be
/// space-padded.
pub fn parse_datetime(s: &str) -> Result<DateTime<FixedOffset>, Error> {
    DateTime::parse_from_str(s.trim(), "%d-%b-%Y %H:%M:%S %z")
        .map_err(|_| Error::Syntax(format!("invalid date-time: {}", s)))
}
