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

//! Parsers for the structured header fields needed by SEARCH and FETCH.
//!
//! These follow RFC 2822 and RFC 2045 loosely, including the "obsolete"
//! forms agents still emit, but without the route and domain-list syntax.

use std::borrow::Cow;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, take, take_while1},
    character::complete::char,
    combinator::{map, opt},
    multi::{fold_many0, many0, many0_count, many1, many1_count},
    multi::{separated_list, separated_nonempty_list},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::encoding::decode_unstructured;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(typ: &str, subtype: &str) -> Self {
        ContentType {
            typ: typ.to_owned(),
            subtype: subtype.to_owned(),
            params: vec![],
        }
    }

    /// The RFC 2045 default, `text/plain; charset=us-ascii`.
    pub fn default_text() -> Self {
        ContentType {
            typ: "text".to_owned(),
            subtype: "plain".to_owned(),
            params: vec![("charset".to_owned(), "us-ascii".to_owned())],
        }
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is(&self, typ: &str, subtype: &str) -> bool {
        self.is_type(typ) && self.subtype.eq_ignore_ascii_case(subtype)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }
}

/// A `Content-Disposition`: the disposition type and its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    pub typ: String,
    pub params: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub local: String,
    pub domain: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Mailbox(Mailbox),
    Group(String, Vec<Mailbox>),
}

pub fn find_param<'a>(
    params: &'a [(String, String)],
    name: &str,
) -> Option<&'a str> {
    params
        .iter()
        .find(|&&(ref k, _)| k.eq_ignore_ascii_case(name))
        .map(|&(_, ref v)| v.as_str())
}

pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    let (_, (typ, _, subtype, params)) =
        tuple((padded(token), char('/'), padded(token), many0(param)))(value)
            .ok()?;
    Some(ContentType {
        typ: typ.into_owned(),
        subtype: subtype.into_owned(),
        params,
    })
}

pub fn parse_disposition(value: &[u8]) -> Option<Disposition> {
    let (_, (typ, params)) = pair(padded(token), many0(param))(value).ok()?;
    Some(Disposition {
        typ: typ.into_owned(),
        params,
    })
}

pub fn parse_address_list(value: &[u8]) -> Vec<Address> {
    address_list(value).map(|(_, list)| list).unwrap_or_default()
}

/// Parse an RFC 2822 `Date` value.
///
/// A trailing comment, such as `(PDT)`, is ignored.
pub fn parse_date(value: &[u8]) -> Option<DateTime<FixedOffset>> {
    let text = std::str::from_utf8(value).ok()?;
    let text = match text.find('(') {
        Some(ix) => &text[..ix],
        None => text,
    };
    let text = text.split_ascii_whitespace().collect::<Vec<_>>().join(" ");
    DateTime::parse_from_rfc2822(&text).ok()
}

fn is_token_char(b: u8) -> bool {
    b > b' ' && b < 0x7f && !b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn is_atext(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || b"!#$%&'*+-/=?^_`{|}~".contains(&b)
        || b >= 0x80
}

fn fws(i: &[u8]) -> IResult<&[u8], ()> {
    map(is_a(" \t\r\n"), |_| ())(i)
}

fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    delimited(
        char('('),
        map(
            many0_count(alt((
                map(is_not("()\\"), |_| ()),
                map(quoted_pair, |_| ()),
                comment,
            ))),
            |_| (),
        ),
        char(')'),
    )(i)
}

fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    map(many0_count(alt((fws, comment))), |_| ())(i)
}

fn padded<'a, O>(
    inner: impl Fn(&'a [u8]) -> IResult<&'a [u8], O>,
) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], O> {
    delimited(cfws, inner, cfws)
}

fn token(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    map(take_while1(is_token_char), String::from_utf8_lossy)(i)
}

fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    padded(delimited(
        char('"'),
        fold_many0(
            alt((is_not("\\\""), quoted_pair)),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        char('"'),
    ))(i)
}

fn param(i: &[u8]) -> IResult<&[u8], (String, String)> {
    map(
        tuple((
            char(';'),
            padded(token),
            char('='),
            alt((
                quoted_string,
                map(padded(token), |t| t.into_owned().into_bytes()),
            )),
        )),
        |(_, name, _, value)| {
            (
                name.to_ascii_lowercase(),
                String::from_utf8_lossy(&value).into_owned(),
            )
        },
    )(i)
}

fn atom(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map(padded(take_while1(is_atext)), <[u8]>::to_vec)(i)
}

fn word(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((atom, quoted_string))(i)
}

fn phrase(i: &[u8]) -> IResult<&[u8], String> {
    map(
        many1(alt((word, map(terminated(char('.'), cfws), |_| vec![b'.'])))),
        |words| {
            let joined = words
                .iter()
                .map(|w| String::from_utf8_lossy(w))
                .collect::<Vec<_>>()
                .join(" ");
            decode_unstructured(joined.as_bytes())
        },
    )(i)
}

fn dotted(i: &[u8]) -> IResult<&[u8], String> {
    map(separated_nonempty_list(char('.'), word), |parts| {
        parts
            .iter()
            .map(|p| String::from_utf8_lossy(p))
            .collect::<Vec<_>>()
            .join(".")
    })(i)
}

fn domain_literal(i: &[u8]) -> IResult<&[u8], String> {
    map(
        padded(delimited(char('['), opt(is_not("[]\\")), char(']'))),
        |inner| {
            format!("[{}]", String::from_utf8_lossy(inner.unwrap_or(&b""[..])))
        },
    )(i)
}

fn addr_spec(i: &[u8]) -> IResult<&[u8], (String, String)> {
    pair(dotted, preceded(char('@'), alt((dotted, domain_literal))))(i)
}

fn angle_addr(i: &[u8]) -> IResult<&[u8], (String, String)> {
    delimited(pair(cfws, char('<')), addr_spec, pair(char('>'), cfws))(i)
}

fn mailbox(i: &[u8]) -> IResult<&[u8], Mailbox> {
    map(
        alt((
            pair(opt(phrase), angle_addr),
            map(addr_spec, |a| (None, a)),
        )),
        |(name, (local, domain))| Mailbox {
            name,
            local,
            domain,
        },
    )(i)
}

fn list_delim(i: &[u8]) -> IResult<&[u8], ()> {
    map(many1_count(tuple((cfws, char(','), cfws))), |_| ())(i)
}

fn mailbox_list(i: &[u8]) -> IResult<&[u8], Vec<Mailbox>> {
    separated_nonempty_list(list_delim, mailbox)(i)
}

fn group(i: &[u8]) -> IResult<&[u8], (String, Vec<Mailbox>)> {
    pair(
        terminated(phrase, char(':')),
        map(
            terminated(opt(mailbox_list), tuple((cfws, char(';'), cfws))),
            Option::unwrap_or_default,
        ),
    )(i)
}

fn address(i: &[u8]) -> IResult<&[u8], Address> {
    alt((
        map(mailbox, Address::Mailbox),
        map(group, |(name, boxes)| Address::Group(name, boxes)),
    ))(i)
}

fn address_list(i: &[u8]) -> IResult<&[u8], Vec<Address>> {
    delimited(
        opt(list_delim),
        separated_list(list_delim, address),
        opt(list_delim),
    )(i)
}
