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

//! Resolution of `BODY[section]` specifiers.
//!
//! A section is a dotted path of part numbers followed by an optional
//! keyword. Part numbers select children of multiparts; on a
//! `message/rfc822` part they address the parts of the embedded message, and
//! a number on a part without children is only valid as `1`, which refers to
//! the part's own content.
//!
//! The keywords behave differently at the top level and on a numbered part:
//!
//! - none: the whole message at top level, otherwise the part content;
//! - `HEADER`, `HEADER.FIELDS`, `HEADER.FIELDS.NOT`: the header of the
//!   message, or of the message embedded in the part;
//! - `MIME`: the header of the part itself, invalid at top level;
//! - `TEXT`: the body of the message, or of the embedded message.

use std::fmt;

use crate::imap::syntax::{BodySection, Node};
use crate::mime::Message;
use crate::support::error::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionPart {
    Full,
    Header,
    HeaderFields(Vec<String>),
    HeaderFieldsNot(Vec<String>),
    Mime,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionSpec {
    pub path: Vec<u32>,
    pub part: SectionPart,
    /// `<origin.size>`
    pub partial: Option<(u64, u64)>,
}

impl SectionSpec {
    pub fn new(path: Vec<u32>, part: SectionPart) -> Self {
        SectionSpec {
            path,
            part,
            partial: None,
        }
    }

    /// Interpret the contents of a lexed `BODY[...]` atom.
    pub fn parse(section: &BodySection) -> Result<Self, Error> {
        let mut nodes = section.section_list.iter();
        let spec_word = match nodes.next() {
            None => "",
            Some(node) => node
                .word()
                .ok_or_else(|| bad_section(&section.section))?,
        };

        let mut path = Vec::new();
        let mut components = spec_word.split('.').peekable();
        while let Some(n) = components.peek().and_then(|c| c.parse::<u32>().ok())
        {
            if 0 == n {
                return Err(bad_section(&section.section));
            }
            path.push(n);
            components.next();
        }
        let keyword = components.collect::<Vec<_>>().join(".").to_ascii_uppercase();

        let part = match &*keyword {
            "" => SectionPart::Full,
            "HEADER" => SectionPart::Header,
            "HEADER.FIELDS" => {
                SectionPart::HeaderFields(field_list(nodes.next(), section)?)
            }
            "HEADER.FIELDS.NOT" => {
                SectionPart::HeaderFieldsNot(field_list(nodes.next(), section)?)
            }
            "MIME" if !path.is_empty() => SectionPart::Mime,
            "TEXT" => SectionPart::Text,
            _ => return Err(bad_section(&section.section)),
        };

        if nodes.next().is_some() {
            return Err(bad_section(&section.section));
        }

        Ok(SectionSpec {
            path,
            part,
            partial: section.partial,
        })
    }

    /// Extract the bytes this section refers to from `message`.
    ///
    /// Returns `None` if the path does not exist in the message or the partial
    /// origin lies beyond the end of the content, both answered with `NIL`.
    pub fn extract(&self, message: &Message) -> Option<Vec<u8>> {
        let mut target = message;
        for &n in &self.path {
            target = child(target, n)?;
        }

        let top_level = self.path.is_empty();
        // Header and text keywords on a numbered part refer to the embedded
        // message, if there is one
        let carrier = if top_level {
            Some(target)
        } else {
            target.embedded()
        };

        let content = match self.part {
            SectionPart::Full if top_level => target.raw().to_vec(),
            SectionPart::Full => target.body_raw().to_vec(),
            SectionPart::Mime => target.header_raw().to_vec(),
            SectionPart::Header => carrier?.header_raw().to_vec(),
            SectionPart::Text => carrier?.body_raw().to_vec(),
            SectionPart::HeaderFields(ref names) => {
                filter_header(carrier?, |name| has_name(names, name))
            }
            SectionPart::HeaderFieldsNot(ref names) => {
                filter_header(carrier?, |name| !has_name(names, name))
            }
        };

        Some(match self.partial {
            None => content,
            Some((origin, _)) if origin as usize > content.len() => return None,
            Some((origin, size)) => {
                let start = origin as usize;
                let end = content.len().min(start.saturating_add(size as usize));
                content[start..end].to_vec()
            }
        })
    }
}

/// Writes the section as it is echoed in responses, without the partial
/// size.
impl fmt::Display for SectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("BODY[")?;
        for (ix, n) in self.path.iter().enumerate() {
            if ix > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", n)?;
        }

        let keyword = match self.part {
            SectionPart::Full => None,
            SectionPart::Header => Some("HEADER"),
            SectionPart::HeaderFields(_) => Some("HEADER.FIELDS"),
            SectionPart::HeaderFieldsNot(_) => Some("HEADER.FIELDS.NOT"),
            SectionPart::Mime => Some("MIME"),
            SectionPart::Text => Some("TEXT"),
        };
        if let Some(keyword) = keyword {
            if !self.path.is_empty() {
                f.write_str(".")?;
            }
            f.write_str(keyword)?;
        }

        if let SectionPart::HeaderFields(ref names)
        | SectionPart::HeaderFieldsNot(ref names) = self.part
        {
            write!(f, " ({})", names.join(" "))?;
        }

        f.write_str("]")?;
        if let Some((origin, _)) = self.partial {
            write!(f, "<{}>", origin)?;
        }
        Ok(())
    }
}

fn child(message: &Message, n: u32) -> Option<&Message> {
    let ix = n as usize - 1;
    if message.is_multipart() {
        message.parts().get(ix)
    } else if let Some(embedded) = message.embedded() {
        if embedded.is_multipart() {
            embedded.parts().get(ix)
        } else if 0 == ix {
            Some(embedded)
        } else {
            None
        }
    } else if 0 == ix {
        Some(message)
    } else {
        None
    }
}

fn field_list(
    node: Option<&Node>,
    section: &BodySection,
) -> Result<Vec<String>, Error> {
    let group = node
        .and_then(Node::group)
        .ok_or_else(|| bad_section(&section.section))?;
    if group.is_empty() {
        return Err(bad_section(&section.section));
    }

    group
        .iter()
        .map(|n| {
            n.astring()
                .map(|s| s.to_ascii_uppercase())
                .ok_or_else(|| bad_section(&section.section))
        })
        .collect()
}

fn has_name(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// The header fields of `message` accepted by `keep`, followed by the blank
/// line.
fn filter_header(message: &Message, keep: impl Fn(&str) -> bool) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, whole) in message.header_fields() {
        if keep(name) {
            out.extend_from_slice(whole);
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn bad_section(raw: &str) -> Error {
    Error::Syntax(format!("invalid section: [{}]", raw))
}
