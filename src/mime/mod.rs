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

//! A structural model of an RFC 5322/MIME message.
//!
//! `Message` locates the header fields, the body and the child parts of a
//! message without copying it. It knows enough to answer SEARCH and FETCH:
//! header lookup, content types, transfer decoding, addresses and dates.
//! It does not validate anything; malformed input produces whatever
//! structure can be recognised.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use chrono::prelude::*;
use memchr::memmem;

pub mod encoding;
pub mod header;

use self::header::{Address, ContentType, Disposition};

/// Parts nested deeper than this are treated as leaves.
const MAX_RECURSION: u32 = 20;

/// One header field.
#[derive(Clone, Debug)]
struct Field {
    name: String,
    /// The whole field, from the start of the name through the line ending
    /// of its last line.
    whole: Range<usize>,
    /// The value after the colon, excluding the final line ending.
    value: Range<usize>,
}

#[derive(Clone, Debug)]
pub struct Message {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
    body_start: usize,
    fields: Vec<Field>,
    content_type: ContentType,
    parts: Vec<Message>,
    embedded: Option<Box<Message>>,
}

impl Message {
    pub fn parse(data: Arc<Vec<u8>>) -> Self {
        let end = data.len();
        Self::parse_range(data, 0..end, ContentType::default_text(), 0)
    }

    fn parse_range(
        data: Arc<Vec<u8>>,
        range: Range<usize>,
        default_type: ContentType,
        depth: u32,
    ) -> Self {
        let (fields, body_start) = split_fields(&data, range.clone());

        let content_type = fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case("Content-Type"))
            .and_then(|f| header::parse_content_type(&data[f.value.clone()]))
            .unwrap_or(default_type);

        let mut parts = Vec::new();
        let mut embedded = None;
        if depth >= MAX_RECURSION {
            // Leaf
        } else if content_type.is_type("multipart") {
            if let Some(boundary) = content_type.param("boundary") {
                let child_type = if content_type.is("multipart", "digest") {
                    ContentType::new("message", "rfc822")
                } else {
                    ContentType::default_text()
                };
                for part in
                    split_parts(&data, body_start..range.end, boundary.as_bytes())
                {
                    parts.push(Self::parse_range(
                        Arc::clone(&data),
                        part,
                        child_type.clone(),
                        depth + 1,
                    ));
                }
            }
        } else if content_type.is("message", "rfc822") {
            embedded = Some(Box::new(Self::parse_range(
                Arc::clone(&data),
                body_start..range.end,
                ContentType::default_text(),
                depth + 1,
            )));
        }

        Message {
            data,
            range,
            body_start,
            fields,
            content_type,
            parts,
            embedded,
        }
    }

    /// The whole message, header and body.
    pub fn raw(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    /// The header, including the blank line which terminates it.
    pub fn header_raw(&self) -> &[u8] {
        &self.data[self.range.start..self.body_start]
    }

    pub fn body_raw(&self) -> &[u8] {
        &self.data[self.body_start..self.range.end]
    }

    pub fn size(&self) -> usize {
        self.range.len()
    }

    /// The number of lines in the body.
    pub fn body_lines(&self) -> usize {
        let body = self.body_raw();
        let newlines = memchr::memchr_iter(b'\n', body).count();
        if body.is_empty() || body.ends_with(b"\n") {
            newlines
        } else {
            newlines + 1
        }
    }

    /// The raw value of the first field called `name`.
    pub fn header_field(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &self.data[f.value.clone()])
    }

    /// The unfolded and decoded value of the first field called `name`.
    pub fn header_text(&self, name: &str) -> Option<String> {
        self.header_field(name).map(encoding::decode_unstructured)
    }

    /// Iterate over `(name, whole field)` for every header field, in order.
    pub fn header_fields(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.fields
            .iter()
            .map(move |f| (f.name.as_str(), &self.data[f.whole.clone()]))
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type.is_type("multipart")
    }

    /// The children of a multipart.
    pub fn parts(&self) -> &[Message] {
        &self.parts
    }

    /// The message carried by a `message/rfc822` body.
    pub fn embedded(&self) -> Option<&Message> {
        self.embedded.as_deref()
    }

    pub fn transfer_encoding(&self) -> String {
        self.header_field("Content-Transfer-Encoding")
            .map(|v| String::from_utf8_lossy(v).trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "7BIT".to_owned())
    }

    /// The body with its transfer encoding removed.
    pub fn decoded_body(&self) -> Cow<'_, [u8]> {
        encoding::decode_transfer(&self.transfer_encoding(), self.body_raw())
    }

    /// The body as text, decoded from its transfer encoding and charset.
    pub fn body_text(&self) -> String {
        let body = self.decoded_body();
        encoding::decode_charset(self.content_type.param("charset"), &body)
            .into_owned()
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.header_field("Date").and_then(header::parse_date)
    }

    pub fn addresses(&self, name: &str) -> Vec<Address> {
        self.header_field(name)
            .map(header::parse_address_list)
            .unwrap_or_default()
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.header_field("Content-Disposition")
            .and_then(header::parse_disposition)
    }
}

/// Locate the header fields of the message in `range` and the start of its
/// body.
fn split_fields(data: &[u8], range: Range<usize>) -> (Vec<Field>, usize) {
    let mut fields: Vec<Field> = Vec::new();
    let mut pos = range.start;

    while pos < range.end {
        let line_end = memchr::memchr(b'\n', &data[pos..range.end])
            .map_or(range.end, |ix| pos + ix + 1);
        let line = &data[pos..line_end];
        let content_end = line_end - trailing_eol(line);

        if content_end == pos {
            // Blank line: end of header
            return (fields, line_end);
        }

        if b' ' == line[0] || b'\t' == line[0] {
            if let Some(last) = fields.last_mut() {
                last.whole.end = line_end;
                last.value.end = content_end;
            }
        } else if let Some(colon) = memchr::memchr(b':', line) {
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_owned();
            if !name.is_empty() && !name.contains(char::is_whitespace) {
                fields.push(Field {
                    name,
                    whole: pos..line_end,
                    value: pos + colon + 1..content_end,
                });
            }
        }

        pos = line_end;
    }

    (fields, range.end)
}

fn trailing_eol(line: &[u8]) -> usize {
    if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") {
        1
    } else {
        0
    }
}

/// Find the byte ranges of the parts of a multipart body.
///
/// The line ending before each delimiter belongs to the delimiter. Anything
/// before the first delimiter and after the closing delimiter is ignored.
fn split_parts(
    data: &[u8],
    body: Range<usize>,
    boundary: &[u8],
) -> Vec<Range<usize>> {
    let mut delimiter = b"--".to_vec();
    delimiter.extend_from_slice(boundary);
    let finder = memmem::Finder::new(&delimiter);

    let content = &data[body.clone()];
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut search_from = 0;

    while let Some(found) = finder.find(&content[search_from..]) {
        let at = search_from + found;
        search_from = at + delimiter.len();
        if at > 0 && b'\n' != content[at - 1] {
            continue;
        }

        if let Some(start) = part_start.take() {
            let mut end = at;
            if end > start && b'\n' == content[end - 1] {
                end -= 1;
                if end > start && b'\r' == content[end - 1] {
                    end -= 1;
                }
            }
            parts.push(body.start + start..body.start + end);
        }

        let after = &content[search_from..];
        if after.starts_with(b"--") {
            break;
        }

        // The part starts on the line after the delimiter
        match memchr::memchr(b'\n', after) {
            Some(eol) => {
                part_start = Some(search_from + eol + 1);
                search_from += eol + 1;
            }
            None => break,
        }
    }

    parts
}
