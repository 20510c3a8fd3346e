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

//! Content transfer encodings, RFC 2047 encoded words and charset decoding.

use std::borrow::Cow;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]*)\?([!->@-~]*)\?([!->@-~]*)\?=$").unwrap();
}

/// Decode quoted-printable text (RFC 2045 6.7).
///
/// Soft line breaks are removed, with either line ending. Malformed escapes
/// are passed through unchanged.
pub fn qp_decode(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if b'=' != s[i] {
            out.push(s[i]);
            i += 1;
            continue;
        }

        let rest = &s[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if let Some(byte) = rest.get(..2).and_then(hex_byte) {
            out.push(byte);
            i += 3;
        } else {
            out.push(b'=');
            i += 1;
        }
    }

    out
}

fn hex_byte(digits: &[u8]) -> Option<u8> {
    let digits = std::str::from_utf8(digits).ok()?;
    u8::from_str_radix(digits, 16).ok()
}

/// Decode a body according to its `Content-Transfer-Encoding`.
///
/// Unknown encodings and undecodable base64 leave the content as-is.
pub fn decode_transfer<'a>(cte: &str, content: &'a [u8]) -> Cow<'a, [u8]> {
    if "quoted-printable".eq_ignore_ascii_case(cte) {
        Cow::Owned(qp_decode(content))
    } else if "base64".eq_ignore_ascii_case(cte) {
        let compact = content
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect::<Vec<u8>>();
        match base64::decode(&compact) {
            Ok(decoded) => Cow::Owned(decoded),
            Err(_) => Cow::Borrowed(content),
        }
    } else {
        Cow::Borrowed(content)
    }
}

/// Look up a charset by label, excluding the "replacement" encoding.
pub fn charset(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label_no_replacement(label.trim().as_bytes())
}

/// Decode `content` in `label`, falling back to lossy UTF-8 for unknown
/// charsets.
pub fn decode_charset<'a>(label: Option<&str>, content: &'a [u8]) -> Cow<'a, str> {
    match label.and_then(charset) {
        Some(encoding) => encoding.decode_with_bom_removal(content).0,
        None => String::from_utf8_lossy(content),
    }
}

/// Decode `word` if it is, in its entirety, an RFC 2047 encoded word.
pub fn ew_decode(word: &str) -> Option<String> {
    let captures = ENCODED_WORD.captures(word)?;
    let label = captures.get(1)?.as_str();
    let xfer = captures.get(2)?.as_str();
    let text = captures.get(3)?.as_str().as_bytes();

    let bytes = if "q".eq_ignore_ascii_case(xfer) {
        // `_` stands for a space regardless of charset
        let text = text
            .iter()
            .map(|&b| if b'_' == b { b' ' } else { b })
            .collect::<Vec<u8>>();
        qp_decode(&text)
    } else if "b".eq_ignore_ascii_case(xfer) {
        base64::decode(text).ok()?
    } else {
        return None;
    };

    // RFC 2231 allows a language suffix on the charset
    let label = label.split('*').next().unwrap_or(label);
    Some(
        charset(label)?
            .decode_with_bom_removal(&bytes)
            .0
            .into_owned(),
    )
}

/// Unfold and decode an unstructured header value.
///
/// Whitespace between two adjacent encoded words is dropped; all other
/// whitespace runs become a single space.
pub fn decode_unstructured(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    let mut previous_encoded = false;
    let mut pending_space = false;

    for word in text.split_ascii_whitespace() {
        match ew_decode(word) {
            Some(decoded) => {
                if pending_space && !previous_encoded {
                    out.push(' ');
                }
                out.push_str(&decoded);
                previous_encoded = true;
            }
            None => {
                if pending_space {
                    out.push(' ');
                }
                out.push_str(word);
                previous_encoded = false;
            }
        }
        pending_space = true;
    }

    out
}
