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

//! The `ENVELOPE` and `BODYSTRUCTURE` responses.
//!
//! Both are written straight from the `mime::Message` tree. The formats are
//! those of RFC 3501 section 7.4.2; in outline:
//!
//! - `multipart/*`: (child)(child)... subtype §
//!   (params) (disposition params) language location
//! - `message/rfc822`: type subtype (params) id description encoding size
//!   (envelope) (bodystructure) lines § md5 (disposition params) language
//!   location
//! - `text/*`: type subtype (params) id description encoding size lines §
//!   md5 (disposition params) language location
//! - anything else: type subtype (params) id description encoding size §
//!   md5 (disposition params) language location
//!
//! Fields after § are the extension data, only sent for `BODYSTRUCTURE`.

use std::io::Write;

use openssl::hash::{hash, MessageDigest};

use crate::imap::lex::LexWriter;
use crate::mime::header::{Address, Mailbox};
use crate::mime::Message;
use crate::support::error::Error;

/// Write the `ENVELOPE` of `message`.
pub fn write_envelope<W: Write>(
    lw: &mut LexWriter<W>,
    message: &Message,
) -> Result<(), Error> {
    let from = message.addresses("From");
    // Sender and Reply-To default to From
    let or_from = |name: &str| {
        let list = message.addresses(name);
        if list.is_empty() {
            from.clone()
        } else {
            list
        }
    };

    lw.verbatim("(")?;
    write_text_field(lw, message, "Date")?;
    lw.verbatim(" ")?;
    write_text_field(lw, message, "Subject")?;
    for list in &[
        from.clone(),
        or_from("Sender"),
        or_from("Reply-To"),
        message.addresses("To"),
        message.addresses("Cc"),
        message.addresses("Bcc"),
    ] {
        lw.verbatim(" ")?;
        write_addresses(lw, list)?;
    }
    lw.verbatim(" ")?;
    write_text_field(lw, message, "In-Reply-To")?;
    lw.verbatim(" ")?;
    write_text_field(lw, message, "Message-ID")?;
    lw.verbatim(")")?;
    Ok(())
}

/// Write the unfolded raw value of a header field, or `NIL`.
fn write_text_field<W: Write>(
    lw: &mut LexWriter<W>,
    message: &Message,
    name: &str,
) -> Result<(), Error> {
    let value = message.header_field(name).map(unfold);
    lw.nstring(value.as_ref().map(|v| v.as_bytes()))?;
    Ok(())
}

fn unfold(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .split_ascii_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_addresses<W: Write>(
    lw: &mut LexWriter<W>,
    list: &[Address],
) -> Result<(), Error> {
    if list.is_empty() {
        lw.nil()?;
        return Ok(());
    }

    lw.verbatim("(")?;
    for address in list {
        match *address {
            Address::Mailbox(ref mailbox) => write_mailbox(lw, mailbox)?,
            // Groups are delimited by a start marker carrying the group name
            // and an all-NIL end marker
            Address::Group(ref name, ref members) => {
                lw.verbatim("(NIL NIL ")?;
                lw.string(name.as_bytes())?;
                lw.verbatim(" NIL)")?;
                for member in members {
                    write_mailbox(lw, member)?;
                }
                lw.verbatim("(NIL NIL NIL NIL)")?;
            }
        }
    }
    lw.verbatim(")")?;
    Ok(())
}

fn write_mailbox<W: Write>(
    lw: &mut LexWriter<W>,
    mailbox: &Mailbox,
) -> Result<(), Error> {
    lw.verbatim("(")?;
    lw.nstring(mailbox.name.as_ref().map(|n| n.as_bytes()))?;
    lw.verbatim(" NIL ")?;
    lw.string(mailbox.local.as_bytes())?;
    lw.verbatim(" ")?;
    lw.string(mailbox.domain.as_bytes())?;
    lw.verbatim(")")?;
    Ok(())
}

/// Write the body structure of `message`, as `BODYSTRUCTURE` if `extended`
/// or as `BODY` otherwise.
pub fn write_body_structure<W: Write>(
    lw: &mut LexWriter<W>,
    message: &Message,
    extended: bool,
) -> Result<(), Error> {
    let content_type = message.content_type();
    lw.verbatim("(")?;

    if message.is_multipart() {
        if message.parts().is_empty() {
            // A multipart needs at least one child; describe an empty text
            // part rather than producing an unparsable response
            lw.verbatim("(\"text\" \"plain\" NIL NIL NIL \"7bit\" 0 0)")?;
        }
        for part in message.parts() {
            write_body_structure(lw, part, extended)?;
        }
        lw.verbatim(" ")?;
        lw.string(content_type.subtype.as_bytes())?;
        if extended {
            lw.verbatim(" ")?;
            write_params(lw, &content_type.params)?;
            lw.verbatim(" ")?;
            write_disposition(lw, message)?;
            lw.verbatim(" ")?;
            write_text_field(lw, message, "Content-Language")?;
            lw.verbatim(" ")?;
            write_text_field(lw, message, "Content-Location")?;
        }
        lw.verbatim(")")?;
        return Ok(());
    }

    lw.string(content_type.typ.as_bytes())?;
    lw.verbatim(" ")?;
    lw.string(content_type.subtype.as_bytes())?;
    lw.verbatim(" ")?;
    write_params(lw, &content_type.params)?;
    lw.verbatim(" ")?;
    write_text_field(lw, message, "Content-ID")?;
    lw.verbatim(" ")?;
    write_text_field(lw, message, "Content-Description")?;
    lw.verbatim(" ")?;
    lw.string(message.transfer_encoding().as_bytes())?;
    lw.verbatim(" ")?;
    lw.num(message.body_raw().len() as u64)?;

    if let Some(embedded) = message.embedded() {
        lw.verbatim(" ")?;
        write_envelope(lw, embedded)?;
        lw.verbatim(" ")?;
        write_body_structure(lw, embedded, extended)?;
        lw.verbatim(" ")?;
        lw.num(message.body_lines() as u64)?;
    } else if content_type.is_type("text") {
        lw.verbatim(" ")?;
        lw.num(message.body_lines() as u64)?;
    }

    if extended {
        lw.verbatim(" ")?;
        let md5 = hash(MessageDigest::md5(), message.body_raw())?;
        let md5 = md5.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        lw.string(md5.as_bytes())?;
        lw.verbatim(" ")?;
        write_disposition(lw, message)?;
        lw.verbatim(" ")?;
        write_text_field(lw, message, "Content-Language")?;
        lw.verbatim(" ")?;
        write_text_field(lw, message, "Content-Location")?;
    }

    lw.verbatim(")")?;
    Ok(())
}

fn write_params<W: Write>(
    lw: &mut LexWriter<W>,
    params: &[(String, String)],
) -> Result<(), Error> {
    if params.is_empty() {
        lw.nil()?;
        return Ok(());
    }

    lw.verbatim("(")?;
    for (ix, &(ref name, ref value)) in params.iter().enumerate() {
        if ix > 0 {
            lw.verbatim(" ")?;
        }
        lw.string(name.as_bytes())?;
        lw.verbatim(" ")?;
        lw.string(value.as_bytes())?;
    }
    lw.verbatim(")")?;
    Ok(())
}

fn write_disposition<W: Write>(
    lw: &mut LexWriter<W>,
    message: &Message,
) -> Result<(), Error> {
    match message.disposition() {
        None => lw.nil()?,
        Some(disposition) => {
            lw.verbatim("(")?;
            lw.string(disposition.typ.as_bytes())?;
            lw.verbatim(" ")?;
            write_params(lw, &disposition.params)?;
            lw.verbatim(")")?;
        }
    }
    Ok(())
}
