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

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::prelude::*;

use crate::auth::{Authenticator, PasswordAuthenticator};
use crate::imap::decoder::{Context, Decoder};
use crate::store::memory::{MemoryDirectory, MemoryStore};
use crate::store::pool::StorePool;
use crate::store::{FlagSet, MailStore, MailboxId};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

pub const DELIVERY_USER: &str = "#postman";

pub const SAMPLE_MESSAGE: &str = "From: alice@example.com\r\n\
                                  To: azure@example.com\r\n\
                                  Subject: Hello\r\n\
                                  Date: Mon, 1 Jun 2020 12:00:00 +0000\r\n\
                                  \r\n\
                                  Hello world\r\n";

pub struct Setup {
    pub directory: MemoryDirectory,
    pub authenticator: Arc<PasswordAuthenticator>,
    pub cxt: Arc<Context>,
}

pub fn set_up() -> Setup {
    set_up_with(|_| ())
}

pub fn set_up_with(configure: impl FnOnce(&mut SystemConfig)) -> Setup {
    crate::init_test_log();

    let mut config = SystemConfig::default();
    configure(&mut config);

    let authenticator = Arc::new(PasswordAuthenticator::new("localhost".to_owned()));
    authenticator.add_user("azure", "hunter2");
    authenticator.add_user("cyan", "hunter3");
    authenticator.add_user(DELIVERY_USER, "stamps");

    let directory = MemoryDirectory::new();
    let pool = Arc::new(StorePool::new(directory.factory()));
    let cxt = Arc::new(Context::new(
        config,
        pool,
        Arc::clone(&authenticator) as Arc<dyn Authenticator>,
    ));

    Setup {
        directory,
        authenticator,
        cxt,
    }
}

impl Setup {
    /// The store the server uses for `user`.
    pub fn store(&self, user: &str) -> MemoryStore {
        let user_id = self.user_id(user);
        self.directory.store(&user_id)
    }

    pub fn user_id(&self, user: &str) -> String {
        self.authenticator.unique_user_id(user).unwrap()
    }

    /// Start a server thread talking to a new client over a socket pair.
    pub fn connect(&self, name: &'static str) -> TestClient {
        let (server_sock, client_sock) = UnixStream::pair().unwrap();
        client_sock
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        let cxt = Arc::clone(&self.cxt);
        thread::spawn(move || {
            let server_out = server_sock.try_clone().unwrap();
            let decoder = Decoder::new(
                BufReader::new(server_sock),
                server_out,
                cxt,
                LogPrefix::new(name.to_owned()),
            );

            match decoder.run() {
                Ok(()) => (),
                Err(Error::Io(e))
                    if io::ErrorKind::BrokenPipe == e.kind()
                        || io::ErrorKind::ConnectionReset == e.kind()
                        || io::ErrorKind::UnexpectedEof == e.kind() => {}
                Err(e) => panic!("Unexpected server error: {}", e),
            }
        });

        TestClient {
            reader: BufReader::new(client_sock.try_clone().unwrap()),
            writer: client_sock,
        }
    }
}

/// Add a message directly to `store`, bypassing the server.
pub fn add_message(
    store: &MemoryStore,
    mailbox: &str,
    uid: u32,
    data: &str,
    flags: FlagSet,
) -> MailboxId {
    let id = store.mailbox_id(mailbox).unwrap();
    store
        .insert_message(
            id,
            uid,
            data.as_bytes(),
            FixedOffset::east(0).ymd(2020, 6, 1).and_hms(12, 0, 0),
            flags,
        )
        .unwrap();
    id
}

pub struct TestClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl TestClient {
    /// Send `line` followed by CRLF.
    pub fn send(&mut self, line: &str) {
        self.send_bytes(line.as_bytes());
        self.send_bytes(b"\r\n");
    }

    pub fn send_bytes(&mut self, data: &[u8]) {
        self.writer.write_all(data).unwrap();
        self.writer.flush().unwrap();
    }

    /// Read one line, without its line ending.
    pub fn read_line(&mut self) -> String {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).unwrap();
        assert!(n > 0, "Unexpected end of stream");
        while buf.ends_with(b"\n") || buf.ends_with(b"\r") {
            buf.pop();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Whether the server closed the connection.
    pub fn is_closed(&mut self) -> bool {
        let mut buf = Vec::new();
        matches!(self.reader.read_until(b'\n', &mut buf), Ok(0))
    }

    /// Send `line` and read responses up to and including the tagged one.
    pub fn command(&mut self, line: &str) -> Vec<String> {
        self.send(line);
        self.responses(line.split(' ').next().unwrap())
    }

    /// Read responses up to and including the one tagged with `tag`.
    pub fn responses(&mut self, tag: &str) -> Vec<String> {
        let prefix = format!("{} ", tag);
        let mut lines = Vec::new();
        loop {
            let line = self.read_line();
            let done = line.starts_with(&prefix);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    /// Send a command whose last argument is `literal`, going through the
    /// continuation request.
    pub fn literal_command(&mut self, prefix: &str, literal: &[u8]) -> Vec<String> {
        self.send(&format!("{} {{{}}}", prefix, literal.len()));
        assert_eq!("+ continue-req", self.read_line());
        self.send_bytes(literal);
        self.send_bytes(b"\r\n");
        self.responses(prefix.split(' ').next().unwrap())
    }

    pub fn skip_greeting(&mut self) {
        let greeting = self.read_line();
        assert!(greeting.starts_with("* OK postbox v"), "{}", greeting);
    }

    pub fn quick_log_in(&mut self) {
        self.skip_greeting();
        ok(&self.command("L1 LOGIN azure hunter2"));
    }

    pub fn quick_select(&mut self, mailbox: &str) {
        ok(&self.command(&format!("S1 SELECT {}", mailbox)));
    }
}

/// Assert that the tagged response is `OK` and return the untagged lines.
pub fn ok(lines: &[String]) -> &[String] {
    tagged(lines, "OK")
}

pub fn no(lines: &[String]) -> &[String] {
    tagged(lines, "NO")
}

pub fn bad(lines: &[String]) -> &[String] {
    tagged(lines, "BAD")
}

fn tagged<'a>(lines: &'a [String], cond: &str) -> &'a [String] {
    let (last, untagged) = lines.split_last().unwrap();
    let cond_word = last.split(' ').nth(1);
    assert_eq!(Some(cond), cond_word, "Unexpected response: {:?}", lines);
    untagged
}

/// The final (tagged) line of a response.
pub fn last(lines: &[String]) -> &str {
    lines.last().unwrap()
}

/// Assert that some line of `lines` is exactly `expected`.
pub fn has_line(lines: &[String], expected: &str) {
    assert!(
        lines.iter().any(|l| l == expected),
        "Expected line {:?} in {:?}",
        expected,
        lines
    );
}
