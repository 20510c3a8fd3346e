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

use std::time::Duration;

use super::defs::*;
use crate::store::{FlagSet, MailStore};

#[test]
fn noop_before_login() {
    let setup = set_up();
    let mut client = setup.connect("noopbeforelogin");
    client.skip_greeting();

    let lines = client.command("A001 NOOP");
    assert_eq!(vec!["A001 OK NOOP completed".to_owned()], lines);
}

#[test]
fn select_reports_mailbox_state() {
    let setup = set_up();
    let store = setup.store("azure");
    add_message(&store, "INBOX", 1, SAMPLE_MESSAGE, FlagSet::SEEN);
    add_message(&store, "INBOX", 2, SAMPLE_MESSAGE, FlagSet::SEEN);
    add_message(&store, "INBOX", 3, SAMPLE_MESSAGE, FlagSet::empty());

    let mut client = setup.connect("selectreports");
    client.quick_log_in();

    let lines = client.command("A002 SELECT INBOX");
    assert_eq!(
        vec![
            "* 3 EXISTS",
            "* 0 RECENT",
            "* OK [UNSEEN 3] first unseen",
            "* OK [UIDVALIDITY 1] UIDs valid",
            "* OK [UIDNEXT 4] predicted next UID",
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)",
            "* OK [PERMANENTFLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)] \
             flags permitted",
            "A002 OK [READ-WRITE] SELECT completed",
        ],
        lines
    );
}

#[test]
fn search_unseen() {
    let setup = set_up();
    let store = setup.store("azure");
    add_message(&store, "INBOX", 1, SAMPLE_MESSAGE, FlagSet::SEEN);
    add_message(&store, "INBOX", 2, SAMPLE_MESSAGE, FlagSet::empty());

    let mut client = setup.connect("searchunseen");
    client.quick_log_in();
    client.quick_select("INBOX");

    let lines = client.command("A003 SEARCH UNSEEN");
    assert_eq!(
        vec!["* SEARCH 2".to_owned(), "A003 OK SEARCH completed".to_owned()],
        lines
    );
}

#[test]
fn fetch_uid_and_flags() {
    let setup = set_up();
    let store = setup.store("azure");
    add_message(&store, "INBOX", 101, SAMPLE_MESSAGE, FlagSet::SEEN);

    let mut client = setup.connect("fetchuidflags");
    client.quick_log_in();
    client.quick_select("INBOX");

    let lines = client.command("A004 FETCH 1 (UID FLAGS)");
    assert_eq!(
        vec![
            "* 1 FETCH (UID 101 FLAGS (\\Seen))".to_owned(),
            "A004 OK FETCH completed".to_owned(),
        ],
        lines
    );
}

#[test]
fn store_adds_deleted() {
    let setup = set_up();
    let store = setup.store("azure");
    add_message(&store, "INBOX", 101, SAMPLE_MESSAGE, FlagSet::SEEN);

    let mut client = setup.connect("storeaddsdeleted");
    client.quick_log_in();
    client.quick_select("INBOX");

    let lines = client.command("A005 STORE 1 +FLAGS (\\Deleted)");
    assert_eq!(
        vec![
            "* 1 FETCH (FLAGS (\\Deleted \\Seen))".to_owned(),
            "A005 OK STORE completed".to_owned(),
        ],
        lines
    );
}

#[test]
fn create_times_out_behind_exclusive_lock() {
    let setup = set_up_with(|config| {
        config.lock.write_lock_timeout_seconds = 0.2;
    });

    let mut client = setup.connect("createtimesout");
    client.quick_log_in();

    let holder = setup.cxt.pool.acquire(&setup.user_id("azure")).unwrap();
    let guard = holder.lock().write(Duration::from_secs(5)).unwrap();

    let lines = client.command("A006 CREATE Archive");
    assert_eq!(
        vec!["A006 BAD write-lock timeout over 0.2 seconds".to_owned()],
        lines
    );

    drop(guard);
    setup.cxt.pool.release(holder).unwrap();

    // The session survives the timeout
    ok(&client.command("A007 CREATE Archive"));
    assert_eq!(2, setup.store("azure").mailboxes().len());
}
