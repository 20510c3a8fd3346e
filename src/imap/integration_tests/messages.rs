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

use super::defs::*;
use crate::store::memory::MemoryStore;
use crate::store::{Flag, FlagSet, MailStore, MailboxId};

/// INBOX with UIDs 101 (seen), 102 (flagged) and 103 (deleted, recent).
fn populated(setup: &Setup) -> (MemoryStore, MailboxId) {
    let store = setup.store("azure");
    add_message(&store, "INBOX", 101, SAMPLE_MESSAGE, FlagSet::SEEN);
    add_message(&store, "INBOX", 102, SAMPLE_MESSAGE, FlagSet::FLAGGED);
    let inbox = add_message(
        &store,
        "INBOX",
        103,
        "Subject: Third\r\n\r\nSomething else\r\n",
        FlagSet::DELETED | FlagSet::RECENT,
    );
    (store, inbox)
}

#[test]
fn search_keys() {
    let setup = set_up();
    populated(&setup);
    let mut client = setup.connect("searchkeys");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec!["* SEARCH 1 2 3", "S1 OK SEARCH completed"],
        client.command("S1 SEARCH ALL")
    );
    assert_eq!(
        vec!["* SEARCH 102 103", "S2 OK UID SEARCH completed"],
        client.command("S2 UID SEARCH UNSEEN")
    );
    has_line(&client.command("S3 SEARCH SUBJECT hello"), "* SEARCH 1 2");
    has_line(
        &client.command("S4 SEARCH CHARSET UTF-8 BODY \"something\""),
        "* SEARCH 3",
    );
    has_line(&client.command("S5 SEARCH OR SEEN FLAGGED"), "* SEARCH 1 2");
    has_line(&client.command("S6 SEARCH NOT DELETED 2:*"), "* SEARCH 2");
    has_line(&client.command("S7 SEARCH UID 102:103 RECENT"), "* SEARCH 3");
    has_line(&client.command("S8 SEARCH KEYWORD $Junk"), "* SEARCH");

    bad(&client.command("S9 SEARCH FROZZLE"));
    bad(&client.command("S10 SEARCH CHARSET KLINGON ALL"));
}

#[test]
fn grouped_search_keys_match_flattened() {
    let setup = set_up();
    populated(&setup);
    let mut client = setup.connect("groupedsearch");
    client.quick_log_in();
    client.quick_select("INBOX");

    let grouped = client.command("G1 SEARCH (UNSEEN) (SUBJECT hello)");
    let flat = client.command("G2 SEARCH UNSEEN SUBJECT hello");
    assert_eq!("* SEARCH 2", grouped[0]);
    assert_eq!(grouped[0], flat[0]);
}

#[test]
fn search_on_empty_folder() {
    let setup = set_up();
    let mut client = setup.connect("emptysearch");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec!["* SEARCH", "E1 OK SEARCH completed"],
        client.command("E1 SEARCH ALL")
    );
    assert_eq!(
        vec!["* SEARCH", "E2 OK SEARCH completed"],
        client.command("E2 SEARCH OR SEEN UNSEEN")
    );
}

#[test]
fn fetch_body_sets_seen_before_flags() {
    let setup = set_up();
    let store = setup.store("azure");
    let inbox = add_message(&store, "INBOX", 7, SAMPLE_MESSAGE, FlagSet::empty());

    let mut watcher = setup.connect("fetchseen2");
    watcher.quick_log_in();
    watcher.quick_select("INBOX");

    let mut client = setup.connect("fetchseen");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec![
            "* 1 FETCH (BODY[TEXT] {13}",
            "Hello world",
            " FLAGS (\\Seen))",
            "F1 OK FETCH completed",
        ],
        client.command("F1 FETCH 1 (BODY[TEXT] FLAGS)")
    );
    assert!(store.flags(inbox, 7).unwrap().has(Flag::Seen));

    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Seen))", "W1 OK NOOP completed"],
        watcher.command("W1 NOOP")
    );
}

#[test]
fn fetch_peek_leaves_flags_alone() {
    let setup = set_up();
    let store = setup.store("azure");
    let inbox = add_message(&store, "INBOX", 7, SAMPLE_MESSAGE, FlagSet::empty());

    let mut client = setup.connect("fetchpeek");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec![
            "* 1 FETCH (FLAGS () BODY[HEADER.FIELDS (SUBJECT)] {18}",
            "Subject: Hello",
            "",
            ")",
            "P1 OK FETCH completed",
        ],
        client.command("P1 FETCH 1 (FLAGS BODY.PEEK[HEADER.FIELDS (Subject)])")
    );
    assert_eq!(FlagSet::empty(), store.flags(inbox, 7).unwrap());
}

#[test]
fn uid_fetch_adds_uid() {
    let setup = set_up();
    populated(&setup);
    let mut client = setup.connect("uidfetch");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec![
            "* 2 FETCH (UID 102 FLAGS (\\Flagged))",
            "* 3 FETCH (UID 103 FLAGS (\\Deleted \\Recent))",
            "U1 OK UID FETCH completed",
        ],
        client.command("U1 UID FETCH 102:* FLAGS")
    );
    assert_eq!(
        vec![
            "* 1 FETCH (RFC822.SIZE 117 UID 101)",
            "U2 OK UID FETCH completed",
        ],
        client.command("U2 UID FETCH 101 (RFC822.SIZE UID)")
    );
    assert_eq!(
        vec!["U3 OK UID FETCH completed"],
        client.command("U3 UID FETCH 500 FLAGS")
    );
}

#[test]
fn fetch_errors() {
    let setup = set_up();
    populated(&setup);
    let mut client = setup.connect("fetcherrors");
    client.quick_log_in();
    client.quick_select("INBOX");

    bad(&client.command("F1 FETCH 1 (FLAGS BOGUS)"));
    bad(&client.command("F2 FETCH 1 BODY[BOGUS]"));
    bad(&client.command("F3 FETCH"));
    no(&client.command("F4 FETCH 9 FLAGS"));
}

#[test]
fn store_variants() {
    let setup = set_up();
    let (store, inbox) = populated(&setup);
    let mut client = setup.connect("storevariants");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec![
            "* 3 FETCH (FLAGS (\\Flagged \\Recent))",
            "S1 OK STORE completed",
        ],
        client.command("S1 STORE 3 FLAGS (\\Flagged)")
    );
    assert_eq!(
        vec!["S2 OK STORE completed"],
        client.command("S2 STORE 1:2 -FLAGS.SILENT (\\Seen \\Flagged)")
    );
    assert_eq!(FlagSet::empty(), store.flags(inbox, 101).unwrap());
    assert_eq!(FlagSet::empty(), store.flags(inbox, 102).unwrap());

    assert_eq!(
        vec![
            "* 1 FETCH (UID 101 FLAGS (\\Answered \\Draft))",
            "S3 OK UID STORE completed",
        ],
        client.command("S3 UID STORE 101 +FLAGS \\Answered \\Draft")
    );

    bad(&client.command("S4 STORE 1 +FLAGS (\\Recent)"));
    bad(&client.command("S5 STORE 1 FROBS (\\Seen)"));
    bad(&client.command("S6 STORE 1 +FLAGS"));
}

#[test]
fn store_notifies_other_sessions() {
    let setup = set_up();
    populated(&setup);

    let mut watcher = setup.connect("storenotifies2");
    watcher.quick_log_in();
    watcher.quick_select("INBOX");

    let mut client = setup.connect("storenotifies");
    client.quick_log_in();
    client.quick_select("INBOX");
    ok(&client.command("S1 STORE 2 +FLAGS.SILENT (\\Answered)"));
    // No change, so nothing to announce
    ok(&client.command("S2 STORE 1 +FLAGS.SILENT (\\Seen)"));

    assert_eq!(
        vec![
            "* 2 FETCH (FLAGS (\\Answered \\Flagged))",
            "W1 OK NOOP completed",
        ],
        watcher.command("W1 NOOP")
    );
}

#[test]
fn copy_reports_uids() {
    let setup = set_up();
    let (store, _) = populated(&setup);
    let archive = store.create_mailbox("Archive").unwrap();

    let mut client = setup.connect("copyuids");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec!["C1 OK [COPYUID 2 101:102 1:2] COPY completed"],
        client.command("C1 COPY 1:2 Archive")
    );
    assert_eq!(
        vec!["C2 OK [COPYUID 2 103 3] UID COPY completed"],
        client.command("C2 UID COPY 103 Archive")
    );
    assert_eq!(3, store.message_count(archive).unwrap());
    assert!(store.flags(archive, 1).unwrap().has(Flag::Seen));

    assert_eq!(
        vec!["C3 NO [TRYCREATE] not found a mailbox"],
        client.command("C3 COPY 1 Nowhere")
    );
}

#[test]
fn expunge_reports_descending_sequence_numbers() {
    let setup = set_up();
    let store = setup.store("azure");
    for uid in 1..=4 {
        let flags = if 2 == uid || 3 == uid {
            FlagSet::DELETED
        } else {
            FlagSet::empty()
        };
        add_message(&store, "INBOX", uid, SAMPLE_MESSAGE, flags);
    }

    let mut watcher = setup.connect("expunge2");
    watcher.quick_log_in();
    watcher.quick_select("INBOX");

    let mut client = setup.connect("expunge");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec!["* 3 EXPUNGE", "* 2 EXPUNGE", "X1 OK EXPUNGE completed"],
        client.command("X1 EXPUNGE")
    );
    assert_eq!(
        vec!["* SEARCH 1 4", "X2 OK UID SEARCH completed"],
        client.command("X2 UID SEARCH ALL")
    );
    assert_eq!(
        vec!["* 3 EXPUNGE", "* 2 EXPUNGE", "W1 OK NOOP completed"],
        watcher.command("W1 NOOP")
    );
}

#[test]
fn uid_expunge_is_restricted_to_the_set() {
    let setup = set_up();
    let (store, inbox) = populated(&setup);
    store.set_flag(inbox, 101, Flag::Deleted, true).unwrap();

    let mut client = setup.connect("uidexpunge");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec!["* 3 EXPUNGE", "X1 OK UID EXPUNGE completed"],
        client.command("X1 UID EXPUNGE 102:*")
    );
    assert_eq!(vec![101, 102], store.message_uids(inbox).unwrap());
}

#[test]
fn close_expunges_silently() {
    let setup = set_up();
    let (store, inbox) = populated(&setup);
    let mut client = setup.connect("closeexpunges");
    client.quick_log_in();
    client.quick_select("INBOX");

    assert_eq!(
        vec!["C1 OK CLOSE completed"],
        client.command("C1 CLOSE")
    );
    assert_eq!(vec![101, 102], store.message_uids(inbox).unwrap());
    assert_eq!(0, store.flag_count(inbox, Flag::Recent).unwrap());
    no(&client.command("C2 FETCH 1 FLAGS"));
}

#[test]
fn check_syncs_the_store() {
    let setup = set_up();
    let store = setup.store("azure");
    let mut client = setup.connect("checksyncs");
    client.quick_log_in();
    client.quick_select("INBOX");

    let before = store.sync_count();
    assert_eq!(
        vec!["K1 OK CHECK completed"],
        client.command("K1 CHECK")
    );
    assert_eq!(before + 1, store.sync_count());
}
