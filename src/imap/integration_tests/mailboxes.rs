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
use crate::store::{Flag, FlagSet, MailStore};

#[test]
fn create_rename_delete() {
    let setup = set_up();
    let mut client = setup.connect("createrenamedelete");
    client.quick_log_in();

    ok(&client.command("M1 CREATE Archive"));
    assert_eq!(
        "M2 NO duplicated mailbox",
        last(&client.command("M2 CREATE Archive"))
    );
    bad(&client.command("M3 CREATE \"\""));

    ok(&client.command("M4 RENAME Archive Attic"));
    assert_eq!(
        "M5 NO not found a mailbox",
        last(&client.command("M5 RENAME Archive Cellar"))
    );
    bad(&client.command("M6 RENAME INBOX Cellar"));

    ok(&client.command("M7 DELETE Attic"));
    assert_eq!(
        "M8 NO not found a mailbox",
        last(&client.command("M8 DELETE Attic"))
    );
    bad(&client.command("M9 DELETE INBOX"));

    let store = setup.store("azure");
    assert_eq!(
        vec!["INBOX".to_owned()],
        store
            .mailboxes()
            .into_iter()
            .map(|(_, name)| name)
            .collect::<Vec<_>>()
    );
}

#[test]
fn list_and_lsub() {
    let setup = set_up();
    let store = setup.store("azure");
    store.create_mailbox("Archive").unwrap();
    store.create_mailbox("Lists").unwrap();
    add_message(&store, "Lists", 1, SAMPLE_MESSAGE, FlagSet::RECENT);

    let mut client = setup.connect("listandlsub");
    client.quick_log_in();

    let lines = client.command("L2 LIST \"\" *");
    assert_eq!(
        vec![
            "* LIST (\\Noinferiors \\Unmarked) NIL Archive",
            "* LIST (\\Noinferiors \\Unmarked) NIL INBOX",
            "* LIST (\\Noinferiors \\Marked) NIL Lists",
            "L2 OK LIST completed",
        ],
        lines
    );

    let lines = client.command("L3 LIST \"\" inbox");
    assert_eq!(
        vec![
            "* LIST (\\Noinferiors \\Unmarked) NIL INBOX",
            "L3 OK LIST completed",
        ],
        lines
    );

    let lines = client.command("L4 LSUB \"\" L%");
    assert_eq!(
        vec![
            "* LSUB (\\Noinferiors \\Marked) NIL Lists",
            "L4 OK LSUB completed",
        ],
        lines
    );

    let lines = client.command("L5 LIST \"\" \"\"");
    assert_eq!(
        vec!["* LIST (\\Noselect) NIL \"\"", "L5 OK LIST completed"],
        lines
    );

    assert_eq!(vec!["L6 OK LIST completed"], client.command("L6 LIST \"\" x*"));
}

#[test]
fn subscriptions() {
    let setup = set_up();
    let mut client = setup.connect("subscriptions");
    client.quick_log_in();

    ok(&client.command("U1 SUBSCRIBE INBOX"));
    no(&client.command("U2 SUBSCRIBE Nowhere"));
    assert_eq!(
        "U3 NO not supported",
        last(&client.command("U3 UNSUBSCRIBE INBOX"))
    );
}

#[test]
fn status_items() {
    let setup = set_up();
    let store = setup.store("azure");
    add_message(&store, "INBOX", 4, SAMPLE_MESSAGE, FlagSet::SEEN);
    add_message(&store, "INBOX", 5, SAMPLE_MESSAGE, FlagSet::RECENT);
    add_message(&store, "INBOX", 9, SAMPLE_MESSAGE, FlagSet::empty());

    let mut client = setup.connect("statusitems");
    client.quick_log_in();

    let lines = client.command(
        "T1 STATUS INBOX (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)",
    );
    assert_eq!(
        vec![
            "* STATUS INBOX (MESSAGES 3 RECENT 1 UIDNEXT 10 UIDVALIDITY 1 \
             UNSEEN 2)",
            "T1 OK STATUS completed",
        ],
        lines
    );

    no(&client.command("T2 STATUS Nowhere (MESSAGES)"));
    bad(&client.command("T3 STATUS INBOX (SIZE)"));
    bad(&client.command("T4 STATUS INBOX ()"));
}

#[test]
fn append_with_flags_and_date() {
    let setup = set_up();
    let mut client = setup.connect("appendflags");
    client.quick_log_in();

    let lines = client.literal_command(
        "A1 APPEND INBOX (\\Seen \\Flagged) \"14-Jul-2020 02:44:25 -0700\"",
        SAMPLE_MESSAGE.as_bytes(),
    );
    assert_eq!(vec!["A1 OK [APPENDUID 1 1] APPEND completed"], lines);

    let store = setup.store("azure");
    let inbox = store.mailbox_id("INBOX").unwrap();
    let flags = store.flags(inbox, 1).unwrap();
    assert!(flags.has(Flag::Seen));
    assert!(flags.has(Flag::Flagged));
    assert!(flags.has(Flag::Recent));
    assert_eq!(
        SAMPLE_MESSAGE.as_bytes(),
        &store.message_data(inbox, 1).unwrap()[..]
    );
    assert_eq!(
        "2020-07-14T02:44:25-07:00",
        store.internal_date(inbox, 1).unwrap().to_rfc3339()
    );

    let lines = client.literal_command("A2 APPEND INBOX", b"Subject: 2\r\n\r\n");
    assert_eq!(vec!["A2 OK [APPENDUID 1 2] APPEND completed"], lines);
}

#[test]
fn append_failures() {
    let setup = set_up();
    let mut client = setup.connect("appendfailures");
    client.quick_log_in();

    let lines = client.literal_command("A1 APPEND Nowhere", b"Subject: x\r\n\r\n");
    assert_eq!(
        vec!["A1 NO [TRYCREATE] not found a mailbox"],
        lines
    );

    let lines = client
        .literal_command("A2 APPEND INBOX (\\Recent)", b"Subject: x\r\n\r\n");
    bad(&lines);

    bad(&client.command("A3 APPEND INBOX"));

    let store = setup.store("azure");
    let inbox = store.mailbox_id("INBOX").unwrap();
    assert_eq!(0, store.message_count(inbox).unwrap());
}

#[test]
fn append_notifies_selected_sessions() {
    let setup = set_up();
    let mut watcher = setup.connect("appendnotifies");
    watcher.quick_log_in();
    watcher.quick_select("INBOX");

    let mut client = setup.connect("appendnotifies2");
    client.quick_log_in();
    ok(&client.literal_command("A1 APPEND INBOX", b"Subject: x\r\n\r\n"));

    let lines = watcher.command("W1 NOOP");
    assert_eq!(vec!["* 1 EXISTS", "W1 OK NOOP completed"], lines);
}

#[test]
fn examine_is_read_only() {
    let setup = set_up();
    let store = setup.store("azure");
    let inbox = add_message(&store, "INBOX", 1, SAMPLE_MESSAGE, FlagSet::RECENT);

    let mut client = setup.connect("examine");
    client.quick_log_in();

    let lines = client.command("E1 EXAMINE INBOX");
    has_line(&lines, "* 1 RECENT");
    has_line(&lines, "* OK [PERMANENTFLAGS ()] read-only folder");
    assert_eq!("E1 OK [READ-ONLY] EXAMINE completed", last(&lines));

    assert_eq!(
        "E2 NO read-only folder",
        last(&client.command("E2 STORE 1 +FLAGS (\\Deleted)"))
    );
    assert_eq!("E3 NO read-only folder", last(&client.command("E3 EXPUNGE")));

    ok(&client.command("E4 FETCH 1 BODY[TEXT]"));
    ok(&client.command("E5 CLOSE"));

    // Neither FETCH nor deselecting a read-only folder changes flags
    assert_eq!(FlagSet::RECENT, store.flags(inbox, 1).unwrap());
}

#[test]
fn select_clears_recent_of_previous_folder() {
    let setup = set_up();
    let store = setup.store("azure");
    let inbox = add_message(&store, "INBOX", 1, SAMPLE_MESSAGE, FlagSet::RECENT);
    store.create_mailbox("Archive").unwrap();

    let mut client = setup.connect("selectclearsrecent");
    client.quick_log_in();

    has_line(&client.command("S1 SELECT INBOX"), "* 1 RECENT");
    ok(&client.command("S2 SELECT Archive"));
    assert_eq!(FlagSet::empty(), store.flags(inbox, 1).unwrap());

    has_line(&client.command("S3 SELECT INBOX"), "* 0 RECENT");
}

#[test]
fn failed_select_leaves_nothing_selected() {
    let setup = set_up();
    let mut client = setup.connect("failedselect");
    client.quick_log_in();
    client.quick_select("INBOX");

    no(&client.command("S2 SELECT Nowhere"));
    assert_eq!(
        "S3 NO not selected",
        last(&client.command("S3 SEARCH ALL"))
    );
}
