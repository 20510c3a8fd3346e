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
use crate::store::MailStore;

const AZURE_INBOX: &str = "\"b64user-mbox YXp1cmU= INBOX\"";
const CYAN_INBOX: &str = "\"b64user-mbox Y3lhbg== INBOX\"";

fn deliverer(setup: &Setup, name: &'static str) -> TestClient {
    let mut client = setup.connect(name);
    client.skip_greeting();
    ok(&client.command(&format!("D0 LOGIN \"{}\" stamps", DELIVERY_USER)));
    client
}

#[test]
fn delivery_capability() {
    let setup = set_up();
    let mut client = deliverer(&setup, "deliverycapability");

    has_line(
        &client.command("C1 CAPABILITY"),
        "* CAPABILITY IMAP4rev1 IDLE SASL-IR UIDPLUS AUTH=PLAIN AUTH=CRAM-MD5 \
         X-POSTBOX-DELIVERY",
    );
    ok(&client.command("C2 NOOP"));
}

#[test]
fn delivers_to_the_named_user() {
    let setup = set_up();
    let mut client = deliverer(&setup, "deliverstouser");

    let lines = client.literal_command(
        &format!("D1 APPEND {}", AZURE_INBOX),
        SAMPLE_MESSAGE.as_bytes(),
    );
    assert_eq!(vec!["D1 OK [APPENDUID 1 1] APPEND completed"], lines);

    let azure = setup.store("azure");
    let inbox = azure.mailbox_id("INBOX").unwrap();
    assert_eq!(
        SAMPLE_MESSAGE.as_bytes(),
        &azure.message_data(inbox, 1).unwrap()[..]
    );

    let cyan = setup.store("cyan");
    let cyan_inbox = cyan.mailbox_id("INBOX").unwrap();
    assert_eq!(0, cyan.message_count(cyan_inbox).unwrap());
}

#[test]
fn delivery_to_other_mailboxes() {
    let setup = set_up();
    setup.store("azure").create_mailbox("Lists").unwrap();
    let mut client = deliverer(&setup, "deliverymailboxes");

    ok(&client.literal_command(
        "D1 APPEND \"b64user-mbox YXp1cmU= Lists\" (\\Flagged)",
        SAMPLE_MESSAGE.as_bytes(),
    ));
    assert_eq!(
        vec!["D2 NO [TRYCREATE] not found a mailbox"],
        client.literal_command(
            "D2 APPEND \"b64user-mbox YXp1cmU= Nowhere\"",
            SAMPLE_MESSAGE.as_bytes(),
        )
    );

    let azure = setup.store("azure");
    let lists = azure.mailbox_id("Lists").unwrap();
    assert_eq!(1, azure.message_count(lists).unwrap());
}

#[test]
fn delivery_reuses_the_open_store() {
    let setup = set_up();
    let mut client = deliverer(&setup, "deliveryreuse");
    assert_eq!(0, setup.cxt.pool.open_count());

    for tag in &["D1", "D2"] {
        ok(&client.literal_command(
            &format!("{} APPEND {}", tag, AZURE_INBOX),
            SAMPLE_MESSAGE.as_bytes(),
        ));
        assert_eq!(1, setup.cxt.pool.open_count());
    }

    // Switching recipients releases the previous store
    ok(&client.literal_command(
        &format!("D3 APPEND {}", CYAN_INBOX),
        SAMPLE_MESSAGE.as_bytes(),
    ));
    assert_eq!(1, setup.cxt.pool.open_count());

    let azure = setup.store("azure");
    let inbox = azure.mailbox_id("INBOX").unwrap();
    assert_eq!(2, azure.message_count(inbox).unwrap());

    client.command("Q1 LOGOUT");
    assert!(client.is_closed());
    assert_eq!(0, setup.cxt.pool.open_count());
}

#[test]
fn delivery_recovers_aborted_store() {
    let setup = set_up();
    let cyan = setup.store("cyan");
    cyan.set_aborted_transaction(true);
    let mut client = deliverer(&setup, "deliveryrecovers");

    let lines = client.literal_command(
        &format!("D1 APPEND {}", CYAN_INBOX),
        SAMPLE_MESSAGE.as_bytes(),
    );
    assert_eq!(
        vec![
            "* OK [ALERT] start user data recovery.",
            "* OK completed user data recovery.",
            "D1 OK [APPENDUID 1 1] APPEND completed",
        ],
        lines
    );
    assert!(!cyan.aborted_transaction());
}

#[test]
fn delivery_rejects_bad_targets() {
    let setup = set_up();
    let mut client = deliverer(&setup, "deliverybadtargets");

    assert_eq!(
        vec!["D1 NO not found a user"],
        client.literal_command(
            "D1 APPEND \"b64user-mbox bm9ib2R5 INBOX\"",
            SAMPLE_MESSAGE.as_bytes(),
        )
    );
    bad(&client.literal_command("D2 APPEND INBOX", SAMPLE_MESSAGE.as_bytes()));
    bad(&client.literal_command(
        "D3 APPEND \"b64user-mbox !!! INBOX\"",
        SAMPLE_MESSAGE.as_bytes(),
    ));
}

#[test]
fn delivery_user_may_only_append() {
    let setup = set_up();
    let mut client = deliverer(&setup, "deliveryonlyappend");

    for command in &[
        "N1 SELECT INBOX",
        "N2 CREATE Archive",
        "N3 LIST \"\" *",
        "N4 FETCH 1 FLAGS",
    ] {
        let lines = client.command(command);
        assert_eq!(1, lines.len());
        assert!(
            lines[0].ends_with(" NO not allowed command on mail delivery user"),
            "{:?}",
            lines
        );
    }

    assert_eq!(
        vec!["N5 NO duplicated login"],
        client.command("N5 LOGIN azure hunter2")
    );
}
