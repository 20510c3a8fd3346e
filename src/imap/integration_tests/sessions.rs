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
use crate::auth::password::hmac_md5_hex;
use crate::store::{FlagSet, MailStore};

#[test]
fn capability_before_and_after_login() {
    let setup = set_up();
    let mut client = setup.connect("capability");
    client.skip_greeting();

    let lines = client.command("C1 CAPABILITY");
    assert_eq!(
        vec![
            "* CAPABILITY IMAP4rev1 IDLE SASL-IR UIDPLUS AUTH=PLAIN AUTH=CRAM-MD5",
            "C1 OK CAPABILITY completed",
        ],
        lines
    );

    ok(&client.command("C2 LOGIN azure hunter2"));
    has_line(
        &client.command("C3 CAPABILITY"),
        "* CAPABILITY IMAP4rev1 IDLE SASL-IR UIDPLUS AUTH=PLAIN AUTH=CRAM-MD5",
    );
}

#[test]
fn mailbox_commands_need_login() {
    let setup = set_up();
    let mut client = setup.connect("needlogin");
    client.skip_greeting();

    for command in &[
        "N1 SELECT INBOX",
        "N2 LIST \"\" *",
        "N3 CREATE Archive",
        "N4 FETCH 1 FLAGS",
        "N5 IDLE",
    ] {
        let lines = client.command(command);
        assert_eq!(1, lines.len());
        assert!(lines[0].ends_with(" NO not authenticated"), "{:?}", lines);
    }
}

#[test]
fn login_failures() {
    let setup = set_up();
    let mut client = setup.connect("loginfailures");
    client.skip_greeting();

    assert_eq!(
        "F1 NO authentication failed",
        last(&client.command("F1 LOGIN azure hunter3"))
    );
    assert_eq!(
        "F2 NO authentication failed",
        last(&client.command("F2 LOGIN nobody hunter2"))
    );
    bad(&client.command("F3 LOGIN azure"));

    // Still in the initial state
    no(&client.command("F4 SELECT INBOX"));
    ok(&client.command("F5 LOGIN \"azure\" \"hunter2\""));
    ok(&client.command("F6 SELECT INBOX"));
}

#[test]
fn duplicated_login() {
    let setup = set_up();
    let mut client = setup.connect("duplicatedlogin");
    client.quick_log_in();

    assert_eq!(
        "D1 NO duplicated login",
        last(&client.command("D1 LOGIN azure hunter2"))
    );
    assert_eq!(
        "D2 NO duplicated login",
        last(&client.command("D2 AUTHENTICATE PLAIN AGF6dXJlAGh1bnRlcjI="))
    );
}

#[test]
fn authenticate_plain_inline_and_by_challenge() {
    let setup = set_up();
    let mut client = setup.connect("authplain");
    client.skip_greeting();

    assert_eq!(
        "P1 NO authentication failed",
        last(&client.command("P1 AUTHENTICATE PLAIN AGF6dXJlAHdyb25n"))
    );

    client.send("P2 AUTHENTICATE PLAIN");
    assert_eq!("+ ", client.read_line());
    client.send("*");
    assert_eq!(
        "P2 BAD authentication cancelled",
        last(&client.responses("P2"))
    );

    client.send("P3 AUTHENTICATE PLAIN");
    assert_eq!("+ ", client.read_line());
    client.send("!!!not base64");
    no(&client.responses("P3"));

    client.send("P4 AUTHENTICATE PLAIN");
    assert_eq!("+ ", client.read_line());
    client.send("AGF6dXJlAGh1bnRlcjI=");
    assert_eq!(
        "P4 OK AUTHENTICATE completed",
        last(&client.responses("P4"))
    );
}

#[test]
fn authenticate_plain_with_initial_response() {
    let setup = set_up();
    let mut client = setup.connect("authplainir");
    client.skip_greeting();

    ok(&client.command("P1 AUTHENTICATE plain AGF6dXJlAGh1bnRlcjI="));
    ok(&client.command("P2 SELECT INBOX"));
}

#[test]
fn authenticate_cram_md5() {
    let setup = set_up();
    let mut client = setup.connect("authcrammd5");
    client.skip_greeting();

    client.send("M1 AUTHENTICATE CRAM-MD5");
    let challenge = client.read_line();
    assert!(challenge.starts_with("+ "), "{}", challenge);
    let challenge =
        String::from_utf8(base64::decode(&challenge[2..]).unwrap()).unwrap();
    assert!(challenge.starts_with('<'), "{}", challenge);
    assert!(challenge.ends_with("@localhost>"), "{}", challenge);

    let digest = hmac_md5_hex("hunter2", &challenge).unwrap();
    client.send(&base64::encode(format!("azure {}", digest)));
    assert_eq!(
        "M1 OK AUTHENTICATE completed",
        last(&client.responses("M1"))
    );
}

#[test]
fn unsupported_mechanism() {
    let setup = set_up();
    let mut client = setup.connect("unsupportedmech");
    client.skip_greeting();

    assert_eq!(
        "U1 BAD unsupported mechanism: GSSAPI",
        last(&client.command("U1 AUTHENTICATE GSSAPI"))
    );
}

#[test]
fn bad_commands_keep_the_session() {
    let setup = set_up();
    let mut client = setup.connect("badcommands");
    client.quick_log_in();

    assert_eq!(
        "B1 BAD unknown command",
        last(&client.command("B1 FROBNICATE"))
    );
    bad(&client.command("B2 SELECT"));
    bad(&client.command("B3 SELECT (INBOX"));

    client.send("* NOOP");
    let line = client.read_line();
    assert!(line.starts_with("* BAD "), "{}", line);

    ok(&client.command("B4 NOOP"));
}

#[test]
fn selected_commands_need_a_folder() {
    let setup = set_up();
    let mut client = setup.connect("needfolder");
    client.quick_log_in();

    for command in &[
        "S1 CHECK",
        "S2 CLOSE",
        "S3 EXPUNGE",
        "S4 SEARCH ALL",
        "S5 FETCH 1 FLAGS",
        "S6 STORE 1 +FLAGS (\\Seen)",
        "S7 COPY 1 INBOX",
        "S8 IDLE",
        "S9 UID FETCH 1 FLAGS",
    ] {
        let lines = client.command(command);
        assert_eq!(1, lines.len());
        assert!(lines[0].ends_with(" NO not selected"), "{:?}", lines);
    }
}

#[test]
fn deleted_folder_fails_commands() {
    let setup = set_up();
    let store = setup.store("azure");
    store.create_mailbox("Doomed").unwrap();
    add_message(&store, "Doomed", 1, SAMPLE_MESSAGE, FlagSet::empty());

    let mut client = setup.connect("deletedfolder");
    client.quick_log_in();
    client.quick_select("Doomed");

    let mut other = setup.connect("deletedfolder2");
    other.quick_log_in();
    ok(&other.command("O1 DELETE Doomed"));

    assert_eq!(
        "X1 BAD deleted folder",
        last(&client.command("X1 SEARCH ALL"))
    );
    assert_eq!(
        "X2 BAD deleted folder",
        last(&client.command("X2 FETCH 1 FLAGS"))
    );
    ok(&client.command("X3 SELECT INBOX"));
}

#[test]
fn logout_ends_the_connection() {
    let setup = set_up();
    let mut client = setup.connect("logout");
    client.quick_log_in();
    client.quick_select("INBOX");

    let lines = client.command("Q1 LOGOUT");
    assert_eq!(
        vec!["* BYE server logout", "Q1 OK LOGOUT completed"],
        lines
    );
    assert!(client.is_closed());
}

#[test]
fn logout_releases_the_store() {
    let setup = set_up();
    let mut client = setup.connect("logoutrelease");
    client.quick_log_in();
    assert_eq!(1, setup.cxt.pool.open_count());

    client.command("Q1 LOGOUT");
    assert!(client.is_closed());
    assert_eq!(0, setup.cxt.pool.open_count());
}

#[test]
fn silent_client_is_logged_out() {
    let setup = set_up_with(|config| {
        config.connection.read_polling_interval_seconds = 0.05;
        config.connection.command_wait_timeout_seconds = 0.2;
    });
    let mut client = setup.connect("silentclient");
    client.skip_greeting();

    assert_eq!(
        "* BYE server autologout: idle for too long",
        client.read_line()
    );
    assert!(client.is_closed());
}

#[test]
fn aborted_transaction_is_recovered_at_login() {
    let setup = set_up();
    let store = setup.store("azure");
    store.set_aborted_transaction(true);

    let mut client = setup.connect("recovery");
    client.skip_greeting();

    let lines = client.command("R1 LOGIN azure hunter2");
    assert_eq!(
        vec![
            "* OK [ALERT] start user data recovery.",
            "* OK completed user data recovery.",
            "R1 OK LOGIN completed",
        ],
        lines
    );
    assert!(!store.aborted_transaction());

    // Nothing left to recover for the next login
    let mut other = setup.connect("recovery2");
    other.skip_greeting();
    assert_eq!(
        vec!["R2 OK LOGIN completed"],
        other.command("R2 LOGIN azure hunter2")
    );
}
