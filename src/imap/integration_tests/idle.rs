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
use crate::store::FlagSet;

#[test]
fn idle_forwards_pushes() {
    let setup = set_up();
    let mut idler = setup.connect("idlepushes");
    idler.quick_log_in();
    idler.quick_select("INBOX");

    idler.send("I1 IDLE");
    assert_eq!("+ idling", idler.read_line());

    let mut client = setup.connect("idlepushes2");
    client.quick_log_in();
    ok(&client.literal_command("A1 APPEND INBOX", SAMPLE_MESSAGE.as_bytes()));
    assert_eq!("* 1 EXISTS", idler.read_line());

    client.quick_select("INBOX");
    ok(&client.command("A2 STORE 1 +FLAGS.SILENT (\\Flagged)"));
    assert_eq!(
        "* 1 FETCH (FLAGS (\\Flagged \\Recent))",
        idler.read_line()
    );

    idler.send("done");
    assert_eq!(vec!["I1 OK IDLE terminated"], idler.responses("I1"));

    // Nothing was lost or repeated
    assert_eq!(vec!["N1 OK NOOP completed"], idler.command("N1 NOOP"));
}

#[test]
fn idle_sends_queued_pushes_first() {
    let setup = set_up();
    let store = setup.store("azure");
    add_message(&store, "INBOX", 1, SAMPLE_MESSAGE, FlagSet::empty());

    let mut idler = setup.connect("idlequeued");
    idler.quick_log_in();
    idler.quick_select("INBOX");

    let mut client = setup.connect("idlequeued2");
    client.quick_log_in();
    client.quick_select("INBOX");
    ok(&client.command("A1 STORE 1 +FLAGS.SILENT (\\Answered)"));

    idler.send("I1 IDLE");
    assert_eq!("+ idling", idler.read_line());
    assert_eq!("* 1 FETCH (FLAGS (\\Answered))", idler.read_line());
    idler.send("DONE");
    assert_eq!(vec!["I1 OK IDLE terminated"], idler.responses("I1"));
}

#[test]
fn idle_ends_without_pushes() {
    let setup = set_up();
    let mut idler = setup.connect("idlenopushes");
    idler.quick_log_in();
    idler.quick_select("INBOX");

    for tag in &["I1", "I2", "I3"] {
        idler.send(&format!("{} IDLE", tag));
        assert_eq!("+ idling", idler.read_line());
        idler.send("DONE");
        assert_eq!(
            vec![format!("{} OK IDLE terminated", tag)],
            idler.responses(tag)
        );
    }
}

#[test]
fn idle_rejects_other_responses() {
    let setup = set_up();
    let mut idler = setup.connect("idleother");
    idler.quick_log_in();
    idler.quick_select("INBOX");

    idler.send("I1 IDLE");
    assert_eq!("+ idling", idler.read_line());
    idler.send("I2 NOOP");
    assert_eq!(
        vec!["I1 BAD unexpected client response to IDLE"],
        idler.responses("I1")
    );

    ok(&idler.command("N1 NOOP"));
    bad(&idler.command("I3 IDLE now"));
}

#[test]
fn idle_pushes_wait_for_next_command_after_done() {
    let setup = set_up();
    let mut idler = setup.connect("idleafterdone");
    idler.quick_log_in();
    idler.quick_select("INBOX");

    idler.send("I1 IDLE");
    assert_eq!("+ idling", idler.read_line());
    idler.send("DONE");
    assert_eq!(vec!["I1 OK IDLE terminated"], idler.responses("I1"));

    let mut client = setup.connect("idleafterdone2");
    client.quick_log_in();
    ok(&client.literal_command("A1 APPEND INBOX", SAMPLE_MESSAGE.as_bytes()));

    assert_eq!(
        vec!["* 1 EXISTS", "N1 OK NOOP completed"],
        idler.command("N1 NOOP")
    );
}

#[test]
fn silent_idler_is_logged_out() {
    let setup = set_up_with(|config| {
        config.connection.read_polling_interval_seconds = 0.05;
        config.connection.command_wait_timeout_seconds = 0.5;
    });
    let mut idler = setup.connect("silentidler");
    idler.quick_log_in();
    idler.quick_select("INBOX");
    assert_eq!(1, setup.cxt.pool.open_count());

    idler.send("I1 IDLE");
    assert_eq!("+ idling", idler.read_line());
    assert_eq!(
        vec![
            "* BYE server autologout: idle for too long",
            "I1 OK IDLE terminated",
        ],
        idler.responses("I1")
    );
    assert!(idler.is_closed());
    assert_eq!(0, setup.cxt.pool.open_count());
}
