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

fn short_locks() -> Setup {
    set_up_with(|config| {
        config.lock.read_lock_timeout_seconds = 0.2;
        config.lock.write_lock_timeout_seconds = 0.2;
        config.lock.cleanup_write_lock_timeout_seconds = 0.1;
    })
}

#[test]
fn read_lock_timeout_leaves_store_unchanged() {
    let setup = short_locks();
    let store = setup.store("azure");
    let inbox = add_message(&store, "INBOX", 1, SAMPLE_MESSAGE, FlagSet::empty());

    let mut client = setup.connect("readlocktimeout");
    client.quick_log_in();
    client.quick_select("INBOX");

    let holder = setup.cxt.pool.acquire(&setup.user_id("azure")).unwrap();
    let guard = holder.lock().write(Duration::from_secs(5)).unwrap();
    let change_number = store.change_number();

    assert_eq!(
        vec!["R1 BAD read-lock timeout over 0.2 seconds"],
        client.command("R1 FETCH 1 BODY[]")
    );
    assert_eq!(
        vec!["R2 BAD read-lock timeout over 0.2 seconds"],
        client.command("R2 SEARCH ALL")
    );
    assert_eq!(
        vec!["R3 BAD read-lock timeout over 0.2 seconds"],
        client.command("R3 STATUS INBOX (MESSAGES)")
    );
    assert_eq!(change_number, store.change_number());
    assert_eq!(FlagSet::empty(), store.flags(inbox, 1).unwrap());

    drop(guard);
    setup.cxt.pool.release(holder).unwrap();

    ok(&client.command("R4 FETCH 1 BODY.PEEK[]"));
}

#[test]
fn shared_lock_admits_readers_only() {
    let setup = short_locks();
    let mut client = setup.connect("sharedlock");
    client.quick_log_in();
    client.quick_select("INBOX");

    let holder = setup.cxt.pool.acquire(&setup.user_id("azure")).unwrap();
    let guard = holder.lock().read(Duration::from_secs(5)).unwrap();

    ok(&client.command("S1 SEARCH ALL"));
    ok(&client.command("S2 LIST \"\" *"));
    assert_eq!(
        vec!["S3 BAD write-lock timeout over 0.2 seconds"],
        client.command("S3 CREATE Archive")
    );
    assert_eq!(
        vec!["S4 BAD write-lock timeout over 0.2 seconds"],
        client.command("S4 EXPUNGE")
    );

    drop(guard);
    setup.cxt.pool.release(holder).unwrap();
    ok(&client.command("S5 CREATE Archive"));
}

#[test]
fn failed_commands_release_their_lock() {
    let setup = short_locks();
    let mut client = setup.connect("failedrelease");
    client.quick_log_in();
    client.quick_select("INBOX");

    bad(&client.command("F1 SEARCH FROZZLE"));
    no(&client.command("F2 DELETE Nowhere"));
    bad(&client.command("F3 STORE 1 +FLAGS (\\Bogus)"));

    let holder = setup.cxt.pool.acquire(&setup.user_id("azure")).unwrap();
    holder.lock().write(Duration::from_millis(100)).unwrap();
    setup.cxt.pool.release(holder).unwrap();
}

#[test]
fn stuck_cleanup_abandons_the_folder() {
    let setup = short_locks();
    let store = setup.store("azure");
    let mut client = setup.connect("stuckcleanup");
    client.quick_log_in();
    client.quick_select("INBOX");

    let holder = setup.cxt.pool.acquire(&setup.user_id("azure")).unwrap();
    let guard = holder.lock().read(Duration::from_secs(5)).unwrap();
    let syncs = store.sync_count();

    assert_eq!(
        vec!["* BYE server logout", "Q1 OK LOGOUT completed"],
        client.command("Q1 LOGOUT")
    );
    assert!(client.is_closed());
    assert_eq!(syncs, store.sync_count());
    assert_eq!(1, setup.cxt.pool.open_count());

    drop(guard);
    setup.cxt.pool.release(holder).unwrap();
    assert_eq!(0, setup.cxt.pool.open_count());
}

#[test]
fn cleanup_syncs_the_store() {
    let setup = set_up();
    let store = setup.store("azure");
    let mut client = setup.connect("cleanupsyncs");
    client.quick_log_in();
    client.quick_select("INBOX");

    let syncs = store.sync_count();
    client.command("Q1 LOGOUT");
    assert!(client.is_closed());
    assert_eq!(syncs + 1, store.sync_count());
}
