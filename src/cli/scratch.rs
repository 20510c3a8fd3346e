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

use std::io::{self, BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};

use super::sysexits::*;
use crate::auth::{Authenticator, PasswordAuthenticator};
use crate::imap::decoder::{Context, Decoder};
use crate::store::memory::MemoryDirectory;
use crate::store::pool::StorePool;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

pub struct ScratchUser {
    pub name: String,
    pub password: String,
}

/// Serve plain-text IMAP on `address` until the process is killed.
///
/// Every connection shares one in-memory directory, so mail appended by one
/// session is visible to the next until the server stops.
pub fn serve(config: SystemConfig, address: &str, user: ScratchUser) -> ! {
    let listener = match TcpListener::bind(address) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", address, e);
            EX_OSERR.exit()
        }
    };

    let delivery_user = config.authentication.mail_delivery_user.clone();
    let authenticator = PasswordAuthenticator::new("localhost".to_owned());
    authenticator.add_user(&delivery_user, &user.password);
    authenticator.add_user(&user.name, &user.password);

    let directory = MemoryDirectory::new();
    let cxt = Arc::new(Context::new(
        config,
        Arc::new(StorePool::new(directory.factory())),
        Arc::new(authenticator) as Arc<dyn Authenticator>,
    ));

    info!("Initialised successfully.");
    info!(
        "Connect to: {}, username '{}', password '{}'",
        address, user.name, user.password
    );
    info!("Mail delivery user is '{}'", delivery_user);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                EX_IOERR.exit()
            }
        };

        if let Err(e) = spawn_connection(stream, Arc::clone(&cxt)) {
            warn!("Failed to start connection: {}", e);
        }
    }

    // `incoming` never ends
    EX_SOFTWARE.exit()
}

fn spawn_connection(stream: TcpStream, cxt: Arc<Context>) -> io::Result<()> {
    let origin = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_owned());
    let stream_out = stream.try_clone()?;
    let log_prefix = LogPrefix::new(format!("imap:{}", origin));

    thread::Builder::new()
        .name(format!("imap-{}", origin))
        .spawn(move || {
            info!("{} Accepted connection", log_prefix);
            let decoder = Decoder::new(
                BufReader::new(stream),
                BufWriter::new(stream_out),
                cxt,
                log_prefix,
            );

            // The decoder logs its own failures
            let _ = decoder.run();
        })?;

    Ok(())
}
