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

use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use structopt::clap;
use structopt::StructOpt;

use super::logging;
use super::scratch::{self, ScratchUser};
use super::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Run Postbox in a scratch environment for testing.
    ///
    /// This subcommand is intended for running IMAP compliance testers and
    /// for trying out clients on a developer machine. Postbox listens for
    /// plain TCP connections without TLS and handles all of them in one
    /// process, one thread per connection.
    ///
    /// Mail lives only in memory and is lost when the process exits. There is
    /// exactly one ordinary user, plus the mail delivery user from the
    /// configuration, which shares the ordinary user's password.
    ServeScratch(ServeScratchOptions),
}

#[derive(StructOpt)]
struct ServeScratchOptions {
    /// Path to `postbox.toml`. All settings have defaults if omitted.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Path to a log4rs `logging.toml`. If omitted, `logging.toml` next to
    /// the configuration file is used if it exists, else logs go to stderr.
    #[structopt(long, parse(from_os_str))]
    logging: Option<PathBuf>,

    /// Address to listen on.
    #[structopt(long, default_value = "127.0.0.1:14143")]
    listen: String,

    /// Name of the test user.
    #[structopt(long, default_value = "azure")]
    user: String,

    /// Password of the test user.
    #[structopt(long, default_value = "hunter2")]
    password: String,

    /// Log verbosity when logging to stderr.
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    match cmd {
        Command::ServeScratch(options) => serve_scratch(options),
    }
}

fn serve_scratch(options: ServeScratchOptions) {
    let config = match options.config {
        Some(ref path) => load_config(path),
        None => SystemConfig::default(),
    };

    let log_config_file = options.logging.clone().or_else(|| {
        options
            .config
            .as_ref()
            .and_then(|path| path.parent())
            .map(|dir| dir.join("logging.toml"))
            .filter(|path| path.is_file())
    });
    let logging_result = match log_config_file {
        Some(ref path) => logging::init_file(path),
        None => logging::init_console(options.log_level),
    };
    if let Err(e) = logging_result {
        eprintln!("Failed to initialise logging: {}", e);
        EX_CONFIG.exit();
    }

    let user = ScratchUser {
        name: options.user,
        password: options.password,
    };
    scratch::serve(config, &options.listen, user)
}

fn load_config(path: &Path) -> SystemConfig {
    let toml = match fs::read(path) {
        Ok(toml) => toml,
        Err(e) => {
            eprintln!("Error reading '{}': {}", path.display(), e);
            EX_CONFIG.exit()
        }
    };

    match toml::from_slice(&toml) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error in config file at '{}': {}", path.display(), e);
            EX_CONFIG.exit()
        }
    }
}
