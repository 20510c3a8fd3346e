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

use serde::{Deserialize, Serialize};

/// The system-wide configuration for Postbox.
///
/// This is usually stored in a file named `postbox.toml`. Every section and
/// every field is optional.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Limits applied while reading client commands.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Timeouts for the per-user store lock.
    #[serde(default)]
    pub lock: LockConfig,

    /// Initial values of the connection limits. These can be changed at run
    /// time through `ConnectionLimits`.
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub authentication: AuthenticationConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// The maximum length of one physical command line, in bytes.
    pub line_length_limit: usize,
    /// The maximum size of a single literal, in bytes.
    pub literal_size_limit: usize,
    /// The maximum number of bytes read for one command, including all its
    /// lines and literals.
    pub command_size_limit: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            line_length_limit: 8192,
            literal_size_limit: 10 * 1024 * 1024,
            command_size_limit: 10 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    pub read_lock_timeout_seconds: f64,
    pub write_lock_timeout_seconds: f64,
    /// Used when a session is torn down, so that a stuck lock holder cannot
    /// keep the connection open.
    pub cleanup_write_lock_timeout_seconds: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            read_lock_timeout_seconds: 30.0,
            write_lock_timeout_seconds: 30.0,
            cleanup_write_lock_timeout_seconds: 1.0,
        }
    }
}

impl LockConfig {
    pub fn read_lock_timeout(&self) -> Duration {
        seconds(self.read_lock_timeout_seconds)
    }

    pub fn write_lock_timeout(&self) -> Duration {
        seconds(self.write_lock_timeout_seconds)
    }

    pub fn cleanup_write_lock_timeout(&self) -> Duration {
        seconds(self.cleanup_write_lock_timeout_seconds)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub read_polling_interval_seconds: f64,
    /// How long a client may stay silent between commands. Zero means the
    /// next command must already be available.
    pub command_wait_timeout_seconds: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            read_polling_interval_seconds: 1.0,
            command_wait_timeout_seconds: 60.0 * 30.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// The identity which, once authenticated, may only APPEND messages on
    /// behalf of other users.
    pub mail_delivery_user: String,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        AuthenticationConfig {
            mail_delivery_user: "#postman".to_owned(),
        }
    }
}

/// Convert a configured number of seconds to a `Duration`, treating negative
/// and non-finite values as zero.
pub fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::from_secs(0)
    }
}
