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

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use chrono::prelude::*;
use log::warn;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use rand::Rng;

use super::{parse_plain, Authenticator};

/// An `Authenticator` backed by a table of plain-text passwords.
///
/// This exists for development and testing; anything real should keep
/// verifiers rather than passwords.
pub struct PasswordAuthenticator {
    host_name: String,
    users: Mutex<HashMap<String, String>>,
}

impl PasswordAuthenticator {
    pub fn new(host_name: String) -> Self {
        PasswordAuthenticator {
            host_name,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_user(&self, user: &str, password: &str) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_owned(), password.to_owned());
    }

    fn password(&self, user: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned()
    }
}

impl Authenticator for PasswordAuthenticator {
    fn capabilities(&self) -> Vec<String> {
        vec!["AUTH=PLAIN".to_owned(), "AUTH=CRAM-MD5".to_owned()]
    }

    fn authenticate_login(&self, user: &str, password: &str) -> Option<String> {
        let expected = self.password(user)?;
        if constant_time_eq(expected.as_bytes(), password.as_bytes()) {
            Some(user.to_owned())
        } else {
            None
        }
    }

    fn authenticate_plain(&self, response: &[u8]) -> Option<String> {
        let creds = parse_plain(response)?;
        // Acting on behalf of another user is not supported
        if !creds.authorise.is_empty() && creds.authorise != creds.authenticate
        {
            return None;
        }

        self.authenticate_login(creds.authenticate, creds.password)
    }

    fn cram_md5_challenge(&self) -> String {
        let nonce: u64 = rand::thread_rng().gen();
        format!(
            "<{}.{}@{}>",
            nonce,
            Utc::now().timestamp(),
            self.host_name
        )
    }

    fn authenticate_cram_md5(
        &self,
        challenge: &str,
        response: &[u8],
    ) -> Option<String> {
        // Format is `<user> SP <hex digest>`; the user name may itself
        // contain spaces.
        let response = std::str::from_utf8(response).ok()?;
        let split = response.rfind(' ')?;
        let (user, digest) = (&response[..split], &response[split + 1..]);

        let password = self.password(user)?;
        let expected = match hmac_md5_hex(&password, challenge) {
            Ok(expected) => expected,
            Err(e) => {
                warn!("HMAC-MD5 failed: {}", e);
                return None;
            }
        };

        if constant_time_eq(
            expected.as_bytes(),
            digest.to_ascii_lowercase().as_bytes(),
        ) {
            Some(user.to_owned())
        } else {
            None
        }
    }

    fn user_exists(&self, user: &str) -> bool {
        self.password(user).is_some()
    }

    fn unique_user_id(&self, user: &str) -> Option<String> {
        if self.user_exists(user) {
            Some(hex(&openssl::sha::sha256(user.as_bytes())))
        } else {
            None
        }
    }
}

/// Compute the CRAM-MD5 digest of `challenge` keyed by `password`, as
/// lowercase hex.
pub fn hmac_md5_hex(
    password: &str,
    challenge: &str,
) -> Result<String, openssl::error::ErrorStack> {
    let key = PKey::hmac(password.as_bytes())?;
    let mut signer = Signer::new(MessageDigest::md5(), &key)?;
    signer.update(challenge.as_bytes())?;
    Ok(hex(&signer.sign_to_vec()?))
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && openssl::memcmp::eq(a, b)
}
