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

//! The contract between the protocol engine and whatever verifies
//! credentials.

pub mod password;

pub use self::password::PasswordAuthenticator;

/// Verifies credentials and maps user names to stable store identities.
///
/// Every `authenticate_*` method returns the name of the authenticated user
/// on success.
pub trait Authenticator: Send + Sync {
    /// Capability tags to advertise, for example `AUTH=PLAIN`.
    fn capabilities(&self) -> Vec<String>;

    /// Verify a LOGIN command.
    fn authenticate_login(&self, user: &str, password: &str) -> Option<String>;

    /// Verify a decoded SASL PLAIN response.
    fn authenticate_plain(&self, response: &[u8]) -> Option<String>;

    /// Produce a fresh CRAM-MD5 challenge.
    fn cram_md5_challenge(&self) -> String;

    /// Verify a decoded CRAM-MD5 response to `challenge`.
    fn authenticate_cram_md5(
        &self,
        challenge: &str,
        response: &[u8],
    ) -> Option<String>;

    fn user_exists(&self, user: &str) -> bool;

    /// A stable identifier for `user`, used to key the store pool.
    fn unique_user_id(&self, user: &str) -> Option<String>;

    /// Whether SASL `mechanism` is advertised.
    fn supports_mechanism(&self, mechanism: &str) -> bool {
        self.capabilities().iter().any(|cap| {
            cap.get(..5)
                .map_or(false, |prefix| prefix.eq_ignore_ascii_case("AUTH="))
                && cap[5..].eq_ignore_ascii_case(mechanism)
        })
    }
}

/// The parts of a SASL PLAIN response (RFC 4616).
#[derive(Debug, PartialEq, Eq)]
pub struct PlainCredentials<'a> {
    pub authorise: &'a str,
    pub authenticate: &'a str,
    pub password: &'a str,
}

/// Split a PLAIN response of the form
/// `<authorise-id>NUL<authenticate-id>NUL<password>`.
pub fn parse_plain(response: &[u8]) -> Option<PlainCredentials<'_>> {
    let string = std::str::from_utf8(response).ok()?;
    let mut parts = string.split('\x00');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(authorise), Some(authenticate), Some(password), None) => {
            Some(PlainCredentials {
                authorise,
                authenticate,
                password,
            })
        }
        _ => None,
    }
}
