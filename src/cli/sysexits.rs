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

//! The subset of `sysexits.h` the binary reports.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Sysexit(pub i32);

/// The command line could not be parsed.
pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
/// The listener socket could not be set up.
pub const EX_OSERR: Sysexit = Sysexit(71);
pub const EX_IOERR: Sysexit = Sysexit(74);
/// `postbox.toml` or `logging.toml` is unreadable or invalid.
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}
