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

//! Pooling of open stores, so that every session of one user shares a single
//! store, lock and multicast hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{info, warn};

use super::lock::ReadWriteLock;
use super::multicast::Multicast;
use super::MailStore;
use crate::support::error::Error;
use crate::support::threading;

/// Opens the store of the user with the given unique id.
pub type StoreFactory =
    Box<dyn Fn(&str) -> Result<Box<dyn MailStore>, Error> + Send + Sync>;

/// One open store and the state shared by every session using it.
pub struct StoreHolder {
    user_id: String,
    store: Box<dyn MailStore>,
    lock: ReadWriteLock,
    multicast: Arc<Multicast>,
}

impl StoreHolder {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> &dyn MailStore {
        &*self.store
    }

    pub fn lock(&self) -> &ReadWriteLock {
        &self.lock
    }

    pub fn multicast(&self) -> &Arc<Multicast> {
        &self.multicast
    }
}

pub struct StorePool {
    factory: StoreFactory,
    holders: Mutex<HashMap<String, (Arc<StoreHolder>, usize)>>,
}

impl StorePool {
    pub fn new(factory: StoreFactory) -> Self {
        StorePool {
            factory,
            holders: Mutex::new(HashMap::new()),
        }
    }

    /// Obtain the holder for `user_id`, opening the store if nobody else
    /// has it open.
    ///
    /// Every successful call must be balanced by a call to `release`.
    pub fn acquire(&self, user_id: &str) -> Result<Arc<StoreHolder>, Error> {
        let mut holders = self.holders();
        if let Some(entry) = holders.get_mut(user_id) {
            entry.1 += 1;
            return Ok(Arc::clone(&entry.0));
        }

        let store = (self.factory)(user_id)?;
        let holder = Arc::new(StoreHolder {
            user_id: user_id.to_owned(),
            store,
            lock: ReadWriteLock::new(),
            multicast: Arc::new(Multicast::new()),
        });
        holders.insert(user_id.to_owned(), (Arc::clone(&holder), 1));
        Ok(holder)
    }

    /// Return a holder obtained from `acquire`.
    ///
    /// When the last reference is returned, the store is closed and dropped.
    pub fn release(&self, holder: Arc<StoreHolder>) -> Result<(), Error> {
        let last = {
            let mut holders = self.holders();
            let remaining = holders.get_mut(holder.user_id()).map(|entry| {
                entry.1 -= 1;
                entry.1
            });
            match remaining {
                Some(0) => {
                    holders.remove(holder.user_id());
                    true
                }
                Some(_) => false,
                None => {
                    warn!(
                        "Released store of {} which is not in the pool",
                        holder.user_id()
                    );
                    false
                }
            }
        };

        if last {
            info!("Closing store of {}", holder.user_id());
            holder.store().close()?;
        }

        Ok(())
    }

    /// Like `release`, but if releasing takes longer than `timeout`, let it
    /// finish in the background instead of waiting.
    pub fn release_detached(
        self: &Arc<Self>,
        holder: Arc<StoreHolder>,
        timeout: Duration,
    ) {
        let pool = Arc::clone(self);
        let user_id = holder.user_id().to_owned();
        match threading::run_detachable("store-release", timeout, move || {
            pool.release(holder)
        }) {
            Some(Ok(())) => (),
            Some(Err(e)) => {
                warn!("Error releasing store of {}: {}", user_id, e)
            }
            None => info!(
                "Release of store of {} is slow; continuing in background",
                user_id
            ),
        }
    }

    pub fn open_count(&self) -> usize {
        self.holders().len()
    }

    fn holders(
        &self,
    ) -> MutexGuard<'_, HashMap<String, (Arc<StoreHolder>, usize)>> {
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
