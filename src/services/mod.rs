//! External Collaborators
//!
//! Seams for everything the server talks to but does not own: the user
//! store, the pub/sub bus, geolocation and password verification. Each
//! seam is an object-safe trait with an in-memory implementation used
//! by the default wiring and the tests.

pub mod bus;
pub mod geoloc;
pub mod memory;
pub mod password;
pub mod store;

use std::sync::Arc;

use crate::services::bus::PubSubBus;
use crate::services::geoloc::GeolocationReader;
use crate::services::password::{PasswordCache, PasswordVerifier};
use crate::services::store::UserStore;

/// Bundle of collaborator handles, cheap to clone into tasks.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn UserStore>,
    pub bus: Arc<dyn PubSubBus>,
    pub geoloc: Arc<dyn GeolocationReader>,
    pub verifier: Arc<dyn PasswordVerifier>,
    pub passwords: Arc<PasswordCache>,
}

impl Services {
    /// Fully in-memory wiring, as used by tests and local runs.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(memory::MemoryStore::default()),
            bus: Arc::new(memory::MemoryBus::default()),
            geoloc: Arc::new(memory::NullGeolocation),
            verifier: Arc::new(memory::PlainVerifier),
            passwords: Arc::new(PasswordCache::default()),
        }
    }
}
