//! Signature identity registry.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identity::SignatureIdentity;

/// In-memory identity registry standing in for the identity store
/// collaborator.
#[derive(Default)]
pub struct IdentityStore {
    inner: Mutex<HashMap<Uuid, SignatureIdentity>>,
}

impl IdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created identity.
    pub fn insert(&self, identity: SignatureIdentity) -> Uuid {
        let id = identity.id;
        self.lock().insert(id, identity);
        id
    }

    /// Fetch an identity.
    pub fn get(&self, id: Uuid) -> Result<SignatureIdentity> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("signature", id))
    }

    /// All identities owned by a user, newest first.
    pub fn for_owner(&self, owner_id: Uuid) -> Vec<SignatureIdentity> {
        let mut rows: Vec<SignatureIdentity> = self
            .lock()
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// Delete an identity. The caller cascades placement removal.
    pub fn remove(&self, id: Uuid) -> Result<SignatureIdentity> {
        self.lock()
            .remove(&id)
            .ok_or_else(|| Error::not_found("signature", id))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SignatureIdentity>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
