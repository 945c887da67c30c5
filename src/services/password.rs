//! Password Verification
//!
//! Verification itself is external (bcrypt or whatever the store
//! holds); the server only adds a bounded memo from stored hash to the
//! plain md5 so repeat logins skip the expensive check.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// External password check.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// `plain` is the md5 the client sends; `hashed` the stored hash.
    async fn verify(&self, plain: &str, hashed: &str) -> bool;
}

/// Memo of known-good `stored hash -> plain md5` pairs.
///
/// Bounded so a flood of distinct accounts cannot grow it without
/// limit; eviction just clears, the next verify repopulates.
pub struct PasswordCache {
    known: Mutex<HashMap<String, String>>,
    capacity: usize,
}

impl Default for PasswordCache {
    fn default() -> Self {
        Self::with_capacity(4096)
    }
}

impl PasswordCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            known: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Check a password, consulting the memo before the verifier.
    pub async fn verify(
        &self,
        verifier: &dyn PasswordVerifier,
        plain_md5: &str,
        hashed: &str,
    ) -> bool {
        {
            let known = self.known.lock().await;
            if let Some(cached) = known.get(hashed) {
                return cached == plain_md5;
            }
        }

        let ok = verifier.verify(plain_md5, hashed).await;
        if ok {
            let mut known = self.known.lock().await;
            if known.len() >= self.capacity {
                known.clear();
            }
            known.insert(hashed.to_string(), plain_md5.to_string());
        }

        ok
    }
}
