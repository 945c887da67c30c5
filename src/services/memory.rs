//! In-Memory Collaborators
//!
//! Backing implementations of the service seams that live entirely in
//! process memory. The default binary wiring and the tests run on
//! these; production swaps in real store/bus/geolocation backends.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::constants::mode::Mode;
use crate::services::bus::{BusMessage, BusResult, PubSubBus};
use crate::services::geoloc::{Geolocation, GeolocationReader};
use crate::services::password::PasswordVerifier;
use crate::services::store::{
    ChannelRecord, HardwareMatch, StatsRecord, StoreResult, UserRecord, UserStore,
};

// =============================================================================
// STORE
// =============================================================================

#[derive(Default)]
struct StoreInner {
    users: Vec<UserRecord>,
    stats: HashMap<(i32, u8), StatsRecord>,
    channels: Vec<ChannelRecord>,
    logins: Vec<(i32, String, String, i64)>,
    client_hashes: Vec<(i32, String, String, String, String, i64)>,
    leaderboard: HashSet<i32>,
}

/// Hash-map backed user store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// Seed a user row (tests and local runs).
    pub async fn seed_user(&self, record: UserRecord) {
        let mut inner = self.inner.lock().await;
        inner.leaderboard.insert(record.id);
        inner.users.push(record);
    }

    pub async fn seed_channel(&self, record: ChannelRecord) {
        self.inner.lock().await.channels.push(record);
    }

    pub async fn seed_stats(&self, user_id: i32, mode: Mode, stats: StatsRecord) {
        self.inner
            .lock()
            .await
            .stats
            .insert((user_id, mode as u8), stats);
    }

    pub async fn login_count(&self) -> usize {
        self.inner.lock().await.logins.len()
    }

    pub async fn on_leaderboards(&self, user_id: i32) -> bool {
        self.inner.lock().await.leaderboard.contains(&user_id)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_safe_name(&self, safe_name: &str) -> StoreResult<Option<UserRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|user| user.safe_name == safe_name)
            .cloned())
    }

    async fn user_by_id(&self, id: i32) -> StoreResult<Option<UserRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|user| user.id == id).cloned())
    }

    async fn stats(&self, user_id: i32, mode: Mode, _country: &str) -> StoreResult<StatsRecord> {
        let inner = self.inner.lock().await;
        Ok(inner
            .stats
            .get(&(user_id, mode as u8))
            .copied()
            .unwrap_or_default())
    }

    async fn channels(&self) -> StoreResult<Vec<ChannelRecord>> {
        Ok(self.inner.lock().await.channels.clone())
    }

    async fn set_privileges(&self, user_id: i32, privileges: u32) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter_mut().find(|user| user.id == user_id) {
            user.privileges = privileges;
        }
        Ok(())
    }

    async fn add_friend(&self, user_id: i32, target_id: i32) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter_mut().find(|user| user.id == user_id) {
            if !user.friends.contains(&target_id) {
                user.friends.push(target_id);
            }
        }
        Ok(())
    }

    async fn remove_friend(&self, user_id: i32, target_id: i32) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter_mut().find(|user| user.id == user_id) {
            user.friends.retain(|id| *id != target_id);
        }
        Ok(())
    }

    async fn update_latest_activity(&self, user_id: i32, at: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter_mut().find(|user| user.id == user_id) {
            user.latest_activity = at;
        }
        Ok(())
    }

    async fn insert_login(
        &self,
        user_id: i32,
        ip: String,
        osu_version: String,
        at: i64,
    ) -> StoreResult<()> {
        self.inner
            .lock()
            .await
            .logins
            .push((user_id, ip, osu_version, at));
        Ok(())
    }

    async fn insert_client_hashes(
        &self,
        user_id: i32,
        osu_md5: String,
        adapters_md5: String,
        uninstall_md5: String,
        disk_md5: String,
        at: i64,
    ) -> StoreResult<()> {
        self.inner.lock().await.client_hashes.push((
            user_id,
            osu_md5,
            adapters_md5,
            uninstall_md5,
            disk_md5,
            at,
        ));
        Ok(())
    }

    async fn hardware_matches(
        &self,
        user_id: i32,
        adapters_md5: &str,
        uninstall_md5: &str,
        disk_md5: &str,
        running_under_wine: bool,
    ) -> StoreResult<Vec<HardwareMatch>> {
        let inner = self.inner.lock().await;

        let mut counts: HashMap<i32, i64> = HashMap::new();
        for (owner, _osu, adapters, uninstall, disk, _at) in &inner.client_hashes {
            if *owner == user_id {
                continue;
            }

            let matched = if running_under_wine {
                uninstall == uninstall_md5
            } else {
                adapters == adapters_md5 && uninstall == uninstall_md5 && disk == disk_md5
            };

            if matched {
                *counts.entry(*owner).or_default() += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(owner, occurrences)| HardwareMatch {
                user_id: owner,
                name: inner
                    .users
                    .iter()
                    .find(|user| user.id == owner)
                    .map(|user| user.name.clone())
                    .unwrap_or_default(),
                occurrences,
            })
            .collect())
    }

    async fn remove_from_leaderboards(&self, user_id: i32) -> StoreResult<()> {
        self.inner.lock().await.leaderboard.remove(&user_id);
        Ok(())
    }

    async fn restore_leaderboards(&self, user_id: i32) -> StoreResult<()> {
        self.inner.lock().await.leaderboard.insert(user_id);
        Ok(())
    }
}

// =============================================================================
// BUS
// =============================================================================

#[derive(Default)]
struct BusInner {
    subscribed: HashSet<String>,
    queue: VecDeque<BusMessage>,
}

/// Process-local bus; publishes land in a queue the consumer drains.
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<BusInner>,
    notify: Notify,
}

#[async_trait]
impl PubSubBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: &[u8]) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.subscribed.contains(channel) {
            inner.queue.push_back(BusMessage {
                channel: channel.to_string(),
                payload: payload.to_vec(),
            });
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        inner.subscribed.extend(channels.iter().cloned());
        Ok(())
    }

    async fn get_message(&self, timeout: Duration) -> BusResult<Option<BusMessage>> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(message) = inner.queue.pop_front() {
                    return Ok(Some(message));
                }
            }

            if tokio::time::timeout(timeout, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}

// =============================================================================
// GEOLOCATION / PASSWORDS
// =============================================================================

/// Reader that knows nothing; every client looks local.
pub struct NullGeolocation;

impl GeolocationReader for NullGeolocation {
    fn city(&self, _ip: IpAddr) -> Option<Geolocation> {
        None
    }
}

/// Verifier for wirings where the stored hash *is* the plain md5.
pub struct PlainVerifier;

#[async_trait]
impl PasswordVerifier for PlainVerifier {
    async fn verify(&self, plain: &str, hashed: &str) -> bool {
        plain == hashed
    }
}
