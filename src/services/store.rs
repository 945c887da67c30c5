//! User Store
//!
//! The persistence seam. The server never talks to a database driver
//! directly; everything goes through this trait so the storage backend
//! stays swappable (and mockable).

use async_trait::async_trait;

use crate::constants::mode::Mode;

pub type StoreResult<T> = anyhow::Result<T>;

/// A user row.
#[derive(Debug, Clone, Default)]
pub struct UserRecord {
    pub id: i32,
    pub name: String,
    pub safe_name: String,
    pub password_bcrypt: String,
    pub register_time: i64,
    pub latest_activity: i64,
    pub email: String,
    pub country: String,
    pub privileges: u32,
    pub silence_end: i64,
    pub friends: Vec<i32>,
    pub blocked: Vec<i32>,
}

/// Per-mode statistics row, ranks included.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsRecord {
    pub total_score: i64,
    pub ranked_score: i64,
    pub accuracy: f32,
    pub pp: i32,
    pub max_combo: i32,
    pub total_hits: i32,
    pub playcount: i32,
    pub playtime: i32,
    pub global_rank: i32,
    pub country_rank: i32,
}

/// A persistent channel row.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub name: String,
    pub topic: String,
    pub privileges: u32,
    pub auto_join: bool,
}

/// Another account sharing this client's hardware fingerprint.
#[derive(Debug, Clone)]
pub struct HardwareMatch {
    pub user_id: i32,
    pub name: String,
    pub occurrences: i64,
}

/// Everything the server persists or fetches.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_by_safe_name(&self, safe_name: &str) -> StoreResult<Option<UserRecord>>;

    async fn user_by_id(&self, id: i32) -> StoreResult<Option<UserRecord>>;

    /// Stats for one mode, with global/country ranks resolved.
    async fn stats(&self, user_id: i32, mode: Mode, country: &str) -> StoreResult<StatsRecord>;

    /// All persistent channels, fetched once at startup.
    async fn channels(&self) -> StoreResult<Vec<ChannelRecord>>;

    async fn set_privileges(&self, user_id: i32, privileges: u32) -> StoreResult<()>;

    async fn add_friend(&self, user_id: i32, target_id: i32) -> StoreResult<()>;

    async fn remove_friend(&self, user_id: i32, target_id: i32) -> StoreResult<()>;

    async fn update_latest_activity(&self, user_id: i32, at: i64) -> StoreResult<()>;

    /// Record a successful login.
    async fn insert_login(
        &self,
        user_id: i32,
        ip: String,
        osu_version: String,
        at: i64,
    ) -> StoreResult<()>;

    /// Record the hardware fingerprint seen at login.
    async fn insert_client_hashes(
        &self,
        user_id: i32,
        osu_md5: String,
        adapters_md5: String,
        uninstall_md5: String,
        disk_md5: String,
        at: i64,
    ) -> StoreResult<()>;

    /// Other accounts matching this fingerprint. Under wine only the
    /// uninstall hash is meaningful.
    async fn hardware_matches(
        &self,
        user_id: i32,
        adapters_md5: &str,
        uninstall_md5: &str,
        disk_md5: &str,
        running_under_wine: bool,
    ) -> StoreResult<Vec<HardwareMatch>>;

    /// Drop a restricted user out of the leaderboards.
    async fn remove_from_leaderboards(&self, user_id: i32) -> StoreResult<()>;

    /// Rebuild leaderboard membership after an unrestriction.
    async fn restore_leaderboards(&self, user_id: i32) -> StoreResult<()>;
}
