//! User Sessions
//!
//! The per-client session object: identity, presence, privileges, the
//! write queue drained by each poll response, and the id-based links to
//! channels, spectating and multiplayer state.

use std::collections::HashMap;

use crate::constants::action::Action;
use crate::constants::mode::Mode;
use crate::constants::mods::Mods;
use crate::constants::privileges::{BanchoPrivileges, Privileges};
use crate::services::geoloc::Geolocation;

/// Write queue cap; a session that overruns it is force-disconnected.
pub const MAX_QUEUE_SIZE: usize = 1024 * 1024;

/// What the client is currently doing.
#[derive(Debug, Clone)]
pub struct Status {
    pub action: Action,
    pub info_text: String,
    pub map_md5: String,
    pub mods: Mods,
    pub mode: Mode,
    pub map_id: i32,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            action: Action::Idle,
            info_text: String::new(),
            map_md5: String::new(),
            mods: Mods::NOMOD,
            mode: Mode::Std,
            map_id: 0,
        }
    }
}

/// Per-mode statistics as fetched from the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
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

/// The hardware fingerprint the client sends at login.
#[derive(Debug, Clone, Default)]
pub struct ClientHashes {
    pub osu_md5: String,
    pub adapters_md5: String,
    pub uninstall_md5: String,
    pub disk_md5: String,
    pub adapters: Vec<String>,
    pub running_under_wine: bool,
}

/// Release stream encoded in the client version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stream {
    #[default]
    Stable,
    Beta,
    CuttingEdge,
    Dev,
    Tourney,
}

/// Parsed client version (`b20240101.2cuttingedge`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientVersion {
    pub date: chrono::NaiveDate,
    pub revision: u32,
    pub stream: Stream,
}

/// A live session.
///
/// Cross-object references are integer ids resolved through the global
/// registries; the registry owns, everything else refers.
#[derive(Debug)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub safe_name: String,

    pub password_bcrypt: String,
    pub password_md5: String,

    pub privileges: Privileges,
    pub silence_end: i64,

    pub geolocation: Geolocation,
    pub utc_offset: i32,
    pub osu_version: ClientVersion,
    pub client_hashes: ClientHashes,

    pub status: Status,
    pub stats: HashMap<Mode, Stats>,

    pub friends: Vec<i32>,
    pub blocked: Vec<i32>,

    /// Real names of joined channels.
    pub channels: Vec<String>,

    pub spectating: Option<i32>,
    pub spectators: Vec<i32>,
    pub match_id: Option<usize>,

    pub token: String,
    pub login_time: i64,
    pub latest_activity: i64,

    pub stealth: bool,
    pub in_lobby: bool,
    pub friend_only_dms: bool,
    pub tourney: bool,

    queue: Vec<u8>,
    queue_overrun: bool,
}

impl User {
    /// Build a fresh session; registries fill in the links afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i32,
        name: String,
        password_bcrypt: String,
        password_md5: String,
        privileges: Privileges,
        silence_end: i64,
        geolocation: Geolocation,
        utc_offset: i32,
        osu_version: ClientVersion,
        client_hashes: ClientHashes,
        stats: HashMap<Mode, Stats>,
        friends: Vec<i32>,
        blocked: Vec<i32>,
        token: String,
        now: i64,
    ) -> Self {
        let safe_name = make_safe_name(&name);

        Self {
            id,
            name,
            safe_name,
            password_bcrypt,
            password_md5,
            privileges,
            silence_end,
            geolocation,
            utc_offset,
            osu_version,
            client_hashes,
            status: Status::default(),
            stats,
            friends,
            blocked,
            channels: Vec::new(),
            spectating: None,
            spectators: Vec::new(),
            match_id: None,
            token,
            login_time: now,
            latest_activity: now,
            stealth: false,
            in_lobby: false,
            friend_only_dms: false,
            tourney: false,
            queue: Vec::new(),
            queue_overrun: false,
        }
    }

    /// Stats for the mode the user is currently in.
    pub fn current_stats(&self) -> Stats {
        self.stats.get(&self.status.mode).copied().unwrap_or_default()
    }

    /// The client-visible privilege projection.
    pub fn bancho_privileges(&self) -> BanchoPrivileges {
        BanchoPrivileges::from_privileges(self.privileges)
    }

    pub fn restricted(&self) -> bool {
        self.privileges.intersects(Privileges::DISALLOWED)
    }

    /// Seconds of silence left at `now`; zero when not silenced.
    pub fn remaining_silence(&self, now: i64) -> i64 {
        (self.silence_end - now).max(0)
    }

    pub fn silenced(&self, now: i64) -> bool {
        self.remaining_silence(now) != 0
    }

    /// Append bytes to the write queue.
    ///
    /// An overrunning queue stops growing; the poll path notices the
    /// flag and disconnects the session.
    pub fn enqueue(&mut self, data: &[u8]) {
        if self.queue_overrun {
            return;
        }

        if self.queue.len() + data.len() > MAX_QUEUE_SIZE {
            self.queue_overrun = true;
            return;
        }

        self.queue.extend_from_slice(data);
    }

    /// Drain the write queue for a poll response.
    pub fn dequeue(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.queue)
    }

    pub fn queue_overrun(&self) -> bool {
        self.queue_overrun
    }
}

/// Lookup key used by the store and the duplicate-login check.
pub fn make_safe_name(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

#[cfg(test)]
pub fn test_user(id: i32, name: &str) -> User {
    User::new(
        id,
        name.to_string(),
        String::new(),
        String::new(),
        Privileges::NORMAL | Privileges::VERIFIED,
        0,
        Geolocation::default(),
        0,
        ClientVersion {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            revision: 0,
            stream: Stream::Stable,
        },
        ClientHashes::default(),
        HashMap::new(),
        Vec::new(),
        Vec::new(),
        format!("token-{id}"),
        0,
    )
}
