//! Global Registries
//!
//! Process-wide directories of users, channels and matches. The
//! registries own the objects; everything else refers by id or name.

use tracing::{debug, warn};

use crate::constants::privileges::Privileges;
use crate::state::channel::Channel;
use crate::state::multi::Match;
use crate::state::user::User;

/// Fixed size of the match directory.
pub const MAX_MATCHES: usize = 64;

// =============================================================================
// USERS
// =============================================================================

/// Directory of live sessions.
#[derive(Default)]
pub struct UserList {
    users: Vec<User>,
}

impl UserList {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.users.iter_mut()
    }

    pub fn get(&self, id: i32) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut User> {
        self.users.iter_mut().find(|user| user.id == id)
    }

    pub fn by_safe_name(&self, safe_name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.safe_name == safe_name)
    }

    pub fn by_token(&self, token: &str) -> Option<&User> {
        self.users.iter().find(|user| user.token == token)
    }

    pub fn id_for_token(&self, token: &str) -> Option<i32> {
        self.by_token(token).map(|user| user.id)
    }

    /// Insert a session; a duplicate id is ignored.
    pub fn add(&mut self, user: User) {
        if self.get(user.id).is_some() {
            warn!(user_id = user.id, "session already in user list");
            return;
        }

        self.users.push(user);
    }

    pub fn remove(&mut self, id: i32) -> Option<User> {
        let idx = self.users.iter().position(|user| user.id == id)?;
        Some(self.users.swap_remove(idx))
    }

    /// Ids of everyone not in a disallowed state.
    pub fn unrestricted_ids(&self) -> Vec<i32> {
        self.users
            .iter()
            .filter(|user| !user.restricted())
            .map(|user| user.id)
            .collect()
    }

    /// Ids of staff sessions.
    pub fn staff_ids(&self) -> Vec<i32> {
        self.users
            .iter()
            .filter(|user| user.privileges.intersects(Privileges::STAFF))
            .map(|user| user.id)
            .collect()
    }

    /// Enqueue bytes to every session except the immune ids.
    pub fn broadcast(&mut self, data: &[u8], immune: &[i32]) {
        for user in self.users.iter_mut() {
            if !immune.contains(&user.id) {
                user.enqueue(data);
            }
        }
    }
}

// =============================================================================
// CHANNELS
// =============================================================================

/// Directory of channels, keyed by routing name.
#[derive(Default)]
pub struct ChannelList {
    channels: Vec<Channel>,
}

impl ChannelList {
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn get(&self, real_name: &str) -> Option<&Channel> {
        self.channels.iter().find(|ch| ch.real_name == real_name)
    }

    pub fn get_mut(&mut self, real_name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|ch| ch.real_name == real_name)
    }

    pub fn add(&mut self, channel: Channel) {
        debug!(channel = %channel.real_name, "channel added");
        self.channels.push(channel);
    }

    pub fn remove(&mut self, real_name: &str) -> Option<Channel> {
        let idx = self
            .channels
            .iter()
            .position(|ch| ch.real_name == real_name)?;

        debug!(channel = %real_name, "channel removed");
        Some(self.channels.swap_remove(idx))
    }
}

// =============================================================================
// MATCHES
// =============================================================================

/// Fixed 64-slot directory of matches; free indices are `None`.
pub struct MatchList {
    matches: [Option<Match>; MAX_MATCHES],
}

impl Default for MatchList {
    fn default() -> Self {
        Self {
            matches: std::array::from_fn(|_| None),
        }
    }
}

impl MatchList {
    pub fn get(&self, id: usize) -> Option<&Match> {
        self.matches.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Match> {
        self.matches.get_mut(id)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().flatten()
    }

    /// Allocate the lowest free index; `None` when the directory is full.
    pub fn create(&mut self, name: String, password: String, host_id: i32) -> Option<usize> {
        let idx = self.matches.iter().position(Option::is_none)?;

        self.matches[idx] = Some(Match::new(idx, name, password, host_id));
        debug!(match_id = idx, "match added");
        Some(idx)
    }

    pub fn remove(&mut self, id: usize) -> Option<Match> {
        let taken = self.matches.get_mut(id)?.take();
        if taken.is_some() {
            debug!(match_id = id, "match removed");
        }
        taken
    }
}
