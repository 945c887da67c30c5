//! Chat Channels
//!
//! Named rooms with a privilege gate. Instance channels (`#spec_*`,
//! `#multi_*`) exist only while occupied and are never advertised to
//! the whole user list.

use crate::constants::privileges::Privileges;

/// A chat channel.
#[derive(Debug)]
pub struct Channel {
    /// Display name shown to clients.
    pub name: String,
    /// Routing key; differs from `name` only for instance channels.
    pub real_name: String,
    pub topic: String,
    /// Zero means open to everyone.
    pub privileges: Privileges,
    pub auto_join: bool,
    /// Ephemeral channel tied to a match or spectator host.
    pub instance: bool,
    /// Session ids of current members.
    pub users: Vec<i32>,
}

impl Channel {
    pub fn new(name: &str, topic: &str, privileges: Privileges, auto_join: bool) -> Self {
        Self {
            name: name.to_string(),
            real_name: name.to_string(),
            topic: topic.to_string(),
            privileges,
            auto_join,
            instance: false,
            users: Vec::new(),
        }
    }

    /// An ephemeral channel whose routing key differs from its display name.
    pub fn instance(name: &str, real_name: &str, topic: &str) -> Self {
        Self {
            name: name.to_string(),
            real_name: real_name.to_string(),
            topic: topic.to_string(),
            privileges: Privileges::empty(),
            auto_join: false,
            instance: true,
            users: Vec::new(),
        }
    }

    pub fn user_count(&self) -> i32 {
        self.users.len() as i32
    }

    pub fn contains(&self, user_id: i32) -> bool {
        self.users.contains(&user_id)
    }

    /// An empty gate admits everyone; otherwise any shared bit suffices.
    pub fn has_permission(&self, privileges: Privileges) -> bool {
        self.privileges.is_empty() || privileges.intersects(self.privileges)
    }

    pub fn add_user(&mut self, user_id: i32) {
        if !self.contains(user_id) {
            self.users.push(user_id);
        }
    }

    pub fn remove_user(&mut self, user_id: i32) {
        self.users.retain(|id| *id != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_channel_admits_everyone() {
        let channel = Channel::new("#osu", "main", Privileges::empty(), true);
        assert!(channel.has_permission(Privileges::empty()));
        assert!(channel.has_permission(Privileges::NORMAL));
    }

    #[test]
    fn gated_channel_needs_shared_bit() {
        let channel = Channel::new("#staff", "staff only", Privileges::STAFF, false);
        assert!(!channel.has_permission(Privileges::NORMAL | Privileges::SUPPORTER));
        assert!(channel.has_permission(Privileges::NORMAL | Privileges::ADMIN));
    }

    #[test]
    fn membership_is_deduplicated() {
        let mut channel = Channel::new("#osu", "", Privileges::empty(), true);
        channel.add_user(7);
        channel.add_user(7);
        assert_eq!(channel.user_count(), 1);

        channel.remove_user(7);
        assert!(!channel.contains(7));
    }
}
