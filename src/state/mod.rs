//! Session State
//!
//! The process-wide mutable world: user, channel and match registries
//! plus every operation that has to touch more than one of them at
//! once. A single `tokio::sync::Mutex<Sessions>` guards the whole
//! structure, serializing request handling exactly like a
//! single-threaded event loop would.

pub mod channel;
pub mod multi;
pub mod registry;
pub mod user;

use tracing::{info, warn};

use crate::packet::server;
use crate::packet::structures::Message;
use crate::state::channel::Channel;
use crate::state::multi::SlotStatus;
use crate::state::registry::{ChannelList, MatchList, UserList};

/// The shared mutable world.
#[derive(Default)]
pub struct Sessions {
    pub users: UserList,
    pub channels: ChannelList,
    pub matches: MatchList,
    /// Session id of the bot account.
    pub bot_id: i32,
}

impl Sessions {
    /// Presence + stats burst for one user, bot-aware.
    pub fn presence_and_stats(&self, user_id: i32) -> Option<Vec<u8>> {
        let user = self.users.get(user_id)?;

        let mut data = if user.id == self.bot_id {
            server::bot_presence(user)
        } else {
            server::user_presence(user)
        };

        data.extend_from_slice(&if user.id == self.bot_id {
            server::bot_stats(user)
        } else {
            server::user_stats(user)
        });

        Some(data)
    }

    /// Stats packet alone, bot-aware.
    pub fn stats_packet(&self, user_id: i32) -> Option<Vec<u8>> {
        let user = self.users.get(user_id)?;

        Some(if user.id == self.bot_id {
            server::bot_stats(user)
        } else {
            server::user_stats(user)
        })
    }

    // =========================================================================
    // CHANNELS
    // =========================================================================

    /// Push a channel's updated listing to whoever may see it.
    ///
    /// Instance channels update their members only; public channels go
    /// to every session allowed through the gate.
    pub fn channel_info_update(&mut self, real_name: &str) {
        let Some(channel) = self.channels.get(real_name) else {
            return;
        };

        let data = server::channel_info(channel);
        if channel.instance {
            let members = channel.users.clone();
            for user_id in members {
                if let Some(user) = self.users.get_mut(user_id) {
                    user.enqueue(&data);
                }
            }
        } else {
            let gate = channel.privileges;
            for user in self.users.iter_mut() {
                if gate.is_empty() || user.privileges.intersects(gate) {
                    user.enqueue(&data);
                }
            }
        }
    }

    /// Join a user to a channel; false when refused.
    pub fn join_channel(&mut self, user_id: i32, real_name: &str) -> bool {
        let Some(user) = self.users.get(user_id) else {
            return false;
        };
        let privileges = user.privileges;
        let in_lobby = user.in_lobby;

        let Some(channel) = self.channels.get_mut(real_name) else {
            return false;
        };

        if channel.contains(user_id) || !channel.has_permission(privileges) {
            return false;
        }

        // #lobby is only visible while the client has the browser open.
        if channel.real_name == "#lobby" && !in_lobby {
            return false;
        }

        channel.add_user(user_id);
        let display_name = channel.name.clone();

        if let Some(user) = self.users.get_mut(user_id) {
            user.channels.push(real_name.to_string());
            user.enqueue(&server::channel_join_success(&display_name));
        }

        self.channel_info_update(real_name);
        true
    }

    /// Remove a user from a channel; empty instance channels die here.
    pub fn leave_channel(&mut self, user_id: i32, real_name: &str, kick: bool) {
        let Some(channel) = self.channels.get_mut(real_name) else {
            return;
        };

        if !channel.contains(user_id) {
            return;
        }

        channel.remove_user(user_id);
        let display_name = channel.name.clone();
        let destroy = channel.instance && channel.users.is_empty();

        if let Some(user) = self.users.get_mut(user_id) {
            user.channels.retain(|name| name != real_name);
            if kick {
                user.enqueue(&server::channel_kick(&display_name));
            }
        }

        if destroy {
            self.channels.remove(real_name);
        } else {
            self.channel_info_update(real_name);
        }
    }

    /// Deliver a message to every member of a channel except the sender.
    ///
    /// Returns false when the sender lacks channel permission.
    pub fn channel_send(&mut self, real_name: &str, content: &str, sender_id: i32) -> bool {
        let Some(sender) = self.users.get(sender_id) else {
            return false;
        };
        let sender_name = sender.name.clone();
        let privileges = sender.privileges;

        let Some(channel) = self.channels.get(real_name) else {
            return false;
        };

        if !channel.has_permission(privileges) {
            return false;
        }

        let message = Message {
            sender: sender_name,
            content: content.to_string(),
            recipient: channel.name.clone(),
            sender_id,
        };
        let data = server::send_message(&message);

        let members = channel.users.clone();
        for user_id in members {
            if user_id == sender_id {
                continue;
            }
            if let Some(user) = self.users.get_mut(user_id) {
                user.enqueue(&data);
            }
        }

        true
    }

    /// Raw bytes to every member of a channel, minus the immune set.
    pub fn channel_broadcast(&mut self, real_name: &str, data: &[u8], immune: &[i32]) {
        let Some(channel) = self.channels.get(real_name) else {
            return;
        };

        let members = channel.users.clone();
        for user_id in members {
            if immune.contains(&user_id) {
                continue;
            }
            if let Some(user) = self.users.get_mut(user_id) {
                user.enqueue(data);
            }
        }
    }

    /// Enqueue a private message to one session.
    pub fn deliver_dm(&mut self, sender_id: i32, sender_name: &str, target_id: i32, content: &str) {
        let Some(target) = self.users.get_mut(target_id) else {
            return;
        };

        let message = Message {
            sender: sender_name.to_string(),
            content: content.to_string(),
            recipient: target.name.clone(),
            sender_id,
        };
        target.enqueue(&server::send_message(&message));
    }

    /// A reply from the bot straight into one session's queue.
    pub fn bot_reply(&mut self, target_id: i32, content: &str) {
        let bot_id = self.bot_id;
        let bot_name = self
            .users
            .get(bot_id)
            .map(|bot| bot.name.clone())
            .unwrap_or_default();

        self.deliver_dm(bot_id, &bot_name, target_id, content);
    }

    // =========================================================================
    // SPECTATING
    // =========================================================================

    /// Attach `user_id` to `host_id` as a spectator.
    pub fn add_spectator(&mut self, host_id: i32, user_id: i32) {
        let spec_name = format!("#spec_{host_id}");

        if self.channels.get(&spec_name).is_none() {
            let channel = Channel::instance("#spectator", &spec_name, "spectator chat");
            self.channels.add(channel);
            self.join_channel(host_id, &spec_name);
        }

        if !self.join_channel(user_id, &spec_name) {
            warn!(user_id, host_id, "spectator failed to join spectator channel");
        }

        let stealth = self
            .users
            .get(user_id)
            .map(|user| user.stealth)
            .unwrap_or(false);

        let existing: Vec<i32> = self
            .users
            .get(host_id)
            .map(|host| host.spectators.clone())
            .unwrap_or_default();

        if !stealth {
            let joined = server::fellow_spectator_joined(user_id);
            for spec_id in &existing {
                if let Some(spec) = self.users.get_mut(*spec_id) {
                    spec.enqueue(&joined);
                }
            }

            if let Some(host) = self.users.get_mut(host_id) {
                host.enqueue(&server::host_spectator_joined(user_id));
            }
        }

        // The newcomer always learns who is already watching.
        if let Some(user) = self.users.get_mut(user_id) {
            for spec_id in &existing {
                user.enqueue(&server::fellow_spectator_joined(*spec_id));
            }
            user.spectating = Some(host_id);
        }

        if let Some(host) = self.users.get_mut(host_id) {
            if !host.spectators.contains(&user_id) {
                host.spectators.push(user_id);
            }
        }
    }

    /// Detach `user_id` from `host_id`, tearing the channel down when
    /// the last watcher leaves.
    pub fn remove_spectator(&mut self, host_id: i32, user_id: i32) {
        let spec_name = format!("#spec_{host_id}");

        if let Some(user) = self.users.get_mut(user_id) {
            user.spectating = None;
        }
        let stealth = self
            .users
            .get(user_id)
            .map(|user| user.stealth)
            .unwrap_or(false);

        let remaining: Vec<i32> = {
            let Some(host) = self.users.get_mut(host_id) else {
                return;
            };
            host.spectators.retain(|id| *id != user_id);
            host.spectators.clone()
        };

        self.leave_channel(user_id, &spec_name, false);

        if remaining.is_empty() {
            // Host follows the last watcher out; the channel dies with them.
            self.leave_channel(host_id, &spec_name, false);
        }

        if !stealth {
            let left = server::fellow_spectator_left(user_id);
            for spec_id in &remaining {
                if let Some(spec) = self.users.get_mut(*spec_id) {
                    spec.enqueue(&left);
                }
            }

            if let Some(host) = self.users.get_mut(host_id) {
                host.enqueue(&server::host_spectator_left(user_id));
            }
        }
    }

    // =========================================================================
    // MULTIPLAYER
    // =========================================================================

    /// Rebroadcast match state to its chat, and a password-stripped
    /// copy to the lobby browser.
    pub fn enqueue_match_state(&mut self, match_id: usize, lobby: bool) {
        let Some(m) = self.matches.get(match_id) else {
            return;
        };

        let chat_name = m.chat_name.clone();
        let with_pw = server::update_match(m, true);
        let without_pw = server::update_match(m, false);

        self.channel_broadcast(&chat_name, &with_pw, &[]);

        if lobby {
            self.channel_broadcast("#lobby", &without_pw, &[]);
        }
    }

    /// Raw bytes to everyone in the match chat, minus the immune set.
    pub fn match_broadcast(&mut self, match_id: usize, data: &[u8], immune: &[i32]) {
        let Some(m) = self.matches.get(match_id) else {
            return;
        };
        let chat_name = m.chat_name.clone();
        self.channel_broadcast(&chat_name, data, immune);
    }

    /// Remove a user from their match, transferring host or disposing
    /// the match as needed.
    pub fn leave_match(&mut self, user_id: i32) {
        let Some(match_id) = self.users.get(user_id).and_then(|user| user.match_id) else {
            return;
        };

        let (chat_name, disposed, new_host) = {
            let Some(m) = self.matches.get_mut(match_id) else {
                return;
            };

            if let Some(slot) = m.slot_of_mut(user_id) {
                let new_status = if slot.status == SlotStatus::LOCKED {
                    SlotStatus::LOCKED
                } else {
                    SlotStatus::OPEN
                };
                slot.reset(new_status);
            }

            let chat_name = m.chat_name.clone();

            if m.is_empty() {
                (chat_name, true, None)
            } else if m.host_id == user_id {
                let next_host = m.user_ids().first().copied();
                if let Some(host_id) = next_host {
                    m.host_id = host_id;
                }
                (chat_name, false, next_host)
            } else {
                (chat_name, false, None)
            }
        };

        if let Some(user) = self.users.get_mut(user_id) {
            user.match_id = None;
        }
        self.leave_channel(user_id, &chat_name, false);

        if disposed {
            self.matches.remove(match_id);

            // tourney observers may still sit in the chat
            let members = self
                .channels
                .get(&chat_name)
                .map(|channel| channel.users.clone())
                .unwrap_or_default();
            for member_id in members {
                self.leave_channel(member_id, &chat_name, true);
            }
            self.channels.remove(&chat_name);

            self.channel_broadcast("#lobby", &server::dispose_match(match_id as i32), &[]);
            info!(match_id, "match disposed");
            return;
        }

        if let Some(host_id) = new_host {
            if let Some(host) = self.users.get_mut(host_id) {
                host.enqueue(&server::match_transfer_host());
            }
        }

        self.enqueue_match_state(match_id, true);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Tear a session down completely.
    pub fn logout(&mut self, user_id: i32) {
        let Some(user) = self.users.get(user_id) else {
            return;
        };
        let restricted = user.restricted();
        let spectating = user.spectating;
        let watchers = user.spectators.clone();
        let channel_names = user.channels.clone();

        if let Some(host_id) = spectating {
            self.remove_spectator(host_id, user_id);
        }
        for watcher_id in watchers {
            self.remove_spectator(user_id, watcher_id);
        }

        self.leave_match(user_id);

        for real_name in channel_names {
            self.leave_channel(user_id, &real_name, false);
        }

        if let Some(user) = self.users.remove(user_id) {
            info!(user_id, name = %user.name, "session destroyed");
        }

        if !restricted {
            self.users.broadcast(&server::logout(user_id), &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::privileges::Privileges;
    use crate::state::user::test_user;

    fn sessions_with(names: &[(i32, &str)]) -> Sessions {
        let mut sessions = Sessions::default();
        for (id, name) in names {
            sessions.users.add(test_user(*id, name));
        }
        sessions
            .channels
            .add(Channel::new("#osu", "main", Privileges::empty(), true));
        sessions
    }

    #[test]
    fn channel_membership_stays_consistent() {
        let mut sessions = sessions_with(&[(1, "a"), (2, "b")]);

        assert!(sessions.join_channel(1, "#osu"));
        assert!(!sessions.join_channel(1, "#osu")); // already a member

        let channel = sessions.channels.get("#osu").unwrap();
        assert!(channel.contains(1));
        assert!(sessions.users.get(1).unwrap().channels.contains(&"#osu".to_string()));

        sessions.leave_channel(1, "#osu", false);
        assert!(!sessions.channels.get("#osu").unwrap().contains(1));
        assert!(sessions.users.get(1).unwrap().channels.is_empty());
    }

    #[test]
    fn lobby_needs_browser_open() {
        let mut sessions = sessions_with(&[(1, "a")]);
        sessions
            .channels
            .add(Channel::new("#lobby", "lobby", Privileges::empty(), false));

        assert!(!sessions.join_channel(1, "#lobby"));

        sessions.users.get_mut(1).unwrap().in_lobby = true;
        assert!(sessions.join_channel(1, "#lobby"));
    }

    #[test]
    fn channel_send_skips_sender() {
        let mut sessions = sessions_with(&[(1, "a"), (2, "b")]);
        sessions.join_channel(1, "#osu");
        sessions.join_channel(2, "#osu");

        sessions.users.get_mut(1).unwrap().dequeue();
        sessions.users.get_mut(2).unwrap().dequeue();

        assert!(sessions.channel_send("#osu", "hi", 1));
        assert!(sessions.users.get_mut(1).unwrap().dequeue().is_empty());
        assert!(!sessions.users.get_mut(2).unwrap().dequeue().is_empty());
    }

    #[test]
    fn spectating_backrefs_stay_in_sync() {
        let mut sessions = sessions_with(&[(1, "host"), (2, "watcher")]);

        sessions.add_spectator(1, 2);
        assert_eq!(sessions.users.get(2).unwrap().spectating, Some(1));
        assert!(sessions.users.get(1).unwrap().spectators.contains(&2));
        assert!(sessions.channels.get("#spec_1").is_some());

        sessions.remove_spectator(1, 2);
        assert_eq!(sessions.users.get(2).unwrap().spectating, None);
        assert!(sessions.users.get(1).unwrap().spectators.is_empty());
        // last watcher gone, channel destroyed
        assert!(sessions.channels.get("#spec_1").is_none());
    }

    #[test]
    fn leaving_match_transfers_host_then_disposes() {
        let mut sessions = sessions_with(&[(1, "a"), (2, "b")]);

        let match_id = sessions.matches.create("m".into(), String::new(), 1).unwrap();
        sessions
            .channels
            .add(Channel::instance("#multiplayer", "#multi_0", "match chat"));
        {
            let m = sessions.matches.get_mut(match_id).unwrap();
            m.seat(0, 1);
            m.seat(1, 2);
        }
        sessions.users.get_mut(1).unwrap().match_id = Some(match_id);
        sessions.users.get_mut(2).unwrap().match_id = Some(match_id);
        sessions.join_channel(1, "#multi_0");
        sessions.join_channel(2, "#multi_0");

        sessions.leave_match(1);
        assert_eq!(sessions.matches.get(match_id).unwrap().host_id, 2);
        assert_eq!(sessions.users.get(1).unwrap().match_id, None);

        sessions.leave_match(2);
        assert!(sessions.matches.get(match_id).is_none());
        assert!(sessions.channels.get("#multi_0").is_none());
    }

    #[test]
    fn logout_broadcasts_and_cleans_up() {
        let mut sessions = sessions_with(&[(1, "a"), (2, "b")]);
        sessions.join_channel(1, "#osu");
        sessions.users.get_mut(2).unwrap().dequeue();

        sessions.logout(1);

        assert!(sessions.users.get(1).is_none());
        assert!(!sessions.channels.get("#osu").unwrap().contains(1));
        assert!(!sessions.users.get_mut(2).unwrap().dequeue().is_empty());
    }
}
