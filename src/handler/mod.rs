//! Packet Dispatch
//!
//! A static registry from packet id to handler. Restricted users run
//! against a much smaller table; frames with no entry in the selected
//! table are skipped whole by their declared length.

pub mod chat;
pub mod general;
pub mod multiplayer;
pub mod spectate;

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::Config;
use crate::packet::codec::{FrameIter, ProtocolError, Reader};
use crate::packet::ids::PacketId;
use crate::services::Services;
use crate::state::Sessions;

/// Everything a handler may touch.
///
/// Mutation of `sessions` is synchronous; anything that needs I/O goes
/// through `services` on a spawned task so no handler suspends between
/// reads and writes of shared state.
pub struct Ctx<'a> {
    pub sessions: &'a mut Sessions,
    pub services: &'a Services,
    pub config: &'a Config,
    /// Unix seconds, sampled once per request.
    pub now: i64,
}

impl Ctx<'_> {
    /// Persist `latest_activity`, in session and store.
    pub fn touch_activity(&mut self, user_id: i32) {
        let now = self.now;
        if let Some(user) = self.sessions.users.get_mut(user_id) {
            user.latest_activity = now;
        }

        let store = self.services.store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.update_latest_activity(user_id, now).await {
                warn!(user_id, %err, "failed to persist activity");
            }
        });
    }
}

/// A packet handler: decode the payload, mutate the world.
pub type Handler = fn(&mut Ctx<'_>, i32, &mut Reader<'_>) -> Result<(), ProtocolError>;

/// The id -> handler tables.
pub struct HandlerTable {
    full: HashMap<u16, Handler>,
    restricted: HashMap<u16, Handler>,
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        let mut table = Self {
            full: HashMap::new(),
            restricted: HashMap::new(),
        };

        use PacketId::*;

        table.register(OsuChangeAction, true, general::change_action);
        table.register(OsuSendPublicMessage, false, chat::send_public_message);
        table.register(OsuLogout, true, general::logout);
        table.register(OsuRequestStatusUpdate, true, general::request_status_update);
        table.register(OsuPing, true, general::ping);

        table.register(OsuStartSpectating, false, spectate::start_spectating);
        table.register(OsuStopSpectating, false, spectate::stop_spectating);
        table.register(OsuSpectateFrames, false, spectate::spectate_frames);
        table.register(OsuCantSpectate, false, spectate::cant_spectate);

        table.register(OsuSendPrivateMessage, false, chat::send_private_message);

        table.register(OsuPartLobby, false, multiplayer::part_lobby);
        table.register(OsuJoinLobby, false, multiplayer::join_lobby);
        table.register(OsuCreateMatch, false, multiplayer::create_match);
        table.register(OsuJoinMatch, false, multiplayer::join_match);
        table.register(OsuPartMatch, false, multiplayer::part_match);
        table.register(OsuMatchChangeSlot, false, multiplayer::change_slot);
        table.register(OsuMatchReady, false, multiplayer::ready);
        table.register(OsuMatchLock, false, multiplayer::lock_slot);
        table.register(OsuMatchChangeSettings, false, multiplayer::change_settings);
        table.register(OsuMatchStart, false, multiplayer::start);
        table.register(OsuMatchScoreUpdate, false, multiplayer::score_update);
        table.register(OsuMatchComplete, false, multiplayer::complete);
        table.register(OsuMatchChangeMods, false, multiplayer::change_mods);
        table.register(OsuMatchLoadComplete, false, multiplayer::load_complete);
        table.register(OsuMatchNoBeatmap, false, multiplayer::no_beatmap);
        table.register(OsuMatchNotReady, false, multiplayer::not_ready);
        table.register(OsuMatchFailed, false, multiplayer::failed);
        table.register(OsuMatchHasBeatmap, false, multiplayer::has_beatmap);
        table.register(OsuMatchSkipRequest, false, multiplayer::skip_request);
        table.register(OsuMatchTransferHost, false, multiplayer::transfer_host);
        table.register(OsuMatchChangeTeam, false, multiplayer::change_team);
        table.register(OsuMatchInvite, false, multiplayer::invite);
        table.register(OsuMatchChangePassword, false, multiplayer::change_password);

        table.register(OsuChannelJoin, false, general::channel_join);
        table.register(OsuChannelPart, false, general::channel_part);

        table.register(OsuFriendAdd, false, general::friend_add);
        table.register(OsuFriendRemove, false, general::friend_remove);

        table.register(OsuReceiveUpdates, false, general::receive_updates);
        table.register(OsuSetAwayMessage, false, general::set_away_message);
        table.register(OsuUserStatsRequest, false, general::stats_request);
        table.register(OsuUserPresenceRequest, false, general::presence_request);
        table.register(OsuUserPresenceRequestAll, false, general::presence_request_all);
        table.register(OsuToggleBlockNonFriendDms, false, general::toggle_dms);

        table.register(
            OsuTournamentMatchInfoRequest,
            false,
            multiplayer::tournament_match_info,
        );
        table.register(
            OsuTournamentJoinMatchChannel,
            false,
            multiplayer::tournament_join_channel,
        );
        table.register(
            OsuTournamentLeaveMatchChannel,
            false,
            multiplayer::tournament_leave_channel,
        );

        table
    }

    fn register(&mut self, id: PacketId, allow_restricted: bool, handler: Handler) {
        self.full.insert(id.as_u16(), handler);
        if allow_restricted {
            self.restricted.insert(id.as_u16(), handler);
        }
    }

    /// Handle every frame of a poll request body.
    pub fn dispatch_body(&self, ctx: &mut Ctx<'_>, user_id: i32, body: &[u8]) {
        let restricted = ctx
            .sessions
            .users
            .get(user_id)
            .map(|user| user.restricted())
            .unwrap_or(true);

        let table = if restricted { &self.restricted } else { &self.full };

        for (packet_id, payload) in FrameIter::new(body) {
            let Some(handler) = table.get(&packet_id) else {
                debug!(packet_id, "skipping unhandled frame");
                continue;
            };

            let mut reader = Reader::new(payload);
            if let Err(err) = handler(ctx, user_id, &mut reader) {
                warn!(packet_id, user_id, %err, "malformed frame skipped");
            } else if packet_id != PacketId::OsuPing.as_u16() {
                debug!(packet_id, user_id, "frame handled");
            }

            // the session may be gone after a logout frame
            if ctx.sessions.users.get(user_id).is_none() {
                return;
            }
        }

        ctx.touch_activity(user_id);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::state::channel::Channel;
    use crate::state::user::test_user;

    /// A world with N plain users and the standard channels.
    pub fn fixture(user_ids: &[i32]) -> (Sessions, Services, Config) {
        let mut sessions = Sessions::default();
        for id in user_ids {
            sessions.users.add(test_user(*id, &format!("user{id}")));
        }

        sessions.channels.add(Channel::new(
            "#osu",
            "main channel",
            crate::constants::privileges::Privileges::empty(),
            true,
        ));
        sessions.channels.add(Channel::new(
            "#lobby",
            "lobby",
            crate::constants::privileges::Privileges::empty(),
            false,
        ));

        (sessions, Services::in_memory(), Config::default())
    }

    /// Run one packet through the full dispatch path.
    pub fn dispatch_one(
        sessions: &mut Sessions,
        services: &Services,
        config: &Config,
        user_id: i32,
        packet_id: PacketId,
        payload: &[u8],
    ) {
        let table = HandlerTable::new();
        let body = crate::packet::codec::frame(packet_id.as_u16(), payload);

        let mut ctx = Ctx {
            sessions,
            services,
            config,
            now: 1_700_000_000,
        };
        table.dispatch_body(&mut ctx, user_id, &body);
    }
}
