//! Server Packet Builders
//!
//! One function per server->client packet, each returning the complete
//! frame (header + payload) ready for a write queue.

use crate::packet::codec::{frame, Writer, HEADER_SIZE};
use crate::packet::ids::PacketId;
use crate::packet::structures::{ChannelInfo, Message};
use crate::state::channel::Channel;
use crate::state::multi::Match;
use crate::state::user::User;

fn packet(id: PacketId, writer: Writer) -> Vec<u8> {
    frame(id.as_u16(), &writer.into_bytes())
}

fn empty_packet(id: PacketId) -> Vec<u8> {
    frame(id.as_u16(), &[])
}

pub fn pong() -> Vec<u8> {
    empty_packet(PacketId::ChoPong)
}

pub fn user_id(id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(id);
    packet(PacketId::ChoUserId, w)
}

pub fn protocol_version(version: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(version);
    packet(PacketId::ChoProtocolVersion, w)
}

pub fn bancho_privileges(privileges: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(privileges);
    packet(PacketId::ChoPrivileges, w)
}

pub fn notification(msg: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(msg);
    packet(PacketId::ChoNotification, w)
}

pub fn channel_info_end() -> Vec<u8> {
    empty_packet(PacketId::ChoChannelInfoEnd)
}

pub fn restart_server(millis: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(millis);
    packet(PacketId::ChoRestart, w)
}

pub fn menu_icon(icon_url: &str, click_url: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(&format!("{icon_url}|{click_url}"));
    packet(PacketId::ChoMainMenuIcon, w)
}

pub fn friends_list(friends: &[i32]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32_list(friends);
    packet(PacketId::ChoFriendsList, w)
}

pub fn silence_end(seconds: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(seconds);
    packet(PacketId::ChoSilenceEnd, w)
}

pub fn send_message(message: &Message) -> Vec<u8> {
    let mut w = Writer::new();
    message.write(&mut w);
    packet(PacketId::ChoSendMessage, w)
}

pub fn logout(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    w.write_u8(0);
    packet(PacketId::ChoUserLogout, w)
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Presence for the bot account; fixed offset and rank.
pub fn bot_presence(user: &User) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user.id);
    w.write_string(&user.name);
    w.write_u8(24); // utc offset
    w.write_u8(user.geolocation.country.code);
    w.write_u8(user.bancho_privileges().bits());
    w.write_f32(user.geolocation.longitude);
    w.write_f32(user.geolocation.latitude);
    w.write_i32(0); // rank
    packet(PacketId::ChoUserPresence, w)
}

pub fn user_presence(user: &User) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user.id);
    w.write_string(&user.name);
    w.write_u8((user.utc_offset + 24) as u8);
    w.write_u8(user.geolocation.country.code);
    w.write_u8(user.bancho_privileges().bits() | (user.status.mode.as_vn() << 5));
    w.write_f32(user.geolocation.longitude);
    w.write_f32(user.geolocation.latitude);
    w.write_i32(user.current_stats().global_rank);
    packet(PacketId::ChoUserPresence, w)
}

/// Stats for the bot account; everything zeroed but the watching status.
pub fn bot_stats(user: &User) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user.id);
    w.write_u8(crate::constants::action::Action::Watching as u8);
    w.write_string("over everyone");
    w.write_string(""); // map md5
    w.write_i32(0); // mods
    w.write_u8(0); // mode
    w.write_i32(0); // map id
    w.write_i64(0); // ranked score
    w.write_f32(0.0); // accuracy
    w.write_i32(0); // playcount
    w.write_i64(0); // total score
    w.write_i32(0); // rank
    w.write_i16(0); // pp
    packet(PacketId::ChoUserStats, w)
}

pub fn user_stats(user: &User) -> Vec<u8> {
    let stats = user.current_stats();

    // The stats panel's pp field is i16; overflowing values ride in the
    // ranked-score field instead, which the client then displays.
    let (ranked_score, pp) = if stats.pp > i16::MAX as i32 {
        (stats.pp as i64, 0)
    } else {
        (stats.ranked_score, stats.pp as i16)
    };

    let mut w = Writer::new();
    w.write_i32(user.id);
    w.write_u8(user.status.action as u8);
    w.write_string(&user.status.info_text);
    w.write_string(&user.status.map_md5);
    w.write_u32(user.status.mods.bits());
    w.write_u8(user.status.mode.as_vn());
    w.write_i32(user.status.map_id);
    w.write_i64(ranked_score);
    w.write_f32(stats.accuracy / 100.0);
    w.write_i32(stats.playcount);
    w.write_i64(stats.total_score);
    w.write_i32(stats.global_rank);
    w.write_i16(pp);
    packet(PacketId::ChoUserStats, w)
}

// =============================================================================
// SPECTATING
// =============================================================================

pub fn host_spectator_joined(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    packet(PacketId::ChoSpectatorJoined, w)
}

pub fn host_spectator_left(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    packet(PacketId::ChoSpectatorLeft, w)
}

pub fn fellow_spectator_joined(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    packet(PacketId::ChoFellowSpectatorJoined, w)
}

pub fn fellow_spectator_left(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    packet(PacketId::ChoFellowSpectatorLeft, w)
}

/// Relay a raw replay-frame bundle to watchers.
pub fn spectate_frames(raw: &[u8]) -> Vec<u8> {
    frame(PacketId::ChoSpectateFrames.as_u16(), raw)
}

pub fn cant_spectate(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    packet(PacketId::ChoSpectatorCantSpectate, w)
}

// =============================================================================
// CHANNELS
// =============================================================================

pub fn channel_join_success(name: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(name);
    packet(PacketId::ChoChannelJoinSuccess, w)
}

pub fn channel_kick(name: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(name);
    packet(PacketId::ChoChannelKick, w)
}

pub fn channel_info(channel: &Channel) -> Vec<u8> {
    let info = ChannelInfo {
        name: channel.name.clone(),
        topic: channel.topic.clone(),
        user_count: channel.user_count(),
    };

    let mut w = Writer::new();
    info.write(&mut w);
    packet(PacketId::ChoChannelInfo, w)
}

// =============================================================================
// ACCOUNT STATE
// =============================================================================

pub fn version_update_forced() -> Vec<u8> {
    empty_packet(PacketId::ChoVersionUpdateForced)
}

pub fn user_restricted() -> Vec<u8> {
    empty_packet(PacketId::ChoAccountRestricted)
}

/// DM rejection: the recipient is silenced.
pub fn target_silenced(target_name: &str) -> Vec<u8> {
    let message = Message {
        sender: String::new(),
        content: String::new(),
        recipient: target_name.to_string(),
        sender_id: 0,
    };

    let mut w = Writer::new();
    message.write(&mut w);
    packet(PacketId::ChoTargetIsSilenced, w)
}

/// DM rejection: blocked or non-friend with friend-only DMs.
pub fn dm_blocked(target_name: &str) -> Vec<u8> {
    let message = Message {
        sender: String::new(),
        content: String::new(),
        recipient: target_name.to_string(),
        sender_id: 0,
    };

    let mut w = Writer::new();
    message.write(&mut w);
    packet(PacketId::ChoUserDmBlocked, w)
}

// =============================================================================
// MULTIPLAYER
// =============================================================================

fn match_packet(id: PacketId, m: &Match, send_pw: bool) -> Vec<u8> {
    let mut w = Writer::new();
    m.to_frame().write(&mut w, send_pw);
    packet(id, w)
}

pub fn new_match(m: &Match) -> Vec<u8> {
    match_packet(PacketId::ChoNewMatch, m, true)
}

pub fn update_match(m: &Match, send_pw: bool) -> Vec<u8> {
    match_packet(PacketId::ChoUpdateMatch, m, send_pw)
}

pub fn match_start(m: &Match) -> Vec<u8> {
    match_packet(PacketId::ChoMatchStart, m, true)
}

pub fn match_join_success(m: &Match) -> Vec<u8> {
    match_packet(PacketId::ChoMatchJoinSuccess, m, true)
}

pub fn match_join_fail() -> Vec<u8> {
    empty_packet(PacketId::ChoMatchJoinFail)
}

pub fn dispose_match(match_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(match_id);
    packet(PacketId::ChoDisposeMatch, w)
}

pub fn match_transfer_host() -> Vec<u8> {
    empty_packet(PacketId::ChoMatchTransferHost)
}

pub fn match_complete() -> Vec<u8> {
    empty_packet(PacketId::ChoMatchComplete)
}

pub fn match_all_players_loaded() -> Vec<u8> {
    empty_packet(PacketId::ChoMatchAllPlayersLoaded)
}

pub fn match_player_failed(slot_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(slot_id);
    packet(PacketId::ChoMatchPlayerFailed, w)
}

pub fn match_player_skipped(user_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_i32(user_id);
    packet(PacketId::ChoMatchPlayerSkipped, w)
}

pub fn match_skip() -> Vec<u8> {
    empty_packet(PacketId::ChoMatchSkip)
}

pub fn match_change_password(password: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(password);
    packet(PacketId::ChoMatchChangePassword, w)
}

pub fn match_invite(sender: &User, target_name: &str, embed: &str) -> Vec<u8> {
    let message = Message {
        sender: sender.name.clone(),
        content: format!("Join my multiplayer match: {embed}"),
        recipient: target_name.to_string(),
        sender_id: sender.id,
    };

    let mut w = Writer::new();
    message.write(&mut w);
    packet(PacketId::ChoMatchInvite, w)
}

/// Per-tick score relay. The raw client payload goes straight back out
/// with byte 11 of the assembled frame (the score frame's slot byte)
/// overwritten by the sender's slot id.
pub fn match_score_update(raw: &[u8], slot_id: u8) -> Vec<u8> {
    let mut out = frame(PacketId::ChoMatchScoreUpdate.as_u16(), raw);
    if out.len() > HEADER_SIZE + 4 {
        out[HEADER_SIZE + 4] = slot_id;
    }
    out
}
