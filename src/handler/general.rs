//! General Handlers
//!
//! Status updates, session lifecycle, friends, channel membership and
//! presence queries.

use tracing::warn;

use crate::constants::action::Action;
use crate::constants::mode::Mode;
use crate::constants::mods::Mods;
use crate::handler::Ctx;
use crate::packet::codec::{ProtocolError, Reader};
use crate::packet::server;
use crate::packet::structures::Message;

/// Channels the client talks about but the server never carries.
pub const IGNORED_CHANNELS: [&str; 2] = ["#highlight", "#userlog"];

/// `OSU_CHANGE_ACTION`: overwrite the user's status and fan the new
/// stats out to everyone.
pub fn change_action(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let action = reader.read_u8()?;
    let info_text = reader.read_string()?;
    let map_md5 = reader.read_string()?;
    let mods = Mods::from_wire(reader.read_u32()?);
    let mode = Mode::from_wire(reader.read_u8()?, mods);
    let map_id = reader.read_i32()?;

    let Some(user) = ctx.sessions.users.get_mut(user_id) else {
        return Ok(());
    };

    user.status.action = Action::from_u8(action);
    user.status.info_text = info_text;
    user.status.map_md5 = map_md5;
    user.status.mods = mods;
    user.status.mode = mode;
    user.status.map_id = map_id;

    if !user.restricted() {
        if let Some(data) = ctx.sessions.stats_packet(user_id) {
            ctx.sessions.users.broadcast(&data, &[]);
        }
    }

    Ok(())
}

/// `OSU_LOGOUT`: tear the session down, unless the client is doing its
/// login-time double-send.
pub fn logout(ctx: &mut Ctx<'_>, user_id: i32, _reader: &mut Reader<'_>) -> Result<(), ProtocolError> {
    let Some(user) = ctx.sessions.users.get(user_id) else {
        return Ok(());
    };

    if ctx.now - user.login_time < 1 {
        return Ok(()); // just osu things
    }

    ctx.sessions.logout(user_id);
    ctx.touch_activity(user_id);
    Ok(())
}

/// `OSU_REQUEST_STATUS_UPDATE`: the client wants its own stats back.
pub fn request_status_update(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    _reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    if let Some(data) = ctx.sessions.stats_packet(user_id) {
        if let Some(user) = ctx.sessions.users.get_mut(user_id) {
            user.enqueue(&data);
        }
    }
    Ok(())
}

/// `OSU_PING`: nothing to do; activity is touched by the dispatch loop.
pub fn ping(_ctx: &mut Ctx<'_>, _user_id: i32, _reader: &mut Reader<'_>) -> Result<(), ProtocolError> {
    Ok(())
}

/// `OSU_CHANNEL_JOIN`.
pub fn channel_join(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let channel_name = reader.read_string()?;
    if IGNORED_CHANNELS.contains(&channel_name.as_str()) {
        return Ok(());
    }

    if !ctx.sessions.join_channel(user_id, &channel_name) {
        warn!(user_id, channel = %channel_name, "failed to join channel");
    }
    Ok(())
}

/// `OSU_CHANNEL_PART`.
pub fn channel_part(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let channel_name = reader.read_string()?;
    if IGNORED_CHANNELS.contains(&channel_name.as_str()) {
        return Ok(());
    }

    match ctx.sessions.channels.get(&channel_name) {
        Some(channel) if channel.contains(user_id) => {
            ctx.sessions.leave_channel(user_id, &channel_name, false);
        }
        _ => warn!(user_id, channel = %channel_name, "failed to leave channel"),
    }
    Ok(())
}

/// `OSU_FRIEND_ADD`.
pub fn friend_add(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let target_id = reader.read_i32()?;

    if ctx.sessions.users.get(target_id).is_none() {
        warn!(user_id, target_id, "tried to friend a non-existent user");
        return Ok(());
    }
    if target_id == ctx.sessions.bot_id {
        return Ok(());
    }

    if let Some(user) = ctx.sessions.users.get_mut(user_id) {
        if !user.friends.contains(&target_id) {
            user.friends.push(target_id);
        }
    }

    let store = ctx.services.store.clone();
    tokio::spawn(async move {
        if let Err(err) = store.add_friend(user_id, target_id).await {
            warn!(user_id, target_id, %err, "failed to persist friendship");
        }
    });

    ctx.touch_activity(user_id);
    Ok(())
}

/// `OSU_FRIEND_REMOVE`.
pub fn friend_remove(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let target_id = reader.read_i32()?;

    if ctx.sessions.users.get(target_id).is_none() {
        warn!(user_id, target_id, "tried to unfriend a non-existent user");
        return Ok(());
    }
    if target_id == ctx.sessions.bot_id {
        return Ok(());
    }

    if let Some(user) = ctx.sessions.users.get_mut(user_id) {
        user.friends.retain(|id| *id != target_id);
    }

    let store = ctx.services.store.clone();
    tokio::spawn(async move {
        if let Err(err) = store.remove_friend(user_id, target_id).await {
            warn!(user_id, target_id, %err, "failed to remove friendship");
        }
    });

    ctx.touch_activity(user_id);
    Ok(())
}

/// `OSU_RECEIVE_UPDATES`: presence filter, accepted and ignored.
pub fn receive_updates(
    _ctx: &mut Ctx<'_>,
    _user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let _filter = reader.read_i32()?;
    Ok(())
}

/// `OSU_SET_AWAY_MESSAGE`: accepted and ignored.
pub fn set_away_message(
    _ctx: &mut Ctx<'_>,
    _user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let _message = Message::read(reader)?;
    Ok(())
}

/// `OSU_USER_STATS_REQUEST`: stats for a list of online users.
pub fn stats_request(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let requested = reader.read_i32_list()?;
    let online = ctx.sessions.users.unrestricted_ids();

    for target_id in requested {
        if target_id == user_id || !online.contains(&target_id) {
            continue;
        }

        if let Some(data) = ctx.sessions.stats_packet(target_id) {
            if let Some(user) = ctx.sessions.users.get_mut(user_id) {
                user.enqueue(&data);
            }
        }
    }
    Ok(())
}

/// `OSU_USER_PRESENCE_REQUEST`.
pub fn presence_request(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let requested = reader.read_i32_list()?;
    let online = ctx.sessions.users.unrestricted_ids();

    for target_id in requested {
        if target_id == user_id || !online.contains(&target_id) {
            continue;
        }

        let data = {
            let Some(target) = ctx.sessions.users.get(target_id) else {
                continue;
            };
            if target_id == ctx.sessions.bot_id {
                server::bot_presence(target)
            } else {
                server::user_presence(target)
            }
        };

        if let Some(user) = ctx.sessions.users.get_mut(user_id) {
            user.enqueue(&data);
        }
    }
    Ok(())
}

/// `OSU_USER_PRESENCE_REQUEST_ALL`.
pub fn presence_request_all(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    _reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let mut buffer = Vec::new();
    let bot_id = ctx.sessions.bot_id;

    for target in ctx.sessions.users.iter() {
        if target.restricted() {
            continue;
        }

        buffer.extend_from_slice(&if target.id == bot_id {
            server::bot_presence(target)
        } else {
            server::user_presence(target)
        });
    }

    if let Some(user) = ctx.sessions.users.get_mut(user_id) {
        user.enqueue(&buffer);
    }
    Ok(())
}

/// `OSU_TOGGLE_BLOCK_NON_FRIEND_DMS`.
pub fn toggle_dms(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let value = reader.read_i32()?;

    if let Some(user) = ctx.sessions.users.get_mut(user_id) {
        user.friend_only_dms = value == 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::{dispatch_one, fixture};
    use crate::packet::ids::PacketId;
    use crate::packet::Writer;

    fn change_action_payload() -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(2); // playing
        w.write_string("cool map [insane]");
        w.write_string(&"ab".repeat(16));
        w.write_u32(Mods::HIDDEN.bits());
        w.write_u8(0);
        w.write_i32(4242);
        w.into_bytes()
    }

    #[tokio::test]
    async fn change_action_updates_status_and_broadcasts() {
        let (mut sessions, services, config) = fixture(&[1, 2]);
        sessions.users.get_mut(2).unwrap().dequeue();

        dispatch_one(
            &mut sessions,
            &services,
            &config,
            1,
            PacketId::OsuChangeAction,
            &change_action_payload(),
        );

        let user = sessions.users.get(1).unwrap();
        assert_eq!(user.status.action, Action::Playing);
        assert_eq!(user.status.map_id, 4242);
        assert_eq!(user.status.mods, Mods::HIDDEN);

        // other sessions got a stats packet
        assert!(!sessions.users.get_mut(2).unwrap().dequeue().is_empty());
    }

    #[tokio::test]
    async fn friend_add_and_remove() {
        let (mut sessions, services, config) = fixture(&[1, 2]);

        let mut w = Writer::new();
        w.write_i32(2);
        let payload = w.into_bytes();

        dispatch_one(&mut sessions, &services, &config, 1, PacketId::OsuFriendAdd, &payload);
        assert_eq!(sessions.users.get(1).unwrap().friends, vec![2]);

        dispatch_one(&mut sessions, &services, &config, 1, PacketId::OsuFriendRemove, &payload);
        assert!(sessions.users.get(1).unwrap().friends.is_empty());
    }

    #[tokio::test]
    async fn immediate_logout_is_ignored() {
        let (mut sessions, services, config) = fixture(&[1]);
        // login_time == dispatch now
        sessions.users.get_mut(1).unwrap().login_time = 1_700_000_000;

        dispatch_one(&mut sessions, &services, &config, 1, PacketId::OsuLogout, &[]);
        assert!(sessions.users.get(1).is_some());

        sessions.users.get_mut(1).unwrap().login_time = 0;
        dispatch_one(&mut sessions, &services, &config, 1, PacketId::OsuLogout, &[]);
        assert!(sessions.users.get(1).is_none());
    }

    #[tokio::test]
    async fn toggle_dms_sets_flag() {
        let (mut sessions, services, config) = fixture(&[1]);

        let mut w = Writer::new();
        w.write_i32(1);
        dispatch_one(
            &mut sessions,
            &services,
            &config,
            1,
            PacketId::OsuToggleBlockNonFriendDms,
            &w.into_bytes(),
        );

        assert!(sessions.users.get(1).unwrap().friend_only_dms);
    }
}
