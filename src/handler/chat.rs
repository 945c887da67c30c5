//! Chat Handlers
//!
//! Public channel messages (with the `#spectator` / `#multiplayer`
//! rewrites) and private messages with the three-way DM policy.

use tracing::{info, warn};

use crate::commands;
use crate::handler::general::IGNORED_CHANNELS;
use crate::handler::Ctx;
use crate::packet::codec::{ProtocolError, Reader};
use crate::packet::server;
use crate::packet::structures::Message;
use crate::state::user::make_safe_name;

/// Resolve the channel a public message actually targets.
fn resolve_target_channel(ctx: &Ctx<'_>, user_id: i32, recipient: &str) -> Option<String> {
    match recipient {
        "#spectator" => {
            let user = ctx.sessions.users.get(user_id)?;
            let host_id = user.spectating.unwrap_or(user.id);
            Some(format!("#spec_{host_id}"))
        }
        "#multiplayer" => {
            let user = ctx.sessions.users.get(user_id)?;
            let match_id = user.match_id?;
            Some(ctx.sessions.matches.get(match_id)?.chat_name.clone())
        }
        other => Some(other.to_string()),
    }
}

/// `OSU_SEND_PUBLIC_MESSAGE`.
pub fn send_public_message(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let message = Message::read(reader)?;

    let Some(user) = ctx.sessions.users.get(user_id) else {
        return Ok(());
    };

    if user.silenced(ctx.now) {
        warn!(user_id, "silenced user tried to chat");
        return Ok(());
    }

    let content = message.content.trim().to_string();
    if content.is_empty() {
        return Ok(());
    }

    let recipient = message.recipient.as_str();
    if IGNORED_CHANNELS.contains(&recipient) {
        return Ok(());
    }

    let Some(real_name) = resolve_target_channel(ctx, user_id, recipient) else {
        warn!(user_id, recipient, "message had no resolvable channel");
        return Ok(());
    };

    let Some(channel) = ctx.sessions.channels.get(&real_name) else {
        warn!(user_id, channel = %real_name, "message to non-existent channel");
        return Ok(());
    };

    if !channel.contains(user_id) {
        warn!(user_id, channel = %real_name, "message to channel without membership");
        return Ok(());
    }

    if !ctx.sessions.channel_send(&real_name, &content, user_id) {
        warn!(user_id, channel = %real_name, "message to channel without permission");
        return Ok(());
    }

    if content.starts_with('!') {
        if let Some(reply) = commands::dispatch(ctx, user_id, &content) {
            let bot_id = ctx.sessions.bot_id;
            ctx.sessions.channel_send(&real_name, &reply, bot_id);
            // the sender is skipped by channel fan-out; answer them directly
            ctx.sessions.bot_reply(user_id, &reply);
        }
    }

    ctx.touch_activity(user_id);
    info!(user_id, channel = %real_name, "chat message sent");
    Ok(())
}

/// `OSU_SEND_PRIVATE_MESSAGE`.
pub fn send_private_message(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let message = Message::read(reader)?;

    let Some(user) = ctx.sessions.users.get(user_id) else {
        return Ok(());
    };
    let sender_name = user.name.clone();

    if user.silenced(ctx.now) {
        warn!(user_id, "silenced user tried to dm");
        return Ok(());
    }

    let content = message.content.trim().to_string();
    if content.is_empty() {
        return Ok(());
    }

    let target_name = message.recipient.clone();
    let Some(target) = ctx
        .sessions
        .users
        .by_safe_name(&make_safe_name(&target_name))
    else {
        warn!(user_id, target = %target_name, "dm to non-existent user");
        return Ok(());
    };

    let target_id = target.id;
    let blocked = target.blocked.contains(&user_id);
    let friend_gate = target.friend_only_dms && !target.friends.contains(&user_id);
    let target_silenced = target.silenced(ctx.now);

    if blocked || friend_gate {
        if let Some(sender) = ctx.sessions.users.get_mut(user_id) {
            sender.enqueue(&server::dm_blocked(&target_name));
        }
        warn!(user_id, target_id, "dm rejected by block policy");
        return Ok(());
    }

    if target_silenced {
        if let Some(sender) = ctx.sessions.users.get_mut(user_id) {
            sender.enqueue(&server::target_silenced(&target_name));
        }
        warn!(user_id, target_id, "dm to silenced user");
        return Ok(());
    }

    if target_id == ctx.sessions.bot_id {
        if let Some(reply) = commands::dispatch(ctx, user_id, &content) {
            ctx.sessions.bot_reply(user_id, &reply);
        }
        return Ok(());
    }

    ctx.sessions
        .deliver_dm(user_id, &sender_name, target_id, &content);
    ctx.touch_activity(user_id);
    info!(user_id, target_id, "dm sent");
    Ok(())
}
