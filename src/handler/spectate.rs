//! Spectator Handlers
//!
//! Host/fellow spectator fan-out and the opaque replay frame relay.

use tracing::warn;

use crate::handler::Ctx;
use crate::packet::codec::{ProtocolError, Reader};
use crate::packet::server;
use crate::packet::structures::ReplayFrameBundle;

/// `OSU_START_SPECTATING`.
pub fn start_spectating(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let target_id = reader.read_i32()?;

    if ctx.sessions.users.get(target_id).is_none() {
        warn!(user_id, target_id, "tried to spectate a non-existent user");
        return Ok(());
    }

    let current = ctx.sessions.users.get(user_id).and_then(|user| user.spectating);

    if let Some(existing_host) = current {
        if existing_host == target_id {
            // Re-announce only; the client re-sends this on map changes.
            let stealth = ctx
                .sessions
                .users
                .get(user_id)
                .map(|user| user.stealth)
                .unwrap_or(false);

            if !stealth {
                let fellow = server::fellow_spectator_joined(user_id);
                let spectators: Vec<i32> = ctx
                    .sessions
                    .users
                    .get(target_id)
                    .map(|host| host.spectators.clone())
                    .unwrap_or_default();

                for spec_id in spectators {
                    if spec_id == user_id {
                        continue;
                    }
                    if let Some(spec) = ctx.sessions.users.get_mut(spec_id) {
                        spec.enqueue(&fellow);
                    }
                }

                if let Some(host) = ctx.sessions.users.get_mut(target_id) {
                    host.enqueue(&server::host_spectator_joined(user_id));
                }
            }
            return Ok(());
        }

        ctx.sessions.remove_spectator(existing_host, user_id);
    }

    ctx.sessions.add_spectator(target_id, user_id);
    Ok(())
}

/// `OSU_STOP_SPECTATING`.
pub fn stop_spectating(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    _reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let Some(host_id) = ctx.sessions.users.get(user_id).and_then(|user| user.spectating) else {
        warn!(user_id, "stop-spectating without a host");
        return Ok(());
    };

    ctx.sessions.remove_spectator(host_id, user_id);
    Ok(())
}

/// `OSU_SPECTATE_FRAMES`: relay the raw bundle to every watcher.
pub fn spectate_frames(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let bundle = ReplayFrameBundle::read(reader)?;

    let spectators: Vec<i32> = ctx
        .sessions
        .users
        .get(user_id)
        .map(|user| user.spectators.clone())
        .unwrap_or_default();

    if spectators.is_empty() {
        return Ok(());
    }

    let data = server::spectate_frames(&bundle.raw);
    for spec_id in spectators {
        if let Some(spec) = ctx.sessions.users.get_mut(spec_id) {
            spec.enqueue(&data);
        }
    }
    Ok(())
}

/// `OSU_CANT_SPECTATE`: the watcher lacks the map; host and fellows
/// get told, unless the watcher is in stealth.
pub fn cant_spectate(
    ctx: &mut Ctx<'_>,
    user_id: i32,
    _reader: &mut Reader<'_>,
) -> Result<(), ProtocolError> {
    let Some(host_id) = ctx.sessions.users.get(user_id).and_then(|user| user.spectating) else {
        warn!(user_id, "cant-spectate without a host");
        return Ok(());
    };

    let stealth = ctx
        .sessions
        .users
        .get(user_id)
        .map(|user| user.stealth)
        .unwrap_or(false);
    if stealth {
        return Ok(());
    }

    let data = server::cant_spectate(user_id);

    let spectators: Vec<i32> = ctx
        .sessions
        .users
        .get(host_id)
        .map(|host| host.spectators.clone())
        .unwrap_or_default();

    if let Some(host) = ctx.sessions.users.get_mut(host_id) {
        host.enqueue(&data);
    }
    for spec_id in spectators {
        if let Some(spec) = ctx.sessions.users.get_mut(spec_id) {
            spec.enqueue(&data);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::{dispatch_one, fixture};
    use crate::packet::codec::FrameIter;
    use crate::packet::ids::PacketId;
    use crate::packet::Writer;

    fn target_payload(target_id: i32) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_i32(target_id);
        w.into_bytes()
    }

    #[tokio::test]
    async fn spectating_creates_channel_and_backrefs() {
        let (mut sessions, services, config) = fixture(&[1, 2]);

        dispatch_one(
            &mut sessions,
            &services,
            &config,
            2,
            PacketId::OsuStartSpectating,
            &target_payload(1),
        );

        assert_eq!(sessions.users.get(2).unwrap().spectating, Some(1));
        assert!(sessions.users.get(1).unwrap().spectators.contains(&2));
        assert!(sessions.channels.get("#spec_1").is_some());
    }

    #[tokio::test]
    async fn switching_hosts_detaches_first() {
        let (mut sessions, services, config) = fixture(&[1, 2, 3]);

        dispatch_one(
            &mut sessions,
            &services,
            &config,
            3,
            PacketId::OsuStartSpectating,
            &target_payload(1),
        );
        dispatch_one(
            &mut sessions,
            &services,
            &config,
            3,
            PacketId::OsuStartSpectating,
            &target_payload(2),
        );

        assert_eq!(sessions.users.get(3).unwrap().spectating, Some(2));
        assert!(sessions.users.get(1).unwrap().spectators.is_empty());
        assert!(sessions.channels.get("#spec_1").is_none());
        assert!(sessions.channels.get("#spec_2").is_some());
    }

    #[tokio::test]
    async fn frames_fan_out_to_watchers() {
        let (mut sessions, services, config) = fixture(&[1, 2, 3]);
        sessions.add_spectator(1, 2);
        sessions.add_spectator(1, 3);
        for id in [1, 2, 3] {
            sessions.users.get_mut(id).unwrap().dequeue();
        }

        // minimal valid bundle: extra + 0 frames + v1 score frame + seq + action
        let mut w = Writer::new();
        w.write_i32(0);
        w.write_u16(0);
        w.write_raw(&[0u8; 29]);
        w.write_u16(1);
        w.write_u8(0);

        dispatch_one(
            &mut sessions,
            &services,
            &config,
            1,
            PacketId::OsuSpectateFrames,
            &w.into_bytes(),
        );

        for id in [2, 3] {
            let queued = sessions.users.get_mut(id).unwrap().dequeue();
            let (packet_id, _) = FrameIter::new(&queued).next().unwrap();
            assert_eq!(packet_id, PacketId::ChoSpectateFrames.as_u16());
        }
        assert!(sessions.users.get_mut(1).unwrap().dequeue().is_empty());
    }

    #[tokio::test]
    async fn stealth_join_stays_silent() {
        let (mut sessions, services, config) = fixture(&[1, 2]);
        sessions.users.get_mut(2).unwrap().stealth = true;
        sessions.users.get_mut(1).unwrap().dequeue();

        dispatch_one(
            &mut sessions,
            &services,
            &config,
            2,
            PacketId::OsuStartSpectating,
            &target_payload(1),
        );

        // the host heard nothing beyond channel bookkeeping
        let queued = sessions.users.get_mut(1).unwrap().dequeue();
        for (packet_id, _) in FrameIter::new(&queued) {
            assert_ne!(packet_id, PacketId::ChoSpectatorJoined.as_u16());
        }
    }
}
