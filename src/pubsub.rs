//! Pub/Sub Adapter
//!
//! A background consumer applies cross-process deltas (status, stats,
//! privileges, bot messages) into live sessions. Payloads are UTF-8
//! JSON; unknown or malformed payloads are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::app::App;
use crate::constants::action::Action;
use crate::constants::mode::Mode;
use crate::constants::mods::Mods;
use crate::constants::privileges::Privileges;
use crate::services::bus::BusMessage;
use crate::state::user::Stats;

/// Topics the consumer subscribes to.
pub const TOPICS: [&str; 6] = [
    "user-status",
    "user-activity",
    "user-stats",
    "user-privileges",
    "send-public-message",
    "send-private-message",
];

#[derive(Deserialize)]
struct StatusPayload {
    id: i32,
    status: StatusFields,
}

#[derive(Deserialize)]
struct StatusFields {
    action: u8,
    info_text: String,
    map_md5: String,
    mods: u32,
    mode: u8,
    map_id: i32,
}

#[derive(Deserialize)]
struct ActivityPayload {
    id: i32,
    activity: i64,
}

#[derive(Deserialize)]
struct StatsPayload {
    id: i32,
    mode: u8,
}

#[derive(Deserialize)]
struct PrivilegesPayload {
    id: i32,
    privileges: u32,
}

#[derive(Deserialize)]
struct PublicMessagePayload {
    channel: String,
    message: String,
}

#[derive(Deserialize)]
struct PrivateMessagePayload {
    recipient: i32,
    message: String,
}

/// Poll the bus until the task is cancelled.
pub async fn run_consumer(app: Arc<App>) {
    let topics: Vec<String> = TOPICS.iter().map(|t| t.to_string()).collect();
    if let Err(err) = app.services.bus.subscribe(&topics).await {
        warn!(%err, "pub/sub subscribe failed; consumer exiting");
        return;
    }

    info!(topics = TOPICS.len(), "pub/sub consumer running");
    loop {
        match app.services.bus.get_message(Duration::from_secs(1)).await {
            Ok(Some(message)) => handle_message(&app, message).await,
            Ok(None) => {}
            Err(err) => warn!(%err, "pub/sub poll failed"),
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn handle_message(app: &App, message: BusMessage) {
    let result = match message.channel.as_str() {
        "user-status" => handle_status(app, &message.payload).await,
        "user-activity" => handle_activity(app, &message.payload).await,
        "user-stats" => handle_stats(app, &message.payload).await,
        "user-privileges" => handle_privileges(app, &message.payload).await,
        "send-public-message" => handle_public_message(app, &message.payload).await,
        "send-private-message" => handle_private_message(app, &message.payload).await,
        other => {
            warn!(channel = other, "message on unhandled pub/sub channel");
            Ok(())
        }
    };

    if let Err(err) = result {
        warn!(channel = %message.channel, %err, "pub/sub payload rejected");
    }
}

async fn handle_status(app: &App, payload: &[u8]) -> anyhow::Result<()> {
    let update: StatusPayload = serde_json::from_slice(payload)?;

    let mut sessions = app.sessions.lock().await;
    let Some(user) = sessions.users.get_mut(update.id) else {
        return Ok(());
    };

    let mods = Mods::from_wire(update.status.mods);
    user.status.action = Action::from_u8(update.status.action);
    user.status.info_text = update.status.info_text;
    user.status.map_md5 = update.status.map_md5;
    user.status.mods = mods;
    user.status.mode = Mode::from_wire(update.status.mode, mods);
    user.status.map_id = update.status.map_id;
    let restricted = user.restricted();

    if !restricted {
        if let Some(data) = sessions.stats_packet(update.id) {
            sessions.users.broadcast(&data, &[]);
        }
    }
    Ok(())
}

async fn handle_activity(app: &App, payload: &[u8]) -> anyhow::Result<()> {
    let update: ActivityPayload = serde_json::from_slice(payload)?;

    // the database row is assumed already updated by the publisher
    let mut sessions = app.sessions.lock().await;
    if let Some(user) = sessions.users.get_mut(update.id) {
        user.latest_activity = update.activity;
    }
    Ok(())
}

async fn handle_stats(app: &App, payload: &[u8]) -> anyhow::Result<()> {
    let update: StatsPayload = serde_json::from_slice(payload)?;
    let Some(mode) = Mode::from_repr(update.mode) else {
        anyhow::bail!("unknown mode {}", update.mode);
    };

    let country = {
        let sessions = app.sessions.lock().await;
        let Some(user) = sessions.users.get(update.id) else {
            return Ok(());
        };
        user.geolocation.country.acronym.clone()
    };

    // refetch outside the lock, apply inside it
    let row = app.services.store.stats(update.id, mode, &country).await?;

    let mut sessions = app.sessions.lock().await;
    let Some(user) = sessions.users.get_mut(update.id) else {
        return Ok(());
    };
    user.stats.insert(
        mode,
        Stats {
            total_score: row.total_score,
            ranked_score: row.ranked_score,
            accuracy: row.accuracy,
            pp: row.pp,
            max_combo: row.max_combo,
            total_hits: row.total_hits,
            playcount: row.playcount,
            playtime: row.playtime,
            global_rank: row.global_rank,
            country_rank: row.country_rank,
        },
    );
    let restricted = user.restricted();

    if !restricted {
        if let Some(data) = sessions.stats_packet(update.id) {
            sessions.users.broadcast(&data, &[]);
        }
    }
    Ok(())
}

async fn handle_privileges(app: &App, payload: &[u8]) -> anyhow::Result<()> {
    let update: PrivilegesPayload = serde_json::from_slice(payload)?;
    let new_privileges = Privileges::from_repr(update.privileges);

    let became_restricted;
    let became_unrestricted;
    {
        let mut sessions = app.sessions.lock().await;
        let Some(user) = sessions.users.get_mut(update.id) else {
            return Ok(());
        };

        let was_restricted = user.restricted();
        user.privileges = new_privileges;
        let is_restricted = user.restricted();

        became_restricted = !was_restricted && is_restricted;
        became_unrestricted = was_restricted && !is_restricted;
        info!(user_id = update.id, ?new_privileges, "privileges updated");
    }

    if became_restricted {
        if let Err(err) = app.services.store.remove_from_leaderboards(update.id).await {
            warn!(user_id = update.id, %err, "leaderboard removal failed");
        }
    } else if became_unrestricted {
        if let Err(err) = app.services.store.restore_leaderboards(update.id).await {
            warn!(user_id = update.id, %err, "leaderboard restore failed");
        }
    }

    if became_restricted || became_unrestricted {
        // force a reconnect so the client picks up its new world view
        let mut sessions = app.sessions.lock().await;
        sessions.logout(update.id);
    }
    Ok(())
}

async fn handle_public_message(app: &App, payload: &[u8]) -> anyhow::Result<()> {
    let update: PublicMessagePayload = serde_json::from_slice(payload)?;

    let mut sessions = app.sessions.lock().await;
    let bot_id = sessions.bot_id;
    if !sessions.channel_send(&update.channel, &update.message, bot_id) {
        warn!(channel = %update.channel, "bot message to unavailable channel");
    }
    Ok(())
}

async fn handle_private_message(app: &App, payload: &[u8]) -> anyhow::Result<()> {
    let update: PrivateMessagePayload = serde_json::from_slice(payload)?;

    let mut sessions = app.sessions.lock().await;
    sessions.bot_reply(update.recipient, &update.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::Services;
    use crate::state::user::test_user;

    async fn app_with_users(ids: &[i32]) -> Arc<App> {
        let app = App::new(Config::default(), Services::in_memory());
        {
            let mut sessions = app.sessions.lock().await;
            sessions.bot_id = 1;
            sessions.users.add(test_user(1, "BanchoBot"));
            for id in ids {
                sessions.users.add(test_user(*id, &format!("user{id}")));
            }
        }
        app
    }

    #[tokio::test]
    async fn status_update_applies_and_broadcasts() {
        let app = app_with_users(&[5, 6]).await;

        let payload = serde_json::json!({
            "id": 5,
            "status": {
                "action": 2,
                "info_text": "playing something",
                "map_md5": "ff",
                "mods": 8,
                "mode": 1,
                "map_id": 777,
            },
        });
        handle_message(
            &app,
            BusMessage {
                channel: "user-status".into(),
                payload: payload.to_string().into_bytes(),
            },
        )
        .await;

        let mut sessions = app.sessions.lock().await;
        let user = sessions.users.get(5).unwrap();
        assert_eq!(user.status.map_id, 777);
        assert_eq!(user.status.mode, Mode::Taiko);
        assert!(!sessions.users.get_mut(6).unwrap().dequeue().is_empty());
    }

    #[tokio::test]
    async fn privilege_restriction_logs_out_and_delists() {
        let app = app_with_users(&[5]).await;

        let payload = serde_json::json!({
            "id": 5,
            "privileges": (Privileges::NORMAL | Privileges::RESTRICTED).bits(),
        });
        handle_message(
            &app,
            BusMessage {
                channel: "user-privileges".into(),
                payload: payload.to_string().into_bytes(),
            },
        )
        .await;

        let sessions = app.sessions.lock().await;
        assert!(sessions.users.get(5).is_none());
    }

    #[tokio::test]
    async fn private_message_reaches_recipient() {
        let app = app_with_users(&[5]).await;

        let payload = serde_json::json!({"recipient": 5, "message": "psst"});
        handle_message(
            &app,
            BusMessage {
                channel: "send-private-message".into(),
                payload: payload.to_string().into_bytes(),
            },
        )
        .await;

        let mut sessions = app.sessions.lock().await;
        assert!(!sessions.users.get_mut(5).unwrap().dequeue().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let app = app_with_users(&[5]).await;

        handle_message(
            &app,
            BusMessage {
                channel: "user-status".into(),
                payload: b"not json".to_vec(),
            },
        )
        .await;

        // nothing changed, nothing crashed
        let sessions = app.sessions.lock().await;
        assert!(sessions.users.get(5).is_some());
    }
}
