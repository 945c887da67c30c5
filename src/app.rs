//! Application State
//!
//! The process-wide container: the locked session world, the service
//! handles, the packet dispatch table and the background task set.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::privileges::Privileges;
use crate::handler::HandlerTable;
use crate::services::Services;
use crate::state::channel::Channel;
use crate::state::user::User;
use crate::state::Sessions;

/// Everything a request or background task needs.
pub struct App {
    /// One lock over the whole mutable world; holding it for a full
    /// request serializes handling like a single-threaded event loop.
    pub sessions: Mutex<Sessions>,
    pub services: Services,
    pub config: Config,
    pub handlers: HandlerTable,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl App {
    pub fn new(config: Config, services: Services) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Sessions::default()),
            services,
            config,
            handlers: HandlerTable::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Seed the bot session and the channel list from the store.
    pub async fn populate(&self) -> anyhow::Result<()> {
        let now = chrono::Utc::now().timestamp();

        let bot_record = self.services.store.user_by_id(1).await?;
        let (bot_id, bot_name, bot_privileges) = match bot_record {
            Some(record) => (
                record.id,
                record.name,
                Privileges::from_repr(record.privileges),
            ),
            None => (1, "BanchoBot".to_string(), Privileges::MASTER),
        };

        let mut sessions = self.sessions.lock().await;
        sessions.bot_id = bot_id;

        let mut bot = User::new(
            bot_id,
            bot_name.clone(),
            String::new(),
            String::new(),
            bot_privileges,
            0,
            Default::default(),
            0,
            Default::default(),
            Default::default(),
            Default::default(),
            Vec::new(),
            Vec::new(),
            uuid::Uuid::new_v4().to_string(),
            now,
        );
        // the bot never idles out of duplicate-login checks
        bot.latest_activity = i64::MAX;
        sessions.users.add(bot);
        info!(bot_id, name = %bot_name, "bot session seeded");

        let mut channel_rows = self.services.store.channels().await?;
        if channel_rows.is_empty() {
            channel_rows = default_channel_rows();
        }

        for row in channel_rows {
            sessions.channels.add(Channel::new(
                &row.name,
                &row.topic,
                Privileges::from_repr(row.privileges),
                row.auto_join,
            ));
        }

        sessions
            .channels
            .add(Channel::new("#lobby", "Lobby chat", Privileges::empty(), false));

        Ok(())
    }

    /// Directly seed the standard channels (test convenience).
    pub async fn seed_default_channels(&self) {
        let mut sessions = self.sessions.lock().await;
        for row in default_channel_rows() {
            sessions.channels.add(Channel::new(
                &row.name,
                &row.topic,
                Privileges::from_repr(row.privileges),
                row.auto_join,
            ));
        }
        sessions
            .channels
            .add(Channel::new("#lobby", "Lobby chat", Privileges::empty(), false));
    }

    /// Track a background task for shutdown.
    pub async fn track_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    /// Cancel and await every tracked task, collecting failures.
    pub async fn shutdown(&self) {
        let tasks = {
            let mut guard = self.tasks.lock().await;
            std::mem::take(&mut *guard)
        };

        info!(count = tasks.len(), "cancelling background tasks");
        for task in tasks {
            task.abort();
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(%err, "background task failed during shutdown");
                }
            }
        }
    }
}

fn default_channel_rows() -> Vec<crate::services::store::ChannelRecord> {
    use crate::services::store::ChannelRecord;

    vec![
        ChannelRecord {
            name: "#osu".into(),
            topic: "Main channel".into(),
            privileges: 0,
            auto_join: true,
        },
        ChannelRecord {
            name: "#announce".into(),
            topic: "Announcements".into(),
            privileges: 0,
            auto_join: true,
        },
        ChannelRecord {
            name: "#staff".into(),
            topic: "Staff only".into(),
            privileges: Privileges::STAFF.bits(),
            auto_join: false,
        },
    ]
}
