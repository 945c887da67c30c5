//! Login Flow
//!
//! Credential blob parsing, version and adapter policy, duplicate
//! session arbitration, hardware collision checks and the startup
//! packet burst. The whole flow runs with the session registry locked
//! so two logins for one account can never interleave.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::App;
use crate::constants::country::code_for_acronym;
use crate::constants::mode::Mode;
use crate::constants::privileges::{BanchoPrivileges, Privileges};
use crate::packet::server;
use crate::packet::structures::Message;
use crate::services::geoloc::{Country, Geolocation};
use crate::state::user::{make_safe_name, ClientHashes, ClientVersion, Stats, Stream, User};
use crate::PROTOCOL_VERSION;

/// Oldest client build accepted at login, in days.
const MAX_CLIENT_AGE_DAYS: i64 = 90;

/// How long a previous session must be idle before a second login for
/// the same account may evict it.
const DUPLICATE_IDLE_SECONDS: i64 = 10;

const RESTRICTION_MESSAGE: &str =
    "Your account is currently in restricted mode. Please check the website for more information!";
const WELCOME_MESSAGE: &str = "Welcome to the server!";

/// What goes back to the client: the `cho-token` header and the body.
pub struct LoginResponse {
    pub token: String,
    pub body: Vec<u8>,
}

impl LoginResponse {
    fn failure(body: Vec<u8>) -> Self {
        Self {
            token: "no".into(),
            body,
        }
    }
}

/// The credential blob, parsed.
#[derive(Debug, PartialEq, Eq)]
pub struct LoginData {
    pub username: String,
    pub password_md5: String,
    pub osu_version: String,
    pub utc_offset: i32,
    pub display_city: bool,
    pub pm_private: bool,
    pub osu_path_md5: String,
    pub adapters_str: String,
    pub adapters_md5: String,
    pub uninstall_md5: String,
    pub disk_signature_md5: String,
}

/// Split the newline/pipe/colon-delimited login body.
pub fn parse_login_data(body: &[u8]) -> Option<LoginData> {
    let text = std::str::from_utf8(body).ok()?;

    let mut lines = text.splitn(3, '\n');
    let username = lines.next()?.to_string();
    let password_md5 = lines.next()?.to_string();
    let remainder = lines.next()?;

    let mut fields = remainder.splitn(5, '|');
    let osu_version = fields.next()?.to_string();
    let utc_offset = fields.next()?.parse().ok()?;
    let display_city = fields.next()? == "1";
    let client_hashes = fields.next()?;
    let pm_private = fields.next()?.trim_end_matches('\n') == "1";

    // trailing colon on the hash blob
    let client_hashes = client_hashes.strip_suffix(':').unwrap_or(client_hashes);
    let mut hashes = client_hashes.splitn(5, ':');
    let osu_path_md5 = hashes.next()?.to_string();
    let adapters_str = hashes.next()?.to_string();
    let adapters_md5 = hashes.next()?.to_string();
    let uninstall_md5 = hashes.next()?.to_string();
    let disk_signature_md5 = hashes.next()?.to_string();

    Some(LoginData {
        username,
        password_md5,
        osu_version,
        utc_offset,
        display_city,
        pm_private,
        osu_path_md5,
        adapters_str,
        adapters_md5,
        uninstall_md5,
        disk_signature_md5,
    })
}

/// Parse `b YYYYMMDD (.revision)? (stream)?`.
pub fn parse_client_version(version: &str) -> Option<ClientVersion> {
    let rest = version.strip_prefix('b')?;

    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() != 8 {
        return None;
    }
    let date = chrono::NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()?;

    let mut tail = &rest[digits.len()..];
    let mut revision = 0;
    if let Some(after_dot) = tail.strip_prefix('.') {
        let rev_digits: String = after_dot.chars().take_while(char::is_ascii_digit).collect();
        revision = rev_digits.parse().ok()?;
        tail = &after_dot[rev_digits.len()..];
    }

    let stream = match tail {
        "" => Stream::Stable,
        "beta" => Stream::Beta,
        "cuttingedge" => Stream::CuttingEdge,
        "dev" => Stream::Dev,
        "tourney" => Stream::Tourney,
        _ => return None,
    };

    Some(ClientVersion {
        date,
        revision,
        stream,
    })
}

/// Parse the adapter list; `None` means neither wine nor a real adapter.
fn parse_adapters(adapters_str: &str) -> Option<(Vec<String>, bool)> {
    if adapters_str == "runningunderwine" {
        return Some((Vec::new(), true));
    }

    let adapters: Vec<String> = adapters_str
        .split('.')
        .filter(|token| !token.is_empty() && *token != "no")
        .map(str::to_string)
        .collect();

    if adapters.is_empty() {
        return None;
    }
    Some((adapters, false))
}

fn format_elapsed(start: Instant) -> String {
    let elapsed = start.elapsed();
    if elapsed.as_millis() >= 1 {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{}us", elapsed.as_micros())
    }
}

/// Run the whole login flow for one request body.
pub async fn handle_login(app: &App, body: &[u8], ip: IpAddr) -> LoginResponse {
    let start = Instant::now();
    let now = chrono::Utc::now().timestamp();

    let Some(login_data) = parse_login_data(body) else {
        warn!("malformed login body");
        return LoginResponse::failure(server::user_id(-1));
    };

    let Some(version) = parse_client_version(&login_data.osu_version) else {
        warn!(version = %login_data.osu_version, "unparseable client version");
        let mut data = server::version_update_forced();
        data.extend_from_slice(&server::user_id(-2));
        return LoginResponse::failure(data);
    };

    let today = chrono::Utc::now().date_naive();
    if (today - version.date).num_days() > MAX_CLIENT_AGE_DAYS {
        let mut data = server::version_update_forced();
        data.extend_from_slice(&server::user_id(-2));
        return LoginResponse::failure(data);
    }

    let Some((adapters, running_under_wine)) = parse_adapters(&login_data.adapters_str) else {
        warn!(user = %login_data.username, "login with no hardware adapters");
        return LoginResponse::failure(server::user_id(-5));
    };

    // Everything from here happens under the registry lock: duplicate
    // detection, password verification, insertion and the burst.
    let mut sessions = app.sessions.lock().await;

    let safe_name = make_safe_name(&login_data.username);
    let record = match app.services.store.user_by_safe_name(&safe_name).await {
        Ok(Some(record)) => record,
        Ok(None) => return LoginResponse::failure(server::user_id(-1)),
        Err(err) => {
            warn!(%err, "user store unavailable during login");
            return LoginResponse::failure(server::user_id(-1));
        }
    };

    if let Some(existing) = sessions.users.by_safe_name(&safe_name) {
        let existing_id = existing.id;
        let existing_tourney = existing.tourney;
        let idle = now - existing.latest_activity;

        if version.stream != Stream::Tourney && !existing_tourney {
            if idle > DUPLICATE_IDLE_SECONDS {
                sessions.logout(existing_id);
            } else {
                return LoginResponse::failure(server::notification("You are already logged in!"));
            }
        }
    }

    let password_ok = app
        .services
        .passwords
        .verify(
            app.services.verifier.as_ref(),
            &login_data.password_md5,
            &record.password_bcrypt,
        )
        .await;
    if !password_ok {
        return LoginResponse::failure(server::user_id(-1));
    }

    match app
        .services
        .store
        .hardware_matches(
            record.id,
            &login_data.adapters_md5,
            &login_data.uninstall_md5,
            &login_data.disk_signature_md5,
            running_under_wine,
        )
        .await
    {
        Ok(matches) if !matches.is_empty() => {
            warn!(
                user_id = record.id,
                matches = matches.len(),
                "hardware fingerprint collision at login"
            );
            let mut data = server::user_id(-1);
            data.extend_from_slice(&server::notification(
                "Your hardware matches another account; multi-accounting is not allowed.",
            ));
            return LoginResponse::failure(data);
        }
        Ok(_) => {}
        Err(err) => warn!(%err, "hardware match lookup failed"),
    }

    let country_acronym = record.country.clone();
    let geolocation = app
        .services
        .geoloc
        .city(ip)
        .unwrap_or_else(|| Geolocation {
            country: Country {
                code: code_for_acronym(&country_acronym),
                acronym: country_acronym.clone(),
            },
            ..Default::default()
        });

    let mut stats = HashMap::new();
    for mode in Mode::ALL {
        match app
            .services
            .store
            .stats(record.id, mode, &geolocation.country.acronym)
            .await
        {
            Ok(row) => {
                stats.insert(
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
            }
            Err(err) => warn!(user_id = record.id, ?mode, %err, "stats fetch failed"),
        }
    }

    let token = Uuid::new_v4().to_string();
    let mut user = User::new(
        record.id,
        record.name.clone(),
        record.password_bcrypt.clone(),
        login_data.password_md5.clone(),
        Privileges::from_repr(record.privileges),
        record.silence_end,
        geolocation,
        login_data.utc_offset,
        version.clone(),
        ClientHashes {
            osu_md5: login_data.osu_path_md5.clone(),
            adapters_md5: login_data.adapters_md5.clone(),
            uninstall_md5: login_data.uninstall_md5.clone(),
            disk_md5: login_data.disk_signature_md5.clone(),
            adapters,
            running_under_wine,
        },
        stats,
        record.friends.clone(),
        record.blocked.clone(),
        token.clone(),
        now,
    );
    user.friend_only_dms = login_data.pm_private;
    user.tourney = version.stream == Stream::Tourney;

    // ===================== startup burst =====================

    let mut data = server::protocol_version(PROTOCOL_VERSION);
    data.extend_from_slice(&server::user_id(user.id));
    data.extend_from_slice(&server::bancho_privileges(
        (user.bancho_privileges() | BanchoPrivileges::SUPPORTER).bits() as i32,
    ));

    let visible_channels: Vec<(String, Vec<u8>, Privileges)> = sessions
        .channels
        .iter()
        .filter(|channel| {
            channel.auto_join
                && channel.has_permission(user.privileges)
                && channel.name != "#lobby"
        })
        .map(|channel| {
            (
                channel.real_name.clone(),
                server::channel_info(channel),
                channel.privileges,
            )
        })
        .collect();

    for (_, info, gate) in &visible_channels {
        data.extend_from_slice(info);

        for target in sessions.users.iter_mut() {
            if gate.is_empty() || target.privileges.intersects(*gate) {
                target.enqueue(info);
            }
        }
    }

    data.extend_from_slice(&server::channel_info_end());
    data.extend_from_slice(&server::menu_icon(
        &app.config.main_menu_icon_url,
        &app.config.main_menu_click_url,
    ));
    data.extend_from_slice(&server::friends_list(&user.friends));
    data.extend_from_slice(&server::silence_end(user.remaining_silence(now) as i32));

    let user_data = {
        let mut buf = server::user_presence(&user);
        buf.extend_from_slice(&server::user_stats(&user));
        buf
    };
    data.extend_from_slice(&user_data);

    let restricted = user.restricted();
    let other_ids: Vec<i32> = sessions.users.iter().map(|target| target.id).collect();
    for target_id in other_ids {
        if !restricted {
            if let Some(target) = sessions.users.get_mut(target_id) {
                target.enqueue(&user_data);
            }
        }

        let target_restricted = sessions
            .users
            .get(target_id)
            .map(|target| target.restricted())
            .unwrap_or(true);
        if !target_restricted {
            if let Some(burst) = sessions.presence_and_stats(target_id) {
                data.extend_from_slice(&burst);
            }
        }
    }

    let bot_name = sessions
        .users
        .get(sessions.bot_id)
        .map(|bot| bot.name.clone())
        .unwrap_or_default();
    let bot_id = sessions.bot_id;

    if restricted {
        data.extend_from_slice(&server::user_restricted());
        data.extend_from_slice(&server::send_message(&Message {
            sender: bot_name.clone(),
            content: RESTRICTION_MESSAGE.into(),
            recipient: user.name.clone(),
            sender_id: bot_id,
        }));
    }

    if !user.privileges.contains(Privileges::VERIFIED) {
        user.privileges |= Privileges::VERIFIED;

        // the instance account gets the full set on first login
        if user.id == 3 {
            user.privileges = Privileges::MASTER;
        }

        let store = app.services.store.clone();
        let (user_id, privileges) = (user.id, user.privileges.bits());
        tokio::spawn(async move {
            if let Err(err) = store.set_privileges(user_id, privileges).await {
                warn!(user_id, %err, "failed to persist first-login privileges");
            }
        });

        data.extend_from_slice(&server::send_message(&Message {
            sender: bot_name,
            content: WELCOME_MESSAGE.into(),
            recipient: user.name.clone(),
            sender_id: bot_id,
        }));
    }

    let user_id = user.id;
    let user_name = user.name.clone();
    let country = user.geolocation.country.acronym.to_uppercase();
    sessions.users.add(user);

    let elapsed = format_elapsed(start);
    data.extend_from_slice(&server::notification(&format!(
        "Welcome back!\n\nOnline users: {}\nTime elapsed: {}",
        sessions.users.len() - 1,
        elapsed,
    )));

    info!(
        user_id,
        name = %user_name,
        version = %login_data.osu_version,
        %country,
        %elapsed,
        "login complete"
    );

    let store = app.services.store.clone();
    let osu_version = login_data.osu_version.clone();
    let ip_str = ip.to_string();
    let hashes = (
        login_data.osu_path_md5,
        login_data.adapters_md5,
        login_data.uninstall_md5,
        login_data.disk_signature_md5,
    );
    tokio::spawn(async move {
        if let Err(err) = store
            .insert_login(user_id, ip_str, osu_version, now)
            .await
        {
            warn!(user_id, %err, "failed to record login");
        }
        if let Err(err) = store
            .insert_client_hashes(user_id, hashes.0, hashes.1, hashes.2, hashes.3, now)
            .await
        {
            warn!(user_id, %err, "failed to record client hashes");
        }
        if let Err(err) = store.update_latest_activity(user_id, now).await {
            warn!(user_id, %err, "failed to update activity");
        }
    });

    LoginResponse { token, body: data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::codec::{FrameIter, Reader};
    use crate::packet::ids::PacketId;
    use crate::services::memory::MemoryStore;
    use crate::services::store::UserRecord;
    use crate::services::Services;
    use std::sync::Arc;

    fn login_body(username: &str, password_md5: &str, version: &str) -> Vec<u8> {
        format!(
            "{username}\n{password_md5}\n{version}|0|0|osu_md5:adapter1.adapter2:adapters_md5:uninstall_md5:disk_md5:|0\n"
        )
        .into_bytes()
    }

    fn current_version() -> String {
        format!("b{}", chrono::Utc::now().format("%Y%m%d"))
    }

    async fn app_with_user(name: &str, password_md5: &str) -> Arc<App> {
        let services = Services::in_memory();
        let store = MemoryStore::default();
        store
            .seed_user(UserRecord {
                id: 100,
                name: name.into(),
                safe_name: make_safe_name(name),
                // PlainVerifier treats the stored hash as the plain md5
                password_bcrypt: password_md5.into(),
                privileges: (Privileges::NORMAL | Privileges::VERIFIED).bits(),
                country: "US".into(),
                ..Default::default()
            })
            .await;

        let services = Services {
            store: Arc::new(store),
            ..services
        };
        App::new(crate::config::Config::default(), services)
    }

    fn packet_ids(body: &[u8]) -> Vec<u16> {
        FrameIter::new(body).map(|(id, _)| id).collect()
    }

    #[test]
    fn login_blob_parses() {
        let body = login_body("Alice", "aabb", "b20240101");
        let data = parse_login_data(&body).unwrap();

        assert_eq!(data.username, "Alice");
        assert_eq!(data.password_md5, "aabb");
        assert_eq!(data.osu_version, "b20240101");
        assert_eq!(data.adapters_str, "adapter1.adapter2");
        assert_eq!(data.disk_signature_md5, "disk_md5");
        assert!(!data.pm_private);
    }

    #[test]
    fn version_parsing_variants() {
        let v = parse_client_version("b20240102").unwrap();
        assert_eq!(v.stream, Stream::Stable);
        assert_eq!(v.revision, 0);

        let v = parse_client_version("b20240102.2cuttingedge").unwrap();
        assert_eq!(v.revision, 2);
        assert_eq!(v.stream, Stream::CuttingEdge);

        let v = parse_client_version("b20240102tourney").unwrap();
        assert_eq!(v.stream, Stream::Tourney);

        assert!(parse_client_version("20240102").is_none());
        assert!(parse_client_version("b2024").is_none());
        assert!(parse_client_version("b20240102nightly").is_none());
    }

    #[tokio::test]
    async fn fresh_login_builds_the_burst() {
        let app = app_with_user("Alice", "md5pass").await;
        app.seed_default_channels().await;

        let response = handle_login(
            &app,
            &login_body("Alice", "md5pass", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        assert_ne!(response.token, "no");
        assert!(!response.token.is_empty());

        let ids = packet_ids(&response.body);
        let expect_prefix = [
            PacketId::ChoProtocolVersion.as_u16(),
            PacketId::ChoUserId.as_u16(),
            PacketId::ChoPrivileges.as_u16(),
        ];
        assert_eq!(&ids[..3], &expect_prefix);
        assert!(ids.contains(&PacketId::ChoChannelInfo.as_u16()));
        assert!(ids.contains(&PacketId::ChoChannelInfoEnd.as_u16()));
        assert!(ids.contains(&PacketId::ChoMainMenuIcon.as_u16()));
        assert!(ids.contains(&PacketId::ChoFriendsList.as_u16()));

        // trailing notification carries the online count
        let (last_id, last_payload) = FrameIter::new(&response.body).last().unwrap();
        assert_eq!(last_id, PacketId::ChoNotification.as_u16());
        let mut r = Reader::new(last_payload);
        assert!(r.read_string().unwrap().contains("Online users:"));

        // protocol version payload is 19
        let (_, first_payload) = FrameIter::new(&response.body).next().unwrap();
        let mut r = Reader::new(first_payload);
        assert_eq!(r.read_i32().unwrap(), 19);

        // session landed in the registry
        let sessions = app.sessions.lock().await;
        assert!(sessions.users.get(100).is_some());
    }

    #[tokio::test]
    async fn duplicate_active_login_is_rejected() {
        let app = app_with_user("Alice", "md5pass").await;

        let first = handle_login(
            &app,
            &login_body("Alice", "md5pass", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;
        assert_ne!(first.token, "no");

        // keep the first session fresh so it cannot be evicted
        {
            let mut sessions = app.sessions.lock().await;
            sessions.users.get_mut(100).unwrap().latest_activity =
                chrono::Utc::now().timestamp();
        }

        let second = handle_login(
            &app,
            &login_body("Alice", "md5pass", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        assert_eq!(second.token, "no");
        let (id, payload) = FrameIter::new(&second.body).next().unwrap();
        assert_eq!(id, PacketId::ChoNotification.as_u16());
        let mut r = Reader::new(payload);
        assert_eq!(r.read_string().unwrap(), "You are already logged in!");
    }

    #[tokio::test]
    async fn idle_duplicate_is_evicted() {
        let app = app_with_user("Alice", "md5pass").await;

        handle_login(
            &app,
            &login_body("Alice", "md5pass", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        let old_token = {
            let mut sessions = app.sessions.lock().await;
            let user = sessions.users.get_mut(100).unwrap();
            user.latest_activity = chrono::Utc::now().timestamp() - 60;
            user.token.clone()
        };

        let second = handle_login(
            &app,
            &login_body("Alice", "md5pass", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        assert_ne!(second.token, "no");
        let sessions = app.sessions.lock().await;
        let user = sessions.users.get(100).unwrap();
        assert_ne!(user.token, old_token);
    }

    #[tokio::test]
    async fn wrong_password_is_minus_one() {
        let app = app_with_user("Alice", "md5pass").await;

        let response = handle_login(
            &app,
            &login_body("Alice", "wrong", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        assert_eq!(response.token, "no");
        let (id, payload) = FrameIter::new(&response.body).next().unwrap();
        assert_eq!(id, PacketId::ChoUserId.as_u16());
        let mut r = Reader::new(payload);
        assert_eq!(r.read_i32().unwrap(), -1);
    }

    #[tokio::test]
    async fn old_client_is_forced_to_update() {
        let app = app_with_user("Alice", "md5pass").await;

        let response = handle_login(
            &app,
            &login_body("Alice", "md5pass", "b20200101"),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        assert_eq!(response.token, "no");
        let ids = packet_ids(&response.body);
        assert_eq!(ids[0], PacketId::ChoVersionUpdateForced.as_u16());

        let (_, payload) = FrameIter::new(&response.body).nth(1).unwrap();
        let mut r = Reader::new(payload);
        assert_eq!(r.read_i32().unwrap(), -2);
    }

    #[tokio::test]
    async fn missing_adapters_is_minus_five() {
        let app = app_with_user("Alice", "md5pass").await;
        let version = current_version();
        let body =
            format!("Alice\nmd5pass\n{version}|0|0|osu_md5:no:adapters_md5:uninstall_md5:disk_md5:|0\n");

        let response = handle_login(&app, body.as_bytes(), "8.8.8.8".parse().unwrap()).await;

        assert_eq!(response.token, "no");
        let (_, payload) = FrameIter::new(&response.body).next().unwrap();
        let mut r = Reader::new(payload);
        assert_eq!(r.read_i32().unwrap(), -5);
    }

    #[tokio::test]
    async fn wine_clients_skip_the_adapter_check() {
        let app = app_with_user("Alice", "md5pass").await;
        let version = current_version();
        let body = format!(
            "Alice\nmd5pass\n{version}|0|0|osu_md5:runningunderwine:adapters_md5:uninstall_md5:disk_md5:|0\n"
        );

        let response = handle_login(&app, body.as_bytes(), "8.8.8.8".parse().unwrap()).await;
        assert_ne!(response.token, "no");
    }

    #[tokio::test]
    async fn unknown_user_is_minus_one() {
        let app = app_with_user("Alice", "md5pass").await;

        let response = handle_login(
            &app,
            &login_body("Bob", "md5pass", &current_version()),
            "8.8.8.8".parse().unwrap(),
        )
        .await;

        assert_eq!(response.token, "no");
        let (_, payload) = FrameIter::new(&response.body).next().unwrap();
        let mut r = Reader::new(payload);
        assert_eq!(r.read_i32().unwrap(), -1);
    }
}
