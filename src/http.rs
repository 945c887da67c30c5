//! HTTP Surface
//!
//! Two endpoints carry the whole protocol: `POST /` (login when no
//! token, packet stream otherwise) and `GET /user-auth` on the api
//! host for credential introspection. `GET /` answers a diagnostic
//! line.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Host, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use crate::app::App;
use crate::handler::Ctx;
use crate::login::handle_login;
use crate::packet::server;
use crate::services::geoloc::resolve_ip;

/// Build the router for both hosts.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(index).post(bancho_post))
        .route("/user-auth", get(user_auth))
        .with_state(app)
}

/// Bind and serve until the task is cancelled.
pub async fn serve(app: Arc<App>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http surface listening");

    axum::serve(
        listener,
        router(app).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn is_api_host(host: &str) -> bool {
    host.starts_with("cho_api.")
}

async fn index() -> Html<&'static str> {
    Html("and why are you here?")
}

/// The poll endpoint: login blob without a token, packet stream with one.
async fn bancho_post(
    State(app): State<Arc<App>>,
    Host(host): Host,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if is_api_host(&host) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    if user_agent != Some("osu!") {
        warn!(?user_agent, "rejected non-client request");
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "detail": [{"loc": ["header", "user-agent"], "msg": "expected osu!"}]
            })),
        )
            .into_response();
    }

    let ip = resolve_ip(
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok()),
        headers.get("x-real-ip").and_then(|value| value.to_str().ok()),
        addr.ip(),
    );

    let token = headers
        .get("osu-token")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match token {
        None => {
            let login = handle_login(&app, &body, ip).await;
            ([("cho-token", login.token)], login.body).into_response()
        }
        Some(token) => poll_session(&app, &token, &body).await.into_response(),
    }
}

/// Dispatch a poll body and drain the session's write queue.
pub async fn poll_session(app: &App, token: &str, body: &[u8]) -> Vec<u8> {
    let now = chrono::Utc::now().timestamp();
    let mut sessions = app.sessions.lock().await;

    let Some(user_id) = sessions.users.id_for_token(token) else {
        // server restarted or session evicted; the client reconnects
        return server::restart_server(0);
    };

    {
        let mut ctx = Ctx {
            sessions: &mut sessions,
            services: &app.services,
            config: &app.config,
            now,
        };
        app.handlers.dispatch_body(&mut ctx, user_id, body);
    }

    let Some(user) = sessions.users.get_mut(user_id) else {
        return Vec::new(); // logged out mid-body
    };

    if user.queue_overrun() {
        warn!(user_id, "write queue overrun; disconnecting session");
        sessions.logout(user_id);
        return server::restart_server(0);
    }

    user.dequeue()
}

// =============================================================================
// INTROSPECTION
// =============================================================================

#[derive(Deserialize)]
struct UserAuthParams {
    name: Option<String>,
    password: Option<String>,
    key: Option<String>,
}

/// `GET /user-auth?name=&password=&key=` on the api host.
async fn user_auth(
    State(app): State<Arc<App>>,
    Host(host): Host,
    Query(params): Query<UserAuthParams>,
) -> Response {
    if !is_api_host(&host) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (Some(name), Some(password), Some(key)) = (params.name, params.password, params.key)
    else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "detail": [{"loc": ["query"], "msg": "name, password and key are required"}]
            })),
        )
            .into_response();
    };

    if key != app.config.api_secret {
        return Json(serde_json::json!({
            "status": "error", "message": "Invalid API key"
        }))
        .into_response();
    }

    let sessions = app.sessions.lock().await;
    let Some(user) = sessions
        .users
        .by_safe_name(&crate::state::user::make_safe_name(&name))
    else {
        return Json(serde_json::json!({
            "status": "error", "message": "User not found"
        }))
        .into_response();
    };

    if user.password_md5 != password {
        return Json(serde_json::json!({
            "status": "error", "message": "Invalid password"
        }))
        .into_response();
    }

    Json(serde_json::json!({
        "status": "ok",
        "user": {
            "id": user.id,
            "name": user.name,
            "country": user.geolocation.country.acronym,
            "privileges": user.privileges.bits(),
        },
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::packet::codec::FrameIter;
    use crate::packet::ids::PacketId;
    use crate::services::Services;
    use crate::state::user::test_user;

    #[tokio::test]
    async fn stale_token_gets_restart_packet() {
        let app = App::new(Config::default(), Services::in_memory());

        let body = poll_session(&app, "gone-token", &[]).await;
        let (id, _) = FrameIter::new(&body).next().unwrap();
        assert_eq!(id, PacketId::ChoRestart.as_u16());
    }

    #[tokio::test]
    async fn poll_drains_queue_in_enqueue_order() {
        let app = App::new(Config::default(), Services::in_memory());
        {
            let mut sessions = app.sessions.lock().await;
            let mut user = test_user(7, "poller");
            user.enqueue(&server::notification("first"));
            user.enqueue(&server::notification("second"));
            sessions.users.add(user);
        }

        let body = poll_session(&app, "token-7", &[]).await;
        let payloads: Vec<_> = FrameIter::new(&body).collect();
        assert_eq!(payloads.len(), 2);

        // both are notifications, order preserved
        let mut r = crate::packet::Reader::new(payloads[0].1);
        assert_eq!(r.read_string().unwrap(), "first");
        let mut r = crate::packet::Reader::new(payloads[1].1);
        assert_eq!(r.read_string().unwrap(), "second");
    }

    #[tokio::test]
    async fn overrun_queue_disconnects() {
        let app = App::new(Config::default(), Services::in_memory());
        {
            let mut sessions = app.sessions.lock().await;
            let mut user = test_user(8, "hog");
            user.enqueue(&vec![0u8; crate::state::user::MAX_QUEUE_SIZE]);
            user.enqueue(&[0u8; 1]); // trips the overrun flag
            sessions.users.add(user);
        }

        let body = poll_session(&app, "token-8", &[]).await;
        let (id, _) = FrameIter::new(&body).next().unwrap();
        assert_eq!(id, PacketId::ChoRestart.as_u16());

        let sessions = app.sessions.lock().await;
        assert!(sessions.users.get(8).is_none());
    }

    #[test]
    fn api_host_detection() {
        assert!(is_api_host("cho_api.example.com"));
        assert!(!is_api_host("c.example.com"));
        assert!(!is_api_host("c4.example.com"));
    }
}
