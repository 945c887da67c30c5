//! # Bancho Session Server
//!
//! Stateful session service for the osu! bancho protocol: HTTP login,
//! then a long-lived length-prefixed binary packet stream multiplexed
//! over poll requests. Routes chat, tracks presence, coordinates
//! spectating and arbitrates 16-slot multiplayer lobbies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BANCHO SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  packet/          - Wire protocol                            │
//! │  ├── codec.rs     - LE primitives, ULEB128 strings, frames   │
//! │  ├── ids.rs       - The packet id table                      │
//! │  ├── structures.rs- Message / ChannelInfo / MatchFrame / ... │
//! │  └── server.rs    - Server->client packet builders           │
//! │                                                              │
//! │  state/           - The shared mutable world                 │
//! │  ├── user.rs      - Sessions, status, stats, write queues    │
//! │  ├── channel.rs   - Chat rooms with privilege gates          │
//! │  ├── multi.rs     - The 16-slot match state machine          │
//! │  └── registry.rs  - User / channel / match directories       │
//! │                                                              │
//! │  handler/         - Packet id -> handler dispatch            │
//! │  services/        - Store / bus / geoloc / password seams    │
//! │  login.rs         - Credential parsing and the startup burst │
//! │  pubsub.rs        - Cross-process delta consumer             │
//! │  http.rs          - POST login/poll, GET introspection       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! One `tokio::sync::Mutex<Sessions>` guards the registries and every
//! session's write queue. A request locks it, handles its packets
//! synchronously, drains its own queue and releases; cross-session
//! delivery is just an enqueue into the other session's buffer. The
//! login flow holds the same lock across its store and verifier calls
//! so duplicate logins for one account cannot race.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod app;
pub mod commands;
pub mod config;
pub mod constants;
pub mod handler;
pub mod http;
pub mod login;
pub mod packet;
pub mod pubsub;
pub mod services;
pub mod state;

pub use app::App;
pub use config::Config;
pub use state::Sessions;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bancho protocol version sent in every login response.
pub const PROTOCOL_VERSION: i32 = 19;
