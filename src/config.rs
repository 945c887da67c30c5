//! Server Configuration
//!
//! Everything comes from the environment; DSNs stay opaque here and
//! are handed to whatever backs the collaborator seams.

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_domain: String,
    pub server_port: u16,
    pub debug: bool,

    pub main_menu_icon_url: String,
    pub main_menu_click_url: String,

    /// Shared secret for the introspection endpoint.
    pub api_secret: String,

    pub mongodb_dsn: Option<String>,
    pub redis_dsn: Option<String>,
    pub osu_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_domain: "example.com".into(),
            server_port: 8080,
            debug: false,
            main_menu_icon_url: String::new(),
            main_menu_click_url: String::new(),
            api_secret: String::new(),
            mongodb_dsn: None,
            redis_dsn: None,
            osu_api_key: None,
        }
    }
}

impl Config {
    /// Build from environment variables, defaulting where sensible.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_domain: std::env::var("SERVER_DOMAIN").unwrap_or(defaults.server_domain),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            debug: std::env::var("DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            main_menu_icon_url: std::env::var("MAIN_MENU_ICON_URL").unwrap_or_default(),
            main_menu_click_url: std::env::var("MAIN_MENU_CLICK_URL").unwrap_or_default(),
            api_secret: std::env::var("API_SECRET").unwrap_or_default(),
            mongodb_dsn: std::env::var("MONGODB_DSN").ok(),
            redis_dsn: std::env::var("REDIS_DSN").ok(),
            osu_api_key: std::env::var("OSU_API_KEY").ok(),
        }
    }
}
