//! Client Actions
//!
//! What a client reports itself doing, shown in other clients' user panels.

/// Client activity reported in status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    /// Sitting in the menus.
    Idle = 0,
    /// Marked away.
    Afk = 1,
    /// Playing a map solo.
    Playing = 2,
    /// In the editor.
    Editing = 3,
    /// Modding a map.
    Modding = 4,
    /// In a multiplayer room.
    Multiplayer = 5,
    /// Watching a replay or spectating.
    Watching = 6,
    /// Unknown to the client itself.
    Unknown = 7,
    /// Testing a map.
    Testing = 8,
    /// Submitting a map.
    Submitting = 9,
    /// Paused mid-play.
    Paused = 10,
    /// In the multiplayer lobby browser.
    Lobby = 11,
    /// Playing inside a multiplayer match.
    Multiplaying = 12,
    /// Browsing osu!direct.
    OsuDirect = 13,
}

impl Action {
    /// Decode from the wire byte. Unrecognised values collapse to `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Afk,
            2 => Self::Playing,
            3 => Self::Editing,
            4 => Self::Modding,
            5 => Self::Multiplayer,
            6 => Self::Watching,
            8 => Self::Testing,
            9 => Self::Submitting,
            10 => Self::Paused,
            11 => Self::Lobby,
            12 => Self::Multiplaying,
            13 => Self::OsuDirect,
            _ => Self::Unknown,
        }
    }
}

/// Replay stream actions carried inside spectate frame bundles.
///
/// The server never acts on these; they ride along for watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplayAction {
    Standard = 0,
    NewSong = 1,
    Skip = 2,
    Completion = 3,
    Fail = 4,
    Pause = 5,
    Unpause = 6,
    SongSelect = 7,
    WatchingOther = 8,
}
