//! Multiplayer Matches
//!
//! The 16-slot lobby state machine: slot lifecycle, ready/play/complete
//! transitions, freemod mod ownership, team reshuffles and host
//! bookkeeping. Everything here is pure state; packet fan-out happens
//! in the handlers.

use std::collections::HashSet;

use bitflags::bitflags;

use crate::constants::mode::Mode;
use crate::constants::mods::Mods;
use crate::packet::structures::{MatchFrame, SLOT_COUNT};

bitflags! {
    /// Slot state flags, bit-exact with the client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotStatus: u8 {
        const OPEN = 1;
        const LOCKED = 2;
        const NOT_READY = 4;
        const READY = 8;
        const NO_MAP = 16;
        const PLAYING = 32;
        const COMPLETE = 64;
        const QUIT = 128;
    }
}

impl SlotStatus {
    /// Any state that implies a seated user.
    pub const HAS_USER: SlotStatus = SlotStatus::NOT_READY
        .union(SlotStatus::READY)
        .union(SlotStatus::NO_MAP)
        .union(SlotStatus::PLAYING)
        .union(SlotStatus::COMPLETE);
}

/// Team assignment inside a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchTeam {
    Neutral = 0,
    Blue = 1,
    Red = 2,
}

impl MatchTeam {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Blue,
            2 => Self::Red,
            _ => Self::Neutral,
        }
    }
}

/// How the match is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WinCondition {
    Score = 0,
    Accuracy = 1,
    Combo = 2,
    ScoreV2 = 3,
}

impl WinCondition {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Accuracy,
            2 => Self::Combo,
            3 => Self::ScoreV2,
            _ => Self::Score,
        }
    }
}

/// Team arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TeamType {
    HeadToHead = 0,
    TagCoop = 1,
    TeamVs = 2,
    TagTeamVs = 3,
}

impl TeamType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::TagCoop,
            2 => Self::TeamVs,
            3 => Self::TagTeamVs,
            _ => Self::HeadToHead,
        }
    }

    /// Whether slots carry red/blue teams in this arrangement.
    pub fn team_based(self) -> bool {
        matches!(self, Self::TeamVs | Self::TagTeamVs)
    }
}

// =============================================================================
// SLOT
// =============================================================================

/// One of the 16 seats in a lobby.
#[derive(Debug, Clone)]
pub struct Slot {
    pub user: Option<i32>,
    pub status: SlotStatus,
    pub team: MatchTeam,
    pub mods: Mods,
    pub loaded: bool,
    pub skipped: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            user: None,
            status: SlotStatus::OPEN,
            team: MatchTeam::Neutral,
            mods: Mods::NOMOD,
            loaded: false,
            skipped: false,
        }
    }
}

impl Slot {
    pub fn empty(&self) -> bool {
        self.user.is_none()
    }

    pub fn has_user(&self) -> bool {
        self.status.intersects(SlotStatus::HAS_USER)
    }

    /// Move another slot's occupant into this one.
    pub fn copy_from(&mut self, other: &Slot) {
        self.user = other.user;
        self.status = other.status;
        self.team = other.team;
        self.mods = other.mods;
    }

    /// Clear the seat, leaving it in `new_status`.
    pub fn reset(&mut self, new_status: SlotStatus) {
        self.user = None;
        self.status = new_status;
        self.team = MatchTeam::Neutral;
        self.mods = Mods::NOMOD;
        self.loaded = false;
        self.skipped = false;
    }
}

// =============================================================================
// MATCH
// =============================================================================

/// A multiplayer lobby.
#[derive(Debug)]
pub struct Match {
    pub id: usize,
    pub name: String,
    pub password: String,

    pub host_id: i32,

    pub map_id: i32,
    pub map_md5: String,
    pub map_name: String,
    pub last_map_id: i32,

    pub mods: Mods,
    pub mode: Mode,
    pub freemod: bool,

    pub team_type: TeamType,
    pub win_condition: WinCondition,

    pub in_progress: bool,
    pub seed: i32,

    pub slots: [Slot; SLOT_COUNT],

    /// Routing key of the match's chat channel.
    pub chat_name: String,

    /// Tourney observer sessions attached to this match.
    pub tourney_clients: HashSet<i32>,
}

impl Match {
    pub fn new(id: usize, name: String, password: String, host_id: i32) -> Self {
        Self {
            id,
            name,
            password,
            host_id,
            map_id: 0,
            map_md5: String::new(),
            map_name: String::new(),
            last_map_id: 0,
            mods: Mods::NOMOD,
            mode: Mode::Std,
            freemod: false,
            team_type: TeamType::HeadToHead,
            win_condition: WinCondition::Score,
            in_progress: false,
            seed: 0,
            slots: Default::default(),
            chat_name: format!("#multi_{id}"),
            tourney_clients: HashSet::new(),
        }
    }

    /// Invite link understood by the client.
    pub fn url(&self) -> String {
        format!("osump://{}/{}", self.id, self.password)
    }

    /// Clickable chat embed for the invite link.
    pub fn embed(&self) -> String {
        format!("[{} {}]", self.url(), self.name)
    }

    /// Clickable chat embed for the selected map.
    pub fn map_embed(&self, server_domain: &str) -> String {
        format!(
            "[https://osu.{}/beatmaps/{} {}]",
            server_domain, self.map_id, self.map_name
        )
    }

    pub fn contains(&self, user_id: i32) -> bool {
        self.slots.iter().any(|slot| slot.user == Some(user_id))
    }

    pub fn slot_id_of(&self, user_id: i32) -> Option<usize> {
        self.slots.iter().position(|slot| slot.user == Some(user_id))
    }

    pub fn slot_of(&self, user_id: i32) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.user == Some(user_id))
    }

    pub fn slot_of_mut(&mut self, user_id: i32) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|slot| slot.user == Some(user_id))
    }

    /// First open seat, if any.
    pub fn free_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.status == SlotStatus::OPEN)
    }

    /// Ids of every seated user.
    pub fn user_ids(&self) -> Vec<i32> {
        self.slots.iter().filter_map(|slot| slot.user).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.empty())
    }

    /// Seat a user; the joining team depends on the arrangement.
    pub fn seat(&mut self, slot_id: usize, user_id: i32) {
        let team = if self.team_type.team_based() {
            MatchTeam::Red
        } else {
            MatchTeam::Neutral
        };

        let slot = &mut self.slots[slot_id];
        slot.user = Some(user_id);
        slot.status = SlotStatus::NOT_READY;
        slot.team = team;
    }

    /// Return every `expected` slot to not-ready.
    pub fn unready(&mut self, expected: SlotStatus) {
        for slot in self.slots.iter_mut() {
            if slot.status == expected {
                slot.status = SlotStatus::NOT_READY;
            }
        }
    }

    /// Start play: every seated slot except the map-less goes to
    /// `PLAYING`; returns the user ids left behind (the immune set).
    pub fn start(&mut self) -> Vec<i32> {
        let mut missing_map = Vec::new();

        for slot in self.slots.iter_mut() {
            if slot.has_user() {
                if slot.status != SlotStatus::NO_MAP {
                    slot.status = SlotStatus::PLAYING;
                } else if let Some(user_id) = slot.user {
                    missing_map.push(user_id);
                }
            }
        }

        self.in_progress = true;
        missing_map
    }

    /// Whether any playing slot is still waiting on its client load.
    pub fn any_loading(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.status == SlotStatus::PLAYING && !slot.loaded)
    }

    pub fn any_playing(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.status == SlotStatus::PLAYING)
    }

    /// Whether every still-playing slot has requested a skip.
    pub fn all_skipped(&self) -> bool {
        self.slots
            .iter()
            .filter(|slot| slot.status == SlotStatus::PLAYING)
            .all(|slot| slot.skipped)
    }

    /// End the round: completed slots return to not-ready, load/skip
    /// markers clear. Returns ids of users who sat the round out.
    pub fn finish(&mut self) -> Vec<i32> {
        self.in_progress = false;

        let mut sat_out = Vec::new();
        for slot in self.slots.iter_mut() {
            if slot.status == SlotStatus::COMPLETE {
                slot.status = SlotStatus::NOT_READY;
            } else if let Some(user_id) = slot.user {
                sat_out.push(user_id);
            }

            slot.loaded = false;
            slot.skipped = false;
        }

        sat_out
    }

    /// Flip freemod, moving mod ownership between match and slots.
    pub fn set_freemod(&mut self, enabled: bool) {
        if enabled == self.freemod {
            return;
        }
        self.freemod = enabled;

        if enabled {
            // Slots inherit the non-speed mods, the match keeps the rest.
            let slot_mods = self.mods.without_speed();
            for slot in self.slots.iter_mut() {
                if slot.has_user() {
                    slot.mods = slot_mods;
                }
            }
            self.mods = self.mods.speed_only();
        } else {
            let host_mods = self
                .slot_of(self.host_id)
                .map(|slot| slot.mods)
                .unwrap_or(Mods::NOMOD);

            self.mods |= host_mods;
            for slot in self.slots.iter_mut() {
                slot.mods = Mods::NOMOD;
            }
        }
    }

    /// Reassign teams after an arrangement change.
    pub fn set_team_type(&mut self, team_type: TeamType) {
        if team_type == self.team_type {
            return;
        }

        let team = if team_type.team_based() {
            MatchTeam::Red
        } else {
            MatchTeam::Neutral
        };

        for slot in self.slots.iter_mut() {
            if slot.has_user() {
                slot.team = team;
            }
        }

        self.team_type = team_type;
    }

    /// The wire representation; password stripping is decided at write
    /// time by the caller.
    pub fn to_frame(&self) -> MatchFrame {
        let mut slot_statuses = [0u8; SLOT_COUNT];
        let mut slot_teams = [0u8; SLOT_COUNT];
        let mut slot_mods = [0u32; SLOT_COUNT];
        let mut slot_ids = Vec::new();

        for (idx, slot) in self.slots.iter().enumerate() {
            slot_statuses[idx] = slot.status.bits();
            slot_teams[idx] = slot.team as u8;
            slot_mods[idx] = slot.mods.bits();

            if slot.has_user() {
                if let Some(user_id) = slot.user {
                    slot_ids.push(user_id);
                }
            }
        }

        MatchFrame {
            id: self.id as u16,
            in_progress: self.in_progress,
            mods: self.mods.bits(),
            name: self.name.clone(),
            password: self.password.clone(),
            map_name: self.map_name.clone(),
            map_id: self.map_id,
            map_md5: self.map_md5.clone(),
            slot_statuses,
            slot_teams,
            slot_ids,
            host_id: self.host_id,
            mode: self.mode.as_vn(),
            win_condition: self.win_condition as u8,
            team_type: self.team_type as u8,
            freemod: self.freemod,
            slot_mods,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seated_match() -> Match {
        let mut m = Match::new(0, "scrim".into(), String::new(), 1000);
        m.seat(0, 1000);
        m.seat(1, 1001);
        m
    }

    #[test]
    fn has_user_tracks_occupancy() {
        let m = seated_match();
        for slot in &m.slots {
            assert_eq!(slot.user.is_some(), slot.has_user());
        }
    }

    #[test]
    fn start_spares_the_mapless() {
        let mut m = seated_match();
        m.seat(2, 1002);
        m.slots[0].status = SlotStatus::READY;
        m.slots[1].status = SlotStatus::READY;
        m.slots[2].status = SlotStatus::NO_MAP;

        let immune = m.start();

        assert!(m.in_progress);
        assert_eq!(immune, vec![1002]);
        assert_eq!(m.slots[0].status, SlotStatus::PLAYING);
        assert_eq!(m.slots[1].status, SlotStatus::PLAYING);
        assert_eq!(m.slots[2].status, SlotStatus::NO_MAP);
        assert!(!m.slots.iter().any(|s| s.status == SlotStatus::READY));
    }

    #[test]
    fn finish_returns_completed_to_not_ready() {
        let mut m = seated_match();
        m.slots[0].status = SlotStatus::COMPLETE;
        m.slots[1].status = SlotStatus::NO_MAP;
        m.in_progress = true;

        let sat_out = m.finish();

        assert!(!m.in_progress);
        assert_eq!(m.slots[0].status, SlotStatus::NOT_READY);
        assert_eq!(sat_out, vec![1001]);
    }

    #[test]
    fn freemod_splits_and_merges_speed_mods() {
        let mut m = seated_match();
        m.mods = Mods::DOUBLETIME | Mods::HARDROCK;

        m.set_freemod(true);
        assert_eq!(m.mods, Mods::DOUBLETIME);
        assert_eq!(m.slots[0].mods, Mods::HARDROCK);
        assert_eq!(m.slots[1].mods, Mods::HARDROCK);

        m.set_freemod(false);
        assert_eq!(m.mods, Mods::DOUBLETIME | Mods::HARDROCK);
        assert!(m.slots.iter().all(|s| s.mods == Mods::NOMOD));
    }

    #[test]
    fn team_type_reshuffles_teams() {
        let mut m = seated_match();
        assert_eq!(m.slots[0].team, MatchTeam::Neutral);

        m.set_team_type(TeamType::TeamVs);
        assert_eq!(m.slots[0].team, MatchTeam::Red);
        assert_eq!(m.slots[1].team, MatchTeam::Red);

        m.set_team_type(TeamType::TagCoop);
        assert_eq!(m.slots[0].team, MatchTeam::Neutral);
    }

    #[test]
    fn joining_a_team_match_seats_red() {
        let mut m = Match::new(1, "teams".into(), String::new(), 1);
        m.team_type = TeamType::TagTeamVs;
        m.seat(0, 1);
        assert_eq!(m.slots[0].team, MatchTeam::Red);
    }

    #[test]
    fn skip_accounting() {
        let mut m = seated_match();
        m.slots[0].status = SlotStatus::PLAYING;
        m.slots[1].status = SlotStatus::PLAYING;

        m.slots[0].skipped = true;
        assert!(!m.all_skipped());

        m.slots[1].skipped = true;
        assert!(m.all_skipped());
    }

    #[test]
    fn frame_conversion_orders_slot_ids() {
        let mut m = seated_match();
        m.seat(7, 1007);

        let frame = m.to_frame();
        assert_eq!(frame.slot_ids, vec![1000, 1001, 1007]);
        assert_eq!(frame.slot_statuses[7], SlotStatus::NOT_READY.bits());
        assert_eq!(frame.slot_statuses[8], SlotStatus::OPEN.bits());
    }
}
