//! Compound Wire Structures
//!
//! Multi-field structures that appear inside packet payloads: chat
//! messages, channel listings, the multiplayer match blob, and the
//! spectate frame bundle.

use crate::packet::codec::{ProtocolError, Reader, Writer};
use crate::state::multi::SlotStatus;

/// Number of slots in a multiplayer match, fixed by the client.
pub const SLOT_COUNT: usize = 16;

// =============================================================================
// MESSAGE
// =============================================================================

/// A chat message, public or private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub content: String,
    pub recipient: String,
    pub sender_id: i32,
}

impl Message {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender: reader.read_string()?,
            content: reader.read_string()?,
            recipient: reader.read_string()?,
            sender_id: reader.read_i32()?,
        })
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.sender);
        writer.write_string(&self.content);
        writer.write_string(&self.recipient);
        writer.write_i32(self.sender_id);
    }
}

// =============================================================================
// CHANNEL INFO
// =============================================================================

/// A channel listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: String,
    pub user_count: i32,
}

impl ChannelInfo {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: reader.read_string()?,
            topic: reader.read_string()?,
            user_count: reader.read_i32()?,
        })
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.name);
        writer.write_string(&self.topic);
        writer.write_i32(self.user_count);
    }
}

// =============================================================================
// MATCH
// =============================================================================

/// The multiplayer match blob as it travels on the wire.
///
/// State conversion lives next to the match object; this type only
/// knows the field order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFrame {
    pub id: u16,
    pub in_progress: bool,
    pub mods: u32,
    pub name: String,
    pub password: String,
    pub map_name: String,
    pub map_id: i32,
    pub map_md5: String,
    pub slot_statuses: [u8; SLOT_COUNT],
    pub slot_teams: [u8; SLOT_COUNT],
    /// One id per occupied slot, in slot order.
    pub slot_ids: Vec<i32>,
    pub host_id: i32,
    pub mode: u8,
    pub win_condition: u8,
    pub team_type: u8,
    pub freemod: bool,
    pub slot_mods: [u32; SLOT_COUNT],
    pub seed: i32,
}

impl MatchFrame {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let id = reader.read_u16()?;
        let in_progress = reader.read_i8()? == 1;
        let _reserved = reader.read_i8()?;
        let mods = reader.read_u32()?;
        let name = reader.read_string()?;
        let password = reader.read_string()?;
        let map_name = reader.read_string()?;
        let map_id = reader.read_i32()?;
        let map_md5 = reader.read_string()?;

        let mut slot_statuses = [0u8; SLOT_COUNT];
        for status in slot_statuses.iter_mut() {
            *status = reader.read_u8()?;
        }

        let mut slot_teams = [0u8; SLOT_COUNT];
        for team in slot_teams.iter_mut() {
            *team = reader.read_u8()?;
        }

        let mut slot_ids = Vec::new();
        for status in slot_statuses {
            if status & SlotStatus::HAS_USER.bits() != 0 {
                slot_ids.push(reader.read_i32()?);
            }
        }

        let host_id = reader.read_i32()?;
        let mode = reader.read_i8()? as u8;
        let win_condition = reader.read_i8()? as u8;
        let team_type = reader.read_i8()? as u8;
        let freemod = reader.read_i8()? == 1;

        let mut slot_mods = [0u32; SLOT_COUNT];
        if freemod {
            for mods in slot_mods.iter_mut() {
                *mods = reader.read_u32()?;
            }
        }

        let seed = reader.read_i32()?;

        Ok(Self {
            id,
            in_progress,
            mods,
            name,
            password,
            map_name,
            map_id,
            map_md5,
            slot_statuses,
            slot_teams,
            slot_ids,
            host_id,
            mode,
            win_condition,
            team_type,
            freemod,
            slot_mods,
            seed,
        })
    }

    /// Serialize; `send_pw` controls whether the password body is sent.
    ///
    /// When a password exists but is withheld, the shape-preserving
    /// `0x0b 0x00` marker goes out instead of the plain empty form.
    pub fn write(&self, writer: &mut Writer, send_pw: bool) {
        writer.write_u16(self.id);
        writer.write_i8(self.in_progress as i8);
        writer.write_i8(0); // reserved
        writer.write_u32(self.mods);
        writer.write_string(&self.name);

        if self.password.is_empty() {
            writer.write_u8(0x00);
        } else if send_pw {
            writer.write_string(&self.password);
        } else {
            writer.write_raw(&[0x0b, 0x00]);
        }

        writer.write_string(&self.map_name);
        writer.write_i32(self.map_id);
        writer.write_string(&self.map_md5);

        for status in self.slot_statuses {
            writer.write_u8(status);
        }
        for team in self.slot_teams {
            writer.write_u8(team);
        }

        for id in &self.slot_ids {
            writer.write_i32(*id);
        }

        writer.write_i32(self.host_id);
        writer.write_i8(self.mode as i8);
        writer.write_i8(self.win_condition as i8);
        writer.write_i8(self.team_type as i8);
        writer.write_i8(self.freemod as i8);

        if self.freemod {
            for mods in self.slot_mods {
                writer.write_u32(mods);
            }
        }

        writer.write_i32(self.seed);
    }
}

// =============================================================================
// SPECTATE FRAMES
// =============================================================================

/// One replay input frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
    pub button_state: u8,
    pub taiko_byte: u8,
    pub x: f32,
    pub y: f32,
    pub time: i32,
}

impl ReplayFrame {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            button_state: reader.read_u8()?,
            taiko_byte: reader.read_u8()?,
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            time: reader.read_i32()?,
        })
    }
}

/// The live score snapshot riding along with replay frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFrame {
    pub time: i32,
    pub id: u8,
    pub num300: u16,
    pub num100: u16,
    pub num50: u16,
    pub num_geki: u16,
    pub num_katu: u16,
    pub num_miss: u16,
    pub total_score: i32,
    pub current_combo: u16,
    pub max_combo: u16,
    pub perfect: bool,
    pub current_hp: u8,
    pub tag_byte: u8,
    pub score_v2: bool,
    pub combo_portion: Option<f64>,
    pub bonus_portion: Option<f64>,
}

impl ScoreFrame {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let mut frame = Self {
            time: reader.read_i32()?,
            id: reader.read_u8()?,
            num300: reader.read_u16()?,
            num100: reader.read_u16()?,
            num50: reader.read_u16()?,
            num_geki: reader.read_u16()?,
            num_katu: reader.read_u16()?,
            num_miss: reader.read_u16()?,
            total_score: reader.read_i32()?,
            current_combo: reader.read_u16()?,
            max_combo: reader.read_u16()?,
            perfect: reader.read_u8()? != 0,
            current_hp: reader.read_u8()?,
            tag_byte: reader.read_u8()?,
            score_v2: reader.read_u8()? != 0,
            combo_portion: None,
            bonus_portion: None,
        };

        if frame.score_v2 {
            frame.combo_portion = Some(reader.read_f64()?);
            frame.bonus_portion = Some(reader.read_f64()?);
        }

        Ok(frame)
    }
}

/// A bundle of replay frames from a spectated host.
///
/// Decoded for validation only; rebroadcast always uses `raw` so the
/// fan-out path never re-serializes.
#[derive(Debug, Clone)]
pub struct ReplayFrameBundle {
    pub extra: i32,
    pub frames: Vec<ReplayFrame>,
    pub score_frame: ScoreFrame,
    pub sequence: u16,
    pub action: u8,
    pub raw: Vec<u8>,
}

impl ReplayFrameBundle {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let raw = reader.remaining().to_vec();

        let extra = reader.read_i32()?;
        let frame_count = reader.read_u16()? as usize;

        let mut frames = Vec::with_capacity(frame_count.min(256));
        for _ in 0..frame_count {
            frames.push(ReplayFrame::read(reader)?);
        }

        let score_frame = ScoreFrame::read(reader)?;
        let sequence = reader.read_u16()?;
        let action = reader.read_u8()?;

        Ok(Self {
            extra,
            frames,
            score_frame,
            sequence,
            action,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrip() {
        let message = Message {
            sender: "peppy".into(),
            content: "hello world".into(),
            recipient: "#osu".into(),
            sender_id: 2,
        };

        let mut w = Writer::new();
        message.write(&mut w);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(Message::read(&mut r).unwrap(), message);
    }

    fn sample_match() -> MatchFrame {
        let mut slot_statuses = [SlotStatus::OPEN.bits(); SLOT_COUNT];
        slot_statuses[0] = SlotStatus::NOT_READY.bits();
        slot_statuses[1] = SlotStatus::READY.bits();
        slot_statuses[5] = SlotStatus::LOCKED.bits();

        let mut slot_mods = [0u32; SLOT_COUNT];
        slot_mods[0] = 16; // hardrock
        slot_mods[1] = 8; // hidden

        MatchFrame {
            id: 3,
            in_progress: false,
            mods: 64,
            name: "scrim".into(),
            password: "hunter2".into(),
            map_name: "some map".into(),
            map_id: 12345,
            map_md5: "0a".repeat(16),
            slot_statuses,
            slot_teams: [0; SLOT_COUNT],
            slot_ids: vec![1001, 1002],
            host_id: 1001,
            mode: 0,
            win_condition: 0,
            team_type: 0,
            freemod: true,
            slot_mods,
            seed: 42,
        }
    }

    #[test]
    fn match_roundtrip_with_password() {
        let frame = sample_match();

        let mut w = Writer::new();
        frame.write(&mut w, true);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(MatchFrame::read(&mut r).unwrap(), frame);
        assert!(r.is_empty());
    }

    #[test]
    fn match_password_suppression_preserves_shape() {
        let frame = sample_match();

        let mut w = Writer::new();
        frame.write(&mut w, false);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let read_back = MatchFrame::read(&mut r).unwrap();

        // The password bytes are withheld but the structure still parses.
        assert_eq!(read_back.password, "");
        assert_eq!(read_back.slot_ids, frame.slot_ids);
        assert_eq!(read_back.seed, frame.seed);
    }

    #[test]
    fn match_without_password_writes_single_null() {
        let mut frame = sample_match();
        frame.password.clear();

        let mut w = Writer::new();
        frame.write(&mut w, false);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(MatchFrame::read(&mut r).unwrap().password, "");
    }

    #[test]
    fn replay_bundle_keeps_raw_bytes() {
        let mut w = Writer::new();
        w.write_i32(0); // extra
        w.write_u16(1); // frame count
        w.write_u8(1);
        w.write_u8(0);
        w.write_f32(256.0);
        w.write_f32(192.0);
        w.write_i32(1000);
        // score frame (v1, 29 bytes)
        w.write_i32(1000);
        w.write_u8(0);
        w.write_u16(10);
        w.write_u16(1);
        w.write_u16(0);
        w.write_u16(2);
        w.write_u16(0);
        w.write_u16(0);
        w.write_i32(30000);
        w.write_u16(11);
        w.write_u16(11);
        w.write_u8(0);
        w.write_u8(200);
        w.write_u8(0);
        w.write_u8(0);
        w.write_u16(7); // sequence
        w.write_u8(0); // action

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let bundle = ReplayFrameBundle::read(&mut r).unwrap();

        assert_eq!(bundle.raw, bytes);
        assert_eq!(bundle.frames.len(), 1);
        assert_eq!(bundle.sequence, 7);
        assert!(r.is_empty());
    }
}
