//! Play Modes
//!
//! Server-side modes extend the four client modes with relax/autopilot
//! variants; the wire always carries the vanilla projection.

/// Game mode, including server-side relax/autopilot variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Mode {
    Std = 0,
    Taiko = 1,
    Catch = 2,
    Mania = 3,

    StdRx = 4,
    TaikoRx = 5,
    CatchRx = 6,

    StdAp = 7,
}

impl Mode {
    /// All modes, in stats-fetch order.
    pub const ALL: [Mode; 8] = [
        Mode::Std,
        Mode::Taiko,
        Mode::Catch,
        Mode::Mania,
        Mode::StdRx,
        Mode::TaikoRx,
        Mode::CatchRx,
        Mode::StdAp,
    ];

    /// Decode from a client byte plus the active mods; relax/autopilot
    /// are mod-derived, the client only ever sends 0..=3.
    pub fn from_wire(value: u8, mods: crate::constants::mods::Mods) -> Self {
        use crate::constants::mods::Mods;

        let vanilla = match value & 3 {
            0 => Mode::Std,
            1 => Mode::Taiko,
            2 => Mode::Catch,
            _ => Mode::Mania,
        };

        if mods.contains(Mods::RELAX) {
            match vanilla {
                Mode::Std => Mode::StdRx,
                Mode::Taiko => Mode::TaikoRx,
                Mode::Catch => Mode::CatchRx,
                other => other,
            }
        } else if mods.contains(Mods::AUTOPILOT) && vanilla == Mode::Std {
            Mode::StdAp
        } else {
            vanilla
        }
    }

    /// Decode a raw stored value (e.g. from a pub/sub payload).
    pub fn from_repr(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// The vanilla mode byte the client understands.
    pub fn as_vn(self) -> u8 {
        match self {
            Mode::Std | Mode::StdRx | Mode::StdAp => 0,
            Mode::Taiko | Mode::TaikoRx => 1,
            Mode::Catch | Mode::CatchRx => 2,
            Mode::Mania => 3,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::mods::Mods;

    #[test]
    fn relax_is_mod_derived() {
        assert_eq!(Mode::from_wire(0, Mods::RELAX), Mode::StdRx);
        assert_eq!(Mode::from_wire(3, Mods::RELAX), Mode::Mania);
        assert_eq!(Mode::from_wire(0, Mods::AUTOPILOT), Mode::StdAp);
        assert_eq!(Mode::from_wire(1, Mods::empty()), Mode::Taiko);
    }

    #[test]
    fn vanilla_projection() {
        assert_eq!(Mode::StdRx.as_vn(), 0);
        assert_eq!(Mode::CatchRx.as_vn(), 2);
        assert_eq!(Mode::Mania.as_vn(), 3);
    }
}
