//! Privileges
//!
//! The internal privilege bitfield and its projection onto the much
//! smaller set of flags the client understands.

use bitflags::bitflags;

bitflags! {
    /// Server-side privilege bits, as stored on the user row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Privileges: u32 {
        /// Account exists and may log in.
        const NORMAL = 1 << 0;
        /// Completed a first login.
        const VERIFIED = 1 << 1;

        /// Soft ban: may log in, invisible and inert to everyone else.
        const RESTRICTED = 1 << 2;
        /// Hard ban.
        const BANNED = 1 << 3;

        /// Paying supporter.
        const SUPPORTER = 1 << 4;
        /// May change beatmap statuses.
        const NOMINATOR = 1 << 5;
        /// Moderation powers.
        const ADMIN = 1 << 6;
        /// Server development access.
        const DEVELOPER = 1 << 7;
        /// Instance owner.
        const OWNER = 1 << 8;
    }
}

impl Privileges {
    /// Any state that removes the user from public visibility.
    pub const DISALLOWED: Privileges = Privileges::RESTRICTED.union(Privileges::BANNED);

    /// Staff of any rank.
    pub const STAFF: Privileges = Privileges::ADMIN
        .union(Privileges::DEVELOPER)
        .union(Privileges::OWNER);

    /// Every grantable bit; given to the instance's own account.
    pub const MASTER: Privileges = Privileges::NORMAL
        .union(Privileges::VERIFIED)
        .union(Privileges::SUPPORTER)
        .union(Privileges::NOMINATOR)
        .union(Privileges::ADMIN)
        .union(Privileges::DEVELOPER)
        .union(Privileges::OWNER);

    /// Decode from a stored integer, discarding unknown bits.
    pub fn from_repr(value: u32) -> Self {
        Privileges::from_bits_truncate(value)
    }
}

bitflags! {
    /// The client-visible privilege byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BanchoPrivileges: u8 {
        const PLAYER = 1 << 0;
        const MODERATOR = 1 << 1;
        const SUPPORTER = 1 << 2;
        const OWNER = 1 << 3;
        const DEVELOPER = 1 << 4;
    }
}

impl BanchoPrivileges {
    /// Project the internal bitfield onto the client's flags.
    pub fn from_privileges(privileges: Privileges) -> Self {
        let mut out = BanchoPrivileges::empty();

        if !privileges.intersects(Privileges::DISALLOWED) {
            out |= BanchoPrivileges::PLAYER;
        }
        if privileges.contains(Privileges::SUPPORTER) {
            out |= BanchoPrivileges::SUPPORTER;
        }
        if privileges.contains(Privileges::ADMIN) {
            out |= BanchoPrivileges::MODERATOR;
        }
        if privileges.contains(Privileges::DEVELOPER) {
            out |= BanchoPrivileges::DEVELOPER;
        }
        if privileges.contains(Privileges::OWNER) {
            out |= BanchoPrivileges::OWNER;
        }

        out
    }
}
