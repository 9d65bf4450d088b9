//! Selection of measured quantities for a sensors publication.

use core::ops::{BitOr, BitOrAssign};

/// A set of sensor quantities. Flags combine with `|`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryMask(u16);

impl TelemetryMask {
    pub const EMPTY: Self = Self(0);
    pub const CO2: Self = Self(1 << 0);
    pub const TEMPERATURE: Self = Self(1 << 1);
    pub const HUMIDITY: Self = Self(1 << 2);
    pub const PRESSURE: Self = Self(1 << 3);
    pub const IAQ: Self = Self(1 << 4);
    pub const PM0_5: Self = Self(1 << 5);
    pub const PM1: Self = Self(1 << 6);
    pub const PM2_5: Self = Self(1 << 7);
    pub const PM4: Self = Self(1 << 8);
    pub const PM10: Self = Self(1 << 9);
    pub const ALL: Self = Self(0x03FF);

    /// Builds a mask from raw bits, ignoring bits that name no quantity.
    pub const fn from_bits_truncate(bits: u16) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// `true` when every flag in `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for TelemetryMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for TelemetryMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}
