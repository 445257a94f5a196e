//! Relative (BIP-68) and absolute lock times

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Unit of a relative lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelativeLockUnit {
    Blocks,
    /// 512-second intervals
    Intervals,
}

/// Sequence number of an input carrying a BIP-68 relative lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativeLocktime(u32);

impl RelativeLocktime {
    pub fn from_blocks(blocks: u16) -> Self {
        RelativeLocktime(blocks as u32)
    }

    pub fn from_intervals(intervals: u16) -> Self {
        RelativeLocktime(intervals as u32 | SEQUENCE_LOCKTIME_TYPE_FLAG)
    }

    /// Lock of at least `seconds`, rounded up to whole 512-second intervals
    ///
    /// Returns `None` when the duration does not fit in 16 bits of intervals.
    pub fn from_seconds(seconds: u32) -> Option<Self> {
        let intervals = seconds.div_ceil(512);
        u16::try_from(intervals).ok().map(RelativeLocktime::from_intervals)
    }

    /// Wrap an already encoded sequence number
    pub fn from_sequence(sequence: u32) -> Self {
        RelativeLocktime(sequence)
    }

    pub fn to_sequence(self) -> u32 {
        self.0
    }

    /// False when the disable flag is set and the value is not a lock at all
    pub fn is_enabled(self) -> bool {
        self.0 & SEQUENCE_LOCKTIME_DISABLE_FLAG == 0
    }

    pub fn unit(self) -> RelativeLockUnit {
        if self.0 & SEQUENCE_LOCKTIME_TYPE_FLAG != 0 {
            RelativeLockUnit::Intervals
        } else {
            RelativeLockUnit::Blocks
        }
    }

    pub fn value(self) -> u16 {
        (self.0 & SEQUENCE_LOCKTIME_MASK) as u16
    }
}

impl fmt::Display for RelativeLocktime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_enabled() {
            return write!(f, "disabled({:#010x})", self.0);
        }
        match self.unit() {
            RelativeLockUnit::Blocks => write!(f, "{} blocks", self.value()),
            RelativeLockUnit::Intervals => write!(f, "{} seconds", self.value() as u32 * 512),
        }
    }
}

/// True when an absolute lock time is a block height rather than a UNIX time
pub fn is_height_locktime(locktime: u32) -> bool {
    locktime < LOCKTIME_THRESHOLD
}
