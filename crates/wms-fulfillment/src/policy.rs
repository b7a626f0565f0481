use serde::{Deserialize, Serialize};

/// Threshold above which a SHORT_PICK is logged as SHORT_PICK_BACKORDER.
///
/// Owned by an external policy collaborator and injected through config.
/// With neither bound set a short pick never escalates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPickTolerance {
    pub max_short_units: Option<i64>,
    pub max_short_percent: Option<u8>,
}

impl ShortPickTolerance {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn exceeded(&self, expected: i64, short: i64) -> bool {
        if short <= 0 {
            return false;
        }
        if let Some(max) = self.max_short_units {
            if short > max {
                return true;
            }
        }
        if let Some(pct) = self.max_short_percent {
            if i128::from(short) * 100 > i128::from(pct) * i128::from(expected) {
                return true;
            }
        }
        false
    }
}

/// How an allocated bin portion is cut into pick tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// One task per (item, bin) portion.
    #[default]
    PerLine,
    /// One task per unit.
    PerUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    pub split_mode: SplitMode,
    /// Fall back to other bins holding the SKU when the primary bin is short.
    pub alternate_bins: bool,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            split_mode: SplitMode::PerLine,
            alternate_bins: true,
        }
    }
}
