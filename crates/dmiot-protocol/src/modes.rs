//! Fan operating modes as reported in device status payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    Direct,
    Natural,
    Smart,
}

impl FanMode {
    /// Map the numeric mode code used on the wire.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Direct),
            1 => Some(Self::Natural),
            2 => Some(Self::Smart),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Direct => 0,
            Self::Natural => 1,
            Self::Smart => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Natural => "natural",
            Self::Smart => "smart",
        }
    }
}

impl std::fmt::Display for FanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
