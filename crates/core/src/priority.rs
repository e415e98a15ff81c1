// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority class: a small tagged set enumerated in configuration (spec §9
//! "Dynamic priority maps"). Unknown priorities never error — they carry a
//! default weight of 1.0 wherever weights are consulted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Critical,
    High,
    Normal,
    Low,
    /// Forward-compatible escape hatch for tenant-defined priority names.
    Custom(String),
}

impl PriorityClass {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Custom(s) => s,
        }
    }

    /// The well-known priorities, highest first. Used to iterate claim order.
    pub const WELL_KNOWN: [PriorityClass; 4] =
        [Self::Critical, Self::High, Self::Normal, Self::Low];
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "critical" => Self::Critical,
            "high" => Self::High,
            "normal" => Self::Normal,
            "low" => Self::Low,
            other => Self::Custom(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_well_known() {
        for p in PriorityClass::WELL_KNOWN {
            assert_eq!(p.as_str().parse::<PriorityClass>().unwrap(), p);
        }
    }

    #[test]
    fn unknown_becomes_custom_never_errors() {
        let p: PriorityClass = "batch".parse().unwrap();
        assert_eq!(p, PriorityClass::Custom("batch".to_string()));
    }
}
