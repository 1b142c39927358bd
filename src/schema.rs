//! Column-name constants for bipartite panels.
//! Single source of truth - every stage addresses columns through these.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Identifier columns ──────────────────────────────────────────────────────
pub mod ids {
    pub const I: &str = "i";
    pub const J: &str = "j";
    pub const J1: &str = "j1";
    pub const J2: &str = "j2";
    pub const G: &str = "g";
    pub const G1: &str = "g1";
    pub const G2: &str = "g2";
}

// ── Outcome and weight columns ──────────────────────────────────────────────
pub mod values {
    pub const Y: &str = "y";
    pub const Y1: &str = "y1";
    pub const Y2: &str = "y2";
    pub const W: &str = "w";
    pub const W1: &str = "w1";
    pub const W2: &str = "w2";
    pub const M: &str = "m";
}

// ── Period columns ──────────────────────────────────────────────────────────
pub mod periods {
    pub const T: &str = "t";
    pub const T1: &str = "t1";
    pub const T2: &str = "t2";
    pub const T11: &str = "t11";
    pub const T12: &str = "t12";
    pub const T21: &str = "t21";
    pub const T22: &str = "t22";
}

// ── Id reference tables ─────────────────────────────────────────────────────
pub mod reference {
    pub const ORIGINAL_IDS: &str = "original_ids";
    pub const ADJUSTED_PREFIX: &str = "adjusted_ids_";
    /// Prefix for recovered id columns in `original_ids()` output.
    pub const ORIGINAL_PREFIX: &str = "original_";
}

/// A logical column; each format spreads it over one or more sub-columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logical {
    I,
    J,
    Y,
    T,
    G,
    W,
    M,
}

impl Logical {
    pub const ALL: [Logical; 7] = [
        Logical::I,
        Logical::J,
        Logical::Y,
        Logical::T,
        Logical::G,
        Logical::W,
        Logical::M,
    ];

    /// Identifier columns, made contiguous by the cleaner.
    pub const IDS: [Logical; 3] = [Logical::I, Logical::J, Logical::G];

    pub fn name(self) -> &'static str {
        match self {
            Logical::I => ids::I,
            Logical::J => ids::J,
            Logical::Y => values::Y,
            Logical::T => periods::T,
            Logical::G => ids::G,
            Logical::W => values::W,
            Logical::M => values::M,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, Logical::I | Logical::J | Logical::Y)
    }
}

impl fmt::Display for Logical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical sub-column name → physical input column name.
///
/// Sub-columns that are not listed map to themselves, so the default map
/// reads a table already using canonical names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMap {
    names: HashMap<String, String>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, canonical: &str, physical: &str) -> Self {
        self.names
            .insert(canonical.to_string(), physical.to_string());
        self
    }

    pub fn physical<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.names
            .get(canonical)
            .map(String::as_str)
            .unwrap_or(canonical)
    }
}
