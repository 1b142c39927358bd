use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BipartiteError;
use crate::schema::{ids, periods, values, Logical};

/// Shape of a panel: what one row stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// One row per worker-period.
    Long,
    /// One row per worker-firm spell.
    CollapsedLong,
    /// One row per pair of consecutive observations.
    EventStudy,
    /// One row per pair of consecutive spells.
    CollapsedEventStudy,
}

impl Format {
    pub fn is_collapsed(self) -> bool {
        matches!(self, Format::CollapsedLong | Format::CollapsedEventStudy)
    }

    pub fn is_event_study(self) -> bool {
        matches!(self, Format::EventStudy | Format::CollapsedEventStudy)
    }

    /// The single-slot format with the same collapsing.
    pub fn long_counterpart(self) -> Format {
        match self {
            Format::Long | Format::EventStudy => Format::Long,
            Format::CollapsedLong | Format::CollapsedEventStudy => Format::CollapsedLong,
        }
    }

    /// Physical sub-columns of a logical column, in slot order.
    pub fn subcolumns(self, logical: Logical) -> &'static [&'static str] {
        match (logical, self.is_event_study()) {
            (Logical::I, _) => &[ids::I],
            (Logical::M, _) => &[values::M],
            (Logical::J, false) => &[ids::J],
            (Logical::J, true) => &[ids::J1, ids::J2],
            (Logical::Y, false) => &[values::Y],
            (Logical::Y, true) => &[values::Y1, values::Y2],
            (Logical::G, false) => &[ids::G],
            (Logical::G, true) => &[ids::G1, ids::G2],
            (Logical::W, false) => &[values::W],
            (Logical::W, true) => &[values::W1, values::W2],
            (Logical::T, _) => match self {
                Format::Long => &[periods::T],
                Format::CollapsedLong | Format::EventStudy => &[periods::T1, periods::T2],
                Format::CollapsedEventStudy => {
                    &[periods::T11, periods::T12, periods::T21, periods::T22]
                }
            },
        }
    }

    /// Column holding the period a row starts in, used as the sort and
    /// duplicate key.
    pub fn first_period(self) -> &'static str {
        self.subcolumns(Logical::T)[0]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Long => "long",
            Format::CollapsedLong => "collapsed_long",
            Format::EventStudy => "event_study",
            Format::CollapsedEventStudy => "collapsed_event_study",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = BipartiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Format::Long),
            "collapsed_long" => Ok(Format::CollapsedLong),
            "event_study" => Ok(Format::EventStudy),
            "collapsed_event_study" => Ok(Format::CollapsedEventStudy),
            other => Err(BipartiteError::Parameter {
                name: "format",
                value: other.to_string(),
                expected: "long, collapsed_long, event_study, collapsed_event_study",
            }),
        }
    }
}
