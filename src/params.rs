use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BipartiteError;

/// Connectivity notion used to restrict the firm set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectedness {
    Connected,
    LeaveOneObservationOut,
    LeaveOneFirmOut,
}

impl Connectedness {
    const EXPECTED: &'static str =
        "connected, leave_one_observation_out, leave_one_firm_out";

    pub fn as_str(self) -> &'static str {
        match self {
            Connectedness::Connected => "connected",
            Connectedness::LeaveOneObservationOut => "leave_one_observation_out",
            Connectedness::LeaveOneFirmOut => "leave_one_firm_out",
        }
    }
}

impl fmt::Display for Connectedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Connectedness {
    type Err = BipartiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Connectedness::Connected),
            "leave_one_observation_out" => Ok(Connectedness::LeaveOneObservationOut),
            "leave_one_firm_out" => Ok(Connectedness::LeaveOneFirmOut),
            other => Err(BipartiteError::Parameter {
                name: "connectedness",
                value: other.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Metric used to rank candidate components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentSize {
    #[serde(alias = "len", alias = "length")]
    Rows,
    #[default]
    Firms,
    Workers,
    Stayers,
    Movers,
}

impl ComponentSize {
    const EXPECTED: &'static str = "len, length, firms, workers, stayers, movers";

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentSize::Rows => "length",
            ComponentSize::Firms => "firms",
            ComponentSize::Workers => "workers",
            ComponentSize::Stayers => "stayers",
            ComponentSize::Movers => "movers",
        }
    }
}

impl fmt::Display for ComponentSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentSize {
    type Err = BipartiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "len" | "length" | "rows" => Ok(ComponentSize::Rows),
            "firms" => Ok(ComponentSize::Firms),
            "workers" => Ok(ComponentSize::Workers),
            "stayers" => Ok(ComponentSize::Stayers),
            "movers" => Ok(ComponentSize::Movers),
            other => Err(BipartiteError::Parameter {
                name: "component_size",
                value: other.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// How to resolve several rows for one worker-period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHow {
    #[default]
    Max,
    Sum,
    Mean,
}

impl DuplicateHow {
    const EXPECTED: &'static str = "max, sum, mean";

    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateHow::Max => "max",
            DuplicateHow::Sum => "sum",
            DuplicateHow::Mean => "mean",
        }
    }
}

impl fmt::Display for DuplicateHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateHow {
    type Err = BipartiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(DuplicateHow::Max),
            "sum" => Ok(DuplicateHow::Sum),
            "mean" => Ok(DuplicateHow::Mean),
            other => Err(BipartiteError::Parameter {
                name: "i_t_how",
                value: other.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// When the connectivity pass repeats until the row count is stable.
///
/// Collapsed formats always loop; `force_loop` extends that to long and
/// event-study data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedPointPolicy {
    pub force_loop: bool,
    pub max_iterations: usize,
}

impl Default for FixedPointPolicy {
    fn default() -> Self {
        Self {
            force_loop: false,
            max_iterations: 100,
        }
    }
}

/// Parameters for [`BipartiteFrame::clean`](crate::BipartiteFrame::clean).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanParams {
    /// `None` skips the connectivity stage.
    pub connectedness: Option<Connectedness>,
    pub component_size: ComponentSize,
    pub i_t_how: DuplicateHow,
    /// Drop runs of spells that would be merged by a recollapse instead of merging them.
    pub drop_multiples: bool,
    /// Skip the sort by worker and period.
    pub is_sorted: bool,
    /// Rerun every stage even when its invariant is already known to hold.
    pub force: bool,
    /// Clean a copy and leave the caller's frame untouched.
    pub copy: bool,
    pub fixed_point: FixedPointPolicy,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            connectedness: Some(Connectedness::Connected),
            component_size: ComponentSize::Firms,
            i_t_how: DuplicateHow::Max,
            drop_multiples: false,
            is_sorted: false,
            force: true,
            copy: true,
            fixed_point: FixedPointPolicy::default(),
        }
    }
}

impl CleanParams {
    pub fn with_connectedness(mut self, connectedness: Option<Connectedness>) -> Self {
        self.connectedness = connectedness;
        self
    }

    pub fn with_component_size(mut self, component_size: ComponentSize) -> Self {
        self.component_size = component_size;
        self
    }

    pub fn with_i_t_how(mut self, i_t_how: DuplicateHow) -> Self {
        self.i_t_how = i_t_how;
        self
    }

    pub fn with_drop_multiples(mut self, drop_multiples: bool) -> Self {
        self.drop_multiples = drop_multiples;
        self
    }

    pub fn with_is_sorted(mut self, is_sorted: bool) -> Self {
        self.is_sorted = is_sorted;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_fixed_point(mut self, fixed_point: FixedPointPolicy) -> Self {
        self.fixed_point = fixed_point;
        self
    }

    /// Reject parameter combinations before any stage touches the data.
    pub fn validate(&self) -> Result<(), BipartiteError> {
        if self.fixed_point.max_iterations == 0 {
            return Err(BipartiteError::Parameter {
                name: "max_iterations",
                value: "0".to_string(),
                expected: "a positive iteration cap",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_mode_name() {
        assert_eq!(
            "leave_one_firm_out".parse::<Connectedness>().unwrap(),
            Connectedness::LeaveOneFirmOut
        );
        assert_eq!("len".parse::<ComponentSize>().unwrap(), ComponentSize::Rows);
        assert_eq!("length".parse::<ComponentSize>().unwrap(), ComponentSize::Rows);
        assert_eq!("mean".parse::<DuplicateHow>().unwrap(), DuplicateHow::Mean);
    }

    #[test]
    fn unknown_mode_is_a_parameter_error() {
        let err = "biconnected".parse::<Connectedness>().unwrap_err();
        assert!(matches!(
            err,
            BipartiteError::Parameter { name: "connectedness", .. }
        ));
        assert!(err.to_string().contains("biconnected"));

        let err = "median".parse::<DuplicateHow>().unwrap_err();
        assert!(matches!(err, BipartiteError::Parameter { name: "i_t_how", .. }));
    }

    #[test]
    fn zero_iteration_cap_is_rejected() {
        let params = CleanParams::default().with_fixed_point(FixedPointPolicy {
            force_loop: true,
            max_iterations: 0,
        });
        assert!(params.validate().is_err());
        assert!(CleanParams::default().validate().is_ok());
    }
}
