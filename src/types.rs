use std::str::FromStr;

use serde::Deserialize;

/// How ready algorithms are ordered when more of them are DATAREADY than the
/// in-flight cap allows.
///
/// Ties keep declaration order, but callers must not rely on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    /// Declaration order.
    None,
    /// Algorithms whose outputs have more direct consumers go first.
    ProductConsumption,
    /// Algorithms with more work transitively downstream go first.
    BranchPotential,
    /// Algorithms at the head of the longest downstream chain go first.
    Eccentricity,
    /// Slowest algorithms (by mean observed runtime) go first.
    Timing,
}

impl Default for OptimizationMode {
    fn default() -> Self {
        OptimizationMode::None
    }
}

impl FromStr for OptimizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" | "" => Ok(OptimizationMode::None),
            "product_consumption" => Ok(OptimizationMode::ProductConsumption),
            "branch_potential" => Ok(OptimizationMode::BranchPotential),
            "eccentricity" => Ok(OptimizationMode::Eccentricity),
            "timing" => Ok(OptimizationMode::Timing),
            other => Err(format!(
                "invalid optimization_mode: {other} (expected \"none\", \"product_consumption\", \
                 \"branch_potential\", \"eccentricity\" or \"timing\")"
            )),
        }
    }
}

/// Whether an algorithm gets private clones or one reentrant instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClonePolicy {
    /// `instances` private copies, each lent to one task at a time.
    Clone,
    /// One reentrant instance lent to any number of tasks at once.
    Shared,
}

impl Default for ClonePolicy {
    fn default() -> Self {
        ClonePolicy::Clone
    }
}

impl FromStr for ClonePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clone" => Ok(ClonePolicy::Clone),
            "shared" => Ok(ClonePolicy::Shared),
            other => Err(format!(
                "invalid policy: {other} (expected \"clone\" or \"shared\")"
            )),
        }
    }
}

/// Boolean combinator of a decision node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    And,
    Or,
    Not,
}

impl Default for DecisionMode {
    fn default() -> Self {
        DecisionMode::And
    }
}

impl FromStr for DecisionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "and" => Ok(DecisionMode::And),
            "or" => Ok(DecisionMode::Or),
            "not" => Ok(DecisionMode::Not),
            other => Err(format!(
                "invalid decision mode: {other} (expected \"and\", \"or\" or \"not\")"
            )),
        }
    }
}
