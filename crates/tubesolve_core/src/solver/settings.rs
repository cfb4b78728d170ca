use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// How slices are added between contraction passes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefiningMode {
    /// Sample every slice at its midpoint.
    AllSlices,
    /// Sample the steepest slice only.
    SteepestSlice,
    /// Widest slices first, then slices steeper than the average steepness.
    AverageThreshold,
    /// Widest slices first, then slices steeper than the median steepness.
    MedianThreshold,
}

impl RefiningMode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::AllSlices),
            1 => Some(Self::SteepestSlice),
            2 => Some(Self::AverageThreshold),
            3 => Some(Self::MedianThreshold),
            _ => None,
        }
    }
}

/// ODE contractor run on every contraction pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractionMode {
    Basic,
    Cid,
    CidGuess,
    /// No ODE contraction, the constraint callback only.
    ConstraintsOnly,
    PicardDeriv,
}

impl ContractionMode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Basic),
            1 => Some(Self::Cid),
            2 => Some(Self::CidGuess),
            3 => Some(Self::ConstraintsOnly),
            4 => Some(Self::PicardDeriv),
            _ => None,
        }
    }
}

/// Where a node is split when it does not meet the stopping condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BisectionPolicy {
    /// Never bisect: every non-empty contracted node is a solution.
    Disabled,
    LowerBound,
    /// Time of the widest gate, or the first finite gate while unbounded.
    MaxGateDiam,
    UpperBound,
    /// Lower or upper bound, drawn uniformly.
    Random,
    /// Lower bound on odd levels, upper bound on even levels.
    Alternate,
}

impl BisectionPolicy {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(Self::Disabled),
            -1 => Some(Self::LowerBound),
            0 => Some(Self::MaxGateDiam),
            1 => Some(Self::UpperBound),
            2 => Some(Self::Random),
            3 => Some(Self::Alternate),
            _ => None,
        }
    }
}

/// Time at which var3b peels the gate values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Var3bTimePolicy {
    LowerBound,
    MaxGateDiam,
    UpperBound,
    Random,
}

impl Var3bTimePolicy {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::LowerBound),
            0 => Some(Self::MaxGateDiam),
            1 => Some(Self::UpperBound),
            2 => Some(Self::Random),
            _ => None,
        }
    }
}

/// Criterion deciding that a node is narrow enough to be a solution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoppingMode {
    /// Every slice codomain is below the threshold.
    Diam,
    /// Every gate is below the threshold.
    Gate,
    /// The first and last gates are below the threshold.
    BoundaryGate,
}

impl StoppingMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "diam" => Some(Self::Diam),
            "gate" => Some(Self::Gate),
            "boundarygate" => Some(Self::BoundaryGate),
            _ => None,
        }
    }
}

/// Solver configuration.
///
/// Fixed-point ratios: a ratio above 1 never reaches the fixed point, 0 runs
/// exactly one pass, a negative ratio disables the loop. Otherwise a pass
/// sequence stops once `after / before >= ratio`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    pub propa_fxpt_ratio: f64,
    pub refining_fxpt_ratio: f64,
    pub var3b_fxpt_ratio: f64,
    pub var3b_propa_fxpt_ratio: f64,
    pub var3b_min_rate: f64,
    pub var3b_max_rate: f64,
    pub var3b_rate_factor: f64,
    pub var3b_time_policy: Var3bTimePolicy,
    pub var3b_external_contraction: bool,
    pub bisection_policy: BisectionPolicy,
    pub max_slices: usize,
    pub refining_mode: RefiningMode,
    pub contraction_mode: ContractionMode,
    pub stopping_mode: StoppingMode,
    pub trace: bool,
    /// Seed of the default random generator.
    pub seed: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            propa_fxpt_ratio: 0.005,
            refining_fxpt_ratio: 0.005,
            var3b_fxpt_ratio: 0.005,
            var3b_propa_fxpt_ratio: 0.005,
            var3b_min_rate: 1e-4,
            var3b_max_rate: 0.4,
            var3b_rate_factor: 2.0,
            var3b_time_policy: Var3bTimePolicy::MaxGateDiam,
            var3b_external_contraction: true,
            bisection_policy: BisectionPolicy::MaxGateDiam,
            max_slices: 5000,
            refining_mode: RefiningMode::AllSlices,
            contraction_mode: ContractionMode::Basic,
            stopping_mode: StoppingMode::Diam,
            trace: false,
            seed: 0,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("propa_fxpt_ratio", self.propa_fxpt_ratio),
            ("refining_fxpt_ratio", self.refining_fxpt_ratio),
            ("var3b_fxpt_ratio", self.var3b_fxpt_ratio),
            ("var3b_propa_fxpt_ratio", self.var3b_propa_fxpt_ratio),
        ] {
            if ratio.is_nan() {
                bail!("{} must be a number.", name);
            }
        }
        if self.max_slices == 0 {
            bail!("max_slices must be at least 1.");
        }
        if !(self.var3b_min_rate > 0.0 && self.var3b_min_rate < 1.0) {
            bail!("var3b_min_rate must lie in (0, 1).");
        }
        if !(self.var3b_max_rate > 0.0 && self.var3b_max_rate < 1.0) {
            bail!("var3b_max_rate must lie in (0, 1).");
        }
        if !(self.var3b_rate_factor > 1.0) {
            bail!("var3b_rate_factor must be greater than 1.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains(result: Result<()>, needle: &str) {
        let err = result.expect_err("expected an error");
        assert!(
            err.to_string().contains(needle),
            "error '{}' does not mention '{}'",
            err,
            needle
        );
    }

    #[test]
    fn legacy_codes_map_to_variants() {
        assert_eq!(BisectionPolicy::from_code(-2), Some(BisectionPolicy::Disabled));
        assert_eq!(BisectionPolicy::from_code(3), Some(BisectionPolicy::Alternate));
        assert_eq!(BisectionPolicy::from_code(4), None);
        assert_eq!(ContractionMode::from_code(4), Some(ContractionMode::PicardDeriv));
        assert_eq!(RefiningMode::from_code(3), Some(RefiningMode::MedianThreshold));
        assert_eq!(Var3bTimePolicy::from_code(-1), Some(Var3bTimePolicy::LowerBound));
        assert_eq!(StoppingMode::from_name("boundarygate"), Some(StoppingMode::BoundaryGate));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: SolverSettings =
            serde_json::from_str(r#"{"max_slices": 40, "stopping_mode": "boundary_gate"}"#)
                .expect("valid settings");
        assert_eq!(settings.max_slices, 40);
        assert_eq!(settings.stopping_mode, StoppingMode::BoundaryGate);
        assert_eq!(settings.refining_mode, RefiningMode::AllSlices);
        assert_eq!(settings.propa_fxpt_ratio, 0.005);

        let json = serde_json::to_string(&settings).expect("serializable");
        assert!(json.contains("\"bisection_policy\":\"max_gate_diam\""));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(SolverSettings::default().validate().is_ok());
        assert_err_contains(
            SolverSettings {
                max_slices: 0,
                ..SolverSettings::default()
            }
            .validate(),
            "max_slices",
        );
        assert_err_contains(
            SolverSettings {
                var3b_rate_factor: 1.0,
                ..SolverSettings::default()
            }
            .validate(),
            "var3b_rate_factor",
        );
        assert_err_contains(
            SolverSettings {
                propa_fxpt_ratio: f64::NAN,
                ..SolverSettings::default()
            }
            .validate(),
            "propa_fxpt_ratio",
        );
    }
}
