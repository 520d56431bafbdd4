use crate::cube::names;
use crate::types::{AggregationStat, CentumError, CentumResult};
use serde::{Deserialize, Serialize};

/// How cells whose hypotheses could not be decided (NaN inputs) are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UndecidedPolicy {
    /// Undecided cells are labelled "no event"
    #[default]
    NoEvent,
    /// Same labels, plus an `event_undecided` flag field marking those cells
    Flagged,
}

/// Every option recognised by the delineation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelineationConfig {
    /// Actual evapotranspiration variable
    pub eta_name: String,
    /// Potential evapotranspiration variable
    pub etp_name: String,
    /// Local significance boundary (flag is set where value > threshold)
    pub threshold_local: f64,
    /// Regional significance boundary (flag is set where value > threshold)
    pub threshold_regional: f64,
    /// Regional window width in metres
    pub window_size_x_m: f64,
    /// Regional window height in metres
    pub window_size_y_m: f64,
    /// Temporal smoothing window in time steps
    pub time_window: usize,
    /// Regional aggregation statistic
    pub stat: AggregationStat,
    /// Field tested against `threshold_local`
    pub local_decision_field: String,
    /// Field tested against `threshold_regional`
    pub regional_decision_field: String,
    /// Row-block size for the regional window computation (None = whole grid)
    pub chunk_rows: Option<usize>,
    pub undecided_policy: UndecidedPolicy,
    /// Run the input validator before processing
    pub validate_input: bool,
}

impl Default for DelineationConfig {
    fn default() -> Self {
        Self {
            eta_name: "ETa".to_string(),
            etp_name: "ETp".to_string(),
            threshold_local: 0.25,
            threshold_regional: 0.25,
            window_size_x_m: 1000.0,  // 1 km
            window_size_y_m: 1000.0,
            time_window: 10,
            stat: AggregationStat::Mean,
            local_decision_field: names::RATIO_LOCAL_TIME_AVG.to_string(),
            regional_decision_field: names::RATIO_REGIONAL_TIME_AVG.to_string(),
            chunk_rows: None,
            undecided_policy: UndecidedPolicy::NoEvent,
            validate_input: true,
        }
    }
}

impl DelineationConfig {
    /// Check every option, reporting all invalid ones together
    pub fn check(&self) -> CentumResult<()> {
        let mut problems = Vec::new();

        if self.eta_name.is_empty() {
            problems.push("eta_name must not be empty".to_string());
        }
        if self.etp_name.is_empty() {
            problems.push("etp_name must not be empty".to_string());
        }
        if !self.threshold_local.is_finite() {
            problems.push(format!("threshold_local must be finite, got {}", self.threshold_local));
        }
        if !self.threshold_regional.is_finite() {
            problems.push(format!(
                "threshold_regional must be finite, got {}",
                self.threshold_regional
            ));
        }
        for (label, value) in [
            ("window_size_x_m", self.window_size_x_m),
            ("window_size_y_m", self.window_size_y_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                problems.push(format!("{} must be a positive distance, got {}", label, value));
            }
        }
        if self.time_window == 0 {
            problems.push("time_window must be at least one time step".to_string());
        }
        if self.chunk_rows == Some(0) {
            problems.push("chunk_rows must be at least one row".to_string());
        }
        if self.local_decision_field.is_empty() || self.regional_decision_field.is_empty() {
            problems.push("decision field names must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CentumError::InvalidParameter(problems.join("; ")))
        }
    }
}
