use crate::config::DelineationConfig;
use crate::core::ratio::{compute_local_ratio, compute_regional_ratio_with, regional_window, RegionalOptions};
use crate::core::rules::{apply_rules_irrigation, apply_rules_rain, classify_event, undecided_cells};
use crate::core::temporal::apply_time_window_mean;
use crate::core::threshold::define_decision_thresholds;
use crate::core::validate::validate;
use crate::cube::{names, EtCube};
use crate::io::{LogReporter, Record, Reporter};
use crate::types::{CentumResult, EventField, EventType};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event counts over the whole cube
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_cells: usize,
    pub no_event_cells: usize,
    pub irrigation_cells: usize,
    pub rain_cells: usize,
    /// No-event cells where a hypothesis could not be decided
    pub undecided_cells: usize,
    /// Irrigation cells per time step
    pub irrigation_per_step: Vec<usize>,
    /// Rain cells per time step
    pub rain_per_step: Vec<usize>,
}

/// Result of a delineation run
#[derive(Debug, Clone)]
pub struct Delineation {
    /// Input cube extended with every derived field
    pub cube: EtCube,
    pub summary: EventSummary,
}

impl Delineation {
    pub fn event_type(&self) -> CentumResult<&EventField> {
        self.cube.events(names::EVENT_TYPE)
    }
}

/// Runs the full irrigation/rain delineation pipeline
pub struct IrrigationDelineator {
    config: DelineationConfig,
    reporter: Arc<dyn Reporter>,
}

impl IrrigationDelineator {
    /// Create a delineator that reports through the `log` facade
    pub fn new(config: DelineationConfig) -> Self {
        Self {
            config,
            reporter: Arc::new(LogReporter),
        }
    }

    /// Create a delineator with default parameters
    pub fn standard() -> Self {
        Self::new(DelineationConfig::default())
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &DelineationConfig {
        &self.config
    }

    /// Classify every (time, y, x) cell of `cube` as no event, irrigation or
    /// rain.
    ///
    /// Stages: validation (optional), local ratio, regional ratio, temporal
    /// smoothing, thresholds, rain rules, irrigation rules, classification.
    /// The input cube is not modified.
    pub fn run(&self, cube: &EtCube) -> CentumResult<Delineation> {
        let config = &self.config;
        config.check()?;

        self.report(
            Record::new("Starting irrigation delineation")
                .field("ETa", &config.eta_name)
                .field("ETp", &config.etp_name)
                .field("Local threshold", config.threshold_local)
                .field("Regional threshold", config.threshold_regional)
                .field("Time window", config.time_window),
        );

        if config.validate_input {
            validate(cube, &config.eta_name, &config.etp_name, self.reporter.as_ref())?;
        }

        let cube = compute_local_ratio(cube, &config.eta_name, &config.etp_name)?;
        self.report(Record::new("Computed local ETa/ETp ratio"));

        let options = RegionalOptions {
            window_size_x_m: config.window_size_x_m,
            window_size_y_m: config.window_size_y_m,
            stat: config.stat,
            chunk_rows: config.chunk_rows,
        };
        let window = regional_window(&cube, &options)?;
        let (x_resolution, y_resolution) = cube.resolution()?;
        self.report(
            Record::new("Computing regional ETa/ETp ratio")
                .field(
                    "Window Size",
                    format!("{}m x {}m", config.window_size_x_m, config.window_size_y_m),
                )
                .field(
                    "Grid Resolution",
                    format!("{:.2}m (x), {:.2}m (y)", x_resolution, y_resolution),
                )
                .field("Window Cells", format!("{} (x), {} (y)", window.x, window.y))
                .field("Statistic", config.stat),
        );
        let cube = compute_regional_ratio_with(&cube, &config.eta_name, &config.etp_name, &options)?;

        let cube = apply_time_window_mean(&cube, names::RATIO_LOCAL, config.time_window)?;
        let cube = apply_time_window_mean(&cube, names::RATIO_REGIONAL, config.time_window)?;
        self.report(
            Record::new("Applied temporal smoothing").field("Time window", config.time_window),
        );

        let cube = define_decision_thresholds(&cube, config)?;
        self.report(
            Record::new("Applied threshold decision rules")
                .field("Local field", &config.local_decision_field)
                .field("Regional field", &config.regional_decision_field),
        );

        let cube = apply_rules_rain(&cube)?;
        let cube = apply_rules_irrigation(&cube)?;
        let cube = classify_event(&cube, config.undecided_policy)?;

        let summary = summarize(&cube)?;
        self.report(
            Record::new("Irrigation delineation complete")
                .field("Irrigation cells", summary.irrigation_cells)
                .field("Rain cells", summary.rain_cells)
                .field("No-event cells", summary.no_event_cells)
                .field("Undecided cells", summary.undecided_cells),
        );
        log::info!(
            "Delineation complete: {} irrigation, {} rain, {} no-event cells",
            summary.irrigation_cells,
            summary.rain_cells,
            summary.no_event_cells
        );

        Ok(Delineation { cube, summary })
    }

    fn report(&self, record: Record) {
        self.reporter.report(&record);
    }
}

/// Count events in a classified cube
pub fn summarize(cube: &EtCube) -> CentumResult<EventSummary> {
    let events = cube.events(names::EVENT_TYPE)?;
    let irrigation = cube.flags(names::COND_IRRIGATION)?;
    let rain = cube.flags(names::COND_RAIN)?;

    let mut summary = EventSummary {
        total_cells: events.len(),
        ..Default::default()
    };

    for step in events.axis_iter(Axis(0)) {
        let mut irrigation_cells = 0;
        let mut rain_cells = 0;
        for event in step.iter() {
            match event {
                EventType::Irrigation => irrigation_cells += 1,
                EventType::Rain => rain_cells += 1,
                EventType::NoEvent => summary.no_event_cells += 1,
            }
        }
        summary.irrigation_cells += irrigation_cells;
        summary.rain_cells += rain_cells;
        summary.irrigation_per_step.push(irrigation_cells);
        summary.rain_per_step.push(rain_cells);
    }

    summary.undecided_cells = undecided_cells(irrigation, rain)
        .iter()
        .filter(|f| f.is_true())
        .count();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UndecidedPolicy;
    use crate::cube::Variable;
    use crate::io::MemoryReporter;
    use crate::types::{CentumError, Flag};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ndarray::Array3;

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn small_cube(eta: Array3<f64>, etp: Array3<f64>) -> EtCube {
        let (nt, ny, nx) = eta.dim();
        EtCube::new(
            days(nt),
            (0..ny).map(|i| i as f64 * 100.0).collect(),
            (0..nx).map(|j| j as f64 * 100.0).collect(),
        )
        .with_crs("EPSG:25830")
        .with_variable("ETa", Variable::Float(eta))
        .unwrap()
        .with_variable("ETp", Variable::Float(etp))
        .unwrap()
    }

    fn config() -> DelineationConfig {
        DelineationConfig {
            threshold_local: 1.25,
            threshold_regional: 1.25,
            window_size_x_m: 300.0,
            window_size_y_m: 300.0,
            time_window: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_reports_each_stage() {
        let cube = small_cube(Array3::ones((3, 4, 4)), Array3::ones((3, 4, 4)));
        let reporter = Arc::new(MemoryReporter::new());
        let delineator = IrrigationDelineator::new(config()).with_reporter(reporter.clone());

        let result = delineator.run(&cube).unwrap();
        assert_eq!(result.summary.total_cells, 48);
        assert_eq!(result.summary.no_event_cells, 48);
        assert_eq!(result.summary.irrigation_per_step, vec![0, 0, 0]);

        let titles = reporter.titles();
        assert_eq!(titles.first().map(String::as_str), Some("Starting irrigation delineation"));
        assert!(titles.contains(&"Data validation".to_string()));
        assert_eq!(titles.last().map(String::as_str), Some("Irrigation delineation complete"));

        let regional = reporter
            .records()
            .into_iter()
            .find(|r| r.title == "Computing regional ETa/ETp ratio")
            .unwrap();
        assert_eq!(regional.get("Window Cells"), Some("3 (x), 3 (y)"));
    }

    #[test]
    fn test_run_keeps_input_untouched() {
        let cube = small_cube(Array3::ones((2, 3, 3)), Array3::ones((2, 3, 3)));
        let result = IrrigationDelineator::new(config()).run(&cube).unwrap();
        assert!(!cube.contains(names::EVENT_TYPE));
        for name in [
            names::RATIO_LOCAL,
            names::RATIO_LOCAL_DIFF,
            names::RATIO_REGIONAL,
            names::RATIO_REGIONAL_DIFF,
            names::RATIO_LOCAL_TIME_AVG,
            names::RATIO_REGIONAL_TIME_AVG,
            names::THRESHOLD_LOCAL,
            names::THRESHOLD_REGIONAL,
            names::COND_RAIN,
            names::COND_IRRIGATION,
            names::EVENT_TYPE,
        ] {
            assert!(result.cube.contains(name), "missing {}", name);
        }
        assert!(!result.cube.contains(names::EVENT_UNDECIDED));
    }

    #[test]
    fn test_validation_failure_aborts() {
        let cube = EtCube::new(days(2), vec![0.0, 100.0], vec![0.0, 100.0])
            .with_variable("ETa", Variable::Float(Array3::ones((2, 2, 2))))
            .unwrap();
        match IrrigationDelineator::new(config()).run(&cube) {
            Err(CentumError::DataValidation(problems)) => assert_eq!(problems.len(), 2),
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_config_aborts_before_processing() {
        let cube = small_cube(Array3::ones((2, 3, 3)), Array3::ones((2, 3, 3)));
        let bad = DelineationConfig {
            time_window: 0,
            ..config()
        };
        let reporter = Arc::new(MemoryReporter::new());
        let result = IrrigationDelineator::new(bad)
            .with_reporter(reporter.clone())
            .run(&cube);
        assert!(matches!(result, Err(CentumError::InvalidParameter(_))));
        assert!(reporter.records().is_empty());
    }

    #[test]
    fn test_zero_etp_is_undecided_and_no_event() {
        let eta = Array3::from_elem((2, 3, 3), 2.0);
        let mut etp = Array3::ones((2, 3, 3));
        etp[[1, 1, 1]] = 0.0;
        let cube = small_cube(eta, etp);

        let flagged = DelineationConfig {
            undecided_policy: UndecidedPolicy::Flagged,
            ..config()
        };
        let result = IrrigationDelineator::new(flagged).run(&cube).unwrap();

        let ratio = result.cube.float(names::RATIO_LOCAL).unwrap();
        assert!(ratio[[1, 1, 1]].is_nan());
        assert_eq!(result.event_type().unwrap()[[1, 1, 1]], EventType::NoEvent);

        let undecided = result.cube.flags(names::EVENT_UNDECIDED).unwrap();
        assert_eq!(undecided[[1, 1, 1]], Flag::True);
        assert_eq!(result.summary.undecided_cells, 1);
    }
}
