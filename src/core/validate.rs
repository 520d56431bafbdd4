use crate::core::temporal::{step_gaps_days, MAX_GAP_DAYS};
use crate::cube::{EtCube, Variable};
use crate::io::{Record, Reporter};
use crate::types::{CentumError, CentumResult};

/// Outcome of a successful validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Problems that abort processing (always empty on success)
    pub fatal: Vec<String>,
    /// Problems that are reported but do not stop processing
    pub advisory: Vec<String>,
    /// Number of NaN cells in ETa
    pub missing_eta: usize,
    /// Number of NaN cells in ETp
    pub missing_etp: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.fatal.is_empty() && self.advisory.is_empty()
    }
}

/// Check the structural prerequisites of an input cube.
///
/// Every problem is collected before returning. A missing time axis, a gap
/// longer than [`MAX_GAP_DAYS`], non-increasing timestamps, a missing or
/// non-numeric ETa/ETp variable and a missing spatial reference are fatal.
/// Missing pixels and near-daily (but not exactly daily) sampling are
/// advisory. A report record is emitted in both cases.
pub fn validate(
    cube: &EtCube,
    eta_name: &str,
    etp_name: &str,
    reporter: &dyn Reporter,
) -> CentumResult<ValidationReport> {
    let mut report = ValidationReport::default();

    match cube.time() {
        None => report
            .fatal
            .push("Time dimension is missing in the dataset".to_string()),
        Some(time) => {
            let gaps = step_gaps_days(time);
            let non_increasing = gaps.iter().filter(|&&g| g <= 0.0).count();
            let long_gaps: Vec<usize> = gaps
                .iter()
                .enumerate()
                .filter(|(_, &g)| g > MAX_GAP_DAYS)
                .map(|(i, _)| i + 1)
                .collect();
            let irregular = gaps
                .iter()
                .filter(|&&g| g > 0.0 && g <= MAX_GAP_DAYS && (g - 1.0).abs() > f64::EPSILON)
                .count();

            if non_increasing > 0 {
                report.fatal.push(format!(
                    "Timestamps must be strictly increasing ({} non-increasing step(s))",
                    non_increasing
                ));
            }
            if !long_gaps.is_empty() {
                report.fatal.push(format!(
                    "Time data gaps detected before step(s) {:?}; daily ETa values must be continuous",
                    long_gaps
                ));
            }
            if irregular > 0 {
                report.advisory.push(format!(
                    "{} time step(s) are near-daily but not exactly one day apart",
                    irregular
                ));
            }
        }
    }

    report.missing_eta = check_variable(cube, eta_name, "ETa", &mut report);
    report.missing_etp = check_variable(cube, etp_name, "ETp", &mut report);

    if cube.crs().is_none() {
        report
            .fatal
            .push("CRS information is missing; all inputs must share one projection".to_string());
    }

    let mut record = Record::new("Data validation")
        .field("Fatal issues", report.fatal.len())
        .field("Advisories", report.advisory.len())
        .field("Missing ETa pixels", report.missing_eta)
        .field("Missing ETp pixels", report.missing_etp);
    for issue in report.fatal.iter().chain(report.advisory.iter()) {
        record = record.field("Issue", issue);
    }
    reporter.report(&record);

    for advisory in &report.advisory {
        log::warn!("{}", advisory);
    }

    if !report.fatal.is_empty() {
        return Err(CentumError::DataValidation(report.fatal));
    }

    log::info!("Data validation passed");
    Ok(report)
}

/// Record missing-variable problems and return the NaN count
fn check_variable(cube: &EtCube, name: &str, label: &str, report: &mut ValidationReport) -> usize {
    match cube.variable(name) {
        None => {
            report
                .fatal
                .push(format!("{} variable '{}' is missing in the dataset", label, name));
            0
        }
        Some(Variable::Float(field)) => {
            let missing = field.iter().filter(|v| v.is_nan()).count();
            if missing > 0 {
                report
                    .advisory
                    .push(format!("{} contains {} missing pixels", label, missing));
            }
            missing
        }
        Some(other) => {
            report.fatal.push(format!(
                "{} variable '{}' must be a numeric (time, y, x) field, found a {} field",
                label,
                name,
                other.kind()
            ));
            0
        }
    }
}
