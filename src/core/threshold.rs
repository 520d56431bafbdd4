use crate::config::DelineationConfig;
use crate::cube::{names, EtCube, Variable};
use crate::types::{CentumError, CentumResult, EtField, Flag, FlagField};

/// Flag one value against a significance boundary.
///
/// The boundary is crossed in the upward direction only: `value > threshold`
/// is `True`, `value <= threshold` is `False` (equality does not count), and
/// NaN is `Undecided`.
pub fn exceeds(value: f64, threshold: f64) -> Flag {
    if value.is_nan() {
        Flag::Undecided
    } else {
        Flag::from_bool(value > threshold)
    }
}

/// Flag every cell of a numeric field, see [`exceeds`]
pub fn threshold_field(values: &EtField, threshold: f64) -> FlagField {
    values.mapv(|v| exceeds(v, threshold))
}

/// Classify `field` against `threshold`.
///
/// A field that is already a flag field has been classified and is returned
/// unchanged, whatever the threshold.
pub fn classify_threshold(cube: &EtCube, field: &str, threshold: f64) -> CentumResult<FlagField> {
    if !threshold.is_finite() {
        return Err(CentumError::InvalidParameter(format!(
            "threshold for '{}' must be finite, got {}",
            field, threshold
        )));
    }
    match cube.variable(field) {
        Some(Variable::Flag(flags)) => Ok(flags.clone()),
        _ => Ok(threshold_field(cube.float(field)?, threshold)),
    }
}

/// Classify `field` and store the flags as `output`
pub fn apply_threshold(cube: &EtCube, field: &str, threshold: f64, output: &str) -> CentumResult<EtCube> {
    let flags = classify_threshold(cube, field, threshold)?;
    let raised = flags.iter().filter(|f| f.is_true()).count();
    let undecided = flags.iter().filter(|f| f.is_undecided()).count();
    log::debug!(
        "{}: '{}' > {} in {} cells ({} undecided)",
        output, field, threshold, raised, undecided
    );
    cube.with_variable(output, Variable::Flag(flags))
}

/// Add `threshold_local` and `threshold_regional` from the configured
/// decision fields and thresholds
pub fn define_decision_thresholds(cube: &EtCube, config: &DelineationConfig) -> CentumResult<EtCube> {
    let cube = apply_threshold(
        cube,
        &config.local_decision_field,
        config.threshold_local,
        names::THRESHOLD_LOCAL,
    )?;
    apply_threshold(
        &cube,
        &config.regional_decision_field,
        config.threshold_regional,
        names::THRESHOLD_REGIONAL,
    )
}
