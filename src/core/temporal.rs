use crate::cube::{names, EtCube, Variable};
use crate::types::{CentumError, CentumResult, EtField};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Axis};

/// Largest step (in days) the temporal smoother will average across.
/// Allows near-daily sampling without bridging real gaps.
pub const MAX_GAP_DAYS: f64 = 1.1;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Delta between consecutive timestamps, in days (`n - 1` values)
pub fn step_gaps_days(time: &[DateTime<Utc>]) -> Vec<f64> {
    time.windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / MILLIS_PER_DAY)
        .collect()
}

/// Per-step validity for temporal smoothing.
///
/// The first step is always valid; step `i` is valid when the gap from step
/// `i - 1` is at most [`MAX_GAP_DAYS`].
pub fn gap_mask(time: &[DateTime<Utc>]) -> Vec<bool> {
    if time.is_empty() {
        return Vec::new();
    }
    std::iter::once(true)
        .chain(step_gaps_days(time).into_iter().map(|g| g <= MAX_GAP_DAYS))
        .collect()
}

/// Index range `[start, end)` of a centered window of `window` cells around
/// `index`, clipped to `[0, len)`.
///
/// The window spans `window / 2` cells before the index and
/// `window - 1 - window / 2` after it, so even windows lean towards the
/// earlier side: `window = 4` around `i` covers `i-2..=i+1`.
pub fn window_span(index: usize, window: usize, len: usize) -> (usize, usize) {
    let before = window / 2;
    let after = window.saturating_sub(1) - before;
    (index.saturating_sub(before), (index + after + 1).min(len))
}

/// Centered rolling mean over the time axis.
///
/// A step gets a value only if its whole window lies inside the series and
/// every step in the window is valid in `valid_steps`; otherwise it is NaN.
/// NaN cells inside a complete window propagate to the result.
pub fn rolling_time_mean(field: &EtField, valid_steps: &[bool], window: usize) -> CentumResult<EtField> {
    let (nt, ny, nx) = field.dim();
    if valid_steps.len() != nt {
        return Err(CentumError::Shape(format!(
            "step mask has {} entries for {} time steps",
            valid_steps.len(),
            nt
        )));
    }
    let mut out = Array3::from_elem((nt, ny, nx), f64::NAN);
    if window == 0 {
        return Ok(out);
    }

    for t in 0..nt {
        let (start, end) = window_span(t, window, nt);
        if end - start < window {
            continue;
        }
        if !valid_steps[start..end].iter().all(|&v| v) {
            continue;
        }

        let mut acc = Array2::<f64>::zeros((ny, nx));
        for s in start..end {
            acc += &field.index_axis(Axis(0), s);
        }
        acc /= window as f64;
        out.index_axis_mut(Axis(0), t).assign(&acc);
    }

    Ok(out)
}

/// Add `{field}_time_avg`: the centered rolling mean of `field` over
/// `window` time steps, never averaging across a gap longer than
/// [`MAX_GAP_DAYS`].
pub fn apply_time_window_mean(cube: &EtCube, field: &str, window: usize) -> CentumResult<EtCube> {
    if window == 0 {
        return Err(CentumError::InvalidParameter(
            "time window must be a positive number of steps".to_string(),
        ));
    }
    let time = cube.time().ok_or_else(|| {
        CentumError::Shape("temporal smoothing needs a time dimension".to_string())
    })?;
    if window > time.len() {
        return Err(CentumError::Shape(format!(
            "time window of {} steps exceeds the {} available time steps",
            window,
            time.len()
        )));
    }

    let values = cube.float(field)?;
    let mask = gap_mask(time);
    let masked_steps = mask.iter().filter(|&&valid| !valid).count();
    if masked_steps > 0 {
        log::warn!(
            "{} time step(s) follow a gap longer than {} days and are excluded from '{}' smoothing",
            masked_steps,
            MAX_GAP_DAYS,
            field
        );
    }
    log::debug!("Rolling time mean of '{}' over {} steps", field, window);

    let smoothed = rolling_time_mean(values, &mask, window)?;
    cube.with_variable(names::time_avg(field), Variable::Float(smoothed))
}
