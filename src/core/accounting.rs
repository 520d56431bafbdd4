//! Water accounting: ETa depths converted to per-pixel volumes and summed
//! over calendar periods

use crate::cube::{names, EtCube, Variable};
use crate::types::{CentumError, CentumResult, EtField};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MM_PER_M: f64 = 1000.0;

/// Calendar bins for volume aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccountingPeriod {
    /// Calendar months
    #[default]
    Month,
    /// January-June and July-December
    Semester,
}

impl AccountingPeriod {
    fn months(self) -> u32 {
        match self {
            AccountingPeriod::Month => 1,
            AccountingPeriod::Semester => 6,
        }
    }

    /// Sequential index of the period containing `time`
    fn index(self, time: &DateTime<Utc>) -> i64 {
        let month0 = time.month0() as i64;
        let per_year = 12 / self.months() as i64;
        time.year() as i64 * per_year + month0 / self.months() as i64
    }

    /// First instant of the period with sequential index `index`
    fn start(self, index: i64) -> CentumResult<DateTime<Utc>> {
        let per_year = 12 / self.months() as i64;
        let year = index.div_euclid(per_year);
        let month = index.rem_euclid(per_year) as u32 * self.months() + 1;
        i32::try_from(year)
            .ok()
            .and_then(|year| Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single())
            .ok_or_else(|| {
                CentumError::InvalidParameter(format!("period {}-{:02} is out of range", year, month))
            })
    }
}

impl std::fmt::Display for AccountingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountingPeriod::Month => write!(f, "month"),
            AccountingPeriod::Semester => write!(f, "semester"),
        }
    }
}

/// Area of one grid cell in m², assuming a regular grid in metres
pub fn pixel_area_m2(cube: &EtCube) -> CentumResult<f64> {
    let (dx, dy) = cube.resolution()?;
    Ok(dx * dy)
}

/// Convert a depth field in mm/day to m³/day per pixel
pub fn depth_to_volume(field: &EtField, pixel_area_m2: f64) -> EtField {
    field.mapv(|mm| mm / MM_PER_M * pixel_area_m2)
}

/// Sum a (time, y, x) field over calendar periods.
///
/// Every period from the first to the last timestamp gets an entry, labelled
/// by its first instant. NaN cells are skipped; a period without data sums
/// to zero.
pub fn aggregate_by_period(
    time: &[DateTime<Utc>],
    field: &EtField,
    period: AccountingPeriod,
) -> CentumResult<(Vec<DateTime<Utc>>, EtField)> {
    let (nt, ny, nx) = field.dim();
    if time.len() != nt {
        return Err(CentumError::Shape(format!(
            "{} timestamps for a field with {} time steps",
            time.len(),
            nt
        )));
    }

    let indices: Vec<i64> = time.iter().map(|t| period.index(t)).collect();
    let (Some(&first), Some(&last)) = (indices.iter().min(), indices.iter().max()) else {
        return Ok((Vec::new(), Array3::zeros((0, ny, nx))));
    };

    let n_periods = (last - first + 1) as usize;
    let mut sums = Array3::<f64>::zeros((n_periods, ny, nx));
    for (step, &index) in field.axis_iter(Axis(0)).zip(indices.iter()) {
        let mut bin = sums.index_axis_mut(Axis(0), (index - first) as usize);
        bin.zip_mut_with(&step, |acc, &v| {
            if !v.is_nan() {
                *acc += v;
            }
        });
    }

    let starts = (first..=last)
        .map(|index| period.start(index))
        .collect::<CentumResult<Vec<_>>>()?;
    Ok((starts, sums))
}

/// Volumes of `variable` (mm/day) summed per `period`.
///
/// Returns a cube whose time axis holds the period starts and whose
/// `volume_m3` variable holds the per-pixel volume in m³. CRS and spatial
/// coordinates are carried over.
pub fn compute_water_accounting(
    cube: &EtCube,
    variable: &str,
    period: AccountingPeriod,
) -> CentumResult<EtCube> {
    let time = cube.time().ok_or_else(|| {
        CentumError::Shape("water accounting needs a time dimension".to_string())
    })?;
    let depth = cube.float(variable)?;
    let area = pixel_area_m2(cube)?;

    log::info!(
        "Water accounting of '{}' per {} (pixel area {:.2} m²)",
        variable,
        period,
        area
    );

    let daily_volume = depth_to_volume(depth, area);
    let (starts, volumes) = aggregate_by_period(time, &daily_volume, period)?;
    log::debug!("Aggregated {} time steps into {} periods", time.len(), starts.len());

    let mut out = EtCube::new(starts, cube.y().to_vec(), cube.x().to_vec());
    if let Some(crs) = cube.crs() {
        out = out.with_crs(crs);
    }
    out.with_variable(names::VOLUME_M3, Variable::Float(volumes))
}

/// Total volume per period over the whole grid, keyed by period start
pub fn total_volume_per_period(accounting: &EtCube) -> CentumResult<BTreeMap<DateTime<Utc>, f64>> {
    let time = accounting.time().ok_or_else(|| {
        CentumError::Shape("accounting cube has no time dimension".to_string())
    })?;
    let volumes = accounting.float(names::VOLUME_M3)?;
    Ok(time
        .iter()
        .zip(volumes.axis_iter(Axis(0)))
        .map(|(t, step)| (*t, step.iter().filter(|v| !v.is_nan()).sum()))
        .collect())
}
