//! Local and regional ETa/ETp ratios
//!
//! The local ratio is evaluated pixel by pixel. The regional ratio divides a
//! spatial rolling mean of ETa by the same rolling mean of ETp, approximating
//! the ambient signal around each pixel (e.g. broad-scale rainfall). Both
//! ratios are also differenced over time.

use crate::core::temporal::window_span;
use crate::cube::{names, EtCube, Variable};
use crate::types::{AggregationStat, CentumError, CentumResult, EtField};
use ndarray::{s, Array2, Array3, ArrayView2, Axis, Zip};
use num_traits::Float;

/// Regional window parameters
#[derive(Debug, Clone)]
pub struct RegionalOptions {
    /// Window width in metres
    pub window_size_x_m: f64,
    /// Window height in metres
    pub window_size_y_m: f64,
    /// Aggregation statistic
    pub stat: AggregationStat,
    /// Process each time step in row blocks of this height (None = whole grid)
    pub chunk_rows: Option<usize>,
}

impl Default for RegionalOptions {
    fn default() -> Self {
        Self {
            window_size_x_m: 1000.0,
            window_size_y_m: 1000.0,
            stat: AggregationStat::Mean,
            chunk_rows: None,
        }
    }
}

/// Window size in cells along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCells {
    pub x: usize,
    pub y: usize,
}

/// `numerator / denominator`, NaN when the denominator is zero
pub fn safe_ratio<F: Float>(numerator: F, denominator: F) -> F {
    if denominator == F::zero() {
        F::nan()
    } else {
        numerator / denominator
    }
}

/// Convert a physical window size to a cell count:
/// `max(1, round(window_m / |resolution_m|))`
pub fn window_cells(window_m: f64, resolution_m: f64) -> CentumResult<usize> {
    if !(window_m.is_finite() && window_m > 0.0) {
        return Err(CentumError::InvalidParameter(format!(
            "window size must be a positive distance, got {}",
            window_m
        )));
    }
    let resolution = resolution_m.abs();
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(CentumError::InvalidParameter(format!(
            "grid resolution must be non-zero and finite, got {}",
            resolution_m
        )));
    }

    Ok(((window_m / resolution).round() as usize).max(1))
}

/// `|field[t] - field[t-1]|`; the first step has no predecessor and is NaN
pub fn abs_time_diff(field: &EtField) -> EtField {
    let (nt, ny, nx) = field.dim();
    let mut diff = Array3::from_elem((nt, ny, nx), f64::NAN);
    if nt < 2 {
        return diff;
    }

    Zip::from(diff.slice_mut(s![1.., .., ..]))
        .and(field.slice(s![1.., .., ..]))
        .and(field.slice(s![..-1, .., ..]))
        .for_each(|d, &current, &previous| *d = (current - previous).abs());
    diff
}

/// Add `ratio_local` (ETa / ETp) and `ratio_local_diff`.
///
/// Cells where ETp is zero, or where either input is NaN, are NaN.
pub fn compute_local_ratio(cube: &EtCube, eta_name: &str, etp_name: &str) -> CentumResult<EtCube> {
    let eta = cube.float(eta_name)?;
    let etp = cube.float(etp_name)?;

    log::info!("Computing local {}/{} ratio", eta_name, etp_name);

    let ratio = Zip::from(eta).and(etp).map_collect(|&a, &p| safe_ratio(a, p));
    let undefined = ratio.iter().filter(|v| v.is_nan()).count();
    if undefined > 0 {
        log::warn!("Local ratio is undefined for {} cells (missing data or zero ETp)", undefined);
    }
    let diff = abs_time_diff(&ratio);

    cube.with_variables([
        (names::RATIO_LOCAL, Variable::Float(ratio)),
        (names::RATIO_LOCAL_DIFF, Variable::Float(diff)),
    ])
}

/// Add `ratio_regional` and `ratio_regional_diff` using a mean window of
/// `window_size_x_m` by `window_size_y_m` metres
pub fn compute_regional_ratio(
    cube: &EtCube,
    eta_name: &str,
    etp_name: &str,
    window_size_x_m: f64,
    window_size_y_m: f64,
) -> CentumResult<EtCube> {
    let options = RegionalOptions {
        window_size_x_m,
        window_size_y_m,
        ..Default::default()
    };
    compute_regional_ratio_with(cube, eta_name, etp_name, &options)
}

/// Add `ratio_regional` and `ratio_regional_diff` with explicit options
pub fn compute_regional_ratio_with(
    cube: &EtCube,
    eta_name: &str,
    etp_name: &str,
    options: &RegionalOptions,
) -> CentumResult<EtCube> {
    let window = regional_window(cube, options)?;
    if options.chunk_rows == Some(0) {
        return Err(CentumError::InvalidParameter(
            "chunk_rows must be at least one row".to_string(),
        ));
    }

    let eta = cube.float(eta_name)?;
    let etp = cube.float(etp_name)?;

    log::info!(
        "Computing regional {}/{} ratio ({} over {}x{} cells)",
        eta_name, etp_name, options.stat, window.x, window.y
    );

    let (eta, etp) = paired_valid(eta, etp);
    let regional_eta = regional_statistic(&eta, window, options)?;
    let regional_etp = regional_statistic(&etp, window, options)?;

    let ratio = Zip::from(&regional_eta)
        .and(&regional_etp)
        .map_collect(|&a, &p| safe_ratio(a, p));
    let diff = abs_time_diff(&ratio);

    cube.with_variables([
        (names::RATIO_REGIONAL, Variable::Float(ratio)),
        (names::RATIO_REGIONAL_DIFF, Variable::Float(diff)),
    ])
}

/// Resolve the regional window for this cube's grid
pub fn regional_window(cube: &EtCube, options: &RegionalOptions) -> CentumResult<WindowCells> {
    let (x_resolution, y_resolution) = cube.resolution()?;
    let window = WindowCells {
        x: window_cells(options.window_size_x_m, x_resolution)?,
        y: window_cells(options.window_size_y_m, y_resolution)?,
    };

    let (_, ny, nx) = cube.dim();
    let mut problems = Vec::new();
    if window.x > nx {
        problems.push(format!("{} cells in x exceeds the {} available columns", window.x, nx));
    }
    if window.y > ny {
        problems.push(format!("{} cells in y exceeds the {} available rows", window.y, ny));
    }
    if !problems.is_empty() {
        return Err(CentumError::Shape(format!(
            "regional window too large: {}",
            problems.join("; ")
        )));
    }

    log::debug!(
        "Regional window {}m x {}m on a {:.2}m x {:.2}m grid -> {} x {} cells",
        options.window_size_x_m,
        options.window_size_y_m,
        x_resolution,
        y_resolution,
        window.x,
        window.y
    );
    Ok(window)
}

/// Mask ETa and ETp jointly: a cell is kept only where both are finite, so
/// the regional numerator and denominator average the same pixels.
pub fn paired_valid(eta: &EtField, etp: &EtField) -> (EtField, EtField) {
    let keep = Zip::from(eta)
        .and(etp)
        .map_collect(|&a, &p| a.is_finite() && p.is_finite());
    let masked = |field: &EtField| {
        Zip::from(field)
            .and(&keep)
            .map_collect(|&v, &k| if k { v } else { f64::NAN })
    };
    (masked(eta), masked(etp))
}

fn regional_statistic(
    field: &EtField,
    window: WindowCells,
    options: &RegionalOptions,
) -> CentumResult<EtField> {
    match options.stat {
        AggregationStat::Mean => Ok(spatial_rolling_mean(field, window, options.chunk_rows)),
    }
}

/// Centered spatial rolling mean of every time step.
///
/// Edge cells average over the part of the window inside the grid; NaN cells
/// are skipped and a window without any finite cell yields NaN.
pub fn spatial_rolling_mean(field: &EtField, window: WindowCells, chunk_rows: Option<usize>) -> EtField {
    let (nt, ny, nx) = field.dim();
    let mut out = Array3::from_elem((nt, ny, nx), f64::NAN);

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let slices: Vec<(usize, Array2<f64>)> = (0..nt)
            .into_par_iter()
            .map(|t| (t, rolling_mean_2d(field.index_axis(Axis(0), t), window, chunk_rows)))
            .collect();

        for (t, slice) in slices {
            out.index_axis_mut(Axis(0), t).assign(&slice);
        }
    }

    #[cfg(not(feature = "parallel"))]
    for t in 0..nt {
        let slice = rolling_mean_2d(field.index_axis(Axis(0), t), window, chunk_rows);
        out.index_axis_mut(Axis(0), t).assign(&slice);
    }

    out
}

/// Rolling mean of one (y, x) slice, optionally in row blocks.
///
/// Each block is computed from its rows plus a halo of `window.y / 2` rows
/// above and `window.y - 1 - window.y / 2` below, so blocking does not change
/// the result.
pub fn rolling_mean_2d(slice: ArrayView2<f64>, window: WindowCells, chunk_rows: Option<usize>) -> Array2<f64> {
    let (ny, nx) = slice.dim();
    let block = chunk_rows.unwrap_or(ny).max(1);
    let mut out = Array2::from_elem((ny, nx), f64::NAN);

    for r0 in (0..ny).step_by(block) {
        let r1 = (r0 + block).min(ny);
        let block_mean = rolling_mean_rows(slice, window, r0, r1);
        out.slice_mut(s![r0..r1, ..]).assign(&block_mean);
    }

    out
}

/// Rolling mean for output rows `r0..r1`
fn rolling_mean_rows(slice: ArrayView2<f64>, window: WindowCells, r0: usize, r1: usize) -> Array2<f64> {
    let (ny, nx) = slice.dim();
    let halo_start = window_span(r0, window.y, ny).0;
    let halo_end = window_span(r1 - 1, window.y, ny).1;

    // Horizontal pass over the block and its halo: finite sum and count
    let halo_rows = halo_end - halo_start;
    let mut row_sum = Array2::<f64>::zeros((halo_rows, nx));
    let mut row_count = Array2::<u32>::zeros((halo_rows, nx));
    for (h, row) in slice.slice(s![halo_start..halo_end, ..]).outer_iter().enumerate() {
        for j in 0..nx {
            let (c0, c1) = window_span(j, window.x, nx);
            let mut sum = 0.0;
            let mut count = 0u32;
            for &v in row.slice(s![c0..c1]).iter() {
                if v.is_finite() {
                    sum += v;
                    count += 1;
                }
            }
            row_sum[[h, j]] = sum;
            row_count[[h, j]] = count;
        }
    }

    // Vertical pass for the block rows only
    let mut out = Array2::from_elem((r1 - r0, nx), f64::NAN);
    for i in r0..r1 {
        let (w0, w1) = window_span(i, window.y, ny);
        for j in 0..nx {
            let mut sum = 0.0;
            let mut count = 0u32;
            for r in w0..w1 {
                sum += row_sum[[r - halo_start, j]];
                count += row_count[[r - halo_start, j]];
            }
            if count > 0 {
                out[[i - r0, j]] = sum / count as f64;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2020, 7, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn grid_cube(eta: EtField, etp: EtField, spacing: f64) -> EtCube {
        let (nt, ny, nx) = eta.dim();
        let y = (0..ny).map(|i| 1000.0 - i as f64 * spacing).collect();
        let x = (0..nx).map(|j| j as f64 * spacing).collect();
        EtCube::new(days(nt), y, x)
            .with_crs("EPSG:32630")
            .with_variable("ETa", Variable::Float(eta))
            .unwrap()
            .with_variable("ETp", Variable::Float(etp))
            .unwrap()
    }

    #[test]
    fn test_window_cells_rounding_and_floor() {
        assert_eq!(window_cells(1000.0, 30.0).unwrap(), 33);
        assert_eq!(window_cells(1000.0, 300.0).unwrap(), 3);
        assert_eq!(window_cells(10.0, 300.0).unwrap(), 1);
        assert_eq!(window_cells(1000.0, -30.0).unwrap(), 33);
    }

    #[test]
    fn test_window_cells_monotonic() {
        let mut previous = 0;
        for step in 1..200 {
            let cells = window_cells(step as f64 * 17.0, 250.0).unwrap();
            assert!(cells >= 1);
            assert!(cells >= previous);
            assert_eq!(cells, window_cells(step as f64 * 17.0, -250.0).unwrap());
            previous = cells;
        }
    }

    #[test]
    fn test_window_cells_rejects_bad_input() {
        assert!(window_cells(0.0, 30.0).is_err());
        assert!(window_cells(-5.0, 30.0).is_err());
        assert!(window_cells(f64::NAN, 30.0).is_err());
        assert!(window_cells(100.0, 0.0).is_err());
    }

    #[test]
    fn test_local_ratio_and_diff() {
        let eta = Array3::from_shape_vec((3, 1, 2), vec![1.0, 2.0, 2.0, 2.0, 1.0, 3.0]).unwrap();
        let etp = Array3::from_shape_vec((3, 1, 2), vec![2.0, 0.0, 2.0, 4.0, 2.0, 4.0]).unwrap();
        let cube = grid_cube(eta, etp, 30.0);

        let out = compute_local_ratio(&cube, "ETa", "ETp").unwrap();
        let ratio = out.float(names::RATIO_LOCAL).unwrap();
        let diff = out.float(names::RATIO_LOCAL_DIFF).unwrap();

        assert_relative_eq!(ratio[[0, 0, 0]], 0.5);
        assert!(ratio[[0, 0, 1]].is_nan(), "zero ETp must give NaN");
        assert_relative_eq!(ratio[[1, 0, 0]], 1.0);
        assert_relative_eq!(ratio[[2, 0, 1]], 0.75);

        assert!(diff[[0, 0, 0]].is_nan());
        assert_relative_eq!(diff[[1, 0, 0]], 0.5);
        assert_relative_eq!(diff[[2, 0, 0]], 0.5);
        assert!(diff[[1, 0, 1]].is_nan());
        assert_relative_eq!(diff[[2, 0, 1]], 0.25);

        // Input fields are carried along untouched
        assert!(out.contains("ETa"));
        assert!(!cube.contains(names::RATIO_LOCAL));
    }

    #[test]
    fn test_rolling_mean_partial_edges() {
        let slice = Array2::from_shape_vec((3, 3), vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ]).unwrap();
        let out = rolling_mean_2d(slice.view(), WindowCells { x: 3, y: 3 }, None);

        assert_relative_eq!(out[[1, 1]], 5.0);
        // Corner averages its 2x2 neighbourhood
        assert_relative_eq!(out[[0, 0]], 3.0);
        assert_relative_eq!(out[[2, 2]], 7.0);
        // Edge averages its 2x3 neighbourhood
        assert_relative_eq!(out[[0, 1]], 3.5);
    }

    #[test]
    fn test_rolling_mean_skips_nan() {
        let mut slice = Array2::from_elem((3, 3), 2.0);
        slice[[1, 1]] = f64::NAN;
        let out = rolling_mean_2d(slice.view(), WindowCells { x: 3, y: 3 }, None);
        assert_relative_eq!(out[[1, 1]], 2.0);

        let empty = Array2::from_elem((2, 2), f64::NAN);
        let out = rolling_mean_2d(empty.view(), WindowCells { x: 1, y: 1 }, None);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_chunked_rolling_mean_is_identical() {
        let slice = Array2::from_shape_fn((37, 23), |(i, j)| {
            ((i * 31 + j * 17) % 13) as f64 * 0.37 + (i as f64).sin()
        });
        for window in [WindowCells { x: 5, y: 7 }, WindowCells { x: 4, y: 6 }, WindowCells { x: 1, y: 1 }] {
            let whole = rolling_mean_2d(slice.view(), window, None);
            for chunk in [1, 3, 8, 36, 100] {
                let chunked = rolling_mean_2d(slice.view(), window, Some(chunk));
                assert_eq!(whole, chunked, "chunk {} window {:?}", chunk, window);
            }
        }
    }

    #[test]
    fn test_regional_ratio_uniform_field() {
        let eta = Array3::from_elem((2, 5, 5), 3.0);
        let etp = Array3::from_elem((2, 5, 5), 4.0);
        let cube = grid_cube(eta, etp, 100.0);

        let out = compute_regional_ratio(&cube, "ETa", "ETp", 300.0, 300.0).unwrap();
        let ratio = out.float(names::RATIO_REGIONAL).unwrap();
        let diff = out.float(names::RATIO_REGIONAL_DIFF).unwrap();

        for &v in ratio.iter() {
            assert_relative_eq!(v, 0.75);
        }
        assert!(diff.index_axis(Axis(0), 0).iter().all(|v| v.is_nan()));
        assert!(diff.index_axis(Axis(0), 1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_regional_ratio_averages_before_dividing() {
        let eta = Array3::from_shape_vec((1, 2, 2), vec![1.0, 3.0, 1.0, 3.0]).unwrap();
        let etp = Array3::from_shape_vec((1, 2, 2), vec![1.0, 1.0, 1.0, 3.0]).unwrap();
        let cube = grid_cube(eta, etp, 100.0);

        let out = compute_regional_ratio(&cube, "ETa", "ETp", 200.0, 200.0).unwrap();
        let ratio = out.float(names::RATIO_REGIONAL).unwrap();

        // A 2-cell window around index 1 covers indices 0 and 1, so cell (1, 1)
        // sees the whole grid: mean ETa 2.0 / mean ETp 1.5. The mean of the
        // per-pixel ratios would be 1.5 instead.
        assert_relative_eq!(ratio[[0, 1, 1]], 2.0 / 1.5);
        // Cell (0, 0) only sees itself
        assert_relative_eq!(ratio[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_regional_ratio_excludes_half_missing_pixels() {
        // Cloud hole in ETa over a pixel with a large ETp
        let mut eta = Array3::ones((1, 2, 2));
        eta[[0, 0, 0]] = f64::NAN;
        let mut etp = Array3::ones((1, 2, 2));
        etp[[0, 0, 0]] = 10.0;
        let cube = grid_cube(eta, etp, 100.0);

        let out = compute_regional_ratio(&cube, "ETa", "ETp", 200.0, 200.0).unwrap();
        let ratio = out.float(names::RATIO_REGIONAL).unwrap();

        assert_relative_eq!(ratio[[0, 1, 1]], 1.0);
        assert_relative_eq!(ratio[[0, 0, 1]], 1.0);
        // The hole only sees itself and has nothing left to average
        assert!(ratio[[0, 0, 0]].is_nan());
    }

    #[test]
    fn test_paired_valid_masks_both_fields() {
        let eta = Array3::from_shape_vec((1, 1, 3), vec![f64::NAN, 2.0, 3.0]).unwrap();
        let etp = Array3::from_shape_vec((1, 1, 3), vec![1.0, f64::INFINITY, 4.0]).unwrap();
        let (eta, etp) = paired_valid(&eta, &etp);
        assert!(eta[[0, 0, 0]].is_nan() && etp[[0, 0, 0]].is_nan());
        assert!(eta[[0, 0, 1]].is_nan() && etp[[0, 0, 1]].is_nan());
        assert_eq!((eta[[0, 0, 2]], etp[[0, 0, 2]]), (3.0, 4.0));
    }

    #[test]
    fn test_regional_ratio_requires_spatial_dims() {
        let cube = EtCube::new(days(2), vec![0.0], vec![])
            .with_variable("ETa", Variable::Float(Array3::zeros((2, 1, 0))))
            .unwrap()
            .with_variable("ETp", Variable::Float(Array3::zeros((2, 1, 0))))
            .unwrap();
        assert!(matches!(
            compute_regional_ratio(&cube, "ETa", "ETp", 100.0, 100.0),
            Err(CentumError::Shape(_))
        ));
    }

    #[test]
    fn test_regional_window_larger_than_grid() {
        let cube = grid_cube(Array3::ones((1, 4, 4)), Array3::ones((1, 4, 4)), 10.0);
        match compute_regional_ratio(&cube, "ETa", "ETp", 1000.0, 20.0) {
            Err(CentumError::Shape(message)) => {
                assert!(message.contains("x"));
                assert!(!message.contains("rows"));
            }
            other => panic!("expected shape error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_safe_ratio_generic() {
        assert!(safe_ratio(1.0f32, 0.0f32).is_nan());
        assert_eq!(safe_ratio(1.0f64, 4.0f64), 0.25);
    }
}
