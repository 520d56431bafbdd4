use centum::core::ratio::{rolling_mean_2d, spatial_rolling_mean, window_cells, WindowCells};
use centum::core::{compute_regional_ratio_with, RegionalOptions};
use centum::{names, EtCube, Variable};
use chrono::{Duration, TimeZone, Utc};
use ndarray::{Array3, Axis};

fn synthetic_field(nt: usize, ny: usize, nx: usize) -> Array3<f64> {
    Array3::from_shape_fn((nt, ny, nx), |(t, i, j)| {
        let value = 2.0 + ((t * 7 + i * 3 + j * 5) % 11) as f64 * 0.25 + (j as f64 * 0.1).cos();
        // Sprinkle missing pixels
        if (t + i * j) % 29 == 0 {
            f64::NAN
        } else {
            value
        }
    })
}

#[test]
fn test_time_steps_match_single_slice_reference() {
    let field = synthetic_field(6, 31, 27);
    let window = WindowCells { x: 6, y: 9 };

    let cube_mean = spatial_rolling_mean(&field, window, None);
    for (t, slice) in field.axis_iter(Axis(0)).enumerate() {
        let reference = rolling_mean_2d(slice, window, None);
        let computed = cube_mean.index_axis(Axis(0), t);
        for (a, b) in computed.iter().zip(reference.iter()) {
            assert!(
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
                "step {}: {} vs {}",
                t,
                a,
                b
            );
        }
    }
}

#[test]
fn test_chunked_regional_ratio_is_bit_identical() {
    let (nt, ny, nx) = (4, 40, 33);
    let start = Utc.with_ymd_and_hms(2019, 8, 1, 0, 0, 0).unwrap();
    let cube = EtCube::new(
        (0..nt).map(|i| start + Duration::days(i as i64)).collect(),
        (0..ny).map(|i| i as f64 * 20.0).collect(),
        (0..nx).map(|j| j as f64 * 20.0).collect(),
    )
    .with_crs("EPSG:32629")
    .with_variable("ETa", Variable::Float(synthetic_field(nt, ny, nx)))
    .unwrap()
    .with_variable("ETp", Variable::Float(synthetic_field(nt, ny, nx).mapv(|v| v + 1.5)))
    .unwrap();

    let whole = RegionalOptions {
        window_size_x_m: 150.0,
        window_size_y_m: 230.0,
        ..Default::default()
    };
    let reference = compute_regional_ratio_with(&cube, "ETa", "ETp", &whole).unwrap();
    let reference = reference.float(names::RATIO_REGIONAL).unwrap();

    for chunk_rows in [1, 4, 7, 39, 64] {
        let chunked = RegionalOptions {
            chunk_rows: Some(chunk_rows),
            ..whole.clone()
        };
        let out = compute_regional_ratio_with(&cube, "ETa", "ETp", &chunked).unwrap();
        let ratio = out.float(names::RATIO_REGIONAL).unwrap();

        for (a, b) in ratio.iter().zip(reference.iter()) {
            assert!(
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
                "chunk_rows {}: {} vs {}",
                chunk_rows,
                a,
                b
            );
        }
    }
}

#[test]
fn test_window_cells_follow_requested_distance() {
    // 30 m Landsat-like grid
    assert_eq!(window_cells(1000.0, 30.0).unwrap(), 33);
    assert_eq!(window_cells(1000.0, -30.0).unwrap(), 33);
    assert_eq!(window_cells(14.0, 30.0).unwrap(), 1);
    assert_eq!(window_cells(45.0, 30.0).unwrap(), 2);

    let sizes: Vec<usize> = (1..=50)
        .map(|k| window_cells(k as f64 * 10.0, 30.0).unwrap())
        .collect();
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    assert!(sizes.iter().all(|&c| c >= 1));
}
