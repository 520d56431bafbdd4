//! Centum: irrigation and rain event delineation from ET raster time series
//!
//! This library classifies every pixel and time step of an ETa/ETp data cube
//! as irrigation, rain or no water input, by comparing local and regional
//! ETa/ETp ratios over time.

pub mod types;
pub mod cube;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AggregationStat, CentumError, CentumResult, EtField, EventField, EventType, Flag, FlagField,
};
pub use cube::{names, EtCube, Variable};
pub use config::{DelineationConfig, UndecidedPolicy};
pub use io::{LogReporter, MarkdownReporter, MemoryReporter, NullReporter, Record, Reporter};
pub use crate::core::{
    compute_water_accounting, AccountingPeriod, Delineation, EventSummary, IrrigationDelineator,
};

#[cfg(feature = "python")]
mod python {
    use crate::config::DelineationConfig;
    use crate::core::IrrigationDelineator;
    use crate::cube::{names, EtCube, Variable};
    use crate::types::CentumError;
    use chrono::{DateTime, Utc};
    use numpy::{PyReadonlyArray3, ToPyArray};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    fn to_py_err(err: CentumError) -> PyErr {
        match err {
            CentumError::DataValidation(_)
            | CentumError::Shape(_)
            | CentumError::InvalidParameter(_)
            | CentumError::MissingVariable(_)
            | CentumError::VariableKind { .. } => PyValueError::new_err(err.to_string()),
            CentumError::Io(_) => PyRuntimeError::new_err(err.to_string()),
        }
    }

    /// Run the delineation on ETa/ETp cubes shaped (time, y, x).
    ///
    /// `time` holds Unix timestamps in seconds.
    #[pyfunction]
    #[pyo3(signature = (
        time, y, x, eta, etp,
        crs = None,
        threshold_local = 0.25,
        threshold_regional = 0.25,
        window_size_x = 1000.0,
        window_size_y = 1000.0,
        time_window = 10,
        validate = true,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn delineate(
        py: Python,
        time: Vec<i64>,
        y: Vec<f64>,
        x: Vec<f64>,
        eta: PyReadonlyArray3<f64>,
        etp: PyReadonlyArray3<f64>,
        crs: Option<String>,
        threshold_local: f64,
        threshold_regional: f64,
        window_size_x: f64,
        window_size_y: f64,
        time_window: usize,
        validate: bool,
    ) -> PyResult<PyObject> {
        let timestamps = time
            .iter()
            .map(|&secs| {
                DateTime::<Utc>::from_timestamp(secs, 0)
                    .ok_or_else(|| PyValueError::new_err(format!("Invalid timestamp: {}", secs)))
            })
            .collect::<PyResult<Vec<_>>>()?;

        let mut cube = EtCube::new(timestamps, y, x);
        if let Some(crs) = crs {
            cube = cube.with_crs(crs);
        }
        let config = DelineationConfig {
            threshold_local,
            threshold_regional,
            window_size_x_m: window_size_x,
            window_size_y_m: window_size_y,
            time_window,
            validate_input: validate,
            ..Default::default()
        };
        let cube = cube
            .with_variable(config.eta_name.clone(), Variable::Float(eta.as_array().to_owned()))
            .and_then(|c| {
                c.with_variable(config.etp_name.clone(), Variable::Float(etp.as_array().to_owned()))
            })
            .map_err(to_py_err)?;

        let result = IrrigationDelineator::new(config)
            .run(&cube)
            .map_err(to_py_err)?;

        let out = PyDict::new(py);
        for name in [
            names::RATIO_LOCAL,
            names::RATIO_REGIONAL,
            names::RATIO_LOCAL_TIME_AVG,
            names::RATIO_REGIONAL_TIME_AVG,
            names::THRESHOLD_LOCAL,
            names::THRESHOLD_REGIONAL,
            names::COND_RAIN,
            names::COND_IRRIGATION,
        ] {
            let values = result.cube.numeric(name).map_err(to_py_err)?;
            out.set_item(name, values.to_pyarray(py))?;
        }
        let events = result.event_type().map_err(to_py_err)?.mapv(|e| e.code());
        out.set_item(names::EVENT_TYPE, events.to_pyarray(py))?;
        out.set_item("irrigation_cells", result.summary.irrigation_cells)?;
        out.set_item("rain_cells", result.summary.rain_cells)?;

        Ok(out.into())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(delineate, m)?)?;
        m.add("MAX_GAP_DAYS", crate::core::MAX_GAP_DAYS)?;
        m.add("IRRIGATION_MARGIN", crate::core::IRRIGATION_MARGIN)?;
        Ok(())
    }
}
