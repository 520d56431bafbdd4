//! Spatiotemporal data cube shared by every pipeline stage
//!
//! An [`EtCube`] holds coordinate arrays for `(time, y, x)`, an optional
//! spatial reference tag and a set of named variables. Variables are stored
//! behind `Arc`, so adding a derived field returns a new cube that shares
//! every untouched array with its parent.

use crate::types::{
    CentumError, CentumResult, EtField, EtGrid, EventField, Flag, FlagField,
};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Names of the fields produced by the pipeline
pub mod names {
    pub const RATIO_LOCAL: &str = "ratio_local";
    pub const RATIO_LOCAL_DIFF: &str = "ratio_local_diff";
    pub const RATIO_REGIONAL: &str = "ratio_regional";
    pub const RATIO_REGIONAL_DIFF: &str = "ratio_regional_diff";
    pub const TIME_AVG_SUFFIX: &str = "_time_avg";
    pub const RATIO_LOCAL_TIME_AVG: &str = "ratio_local_time_avg";
    pub const RATIO_REGIONAL_TIME_AVG: &str = "ratio_regional_time_avg";
    pub const THRESHOLD_LOCAL: &str = "threshold_local";
    pub const THRESHOLD_REGIONAL: &str = "threshold_regional";
    pub const COND_RAIN_THRESHOLD: &str = "condRain1";
    pub const COND_RAIN_DOMINANCE: &str = "condRain2";
    pub const COND_RAIN: &str = "condRain";
    pub const COND_IRRIGATION_THRESHOLD: &str = "condIrrigation1";
    pub const COND_IRRIGATION_DOMINANCE: &str = "condIrrigation2";
    pub const COND_IRRIGATION: &str = "condIrrigation";
    pub const EVENT_TYPE: &str = "event_type";
    pub const EVENT_UNDECIDED: &str = "event_undecided";
    pub const VOLUME_M3: &str = "volume_m3";

    /// `{field}_time_avg`
    pub fn time_avg(field: &str) -> String {
        format!("{}{}", field, TIME_AVG_SUFFIX)
    }
}

/// A named field stored in the cube
#[derive(Debug, Clone)]
pub enum Variable {
    /// Numeric (time, y, x) field
    Float(EtField),
    /// Tri-state boolean (time, y, x) field
    Flag(FlagField),
    /// Categorical (time, y, x) field
    Event(EventField),
    /// Numeric (y, x) field without a time axis
    Static(EtGrid),
}

impl Variable {
    pub fn kind(&self) -> &'static str {
        match self {
            Variable::Float(_) => "float",
            Variable::Flag(_) => "flag",
            Variable::Event(_) => "event",
            Variable::Static(_) => "static",
        }
    }

    pub fn is_temporal(&self) -> bool {
        !matches!(self, Variable::Static(_))
    }

    fn shape(&self) -> Vec<usize> {
        match self {
            Variable::Float(a) => a.shape().to_vec(),
            Variable::Flag(a) => a.shape().to_vec(),
            Variable::Event(a) => a.shape().to_vec(),
            Variable::Static(a) => a.shape().to_vec(),
        }
    }
}

/// Spatiotemporal cube of ET variables
#[derive(Debug, Clone)]
pub struct EtCube {
    time: Option<Vec<DateTime<Utc>>>,
    y: Vec<f64>,
    x: Vec<f64>,
    crs: Option<String>,
    variables: BTreeMap<String, Arc<Variable>>,
}

impl EtCube {
    /// Create an empty cube over the given coordinates
    pub fn new(time: Vec<DateTime<Utc>>, y: Vec<f64>, x: Vec<f64>) -> Self {
        Self {
            time: Some(time),
            y,
            x,
            crs: None,
            variables: BTreeMap::new(),
        }
    }

    /// Create a cube with spatial coordinates only. Only static variables
    /// can be added to it.
    pub fn without_time(y: Vec<f64>, x: Vec<f64>) -> Self {
        Self {
            time: None,
            y,
            x,
            crs: None,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn time(&self) -> Option<&[DateTime<Utc>]> {
        self.time.as_deref()
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Shape (time, y, x) of temporal variables. The time length is zero when
    /// the cube has no time axis.
    pub fn dim(&self) -> (usize, usize, usize) {
        let nt = self.time.as_ref().map_or(0, |t| t.len());
        (nt, self.y.len(), self.x.len())
    }

    /// Grid spacing `(|dx|, |dy|)` from the first two coordinates of each axis
    pub fn resolution(&self) -> CentumResult<(f64, f64)> {
        let mut missing = Vec::new();
        if self.x.len() < 2 {
            missing.push("x");
        }
        if self.y.len() < 2 {
            missing.push("y");
        }
        if !missing.is_empty() {
            return Err(CentumError::Shape(format!(
                "cannot derive grid resolution: spatial dimension(s) {} need at least two coordinates",
                missing.join(", ")
            )));
        }

        Ok(((self.x[1] - self.x[0]).abs(), (self.y[1] - self.y[0]).abs()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name).map(|v| v.as_ref())
    }

    fn require(&self, name: &str) -> CentumResult<&Variable> {
        self.variable(name)
            .ok_or_else(|| CentumError::MissingVariable(name.to_string()))
    }

    pub fn float(&self, name: &str) -> CentumResult<&EtField> {
        match self.require(name)? {
            Variable::Float(a) => Ok(a),
            _ => Err(CentumError::VariableKind {
                name: name.to_string(),
                expected: "float",
            }),
        }
    }

    pub fn flags(&self, name: &str) -> CentumResult<&FlagField> {
        match self.require(name)? {
            Variable::Flag(a) => Ok(a),
            _ => Err(CentumError::VariableKind {
                name: name.to_string(),
                expected: "flag",
            }),
        }
    }

    pub fn events(&self, name: &str) -> CentumResult<&EventField> {
        match self.require(name)? {
            Variable::Event(a) => Ok(a),
            _ => Err(CentumError::VariableKind {
                name: name.to_string(),
                expected: "event",
            }),
        }
    }

    pub fn grid(&self, name: &str) -> CentumResult<&EtGrid> {
        match self.require(name)? {
            Variable::Static(a) => Ok(a),
            _ => Err(CentumError::VariableKind {
                name: name.to_string(),
                expected: "static",
            }),
        }
    }

    /// Numeric view of a temporal field: float fields are borrowed, flag
    /// fields are converted to 1.0 / 0.0 / NaN.
    pub fn numeric(&self, name: &str) -> CentumResult<Cow<'_, EtField>> {
        match self.require(name)? {
            Variable::Float(a) => Ok(Cow::Borrowed(a)),
            Variable::Flag(a) => Ok(Cow::Owned(a.mapv(Flag::as_f64))),
            _ => Err(CentumError::VariableKind {
                name: name.to_string(),
                expected: "float or flag",
            }),
        }
    }

    /// Add or replace a variable in place after checking its shape
    pub fn insert(&mut self, name: impl Into<String>, variable: Variable) -> CentumResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(CentumError::InvalidParameter(
                "variable name must not be empty".to_string(),
            ));
        }

        let expected = if variable.is_temporal() {
            if self.time.is_none() {
                return Err(CentumError::Shape(format!(
                    "cannot add temporal variable '{}' to a cube without a time dimension",
                    name
                )));
            }
            let (nt, ny, nx) = self.dim();
            vec![nt, ny, nx]
        } else {
            vec![self.y.len(), self.x.len()]
        };

        let actual = variable.shape();
        if actual != expected {
            return Err(CentumError::Shape(format!(
                "variable '{}' has shape {:?}, cube expects {:?}",
                name, actual, expected
            )));
        }

        log::trace!("Adding {} variable '{}'", variable.kind(), name);
        self.variables.insert(name, Arc::new(variable));
        Ok(())
    }

    /// Return a new cube that also holds `variable` under `name`
    pub fn with_variable(&self, name: impl Into<String>, variable: Variable) -> CentumResult<Self> {
        let mut next = self.clone();
        next.insert(name, variable)?;
        Ok(next)
    }

    /// Return a new cube holding every `(name, variable)` pair
    pub fn with_variables<I, S>(&self, variables: I) -> CentumResult<Self>
    where
        I: IntoIterator<Item = (S, Variable)>,
        S: Into<String>,
    {
        let mut next = self.clone();
        for (name, variable) in variables {
            next.insert(name, variable)?;
        }
        Ok(next)
    }
}
