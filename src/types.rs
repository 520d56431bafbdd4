use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Numeric (time, y, x) field, e.g. ETa in mm/day or a derived ratio
pub type EtField = Array3<f64>;

/// Numeric (y, x) field without a time axis
pub type EtGrid = Array2<f64>;

/// Tri-state boolean field (time, y, x)
pub type FlagField = Array3<Flag>;

/// Categorical event field (time, y, x)
pub type EventField = Array3<EventType>;

/// Outcome of a per-cell test.
///
/// A test evaluated on a not-a-number input is `Undecided`: it is neither
/// true nor false, and never counts as evidence for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Flag {
    #[default]
    False,
    True,
    Undecided,
}

impl Flag {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Flag::True
        } else {
            Flag::False
        }
    }

    /// Only `True` is true; `Undecided` is not.
    pub fn is_true(self) -> bool {
        matches!(self, Flag::True)
    }

    pub fn is_undecided(self) -> bool {
        matches!(self, Flag::Undecided)
    }

    /// Logical AND: any `False` wins, then any `Undecided`.
    pub fn and(self, other: Flag) -> Flag {
        match (self, other) {
            (Flag::False, _) | (_, Flag::False) => Flag::False,
            (Flag::True, Flag::True) => Flag::True,
            _ => Flag::Undecided,
        }
    }

    /// Numeric view: 1.0, 0.0 or NaN
    pub fn as_f64(self) -> f64 {
        match self {
            Flag::True => 1.0,
            Flag::False => 0.0,
            Flag::Undecided => f64::NAN,
        }
    }
}

/// Event label assigned to each (time, y, x) cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    #[default]
    NoEvent = 0,
    Irrigation = 1,
    Rain = 2,
}

impl EventType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EventType::NoEvent),
            1 => Some(EventType::Irrigation),
            2 => Some(EventType::Rain),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::NoEvent => write!(f, "no event"),
            EventType::Irrigation => write!(f, "irrigation"),
            EventType::Rain => write!(f, "rain"),
        }
    }
}

/// Statistic used for the regional aggregation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationStat {
    #[default]
    Mean,
}

impl std::fmt::Display for AggregationStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationStat::Mean => write!(f, "mean"),
        }
    }
}

/// Error types for ET analysis
#[derive(Debug, thiserror::Error)]
pub enum CentumError {
    #[error("Data validation failed: {}", .0.join("; "))]
    DataValidation(Vec<String>),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Variable '{0}' is missing from the cube")]
    MissingVariable(String),

    #[error("Variable '{name}' is not a {expected} field")]
    VariableKind { name: String, expected: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ET analysis operations
pub type CentumResult<T> = Result<T, CentumError>;
