//! Core ET-ratio analysis modules

pub mod validate;
pub mod ratio;
pub mod temporal;
pub mod threshold;
pub mod rules;
pub mod delineation;
pub mod accounting;

// Re-export main types
pub use validate::{validate, ValidationReport};
pub use ratio::{
    compute_local_ratio, compute_regional_ratio, compute_regional_ratio_with, paired_valid,
    window_cells, RegionalOptions, WindowCells,
};
pub use temporal::{apply_time_window_mean, gap_mask, rolling_time_mean, MAX_GAP_DAYS};
pub use threshold::{apply_threshold, classify_threshold, define_decision_thresholds};
pub use rules::{apply_rules_irrigation, apply_rules_rain, classify_event, IRRIGATION_MARGIN};
pub use delineation::{Delineation, EventSummary, IrrigationDelineator};
pub use accounting::{compute_water_accounting, AccountingPeriod};
