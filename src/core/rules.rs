//! Rain and irrigation hypotheses
//!
//! Classification is stateless per (time, y, x) cell and works on the
//! already-smoothed ratios and threshold flags:
//!
//! - rain: the regional flag is raised and the regional signal is at least as
//!   strong as the local one (water arriving broadly);
//! - irrigation: the local flag is raised and the local signal exceeds the
//!   regional one by [`IRRIGATION_MARGIN`] (water arriving locally).
//!
//! When both hold, irrigation wins.

use crate::config::UndecidedPolicy;
use crate::cube::{names, EtCube, Variable};
use crate::types::{CentumResult, EtField, EventField, EventType, Flag, FlagField};
use ndarray::Zip;

/// Factor by which the local signal must exceed the regional one for
/// irrigation
pub const IRRIGATION_MARGIN: f64 = 1.5;

/// Sub-conditions and conjunction of one hypothesis
#[derive(Debug, Clone)]
pub struct Hypothesis {
    /// Threshold flag the hypothesis starts from
    pub threshold: FlagField,
    /// Magnitude comparison between the regional and local signals
    pub dominance: FlagField,
    /// `threshold AND dominance`
    pub condition: FlagField,
}

/// Compare two magnitudes; undecided if either is NaN
fn compare(lhs: f64, rhs: f64, holds: impl Fn(f64, f64) -> bool) -> Flag {
    if lhs.is_nan() || rhs.is_nan() {
        Flag::Undecided
    } else {
        Flag::from_bool(holds(lhs, rhs))
    }
}

fn conjunction(threshold: &FlagField, dominance: &FlagField) -> FlagField {
    Zip::from(threshold)
        .and(dominance)
        .map_collect(|&t, &d| t.and(d))
}

/// Rain hypothesis: `threshold_regional AND |regional| >= |local|`
pub fn rain_conditions(threshold_regional: &FlagField, regional: &EtField, local: &EtField) -> Hypothesis {
    let dominance = Zip::from(regional)
        .and(local)
        .map_collect(|&r, &l| compare(r.abs(), l.abs(), |r, l| r >= l));
    let condition = conjunction(threshold_regional, &dominance);
    Hypothesis {
        threshold: threshold_regional.clone(),
        dominance,
        condition,
    }
}

/// Irrigation hypothesis:
/// `threshold_local AND |local| > IRRIGATION_MARGIN * |regional|`
pub fn irrigation_conditions(threshold_local: &FlagField, local: &EtField, regional: &EtField) -> Hypothesis {
    let dominance = Zip::from(local)
        .and(regional)
        .map_collect(|&l, &r| compare(l.abs(), r.abs(), |l, r| l > IRRIGATION_MARGIN * r));
    let condition = conjunction(threshold_local, &dominance);
    Hypothesis {
        threshold: threshold_local.clone(),
        dominance,
        condition,
    }
}

/// Label one cell. Only a `True` condition counts; irrigation is checked
/// first.
pub fn classify_cell(irrigation: Flag, rain: Flag) -> EventType {
    if irrigation.is_true() {
        EventType::Irrigation
    } else if rain.is_true() {
        EventType::Rain
    } else {
        EventType::NoEvent
    }
}

/// Label every cell, see [`classify_cell`]
pub fn classify_cells(irrigation: &FlagField, rain: &FlagField) -> EventField {
    Zip::from(irrigation)
        .and(rain)
        .map_collect(|&i, &r| classify_cell(i, r))
}

/// Cells left without an event because a hypothesis was undecided
pub fn undecided_cells(irrigation: &FlagField, rain: &FlagField) -> FlagField {
    Zip::from(irrigation).and(rain).map_collect(|&i, &r| {
        let decided_event = i.is_true() || r.is_true();
        Flag::from_bool(!decided_event && (i.is_undecided() || r.is_undecided()))
    })
}

fn store(cube: &EtCube, hypothesis: Hypothesis, fields: [&str; 3]) -> CentumResult<EtCube> {
    let [threshold, dominance, condition] = fields;
    cube.with_variables([
        (threshold, Variable::Flag(hypothesis.threshold)),
        (dominance, Variable::Flag(hypothesis.dominance)),
        (condition, Variable::Flag(hypothesis.condition)),
    ])
}

/// Add `condRain1`, `condRain2` and `condRain`
pub fn apply_rules_rain(cube: &EtCube) -> CentumResult<EtCube> {
    let hypothesis = rain_conditions(
        cube.flags(names::THRESHOLD_REGIONAL)?,
        cube.float(names::RATIO_REGIONAL_TIME_AVG)?,
        cube.float(names::RATIO_LOCAL_TIME_AVG)?,
    );
    log::debug!(
        "Rain hypothesis holds in {} cells",
        hypothesis.condition.iter().filter(|f| f.is_true()).count()
    );
    store(
        cube,
        hypothesis,
        [names::COND_RAIN_THRESHOLD, names::COND_RAIN_DOMINANCE, names::COND_RAIN],
    )
}

/// Add `condIrrigation1`, `condIrrigation2` and `condIrrigation`
pub fn apply_rules_irrigation(cube: &EtCube) -> CentumResult<EtCube> {
    let hypothesis = irrigation_conditions(
        cube.flags(names::THRESHOLD_LOCAL)?,
        cube.float(names::RATIO_LOCAL_TIME_AVG)?,
        cube.float(names::RATIO_REGIONAL_TIME_AVG)?,
    );
    log::debug!(
        "Irrigation hypothesis holds in {} cells",
        hypothesis.condition.iter().filter(|f| f.is_true()).count()
    );
    store(
        cube,
        hypothesis,
        [
            names::COND_IRRIGATION_THRESHOLD,
            names::COND_IRRIGATION_DOMINANCE,
            names::COND_IRRIGATION,
        ],
    )
}

/// Add `event_type` from `condIrrigation` and `condRain` (and
/// `event_undecided` under [`UndecidedPolicy::Flagged`])
pub fn classify_event(cube: &EtCube, policy: UndecidedPolicy) -> CentumResult<EtCube> {
    let irrigation = cube.flags(names::COND_IRRIGATION)?;
    let rain = cube.flags(names::COND_RAIN)?;

    let events = classify_cells(irrigation, rain);
    let next = cube.with_variable(names::EVENT_TYPE, Variable::Event(events))?;

    match policy {
        UndecidedPolicy::NoEvent => Ok(next),
        UndecidedPolicy::Flagged => {
            let undecided = undecided_cells(irrigation, rain);
            next.with_variable(names::EVENT_UNDECIDED, Variable::Flag(undecided))
        }
    }
}
