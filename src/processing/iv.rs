use std::collections::BTreeMap;

use crate::config::{EngineConfig, SlopeBranch};
use crate::data::model::{Observable, ObservableValue, RawCurve, CURRENT_UNITS, VOLTAGE_UNITS};
use crate::error::{CurveError, ObservableError};
use crate::processing::iv_calc::{self, MaxPowerPoint, SweepSplit};
use crate::processing::processor::{Derivation, ObservableProcessor};

pub const POWER_UNITS: &str = "Power (W)";
pub const RESISTANCE_UNITS: &str = "Resistance (Ω)";
pub const FILL_FACTOR_UNITS: &str = "Fill factor";

/// Processor over one IV sweep.
pub type IvProcessor = ObservableProcessor<IvObservable>;

/// Scalar observables that describe a cell, in export order.
pub const CELL_PARAMETERS: &[&str] = &[
    "isc",
    "voc",
    "fill_factor",
    "mpp_power",
    "mpp_voltage",
    "mpp_current",
    "mpp_resistance",
    "series_resistance",
    "shunt_resistance",
];

/// Settings for the IV derivations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IvSettings {
    pub slope_branch: SlopeBranch,
}

impl From<&EngineConfig> for IvSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            slope_branch: config.slope_branch,
        }
    }
}

// ---------------------------------------------------------------------------
// IvObservable – the derived quantities of a solar-cell sweep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IvObservable {
    Power,
    ForwardVoltage,
    ForwardCurrent,
    ForwardPower,
    ReverseVoltage,
    ReverseCurrent,
    ReversePower,
    TruncatedVoltage,
    TruncatedCurrent,
    TruncatedPower,
    CurrentDifference,
    PowerDifference,
    Isc,
    Voc,
    MppPower,
    MppVoltage,
    MppCurrent,
    MppResistance,
    FillFactor,
    SeriesResistance,
    ShuntResistance,
    Parameters,
}

impl Derivation for IvObservable {
    type Source = RawCurve;
    type Settings = IvSettings;

    const ALL: &'static [Self] = &[
        IvObservable::Power,
        IvObservable::ForwardVoltage,
        IvObservable::ForwardCurrent,
        IvObservable::ForwardPower,
        IvObservable::ReverseVoltage,
        IvObservable::ReverseCurrent,
        IvObservable::ReversePower,
        IvObservable::TruncatedVoltage,
        IvObservable::TruncatedCurrent,
        IvObservable::TruncatedPower,
        IvObservable::CurrentDifference,
        IvObservable::PowerDifference,
        IvObservable::Isc,
        IvObservable::Voc,
        IvObservable::MppPower,
        IvObservable::MppVoltage,
        IvObservable::MppCurrent,
        IvObservable::MppResistance,
        IvObservable::FillFactor,
        IvObservable::SeriesResistance,
        IvObservable::ShuntResistance,
        IvObservable::Parameters,
    ];

    fn name(self) -> &'static str {
        match self {
            IvObservable::Power => "power",
            IvObservable::ForwardVoltage => "forward_voltage",
            IvObservable::ForwardCurrent => "forward_current",
            IvObservable::ForwardPower => "forward_power",
            IvObservable::ReverseVoltage => "reverse_voltage",
            IvObservable::ReverseCurrent => "reverse_current",
            IvObservable::ReversePower => "reverse_power",
            IvObservable::TruncatedVoltage => "truncated_voltage",
            IvObservable::TruncatedCurrent => "truncated_current",
            IvObservable::TruncatedPower => "truncated_power",
            IvObservable::CurrentDifference => "current_difference",
            IvObservable::PowerDifference => "power_difference",
            IvObservable::Isc => "isc",
            IvObservable::Voc => "voc",
            IvObservable::MppPower => "mpp_power",
            IvObservable::MppVoltage => "mpp_voltage",
            IvObservable::MppCurrent => "mpp_current",
            IvObservable::MppResistance => "mpp_resistance",
            IvObservable::FillFactor => "fill_factor",
            IvObservable::SeriesResistance => "series_resistance",
            IvObservable::ShuntResistance => "shunt_resistance",
            IvObservable::Parameters => "parameters",
        }
    }

    fn derive(self, p: &IvProcessor) -> Result<Observable, ObservableError> {
        use IvObservable::*;
        match self {
            Power => {
                let raw = p.raw();
                Ok(Observable::series(
                    POWER_UNITS,
                    iv_calc::power(&raw.voltage, &raw.current)?,
                ))
            }

            ForwardVoltage => Ok(Observable::series(VOLTAGE_UNITS, split(p, &p.raw().voltage)?.forward_y)),
            ForwardCurrent => Ok(Observable::series(CURRENT_UNITS, split(p, &p.raw().current)?.forward_y)),
            ForwardPower => Ok(Observable::series(POWER_UNITS, split(p, &p.series(Power)?)?.forward_y)),
            ReverseVoltage => Ok(Observable::series(VOLTAGE_UNITS, split(p, &p.raw().voltage)?.reverse_y)),
            ReverseCurrent => Ok(Observable::series(CURRENT_UNITS, split(p, &p.raw().current)?.reverse_y)),
            ReversePower => Ok(Observable::series(POWER_UNITS, split(p, &p.series(Power)?)?.reverse_y)),

            TruncatedVoltage => Ok(Observable::series(VOLTAGE_UNITS, truncate(p, ForwardVoltage)?)),
            TruncatedCurrent => Ok(Observable::series(CURRENT_UNITS, truncate(p, ForwardCurrent)?)),
            TruncatedPower => Ok(Observable::series(POWER_UNITS, truncate(p, ForwardPower)?)),

            CurrentDifference => Ok(Observable::series(
                CURRENT_UNITS,
                iv_calc::branch_difference(&p.series(ForwardCurrent)?, &p.series(ReverseCurrent)?),
            )),
            PowerDifference => Ok(Observable::series(
                POWER_UNITS,
                iv_calc::branch_difference(&p.series(ForwardPower)?, &p.series(ReversePower)?),
            )),

            Isc => {
                let voltage = p.series(ForwardVoltage)?;
                let current = p.series(ForwardCurrent)?;
                let isc = iv_calc::find_crossing(&voltage, &current).map_err(|e| match e {
                    CurveError::CrossingNotFound => ObservableError::IscNotFound,
                    other => other.into(),
                })?;
                Ok(Observable::scalar(CURRENT_UNITS, isc.abs()))
            }
            Voc => {
                let voltage = p.series(ForwardVoltage)?;
                let current = p.series(ForwardCurrent)?;
                let voc = iv_calc::find_crossing(&current, &voltage).map_err(|e| match e {
                    CurveError::CrossingNotFound => {
                        ObservableError::VocNotFound("no zero crossing of the current".into())
                    }
                    other => other.into(),
                })?;
                if voc < 0.0 {
                    return Err(ObservableError::VocNotFound(format!(
                        "crossing at negative voltage {voc:.4} V"
                    )));
                }
                Ok(Observable::scalar(VOLTAGE_UNITS, voc))
            }

            MppPower => Ok(Observable::scalar(POWER_UNITS, max_power_point(p)?.power)),
            MppVoltage => Ok(Observable::scalar(VOLTAGE_UNITS, max_power_point(p)?.voltage)),
            MppCurrent => Ok(Observable::scalar(CURRENT_UNITS, max_power_point(p)?.current)),
            MppResistance => {
                let voltage = p.scalar(MppVoltage)?;
                let current = p.scalar(MppCurrent)?;
                if current == 0.0 {
                    return Err(ObservableError::NotComputable(
                        "zero current at the maximum power point".into(),
                    ));
                }
                Ok(Observable::scalar(RESISTANCE_UNITS, voltage / current))
            }

            FillFactor => {
                let voc = p.scalar(Voc)?;
                let isc = p.scalar(Isc)?;
                let mpp_power = p.scalar(MppPower)?;
                let denominator = voc * isc;
                if denominator == 0.0 {
                    return Err(ObservableError::NotComputable(
                        "Voc·Isc is zero, fill factor undefined".into(),
                    ));
                }
                Ok(Observable::scalar(FILL_FACTOR_UNITS, mpp_power / denominator))
            }

            // Both resistances are dV/dI. Series: taken where the current
            // crosses zero (open circuit). Shunt: where the voltage crosses
            // zero (short circuit).
            SeriesResistance => {
                let (voltage, current) = slope_branch(p)?;
                let conductance = iv_calc::local_slope(&voltage, &current, 0.0)
                    .map_err(ObservableError::from)?;
                if conductance == 0.0 {
                    return Err(ObservableError::NotComputable(
                        "flat current around open circuit".into(),
                    ));
                }
                Ok(Observable::scalar(RESISTANCE_UNITS, 1.0 / conductance))
            }
            ShuntResistance => {
                let (voltage, current) = slope_branch(p)?;
                let resistance = iv_calc::local_slope(&current, &voltage, 0.0)?;
                Ok(Observable::scalar(RESISTANCE_UNITS, resistance))
            }

            Parameters => {
                let mut record = BTreeMap::new();
                record.insert(
                    "label".to_string(),
                    ObservableValue::Text(p.label().to_string()),
                );
                for (key, kind) in [
                    ("isc", Isc),
                    ("voc", Voc),
                    ("fill_factor", FillFactor),
                    ("mpp_power", MppPower),
                    ("mpp_voltage", MppVoltage),
                    ("mpp_current", MppCurrent),
                    ("mpp_resistance", MppResistance),
                    ("rsh", ShuntResistance),
                    ("rs", SeriesResistance),
                ] {
                    record.insert(key.to_string(), ObservableValue::Scalar(p.scalar(kind)?));
                }
                Ok(Observable::new(None, ObservableValue::Record(record)))
            }
        }
    }
}

/// Split `dependent` along the raw voltage sweep.
fn split(p: &IvProcessor, dependent: &[f64]) -> Result<SweepSplit, ObservableError> {
    Ok(iv_calc::split_forward_reverse(&p.raw().voltage, dependent)?)
}

/// Cut a forward-branch quantity down to the power quadrant. The quadrant is
/// bounded by both crossings, so a curve without Isc has no quadrant either.
fn truncate(p: &IvProcessor, target: IvObservable) -> Result<Vec<f64>, ObservableError> {
    let isc = p.scalar(IvObservable::Isc)?;
    let voc = p.scalar(IvObservable::Voc)?;
    let voltage = p.series(IvObservable::ForwardVoltage)?;
    let current = p.series(IvObservable::ForwardCurrent)?;
    let target = p.series(target)?;
    Ok(iv_calc::trim_between(&voltage, &current, &target, isc, voc)?)
}

fn max_power_point(p: &IvProcessor) -> Result<MaxPowerPoint, ObservableError> {
    let voltage = p.series(IvObservable::TruncatedVoltage)?;
    let current = p.series(IvObservable::TruncatedCurrent)?;
    iv_calc::max_power_point(&voltage, &current)?
        .ok_or_else(|| ObservableError::NotComputable("truncated power window is empty".into()))
}

/// Voltage and current the resistance slopes are read from.
fn slope_branch(p: &IvProcessor) -> Result<(Vec<f64>, Vec<f64>), ObservableError> {
    match p.settings().slope_branch {
        SlopeBranch::Full => Ok((p.raw().voltage.clone(), p.raw().current.clone())),
        SlopeBranch::Forward => Ok((
            p.series(IvObservable::ForwardVoltage)?,
            p.series(IvObservable::ForwardCurrent)?,
        )),
    }
}
