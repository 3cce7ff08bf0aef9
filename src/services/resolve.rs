use crate::client::{DapApi, DapClientError};
use crate::models::dap::{ContextId, Device, MeasurementType, Parameter, ScenarioId, TimelineId};
use core::fmt;
use log::debug;
use std::fmt::{Display, Formatter};

/// Why a device produced no file. Missing data is never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoParameters,
    MissingParameter(MeasurementType),
    MissingTimeline(MeasurementType),
    MissingMeasurements(MeasurementType),
    EmptyMeasurements,
    LengthMismatch { temperature: usize, pressure: usize },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoParameters => write!(f, "device has no parameters"),
            SkipReason::MissingParameter(kind) => write!(f, "no {} parameter", kind),
            SkipReason::MissingTimeline(kind) => write!(f, "no {} timeline", kind),
            SkipReason::MissingMeasurements(kind) => write!(f, "no {} measurements in response", kind),
            SkipReason::EmptyMeasurements => write!(f, "empty measurement series"),
            SkipReason::LengthMismatch { temperature, pressure } => {
                write!(f, "series length mismatch (temperature={}, pressure={})", temperature, pressure)
            }
        }
    }
}

/// Result of one pipeline stage for one device.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    Skip(SkipReason),
}

/// A device with both of its timelines located.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDevice {
    pub device: Device,
    pub temperature_timeline: TimelineId,
    pub pressure_timeline: TimelineId,
}

/// First parameter of the given type; duplicates after it are ignored.
pub fn select_parameter(parameters: &[Parameter], kind: MeasurementType) -> Option<&Parameter> {
    parameters.iter().find(|p| p.is_of_type(kind))
}

/// Look up parameters and timelines for `device`.
///
/// Stops at the first missing piece. Devices without parameters cost no requests.
pub fn resolve_device<A: DapApi + ?Sized>(
    api: &A,
    context_id: ContextId,
    scenario_id: Option<ScenarioId>,
    device: Device,
) -> Result<Outcome<ResolvedDevice>, DapClientError> {
    if device.parameter_ids.is_empty() {
        return Ok(Outcome::Skip(SkipReason::NoParameters));
    }

    let parameters = api.parameters(&device.parameter_ids)?;

    let Some(temperature) = select_parameter(&parameters, MeasurementType::Temperature) else {
        return Ok(Outcome::Skip(SkipReason::MissingParameter(MeasurementType::Temperature)));
    };
    let Some(pressure) = select_parameter(&parameters, MeasurementType::PorePressure) else {
        return Ok(Outcome::Skip(SkipReason::MissingParameter(MeasurementType::PorePressure)));
    };

    let Some(temperature_timeline) = api.timelines(context_id, scenario_id, temperature.id)?.first().map(|t| t.id)
    else {
        return Ok(Outcome::Skip(SkipReason::MissingTimeline(MeasurementType::Temperature)));
    };
    let Some(pressure_timeline) = api.timelines(context_id, scenario_id, pressure.id)?.first().map(|t| t.id) else {
        return Ok(Outcome::Skip(SkipReason::MissingTimeline(MeasurementType::PorePressure)));
    };

    debug!(
        "Resolved device {}: temperature timeline {}, pressure timeline {}",
        device.custom_id, temperature_timeline.0, pressure_timeline.0
    );

    Ok(Outcome::Ready(ResolvedDevice {
        device,
        temperature_timeline,
        pressure_timeline,
    }))
}
