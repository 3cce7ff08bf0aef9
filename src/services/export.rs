use crate::client::{DapApi, DapClientError, TimeWindow};
use crate::models::dap::{ContextId, Device, DeviceAggregationId, Measurement, MeasurementType, ProfileId, ScenarioId};
use crate::services::csv_export::{RowLayout, write_measurements};
use crate::services::resolve::{Outcome, ResolvedDevice, SkipReason, resolve_device};
use crate::utils::TimestampError;
use core::fmt;
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_WORKING_DIR: &str = "/tmp/";

/// Errors that abort an export run. Missing data is reported through `SkipReason` instead.
#[derive(Debug)]
pub enum ExportError {
    /// Upstream request, status or decode failure
    Api(DapClientError),
    /// Directory creation or file write failure
    Io { path: PathBuf, source: std::io::Error },
    /// CSV serialisation failure
    Csv(csv::Error),
    /// A measurement timestamp could not be read
    Timestamp(TimestampError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Api(e) => write!(f, "api error: {}", e),
            ExportError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ExportError::Csv(e) => write!(f, "csv error: {}", e),
            ExportError::Timestamp(e) => write!(f, "{}", e),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExportError::Api(e) => Some(e),
            ExportError::Io { source, .. } => Some(source),
            ExportError::Csv(e) => Some(e),
            ExportError::Timestamp(e) => Some(e),
        }
    }
}

impl From<DapClientError> for ExportError {
    fn from(value: DapClientError) -> Self {
        ExportError::Api(value)
    }
}

impl From<csv::Error> for ExportError {
    fn from(value: csv::Error) -> Self {
        ExportError::Csv(value)
    }
}

impl From<TimestampError> for ExportError {
    fn from(value: TimestampError) -> Self {
        ExportError::Timestamp(value)
    }
}

/// How the set of exported devices is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Profile(ProfileId),
    Aggregations(Vec<DeviceAggregationId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub context_id: ContextId,
    /// Presence switches timeline lookup and the output to the scenario layout.
    pub scenario_id: Option<ScenarioId>,
    pub devices: DeviceSelector,
    pub window: TimeWindow,
    pub file_name_prefix: String,
    pub working_dir: PathBuf,
}

impl ExportRequest {
    pub fn new(context_id: ContextId, scenario_id: Option<ScenarioId>, devices: DeviceSelector) -> Self {
        ExportRequest {
            context_id,
            scenario_id,
            devices,
            window: TimeWindow::default(),
            file_name_prefix: String::new(),
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
        }
    }

    pub fn layout(&self) -> RowLayout {
        RowLayout::for_scenario(self.scenario_id.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDevice {
    pub custom_id: String,
    pub reason: SkipReason,
}

/// What a run did, device by device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedDevice>,
}

/// Temperature and pressure series of one device, equal length, paired by index.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedSeries {
    pub temperature: Vec<Measurement>,
    pub pressure: Vec<Measurement>,
}

/// Fetch both series for a resolved device and check they can be paired.
///
/// Both use the same request; only the timeline differs.
pub fn fetch_paired_series<A: DapApi + ?Sized>(
    api: &A,
    resolved: &ResolvedDevice,
    window: &TimeWindow,
) -> Result<Outcome<PairedSeries>, DapClientError> {
    let Some(temperature) = api.measurements(resolved.temperature_timeline, window)? else {
        return Ok(Outcome::Skip(SkipReason::MissingMeasurements(MeasurementType::Temperature)));
    };
    let Some(pressure) = api.measurements(resolved.pressure_timeline, window)? else {
        return Ok(Outcome::Skip(SkipReason::MissingMeasurements(MeasurementType::PorePressure)));
    };

    if temperature.is_empty() || pressure.is_empty() {
        return Ok(Outcome::Skip(SkipReason::EmptyMeasurements));
    }
    if temperature.len() != pressure.len() {
        return Ok(Outcome::Skip(SkipReason::LengthMismatch {
            temperature: temperature.len(),
            pressure: pressure.len(),
        }));
    }

    Ok(Outcome::Ready(PairedSeries { temperature, pressure }))
}

fn list_devices<A: DapApi + ?Sized>(api: &A, selector: &DeviceSelector) -> Result<Vec<Device>, DapClientError> {
    match selector {
        DeviceSelector::Profile(profile_id) => api.devices_for_profile(*profile_id),
        DeviceSelector::Aggregations(ids) => api.devices_in_aggregations(ids),
    }
}

fn export_device<A: DapApi + ?Sized>(
    api: &A,
    request: &ExportRequest,
    device: Device,
) -> Result<Outcome<PathBuf>, ExportError> {
    let resolved = match resolve_device(api, request.context_id, request.scenario_id, device)? {
        Outcome::Ready(r) => r,
        Outcome::Skip(reason) => return Ok(Outcome::Skip(reason)),
    };
    let series = match fetch_paired_series(api, &resolved, &request.window)? {
        Outcome::Ready(s) => s,
        Outcome::Skip(reason) => return Ok(Outcome::Skip(reason)),
    };

    let path = write_measurements(
        &resolved.device,
        &series.pressure,
        &series.temperature,
        &request.file_name_prefix,
        &request.working_dir,
        request.layout(),
    )?;
    Ok(Outcome::Ready(path))
}

/// Export every qualifying device of the request to its own CSV file.
///
/// Devices are handled one after another. A device lacking data is skipped and recorded in the
/// summary; any request, decode or write failure aborts the whole run.
pub fn get<A: DapApi + ?Sized>(api: &A, request: &ExportRequest) -> Result<ExportSummary, ExportError> {
    let devices = list_devices(api, &request.devices)?;
    info!("Export: {} device(s) to consider", devices.len());

    let mut summary = ExportSummary::default();
    for device in devices {
        let custom_id = device.custom_id.clone();
        match export_device(api, request, device)? {
            Outcome::Ready(path) => summary.written.push(path),
            Outcome::Skip(reason) => {
                debug!("Export: skipping device {}: {}", custom_id, reason);
                summary.skipped.push(SkippedDevice { custom_id, reason });
            }
        }
    }

    info!(
        "Export: wrote {} file(s), skipped {} device(s)",
        summary.written.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dap::{DeviceId, Parameter, ParameterId, TimelineId};
    use crate::services::fake_api::{FakeApi, PRESSURE, TEMPERATURE};
    use serde_json::Value;

    fn device(id: i64, custom_id: &str, parameter_ids: &[i64]) -> Device {
        Device {
            id: DeviceId(id),
            custom_id: custom_id.into(),
            parameter_ids: parameter_ids.iter().copied().map(ParameterId).collect(),
        }
    }

    fn param(id: i64, name: &str) -> Parameter {
        Parameter {
            id: ParameterId(id),
            measurement_type_name: Some(name.to_string()),
        }
    }

    fn series(values: &[i64]) -> Option<Vec<Measurement>> {
        Some(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Measurement {
                    value: Value::from(*v),
                    timestamp: format!("2023-01-01T{:02}:00:00Z", i),
                })
                .collect(),
        )
    }

    /// One fully wired device "UT5" with parameters 10/11 and timelines 100/101.
    fn wired_api(temperature: Option<Vec<Measurement>>, pressure: Option<Vec<Measurement>>) -> FakeApi {
        FakeApi::default()
            .with_device(device(5, "UT5", &[10, 11]))
            .with_parameter(param(10, TEMPERATURE))
            .with_parameter(param(11, PRESSURE))
            .with_timeline(ParameterId(10), TimelineId(100))
            .with_timeline(ParameterId(11), TimelineId(101))
            .with_measurements(TimelineId(100), temperature)
            .with_measurements(TimelineId(101), pressure)
    }

    fn request(dir: &std::path::Path, scenario_id: Option<ScenarioId>) -> ExportRequest {
        let mut req = ExportRequest::new(ContextId(1), scenario_id, DeviceSelector::Profile(ProfileId(3)));
        req.working_dir = dir.to_path_buf();
        req
    }

    #[test]
    fn defaults_match_cli_contract() {
        let req = ExportRequest::new(ContextId(1), None, DeviceSelector::Profile(ProfileId(3)));
        assert_eq!(req.file_name_prefix, "");
        assert_eq!(req.working_dir, PathBuf::from("/tmp/"));
        assert_eq!(req.window, TimeWindow::default());
        assert_eq!(req.layout(), RowLayout::Measurement);
    }

    #[test]
    fn writes_measurement_layout_without_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[10]), series(&[20]));

        let summary = get(&api, &request(tmp.path(), None)).unwrap();

        assert_eq!(summary.written, vec![tmp.path().join("UT5.csv")]);
        assert!(summary.skipped.is_empty());
        let content = std::fs::read_to_string(tmp.path().join("UT5.csv")).unwrap();
        assert_eq!(content, "0,0,0,0,10,20,1672531200,UT5\n");
    }

    #[test]
    fn writes_scenario_layout_with_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[10]), series(&[20]));

        let mut req = request(tmp.path(), Some(ScenarioId(7)));
        req.file_name_prefix = "scen_".into();
        get(&api, &req).unwrap();

        let content = std::fs::read_to_string(tmp.path().join("scen_UT5.csv")).unwrap();
        assert_eq!(content, "0,0,0,10,20,1672531200,0,UT5\n");
        assert!(api.calls().contains(&"timelines ctx=1 scenario=7 parameter=10".to_string()));
    }

    #[test]
    fn length_mismatch_produces_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[1, 2, 3, 4, 5]), series(&[1, 2, 3, 4]));

        let summary = get(&api, &request(tmp.path(), None)).unwrap();

        assert!(summary.written.is_empty());
        assert_eq!(
            summary.skipped,
            vec![SkippedDevice {
                custom_id: "UT5".into(),
                reason: SkipReason::LengthMismatch {
                    temperature: 5,
                    pressure: 4
                },
            }]
        );
        assert!(!tmp.path().join("UT5.csv").exists());
    }

    #[test]
    fn empty_series_produces_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[]), series(&[]));

        let summary = get(&api, &request(tmp.path(), None)).unwrap();

        assert_eq!(summary.skipped[0].reason, SkipReason::EmptyMeasurements);
        assert!(!tmp.path().join("UT5.csv").exists());
    }

    #[test]
    fn absent_temperature_series_skips_before_pressure_request() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(None, series(&[20]));

        let summary = get(&api, &request(tmp.path(), None)).unwrap();

        assert_eq!(
            summary.skipped[0].reason,
            SkipReason::MissingMeasurements(MeasurementType::Temperature)
        );
        assert!(!api.calls().contains(&"measurements timeline=101".to_string()));
    }

    #[test]
    fn devices_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[10, 11]), series(&[20, 21]))
            .with_device(device(6, "UT6", &[]))
            .with_device(device(7, "UT7", &[12]))
            .with_parameter(param(12, TEMPERATURE));

        let summary = get(&api, &request(tmp.path(), None)).unwrap();

        assert_eq!(summary.written, vec![tmp.path().join("UT5.csv")]);
        let reasons: Vec<_> = summary.skipped.iter().map(|s| (s.custom_id.as_str(), s.reason.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                ("UT6", SkipReason::NoParameters),
                ("UT7", SkipReason::MissingParameter(MeasurementType::PorePressure)),
            ]
        );
        assert!(!api.calls().iter().any(|c| c == "parameters "));
    }

    #[test]
    fn aggregation_selector_lists_by_aggregation() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[10]), series(&[20]));

        let mut req = request(tmp.path(), None);
        req.devices = DeviceSelector::Aggregations(vec![DeviceAggregationId(4), DeviceAggregationId(8)]);
        let summary = get(&api, &req).unwrap();

        assert_eq!(api.calls().first().map(String::as_str), Some("devices aggregations=4,8"));
        assert_eq!(summary.written.len(), 1);
    }

    #[test]
    fn creates_missing_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("out");
        let api = wired_api(series(&[10]), series(&[20]));

        get(&api, &request(&dir, None)).unwrap();

        assert!(dir.join("UT5.csv").is_file());
    }

    #[test]
    fn second_run_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let first = wired_api(series(&[1, 2, 3]), series(&[4, 5, 6]));
        get(&first, &request(tmp.path(), None)).unwrap();

        let second = wired_api(series(&[10]), series(&[20]));
        get(&second, &request(tmp.path(), None)).unwrap();

        let content = std::fs::read_to_string(tmp.path().join("UT5.csv")).unwrap();
        assert_eq!(content, "0,0,0,0,10,20,1672531200,UT5\n");
    }

    #[test]
    fn api_failure_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        let api = wired_api(series(&[10]), series(&[20])).failing_measurements();

        let err = get(&api, &request(tmp.path(), None)).unwrap_err();

        assert!(matches!(err, ExportError::Api(DapClientError::Transport(_))));
    }
}
