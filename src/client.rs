//! Standalone HTTP client for the DAP REST API (read-only subset).
//!
//! - Blocking client using `ureq` (no async).
//! - Uses the models in `crate::models::dap`.
//! - Covers the four lookups the export needs: devices, parameters, timelines, measurements.
//!
//! Authentication
//! - Every request carries the `private_token` query parameter; there is no session.
//! - TLS certificate verification can be switched off; the platform runs on self-signed certificates.

use chrono::{DateTime, SecondsFormat, Utc};
use http::StatusCode;
use log::debug;
use serde::de::DeserializeOwned;
use ureq::Agent;
use ureq::tls::TlsConfig;

use crate::models::dap::*;

/// Upper bound for a single response body. Measurement listings for long windows are large.
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug)]
pub enum DapClientError {
    Transport(String),
    Http { status: StatusCode, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
}

impl core::fmt::Display for DapClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DapClientError::Transport(s) => write!(f, "transport error: {}", s),
            DapClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            DapClientError::Json(e) => write!(f, "json error at `{}`: {}", e.path(), e.inner()),
        }
    }
}

impl std::error::Error for DapClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DapClientError::Json(e) => Some(e.inner()),
            _ => None,
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for DapClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        DapClientError::Json(value)
    }
}

impl From<ureq::Error> for DapClientError {
    fn from(value: ureq::Error) -> Self {
        DapClientError::Transport(value.to_string())
    }
}

/// Optional inclusive bounds for a measurement listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// The lookups the export pipeline depends on.
///
/// `DapClient` is the real implementation; tests provide an in-memory one.
pub trait DapApi {
    fn devices_for_profile(&self, profile_id: ProfileId) -> Result<Vec<Device>, DapClientError>;

    fn devices_in_aggregations(&self, aggregation_ids: &[DeviceAggregationId]) -> Result<Vec<Device>, DapClientError>;

    fn parameters(&self, parameter_ids: &[ParameterId]) -> Result<Vec<Parameter>, DapClientError>;

    fn timelines(
        &self,
        context_id: ContextId,
        scenario_id: Option<ScenarioId>,
        parameter_id: ParameterId,
    ) -> Result<Vec<Timeline>, DapClientError>;

    /// `Ok(None)` when the response carries no `measurements` key at all.
    fn measurements(
        &self,
        timeline_id: TimelineId,
        window: &TimeWindow,
    ) -> Result<Option<Vec<Measurement>>, DapClientError>;
}

pub struct DapClient {
    agent: Agent,
    base_url: String,
    private_token: String,
}

impl DapClient {
    pub fn new(base_url: impl Into<String>, private_token: impl Into<String>, verify_tls: bool) -> Self {
        let config = Agent::config_builder()
            .tls_config(TlsConfig::builder().disable_verification(!verify_tls).build())
            .http_status_as_error(false)
            .build();

        DapClient {
            agent: Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            private_token: private_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, DapClientError> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);

        let mut req = self.agent.get(&url).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        req = req.query("private_token", &self.private_token);

        let mut res = req.call()?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .body_mut()
                .read_to_string()
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(DapClientError::Http { status, message: body });
        }

        let body = res.body_mut().with_config().limit(MAX_BODY_BYTES).read_to_string()?;
        decode_json(&body)
    }

    /// Devices grouped under any of the given aggregations.
    pub fn get_devices_in_aggregations(&self, ids: &[DeviceAggregationId]) -> Result<Vec<Device>, DapClientError> {
        let resp: DevicesResponse = self.get_json("/api/v1/devices", &[("device_aggregation_id", join_ids(ids, |a| a.0))])?;
        Ok(resp.devices)
    }

    pub fn get_devices_for_profile(&self, profile_id: ProfileId) -> Result<Vec<Device>, DapClientError> {
        let resp: DevicesResponse = self.get_json("/api/v1/devices", &[("profile_id", profile_id.0.to_string())])?;
        Ok(resp.devices)
    }

    pub fn get_parameters(&self, ids: &[ParameterId]) -> Result<Vec<Parameter>, DapClientError> {
        let resp: ParametersResponse = self.get_json("/api/v1/parameters", &[("id", join_ids(ids, |p| p.0))])?;
        Ok(resp.parameters)
    }

    pub fn get_timelines(
        &self,
        context_id: ContextId,
        scenario_id: Option<ScenarioId>,
        parameter_id: ParameterId,
    ) -> Result<Vec<Timeline>, DapClientError> {
        let q = timeline_query(context_id, scenario_id, parameter_id);
        let resp: TimelinesResponse = self.get_json("/api/v1/timelines", &q)?;
        Ok(resp.timelines)
    }

    pub fn get_measurements(
        &self,
        timeline_id: TimelineId,
        window: &TimeWindow,
    ) -> Result<Option<Vec<Measurement>>, DapClientError> {
        let resp: MeasurementsResponse = self.get_json("/api/v1/measurements", &measurement_query(timeline_id, window))?;
        Ok(resp.measurements)
    }
}

impl DapApi for DapClient {
    fn devices_for_profile(&self, profile_id: ProfileId) -> Result<Vec<Device>, DapClientError> {
        self.get_devices_for_profile(profile_id)
    }

    fn devices_in_aggregations(&self, aggregation_ids: &[DeviceAggregationId]) -> Result<Vec<Device>, DapClientError> {
        self.get_devices_in_aggregations(aggregation_ids)
    }

    fn parameters(&self, parameter_ids: &[ParameterId]) -> Result<Vec<Parameter>, DapClientError> {
        self.get_parameters(parameter_ids)
    }

    fn timelines(
        &self,
        context_id: ContextId,
        scenario_id: Option<ScenarioId>,
        parameter_id: ParameterId,
    ) -> Result<Vec<Timeline>, DapClientError> {
        self.get_timelines(context_id, scenario_id, parameter_id)
    }

    fn measurements(
        &self,
        timeline_id: TimelineId,
        window: &TimeWindow,
    ) -> Result<Option<Vec<Measurement>>, DapClientError> {
        self.get_measurements(timeline_id, window)
    }
}

/// Decode a response body, reporting the JSON path of the first mismatch.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, DapClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(DapClientError::Json)
}

fn timeline_query(
    context_id: ContextId,
    scenario_id: Option<ScenarioId>,
    parameter_id: ParameterId,
) -> Vec<(&'static str, String)> {
    let mut q = vec![
        ("parameter_id", parameter_id.0.to_string()),
        ("context_id", context_id.0.to_string()),
    ];
    if let Some(s) = scenario_id {
        q.push(("scenario_id", s.0.to_string()));
    }
    q
}

fn measurement_query(timeline_id: TimelineId, window: &TimeWindow) -> Vec<(&'static str, String)> {
    let mut q = vec![("timeline_id", timeline_id.0.to_string())];
    if let Some(from) = window.from {
        q.push(("time_from", from.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(to) = window.to {
        q.push(("time_to", to.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    q
}
