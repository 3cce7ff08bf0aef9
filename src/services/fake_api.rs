//! In-memory `DapApi` for pipeline tests. Records every call in order.

use crate::client::{DapApi, DapClientError, TimeWindow};
use crate::models::dap::*;
use std::cell::RefCell;
use std::collections::BTreeMap;

pub const TEMPERATURE: &str = "Temperatura";
pub const PRESSURE: &str = "Ciśnienie porowe";

#[derive(Default)]
pub struct FakeApi {
    devices: Vec<Device>,
    parameters: Vec<Parameter>,
    timelines: BTreeMap<ParameterId, Vec<Timeline>>,
    measurements: BTreeMap<TimelineId, Option<Vec<Measurement>>>,
    fail_measurements: bool,
    calls: RefCell<Vec<String>>,
}

impl FakeApi {
    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_timeline(mut self, parameter_id: ParameterId, timeline_id: TimelineId) -> Self {
        self.timelines
            .entry(parameter_id)
            .or_default()
            .push(Timeline { id: timeline_id });
        self
    }

    /// `None` simulates a response without a `measurements` key.
    pub fn with_measurements(mut self, timeline_id: TimelineId, measurements: Option<Vec<Measurement>>) -> Self {
        self.measurements.insert(timeline_id, measurements);
        self
    }

    pub fn failing_measurements(mut self) -> Self {
        self.fail_measurements = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl DapApi for FakeApi {
    fn devices_for_profile(&self, profile_id: ProfileId) -> Result<Vec<Device>, DapClientError> {
        self.record(format!("devices profile={}", profile_id.0));
        Ok(self.devices.clone())
    }

    fn devices_in_aggregations(&self, aggregation_ids: &[DeviceAggregationId]) -> Result<Vec<Device>, DapClientError> {
        self.record(format!("devices aggregations={}", join_ids(aggregation_ids, |a| a.0)));
        Ok(self.devices.clone())
    }

    fn parameters(&self, parameter_ids: &[ParameterId]) -> Result<Vec<Parameter>, DapClientError> {
        self.record(format!("parameters {}", join_ids(parameter_ids, |p| p.0)));
        Ok(parameter_ids
            .iter()
            .filter_map(|id| self.parameters.iter().find(|p| p.id == *id).cloned())
            .collect())
    }

    fn timelines(
        &self,
        context_id: ContextId,
        scenario_id: Option<ScenarioId>,
        parameter_id: ParameterId,
    ) -> Result<Vec<Timeline>, DapClientError> {
        let scenario = scenario_id.map(|s| s.0.to_string()).unwrap_or_else(|| "-".to_string());
        self.record(format!(
            "timelines ctx={} scenario={} parameter={}",
            context_id.0, scenario, parameter_id.0
        ));
        Ok(self.timelines.get(&parameter_id).cloned().unwrap_or_default())
    }

    fn measurements(
        &self,
        timeline_id: TimelineId,
        _window: &TimeWindow,
    ) -> Result<Option<Vec<Measurement>>, DapClientError> {
        self.record(format!("measurements timeline={}", timeline_id.0));
        if self.fail_measurements {
            return Err(DapClientError::Transport("connection reset".to_string()));
        }
        Ok(self.measurements.get(&timeline_id).cloned().unwrap_or_else(|| Some(Vec::new())))
    }
}
