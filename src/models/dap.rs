//! Wire models for the DAP (Data Access Platform) REST API, `/api/v1`.
//!
//! Scope: types only. Requests live in `crate::client`.
//!
//! Notes
//! - Identifiers are integer newtypes so a parameter id cannot be passed where a timeline id is expected.
//! - Measurement values and `custom_id` keep whatever JSON scalar the API sent; they are echoed into CSV untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAggregationId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineId(pub i64);

/// Join ids into the comma-separated form the API expects for batch filters (`id=1,2,3`).
pub fn join_ids<T, F>(ids: &[T], inner: F) -> String
where
    F: Fn(&T) -> i64,
{
    ids.iter().map(|id| inner(id).to_string()).collect::<Vec<_>>().join(",")
}

// =====================
// Measurement types
// =====================

/// Well-known `measurement_type_name` values. The API reports them in Polish.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MeasurementType {
    Temperature,
    PorePressure,
}

impl MeasurementType {
    pub fn api_name(self) -> &'static str {
        match self {
            MeasurementType::Temperature => "Temperatura",
            MeasurementType::PorePressure => "Ciśnienie porowe",
        }
    }
}

impl Display for MeasurementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementType::Temperature => write!(f, "temperature"),
            MeasurementType::PorePressure => write!(f, "pore pressure"),
        }
    }
}

// =====================
// Entities
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Human-facing identifier; used as the output file name. Some devices report it as a number.
    #[serde(deserialize_with = "string_or_number")]
    pub custom_id: String,
    #[serde(default)]
    pub parameter_ids: Vec<ParameterId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParameterId,
    pub measurement_type_name: Option<String>,
}

impl Parameter {
    pub fn is_of_type(&self, kind: MeasurementType) -> bool {
        self.measurement_type_name.as_deref() == Some(kind.api_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub id: TimelineId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Number, numeric string (decimal columns) or `null`.
    #[serde(default)]
    pub value: Value,
    /// ISO-8601-like date string, e.g. `2023-01-01T00:00:00Z` or `2023-01-01 00:00:00`.
    pub timestamp: String,
}

impl Measurement {
    /// CSV text of the value: strings verbatim, numbers as sent, `null` empty.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;
    impl<'de> serde::de::Visitor<'de> for V {
        type Value = String;

        fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
            write!(f, "a string or a number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(V)
}

// =====================
// Response envelopes
// =====================

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParametersResponse {
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelinesResponse {
    pub timelines: Vec<Timeline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementsResponse {
    #[serde(default)]
    pub measurements: Option<Vec<Measurement>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_ids_is_comma_separated() {
        let ids = [ParameterId(3), ParameterId(14), ParameterId(15)];
        assert_eq!(join_ids(&ids, |p| p.0), "3,14,15");
        assert_eq!(join_ids::<ParameterId, _>(&[], |p| p.0), "");
    }

    #[test]
    fn device_without_parameter_ids_has_none() {
        let device: Device = serde_json::from_str(r#"{"id": 7, "custom_id": "UT7"}"#).expect("parse device");
        assert!(device.parameter_ids.is_empty());
    }

    #[test]
    fn parameter_type_match_is_exact() {
        let p = Parameter {
            id: ParameterId(1),
            measurement_type_name: Some("Ciśnienie porowe".into()),
        };
        assert!(p.is_of_type(MeasurementType::PorePressure));
        assert!(!p.is_of_type(MeasurementType::Temperature));

        let lowercase = Parameter {
            id: ParameterId(2),
            measurement_type_name: Some("temperatura".into()),
        };
        assert!(!lowercase.is_of_type(MeasurementType::Temperature));
    }

    #[test]
    fn measurement_value_keeps_number_text() {
        let m: Measurement =
            serde_json::from_str(r#"{"value": 10.0, "timestamp": "2023-01-01T00:00:00Z"}"#).expect("parse");
        assert_eq!(m.value_text(), "10.0");

        let m: Measurement = serde_json::from_str(r#"{"value": null, "timestamp": "2023-01-01"}"#).expect("parse");
        assert_eq!(m.value_text(), "");

        let m: Measurement = serde_json::from_str(r#"{"timestamp": "2023-01-01"}"#).expect("parse");
        assert_eq!(m.value_text(), "");
    }

    #[test]
    fn measurement_value_accepts_decimal_string() {
        let r: MeasurementsResponse =
            serde_json::from_str(r#"{"measurements": [{"value": "10.5", "timestamp": "2023-01-01T00:00:00Z"}]}"#)
                .expect("parse");
        let measurements = r.measurements.expect("measurements present");
        assert_eq!(measurements[0].value_text(), "10.5");
    }

    #[test]
    fn numeric_custom_id_is_accepted() {
        let r: DevicesResponse =
            serde_json::from_str(r#"{"devices": [{"id": 5, "custom_id": 5, "parameter_ids": [1]}]}"#).expect("parse");
        assert_eq!(r.devices[0].custom_id, "5");

        assert!(serde_json::from_str::<Device>(r#"{"id": 5, "custom_id": null}"#).is_err());
    }

    #[test]
    fn missing_measurements_key_is_absent_not_empty() {
        let r: MeasurementsResponse = serde_json::from_str("{}").expect("parse");
        assert!(r.measurements.is_none());
    }
}
