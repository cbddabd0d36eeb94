//! Sensor readings and the validation applied before any mutation.

use icelog_api_types::{NewReadingPayload, ReadingPatchPayload, Region};
use serde::{Deserialize, Serialize};

use super::{error::DomainError, timestamp::Timestamp};

pub type ReadingId = i64;

/// A persisted reading as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: ReadingId,
    pub timestamp: Timestamp,
    pub region: Region,
    pub density: f64,
    pub temperature: Option<f64>,
    pub thickness: f64,
    pub collector: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Aggregate over the readings matching a filter. Averages and bounds are
/// absent when nothing matches; `temperature` averages only recorded values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    pub total_records: u64,
    pub avg_temperature: Option<f64>,
    pub avg_thickness: Option<f64>,
    pub avg_density: Option<f64>,
    pub earliest_record: Option<Timestamp>,
    pub latest_record: Option<Timestamp>,
}

/// A validated reading ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub timestamp: Timestamp,
    pub region: Region,
    pub density: f64,
    pub temperature: Option<f64>,
    pub thickness: f64,
    pub collector: String,
}

impl NewReading {
    /// Validate a client payload. A missing timestamp defaults to `now`.
    pub fn from_payload(payload: NewReadingPayload, now: Timestamp) -> Result<Self, DomainError> {
        let NewReadingPayload {
            timestamp,
            region,
            density,
            temperature,
            thickness,
            collector,
        } = payload;

        let region = parse_region(&required("region", region)?)?;
        let density = positive("density", required("density", density)?)?;
        let thickness = positive("thickness", required("thickness", thickness)?)?;
        let collector = non_empty("collector", required("collector", collector)?)?;
        let temperature = temperature.map(|value| finite("temperature", value)).transpose()?;
        let timestamp = match timestamp {
            Some(input) => Timestamp::parse_input(&input)?,
            None => now,
        };

        Ok(Self {
            timestamp,
            region,
            density,
            temperature,
            thickness,
            collector,
        })
    }
}

/// A validated partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingChanges {
    pub timestamp: Option<Timestamp>,
    pub region: Option<Region>,
    pub density: Option<f64>,
    pub temperature: Option<f64>,
    pub thickness: Option<f64>,
    pub collector: Option<String>,
}

impl ReadingChanges {
    pub fn from_payload(payload: ReadingPatchPayload) -> Result<Self, DomainError> {
        let ReadingPatchPayload {
            timestamp,
            region,
            density,
            temperature,
            thickness,
            collector,
        } = payload;

        Ok(Self {
            timestamp: timestamp
                .map(|input| Timestamp::parse_input(&input))
                .transpose()?,
            region: region.map(|value| parse_region(&value)).transpose()?,
            density: density.map(|value| positive("density", value)).transpose()?,
            temperature: temperature
                .map(|value| finite("temperature", value))
                .transpose()?,
            thickness: thickness
                .map(|value| positive("thickness", value))
                .transpose()?,
            collector: collector
                .map(|value| non_empty("collector", value))
                .transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.region.is_none()
            && self.density.is_none()
            && self.temperature.is_none()
            && self.thickness.is_none()
            && self.collector.is_none()
    }
}

fn required<T>(field: &'static str, value: Option<T>) -> Result<T, DomainError> {
    value.ok_or_else(|| DomainError::validation(field, "is required"))
}

fn parse_region(value: &str) -> Result<Region, DomainError> {
    value
        .parse::<Region>()
        .map_err(|err| DomainError::validation("region", err.to_string()))
}

fn finite(field: &'static str, value: f64) -> Result<f64, DomainError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DomainError::validation(field, "must be a finite number"))
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, DomainError> {
    let value = finite(field, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(DomainError::validation(field, "must be greater than 0"))
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use icelog_api_types::TimestampInput;

    use super::*;

    fn payload() -> NewReadingPayload {
        NewReadingPayload {
            region: Some("A".into()),
            density: Some(1.2),
            thickness: Some(0.5),
            collector: Some("Bob".into()),
            ..Default::default()
        }
    }

    #[test]
    fn missing_timestamp_defaults_to_now() {
        let now = Timestamp::parse_text("2024-05-01 10:00:00").unwrap();
        let reading = NewReading::from_payload(payload(), now).unwrap();
        assert_eq!(reading.timestamp, now);
        assert_eq!(reading.region, Region::A);
        assert_eq!(reading.temperature, None);
    }

    #[test]
    fn supplied_timestamp_is_normalized() {
        let mut input = payload();
        input.timestamp = Some(TimestampInput::Text("2024-05-01T10:00:00.250+02:00".into()));
        let reading = NewReading::from_payload(input, Timestamp::now()).unwrap();
        assert_eq!(reading.timestamp.to_string(), "2024-05-01 08:00:00");
    }

    #[test]
    fn non_positive_measurements_are_rejected() {
        let mut input = payload();
        input.thickness = Some(0.0);
        let err = NewReading::from_payload(input, Timestamp::now()).unwrap_err();
        assert_eq!(err, DomainError::validation("thickness", "must be greater than 0"));

        let mut input = payload();
        input.density = Some(-1.0);
        assert!(NewReading::from_payload(input, Timestamp::now()).is_err());
    }

    #[test]
    fn region_and_collector_are_checked() {
        let mut input = payload();
        input.region = Some("Z".into());
        assert!(matches!(
            NewReading::from_payload(input, Timestamp::now()),
            Err(DomainError::Validation { field: "region", .. })
        ));

        let mut input = payload();
        input.collector = Some("   ".into());
        assert!(matches!(
            NewReading::from_payload(input, Timestamp::now()),
            Err(DomainError::Validation { field: "collector", .. })
        ));

        let mut input = payload();
        input.collector = None;
        assert!(matches!(
            NewReading::from_payload(input, Timestamp::now()),
            Err(DomainError::Validation { field: "collector", .. })
        ));
    }

    #[test]
    fn patch_keeps_only_supplied_fields() {
        let changes = ReadingChanges::from_payload(ReadingPatchPayload {
            temperature: Some(-5.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(changes.temperature, Some(-5.0));
        assert!(changes.density.is_none());
        assert!(!changes.is_empty());
        assert!(ReadingChanges::from_payload(ReadingPatchPayload::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn patch_values_are_validated() {
        let result = ReadingChanges::from_payload(ReadingPatchPayload {
            density: Some(0.0),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
