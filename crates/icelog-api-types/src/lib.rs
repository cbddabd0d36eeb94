//! Request and response shapes shared by the icelog server and its clients.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Sampling region of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    A,
    B,
    C,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::A => "A",
            Region::B => "B",
            Region::C => "C",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRegion(pub String);

impl fmt::Display for UnknownRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown region `{}` (expected one of A, B, C)", self.0)
    }
}

impl std::error::Error for UnknownRegion {}

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "A" => Ok(Region::A),
            "B" => Ok(Region::B),
            "C" => Ok(Region::C),
            other => Err(UnknownRegion(other.to_string())),
        }
    }
}

/// A client-supplied point in time: either date text or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    Millis(i64),
    Text(String),
}

impl From<&str> for TimestampInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Body of `POST /api/ice-data` and one element of a batch.
///
/// Every field is optional at the wire level so that missing values surface
/// as validation errors naming the field rather than as decode failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewReadingPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
}

/// Body of `PUT /api/ice-data/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingPatchPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
}

/// Query string accepted by `GET /api/ice-data` and `GET /api/ice-data/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub region: Option<String>,
    pub time_range: Option<String>,
    pub search: Option<String>,
    pub sort_key: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u64, limit: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
    pub status: String,
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> ListEnvelope<T> {
    pub fn success(data: Vec<T>, pagination: Pagination) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data,
            pagination,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub status: String,
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub status: String,
    pub message: String,
}

impl MessageEnvelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub status: String,
    pub token: String,
}

impl TokenEnvelope {
    pub fn success(token: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            token: token.into(),
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parses_known_values_only() {
        assert_eq!("B".parse::<Region>(), Ok(Region::B));
        assert_eq!(" C ".parse::<Region>(), Ok(Region::C));
        assert!("a".parse::<Region>().is_err());
        assert!("D".parse::<Region>().is_err());
    }

    #[test]
    fn pagination_rounds_pages_up() {
        assert_eq!(Pagination::new(0, 1, 10).pages, 0);
        assert_eq!(Pagination::new(10, 1, 10).pages, 1);
        assert_eq!(Pagination::new(11, 1, 10).pages, 2);
    }

    #[test]
    fn timestamp_input_accepts_text_and_millis() {
        let text: TimestampInput = serde_json::from_str("\"2024-01-02T03:04:05Z\"").unwrap();
        assert_eq!(text, TimestampInput::Text("2024-01-02T03:04:05Z".into()));
        let millis: TimestampInput = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(millis, TimestampInput::Millis(1_700_000_000_000));
    }

    #[test]
    fn new_reading_payload_tolerates_missing_fields() {
        let payload: NewReadingPayload =
            serde_json::from_str(r#"{"region":"A","density":1.2}"#).unwrap();
        assert_eq!(payload.region.as_deref(), Some("A"));
        assert!(payload.thickness.is_none());
    }
}
