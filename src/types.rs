use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// App id the Oekoboiler mobile app registers with.
pub const DEFAULT_APP_ID: &str = "Ob-Ng-id";

const UPDATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub app_secret: String,
    pub app_id: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str, app_secret: &str) -> Self {
        Self::with_app_id(email, password, app_secret, DEFAULT_APP_ID)
    }

    pub fn with_app_id(email: &str, password: &str, app_secret: &str, app_id: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            app_secret: app_secret.to_string(),
            app_id: app_id.to_string(),
        }
    }
}

/// Property codes the water heater exposes for the values we care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyCode {
    CurrentTemp,
    TargetTemp,
    TempDelta,
    OnState,
}

impl PropertyCode {
    pub fn code(&self) -> &'static str {
        match self {
            PropertyCode::CurrentTemp => "F103",
            PropertyCode::TargetTemp => "F11",
            PropertyCode::TempDelta => "F12",
            PropertyCode::OnState => "F104",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PropertyCode::CurrentTemp => "Current temperature",
            PropertyCode::TargetTemp => "Target temperature",
            PropertyCode::TempDelta => "Temperature delta",
            PropertyCode::OnState => "Power",
        }
    }
}

impl fmt::Display for PropertyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Snapshot of one device property as returned by the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub key: String,
    pub value: String,
    pub data_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyEnvelope {
    pub property: RawProperty,
}

#[derive(Debug, Deserialize)]
pub struct RawProperty {
    pub name: String,
    #[serde(default)]
    pub key: serde_json::Value,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub data_updated_at: Option<String>,
}

impl From<RawProperty> for Property {
    fn from(raw: RawProperty) -> Self {
        Self {
            data_updated_at: raw.data_updated_at.as_deref().and_then(parse_updated_at),
            name: raw.name,
            key: stringify_value(&raw.key),
            value: stringify_value(&raw.value),
        }
    }
}

/// Parses `data_updated_at`. Anything not in `YYYY-MM-DDTHH:MM:SSZ` form is dropped.
pub fn parse_updated_at(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, UPDATED_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// The cloud sends keys and values as strings, numbers or booleans depending
/// on the property type; callers always get a string.
fn stringify_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct DatapointRequest {
    pub datapoint: Datapoint,
}

#[derive(Debug, Serialize)]
pub struct Datapoint {
    pub value: String,
}

impl DatapointRequest {
    pub fn new(value: impl fmt::Display) -> Self {
        Self {
            datapoint: Datapoint {
                value: value.to_string(),
            },
        }
    }
}
