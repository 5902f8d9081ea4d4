//! IPC protocol between hotpluggerd and its clients
//!
//! Newline-delimited JSON over a Unix socket. Each line is one
//! [`RequestEnvelope`] or [`ResponseEnvelope`]; ids correlate the two.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use hp_error::{ErrorKind, HotplugError};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Longest driver name accepted on the wire. Longer names would be
/// truncated by the arbiter anyway; anything this long is garbage.
const MAX_NAME_INPUT: usize = 128;

/// Longest value accepted for an attribute store
const MAX_STORE_VALUE: usize = 256;

/// Attributes of the control surface
pub const ATTRIBUTE_NAMES: &[&str] = &[
    "available_drivers",
    "disable_driver",
    "enable_driver",
    "enabled",
];

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Read a control-surface attribute
    Show { attribute: String },
    /// Write a control-surface attribute
    Store { attribute: String, value: String },
    /// Structured listing of every registered driver
    ListDrivers,
    EnableDriver { name: String },
    DisableDriver { name: String },
    /// Make room for the named driver by disabling its conflicting peers
    ResolveConflicts { name: String },
    GetGate,
    SetGate { open: bool },
}

impl Request {
    /// Validate request parameters before sending to daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping
            | Request::Version
            | Request::ListDrivers
            | Request::GetGate
            | Request::SetGate { .. } => Ok(()),

            Request::Show { attribute } => validate_attribute(attribute),

            Request::Store { attribute, value } => {
                validate_attribute(attribute)?;
                validate_store_value(value)
            }

            Request::EnableDriver { name }
            | Request::DisableDriver { name }
            | Request::ResolveConflicts { name } => validate_driver_name(name),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::Show { .. } => "Show",
            Request::Store { .. } => "Store",
            Request::ListDrivers => "ListDrivers",
            Request::EnableDriver { .. } => "EnableDriver",
            Request::DisableDriver { .. } => "DisableDriver",
            Request::ResolveConflicts { .. } => "ResolveConflicts",
            Request::GetGate => "GetGate",
            Request::SetGate { .. } => "SetGate",
        }
    }

    /// Whether the request can change driver or gate state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Request::Store { .. }
                | Request::EnableDriver { .. }
                | Request::DisableDriver { .. }
                | Request::ResolveConflicts { .. }
                | Request::SetGate { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { kind: ErrorKind, message: String },
}

/// One registered driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub name: String,
    pub enabled: bool,
    pub can_transition: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// What a conflict resolution did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub requester: String,
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub exempt: Vec<String>,
    #[serde(default)]
    pub untouched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drivers: Option<Vec<DriverInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_open: Option<bool>,
    /// Whether a direct transition actually changed the driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    /// Bytes consumed by an attribute store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed: Option<usize>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn driver_list(d: Vec<DriverInfo>) -> Self { Self { drivers: Some(d), ..Self::default() } }
    pub fn resolved(r: ResolutionSummary) -> Self { Self { resolution: Some(r), ..Self::default() } }
    pub fn gate(open: bool) -> Self { Self { gate_open: Some(open), ..Self::default() } }
    pub fn transition(applied: bool) -> Self { Self { applied: Some(applied), ..Self::default() } }
    pub fn stored(n: usize) -> Self { Self { consumed: Some(n), ..Self::default() } }
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn error(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: msg.into(),
        }
    }

    /// Map an arbiter error to the wire
    pub fn from_error(e: &HotplugError) -> Self {
        Response::error(e.kind(), e.to_string())
    }

    /// Turn a response back into a result on the client side
    pub fn into_result(self) -> Result<ResponseData, HotplugError> {
        match self {
            Response::Ok(data) => Ok(data),
            Response::Error { kind, message } => Err(HotplugError::Remote { kind, message }),
        }
    }
}

pub fn validate_attribute(attribute: &str) -> Result<(), String> {
    let name = attribute.trim();
    let name = name.strip_prefix("hotplugger/").unwrap_or(name);
    if ATTRIBUTE_NAMES.contains(&name) {
        Ok(())
    } else {
        Err(format!("Unknown attribute: {}", truncate_for_message(attribute)))
    }
}

pub fn validate_driver_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Driver name cannot be empty".into());
    }
    if name.len() > MAX_NAME_INPUT {
        return Err(format!(
            "Driver name too long: {} > {} bytes",
            name.len(),
            MAX_NAME_INPUT
        ));
    }
    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err("Driver name contains whitespace or control characters".into());
    }
    Ok(())
}

pub fn validate_store_value(value: &str) -> Result<(), String> {
    if value.len() > MAX_STORE_VALUE {
        return Err(format!(
            "Value too long: {} > {} bytes",
            value.len(),
            MAX_STORE_VALUE
        ));
    }
    if value.chars().any(|c| c.is_control() && c != '\n') {
        return Err("Value contains control characters".into());
    }
    Ok(())
}

fn truncate_for_message(s: &str) -> String {
    s.chars().take(32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let env = RequestEnvelope::with_id(
            Request::EnableDriver {
                name: "alucard".into(),
            },
            7,
        );
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"cmd":"EnableDriver","data":{"name":"alucard"}}"#
        );

        let back: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.request.type_name(), "EnableDriver");
    }

    #[test]
    fn test_unit_request_parses() {
        let env: RequestEnvelope = serde_json::from_str(r#"{"id":1,"cmd":"Ping"}"#).unwrap();
        assert_eq!(env.request, Request::Ping);
    }

    #[test]
    fn test_error_response_round_trips_kind() {
        let resp = Response::from_error(&HotplugError::Busy { attempts: 2 });
        let json = serde_json::to_string(&ResponseEnvelope::new(3, resp)).unwrap();
        assert!(json.contains(r#""status":"error""#));
        assert!(json.contains(r#""kind":"busy""#));

        let back: ResponseEnvelope = serde_json::from_str(&json).unwrap();
        let err = back.response.into_result().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ok_response_skips_empty_fields() {
        let json = serde_json::to_string(&Response::Ok(ResponseData::gate(true))).unwrap();
        assert_eq!(json, r#"{"status":"ok","gate_open":true}"#);
    }

    #[test]
    fn test_validation() {
        assert!(Request::Show { attribute: "enabled".into() }.validate().is_ok());
        assert!(Request::Show { attribute: "hotplugger/available_drivers".into() }.validate().is_ok());
        assert!(Request::Show { attribute: "../../etc/passwd".into() }.validate().is_err());
        assert!(Request::EnableDriver { name: "".into() }.validate().is_err());
        assert!(Request::EnableDriver { name: "two words".into() }.validate().is_err());
        assert!(Request::ResolveConflicts { name: "x".repeat(200) }.validate().is_err());
        assert!(Request::Store {
            attribute: "enable_driver".into(),
            value: "alucard\n".into()
        }
        .validate()
        .is_ok());
        assert!(Request::Store {
            attribute: "enable_driver".into(),
            value: "a\u{0}b".into()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_mutating_classification() {
        assert!(Request::SetGate { open: false }.is_mutating());
        assert!(!Request::ListDrivers.is_mutating());
        assert!(!Request::Show { attribute: "enabled".into() }.is_mutating());
    }
}
