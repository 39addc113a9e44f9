//! JSON-RPC 2.0 message values
//!
//! Requests, responses and error objects as they travel on the wire, plus the
//! fixed error-code taxonomy. Nothing here performs I/O.

use std::fmt;

use serde::{
    de::{self, DeserializeOwned},
    ser::SerializeStruct,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::errors::MessageError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier of a request.
///
/// `null` and a missing `id` both decode to [`Id::Absent`], which marks the
/// request as a notification. Numbers compare by value, so `1` and `1.0` are
/// the same identifier.
#[derive(Debug, Clone, Default)]
pub enum Id {
    #[default]
    Absent,
    Number(Number),
    String(String),
}

impl Id {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Absent),
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(string) => Some(Self::String(string.clone())),
            _ => None,
        }
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => numbers_equal(left, right),
            _ => false,
        }
    }
}

fn numbers_equal(left: &Number, right: &Number) -> bool {
    if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
        return left == right;
    }
    if let (Some(left), Some(right)) = (left.as_u64(), right.as_u64()) {
        return left == right;
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("null"),
            Self::Number(number) => write!(f, "{number}"),
            Self::String(string) => write!(f, "{string:?}"),
        }
    }
}

impl From<i32> for Id {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u32> for Id {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Number(number) => number.serialize(serializer),
            Self::String(string) => serializer.serialize_str(string),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid id {value}: expected a string, a number or null"
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Id::is_absent")]
    pub id: Id,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
            id: Id::Absent,
        }
    }

    pub fn with_params<P>(mut self, params: &P) -> Result<Self, MessageError>
    where
        P: Serialize + ?Sized,
    {
        let encoded = serde_json::to_value(params).map_err(MessageError::Params)?;
        self.params = (!encoded.is_null()).then_some(encoded);
        Ok(self)
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = id.into();
        self
    }

    pub fn into_notification(mut self) -> Self {
        self.id = Id::Absent;
        self
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(MessageError::Decode)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_absent()
    }

    pub fn has_supported_version(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION
    }

    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ErrorObject> {
        let params = self.params.as_ref().ok_or_else(ErrorObject::invalid_params)?;
        T::deserialize(params).map_err(|err| {
            ErrorObject::invalid_params().with_data(Value::String(err.to_string()))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Other(i64),
}

impl ErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Other(code) => code,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::Other(_) => "Server error",
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::standard(ErrorCode::ParseError)
    }

    pub fn invalid_request() -> Self {
        Self::standard(ErrorCode::InvalidRequest)
    }

    pub fn method_not_found() -> Self {
        Self::standard(ErrorCode::MethodNotFound)
    }

    pub fn invalid_params() -> Self {
        Self::standard(ErrorCode::InvalidParams)
    }

    pub fn internal_error() -> Self {
        Self::standard(ErrorCode::InternalError)
    }

    fn standard(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

/// A JSON-RPC response. It always carries exactly one of result or error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawResponse")]
pub struct Response {
    jsonrpc: String,
    outcome: Outcome,
    id: Id,
}

impl Response {
    pub fn success(id: impl Into<Id>, result: Value) -> Self {
        Self::with_outcome(id.into(), Outcome::Result(result))
    }

    pub fn failure(id: impl Into<Id>, error: ErrorObject) -> Self {
        Self::with_outcome(id.into(), Outcome::Error(error))
    }

    pub fn from_result(id: impl Into<Id>, result: Result<Value, ErrorObject>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }

    fn with_outcome(id: Id, outcome: Outcome) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome,
            id,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(error) => Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(MessageError::Decode)
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Response", 3)?;
        state.serialize_field("jsonrpc", &self.jsonrpc)?;
        match &self.outcome {
            Outcome::Result(value) => state.serialize_field("result", value)?,
            Outcome::Error(error) => state.serialize_field("error", error)?,
        }
        state.serialize_field("id", &self.id)?;
        state.end()
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    jsonrpc: String,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
    #[serde(default)]
    id: Id,
}

// Keeps `"result": null` distinguishable from a missing result.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawResponse> for Response {
    type Error = String;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        let outcome = match (raw.result, raw.error) {
            (Some(value), None) => Outcome::Result(value),
            (None | Some(Value::Null), Some(error)) => Outcome::Error(error),
            (Some(_), Some(_)) => return Err("response carries both result and error".into()),
            (None, None) => return Err("response carries neither result nor error".into()),
        };

        Ok(Self {
            jsonrpc: raw.jsonrpc,
            outcome,
            id: raw.id,
        })
    }
}

/// A single response, or one response per non-notification member of a
/// batch. Decoding accepts whichever shape the peer sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Batch(Vec<Response>),
    Single(Response),
}

impl Reply {
    pub fn into_responses(self) -> Vec<Response> {
        match self {
            Self::Batch(responses) => responses,
            Self::Single(response) => vec![response],
        }
    }

    pub fn as_single(&self) -> Option<&Response> {
        match self {
            Self::Single(response) => Some(response),
            Self::Batch(_) => None,
        }
    }
}
