//! Port for the scanner's keyed control API.
//!
//! Every higher-level operation in the pipeline is expressed in terms of a
//! single `call(component, category, method, params)` shape, mirroring the
//! scanner's `/JSON/{component}/{view|action}/{method}/` endpoint layout.
//! Responses come back as one of three shapes: a scalar element, a named
//! set, or a list.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Whether a call reads state (`view`) or mutates it (`action`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCategory {
    View,
    Action,
}

impl ApiCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Action => "action",
        }
    }
}

/// Errors from a single control-API call.
///
/// Callers decide per call whether a failure is fatal (context creation,
/// authentication setup) or a soft build-success flag flip (site pruning,
/// report export).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure calling {component}/{method}: {reason}")]
    Transport {
        component: String,
        method: String,
        reason: String,
    },

    #[error("HTTP {status} from {component}/{method}: {body}")]
    Http {
        component: String,
        method: String,
        status: u16,
        body: String,
    },

    #[error("scanner rejected {component}/{method}: {message}")]
    Rejected {
        component: String,
        method: String,
        message: String,
    },

    #[error("could not decode response from {component}/{method}: {reason}")]
    Decode {
        component: String,
        method: String,
        reason: String,
    },

    #[error("unexpected response shape: {reason}")]
    Shape { reason: String },
}

/// A decoded control-API response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// A single scalar value, e.g. a status percentage or a created ID.
    Element(String),
    /// A named record, e.g. one alert or one user.
    Set(BTreeMap<String, Value>),
    /// A sequence of nested responses, e.g. the alert listing.
    List(Vec<ApiResponse>),
}

impl ApiResponse {
    /// Decode the scanner's JSON envelope.
    ///
    /// The envelope is an object with a single key whose value determines
    /// the shape; multi-key objects are already the record itself.
    pub fn from_json(body: &Value) -> Result<Self, ApiError> {
        let obj = body.as_object().ok_or_else(|| ApiError::Shape {
            reason: format!("expected a JSON object, got {body}"),
        })?;
        if obj.len() == 1 {
            if let Some((_, inner)) = obj.iter().next() {
                return Self::from_inner(inner);
            }
        }
        Ok(Self::Set(
            obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))
    }

    fn from_inner(value: &Value) -> Result<Self, ApiError> {
        match value {
            Value::String(s) => Ok(Self::Element(s.clone())),
            Value::Number(n) => Ok(Self::Element(n.to_string())),
            Value::Bool(b) => Ok(Self::Element(b.to_string())),
            Value::Array(items) => Ok(Self::List(
                items
                    .iter()
                    .map(Self::from_inner)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Value::Object(map) => Ok(Self::Set(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Value::Null => Ok(Self::Element(String::new())),
        }
    }

    /// The scalar value of an `Element` response.
    pub fn element_value(&self) -> Result<&str, ApiError> {
        match self {
            Self::Element(v) => Ok(v),
            other => Err(ApiError::Shape {
                reason: format!("expected a scalar element, got {other:?}"),
            }),
        }
    }

    /// The scalar value parsed as an integer (spider/active-scan progress).
    pub fn element_as_int(&self) -> Result<i64, ApiError> {
        let raw = self.element_value()?;
        raw.parse().map_err(|_| ApiError::Shape {
            reason: format!("expected an integer element, got [ {raw} ]"),
        })
    }

    /// A named field of a `Set` response, stringified.
    pub fn set_field(&self, name: &str) -> Result<String, ApiError> {
        match self {
            Self::Set(fields) => fields
                .get(name)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .ok_or_else(|| ApiError::Shape {
                    reason: format!("set has no field [ {name} ]"),
                }),
            other => Err(ApiError::Shape {
                reason: format!("expected a set, got {other:?}"),
            }),
        }
    }

    /// The items of a `List` response.
    pub fn list_items(&self) -> Result<&[ApiResponse], ApiError> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(ApiError::Shape {
                reason: format!("expected a list, got {other:?}"),
            }),
        }
    }
}

/// Typed wrapper over the scanner's keyed control endpoint.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Issue one keyed request and decode the typed response.
    async fn call(
        &self,
        component: &str,
        category: ApiCategory,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResponse, ApiError>;

    /// Fetch an opaque byte payload from the scanner's `OTHER` surface
    /// (the built-in report renderers).
    async fn fetch_other(
        &self,
        component: &str,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<u8>, ApiError>;
}
