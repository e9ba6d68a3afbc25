//! Request/response framing between the host and the provider process
//!
//! One JSON object per line in each direction. Responses may arrive out of
//! order; the host correlates them by `id`.
//!
//! ```text
//! -> {"id": 1, "kind": "resource", "type": "phpipam_section", "op": "create", "attrs": {"name": "prod"}}
//! <- {"id": 1, "ok": true, "result": {"id": "3", "section_id": 3, "name": "prod", ...}}
//! -> {"id": 2, "kind": "data_source", "type": "phpipam_subnet", "attrs": {"subnet_id": 99}}
//! <- {"id": 2, "ok": false, "error_kind": "not_found", "error": "Not found: ..."}
//! ```
//!
//! `error_kind` is the snake_case name of the core error variant, or
//! `invalid_request` when the line itself could not be served.

use phpipam_core::{Error, Operation, ResourceRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Which handler table a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Resource,
    DataSource,
}

/// One lifecycle request from the host
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub kind: HandlerKind,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Required for resources, ignored for data sources
    #[serde(default)]
    pub op: Option<Operation>,
    #[serde(default)]
    pub attrs: Value,
}

/// Outcome of one request
#[derive(Debug, Serialize, PartialEq)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Kind reported for requests that never reached a handler
pub const INVALID_REQUEST: &str = "invalid_request";

impl Response {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error_kind: None,
            error: None,
        }
    }

    pub fn failure(id: Value, kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error_kind: Some(kind),
            error: Some(error.into()),
        }
    }

    fn from_error(id: Value, error: &Error) -> Self {
        Self::failure(id, error.kind(), error.to_string())
    }
}

/// Decode one input line into a request
///
/// A line that is not a valid request still yields a response carrying
/// whatever `id` could be recovered.
pub fn parse(line: &str) -> Result<Request, Response> {
    serde_json::from_str(line).map_err(|e| {
        let id = serde_json::from_str::<Value>(line)
            .ok()
            .and_then(|v| v.get("id").cloned())
            .unwrap_or(Value::Null);
        Response::failure(id, INVALID_REQUEST, format!("invalid request: {}", e))
    })
}

/// Run one request against the registry
pub async fn dispatch(registry: &ResourceRegistry, request: Request) -> Response {
    let Request {
        id,
        kind,
        type_name,
        op,
        attrs,
    } = request;

    let result = match kind {
        HandlerKind::Resource => {
            let Some(op) = op else {
                return Response::failure(
                    id,
                    INVALID_REQUEST,
                    format!("op is required for resource {}", type_name),
                );
            };
            debug!("{:?} {} (request {})", op, type_name, id);
            registry.call_resource(&type_name, op, attrs).await
        }
        HandlerKind::DataSource => {
            debug!("Read data source {} (request {})", type_name, id);
            registry.call_data_source(&type_name, attrs).await
        }
    };

    match result {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::from_error(id, &e),
    }
}
