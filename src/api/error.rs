use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::registry::OpError;

/// HTTP-facing error. Serializes as `{code, message, ...context}` where the
/// context keys depend on the variant.
#[derive(Debug)]
pub struct ApiError(pub OpError);

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(OpError::invalid(message))
    }

    pub fn missing_fields(message: impl Into<String>, fields: Vec<&'static str>) -> Self {
        Self(OpError::InvalidRequest {
            message: message.into(),
            required_fields: fields,
        })
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(OpError::NotFound(message.into()))
    }
}

impl From<OpError> for ApiError {
    fn from(err: OpError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(OpError::Internal(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, context) = match self.0 {
            OpError::Unauthenticated => (
                StatusCode::FORBIDDEN,
                "Invalid or missing credentials.".to_string(),
                Value::Null,
            ),
            OpError::InvalidRequest {
                message,
                required_fields,
            } => {
                let context = if required_fields.is_empty() {
                    Value::Null
                } else {
                    json!({ "required_fields": required_fields })
                };
                (StatusCode::UNPROCESSABLE_ENTITY, message, context)
            }
            OpError::NotFound(message) => (StatusCode::NOT_FOUND, message, Value::Null),
            OpError::Forbidden {
                message,
                needed_permission,
            } => {
                let context = match needed_permission {
                    Some(needed) => json!({ "needed_permission": needed }),
                    None => Value::Null,
                };
                (StatusCode::FORBIDDEN, message, context)
            }
            OpError::Conflict { message, link } => {
                let context = match link {
                    Some(link) => json!({ "link": link }),
                    None => Value::Null,
                };
                (StatusCode::CONFLICT, message, context)
            }
            OpError::Internal(err) => {
                tracing::error!("Request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred.".to_string(),
                    Value::Null,
                )
            }
        };

        // The body's `code` repeats the HTTP status for clients that only
        // look at the payload.
        let mut body = json!({ "code": status.as_u16(), "message": message });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), context.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }

        (status, Json(body)).into_response()
    }
}
