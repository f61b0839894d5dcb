//! Response rendering.
//!
//! Turns a finished [`Response`] into the status, headers and JSON body sent
//! to the caller. The same rendering is used for HTTP replies, queue replies
//! and local calls, so every transport sees the same shape:
//!
//! - errors become an errors document carrying the interaction id;
//! - list results become `{"_data": [...], "_dataset_size": n}`;
//! - single resources are rendered as themselves;
//! - a deja-vu request answered only with duplication errors becomes an
//!   empty `204` with `X-Deja-Vu: confirmed`.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};
use iris_core::{Action, ErrorCollection, InteractionId, IrisError, Response, ResponseBody};
use serde_json::{json, Map, Value};

use crate::headers::{DEJA_VU_CONFIRMED, JSON_CONTENT_TYPE, X_DEJA_VU, X_INTERACTION_ID};
use crate::transport::RawResponse;

/// Renders `response` to the reply of an `action` request.
#[must_use]
pub fn render(
    response: &Response,
    interaction_id: &InteractionId,
    action: Action,
    deja_vu: bool,
) -> RawResponse {
    let mut raw = if response.errors.has_errors() {
        if deja_vu && response.errors.is_deja_vu_confirmable() {
            confirmed_deja_vu(interaction_id)
        } else {
            render_errors(&response.errors, interaction_id)
        }
    } else {
        json_reply(200, interaction_id, &render_body(response.body(), action))
    };

    for (name, value) in response.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                raw.headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid response header"),
        }
    }
    raw
}

/// Renders an errors document.
#[must_use]
pub fn render_errors(errors: &ErrorCollection, interaction_id: &InteractionId) -> RawResponse {
    let document = errors.to_document(Some(&interaction_id.to_string()));
    json_reply(errors.http_status(), interaction_id, &document)
}

/// Renders the `platform.fault` reply for a fatal error.
#[must_use]
pub fn render_fault(error: &IrisError, interaction_id: &InteractionId) -> RawResponse {
    render_errors(&error.to_error_collection(), interaction_id)
}

fn render_body(body: &ResponseBody, action: Action) -> Value {
    match body {
        ResponseBody::Resource(resource) => resource.clone(),
        ResponseBody::Collection {
            items,
            dataset_size,
            estimated_dataset_size,
        } => {
            let mut envelope = Map::new();
            envelope.insert("_data".into(), Value::Array(items.clone()));
            if let Some(size) = dataset_size {
                envelope.insert("_dataset_size".into(), json!(size));
            }
            if let Some(size) = estimated_dataset_size {
                envelope.insert("_estimated_dataset_size".into(), json!(size));
            }
            Value::Object(envelope)
        }
        ResponseBody::Empty if action.returns_collection() => json!({ "_data": [] }),
        ResponseBody::Empty => json!({}),
    }
}

fn json_reply(status: u16, interaction_id: &InteractionId, body: &Value) -> RawResponse {
    let mut headers = base_headers(interaction_id);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    RawResponse {
        status,
        headers,
        body: Bytes::from(body.to_string()),
    }
}

fn confirmed_deja_vu(interaction_id: &InteractionId) -> RawResponse {
    let mut headers = base_headers(interaction_id);
    headers.insert(X_DEJA_VU.clone(), HeaderValue::from_static(DEJA_VU_CONFIRMED));
    RawResponse {
        status: 204,
        headers,
        body: Bytes::new(),
    }
}

fn base_headers(interaction_id: &InteractionId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&interaction_id.to_string()) {
        headers.insert(X_INTERACTION_ID.clone(), value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_core::{codes, ErrorDescriptions, Reference};

    fn response() -> Response {
        Response::new(ErrorDescriptions::platform())
    }

    fn body(raw: &RawResponse) -> Value {
        serde_json::from_slice(&raw.body).unwrap()
    }

    #[test]
    fn test_resource() {
        let mut response = response();
        response.set_resource(json!({"result": {"inner": "shown"}}));
        let raw = render(&response, &InteractionId::new(), Action::Show, false);

        assert_eq!(raw.status, 200);
        assert_eq!(body(&raw), json!({"result": {"inner": "shown"}}));
        assert_eq!(raw.headers.get(CONTENT_TYPE).unwrap(), JSON_CONTENT_TYPE);
    }

    #[test]
    fn test_list_envelope() {
        let mut response = response();
        response.set_resources(vec![json!(1), json!(2)]);
        response.set_dataset_size(7);
        let raw = render(&response, &InteractionId::new(), Action::List, false);
        assert_eq!(body(&raw), json!({"_data": [1, 2], "_dataset_size": 7}));

        let raw = render(&self::response(), &InteractionId::new(), Action::List, false);
        assert_eq!(body(&raw), json!({"_data": []}));
    }

    #[test]
    fn test_errors_document() {
        let id = InteractionId::new();
        let mut response = response();
        response.add_error(codes::PLATFORM_FORBIDDEN, None);
        response.add_error(codes::GENERIC_NOT_FOUND, Some(Reference::new().with("ident", "x")));
        let raw = render(&response, &id, Action::Show, false);

        assert_eq!(raw.status, 403);
        let document = body(&raw);
        assert_eq!(document["kind"], "Errors");
        assert_eq!(document["interaction_id"], id.to_string());
        assert_eq!(document["errors"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_deja_vu_confirmation() {
        let mut response = response();
        response.add_error(codes::GENERIC_INVALID_DUPLICATION, None);

        let raw = render(&response, &InteractionId::new(), Action::Create, true);
        assert_eq!(raw.status, 204);
        assert!(raw.body.is_empty());
        assert_eq!(raw.headers.get(&X_DEJA_VU).unwrap(), "confirmed");

        let raw = render(&response, &InteractionId::new(), Action::Create, false);
        assert_eq!(raw.status, 422);

        response.add_error(codes::GENERIC_MALFORMED, None);
        let raw = render(&response, &InteractionId::new(), Action::Create, true);
        assert_eq!(raw.status, 422);
    }

    #[test]
    fn test_extra_headers() {
        let mut response = response();
        response.add_header("X-Custom", "yes");
        let raw = render(&response, &InteractionId::new(), Action::Show, false);
        assert_eq!(raw.headers.get("x-custom").unwrap(), "yes");
        assert!(raw.headers.contains_key(&X_INTERACTION_ID));
    }

    #[test]
    fn test_fault() {
        let raw = render_fault(&IrisError::configuration("no queue"), &InteractionId::new());
        assert_eq!(raw.status, 500);
        assert_eq!(body(&raw)["errors"][0]["code"], codes::PLATFORM_FAULT);
    }
}
