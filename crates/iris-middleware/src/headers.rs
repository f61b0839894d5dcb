//! Inter-resource HTTP headers.
//!
//! The same header set is used on the wire by the HTTP transport, inside
//! queue messages, and when the inbound server reads a request. Header names
//! are matched case-insensitively.

use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{CONTENT_LANGUAGE, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use iris_core::{AssumedIdentity, InteractionId, SessionId};
use uuid::Uuid;

use crate::deriver::ChildRequestContext;

/// Id of the interaction a request creates.
pub static X_INTERACTION_ID: HeaderName = HeaderName::from_static("x-interaction-id");

/// Id of the interaction that started the call chain.
pub static X_OWNING_INTERACTION_ID: HeaderName =
    HeaderName::from_static("x-owning-interaction-id");

/// Session the request runs under.
pub static X_SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");

/// Historic-read point in time.
pub static X_DATED_AT: HeaderName = HeaderName::from_static("x-dated-at");

/// Backdated-write point in time.
pub static X_DATED_FROM: HeaderName = HeaderName::from_static("x-dated-from");

/// Deja-vu request flag, and confirmation on a 204 reply.
pub static X_DEJA_VU: HeaderName = HeaderName::from_static("x-deja-vu");

/// Caller-chosen UUID for a created instance.
pub static X_RESOURCE_UUID: HeaderName = HeaderName::from_static("x-resource-uuid");

/// Identity assumed for the request.
pub static X_ASSUME_IDENTITY_OF: HeaderName = HeaderName::from_static("x-assume-identity-of");

/// Content type of every JSON body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Value of `X-Deja-Vu` on requests.
pub const DEJA_VU_REQUESTED: &str = "yes";

/// Value of `X-Deja-Vu` on a confirmed duplicate.
pub const DEJA_VU_CONFIRMED: &str = "confirmed";

/// Formats a timestamp for `X-Dated-At` and `X-Dated-From`.
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Builds the headers of an outbound inter-resource request.
///
/// `Content-Language` is omitted when the locale is `default_locale`.
#[must_use]
pub fn outbound_headers(
    child: &ChildRequestContext,
    session_id: Option<&SessionId>,
    default_locale: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

    insert(&mut headers, &X_INTERACTION_ID, &child.interaction_id.to_string());
    insert(&mut headers, &X_OWNING_INTERACTION_ID, &child.owning_id.to_string());

    if let Some(session_id) = session_id {
        insert(&mut headers, &X_SESSION_ID, &session_id.to_string());
    }
    if !child.locale.eq_ignore_ascii_case(default_locale) {
        insert(&mut headers, &CONTENT_LANGUAGE, &child.locale);
    }
    if let Some(dated_at) = &child.dated_at {
        insert(&mut headers, &X_DATED_AT, &format_timestamp(dated_at));
    }
    if let Some(dated_from) = &child.dated_from {
        insert(&mut headers, &X_DATED_FROM, &format_timestamp(dated_from));
    }
    if child.deja_vu {
        headers.insert(X_DEJA_VU.clone(), HeaderValue::from_static(DEJA_VU_REQUESTED));
    }
    if let Some(uuid) = &child.resource_uuid {
        insert(&mut headers, &X_RESOURCE_UUID, &uuid.to_string());
    }
    if let Some(identity) = &child.assume_identity_of {
        insert(&mut headers, &X_ASSUME_IDENTITY_OF, &identity.to_header_value());
    }

    headers
}

fn insert(headers: &mut HeaderMap, name: &HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name.clone(), value);
        }
        Err(_) => {
            tracing::warn!(header = %name, "Dropping header with invalid value");
        }
    }
}

/// Header values read from an inbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundHeaders {
    /// Interaction id chosen by the caller.
    pub interaction_id: Option<InteractionId>,
    /// Owning interaction id of the caller's chain.
    pub owning_interaction_id: Option<InteractionId>,
    /// Session id.
    pub session_id: Option<SessionId>,
    /// Content locale.
    pub locale: Option<String>,
    /// Historic-read point in time.
    pub dated_at: Option<DateTime<Utc>>,
    /// Backdated-write point in time.
    pub dated_from: Option<DateTime<Utc>>,
    /// Deja-vu flag.
    pub deja_vu: bool,
    /// Caller-chosen UUID for a created instance.
    pub resource_uuid: Option<Uuid>,
    /// Identity assumed for the request.
    pub assume_identity_of: Option<AssumedIdentity>,
}

/// A header that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed header '{0}'")]
pub struct MalformedHeader(pub HeaderName);

impl InboundHeaders {
    /// Reads the inter-resource headers of a request.
    pub fn parse(headers: &HeaderMap) -> Result<Self, MalformedHeader> {
        Ok(Self {
            interaction_id: parse_with(headers, &X_INTERACTION_ID, |v| v.parse().ok())?,
            owning_interaction_id: parse_with(headers, &X_OWNING_INTERACTION_ID, |v| {
                v.parse().ok()
            })?,
            session_id: parse_with(headers, &X_SESSION_ID, |v| v.parse().ok())?,
            locale: parse_with(headers, &CONTENT_LANGUAGE, |v| {
                Some(v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty())
            })?,
            dated_at: parse_with(headers, &X_DATED_AT, parse_timestamp)?,
            dated_from: parse_with(headers, &X_DATED_FROM, parse_timestamp)?,
            deja_vu: parse_with(headers, &X_DEJA_VU, |v| {
                Some(v.eq_ignore_ascii_case(DEJA_VU_REQUESTED))
            })?
            .unwrap_or(false),
            resource_uuid: parse_with(headers, &X_RESOURCE_UUID, |v| Uuid::parse_str(v).ok())?,
            assume_identity_of: parse_with(headers, &X_ASSUME_IDENTITY_OF, |v| {
                AssumedIdentity::parse_header(v).ok()
            })?,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn parse_with<T>(
    headers: &HeaderMap,
    name: &HeaderName,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<Option<T>, MalformedHeader> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(parse)
        .map(Some)
        .ok_or_else(|| MalformedHeader(name.clone()))
}

/// Returns `true` if a reply confirms a deja-vu duplicate.
#[must_use]
pub fn is_deja_vu_confirmed(headers: &HeaderMap) -> bool {
    headers
        .get(&X_DEJA_VU)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case(DEJA_VU_CONFIRMED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use iris_core::Action;

    fn child() -> ChildRequestContext {
        ChildRequestContext {
            interaction_id: InteractionId::new(),
            owning_id: InteractionId::new(),
            action: Action::Create,
            locale: "en-nz".into(),
            dated_at: None,
            dated_from: None,
            deja_vu: false,
            resource_uuid: None,
            assume_identity_of: None,
        }
    }

    #[test]
    fn test_minimal_headers() {
        let headers = outbound_headers(&child(), None, "en-nz");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), JSON_CONTENT_TYPE);
        assert!(headers.contains_key(&X_INTERACTION_ID));
        assert!(!headers.contains_key(CONTENT_LANGUAGE));
        assert!(!headers.contains_key(&X_DEJA_VU));
        assert!(!headers.contains_key(&X_SESSION_ID));
    }

    #[test]
    fn test_headers_survive_the_wire() {
        let dated_from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let mut child = child();
        child.locale = "fr".into();
        child.dated_from = Some(dated_from);
        child.deja_vu = true;
        child.resource_uuid = Some(Uuid::now_v7());
        child.assume_identity_of = Some(AssumedIdentity::new().with("account_id", "a b"));
        let session_id = SessionId::new();

        let headers = outbound_headers(&child, Some(&session_id), "en-nz");
        assert_eq!(
            headers.get(&X_DATED_FROM).unwrap(),
            "2024-03-01T12:30:00.000000000Z"
        );

        let inbound = InboundHeaders::parse(&headers).unwrap();
        assert_eq!(inbound.interaction_id, Some(child.interaction_id));
        assert_eq!(inbound.owning_interaction_id, Some(child.owning_id));
        assert_eq!(inbound.session_id, Some(session_id));
        assert_eq!(inbound.locale.as_deref(), Some("fr"));
        assert_eq!(inbound.dated_from, Some(dated_from));
        assert!(inbound.deja_vu);
        assert_eq!(inbound.resource_uuid, child.resource_uuid);
        assert_eq!(inbound.assume_identity_of, child.assume_identity_of);
    }

    #[test]
    fn test_malformed_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_DATED_AT.clone(), HeaderValue::from_static("yesterday"));
        let err = InboundHeaders::parse(&headers).unwrap_err();
        assert_eq!(err.0, X_DATED_AT);
    }

    #[test]
    fn test_deja_vu_confirmation() {
        let mut headers = HeaderMap::new();
        assert!(!is_deja_vu_confirmed(&headers));
        headers.insert(X_DEJA_VU.clone(), HeaderValue::from_static("confirmed"));
        assert!(is_deja_vu_confirmed(&headers));
    }
}
