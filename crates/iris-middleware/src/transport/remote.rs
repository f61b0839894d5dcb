//! HTTP transport.

use http::HeaderMap;

use super::{CallRequest, RawResponse, TransportFailure, TransportOutcome};
use crate::headers::outbound_headers;
use crate::runtime::ServiceRuntime;

/// Sends `request` to the collection at `base_uri` over HTTP.
///
/// Never fails: transport problems become [`TransportOutcome::Failed`].
pub async fn invoke(runtime: &ServiceRuntime, base_uri: &str, request: &CallRequest) -> TransportOutcome {
    let mut url = format!("{}{}", base_uri.trim_end_matches('/'), request.ident_path());
    let query = request.query();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }

    let body = match request.body_bytes() {
        Ok(body) => body,
        Err(e) => {
            return TransportOutcome::Failed(TransportFailure::Other(format!(
                "could not encode request body: {e}"
            )))
        }
    };

    let headers = outbound_headers(
        &request.context,
        request.session.as_ref().map(|session| &session.session_id),
        &runtime.settings().default_locale,
    );

    let mut builder = runtime
        .http_client()
        .request(request.target.action.http_method(), &url)
        .headers(headers);
    if let Some(body) = body {
        builder = builder.body(body);
    }

    tracing::trace!(url = %url, "Sending inter-resource HTTP request");

    match send(builder).await {
        Ok(raw) => TransportOutcome::Delivered(raw),
        Err(e) => {
            let failure = classify(&e);
            tracing::debug!(url = %url, error = %e, "Inter-resource HTTP request failed");
            TransportOutcome::Failed(failure)
        }
    }
}

async fn send(builder: reqwest::RequestBuilder) -> reqwest::Result<RawResponse> {
    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers: HeaderMap = response.headers().clone();
    let body = response.bytes().await?;
    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

/// Timeouts are checked first; a connect timeout is still a timeout.
fn classify(error: &reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::TimedOut
    } else if error.is_connect() {
        TransportFailure::Unreachable(error.to_string())
    } else {
        TransportFailure::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deriver::{derive, CallOverrides, ParentContext};
    use iris_core::{Action, InteractionId, ListParameters, RequestSnapshot, Target};

    fn request() -> CallRequest {
        let parent = ParentContext::from_request(InteractionId::new(), None, &RequestSnapshot::default());
        CallRequest {
            target: Target::new("Widget", 1, Action::Show),
            context: derive(&parent, Action::Show, &CallOverrides::default()),
            session: None,
            ident: Some("x".into()),
            body: None,
            list: ListParameters::default(),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let runtime = ServiceRuntime::builder().build().unwrap();
        let outcome = invoke(&runtime, &format!("http://{addr}/v1/widgets"), &request()).await;

        assert!(matches!(
            outcome,
            TransportOutcome::Failed(TransportFailure::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_is_other() {
        let runtime = ServiceRuntime::builder().build().unwrap();
        let outcome = invoke(&runtime, "not a url", &request()).await;
        assert!(matches!(
            outcome,
            TransportOutcome::Failed(TransportFailure::Other(_))
        ));
    }
}
