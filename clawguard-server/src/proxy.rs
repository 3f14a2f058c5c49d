//! The request pipeline.
//!
//! identity check -> routing -> SSRF/allowlist guard -> policy and
//! approval -> credential injection -> upstream forwarding -> audit.
//! Every terminal outcome writes exactly one audit row; the success
//! row is written only after the response body has fully streamed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{AUTHORIZATION, HOST, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use clawguard_core::audit::RequestOutcome;
use clawguard_core::guard;
use clawguard_core::services::CredentialRecipe;

use crate::capture::truncate_payload;
use crate::error::GatewayHttpError;
use crate::routing::{build_upstream_url, inject_query_param, resolve_route};
use crate::state::{
    AppState, AGENT_KEY_HEADER, LEGACY_AGENT_KEY_HEADER, STRIPPED_HEADER_PREFIXES,
};

/// Check the shared agent secret (canonical header or legacy alias).
pub(crate) fn verify_agent_key(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(), GatewayHttpError> {
    let presented = headers
        .get(AGENT_KEY_HEADER)
        .or_else(|| headers.get(LEGACY_AGENT_KEY_HEADER))
        .and_then(|v| v.to_str().ok());
    match presented {
        Some(key) if key == state.settings.agent_key => Ok(()),
        _ => Err(GatewayHttpError::Unauthorized),
    }
}

/// Catch-all handler running the full pipeline.
///
/// The pipeline runs in its own task: a client disconnect drops this
/// handler but not the approval wait, so a late decision still
/// installs its grant and lands in the audit store even though the
/// response write is aborted. The task boundary also turns a panic
/// anywhere in the pipeline into a 500 instead of a dead connection.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let agent_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match tokio::spawn(run_pipeline(state, agent_ip, request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(error)) => error.into_response(),
        Err(join_error) => {
            tracing::error!(error = %join_error, "request pipeline aborted");
            GatewayHttpError::Internal(join_error.to_string()).into_response()
        }
    }
}

async fn run_pipeline(
    state: AppState,
    agent_ip: String,
    request: Request,
) -> Result<Response, GatewayHttpError> {
    verify_agent_key(&state, request.headers())?;

    let (parts, body) = request.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    // Reserved introspection/admin prefix is never a service.
    if path.starts_with("/__") {
        return Err(GatewayHttpError::UnknownEndpoint(path));
    }

    let host = parts.headers.get(HOST).and_then(|v| v.to_str().ok());
    let route = resolve_route(&state.table, &target, &path, host)?;
    let service = route.service;
    let upstream_path = route.upstream_path;
    let policy_path = upstream_path
        .split(['?', '#'])
        .next()
        .unwrap_or("/")
        .to_string();

    // Upstream URL construction, then the runtime host-pin and the
    // static allowlist/private-IP checks on the result.
    let mut upstream_url = match build_upstream_url(&service.upstream, &upstream_path) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(service = %service.name, error = %e, "upstream URL construction failed");
            record_audit(
                &state,
                denied_outcome(&service.name, &method, &policy_path, &agent_ip, false, None),
            );
            return Err(GatewayHttpError::SecurityPolicy);
        }
    };
    if let Err(e) = guard::pin_upstream_host(&upstream_url, &service.upstream)
        .and_then(|_| guard::check_upstream_url(&upstream_url, &state.settings.security))
    {
        tracing::warn!(
            service = %service.name,
            url = %upstream_url,
            error = %e,
            "request blocked by security guard"
        );
        record_audit(
            &state,
            denied_outcome(&service.name, &method, &policy_path, &agent_ip, false, None),
        );
        return Err(GatewayHttpError::SecurityPolicy);
    }

    // Buffer the inbound body under the framing-layer ceiling before
    // anyone is asked to approve it.
    let body_bytes = match to_bytes(body, state.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to buffer request body");
            return Err(GatewayHttpError::BodyTooLarge);
        }
    };
    let request_capture = state.settings.capture_payloads.then(|| {
        truncate_payload(
            &body_bytes,
            state.settings.max_payload_log_size,
            Some(body_bytes.len()),
        )
    });

    // Policy and, where required, the human round trip.
    let approved = state
        .coordinator
        .check(&service, method.as_str(), &policy_path, &agent_ip)
        .await;
    if !approved {
        record_audit(
            &state,
            denied_outcome(
                &service.name,
                &method,
                &policy_path,
                &agent_ip,
                false,
                request_capture,
            ),
        );
        return Err(GatewayHttpError::ApprovalDenied);
    }

    // Header shaping: drop gateway-internal headers and Host, then
    // inject the credential so it can never be echoed from the agent.
    let mut headers = HeaderMap::new();
    for (name, value) in parts.headers.iter() {
        if *name == HOST || is_gateway_internal(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    match &service.credentials {
        CredentialRecipe::Bearer { token } => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        CredentialRecipe::Header { name, token } => {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayHttpError::Internal(format!("credential header: {e}")))?;
            headers.insert(name, header_value(token)?);
        }
        CredentialRecipe::Query { name, token } => {
            inject_query_param(&mut upstream_url, name, token);
        }
    }

    tracing::debug!(service = %service.name, method = %method, url = %upstream_url, "forwarding upstream");

    let mut upstream_request = state
        .client
        .request(method.clone(), upstream_url.as_str())
        .headers(headers);
    if !body_bytes.is_empty() {
        upstream_request = upstream_request.body(body_bytes);
    }

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(service = %service.name, error = %message, "upstream request failed");
            record_audit(
                &state,
                RequestOutcome {
                    service: service.name.clone(),
                    method: method.to_string(),
                    path: policy_path,
                    approved: true,
                    response_status: Some(StatusCode::BAD_GATEWAY.as_u16()),
                    agent_ip,
                    request_body: request_capture,
                    response_body: None,
                },
            );
            return Err(GatewayHttpError::Upstream(message));
        }
    };

    // Redirect re-validation. Following is disabled; a safe 3xx is
    // passed through untouched, an unsafe one terminates the request.
    let status = upstream_response.status();
    if status.is_redirection() {
        if let Some(location) = upstream_response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            if let Err(e) = guard::check_redirect(
                location,
                &upstream_url,
                &service.upstream,
                &state.settings.security,
            ) {
                tracing::warn!(
                    service = %service.name,
                    location,
                    error = %e,
                    "upstream redirect blocked"
                );
                record_audit(
                    &state,
                    RequestOutcome {
                        service: service.name.clone(),
                        method: method.to_string(),
                        path: policy_path,
                        // The approval was spent even though the
                        // response is a 403.
                        approved: true,
                        response_status: Some(StatusCode::FORBIDDEN.as_u16()),
                        agent_ip,
                        request_body: request_capture,
                        response_body: None,
                    },
                );
                return Err(GatewayHttpError::RedirectBlocked);
            }
        }
    }

    // Pass the response through, preserving status and headers as
    // received. The audit row is written by the stream wrapper after
    // the final chunk.
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream_response.headers().iter() {
        builder = builder.header(name, value);
    }

    let audit = Arc::clone(&state.audit);
    let capture = state.settings.capture_payloads;
    let cap = state.settings.max_payload_log_size;
    let mut outcome = RequestOutcome {
        service: service.name.clone(),
        method: method.to_string(),
        path: policy_path,
        approved: true,
        response_status: Some(status.as_u16()),
        agent_ip,
        request_body: request_capture,
        response_body: None,
    };
    let mut upstream_body = upstream_response.bytes_stream();
    let body = Body::from_stream(async_stream::stream! {
        let mut captured: Vec<u8> = Vec::new();
        let mut total: usize = 0;
        let mut complete = true;
        while let Some(chunk) = upstream_body.next().await {
            match chunk {
                Ok(bytes) => {
                    total += bytes.len();
                    if capture && captured.len() < cap {
                        let take = (cap - captured.len()).min(bytes.len());
                        captured.extend_from_slice(&bytes[..take]);
                    }
                    yield Ok::<_, std::io::Error>(bytes);
                }
                Err(e) => {
                    complete = false;
                    tracing::warn!(error = %e, "upstream body stream failed");
                    yield Err(std::io::Error::other(e));
                    break;
                }
            }
        }
        if capture {
            outcome.response_body = Some(truncate_payload(&captured, cap, complete.then_some(total)));
        }
        if let Err(e) = audit.record_request(&outcome) {
            tracing::error!(error = %e, "failed to write audit record");
        }
    });

    builder
        .body(body)
        .map_err(|e| GatewayHttpError::Internal(e.to_string()))
}

fn is_gateway_internal(name: &HeaderName) -> bool {
    let name = name.as_str();
    name == AGENT_KEY_HEADER
        || name == LEGACY_AGENT_KEY_HEADER
        || STRIPPED_HEADER_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

fn header_value(value: &str) -> Result<HeaderValue, GatewayHttpError> {
    HeaderValue::from_str(value)
        .map_err(|e| GatewayHttpError::Internal(format!("credential value: {e}")))
}

fn denied_outcome(
    service: &str,
    method: &Method,
    path: &str,
    agent_ip: &str,
    approved: bool,
    request_body: Option<String>,
) -> RequestOutcome {
    RequestOutcome {
        service: service.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        approved,
        response_status: Some(StatusCode::FORBIDDEN.as_u16()),
        agent_ip: agent_ip.to_string(),
        request_body,
        response_body: None,
    }
}

/// Audit writes never affect the response; failures are logged only.
fn record_audit(state: &AppState, outcome: RequestOutcome) {
    if let Err(e) = state.audit.record_request(&outcome) {
        tracing::error!(error = %e, "failed to write audit record");
    }
}
