//! Gateway middleware.
//!
//! Wraps the whole application. For each request it:
//!
//! 1. Runs the [`Pipeline`] request stages.
//! 2. Forwards the request when a granted route rule carries a target URL, or
//!    hands it to the local router with the rewritten URI and the principal
//!    in extensions.
//!
//! Security headers and CORS are router layers outside this one, see
//! [`crate::pipeline::with_response_decorators`].

use crate::observability::metrics::{record_error, record_gateway_decision};
use crate::observability::{record_gateway_event, ErrorCategory, EventKind};
use crate::pipeline::{Decision, Pipeline, RequestContext, StageOutcome};
use crate::proxy::{ForwardRequest, Forwarder};
use axum::{
    body::Body,
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// State for the gateway middleware.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Pipeline,
    pub forwarder: Forwarder,
}

#[instrument(skip_all, name = "gw.middleware.gateway")]
pub async fn gateway_layer(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let mut ctx = RequestContext::from_parts(&parts);

    match state.pipeline.run(&mut ctx).await {
        StageOutcome::Respond(response) => {
            report_short_circuit(&ctx);
            response
        }
        StageOutcome::Continue => {
            let target = ctx.granted_rule().and_then(|rule| rule.target_url.clone());
            match target {
                Some(target) => forward(&state.forwarder, &ctx, &target, body).await,
                None => {
                    if let Some(decision) = ctx.decision {
                        record_gateway_decision(decision.as_str());
                    }
                    match ctx.path_and_query().parse::<Uri>() {
                        Ok(uri) => parts.uri = uri,
                        Err(e) => {
                            tracing::warn!(
                                target: "gw.pipeline",
                                error = %e,
                                "Rewritten URI invalid, keeping original"
                            );
                        }
                    }
                    if let Some(principal) = ctx.principal.take() {
                        parts.extensions.insert(principal);
                    }
                    next.run(Request::from_parts(parts, body)).await
                }
            }
        }
    }
}

fn report_short_circuit(ctx: &RequestContext) {
    match ctx.decision {
        Some(decision @ (Decision::Unauthenticated | Decision::Forbidden | Decision::Error)) => {
            record_gateway_event(
                EventKind::Denied,
                ctx.method.as_str(),
                &ctx.path,
                ctx.principal.as_ref(),
                decision.as_str(),
            );
        }
        Some(decision) => record_gateway_decision(decision.as_str()),
        None => {}
    }
}

async fn forward(forwarder: &Forwarder, ctx: &RequestContext, target: &str, body: Body) -> Response {
    let result = forwarder
        .forward(ForwardRequest {
            method: ctx.method.clone(),
            target_url: target,
            query: ctx.query.as_deref(),
            headers: &ctx.headers,
            principal: ctx.principal.as_ref(),
            body,
        })
        .await;

    match result {
        Ok(response) => {
            record_gateway_event(
                EventKind::Forwarded,
                ctx.method.as_str(),
                &ctx.path,
                ctx.principal.as_ref(),
                "forwarded",
            );
            response
        }
        Err(e) => {
            let category = ErrorCategory::from(&e);
            record_gateway_event(
                EventKind::ForwardFailed,
                ctx.method.as_str(),
                &ctx.path,
                ctx.principal.as_ref(),
                "forward_failed",
            );
            record_error("forward", category.as_str(), e.status_code());
            e.into_response()
        }
    }
}
