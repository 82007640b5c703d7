use super::{Decision, PipelineSettings, RequestContext, RuleLookup, StageOutcome};
use crate::crypto::{bearer_token, TokenCodec};
use crate::errors::GatewayError;
use crate::services::access_policy::{evaluate, AccessDecision};
use crate::services::route_table::RouteTable;
use axum::http::{header::AUTHORIZATION, Method, StatusCode};
use axum::response::IntoResponse;

pub(super) fn path_rewrite(settings: &PipelineSettings, ctx: &mut RequestContext) -> StageOutcome {
    if let Some(rest) = ctx.path.strip_prefix(settings.public_api_prefix.as_str()) {
        let rewritten = format!("{}{}", settings.internal_api_prefix, rest);
        tracing::debug!(
            target: "gw.pipeline",
            from = %ctx.path,
            to = %rewritten,
            "Rewrote public API path"
        );
        ctx.path = rewritten;
    }
    StageOutcome::Continue
}

pub(super) fn cors_preflight(ctx: &mut RequestContext) -> StageOutcome {
    if ctx.method == Method::OPTIONS {
        ctx.decision = Some(Decision::Preflight);
        return StageOutcome::Respond(StatusCode::OK.into_response());
    }
    StageOutcome::Continue
}

pub(super) async fn public_bypass(
    settings: &PipelineSettings,
    routes: &RouteTable,
    ctx: &mut RequestContext,
) -> StageOutcome {
    if settings.is_public_path(&ctx.path) {
        ctx.public = true;
        return StageOutcome::Continue;
    }

    // A failed lookup is retried (and surfaced) by authorize.
    if resolve_rule(routes, ctx).await.is_ok() {
        if let RuleLookup::Found(rule) = &ctx.lookup {
            ctx.public = rule.permit_all;
        }
    }
    StageOutcome::Continue
}

pub(super) fn authenticate(codec: &TokenCodec, ctx: &mut RequestContext) -> StageOutcome {
    if ctx.public {
        return StageOutcome::Continue;
    }

    let Some(token) = ctx
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
    else {
        return StageOutcome::Continue;
    };

    match codec.validate(token) {
        Ok(principal) => ctx.principal = Some(principal),
        Err(e) => {
            tracing::debug!(
                target: "gw.pipeline",
                reason = e.as_str(),
                "Bearer token rejected, continuing as anonymous"
            );
        }
    }
    StageOutcome::Continue
}

pub(super) async fn authorize(
    settings: &PipelineSettings,
    routes: &RouteTable,
    ctx: &mut RequestContext,
) -> StageOutcome {
    if let Err(e) = resolve_rule(routes, ctx).await {
        ctx.decision = Some(Decision::Error);
        return StageOutcome::Respond(e.into_response());
    }

    match &ctx.lookup {
        RuleLookup::Found(rule) => match evaluate(rule, ctx.principal.as_ref()) {
            AccessDecision::Permit => {
                ctx.decision = Some(Decision::Permit);
                StageOutcome::Continue
            }
            AccessDecision::Unauthenticated => {
                ctx.decision = Some(Decision::Unauthenticated);
                StageOutcome::Respond(GatewayError::Unauthenticated.into_response())
            }
            AccessDecision::Forbidden => {
                let provided = ctx.principal.as_ref().map(|p| p.role_mask).unwrap_or(0);
                ctx.decision = Some(Decision::Forbidden);
                StageOutcome::Respond(
                    GatewayError::PermissionDenied {
                        required: rule.access_mask,
                        provided,
                    }
                    .into_response(),
                )
            }
        },
        RuleLookup::Missing | RuleLookup::Pending => {
            if !ctx.public && ctx.principal.is_none() && settings.is_protected_path(&ctx.path) {
                ctx.decision = Some(Decision::Unauthenticated);
                return StageOutcome::Respond(GatewayError::Unauthenticated.into_response());
            }
            ctx.decision = Some(Decision::Passthrough);
            StageOutcome::Continue
        }
    }
}

async fn resolve_rule(routes: &RouteTable, ctx: &mut RequestContext) -> Result<(), GatewayError> {
    if ctx.lookup != RuleLookup::Pending {
        return Ok(());
    }

    ctx.lookup = match routes.find(&ctx.path, ctx.method.as_str()).await {
        Ok(rule) => RuleLookup::Found(rule),
        Err(GatewayError::NotFound(_)) => RuleLookup::Missing,
        Err(e) => {
            tracing::error!(target: "gw.pipeline", error = %e, "Route lookup failed");
            return Err(e);
        }
    };
    Ok(())
}
