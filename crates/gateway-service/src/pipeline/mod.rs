//! Request pipeline.
//!
//! Request stages run in a fixed order and each returns [`StageOutcome`]:
//!
//! 1. `PathRewrite` - public API prefix to internal prefix, query preserved
//! 2. `CorsPreflight` - `OPTIONS` answered with 200 before any auth
//! 3. `PublicBypass` - allow-list and permit-all rules skip authentication
//! 4. `Authenticate` - bearer token to principal; failures stay anonymous
//! 5. `Authorize` - route rule lookup plus access policy
//!
//! Response decorators (security headers, CORS) are router layers wrapped
//! around the gateway middleware by [`with_response_decorators`], so they reach
//! every response, including responses produced by a stage.

mod decorators;
mod stages;

pub use decorators::{
    apply_security_headers, cors_layer, security_headers_middleware, with_response_decorators,
};

use crate::config::Config;
use crate::crypto::TokenCodec;
use crate::models::{Principal, RouteRule};
use crate::services::route_table::RouteTable;
use axum::http::{request::Parts, HeaderMap, Method};
use axum::response::Response;
use std::collections::HashSet;

/// Result of a single stage.
pub enum StageOutcome {
    Continue,
    Respond(Response),
}

/// Request stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    PathRewrite,
    CorsPreflight,
    PublicBypass,
    Authenticate,
    Authorize,
}

impl RequestStage {
    pub const ORDER: [RequestStage; 5] = [
        RequestStage::PathRewrite,
        RequestStage::CorsPreflight,
        RequestStage::PublicBypass,
        RequestStage::Authenticate,
        RequestStage::Authorize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::PathRewrite => "path_rewrite",
            RequestStage::CorsPreflight => "cors_preflight",
            RequestStage::PublicBypass => "public_bypass",
            RequestStage::Authenticate => "authenticate",
            RequestStage::Authorize => "authorize",
        }
    }
}

/// Final pipeline decision, used for the audit event and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Registered rule granted.
    Permit,
    /// No rule; request continues to the local router.
    Passthrough,
    /// CORS preflight answered.
    Preflight,
    Unauthenticated,
    Forbidden,
    /// Route lookup failed.
    Error,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Permit => "permit",
            Decision::Passthrough => "passthrough",
            Decision::Preflight => "preflight",
            Decision::Unauthenticated => "unauthenticated",
            Decision::Forbidden => "forbidden",
            Decision::Error => "error",
        }
    }
}

/// Route lookup state. The lookup happens at most once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLookup {
    Pending,
    Found(RouteRule),
    Missing,
}

/// Per-request state carried through the stages.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    /// Path as received.
    pub original_path: String,
    /// Path after rewriting.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub principal: Option<Principal>,
    /// True when the request matched the public allow-list or a permit-all rule.
    pub public: bool,
    pub lookup: RuleLookup,
    pub decision: Option<Decision>,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        let path = parts.uri.path().to_string();
        Self {
            method: parts.method.clone(),
            original_path: path.clone(),
            path,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            principal: None,
            public: false,
            lookup: RuleLookup::Pending,
            decision: None,
        }
    }

    /// Rewritten path plus the original query string.
    pub fn path_and_query(&self) -> String {
        match self.query.as_deref() {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// The granted rule, once `Authorize` has permitted the request.
    pub fn granted_rule(&self) -> Option<&RouteRule> {
        match (&self.lookup, self.decision) {
            (RuleLookup::Found(rule), Some(Decision::Permit)) => Some(rule),
            _ => None,
        }
    }
}

/// Static settings for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub public_api_prefix: String,
    pub internal_api_prefix: String,
    pub protected_prefixes: Vec<String>,
    pub public_exact: HashSet<String>,
    pub public_prefixes: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let internal = config.internal_api_prefix.as_str();

        let mut public_exact: HashSet<String> = [
            format!("{}auth/login", internal),
            format!("{}auth/refresh", internal),
            format!("{}auth/logout", internal),
            format!("{}user/register", internal),
            "/".to_string(),
            "/Index".to_string(),
            "/Dashboard".to_string(),
        ]
        .into_iter()
        .collect();
        public_exact.extend(config.public_paths.iter().cloned());

        let public_prefixes = ["/oauth2/", "/login/oauth2/", "/css/", "/js/", "/images/", "/html/"]
            .iter()
            .map(|p| p.to_string())
            .collect();

        Self {
            public_api_prefix: config.public_api_prefix.clone(),
            internal_api_prefix: config.internal_api_prefix.clone(),
            protected_prefixes: config.protected_prefixes.clone(),
            public_exact,
            public_prefixes,
        }
    }

    /// Fixed allow-list: exact paths, static/OAuth prefixes, `.html` pages.
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_exact.contains(path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p))
            || path.ends_with(".html")
    }

    pub fn is_protected_path(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|p| path.starts_with(p))
    }
}

/// The request pipeline: ordered stages over shared collaborators.
#[derive(Clone)]
pub struct Pipeline {
    settings: std::sync::Arc<PipelineSettings>,
    codec: TokenCodec,
    routes: RouteTable,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, codec: TokenCodec, routes: RouteTable) -> Self {
        Self {
            settings: std::sync::Arc::new(settings),
            codec,
            routes,
        }
    }

    /// Run the request stages in order, stopping at the first response.
    pub async fn run(&self, ctx: &mut RequestContext) -> StageOutcome {
        for stage in RequestStage::ORDER {
            let outcome = match stage {
                RequestStage::PathRewrite => stages::path_rewrite(&self.settings, ctx),
                RequestStage::CorsPreflight => stages::cors_preflight(ctx),
                RequestStage::PublicBypass => {
                    stages::public_bypass(&self.settings, &self.routes, ctx).await
                }
                RequestStage::Authenticate => stages::authenticate(&self.codec, ctx),
                RequestStage::Authorize => stages::authorize(&self.settings, &self.routes, ctx).await,
            };

            if let StageOutcome::Respond(response) = outcome {
                tracing::debug!(
                    target: "gw.pipeline",
                    stage = stage.as_str(),
                    status = response.status().as_u16(),
                    "Pipeline short-circuited"
                );
                return StageOutcome::Respond(response);
            }
        }

        StageOutcome::Continue
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings() -> PipelineSettings {
        PipelineSettings::from_config(&Config::from_vars(&HashMap::new()).unwrap())
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            RequestStage::ORDER.map(|s| s.as_str()),
            [
                "path_rewrite",
                "cors_preflight",
                "public_bypass",
                "authenticate",
                "authorize"
            ]
        );
    }

    #[test]
    fn test_public_allow_list() {
        let settings = settings();
        assert!(settings.is_public_path("/server/auth/login"));
        assert!(settings.is_public_path("/server/auth/refresh"));
        assert!(settings.is_public_path("/server/auth/logout"));
        assert!(settings.is_public_path("/server/user/register"));
        assert!(settings.is_public_path("/"));
        assert!(settings.is_public_path("/css/site.css"));
        assert!(settings.is_public_path("/login/oauth2/code/google"));
        assert!(settings.is_public_path("/shop/cart.html"));

        assert!(!settings.is_public_path("/server/orders"));
        assert!(!settings.is_public_path("/server/auth/login/extra"));
        assert!(!settings.is_public_path("/cssx/site.css"));
    }

    #[test]
    fn test_configured_public_paths() {
        let config = Config::from_vars(&HashMap::from([(
            "PUBLIC_PATHS".to_string(),
            "/server/garments".to_string(),
        )]))
        .unwrap();
        let settings = PipelineSettings::from_config(&config);
        assert!(settings.is_public_path("/server/garments"));
    }

    #[test]
    fn test_protected_prefixes() {
        let settings = settings();
        assert!(settings.is_protected_path("/server/orders"));
        assert!(!settings.is_protected_path("/health"));
        assert!(!settings.is_protected_path("/api/orders"));
    }

    #[test]
    fn test_path_and_query() {
        let request = axum::http::Request::builder()
            .uri("/api/orders?page=2&size=10")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let mut ctx = RequestContext::from_parts(&parts);
        ctx.path = "/server/orders".to_string();

        assert_eq!(ctx.path_and_query(), "/server/orders?page=2&size=10");
        assert_eq!(ctx.original_path, "/api/orders");
    }

    #[test]
    fn test_decision_labels() {
        assert_eq!(Decision::Permit.as_str(), "permit");
        assert_eq!(Decision::Passthrough.as_str(), "passthrough");
        assert_eq!(Decision::Preflight.as_str(), "preflight");
        assert_eq!(Decision::Unauthenticated.as_str(), "unauthenticated");
        assert_eq!(Decision::Forbidden.as_str(), "forbidden");
        assert_eq!(Decision::Error.as_str(), "error");
    }
}
