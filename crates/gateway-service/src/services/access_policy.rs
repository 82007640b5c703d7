//! Bitmask role model and route permission evaluation.

use crate::models::{Principal, Role, RouteRule};

/// Outcome of evaluating a rule against a (possibly anonymous) caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Permit,
    /// No principal and the rule is not permit-all.
    Unauthenticated,
    /// Principal present but its mask does not intersect the rule.
    Forbidden,
}

impl AccessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Permit => "permit",
            AccessDecision::Unauthenticated => "unauthenticated",
            AccessDecision::Forbidden => "forbidden",
        }
    }
}

/// `permit_all` or any shared role bit.
pub fn is_permitted(rule: &RouteRule, role_mask: u32) -> bool {
    rule.permit_all || (rule.access_mask & role_mask) != 0
}

pub fn evaluate(rule: &RouteRule, principal: Option<&Principal>) -> AccessDecision {
    if rule.permit_all {
        return AccessDecision::Permit;
    }

    match principal {
        None => AccessDecision::Unauthenticated,
        Some(p) if is_permitted(rule, p.role_mask) => AccessDecision::Permit,
        Some(_) => AccessDecision::Forbidden,
    }
}

/// Space-joined role names in declaration order. Diagnostics only.
pub fn roles_from_mask(mask: u32) -> String {
    Role::ALL
        .iter()
        .filter(|role| role.is_present_in(mask))
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
