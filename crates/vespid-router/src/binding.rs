// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic binding resolution.
//!
//! Pure functions over the org's binding set: filter to the bindings whose
//! dimension matches the request, then rank by dimension order, priority
//! descending, id ascending. The first survivor wins.

use serde_json::Value;
use uuid::Uuid;
use vespid_core::{AgentBinding, BindingDimension, RoleKey};

/// The request-side context a binding is matched against.
#[derive(Debug, Clone)]
pub struct RoutingRequest<'a> {
    /// Organization in scope.
    pub organization_id: Uuid,
    /// Caller's role in the organization.
    pub role: RoleKey,
    /// Peer identity, if any.
    pub peer: Option<&'a str>,
    /// Team field, if any.
    pub team: Option<&'a str>,
    /// Account field, if any.
    pub account: Option<&'a str>,
    /// Channel field, if any.
    pub channel: Option<&'a str>,
}

fn match_str(spec: &Value, key: &str, actual: Option<&str>) -> bool {
    match (spec.get(key).and_then(Value::as_str), actual) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

fn role_name(role: RoleKey) -> &'static str {
    match role {
        RoleKey::Member => "member",
        RoleKey::Admin => "admin",
        RoleKey::Owner => "owner",
    }
}

/// Whether `binding` matches `request` under its dimension's rule.
pub fn binding_matches(binding: &AgentBinding, request: &RoutingRequest<'_>) -> bool {
    let spec = &binding.match_spec;
    match binding.dimension {
        BindingDimension::Peer => match_str(spec, "peer", request.peer),
        // Reserved: no parent relationship is modeled yet.
        BindingDimension::ParentPeer => false,
        BindingDimension::OrgRoles => spec
            .get("orgRoles")
            .and_then(Value::as_array)
            .is_some_and(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|r| r == role_name(request.role))
            }),
        BindingDimension::Organization => match spec.get("organizationId").and_then(Value::as_str)
        {
            None => true,
            Some(raw) => Uuid::parse_str(raw)
                .map(|id| id == request.organization_id)
                .unwrap_or(false),
        },
        BindingDimension::Team => match_str(spec, "team", request.team),
        BindingDimension::Account => match_str(spec, "account", request.account),
        BindingDimension::Channel => match_str(spec, "channel", request.channel),
        BindingDimension::Default => true,
    }
}

/// Resolve the winning binding, if any.
pub fn resolve_binding<'a>(
    bindings: &'a [AgentBinding],
    request: &RoutingRequest<'_>,
) -> Option<&'a AgentBinding> {
    bindings
        .iter()
        .filter(|b| binding_matches(b, request))
        .min_by(|a, b| {
            a.dimension
                .rank()
                .cmp(&b.dimension.rank())
                .then(b.priority.cmp(&a.priority))
                .then(a.id.cmp(&b.id))
        })
}
