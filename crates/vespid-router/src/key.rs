// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic session-key derivation.
//!
//! The key groups messages belonging to the same logical conversation and
//! is the sharding key for session-level event ordering, so it must be a
//! pure function of the routing inputs.

use uuid::Uuid;
use vespid_core::SessionScope;

/// Stand-in segment for an empty normalized value.
const FALLBACK: &str = "unknown";

/// Lowercase `input` and collapse every run of characters outside
/// `[a-z0-9._-]` into a single `-`. Empty output becomes a fixed fallback.
pub fn norm(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() { FALLBACK.into() } else { out }
}

/// Inputs that vary per request.
#[derive(Debug, Clone, Default)]
pub struct KeyContext<'a> {
    /// Peer identity from the request, if any.
    pub peer: Option<&'a str>,
    /// Channel id, for channel-scoped keys.
    pub channel_id: Option<&'a str>,
    /// Account id, for account-scoped keys.
    pub account_id: Option<&'a str>,
    /// The acting user, the final peer fallback.
    pub actor_user_id: Option<Uuid>,
}

impl KeyContext<'_> {
    fn peer_segment(&self) -> String {
        match (self.peer, self.actor_user_id) {
            (Some(peer), _) if !peer.is_empty() => norm(peer),
            (_, Some(actor)) => norm(&actor.to_string()),
            _ => FALLBACK.into(),
        }
    }
}

/// Derive the deterministic session key.
pub fn derive_session_key(
    routed_agent_id: Option<Uuid>,
    organization_id: Uuid,
    scope: SessionScope,
    ctx: &KeyContext<'_>,
) -> String {
    let agent_segment = match routed_agent_id {
        Some(id) => norm(&id.to_string()),
        None => "main".to_owned(),
    };
    let mut key = format!(
        "agent:{}:org:{}:scope:{}",
        agent_segment,
        norm(&organization_id.to_string()),
        norm(scope_name(scope)),
    );
    match scope {
        SessionScope::Main => {}
        SessionScope::PerPeer => {
            key.push_str(&format!(":peer:{}", ctx.peer_segment()));
        }
        SessionScope::PerChannelPeer => {
            key.push_str(&format!(
                ":channel:{}:peer:{}",
                norm(ctx.channel_id.unwrap_or("")),
                ctx.peer_segment(),
            ));
        }
        SessionScope::PerAccountChannelPeer => {
            key.push_str(&format!(
                ":account:{}:channel:{}:peer:{}",
                norm(ctx.account_id.unwrap_or("")),
                norm(ctx.channel_id.unwrap_or("")),
                ctx.peer_segment(),
            ));
        }
    }
    key
}

fn scope_name(scope: SessionScope) -> &'static str {
    match scope {
        SessionScope::Main => "main",
        SessionScope::PerPeer => "per-peer",
        SessionScope::PerChannelPeer => "per-channel-peer",
        SessionScope::PerAccountChannelPeer => "per-account-channel-peer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_lowercases_and_collapses_runs() {
        assert_eq!(norm("Hello World"), "hello-world");
        assert_eq!(norm("a!!b??c"), "a-b-c");
        assert_eq!(norm("user.name_1-ok"), "user.name_1-ok");
        assert_eq!(norm("!!!"), "unknown");
        assert_eq!(norm(""), "unknown");
    }

    #[test]
    fn norm_never_emits_a_leading_dash() {
        assert_eq!(norm("!abc"), "abc");
    }

    #[test]
    fn main_scope_has_no_extra_segments() {
        let org = Uuid::new_v4();
        let key = derive_session_key(None, org, SessionScope::Main, &KeyContext::default());
        assert!(key.starts_with("agent:main:org:"));
        assert!(key.ends_with(":scope:main"));
        assert!(!key.contains(":peer:"));
    }

    #[test]
    fn per_peer_appends_the_peer_segment() {
        let org = Uuid::new_v4();
        let key = derive_session_key(
            None,
            org,
            SessionScope::PerPeer,
            &KeyContext {
                peer: Some("U1"),
                ..Default::default()
            },
        );
        assert!(key.ends_with(":peer:u1"));
    }

    #[test]
    fn per_peer_falls_back_to_the_actor() {
        let org = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let key = derive_session_key(
            None,
            org,
            SessionScope::PerPeer,
            &KeyContext {
                actor_user_id: Some(actor),
                ..Default::default()
            },
        );
        assert!(key.ends_with(&format!(":peer:{}", norm(&actor.to_string()))));
    }

    #[test]
    fn account_channel_peer_orders_segments() {
        let org = Uuid::new_v4();
        let key = derive_session_key(
            Some(Uuid::nil()),
            org,
            SessionScope::PerAccountChannelPeer,
            &KeyContext {
                peer: Some("p"),
                channel_id: Some("C9"),
                account_id: Some("A7"),
                actor_user_id: None,
            },
        );
        let account_pos = key.find(":account:a7").unwrap();
        let channel_pos = key.find(":channel:c9").unwrap();
        let peer_pos = key.find(":peer:p").unwrap();
        assert!(account_pos < channel_pos && channel_pos < peer_pos);
    }

    #[test]
    fn derivation_is_deterministic() {
        let org = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let ctx = KeyContext {
            peer: Some("u1"),
            channel_id: Some("c1"),
            ..Default::default()
        };
        let a = derive_session_key(Some(agent), org, SessionScope::PerChannelPeer, &ctx);
        let b = derive_session_key(Some(agent), org, SessionScope::PerChannelPeer, &ctx);
        assert_eq!(a, b);
    }
}
