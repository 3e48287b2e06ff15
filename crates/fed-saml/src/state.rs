//! Caller-supplied state carried across a request/response cycle.

use serde::{Deserialize, Serialize};

use crate::types::{NameId, NameIdPolicy, RequestedAuthnContext};

/// Overrides and correlation data supplied by the caller.
///
/// Every field is optional; unset fields fall back to entity metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingState {
    /// Requested NameID policy.
    pub name_id_policy: Option<NameIdPolicy>,

    /// Forces re-authentication at the IdP.
    pub force_authn: Option<bool>,

    /// Forbids user interaction at the IdP.
    pub is_passive: Option<bool>,

    /// Requested authentication context classes.
    pub authn_context_class_ref: Option<Vec<String>>,

    /// Comparison for `authn_context_class_ref`.
    pub authn_context_comparison: Option<String>,

    /// RequestedAuthnContext of the request being proxied.
    pub proxied_authn_context: Option<RequestedAuthnContext>,

    /// Audience override.
    pub audiences: Option<Vec<String>>,

    /// Additional IdPs for the IDPList.
    pub idp_list: Vec<String>,

    /// Maximum proxy count.
    pub proxy_count: Option<u32>,

    /// Requester chain of the request being proxied.
    pub requester_ids: Vec<String>,

    /// Entity ID of the SP the request is proxied for.
    pub requesting_sp: Option<String>,

    /// Subject to request authentication for.
    pub name_id: Option<NameId>,

    /// Assertion consumer URL override.
    pub assertion_consumer_service_url: Option<String>,

    /// RelayState to send with the message.
    pub relay_state: Option<String>,

    /// NameID of the session being logged out.
    pub logout_name_id: Option<NameId>,

    /// Session indexes of the session being logged out.
    pub session_indexes: Vec<String>,

    /// ID of the request a logout response answers.
    pub in_response_to: Option<String>,
}
