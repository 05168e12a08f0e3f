// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reverse proxy routes and config rendering

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Portal;
use crate::events::ResourceStatus;

/// A transponder with its upstream resolved to an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub transponder_id: Uuid,
    pub path: String,
    /// `ip:port` the path forwards to
    pub upstream: String,
    pub status: ResourceStatus,
}

/// Routes that belong in the rendered config, ordered by path
pub fn select_routes(routes: &[ProxyRoute], force_include: Option<Uuid>) -> Vec<&ProxyRoute> {
    let mut selected: Vec<&ProxyRoute> = routes
        .iter()
        .filter(|r| r.status == ResourceStatus::Active || Some(r.transponder_id) == force_include)
        .collect();
    selected.sort_by(|a, b| a.path.cmp(&b.path));
    selected
}

/// Site block for one portal
pub fn render_portal_config(
    portal: &Portal,
    routes: &[ProxyRoute],
    force_include: Option<Uuid>,
) -> String {
    let mut out = format!("# portal {}\n{} {{\n", portal.id, portal.domain);
    for route in select_routes(routes, force_include) {
        let path = route.path.trim_end_matches('/');
        let matcher = if path.is_empty() {
            "*".to_string()
        } else {
            format!("{path}/*")
        };
        out.push_str(&format!(
            "    reverse_proxy {} {} # transponder {}\n",
            matcher, route.upstream, route.transponder_id
        ));
    }
    out.push_str("}\n");
    out
}
