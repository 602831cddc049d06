use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
};

use crate::models::Role;

/// RouteAccess
///
/// What a route prefix demands of the session before the page may render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// Reachable without signing in. Used to carve login pages out of protected prefixes.
    Public,
    /// Any signed-in identity, whatever its role.
    Authenticated,
    /// Signed in with one of these roles, after applying the satisfaction table.
    Roles(Vec<Role>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub prefix: String,
    pub access: RouteAccess,
}

/// RoleSatisfaction
///
/// Maps a required role to every role that fulfils it. A role missing from the table is only
/// satisfied by itself.
#[derive(Debug, Clone, Default)]
pub struct RoleSatisfaction {
    table: HashMap<Role, HashSet<Role>>,
}

impl RoleSatisfaction {
    /// Exact matching for every role, except that `admin` is also met by `head-admin`.
    pub fn standard() -> Self {
        Self::default().with(Role::Admin, [Role::Admin, Role::HeadAdmin])
    }

    pub fn with(mut self, required: Role, satisfied_by: impl IntoIterator<Item = Role>) -> Self {
        self.table
            .insert(required, satisfied_by.into_iter().collect());
        self
    }

    pub fn satisfies(&self, required: Role, actual: Role) -> bool {
        self.table
            .get(&required)
            .map_or(required == actual, |roles| roles.contains(&actual))
    }
}

/// RouteGuardPolicy
///
/// The static routing table consulted by the access guard: who may reach which page prefix,
/// where an anonymous visitor is sent to sign in, and where each role lands by default.
/// Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct RouteGuardPolicy {
    entries: Vec<PolicyEntry>,
    login_routes: Vec<(String, String)>,
    default_login: String,
    landing: HashMap<Role, String>,
    fallback_landing: String,
    satisfaction: RoleSatisfaction,
}

impl Default for RouteGuardPolicy {
    fn default() -> Self {
        Self::new("/login", "/")
            .with_entry("/admin", RouteAccess::Roles(vec![Role::Admin]))
            .with_entry("/admin/settings", RouteAccess::Roles(vec![Role::HeadAdmin]))
            .with_entry("/agent", RouteAccess::Roles(vec![Role::Agent]))
            .with_entry("/agent/login", RouteAccess::Public)
            .with_entry("/portal", RouteAccess::Roles(vec![Role::Customer]))
            .with_entry("/tickets", RouteAccess::Authenticated)
            .with_entry("/profile", RouteAccess::Authenticated)
            .with_login_route("/admin", "/org/login")
            .with_login_route("/agent", "/agent/login")
            .with_landing(Role::HeadAdmin, "/admin/dashboard")
            .with_landing(Role::Admin, "/admin/dashboard")
            .with_landing(Role::Agent, "/agent/dashboard")
            .with_landing(Role::Customer, "/portal")
    }
}

impl RouteGuardPolicy {
    /// An empty policy: every route public, every visitor signs in at `default_login`,
    /// every role lands on `fallback_landing`.
    pub fn new(default_login: &str, fallback_landing: &str) -> Self {
        Self {
            entries: Vec::new(),
            login_routes: Vec::new(),
            default_login: default_login.to_string(),
            landing: HashMap::new(),
            fallback_landing: fallback_landing.to_string(),
            satisfaction: RoleSatisfaction::standard(),
        }
    }

    pub fn with_entry(mut self, prefix: &str, access: RouteAccess) -> Self {
        self.entries.push(PolicyEntry {
            prefix: prefix.to_string(),
            access,
        });
        self
    }

    pub fn with_login_route(mut self, prefix: &str, login_path: &str) -> Self {
        self.login_routes
            .push((prefix.to_string(), login_path.to_string()));
        self
    }

    pub fn with_landing(mut self, role: Role, path: &str) -> Self {
        self.landing.insert(role, path.to_string());
        self
    }

    pub fn with_satisfaction(mut self, satisfaction: RoleSatisfaction) -> Self {
        self.satisfaction = satisfaction;
        self
    }

    /// The entry with the longest prefix covering `requested`. Ties go to the earlier entry.
    pub fn entry_for(&self, requested: &str) -> Option<&PolicyEntry> {
        let path = route_path(requested);
        self.entries
            .iter()
            .filter(|entry| prefix_matches(path, &entry.prefix))
            .min_by_key(|entry| Reverse(entry.prefix.len()))
    }

    /// `None` when the route is public (no entry, or an explicit `Public` entry).
    pub fn access_for(&self, requested: &str) -> Option<&RouteAccess> {
        match self.entry_for(requested) {
            Some(PolicyEntry {
                access: RouteAccess::Public,
                ..
            })
            | None => None,
            Some(entry) => Some(&entry.access),
        }
    }

    pub fn satisfies(&self, required: Role, actual: Role) -> bool {
        self.satisfaction.satisfies(required, actual)
    }

    /// Whether `role` clears `access`. `Authenticated` and `Public` admit every role.
    pub fn admits(&self, access: &RouteAccess, role: Role) -> bool {
        match access {
            RouteAccess::Public | RouteAccess::Authenticated => true,
            RouteAccess::Roles(allowed) => allowed
                .iter()
                .any(|required| self.satisfies(*required, role)),
        }
    }

    pub fn login_route_for(&self, requested: &str) -> &str {
        let path = route_path(requested);
        self.login_routes
            .iter()
            .filter(|(prefix, _)| prefix_matches(path, prefix))
            .min_by_key(|(prefix, _)| Reverse(prefix.len()))
            .map_or(self.default_login.as_str(), |(_, login)| login.as_str())
    }

    /// Login route with the original destination preserved as `?redirect=`.
    pub fn login_redirect(&self, requested: &str) -> String {
        format!(
            "{}?redirect={}",
            self.login_route_for(requested),
            urlencoding::encode(requested)
        )
    }

    pub fn landing_route(&self, role: Role) -> &str {
        self.landing
            .get(&role)
            .map_or(self.fallback_landing.as_str(), String::as_str)
    }
}

/// Strips the query string and fragment from a requested location.
fn route_path(requested: &str) -> &str {
    requested
        .split(['?', '#'])
        .next()
        .unwrap_or(requested)
}

/// Segment-aware prefix test: `/admin` covers `/admin` and `/admin/users`, not `/administrator`.
fn prefix_matches(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
