//! Route admission for application pages.
//!
//! Every path maps to one requirement through a prefix table. Backend token
//! *presence* is checked, not validity: navigation stays fast and the
//! interceptor deals with expired tokens on the first backend call.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::auth::{AuthFailure, GateRedirect, HasAuthState, session_from_headers};
use crate::redirect::RedirectManager;
use crate::tokens::TokenStore;

/// Session sign-in entry point.
pub const SIGNIN_PATH: &str = "/auth/signin";

/// Page that acquires backend tokens for a signed-in user.
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// No checks
    Public,
    /// Local session only
    SessionRequired,
    /// Local session and a stored backend token pair
    BackendTokensRequired,
}

#[derive(Debug, Clone)]
struct RouteRule {
    prefix: String,
    requirement: Requirement,
}

/// Prefix table mapping paths to requirements.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    fallback: Requirement,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(Requirement::SessionRequired)
            .rule("/auth", Requirement::Public)
            .rule("/public", Requirement::Public)
            .rule("/health", Requirement::Public)
            // API endpoints answer with JSON errors themselves
            .rule("/api", Requirement::Public)
            .rule(LOGIN_PATH, Requirement::SessionRequired)
            .rule("/app", Requirement::BackendTokensRequired)
    }
}

impl RouteTable {
    /// Empty table; unmatched paths get `fallback`.
    pub fn new(fallback: Requirement) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Add a rule. `/app`, `/app/` and `/app/*` are the same prefix.
    pub fn rule(mut self, prefix: &str, requirement: Requirement) -> Self {
        let trimmed = prefix.trim_end_matches('*').trim_end_matches('/');
        let prefix = if trimmed.is_empty() { "/" } else { trimmed };
        self.rules.push(RouteRule {
            prefix: prefix.to_string(),
            requirement,
        });
        self
    }

    /// Longest matching prefix wins; on a tie the earlier rule wins.
    pub fn classify(&self, path: &str) -> Requirement {
        let mut best: Option<&RouteRule> = None;
        for rule in &self.rules {
            if !prefix_matches(&rule.prefix, path) {
                continue;
            }
            if best.is_none_or(|b| rule.prefix.len() > b.prefix.len()) {
                best = Some(rule);
            }
        }
        best.map_or(self.fallback, |rule| rule.requirement)
    }
}

/// Segment-aware prefix match: `/app` matches `/app` and `/app/x`, not `/apple`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Redirect {
        location: String,
        failure: AuthFailure,
    },
}

/// Per-navigation admission decisions.
pub struct RouteGate {
    table: RouteTable,
    store: Arc<dyn TokenStore>,
    redirects: RedirectManager,
}

impl RouteGate {
    pub fn new(table: RouteTable, store: Arc<dyn TokenStore>, redirects: RedirectManager) -> Self {
        Self {
            table,
            store,
            redirects,
        }
    }

    /// Decide whether `target` (path plus optional query) may be shown.
    ///
    /// The callback is always the requested target itself, so repeated visits
    /// without authenticating produce the same redirect.
    pub async fn admit(&self, target: &str, has_session: bool) -> Admission {
        let path = target.split(['?', '#']).next().unwrap_or(target);

        match self.table.classify(path) {
            Requirement::Public => Admission::Allow,
            _ if !has_session => self.redirect(SIGNIN_PATH, target, AuthFailure::SessionAbsent),
            Requirement::SessionRequired => Admission::Allow,
            Requirement::BackendTokensRequired => {
                if self.store.get().await.is_some() {
                    Admission::Allow
                } else {
                    self.redirect(LOGIN_PATH, target, AuthFailure::CredentialAbsent)
                }
            }
        }
    }

    fn redirect(&self, page: &str, target: &str, failure: AuthFailure) -> Admission {
        let location = self
            .redirects
            .login_target(page, Some(target), Some(failure.reason()));
        debug!(target = %target, location = %location, "Navigation redirected");
        Admission::Redirect { location, failure }
    }
}

/// Middleware applying the gate to page requests.
pub async fn route_gate<S>(State(state): State<S>, request: Request, next: Next) -> Response
where
    S: HasAuthState + Clone + Send + Sync + 'static,
{
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let has_session = session_from_headers(request.headers(), state.sessions()).is_some();

    match state.coordinator().admit(&target, has_session).await {
        Admission::Allow => next.run(request).await,
        Admission::Redirect { location, .. } => GateRedirect { location }.into_response(),
    }
}
