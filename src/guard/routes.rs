//! Declarative route-to-role mapping.

use crate::{Role, Session};

/// Who may open a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Anyone, signed in or not.
    Public,
    /// Any signed-in user, whatever their roles.
    Authenticated,
    /// Signed-in users holding at least one of these roles.
    Roles(Vec<Role>),
}

/// Maps path prefixes to the access they require.
///
/// The longest matching prefix wins; prefixes match on whole path segments,
/// so `/admin` covers `/admin/users` but not `/administrators`. Paths no
/// prefix matches get the fallback access.
///
/// # Example
///
/// ```rust
/// use ats_session::Role;
/// use ats_session::guard::{Access, RouteTable};
///
/// let routes = RouteTable::ats()
///     .route("/recruiter/reports", Access::Roles(vec![Role::Recruiter, Role::Manager]));
///
/// assert_eq!(
///     routes.access_for("/recruiter/reports/weekly"),
///     &Access::Roles(vec![Role::Recruiter, Role::Manager])
/// );
/// assert_eq!(routes.access_for("/login"), &Access::Public);
/// ```
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, Access)>,
    fallback: Access,
    login_path: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::ats()
    }
}

impl RouteTable {
    /// An empty table; every path gets `fallback`.
    pub fn new(fallback: Access) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
            login_path: "/login".to_owned(),
        }
    }

    /// The dashboards of the ATS front-end. Unlisted paths need a session.
    pub fn ats() -> Self {
        let mut table = Self::new(Access::Authenticated).route("/login", Access::Public);
        for role in DASHBOARD_ROLES {
            if let Some(path) = dashboard_path(&role) {
                table = table.route(path, Access::Roles(vec![role]));
            }
        }
        table
    }

    /// Adds or replaces the access required under `prefix`.
    #[must_use]
    pub fn route(mut self, prefix: impl Into<String>, access: Access) -> Self {
        let prefix = normalize(&prefix.into()).to_owned();
        self.routes.retain(|(existing, _)| *existing != prefix);
        self.routes.push((prefix, access));
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Access) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Returns the access required to open `path`.
    ///
    /// Query strings and fragments are ignored.
    pub fn access_for(&self, path: &str) -> &Access {
        let path = normalize(path);
        self.routes
            .iter()
            .filter(|(prefix, _)| covers(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(&self.fallback, |(_, access)| access)
    }
}

const DASHBOARD_ROLES: [Role; 5] = [
    Role::SuperAdmin,
    Role::Admin,
    Role::Manager,
    Role::Recruiter,
    Role::Interviewer,
];

fn dashboard_path(role: &Role) -> Option<&'static str> {
    match role {
        Role::SuperAdmin => Some("/super-admin"),
        Role::Admin => Some("/admin"),
        Role::Manager => Some("/manager"),
        Role::Recruiter => Some("/recruiter"),
        Role::Interviewer => Some("/interviewer"),
        Role::Other(_) => None,
    }
}

/// Returns the dashboard of the session's highest-ranking role, or `/` if
/// the session holds no known role.
pub fn home_path(session: &Session) -> &'static str {
    session
        .roles()
        .iter()
        .min_by_key(|role| role.priority())
        .and_then(dashboard_path)
        .unwrap_or("/")
}

fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
