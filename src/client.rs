use std::sync::Arc;

use crate::actions::{LoginAction, LogoutAction, RestoreOutcome, RestoreSessionAction};
use crate::events::EventRegistry;
use crate::guard::{Decision, RouteGuard, RouteTable, home_path};
use crate::jwt::ClaimsDecoder;
use crate::session::{InMemorySessionStorage, SessionStorage};
use crate::{
    ApiRequest, ApiResponse, AuthBackend, AuthError, ClientConfig, Credentials, RefreshCoordinator,
    RequestInterceptor, Role, Session, SessionState, SessionStore, Transport,
};

/// One running client's session subsystem.
///
/// Owns a single [`SessionStore`] and wires the refresh coordinator,
/// request interceptor, route guard and lifecycle actions around it.
///
/// # Example
///
/// ```rust,ignore
/// use ats_session::{AuthClient, ClientConfig, Credentials, Role};
/// use ats_session::http::HttpBackend;
/// use ats_session::session::FileSessionStorage;
///
/// let config = ClientConfig::new("https://ats.example.com/api");
/// let http = HttpBackend::new(&config)?;
/// let client = AuthClient::builder(config, http.clone(), http)
///     .storage(FileSessionStorage::new(data_dir)?)
///     .build()?;
///
/// client.restore().await?;
/// client.login(&Credentials::new("root@example.com", password)).await?;
/// assert!(client.authorize(&[Role::SuperAdmin]).is_allowed());
///
/// let jobs = client.send(&ApiRequest::get("/jobs")).await?;
/// ```
pub struct AuthClient {
    config: ClientConfig,
    coordinator: RefreshCoordinator,
    interceptor: RequestInterceptor,
    guard: RouteGuard,
    login: LoginAction<Arc<dyn AuthBackend>>,
    logout: LogoutAction<Arc<dyn AuthBackend>>,
    restore: RestoreSessionAction,
}

impl AuthClient {
    pub fn builder(
        config: ClientConfig,
        backend: impl AuthBackend + 'static,
        transport: impl Transport + 'static,
    ) -> AuthClientBuilder {
        AuthClientBuilder {
            config,
            backend: Arc::new(backend),
            transport: Arc::new(transport),
            storage: None,
            decoder: None,
            events: EventRegistry::new(),
            routes: RouteTable::ats(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn interceptor(&self) -> &RequestInterceptor {
        &self.interceptor
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn session(&self) -> Option<Session> {
        self.store().get()
    }

    pub fn state(&self) -> SessionState {
        self.store().state()
    }

    /// Restores the persisted session. Call once at start.
    pub async fn restore(&self) -> Result<RestoreOutcome, AuthError> {
        self.restore.execute().await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.login.execute(credentials).await
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.logout.execute().await
    }

    /// Sends a request through the interceptor.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        self.interceptor.send(request).await
    }

    pub fn authorize(&self, required_roles: &[Role]) -> Decision {
        self.guard.authorize(required_roles)
    }

    pub fn authorize_path(&self, path: &str) -> Decision {
        self.guard.authorize_path(path)
    }

    /// Dashboard to land on after login, `None` without a session.
    pub fn home_path(&self) -> Option<&'static str> {
        self.session().as_ref().map(home_path)
    }
}

pub struct AuthClientBuilder {
    config: ClientConfig,
    backend: Arc<dyn AuthBackend>,
    transport: Arc<dyn Transport>,
    storage: Option<Box<dyn SessionStorage>>,
    decoder: Option<ClaimsDecoder>,
    events: EventRegistry,
    routes: RouteTable,
}

impl AuthClientBuilder {
    /// Durable storage for the session record. Defaults to
    /// [`InMemorySessionStorage`], which does not survive a restart.
    #[must_use]
    pub fn storage(mut self, storage: impl SessionStorage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Claims decoder for access tokens. Defaults to
    /// [`ClaimsDecoder::unverified`].
    #[must_use]
    pub fn decoder(mut self, decoder: ClaimsDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn events(mut self, events: EventRegistry) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// # Errors
    /// `AuthError::ConfigurationError` if the configuration does not validate.
    pub fn build(self) -> Result<AuthClient, AuthError> {
        self.config.validate()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(InMemorySessionStorage::new()));
        let store = Arc::new(SessionStore::with_key(
            storage,
            self.decoder.unwrap_or_default(),
            self.config.storage_key.clone(),
        ));
        let events = Arc::new(self.events);

        let coordinator = RefreshCoordinator::with_config(
            Arc::clone(&store),
            Arc::clone(&self.backend),
            &self.config,
            Arc::clone(&events),
        );
        let interceptor =
            RequestInterceptor::with_config(coordinator.clone(), self.transport, &self.config)?;

        Ok(AuthClient {
            guard: RouteGuard::with_routes(Arc::clone(&store), self.routes),
            login: LoginAction::with_events(
                Arc::clone(&self.backend),
                Arc::clone(&store),
                Arc::clone(&events),
            ),
            logout: LogoutAction::with_events(self.backend, store, Arc::clone(&events)),
            restore: RestoreSessionAction::with_events(coordinator.clone(), events),
            coordinator,
            interceptor,
            config: self.config,
        })
    }
}
