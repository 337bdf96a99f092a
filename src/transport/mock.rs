#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;

use super::{ApiRequest, ApiResponse, Transport};
use crate::AuthError;
use crate::backend::MockAuthBackend;

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, AuthError> + Send + Sync;

/// Transport double that records every request it receives.
#[derive(Clone)]
pub struct MockTransport {
    requests: Arc<Mutex<Vec<ApiRequest>>>,
    responder: Arc<Responder>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, AuthError> + Send + Sync + 'static,
    {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        }
    }

    /// Answers every request with `status`.
    pub fn always(status: StatusCode) -> Self {
        Self::new(move |_| Ok(ApiResponse::new(status)))
    }

    /// Answers 200 to requests whose bearer token `backend` accepts and 401
    /// otherwise. Requests without a bearer token are treated as public.
    pub fn accepting(backend: MockAuthBackend) -> Self {
        Self::new(move |request| {
            let status = match request.bearer_token() {
                None => StatusCode::OK,
                Some(token) if backend.accepts_access_token(token) => StatusCode::OK,
                Some(_) => StatusCode::UNAUTHORIZED,
            };
            Ok(ApiResponse::new(status))
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}
