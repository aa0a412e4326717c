//! Provider implementation for the remote visitor and invoice API.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use recyparc_core::{
    plugin::Collaborators,
    ports::{InvoicePort, InvoiceRequest, PortError, VisitorPort, VisitorRecord},
};

/// Header carrying the static API token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";
/// Header identifying the calling workshop.
pub const WORKSHOP_ID_HEADER: &str = "x-workshop-id";

/// Connection details shared by both ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    /// Scheme and host, without the `/api` suffix.
    pub base_url: String,
    /// Value of the `x-auth-token` header.
    pub auth_token: String,
    /// Value of the `x-workshop-id` header.
    pub workshop_id: String,
    /// Timeout for the user list request.
    pub lookup_timeout: Duration,
    /// Timeout for a single invoice request.
    pub invoice_timeout: Duration,
}

impl ApiSettings {
    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTH_TOKEN_HEADER, self.auth_token.as_str())
            .header(WORKSHOP_ID_HEADER, self.workshop_id.as_str())
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::from("http://127.0.0.1:8081"),
            auth_token: String::new(),
            workshop_id: String::new(),
            lookup_timeout: Duration::from_secs(10),
            invoice_timeout: Duration::from_secs(10),
        }
    }
}

/// Visitor lookup backed by `GET /api/users`.
///
/// The full list is fetched once and kept until [`VisitorPort::clear_cache`].
/// Failed fetches are not cached.
pub struct ApiVisitorPort {
    client: Client,
    settings: Arc<ApiSettings>,
    users: Mutex<Option<Vec<VisitorRecord>>>,
}

impl ApiVisitorPort {
    /// Create a new visitor port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: Arc<ApiSettings>) -> Self {
        Self {
            client,
            settings,
            users: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Vec<VisitorRecord>> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl VisitorPort for ApiVisitorPort {
    async fn all_visitors(&self) -> Result<Vec<VisitorRecord>, PortError> {
        if let Some(users) = self.cached() {
            return Ok(users);
        }

        let req = self
            .settings
            .authorize(self.client.get(self.settings.url("users")))
            .timeout(self.settings.lookup_timeout);
        let users = fetch_json::<Vec<VisitorRecord>>(req).await?;
        debug!(count = users.len(), "fetched visitor list");

        *self.users.lock().unwrap_or_else(PoisonError::into_inner) = Some(users.clone());
        Ok(users)
    }

    fn clear_cache(&self) {
        *self.users.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Invoice delivery backed by `POST /api/invoice`.
pub struct ApiInvoicePort {
    client: Client,
    settings: Arc<ApiSettings>,
}

impl ApiInvoicePort {
    /// Create a new invoice port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: Arc<ApiSettings>) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl InvoicePort for ApiInvoicePort {
    async fn send_invoice(&self, invoice: &InvoiceRequest) -> Result<(), PortError> {
        info!(
            email = %invoice.email,
            amount = %invoice.invoice_amount,
            currency = %invoice.invoice_currency,
            "sending invoice"
        );
        self.settings
            .authorize(self.client.post(self.settings.url("invoice")))
            .json(invoice)
            .timeout(self.settings.invoice_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Build the collaborator bundle for the remote API.
#[must_use]
pub fn plugin(client: Client, settings: ApiSettings) -> Collaborators {
    let settings = Arc::new(settings);
    let visitor_port = Arc::new(ApiVisitorPort::new(client.clone(), Arc::clone(&settings)));
    let invoice_port = Arc::new(ApiInvoicePort::new(client, settings));

    Collaborators::new("remote-api", visitor_port, invoice_port)
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}
