//! Traits describing the external collaborators and their wire types.

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::VisitorId;

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to external services.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Remote service answered with an unexpected payload.
    #[error("Unexpected response: {0}")]
    Response(String),
    /// Internal collaborator error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Visitor as delivered by the remote user list.
pub struct VisitorRecord {
    /// Visitor identifier.
    pub id: String,
    /// `individual` or `business`.
    #[serde(rename = "type")]
    pub customer_type: String,
    /// Street address.
    #[serde(default)]
    pub address: String,
    /// City.
    #[serde(default)]
    pub city: String,
    /// Access card number.
    #[serde(default)]
    pub card_id: String,
    /// Contact email, may be missing.
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
/// Lookup of visitors registered with the municipality.
pub trait VisitorPort: Send + Sync {
    /// Fetch the complete visitor list.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the remote request fails.
    async fn all_visitors(&self) -> Result<Vec<VisitorRecord>, PortError>;

    /// Fetch a single visitor, `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the remote request fails.
    async fn visitor(&self, id: &VisitorId) -> Result<Option<VisitorRecord>, PortError> {
        Ok(self
            .all_visitors()
            .await?
            .into_iter()
            .find(|record| record.id == id.0))
    }

    /// Forget anything cached from earlier calls.
    fn clear_cache(&self);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Invoice sent to a business customer.
pub struct InvoiceRequest {
    /// Recipient address.
    pub email: String,
    /// Amount to invoice.
    #[serde(with = "rust_decimal::serde::float")]
    pub invoice_amount: Decimal,
    /// ISO currency code.
    pub invoice_currency: String,
}

#[async_trait]
/// Delivery of invoices to the invoicing service.
pub trait InvoicePort: Send + Sync {
    /// Send one invoice.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when delivery fails.
    async fn send_invoice(&self, invoice: &InvoiceRequest) -> Result<(), PortError>;
}
