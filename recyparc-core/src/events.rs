//! Domain events published after pricing and the subscribers reacting to them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::model::{CustomerType, Price, VisitId, VisitorId};
use crate::ports::{InvoicePort, InvoiceRequest, PortError};

/// A visit was priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceCalculated {
    /// Visitor that was charged.
    pub visitor_id: VisitorId,
    /// Priced visit.
    pub visit_id: VisitId,
    /// Final price including surcharges.
    pub price: Price,
    /// Customer type, `None` for unknown visitors.
    pub customer_type: Option<CustomerType>,
    /// Contact email, `None` when missing or empty.
    pub customer_email: Option<String>,
    /// City of the visitor.
    pub customer_city: Option<String>,
    /// When pricing finished.
    pub occurred_at: DateTime<Utc>,
}

impl PriceCalculated {
    /// Whether the priced visitor is a business.
    #[must_use]
    pub fn is_business_customer(&self) -> bool {
        self.customer_type == Some(CustomerType::Business)
    }
}

/// Everything the domain publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// See [`PriceCalculated`].
    PriceCalculated(PriceCalculated),
}

#[async_trait]
/// Receiver of dispatched domain events.
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// React to one event.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the side effect fails.
    async fn handle(&self, event: &DomainEvent) -> Result<(), PortError>;
}

/// Fans events out to every subscriber in subscription order.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventDispatcher {
    /// Dispatcher without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for all events.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every subscriber. A failing subscriber is logged and
    /// does not stop the others.
    pub async fn dispatch(&self, event: &DomainEvent) {
        for subscriber in &self.subscribers {
            if let Err(err) = subscriber.handle(event).await {
                error!(subscriber = subscriber.name(), error = %err, "event subscriber failed");
            }
        }
    }
}

/// Sends an invoice to business customers whenever a visit is priced.
pub struct InvoiceEventHandler {
    invoices: Arc<dyn InvoicePort>,
}

impl InvoiceEventHandler {
    /// Handler delivering through `invoices`.
    #[must_use]
    pub fn new(invoices: Arc<dyn InvoicePort>) -> Self {
        Self { invoices }
    }
}

#[async_trait]
impl EventSubscriber for InvoiceEventHandler {
    fn name(&self) -> &'static str {
        "invoice"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), PortError> {
        let DomainEvent::PriceCalculated(priced) = event;

        if !priced.is_business_customer() {
            debug!(visitor = %priced.visitor_id, "no invoice for non-business customer");
            return Ok(());
        }
        let Some(email) = priced.customer_email.as_deref().filter(|email| !email.is_empty())
        else {
            warn!(visitor = %priced.visitor_id, "cannot invoice business customer without email");
            return Ok(());
        };

        let invoice = InvoiceRequest {
            email: email.to_owned(),
            invoice_amount: priced.price.amount(),
            invoice_currency: priced.price.currency().to_string(),
        };
        self.invoices.send_invoice(&invoice).await?;
        info!(visitor = %priced.visitor_id, email, amount = %invoice.invoice_amount, "invoice sent");
        Ok(())
    }
}
