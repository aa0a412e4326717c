//! Bundle of collaborator ports a provider plugs into the service.

use std::sync::Arc;

use crate::ports::{InvoicePort, VisitorPort};

/// Ports implementing one backend for visitor lookup and invoicing.
#[derive(Clone)]
pub struct Collaborators {
    /// Human-readable backend name used in logs.
    pub name: String,
    /// Implementation for looking up visitors.
    pub visitor_port: Arc<dyn VisitorPort>,
    /// Implementation for sending invoices.
    pub invoice_port: Arc<dyn InvoicePort>,
}

impl Collaborators {
    /// Bundle the given ports under `name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        visitor_port: Arc<dyn VisitorPort>,
        invoice_port: Arc<dyn InvoicePort>,
    ) -> Self {
        Self {
            name: name.into(),
            visitor_port,
            invoice_port,
        }
    }
}
