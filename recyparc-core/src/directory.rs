//! Translation of remote visitor records into domain visitors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{DomainError, Visitor, VisitorId};
use crate::ports::{PortError, VisitorPort, VisitorRecord};

/// Caching view of the visitor service in domain terms.
pub struct VisitorDirectory {
    port: Arc<dyn VisitorPort>,
    cache: HashMap<VisitorId, Visitor>,
}

impl VisitorDirectory {
    /// Create a directory backed by `port`.
    #[must_use]
    pub fn new(port: Arc<dyn VisitorPort>) -> Self {
        Self {
            port,
            cache: HashMap::new(),
        }
    }

    /// Resolve a visitor, asking the remote service only on a cache miss.
    ///
    /// Records the remote service cannot describe validly resolve to `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the remote lookup fails.
    pub async fn resolve(&mut self, id: &VisitorId) -> Result<Option<Visitor>, PortError> {
        if let Some(visitor) = self.cache.get(id) {
            return Ok(Some(visitor.clone()));
        }

        let Some(record) = self.port.visitor(id).await? else {
            debug!(visitor = %id, "visitor unknown to remote service");
            return Ok(None);
        };

        match to_domain(record) {
            Ok(visitor) => {
                self.cache.insert(visitor.id().clone(), visitor.clone());
                Ok(Some(visitor))
            }
            Err(err) => {
                warn!(visitor = %id, error = %err, "ignoring invalid visitor record");
                Ok(None)
            }
        }
    }

    /// Load every remote visitor, refreshing the cache.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the remote lookup fails.
    pub async fn all_visitors(&mut self) -> Result<Vec<Visitor>, PortError> {
        let records = self.port.all_visitors().await?;
        let mut visitors = Vec::with_capacity(records.len());
        for record in records {
            let raw_id = record.id.clone();
            match to_domain(record) {
                Ok(visitor) => {
                    self.cache.insert(visitor.id().clone(), visitor.clone());
                    visitors.push(visitor);
                }
                Err(err) => warn!(visitor = %raw_id, error = %err, "skipping invalid visitor record"),
            }
        }
        Ok(visitors)
    }

    /// Visitor resolved earlier in this scenario.
    #[must_use]
    pub fn cached(&self, id: &VisitorId) -> Option<&Visitor> {
        self.cache.get(id)
    }

    /// Visitor resolved earlier in this scenario, as a hard requirement.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::VisitorNotFound`] when the visitor was never resolved.
    pub fn get(&self, id: &VisitorId) -> Result<&Visitor, DomainError> {
        self.cached(id)
            .ok_or_else(|| DomainError::VisitorNotFound(id.to_string()))
    }

    /// Forget cached visitors here and in the remote port.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.port.clear_cache();
    }
}

fn to_domain(record: VisitorRecord) -> Result<Visitor, DomainError> {
    Visitor::new(
        VisitorId(record.id),
        record.customer_type.parse()?,
        record.address,
        record.city,
        record.card_id,
        record.email.unwrap_or_default(),
    )
}
