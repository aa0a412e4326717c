//! In-memory state that lives for one scenario: exemption usage and visits.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};

use crate::grouping::Memberships;
use crate::model::{DomainError, Price, Visit, VisitId, VisitorId};

/// Split of a construction waste drop into low-rate and high-rate kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredWeights {
    /// Kilograms still covered by the yearly exemption.
    pub low_kg: u64,
    /// Kilograms above the exemption.
    pub high_kg: u64,
}

/// Cumulative low-tier usage per `(entity, calendar year)`.
#[derive(Debug, Default)]
pub struct ExemptionLedger {
    usage: HashMap<(String, i32), u64>,
}

impl ExemptionLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kilograms recorded for `entity` in `year`, zero when nothing was recorded.
    #[must_use]
    pub fn used_exemption(&self, entity: &str, year: i32) -> u64 {
        self.usage
            .get(&(entity.to_owned(), year))
            .copied()
            .unwrap_or(0)
    }

    /// Add `kg` to the entity's usage for the calendar year of `visit_date`.
    ///
    /// Every call counts, so each priced fraction must be recorded exactly once.
    pub fn record_waste(&mut self, entity: &str, kg: u64, visit_date: DateTime<Utc>) {
        let slot = self
            .usage
            .entry((entity.to_owned(), visit_date.year()))
            .or_insert(0);
        *slot = slot.saturating_add(kg);
    }

    /// Split `kg` against what is left of `tier_limit_kg` this year.
    #[must_use]
    pub fn tiered_weights(
        &self,
        entity: &str,
        kg: u64,
        visit_date: DateTime<Utc>,
        tier_limit_kg: u64,
    ) -> TieredWeights {
        let already_used = self.used_exemption(entity, visit_date.year());
        let remaining = tier_limit_kg.saturating_sub(already_used);
        let low_kg = kg.min(remaining);
        TieredWeights {
            low_kg,
            high_kg: kg - low_kg,
        }
    }

    /// Drop all usage records.
    pub fn clear_all_exemptions(&mut self) {
        self.usage.clear();
    }
}

/// Amounts charged for one visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedVisit {
    /// Sum of the fraction prices.
    pub base: Price,
    /// Amount added on top of `base`.
    pub surcharge: Price,
}

/// Visits saved during the scenario, keyed by visit id.
#[derive(Debug, Default)]
pub struct VisitLedger {
    visits: HashMap<VisitId, Visit>,
    prices: HashMap<VisitId, PricedVisit>,
}

impl VisitLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a visit. Saving an existing id replaces the earlier visit.
    pub fn save(&mut self, visit: Visit) {
        self.visits.insert(visit.id().clone(), visit);
    }

    /// Remember what a saved visit was charged. Pricing the same id again
    /// replaces the earlier amounts.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::VisitNotFound`] when the visit was never saved.
    pub fn record_price(&mut self, visit_id: &VisitId, priced: PricedVisit) -> Result<(), DomainError> {
        if !self.exists(visit_id) {
            return Err(DomainError::VisitNotFound(visit_id.to_string()));
        }
        self.prices.insert(visit_id.clone(), priced);
        Ok(())
    }

    /// Amounts charged for a visit, `None` until it has been priced.
    #[must_use]
    pub fn price_of(&self, visit_id: &VisitId) -> Option<PricedVisit> {
        self.prices.get(visit_id).copied()
    }

    /// Look up a visit.
    #[must_use]
    pub fn find_by_id(&self, visit_id: &VisitId) -> Option<&Visit> {
        self.visits.get(visit_id)
    }

    /// Look up a visit that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::VisitNotFound`] for unknown ids.
    pub fn get(&self, visit_id: &VisitId) -> Result<&Visit, DomainError> {
        self.find_by_id(visit_id)
            .ok_or_else(|| DomainError::VisitNotFound(visit_id.to_string()))
    }

    /// Whether a visit with this id is stored.
    #[must_use]
    pub fn exists(&self, visit_id: &VisitId) -> bool {
        self.visits.contains_key(visit_id)
    }

    /// Remove a visit, returning whether it existed.
    pub fn delete(&mut self, visit_id: &VisitId) -> bool {
        self.prices.remove(visit_id);
        self.visits.remove(visit_id).is_some()
    }

    /// Every visit of one visitor, oldest first.
    #[must_use]
    pub fn find_visits_by_visitor(&self, visitor_id: &VisitorId) -> Vec<&Visit> {
        self.sorted(|visit| visit.visitor_id() == visitor_id)
    }

    /// Visits of one visitor in the given calendar month, oldest first.
    #[must_use]
    pub fn find_visits_for_person_in_month(
        &self,
        visitor_id: &VisitorId,
        year: i32,
        month: u32,
    ) -> Vec<&Visit> {
        self.sorted(|visit| visit.visitor_id() == visitor_id && visit.year_month() == (year, month))
    }

    /// Number of visits of one visitor in the given calendar month.
    #[must_use]
    pub fn count_visits_for_person_in_month(
        &self,
        visitor_id: &VisitorId,
        year: i32,
        month: u32,
    ) -> usize {
        self.visits
            .values()
            .filter(|visit| {
                visit.visitor_id() == visitor_id && visit.year_month() == (year, month)
            })
            .count()
    }

    /// Visits with `start <= date <= end`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidDateRange`] when `start` is after `end`.
    pub fn find_visits_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<&Visit>, DomainError> {
        if start > end {
            return Err(DomainError::InvalidDateRange { start, end });
        }
        Ok(self.sorted(|visit| (start..=end).contains(&visit.date())))
    }

    /// Number of stored visits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.visits.len()
    }

    /// All stored visits, oldest first.
    #[must_use]
    pub fn find_all(&self) -> Vec<&Visit> {
        self.sorted(|_| true)
    }

    /// Drop all visits.
    pub fn clear_all_visits(&mut self) {
        self.visits.clear();
        self.prices.clear();
    }

    fn sorted(&self, keep: impl Fn(&Visit) -> bool) -> Vec<&Visit> {
        let mut visits: Vec<&Visit> = self.visits.values().filter(|visit| keep(visit)).collect();
        visits.sort_by(|left, right| {
            left.date()
                .cmp(&right.date())
                .then_with(|| left.id().cmp(right.id()))
        });
        visits
    }
}

/// Everything the pricing rules read or update while pricing a visit.
#[derive(Debug, Default)]
pub struct PricingState {
    /// Yearly construction waste usage.
    pub exemptions: ExemptionLedger,
    /// Visits seen so far.
    pub visits: VisitLedger,
    /// Businesses and households pooling exemptions.
    pub memberships: Memberships,
}

impl PricingState {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget visits, exemption usage, and aggregates.
    pub fn clear(&mut self) {
        self.visits.clear_all_visits();
        self.exemptions.clear_all_exemptions();
        self.memberships.clear();
    }
}
