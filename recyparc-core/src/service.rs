//! Price calculation facade: request in, priced visit out.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::directory::VisitorDirectory;
use crate::events::{
    DomainEvent, EventDispatcher, EventSubscriber, InvoiceEventHandler, PriceCalculated,
};
use crate::ledger::{PricedVisit, PricingState};
use crate::model::{
    Currency, CustomerType, DomainError, DroppedFraction, Price, Visit, VisitId, Visitor, VisitorId,
};
use crate::plugin::Collaborators;
use crate::ports::PortError;
use crate::rules::{MonthlySurchargeRule, PricingContext, PricingRuleEngine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One dropped fraction as sent by the client.
pub struct FractionRequest {
    /// Kilograms dropped; negative values are rejected.
    pub amount_dropped: i64,
    /// `Green waste` or `Construction waste`.
    pub fraction_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Body of a price calculation request.
pub struct CalculatePriceRequest {
    /// Visit date, ISO 8601.
    pub date: String,
    /// Fractions dropped during the visit.
    pub dropped_fractions: Vec<FractionRequest>,
    /// Visitor id.
    pub person_id: String,
    /// Visit id.
    pub visit_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Price of one visit.
pub struct PriceResponse {
    /// Total amount, serialized as a JSON number.
    #[serde(with = "rust_decimal::serde::float")]
    pub price_amount: Decimal,
    /// ISO currency code.
    pub price_currency: String,
    /// Visitor id echoed from the request.
    pub person_id: String,
    /// Visit id echoed from the request.
    pub visit_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// Visits and charges of one visitor in one calendar month.
pub struct MonthlySummary {
    /// Visits saved for the month.
    pub visit_count: usize,
    /// Sum of the base prices of the month's visits.
    pub total_base_price: Price,
    /// Sum of the surcharges of the month's visits.
    pub total_surcharge: Price,
    /// `total_base_price + total_surcharge`.
    pub final_total: Price,
    /// Whether the frequency surcharge applies to the next price.
    pub surcharge_applies: bool,
}

/// Parse a visit date. Accepts RFC 3339 (including a trailing `Z`), a
/// date-time without offset, or a plain date; the latter two are read as UTC.
///
/// # Errors
///
/// Returns [`DomainError::InvalidDate`] for anything else.
pub fn parse_visit_date(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let trimmed = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| DomainError::InvalidDate(raw.to_owned()))
}

/// Turn a request into a validated visit.
///
/// # Errors
///
/// Returns the first validation failure of the request.
pub fn build_visit(request: &CalculatePriceRequest) -> Result<Visit, DomainError> {
    let date = parse_visit_date(&request.date)?;
    let fractions = request
        .dropped_fractions
        .iter()
        .map(|fraction| DroppedFraction::parse(&fraction.fraction_type, fraction.amount_dropped))
        .collect::<Result<Vec<_>, _>>()?;
    Visit::new(
        VisitId(request.visit_id.clone()),
        VisitorId(request.person_id.clone()),
        date,
        fractions,
    )
}

/// Prices visits against the scenario's ledgers.
pub struct PriceCalculator {
    backend: String,
    directory: VisitorDirectory,
    engine: PricingRuleEngine,
    state: PricingState,
    events: EventDispatcher,
}

impl PriceCalculator {
    /// Calculator using the given collaborators, with invoicing subscribed.
    #[must_use]
    pub fn new(collaborators: Collaborators, engine: PricingRuleEngine) -> Self {
        let mut events = EventDispatcher::new();
        events.subscribe(Arc::new(InvoiceEventHandler::new(
            collaborators.invoice_port,
        )));
        Self {
            backend: collaborators.name,
            directory: VisitorDirectory::new(collaborators.visitor_port),
            engine,
            state: PricingState::new(),
            events,
        }
    }

    /// Register another event subscriber.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.events.subscribe(subscriber);
    }

    /// Name of the collaborator backend.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Ledgers and aggregates of the running scenario.
    #[must_use]
    pub fn state(&self) -> &PricingState {
        &self.state
    }

    /// Rule engine in use.
    #[must_use]
    pub fn engine(&self) -> &PricingRuleEngine {
        &self.engine
    }

    /// Visitors resolved so far.
    #[must_use]
    pub fn directory(&self) -> &VisitorDirectory {
        &self.directory
    }

    /// Price one visit.
    ///
    /// The visit is saved before pricing, so it counts towards the monthly
    /// frequency. Business customers with an email get an invoice.
    ///
    /// # Errors
    ///
    /// Returns a validation [`DomainError`] for malformed requests, or an
    /// invariant error when pricing breaks.
    pub async fn calculate_price(
        &mut self,
        request: &CalculatePriceRequest,
    ) -> Result<PriceResponse, DomainError> {
        let visit = build_visit(request)?;
        let visitor = self.resolve_visitor(visit.visitor_id()).await;
        if let Some(visitor) = &visitor
            && let Err(err) = self.state.memberships.enroll(visitor)
        {
            warn!(visitor = %visitor.id(), error = %err, "no business or household, pricing unpooled");
        }

        let context = PricingContext {
            customer_type: visitor.as_ref().map(Visitor::customer_type),
            city: visitor.as_ref().map(|visitor| visitor.city().to_owned()),
            visitor_id: Some(visit.visitor_id().clone()),
            visit_date: Some(visit.date()),
        };

        self.state.visits.save(visit.clone());
        let base = self
            .engine
            .calculate_base_price(visit.dropped_fractions(), &context, &mut self.state)?;
        let total = self
            .engine
            .apply_post_processing(base, &context, &self.state)?;
        let surcharge = Price::new(total.amount() - base.amount(), total.currency())?;
        self.state
            .visits
            .record_price(visit.id(), PricedVisit { base, surcharge })?;
        info!(
            visit = %visit.id(),
            visitor = %visit.visitor_id(),
            base = %base,
            total = %total,
            "visit priced"
        );

        if let Some(visitor) = &visitor
            && visitor.customer_type() == CustomerType::Business
            && !visitor.email().is_empty()
        {
            let event = DomainEvent::PriceCalculated(PriceCalculated {
                visitor_id: visitor.id().clone(),
                visit_id: visit.id().clone(),
                price: total,
                customer_type: Some(visitor.customer_type()),
                customer_email: Some(visitor.email().to_owned()),
                customer_city: Some(visitor.city().to_owned()),
                occurred_at: Utc::now(),
            });
            self.events.dispatch(&event).await;
        }

        Ok(PriceResponse {
            price_amount: total.amount(),
            price_currency: total.currency().to_string(),
            person_id: request.person_id.clone(),
            visit_id: request.visit_id.clone(),
        })
    }

    /// Reset visits, exemptions, aggregates and every visitor cache.
    pub fn start_scenario(&mut self) {
        self.state.clear();
        self.directory.clear();
        info!(backend = %self.backend, "scenario reset");
    }

    /// Visit count, charged totals and surcharge status of a visitor for one
    /// calendar month. Visits that were never priced count with zero amounts.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::CurrencyMismatch`] when stored prices disagree
    /// on currency.
    pub fn monthly_summary(
        &self,
        visitor_id: &VisitorId,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary, DomainError> {
        let visits = self
            .state
            .visits
            .find_visits_for_person_in_month(visitor_id, year, month);
        let zero = Price::zero(Currency::Eur);
        let (total_base_price, total_surcharge) = visits
            .iter()
            .filter_map(|visit| self.state.visits.price_of(visit.id()))
            .try_fold((zero, zero), |(base, surcharge), priced| {
                Ok::<_, DomainError>((base.add(&priced.base)?, surcharge.add(&priced.surcharge)?))
            })?;
        let is_individual = self
            .directory
            .cached(visitor_id)
            .is_some_and(|visitor| visitor.customer_type() == CustomerType::Individual);
        Ok(MonthlySummary {
            visit_count: visits.len(),
            total_base_price,
            total_surcharge,
            final_total: total_base_price.add(&total_surcharge)?,
            surcharge_applies: is_individual && visits.len() >= MonthlySurchargeRule::THRESHOLD,
        })
    }

    /// Load all remote visitors and enroll them in their business or household.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the visitor list cannot be fetched.
    pub async fn preload_visitors(&mut self) -> Result<usize, PortError> {
        let visitors = self.directory.all_visitors().await?;
        for visitor in &visitors {
            if let Err(err) = self.state.memberships.enroll(visitor) {
                warn!(visitor = %visitor.id(), error = %err, "could not enroll visitor");
            }
        }
        info!(count = visitors.len(), "visitors preloaded");
        Ok(visitors.len())
    }

    async fn resolve_visitor(&mut self, visitor_id: &VisitorId) -> Option<Visitor> {
        match self.directory.resolve(visitor_id).await {
            Ok(visitor) => visitor,
            Err(err) => {
                warn!(visitor = %visitor_id, error = %err, "visitor lookup failed, pricing as unknown");
                None
            }
        }
    }
}
