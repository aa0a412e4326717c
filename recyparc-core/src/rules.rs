//! Ordered pricing rules.
//!
//! Each fraction of a visit is priced by the first rule, in ascending priority,
//! whose predicate accepts the [`PricingContext`]. After the base total is
//! known every rule gets a chance to add a surcharge on top of it.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::ledger::{PricingState, TieredWeights};
use crate::model::{Currency, CustomerType, DomainError, DroppedFraction, FractionType, Price, VisitorId};

/// City with its own rates and construction waste exemptions.
pub const OAK_CITY: &str = "Oak City";
/// City with its own rates.
pub const PINEVILLE: &str = "Pineville";

/// Who is dropping waste, where they live, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingContext {
    /// Individual or business, `None` for unknown visitors.
    pub customer_type: Option<CustomerType>,
    /// City of the visitor, `None` for unknown visitors.
    pub city: Option<String>,
    /// Visitor id, used to track exemptions and visit frequency.
    pub visitor_id: Option<VisitorId>,
    /// Visit moment, used for calendar year and month windows.
    pub visit_date: Option<DateTime<Utc>>,
}

impl PricingContext {
    /// Context without visitor details.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether the customer is a business.
    #[must_use]
    pub fn is_business_customer(&self) -> bool {
        self.customer_type == Some(CustomerType::Business)
    }

    /// Whether the customer is a private person.
    #[must_use]
    pub fn is_individual_customer(&self) -> bool {
        self.customer_type == Some(CustomerType::Individual)
    }

    /// Whether the visitor comes from `city`.
    #[must_use]
    pub fn is_in(&self, city: &str) -> bool {
        self.city.as_deref() == Some(city)
    }

    fn has_visit_identity(&self) -> bool {
        self.visitor_id.is_some() && self.visit_date.is_some()
    }

    fn exemption_key(&self) -> Result<(&VisitorId, DateTime<Utc>), DomainError> {
        match (&self.visitor_id, self.visit_date) {
            (Some(visitor_id), Some(date)) => Ok((visitor_id, date)),
            _ => Err(DomainError::MissingExemptionContext),
        }
    }
}

/// Per-kilogram rate for each fraction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractionRates {
    /// EUR per kg of green waste.
    pub green_waste: Decimal,
    /// EUR per kg of construction waste.
    pub construction_waste: Decimal,
}

impl FractionRates {
    /// Rate for one fraction type.
    #[must_use]
    pub fn rate(self, fraction_type: FractionType) -> Decimal {
        match fraction_type {
            FractionType::GreenWaste => self.green_waste,
            FractionType::ConstructionWaste => self.construction_waste,
        }
    }

    /// `rate × weight` for the fraction.
    ///
    /// # Errors
    ///
    /// Propagates [`Price`] construction errors.
    pub fn price(self, fraction: &DroppedFraction) -> Result<Price, DomainError> {
        Price::eur(self.rate(fraction.fraction_type))?.times(fraction.weight.as_decimal())
    }
}

/// Rates split by customer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTable {
    /// Rates for private persons and unknown customer types.
    pub individual: FractionRates,
    /// Rates for business customers.
    pub business: FractionRates,
}

impl RateTable {
    /// Rates that apply to the context's customer type.
    #[must_use]
    pub fn for_context(&self, context: &PricingContext) -> FractionRates {
        if context.is_business_customer() {
            self.business
        } else {
            self.individual
        }
    }
}

/// Oak City flat rates.
pub const OAK_CITY_RATES: RateTable = RateTable {
    individual: FractionRates {
        green_waste: dec!(0.08),
        construction_waste: dec!(0.19),
    },
    business: FractionRates {
        green_waste: dec!(0.08),
        construction_waste: dec!(0.21),
    },
};

/// Pineville flat rates.
pub const PINEVILLE_RATES: RateTable = RateTable {
    individual: FractionRates {
        green_waste: dec!(0.10),
        construction_waste: dec!(0.15),
    },
    business: FractionRates {
        green_waste: dec!(0.12),
        construction_waste: dec!(0.13),
    },
};

/// Rates for business customers from cities without their own table.
pub const BUSINESS_DISCOUNT_RATES: FractionRates = FractionRates {
    green_waste: dec!(0.10),
    construction_waste: dec!(0.19),
};

/// Fallback rates.
pub const DEFAULT_RATES: FractionRates = FractionRates {
    green_waste: dec!(0.10),
    construction_waste: dec!(0.19),
};

/// Yearly low-rate quota for construction waste.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExemptionTier {
    /// Kilograms per calendar year charged at `low_rate`.
    pub limit_kg: u64,
    /// EUR per kg inside the quota.
    pub low_rate: Decimal,
    /// EUR per kg above the quota.
    pub high_rate: Decimal,
}

impl ExemptionTier {
    /// `low_rate × low_kg + high_rate × high_kg`.
    ///
    /// # Errors
    ///
    /// Propagates [`Price`] construction errors.
    pub fn price(&self, split: TieredWeights) -> Result<Price, DomainError> {
        Price::eur(
            self.low_rate * Decimal::from(split.low_kg)
                + self.high_rate * Decimal::from(split.high_kg),
        )
    }

    /// Price `kg` against the entity's remaining quota and record the drop.
    fn charge(
        &self,
        entity: &str,
        kg: u64,
        date: DateTime<Utc>,
        state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        let split = state
            .exemptions
            .tiered_weights(entity, kg, date, self.limit_kg);
        let price = self.price(split)?;
        state.exemptions.record_waste(entity, kg, date);
        debug!(
            entity,
            low_kg = split.low_kg,
            high_kg = split.high_kg,
            %price,
            "charged construction waste against exemption"
        );
        Ok(price)
    }
}

/// A pricing rule the engine can select.
pub trait PricingRule: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Evaluation order; lower numbers are tried first.
    fn priority(&self) -> u32;

    /// Whether this rule prices fractions for the context.
    fn can_apply(&self, context: &PricingContext) -> bool;

    /// Price one fraction.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when the context lacks data the rule needs.
    fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        context: &PricingContext,
        state: &mut PricingState,
    ) -> Result<Price, DomainError>;

    /// Amount to add on top of a visit's base price. Rules without a
    /// surcharge return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when the surcharge cannot be computed.
    fn surcharge(
        &self,
        _base_price: &Price,
        _context: &PricingContext,
        _state: &PricingState,
    ) -> Result<Option<Price>, DomainError> {
        Ok(None)
    }
}

/// Tiered construction waste pricing for Oak City businesses, pooled per business.
#[derive(Debug, Clone, Copy)]
pub struct OakCityBusinessExemptionRule {
    tier: ExemptionTier,
}

impl OakCityBusinessExemptionRule {
    /// First 1000 kg per year at 0.21, the rest at 0.29.
    pub const TIER: ExemptionTier = ExemptionTier {
        limit_kg: 1000,
        low_rate: dec!(0.21),
        high_rate: dec!(0.29),
    };

    /// Rule with the standard tier.
    #[must_use]
    pub fn new() -> Self {
        Self { tier: Self::TIER }
    }
}

impl Default for OakCityBusinessExemptionRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingRule for OakCityBusinessExemptionRule {
    fn name(&self) -> &'static str {
        "oak-city-business-exemption"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn can_apply(&self, context: &PricingContext) -> bool {
        context.is_in(OAK_CITY) && context.is_business_customer() && context.has_visit_identity()
    }

    fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        context: &PricingContext,
        state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        let (visitor_id, date) = context.exemption_key()?;
        if fraction.fraction_type != FractionType::ConstructionWaste {
            return OAK_CITY_RATES.business.price(fraction);
        }
        let entity = state
            .memberships
            .business_for_visitor(visitor_id)
            .map_or_else(|| visitor_id.0.clone(), |business| business.0.clone());
        self.tier.charge(&entity, fraction.weight.kg(), date, state)
    }
}

/// Tiered construction waste pricing for Oak City residents, pooled per household.
#[derive(Debug, Clone, Copy)]
pub struct OakCityHouseholdExemptionRule {
    tier: ExemptionTier,
}

impl OakCityHouseholdExemptionRule {
    /// First 500 kg per year at 0.125, the rest at 0.20.
    pub const TIER: ExemptionTier = ExemptionTier {
        limit_kg: 500,
        low_rate: dec!(0.125),
        high_rate: dec!(0.20),
    };

    /// Rule with the standard tier.
    #[must_use]
    pub fn new() -> Self {
        Self { tier: Self::TIER }
    }
}

impl Default for OakCityHouseholdExemptionRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingRule for OakCityHouseholdExemptionRule {
    fn name(&self) -> &'static str {
        "oak-city-household-exemption"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn can_apply(&self, context: &PricingContext) -> bool {
        context.is_in(OAK_CITY) && context.is_individual_customer() && context.has_visit_identity()
    }

    fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        context: &PricingContext,
        state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        let (visitor_id, date) = context.exemption_key()?;
        if fraction.fraction_type != FractionType::ConstructionWaste {
            return OAK_CITY_RATES.individual.price(fraction);
        }
        let entity = state
            .memberships
            .household_for_visitor(visitor_id)
            .map_or_else(|| visitor_id.0.clone(), |household| household.0.clone());
        self.tier.charge(&entity, fraction.weight.kg(), date, state)
    }
}

/// Flat rates for one city.
#[derive(Debug, Clone, Copy)]
pub struct CityRateRule {
    name: &'static str,
    city: &'static str,
    rates: RateTable,
}

impl CityRateRule {
    /// Pineville visitors.
    #[must_use]
    pub fn pineville() -> Self {
        Self {
            name: "pineville",
            city: PINEVILLE,
            rates: PINEVILLE_RATES,
        }
    }

    /// Oak City visitors not covered by an exemption rule.
    #[must_use]
    pub fn oak_city() -> Self {
        Self {
            name: "oak-city",
            city: OAK_CITY,
            rates: OAK_CITY_RATES,
        }
    }
}

impl PricingRule for CityRateRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u32 {
        10
    }

    fn can_apply(&self, context: &PricingContext) -> bool {
        context.is_in(self.city)
    }

    fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        context: &PricingContext,
        _state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        self.rates.for_context(context).price(fraction)
    }
}

/// Business customers from cities without their own rates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessDiscountRule;

impl PricingRule for BusinessDiscountRule {
    fn name(&self) -> &'static str {
        "business-discount"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn can_apply(&self, context: &PricingContext) -> bool {
        context.is_business_customer() && !context.is_in(PINEVILLE) && !context.is_in(OAK_CITY)
    }

    fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        _context: &PricingContext,
        _state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        BUSINESS_DISCOUNT_RATES.price(fraction)
    }
}

/// 5 % on top of the visit for individuals visiting three or more times a month.
///
/// Never selected for base prices; it only contributes a surcharge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthlySurchargeRule;

impl MonthlySurchargeRule {
    /// Visits per calendar month from which the surcharge applies.
    pub const THRESHOLD: usize = 3;
    /// Surcharge as a fraction of the base price.
    pub const RATE: Decimal = dec!(0.05);

    /// Whether the visitor in `context` currently owes the surcharge.
    ///
    /// The visit being priced must already be saved, so it counts too.
    #[must_use]
    pub fn applies(context: &PricingContext, state: &PricingState) -> bool {
        let (Some(visitor_id), Some(date)) = (&context.visitor_id, context.visit_date) else {
            return false;
        };
        context.is_individual_customer()
            && state
                .visits
                .count_visits_for_person_in_month(visitor_id, date.year(), date.month())
                >= Self::THRESHOLD
    }
}

impl PricingRule for MonthlySurchargeRule {
    fn name(&self) -> &'static str {
        "monthly-surcharge"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn can_apply(&self, _context: &PricingContext) -> bool {
        false
    }

    fn calculate_price(
        &self,
        _fraction: &DroppedFraction,
        _context: &PricingContext,
        _state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        Ok(Price::zero(Currency::Eur))
    }

    fn surcharge(
        &self,
        base_price: &Price,
        context: &PricingContext,
        state: &PricingState,
    ) -> Result<Option<Price>, DomainError> {
        if Self::applies(context, state) {
            base_price.times(Self::RATE).map(Some)
        } else {
            Ok(Some(Price::zero(base_price.currency())))
        }
    }
}

/// Catch-all rule that always applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRule;

impl DefaultRule {
    /// Priority of the fallback.
    pub const PRIORITY: u32 = 1000;
}

impl PricingRule for DefaultRule {
    fn name(&self) -> &'static str {
        "default"
    }

    fn priority(&self) -> u32 {
        Self::PRIORITY
    }

    fn can_apply(&self, _context: &PricingContext) -> bool {
        true
    }

    fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        _context: &PricingContext,
        _state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        DEFAULT_RATES.price(fraction)
    }
}

/// Rules sorted by priority, first match wins.
pub struct PricingRuleEngine {
    rules: Vec<Box<dyn PricingRule>>,
}

impl PricingRuleEngine {
    /// Engine over the given rules, sorted by priority. Equal priorities keep
    /// their relative order.
    #[must_use]
    pub fn new(mut rules: Vec<Box<dyn PricingRule>>) -> Self {
        rules.sort_by_key(|rule| rule.priority());
        Self { rules }
    }

    /// Engine with every built-in rule.
    #[must_use]
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            Box::new(OakCityBusinessExemptionRule::new()),
            Box::new(OakCityHouseholdExemptionRule::new()),
            Box::new(CityRateRule::pineville()),
            Box::new(CityRateRule::oak_city()),
            Box::new(BusinessDiscountRule),
            Box::new(MonthlySurchargeRule),
            Box::new(DefaultRule),
        ])
    }

    /// Register another rule, keeping the priority order.
    pub fn add_rule(&mut self, rule: Box<dyn PricingRule>) {
        self.rules.push(rule);
        self.rules.sort_by_key(|rule| rule.priority());
    }

    /// Names of the rules in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Every rule accepting the context, in evaluation order.
    #[must_use]
    pub fn applicable_rules(&self, context: &PricingContext) -> Vec<&dyn PricingRule> {
        self.rules
            .iter()
            .filter(|rule| rule.can_apply(context))
            .map(|rule| &**rule)
            .collect()
    }

    /// Price a single fraction with the first applicable rule.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoApplicableRule`] when no rule accepts the
    /// context, or the selected rule's error.
    pub fn calculate_price(
        &self,
        fraction: &DroppedFraction,
        context: &PricingContext,
        state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.can_apply(context))
            .ok_or(DomainError::NoApplicableRule)?;
        let price = rule.calculate_price(fraction, context, state)?;
        debug!(
            rule = rule.name(),
            fraction = %fraction.fraction_type,
            kg = fraction.weight.kg(),
            %price,
            "priced fraction"
        );
        Ok(price)
    }

    /// Sum of the fraction prices, each priced in order.
    ///
    /// # Errors
    ///
    /// Propagates the first pricing error.
    pub fn calculate_base_price(
        &self,
        fractions: &[DroppedFraction],
        context: &PricingContext,
        state: &mut PricingState,
    ) -> Result<Price, DomainError> {
        fractions
            .iter()
            .try_fold(Price::zero(Currency::Eur), |total, fraction| {
                total.add(&self.calculate_price(fraction, context, state)?)
            })
    }

    /// Add every rule's surcharge to `base_price`.
    ///
    /// # Errors
    ///
    /// Propagates the first surcharge error.
    pub fn apply_post_processing(
        &self,
        base_price: Price,
        context: &PricingContext,
        state: &PricingState,
    ) -> Result<Price, DomainError> {
        self.rules.iter().try_fold(base_price, |total, rule| {
            match rule.surcharge(&base_price, context, state)? {
                Some(surcharge) => total.add(&surcharge),
                None => Ok(total),
            }
        })
    }
}

impl Default for PricingRuleEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{Visit, VisitId, Visitor, Weight};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0)
            .single()
            .expect("valid date")
    }

    fn context(
        customer_type: CustomerType,
        city: &str,
        visitor: &str,
        date: DateTime<Utc>,
    ) -> PricingContext {
        PricingContext {
            customer_type: Some(customer_type),
            city: Some(city.to_owned()),
            visitor_id: Some(VisitorId::from(visitor)),
            visit_date: Some(date),
        }
    }

    fn construction(kg: u64) -> DroppedFraction {
        DroppedFraction::new(FractionType::ConstructionWaste, Weight::from_kg(kg))
    }

    fn green(kg: u64) -> DroppedFraction {
        DroppedFraction::new(FractionType::GreenWaste, Weight::from_kg(kg))
    }

    fn enroll(state: &mut PricingState, id: &str, customer_type: CustomerType, address: &str) {
        let visitor = Visitor::new(VisitorId::from(id), customer_type, address, OAK_CITY, "card", "")
            .expect("visitor");
        state.memberships.enroll(&visitor).expect("enroll");
    }

    fn price_of(
        engine: &PricingRuleEngine,
        fractions: &[DroppedFraction],
        context: &PricingContext,
        state: &mut PricingState,
    ) -> Decimal {
        engine
            .calculate_base_price(fractions, context, state)
            .expect("priced")
            .amount()
    }

    #[test]
    fn default_rules_are_sorted_by_priority() {
        let engine = PricingRuleEngine::with_default_rules();
        assert_eq!(
            engine.rule_names(),
            [
                "oak-city-business-exemption",
                "oak-city-household-exemption",
                "pineville",
                "oak-city",
                "business-discount",
                "monthly-surcharge",
                "default",
            ]
        );
    }

    #[test]
    fn flat_rates_are_linear_in_weight() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let cases = [
            (CustomerType::Individual, PINEVILLE, FractionType::GreenWaste, dec!(0.10)),
            (CustomerType::Individual, PINEVILLE, FractionType::ConstructionWaste, dec!(0.15)),
            (CustomerType::Business, PINEVILLE, FractionType::GreenWaste, dec!(0.12)),
            (CustomerType::Business, PINEVILLE, FractionType::ConstructionWaste, dec!(0.13)),
            (CustomerType::Business, "Elsewhere", FractionType::GreenWaste, dec!(0.10)),
            (CustomerType::Business, "Elsewhere", FractionType::ConstructionWaste, dec!(0.19)),
            (CustomerType::Individual, "Elsewhere", FractionType::GreenWaste, dec!(0.10)),
            (CustomerType::Individual, "Elsewhere", FractionType::ConstructionWaste, dec!(0.19)),
        ];
        for (customer_type, city, fraction_type, rate) in cases {
            let ctx = context(customer_type, city, "p1", at(2024, 6, 1));
            for kg in [0_u64, 1, 37, 1200] {
                let fraction = DroppedFraction::new(fraction_type, Weight::from_kg(kg));
                let price = engine
                    .calculate_price(&fraction, &ctx, &mut state)
                    .expect("priced");
                assert_eq!(price.amount(), rate * Decimal::from(kg), "{city} {customer_type}");
            }
        }
    }

    #[test]
    fn oak_city_without_visit_identity_uses_flat_rates() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let ctx = PricingContext {
            customer_type: Some(CustomerType::Business),
            city: Some(OAK_CITY.to_owned()),
            ..PricingContext::anonymous()
        };
        assert_eq!(price_of(&engine, &[construction(100)], &ctx, &mut state), dec!(21));
        assert_eq!(state.exemptions.used_exemption("p1", 2024), 0);
    }

    #[test]
    fn unknown_visitor_gets_default_rates() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let ctx = PricingContext::anonymous();
        assert_eq!(
            price_of(&engine, &[green(10), construction(10)], &ctx, &mut state),
            dec!(2.9)
        );
    }

    #[test]
    fn single_business_visit_stays_in_low_tier() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        enroll(&mut state, "b1", CustomerType::Business, "Dock 4");
        let ctx = context(CustomerType::Business, OAK_CITY, "b1", at(2024, 3, 1));

        assert_eq!(price_of(&engine, &[construction(600)], &ctx, &mut state), dec!(126.00));
    }

    #[test]
    fn second_business_visit_crosses_the_tier() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        enroll(&mut state, "b1", CustomerType::Business, "Dock 4");
        let ctx = context(CustomerType::Business, OAK_CITY, "b1", at(2024, 3, 1));

        price_of(&engine, &[construction(600)], &ctx, &mut state);
        assert_eq!(price_of(&engine, &[construction(900)], &ctx, &mut state), dec!(229.00));
    }

    #[test]
    fn employees_of_one_business_share_the_quota() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        enroll(&mut state, "alice", CustomerType::Business, "Dock 4");
        enroll(&mut state, "bob", CustomerType::Business, "Dock 4");

        let alice = context(CustomerType::Business, OAK_CITY, "alice", at(2024, 3, 1));
        let bob = context(CustomerType::Business, OAK_CITY, "bob", at(2024, 4, 1));

        assert_eq!(price_of(&engine, &[construction(597)], &alice, &mut state), dec!(125.37));
        assert_eq!(price_of(&engine, &[construction(1803)], &bob, &mut state), dec!(490.63));
        assert_eq!(state.exemptions.used_exemption("Oak City|Dock 4", 2024), 2400);
    }

    #[test]
    fn unpooled_visitor_tracks_own_quota() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let ctx = context(CustomerType::Business, OAK_CITY, "solo", at(2024, 3, 1));

        assert_eq!(price_of(&engine, &[construction(1200)], &ctx, &mut state), dec!(268.00));
        assert_eq!(state.exemptions.used_exemption("solo", 2024), 1200);
    }

    #[test]
    fn exemption_resets_with_the_calendar_year() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        enroll(&mut state, "b1", CustomerType::Business, "Dock 4");

        let december = context(CustomerType::Business, OAK_CITY, "b1", at(2024, 12, 31));
        let january = context(CustomerType::Business, OAK_CITY, "b1", at(2025, 1, 1));

        assert_eq!(price_of(&engine, &[construction(1000)], &december, &mut state), dec!(210.00));
        assert_eq!(price_of(&engine, &[construction(800)], &january, &mut state), dec!(168.00));
    }

    #[test]
    fn fractions_within_a_visit_consume_quota_in_order() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let ctx = context(CustomerType::Business, OAK_CITY, "b1", at(2024, 3, 1));

        // 800 low, then 200 low + 300 high
        let price = price_of(&engine, &[construction(800), construction(500)], &ctx, &mut state);
        assert_eq!(price, dec!(168) + dec!(42) + dec!(87));
    }

    #[test]
    fn household_residents_share_a_smaller_quota() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        enroll(&mut state, "ann", CustomerType::Individual, "Elm Road 2");
        enroll(&mut state, "ben", CustomerType::Individual, "elm road 2");

        let ann = context(CustomerType::Individual, OAK_CITY, "ann", at(2024, 5, 1));
        let ben = context(CustomerType::Individual, OAK_CITY, "ben", at(2024, 5, 2));

        assert_eq!(price_of(&engine, &[construction(300)], &ann, &mut state), dec!(37.5));
        // 200 kg left at 0.125, 100 kg at 0.20
        assert_eq!(price_of(&engine, &[construction(300)], &ben, &mut state), dec!(45));
    }

    #[test]
    fn exemption_rules_price_green_waste_flat() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let business = context(CustomerType::Business, OAK_CITY, "b1", at(2024, 5, 1));
        let resident = context(CustomerType::Individual, OAK_CITY, "r1", at(2024, 5, 1));

        assert_eq!(price_of(&engine, &[green(100)], &business, &mut state), dec!(8));
        assert_eq!(price_of(&engine, &[green(100)], &resident, &mut state), dec!(8));
        assert_eq!(state.exemptions.used_exemption("b1", 2024), 0);
    }

    #[test]
    fn exemption_rule_requires_visit_identity() {
        let mut state = PricingState::new();
        let ctx = PricingContext {
            customer_type: Some(CustomerType::Business),
            city: Some(OAK_CITY.to_owned()),
            visitor_id: Some(VisitorId::from("b1")),
            visit_date: None,
        };
        let rule = OakCityBusinessExemptionRule::new();
        assert!(!rule.can_apply(&ctx));
        assert_eq!(
            rule.calculate_price(&construction(10), &ctx, &mut state),
            Err(DomainError::MissingExemptionContext)
        );
    }

    #[test]
    fn empty_engine_reports_missing_rule() {
        let engine = PricingRuleEngine::new(Vec::new());
        let mut state = PricingState::new();
        assert_eq!(
            engine.calculate_price(&green(1), &PricingContext::anonymous(), &mut state),
            Err(DomainError::NoApplicableRule)
        );
    }

    #[test]
    fn added_rules_keep_order_and_ties_stay_stable() {
        struct Fixed(&'static str, u32, Decimal);

        impl PricingRule for Fixed {
            fn name(&self) -> &'static str {
                self.0
            }

            fn priority(&self) -> u32 {
                self.1
            }

            fn can_apply(&self, _context: &PricingContext) -> bool {
                true
            }

            fn calculate_price(
                &self,
                _fraction: &DroppedFraction,
                _context: &PricingContext,
                _state: &mut PricingState,
            ) -> Result<Price, DomainError> {
                Price::eur(self.2)
            }
        }

        let mut engine = PricingRuleEngine::with_default_rules();
        engine.add_rule(Box::new(Fixed("first-tie", 1, dec!(1))));
        engine.add_rule(Box::new(Fixed("second-tie", 1, dec!(2))));

        let names = engine.rule_names();
        assert_eq!(names.first(), Some(&"first-tie"));
        assert_eq!(names.get(1), Some(&"second-tie"));

        let mut state = PricingState::new();
        let price = engine
            .calculate_price(&green(10), &PricingContext::anonymous(), &mut state)
            .expect("priced");
        assert_eq!(price.amount(), dec!(1));
    }

    #[test]
    fn applicable_rules_lists_all_matches() {
        let engine = PricingRuleEngine::with_default_rules();
        let ctx = context(CustomerType::Business, OAK_CITY, "b1", at(2024, 1, 1));
        let names: Vec<&str> = engine
            .applicable_rules(&ctx)
            .into_iter()
            .map(|rule| rule.name())
            .collect();
        assert_eq!(names, ["oak-city-business-exemption", "oak-city", "default"]);
    }

    #[test]
    fn surcharge_starts_at_the_third_visit_of_the_month() {
        let engine = PricingRuleEngine::with_default_rules();
        let mut state = PricingState::new();
        let base = Price::eur(dec!(0.80)).expect("price");
        let ctx = context(CustomerType::Individual, PINEVILLE, "p1", at(2024, 3, 20));

        let mut totals = Vec::new();
        for day in 1..=3 {
            state.visits.save(
                Visit::new(
                    VisitId(format!("v{day}")),
                    VisitorId::from("p1"),
                    at(2024, 3, day),
                    vec![green(10)],
                )
                .expect("visit"),
            );
            totals.push(
                engine
                    .apply_post_processing(base, &ctx, &state)
                    .expect("post-processed")
                    .amount(),
            );
        }
        assert_eq!(totals, [dec!(0.80), dec!(0.80), dec!(0.84)]);
    }

    #[test]
    fn businesses_never_pay_the_surcharge() {
        let mut state = PricingState::new();
        for day in 1..=5 {
            state.visits.save(
                Visit::new(
                    VisitId(format!("v{day}")),
                    VisitorId::from("b1"),
                    at(2024, 3, day),
                    vec![green(10)],
                )
                .expect("visit"),
            );
        }
        let business = context(CustomerType::Business, PINEVILLE, "b1", at(2024, 3, 5));
        let individual = context(CustomerType::Individual, PINEVILLE, "b1", at(2024, 3, 5));
        let next_month = context(CustomerType::Individual, PINEVILLE, "b1", at(2024, 4, 5));

        assert!(!MonthlySurchargeRule::applies(&business, &state));
        assert!(MonthlySurchargeRule::applies(&individual, &state));
        assert!(!MonthlySurchargeRule::applies(&next_month, &state));
    }
}
