//! Money, waste, visit, and visitor types.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Validation failures and broken domain invariants.
pub enum DomainError {
    /// A price was constructed or scaled below zero.
    #[error("Price amount must not be negative: {0}")]
    NegativeAmount(Decimal),
    /// Two prices in different currencies were combined.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the receiver.
        left: Currency,
        /// Currency of the argument.
        right: Currency,
    },
    /// A weight below zero was supplied.
    #[error("Weight must not be negative: {0}")]
    NegativeWeight(i64),
    /// The fraction label is not one of the known fraction types.
    #[error("Invalid fraction type: {0}")]
    InvalidFractionType(String),
    /// The customer type label is neither `individual` nor `business`.
    #[error("Unknown customer type: {0}")]
    UnknownCustomerType(String),
    /// A visit was built without any dropped fraction.
    #[error("Visit must have at least one dropped fraction")]
    EmptyVisit,
    /// A required identifier or attribute was empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    /// The visit date could not be parsed.
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    /// Email update without an `@`.
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),
    /// Address update with an empty address or city.
    #[error("Address and city cannot be empty")]
    InvalidAddress,
    /// A range lookup where the start lies after the end.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Requested start of the range.
        start: DateTime<Utc>,
        /// Requested end of the range.
        end: DateTime<Utc>,
    },
    /// A visitor that is not known locally.
    #[error("Visitor with ID '{0}' not found")]
    VisitorNotFound(String),
    /// A visit that is not stored in the ledger.
    #[error("Visit with ID '{0}' not found")]
    VisitNotFound(String),
    /// A visitor does not belong to the aggregate it was added to.
    #[error("Visitor {visitor} does not match aggregate {aggregate}")]
    MemberMismatch {
        /// Visitor being added.
        visitor: String,
        /// Identifier of the business or household.
        aggregate: String,
    },
    /// An exemption rule ran without visitor id or visit date.
    #[error("visitor_id and visit_date are required for exemption tracking")]
    MissingExemptionContext,
    /// The engine holds no rule able to price the context.
    #[error("No applicable pricing rule found")]
    NoApplicableRule,
}

impl DomainError {
    /// Whether the error was caused by client input rather than a wiring bug.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            DomainError::CurrencyMismatch { .. }
                | DomainError::MemberMismatch { .. }
                | DomainError::MissingExemptionContext
                | DomainError::NoApplicableRule
                | DomainError::NegativeAmount(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Currencies a price can be expressed in.
pub enum Currency {
    /// Euro.
    #[serde(rename = "EUR")]
    Eur,
}

impl fmt::Display for Currency {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Eur => write!(formatter, "EUR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
/// Non-negative monetary amount.
pub struct Price {
    amount: Decimal,
    currency: Currency,
}

impl Price {
    /// Build a price, rejecting negative amounts.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NegativeAmount`] when `amount < 0`.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, DomainError> {
        if amount < Decimal::ZERO {
            return Err(DomainError::NegativeAmount(amount));
        }
        Ok(Self { amount, currency })
    }

    /// Euro price.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NegativeAmount`] when `amount < 0`.
    pub fn eur(amount: Decimal) -> Result<Self, DomainError> {
        Self::new(amount, Currency::Eur)
    }

    /// Zero amount in the given currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Amount of the price.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Currency of the price.
    #[must_use]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Sum of two prices in the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::CurrencyMismatch`] when currencies differ.
    pub fn add(&self, other: &Price) -> Result<Price, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Price::new(self.amount + other.amount, self.currency)
    }

    /// Scale the price by `factor`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NegativeAmount`] for a negative factor.
    pub fn times(&self, factor: Decimal) -> Result<Price, DomainError> {
        Price::new(self.amount * factor, self.currency)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.amount, self.currency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Dropped weight in whole kilograms.
pub struct Weight(u64);

impl Weight {
    /// Validate a raw kilogram amount.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NegativeWeight`] for values below zero.
    pub fn new(kg: i64) -> Result<Self, DomainError> {
        u64::try_from(kg)
            .map(Weight)
            .map_err(|_| DomainError::NegativeWeight(kg))
    }

    /// Weight from an unsigned kilogram amount.
    #[must_use]
    pub fn from_kg(kg: u64) -> Self {
        Weight(kg)
    }

    /// Kilograms.
    #[must_use]
    pub fn kg(self) -> u64 {
        self.0
    }

    /// Kilograms as a decimal multiplier.
    #[must_use]
    pub fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Waste categories accepted at the recycling centre.
pub enum FractionType {
    /// Garden and green waste.
    #[serde(rename = "Green waste")]
    GreenWaste,
    /// Rubble and other construction waste.
    #[serde(rename = "Construction waste")]
    ConstructionWaste,
}

impl FractionType {
    /// Every known fraction type.
    pub const ALL: [FractionType; 2] = [FractionType::GreenWaste, FractionType::ConstructionWaste];

    /// Label used on the wire.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            FractionType::GreenWaste => "Green waste",
            FractionType::ConstructionWaste => "Construction waste",
        }
    }
}

impl fmt::Display for FractionType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

impl FromStr for FractionType {
    type Err = DomainError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        FractionType::ALL
            .into_iter()
            .find(|fraction| fraction.label() == label)
            .ok_or_else(|| DomainError::InvalidFractionType(label.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// One line item of a visit.
pub struct DroppedFraction {
    /// Category of the waste.
    pub fraction_type: FractionType,
    /// Dropped weight.
    pub weight: Weight,
}

impl DroppedFraction {
    /// Create a fraction from typed parts.
    #[must_use]
    pub fn new(fraction_type: FractionType, weight: Weight) -> Self {
        Self {
            fraction_type,
            weight,
        }
    }

    /// Parse a fraction from its wire label and raw kilograms.
    ///
    /// # Errors
    ///
    /// Fails on an unknown label or a negative weight.
    pub fn parse(label: &str, amount_dropped: i64) -> Result<Self, DomainError> {
        Ok(Self::new(label.parse()?, Weight::new(amount_dropped)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Kind of customer dropping waste.
pub enum CustomerType {
    /// Private person.
    Individual,
    /// Company employee.
    Business,
}

impl fmt::Display for CustomerType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CustomerType::Individual => "individual",
            CustomerType::Business => "business",
        };
        formatter.write_str(label)
    }
}

impl FromStr for CustomerType {
    type Err = DomainError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "individual" => Ok(CustomerType::Individual),
            "business" => Ok(CustomerType::Business),
            other => Err(DomainError::UnknownCustomerType(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier of a person visiting the recycling centre.
pub struct VisitorId(pub String);

impl VisitorId {
    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for VisitorId {
    fn from(raw: &str) -> Self {
        VisitorId(raw.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier of a single drop-off visit.
pub struct VisitId(pub String);

impl fmt::Display for VisitId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for VisitId {
    fn from(raw: &str) -> Self {
        VisitId(raw.to_owned())
    }
}

#[derive(Debug, Clone)]
/// A drop-off visit. Identity is the visit id.
pub struct Visit {
    id: VisitId,
    visitor_id: VisitorId,
    date: DateTime<Utc>,
    dropped_fractions: Vec<DroppedFraction>,
}

impl Visit {
    /// Build a visit, enforcing non-empty ids and at least one fraction.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MissingField`] for empty ids and
    /// [`DomainError::EmptyVisit`] when no fraction was dropped.
    pub fn new(
        id: VisitId,
        visitor_id: VisitorId,
        date: DateTime<Utc>,
        dropped_fractions: Vec<DroppedFraction>,
    ) -> Result<Self, DomainError> {
        if id.0.trim().is_empty() {
            return Err(DomainError::MissingField("visit_id"));
        }
        if visitor_id.0.trim().is_empty() {
            return Err(DomainError::MissingField("person_id"));
        }
        if dropped_fractions.is_empty() {
            return Err(DomainError::EmptyVisit);
        }
        Ok(Self {
            id,
            visitor_id,
            date,
            dropped_fractions,
        })
    }

    /// Visit identifier.
    #[must_use]
    pub fn id(&self) -> &VisitId {
        &self.id
    }

    /// Visitor who made the visit.
    #[must_use]
    pub fn visitor_id(&self) -> &VisitorId {
        &self.visitor_id
    }

    /// Moment of the visit.
    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Dropped fractions in request order.
    #[must_use]
    pub fn dropped_fractions(&self) -> &[DroppedFraction] {
        &self.dropped_fractions
    }

    /// Sum of all dropped weights.
    #[must_use]
    pub fn total_weight(&self) -> Weight {
        Weight::from_kg(
            self.dropped_fractions
                .iter()
                .fold(0_u64, |total, fraction| total.saturating_add(fraction.weight.kg())),
        )
    }

    /// Whether any fraction of the given type was dropped.
    #[must_use]
    pub fn has_fraction_type(&self, fraction_type: FractionType) -> bool {
        self.dropped_fractions
            .iter()
            .any(|fraction| fraction.fraction_type == fraction_type)
    }

    /// Calendar year and month of the visit.
    #[must_use]
    pub fn year_month(&self) -> (i32, u32) {
        (self.date.year(), self.date.month())
    }

    /// Whether both visits fall in the same calendar month.
    #[must_use]
    pub fn is_same_month(&self, other: &Visit) -> bool {
        self.year_month() == other.year_month()
    }

    /// Append another fraction to the visit.
    pub fn add_dropped_fraction(&mut self, fraction: DroppedFraction) {
        self.dropped_fractions.push(fraction);
    }
}

impl PartialEq for Visit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Visit {}

impl Hash for Visit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Visit {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "Visit(id={}, visitor_id={}, date={})",
            self.id,
            self.visitor_id,
            self.date.date_naive()
        )
    }
}

#[derive(Debug, Clone)]
/// A person known to the external visitor service. Identity is the visitor id.
pub struct Visitor {
    id: VisitorId,
    customer_type: CustomerType,
    address: String,
    city: String,
    card_id: String,
    email: String,
}

impl Visitor {
    /// Build a visitor, requiring id, city, and card id.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MissingField`] when a required attribute is empty.
    pub fn new(
        id: VisitorId,
        customer_type: CustomerType,
        address: impl Into<String>,
        city: impl Into<String>,
        card_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let city = city.into();
        let card_id = card_id.into();
        if id.0.is_empty() {
            return Err(DomainError::MissingField("visitor id"));
        }
        if city.is_empty() {
            return Err(DomainError::MissingField("city"));
        }
        if card_id.is_empty() {
            return Err(DomainError::MissingField("card id"));
        }
        Ok(Self {
            id,
            customer_type,
            address: address.into(),
            city,
            card_id,
            email: email.into(),
        })
    }

    /// Visitor identifier.
    #[must_use]
    pub fn id(&self) -> &VisitorId {
        &self.id
    }

    /// Individual or business customer.
    #[must_use]
    pub fn customer_type(&self) -> CustomerType {
        self.customer_type
    }

    /// Street address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// City of residence or business.
    #[must_use]
    pub fn city(&self) -> &str {
        &self.city
    }

    /// Access card number.
    #[must_use]
    pub fn card_id(&self) -> &str {
        &self.card_id
    }

    /// Email address, possibly empty.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Replace the email address.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidEmail`] when the address has no `@`.
    pub fn update_email(&mut self, new_email: &str) -> Result<(), DomainError> {
        if !new_email.contains('@') {
            return Err(DomainError::InvalidEmail(new_email.to_owned()));
        }
        new_email.clone_into(&mut self.email);
        Ok(())
    }

    /// Move the visitor to another address.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidAddress`] when address or city is empty.
    pub fn update_address(&mut self, new_address: &str, new_city: &str) -> Result<(), DomainError> {
        if new_address.is_empty() || new_city.is_empty() {
            return Err(DomainError::InvalidAddress);
        }
        new_address.clone_into(&mut self.address);
        new_city.clone_into(&mut self.city);
        Ok(())
    }

    /// Case-insensitive city check.
    #[must_use]
    pub fn is_from_city(&self, city_name: &str) -> bool {
        self.city.eq_ignore_ascii_case(city_name)
    }
}

impl PartialEq for Visitor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Visitor {}

impl Hash for Visitor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn visit_on(id: &str, year: i32, month: u32, day: u32) -> Visit {
        Visit::new(
            VisitId::from(id),
            VisitorId::from("p1"),
            Utc.with_ymd_and_hms(year, month, day, 10, 0, 0)
                .single()
                .expect("valid date"),
            vec![DroppedFraction::new(
                FractionType::GreenWaste,
                Weight::from_kg(10),
            )],
        )
        .expect("valid visit")
    }

    #[test]
    fn fraction_type_labels_parse_back() {
        for fraction in FractionType::ALL {
            assert_eq!(fraction.to_string().parse::<FractionType>(), Ok(fraction));
        }
    }

    #[test]
    fn unknown_fraction_label_is_rejected() {
        assert_eq!(
            "green waste".parse::<FractionType>(),
            Err(DomainError::InvalidFractionType("green waste".to_owned()))
        );
        assert!("Metal".parse::<FractionType>().is_err());
    }

    #[test]
    fn price_rejects_negative_amounts() {
        assert_eq!(
            Price::eur(dec!(-0.01)),
            Err(DomainError::NegativeAmount(dec!(-0.01)))
        );
        assert!(Price::eur(Decimal::ZERO).is_ok());
    }

    #[test]
    fn price_arithmetic_is_exact() {
        let price = Price::eur(dec!(0.08)).expect("price").times(dec!(10)).expect("times");
        assert_eq!(price.amount(), dec!(0.80));

        let total = price.add(&Price::eur(dec!(0.04)).expect("price")).expect("add");
        assert_eq!(total.amount(), dec!(0.84));
        assert_eq!(total.currency(), Currency::Eur);
    }

    #[test]
    fn negative_weight_is_rejected() {
        assert_eq!(Weight::new(-1), Err(DomainError::NegativeWeight(-1)));
        assert_eq!(Weight::new(0).map(Weight::kg), Ok(0));
    }

    #[test]
    fn visit_requires_fractions_and_ids() {
        let date = Utc::now();
        assert_eq!(
            Visit::new(VisitId::from("v1"), VisitorId::from("p1"), date, Vec::new()),
            Err(DomainError::EmptyVisit)
        );
        let fractions = vec![DroppedFraction::new(FractionType::GreenWaste, Weight::from_kg(1))];
        assert_eq!(
            Visit::new(VisitId::from(""), VisitorId::from("p1"), date, fractions),
            Err(DomainError::MissingField("visit_id"))
        );
    }

    #[test]
    fn total_weight_saturates_on_huge_drops() {
        let huge = DroppedFraction::parse("Construction waste", i64::MAX).expect("valid weight");
        let visit = Visit::new(
            VisitId::from("v1"),
            VisitorId::from("p1"),
            Utc::now(),
            vec![huge, huge, huge],
        )
        .expect("valid visit");
        assert_eq!(visit.total_weight(), Weight::from_kg(u64::MAX));
    }

    #[test]
    fn visits_compare_by_id_only() {
        let first = visit_on("v1", 2024, 3, 1);
        let mut second = visit_on("v1", 2025, 7, 9);
        second.add_dropped_fraction(DroppedFraction::new(
            FractionType::ConstructionWaste,
            Weight::from_kg(5),
        ));

        assert_eq!(first, second);
        assert_ne!(first, visit_on("v2", 2024, 3, 1));
        assert_eq!(second.total_weight().kg(), 15);
        assert!(second.has_fraction_type(FractionType::ConstructionWaste));
        assert!(!first.has_fraction_type(FractionType::ConstructionWaste));
    }

    #[test]
    fn same_month_requires_same_year() {
        let march = visit_on("v1", 2024, 3, 1);
        assert!(march.is_same_month(&visit_on("v2", 2024, 3, 31)));
        assert!(!march.is_same_month(&visit_on("v3", 2025, 3, 1)));
    }

    #[test]
    fn visitor_updates_are_validated() {
        let mut visitor = Visitor::new(
            VisitorId::from("p1"),
            CustomerType::Individual,
            "Main Street 1",
            "Oak City",
            "card-1",
            "",
        )
        .expect("visitor");

        assert_eq!(
            visitor.update_email("nobody"),
            Err(DomainError::InvalidEmail("nobody".to_owned()))
        );
        visitor.update_email("me@example.com").expect("email");
        assert_eq!(visitor.email(), "me@example.com");

        assert_eq!(visitor.update_address("", "Pineville"), Err(DomainError::InvalidAddress));
        visitor.update_address("Elm Road 2", "Pineville").expect("address");
        assert!(visitor.is_from_city("pineville"));
    }

    #[test]
    fn visitor_requires_city_and_card() {
        let missing_city = Visitor::new(
            VisitorId::from("p1"),
            CustomerType::Business,
            "Main Street 1",
            "",
            "card-1",
            "",
        );
        assert_eq!(missing_city, Err(DomainError::MissingField("city")));
    }
}
