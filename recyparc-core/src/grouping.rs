//! Businesses and households: visitors sharing a city and address pool their
//! construction waste exemption.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{CustomerType, DomainError, Visitor, VisitorId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of a business, derived from its location.
pub struct BusinessId(pub String);

impl BusinessId {
    /// Deterministic id for the business at `address` in `city`.
    #[must_use]
    pub fn for_location(city: &str, address: &str) -> Self {
        BusinessId(format!("{city}|{address}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of a household, derived from its normalized location.
pub struct HouseholdId(pub String);

impl HouseholdId {
    /// Deterministic id for the household at `address` in `city`.
    ///
    /// Case and spaces are ignored so "Main Street 1" and "mainstreet 1" match.
    #[must_use]
    pub fn for_location(city: &str, address: &str) -> Self {
        let address: String = address
            .to_lowercase()
            .chars()
            .filter(|ch| *ch != ' ')
            .collect();
        HouseholdId(format!("household:{}:{address}", city.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Aggregate whose id keys the exemption ledger.
pub enum PoolId {
    /// Employees of one business.
    Business(BusinessId),
    /// Residents of one household.
    Household(HouseholdId),
}

impl PoolId {
    /// Ledger key of the pool.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            PoolId::Business(id) => &id.0,
            PoolId::Household(id) => &id.0,
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
/// Business customer with every employee registered at its address.
pub struct Business {
    id: BusinessId,
    name: String,
    address: String,
    city: String,
    employees: Vec<Visitor>,
}

impl Business {
    /// Empty business located at `address` in `city`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MissingField`] when city or address is empty.
    pub fn new(city: &str, address: &str) -> Result<Self, DomainError> {
        if city.is_empty() {
            return Err(DomainError::MissingField("city"));
        }
        if address.is_empty() {
            return Err(DomainError::MissingField("address"));
        }
        Ok(Self {
            id: BusinessId::for_location(city, address),
            name: format!("Business at {address}, {city}"),
            address: address.to_owned(),
            city: city.to_owned(),
            employees: Vec::new(),
        })
    }

    /// Business id.
    #[must_use]
    pub fn id(&self) -> &BusinessId {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered employees.
    #[must_use]
    pub fn employees(&self) -> &[Visitor] {
        &self.employees
    }

    /// Whether the visitor already works here.
    #[must_use]
    pub fn has_employee(&self, visitor_id: &VisitorId) -> bool {
        self.employee(visitor_id).is_some()
    }

    /// Look up an employee by visitor id.
    #[must_use]
    pub fn employee(&self, visitor_id: &VisitorId) -> Option<&Visitor> {
        self.employees
            .iter()
            .find(|employee| employee.id() == visitor_id)
    }

    /// Register a business visitor at this address. Known employees are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MemberMismatch`] for individual customers or a
    /// visitor registered at a different city or address.
    pub fn add_employee(&mut self, visitor: Visitor) -> Result<(), DomainError> {
        if visitor.customer_type() != CustomerType::Business
            || visitor.city() != self.city
            || visitor.address() != self.address
        {
            return Err(DomainError::MemberMismatch {
                visitor: visitor.id().to_string(),
                aggregate: self.id.0.clone(),
            });
        }
        if !self.has_employee(visitor.id()) {
            self.employees.push(visitor);
        }
        Ok(())
    }
}

impl PartialEq for Business {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Business {}

#[derive(Debug, Clone)]
/// Individual customers living at the same address.
pub struct Household {
    id: HouseholdId,
    address: String,
    city: String,
    residents: Vec<Visitor>,
}

impl Household {
    /// Empty household located at `address` in `city`.
    #[must_use]
    pub fn new(city: &str, address: &str) -> Self {
        Self {
            id: HouseholdId::for_location(city, address),
            address: address.to_owned(),
            city: city.to_owned(),
            residents: Vec::new(),
        }
    }

    /// Household id.
    #[must_use]
    pub fn id(&self) -> &HouseholdId {
        &self.id
    }

    /// Registered residents.
    #[must_use]
    pub fn residents(&self) -> &[Visitor] {
        &self.residents
    }

    /// Whether the visitor already lives here.
    #[must_use]
    pub fn has_resident(&self, visitor_id: &VisitorId) -> bool {
        self.residents
            .iter()
            .any(|resident| resident.id() == visitor_id)
    }

    /// Register an individual visitor at this address. Known residents are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MemberMismatch`] for business customers or a
    /// visitor whose normalized location differs.
    pub fn add_resident(&mut self, visitor: Visitor) -> Result<(), DomainError> {
        if visitor.customer_type() != CustomerType::Individual
            || HouseholdId::for_location(visitor.city(), visitor.address()) != self.id
        {
            return Err(DomainError::MemberMismatch {
                visitor: visitor.id().to_string(),
                aggregate: self.id.0.clone(),
            });
        }
        if !self.has_resident(visitor.id()) {
            self.residents.push(visitor);
        }
        Ok(())
    }

    /// Street address as first registered.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// City as first registered.
    #[must_use]
    pub fn city(&self) -> &str {
        &self.city
    }
}

impl PartialEq for Household {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Household {}

/// Registry of every business and household seen during the scenario.
#[derive(Debug, Default)]
pub struct Memberships {
    businesses: HashMap<BusinessId, Business>,
    households: HashMap<HouseholdId, Household>,
    visitor_business: HashMap<VisitorId, BusinessId>,
    visitor_household: HashMap<VisitorId, HouseholdId>,
}

impl Memberships {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the visitor to the business or household at its location,
    /// creating the aggregate on first sight.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when the aggregate cannot be created or the
    /// visitor does not fit it.
    pub fn enroll(&mut self, visitor: &Visitor) -> Result<PoolId, DomainError> {
        match visitor.customer_type() {
            CustomerType::Business => {
                let id = BusinessId::for_location(visitor.city(), visitor.address());
                if !self.businesses.contains_key(&id) {
                    let business = Business::new(visitor.city(), visitor.address())?;
                    self.businesses.insert(id.clone(), business);
                }
                if let Some(business) = self.businesses.get_mut(&id) {
                    business.add_employee(visitor.clone())?;
                }
                self.visitor_business
                    .insert(visitor.id().clone(), id.clone());
                Ok(PoolId::Business(id))
            }
            CustomerType::Individual => {
                let id = HouseholdId::for_location(visitor.city(), visitor.address());
                self.households
                    .entry(id.clone())
                    .or_insert_with(|| Household::new(visitor.city(), visitor.address()))
                    .add_resident(visitor.clone())?;
                self.visitor_household
                    .insert(visitor.id().clone(), id.clone());
                Ok(PoolId::Household(id))
            }
        }
    }

    /// Business the visitor is employed by, if enrolled.
    #[must_use]
    pub fn business_for_visitor(&self, visitor_id: &VisitorId) -> Option<&BusinessId> {
        self.visitor_business.get(visitor_id)
    }

    /// Household the visitor lives in, if enrolled.
    #[must_use]
    pub fn household_for_visitor(&self, visitor_id: &VisitorId) -> Option<&HouseholdId> {
        self.visitor_household.get(visitor_id)
    }

    /// Look up a business.
    #[must_use]
    pub fn business(&self, id: &BusinessId) -> Option<&Business> {
        self.businesses.get(id)
    }

    /// Look up a household.
    #[must_use]
    pub fn household(&self, id: &HouseholdId) -> Option<&Household> {
        self.households.get(id)
    }

    /// All registered businesses.
    pub fn businesses(&self) -> impl Iterator<Item = &Business> {
        self.businesses.values()
    }

    /// All registered households.
    pub fn households(&self) -> impl Iterator<Item = &Household> {
        self.households.values()
    }

    /// Forget every aggregate.
    pub fn clear(&mut self) {
        self.businesses.clear();
        self.households.clear();
        self.visitor_business.clear();
        self.visitor_household.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor(id: &str, customer_type: CustomerType, address: &str, city: &str) -> Visitor {
        Visitor::new(VisitorId::from(id), customer_type, address, city, "card", "")
            .expect("valid visitor")
    }

    #[test]
    fn employees_at_one_address_share_a_business() {
        let mut memberships = Memberships::new();
        let first = visitor("e1", CustomerType::Business, "Dock 4", "Oak City");
        let second = visitor("e2", CustomerType::Business, "Dock 4", "Oak City");

        let pool_a = memberships.enroll(&first).expect("enroll");
        let pool_b = memberships.enroll(&second).expect("enroll");

        assert_eq!(pool_a, pool_b);
        assert_eq!(pool_a.as_str(), "Oak City|Dock 4");
        let business = memberships
            .business(&BusinessId::for_location("Oak City", "Dock 4"))
            .expect("business exists");
        assert_eq!(business.employees().len(), 2);
        assert_eq!(
            memberships.business_for_visitor(&VisitorId::from("e2")),
            Some(&BusinessId::for_location("Oak City", "Dock 4"))
        );
    }

    #[test]
    fn enrolling_twice_does_not_duplicate_members() {
        let mut memberships = Memberships::new();
        let resident = visitor("r1", CustomerType::Individual, "Elm Road 2", "Oak City");

        memberships.enroll(&resident).expect("enroll");
        memberships.enroll(&resident).expect("enroll");

        let household = memberships.households().next().expect("household");
        assert_eq!(household.residents().len(), 1);
    }

    #[test]
    fn household_ids_ignore_case_and_spaces() {
        assert_eq!(
            HouseholdId::for_location("Oak City", "Elm Road 2"),
            HouseholdId::for_location("oak city", "elmroad 2")
        );
        assert_eq!(
            HouseholdId::for_location("Oak City", "Elm Road 2").0,
            "household:oak city:elmroad2"
        );
    }

    #[test]
    fn different_addresses_get_different_pools() {
        let mut memberships = Memberships::new();
        let one = memberships
            .enroll(&visitor("r1", CustomerType::Individual, "Elm Road 2", "Oak City"))
            .expect("enroll");
        let other = memberships
            .enroll(&visitor("r2", CustomerType::Individual, "Elm Road 3", "Oak City"))
            .expect("enroll");
        assert_ne!(one, other);
        assert!(
            memberships
                .business_for_visitor(&VisitorId::from("r1"))
                .is_none()
        );
    }

    #[test]
    fn business_rejects_foreign_members() {
        let mut business = Business::new("Oak City", "Dock 4").expect("business");
        let elsewhere = visitor("e9", CustomerType::Business, "Dock 5", "Oak City");
        let private = visitor("p1", CustomerType::Individual, "Dock 4", "Oak City");

        assert!(matches!(
            business.add_employee(elsewhere),
            Err(DomainError::MemberMismatch { .. })
        ));
        assert!(business.add_employee(private).is_err());
        assert!(business.employees().is_empty());
    }

    #[test]
    fn business_without_address_cannot_be_created() {
        let mut memberships = Memberships::new();
        let homeless = visitor("e1", CustomerType::Business, "", "Oak City");
        assert_eq!(
            memberships.enroll(&homeless),
            Err(DomainError::MissingField("address"))
        );
        assert!(
            memberships
                .business_for_visitor(&VisitorId::from("e1"))
                .is_none()
        );
    }

    #[test]
    fn clear_forgets_everything() {
        let mut memberships = Memberships::new();
        memberships
            .enroll(&visitor("e1", CustomerType::Business, "Dock 4", "Oak City"))
            .expect("enroll");
        memberships.clear();
        assert_eq!(memberships.businesses().count(), 0);
        assert!(
            memberships
                .business_for_visitor(&VisitorId::from("e1"))
                .is_none()
        );
    }
}
