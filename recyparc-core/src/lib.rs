//! Core types, ledgers, and pricing rules for the recyparc disposal fee service.

/// Visitor lookup translated into domain visitors and pooled aggregates.
pub mod directory;
/// Domain events emitted after pricing and their dispatcher.
pub mod events;
/// Business and household aggregates that pool exemption quotas.
pub mod grouping;
/// In-memory exemption and visit ledgers.
pub mod ledger;
/// Value types and entities shared by every layer.
pub mod model;
/// Bundle of collaborator ports handed to the service.
pub mod plugin;
/// Traits describing the external collaborators.
pub mod ports;
/// Ordered pricing rule engine and the default rule set.
pub mod rules;
/// Price calculation facade used by the HTTP layer.
pub mod service;

pub use directory::*;
pub use events::*;
pub use grouping::*;
pub use ledger::*;
pub use model::*;
pub use plugin::*;
pub use ports::*;
pub use rules::*;
pub use service::*;
