//! ndy-facts
//!
//! Fact layer around the admission evaluator: the async provider / store
//! seams, tri-state fact gathering and a deterministic fixture provider.
//! The Postgres implementation lives in `ndy-db`.

mod fixture;
mod gather;
mod provider;
mod types;

pub use fixture::{
    FixtureDoc, FixtureMember, FixtureSession, FixtureTenant, FixtureToken, InMemoryFacts,
    FIXTURE_FACTS,
};
pub use gather::gather_raw_facts;
pub use provider::{FactError, FactProvider, OverrideStore};
pub use types::{ClassSession, NewOverride, OverrideRecord, TenantRole};
