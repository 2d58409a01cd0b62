//! Search layer: planning, source connectors and execution.

pub mod catalog;
pub mod connector;
pub mod planner;
pub mod runner;

pub use catalog::{Catalog, CatalogConnector, CatalogEntry};
pub use connector::{ConnectorRegistry, SearchPage, SourceConnector};
pub use planner::{PageRequest, QuerySpec, paginate, plan, plan_intent, split_quota};
pub use runner::{SearchOutcome, SearchRunner, SourceReport};
