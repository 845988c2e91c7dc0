//! Relation lifecycle: per-relation facades, the unit-wide state tracker,
//! and the resolvers that pick the next hook.

pub mod created;
pub mod relationer;
pub mod resolver;
pub mod tracker;

pub use created::CreatedRelationResolver;
pub use relationer::Relationer;
pub use resolver::{Operation, OperationFactory, RelationResolver, Resolver};
pub use tracker::{RelationInfo, RelationStateTracker, RelationStateTrackerConfig};
