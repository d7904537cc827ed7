//! `knowrep-memory` – The Long-Term Knowledge Store.
//!
//! Gives the robot a persistent, typed entity–attribute graph on a local
//! SQLite substrate, with a concept/instance taxonomy and passive spatial
//! maps layered on top of the same two tables.
//!
//! # Modules
//!
//! - [`conduit`] – [`LongTermMemory`]: owns the connection, the schema and the
//!   entity store (allocation, existence, cascading deletion).
//! - [`registry`] – the attribute type registry binding each attribute name
//!   to one [`AttributeValueType`], plus the default and reserved names.
//! - [`attributes`] – the typed, multi-valued attribute store.
//! - [`taxonomy`] – [`Concept`] and [`Instance`] handles, resolved by name
//!   with get-or-create semantics.
//! - [`spatial`] – [`Map`], [`Point`], [`Pose`] and [`Region`] handles.
//! - [`query`] – lookups by attribute value and the raw `select_query_*`
//!   escape hatch.
//!
//! Handles ([`Entity`], [`Concept`], [`Map`], …) borrow the store and carry
//! only an id; every accessor reads through to storage.

pub mod attributes;
pub mod conduit;
pub mod entity;
pub mod query;
pub mod registry;
pub mod spatial;
pub mod taxonomy;

pub use conduit::{LongTermMemory, StoreOptions};
pub use entity::Entity;
pub use knowrep_types::{AttributeValue, AttributeValueType, EntityAttribute, EntityId, KnowledgeError};
pub use spatial::{Map, Point, Pose, Region};
pub use taxonomy::{Concept, Instance};
