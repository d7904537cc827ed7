//! Entity handle.

use std::fmt;

use knowrep_types::{AttributeValue, EntityAttribute, EntityId, KnowledgeError};

use crate::conduit::LongTermMemory;

/// A lightweight handle to an entity in a [`LongTermMemory`].
///
/// The handle does not keep the entity alive: once the entity is deleted,
/// [`Entity::is_valid`] returns `false` and writes through the handle fail
/// with [`KnowledgeError::InvalidEntity`].
#[derive(Clone, Copy)]
pub struct Entity<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Entity<'a> {
    pub(crate) fn new(entity_id: EntityId, ltm: &'a LongTermMemory) -> Self {
        Self { entity_id, ltm }
    }

    /// The store this handle reads from.
    pub fn store(&self) -> &'a LongTermMemory {
        self.ltm
    }

    /// Append an attribute instance. See [`LongTermMemory::add_attribute`].
    pub fn add_attribute(
        &self,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<(), KnowledgeError> {
        self.ltm.add_attribute(self.entity_id, name, value)
    }

    /// Remove every instance of `name` on this entity, returning how many
    /// were removed.
    pub fn remove_attribute(&self, name: &str) -> Result<usize, KnowledgeError> {
        self.ltm.remove_attribute(self.entity_id, name)
    }

    pub fn get_attributes(&self) -> Result<Vec<EntityAttribute>, KnowledgeError> {
        self.ltm.get_attributes(self.entity_id, None)
    }

    pub fn get_attributes_named(&self, name: &str) -> Result<Vec<EntityAttribute>, KnowledgeError> {
        self.ltm.get_attributes(self.entity_id, Some(name))
    }

    /// Delete this entity (cascading). Returns `false` if it was already gone.
    pub fn delete(&self) -> Result<bool, KnowledgeError> {
        self.ltm.delete_entity(self.entity_id)
    }

    pub fn is_valid(&self) -> Result<bool, KnowledgeError> {
        self.ltm.entity_exists(self.entity_id)
    }
}

impl From<Entity<'_>> for AttributeValue {
    fn from(entity: Entity<'_>) -> Self {
        AttributeValue::Id(entity.entity_id)
    }
}

impl From<&Entity<'_>> for AttributeValue {
    fn from(entity: &Entity<'_>) -> Self {
        AttributeValue::Id(entity.entity_id)
    }
}

impl PartialEq for Entity<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
    }
}

impl Eq for Entity<'_> {}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("entity_id", &self.entity_id)
            .finish()
    }
}
