//! Concept/Instance Taxonomy.
//!
//! Concepts and instances are ordinary entities distinguished by attributes:
//!
//! * a **concept** carries `is_concept = true` and a `name`, and is resolved
//!   by name with get-or-create semantics;
//! * an **instance** carries exactly one `instance_of` reference to its
//!   concept and optionally a `name`;
//! * concepts form a hierarchy through `is_a` references from child to
//!   parent concept.
//!
//! An instance is born by [`Concept::create_instance`] and dies when its
//! entity is deleted; a new call always yields a new identity, even when a
//! previous instance had the same name.
//!
//! # Example
//!
//! ```rust
//! use knowrep_memory::LongTermMemory;
//!
//! let ltm = LongTermMemory::open_in_memory().unwrap();
//! let soda = ltm.get_concept("soda").unwrap();
//! let coke = soda.create_instance(Some("coke")).unwrap();
//!
//! assert_eq!(coke.get_name().unwrap().as_deref(), Some("coke"));
//! assert_eq!(soda.get_instances().unwrap(), vec![coke]);
//!
//! soda.remove_instances().unwrap();
//! assert!(soda.get_instances().unwrap().is_empty());
//! ```

use std::fmt;

use knowrep_types::{AttributeValue, EntityId, KnowledgeError};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::attributes::{insert_attribute, latest_value, replace_attribute};
use crate::conduit::{LongTermMemory, StorageResult, insert_entity, require_entity};
use crate::entity::Entity;
use crate::query::entities_with_value;
use crate::registry::{INSTANCE_OF, IS_A, IS_CONCEPT, NAME};

/// Name of the concept whose single instance represents the robot itself.
pub const ROBOT_CONCEPT: &str = "robot";

// ─────────────────────────────────────────────────────────────────────────────
// Concept
// ─────────────────────────────────────────────────────────────────────────────

/// A taxonomy node resolved by name.
#[derive(Clone, Copy)]
pub struct Concept<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Concept<'a> {
    fn new(entity_id: EntityId, ltm: &'a LongTermMemory) -> Self {
        Self { entity_id, ltm }
    }

    /// The current `name`, or `None` once it has been removed.
    pub fn get_name(&self) -> Result<Option<String>, KnowledgeError> {
        read_name(self.ltm.conn(), self.entity_id)
    }

    pub fn as_entity(&self) -> Entity<'a> {
        Entity::new(self.entity_id, self.ltm)
    }

    /// Allocate a new instance of this concept, optionally named.
    ///
    /// Fails with [`KnowledgeError::InvalidEntity`] if the concept has been
    /// deleted.
    pub fn create_instance(&self, name: Option<&str>) -> Result<Instance<'a>, KnowledgeError> {
        let id = self
            .ltm
            .atomically(|conn| create_instance(conn, self.entity_id, name))?;
        debug!(concept = %self.entity_id, instance = %id, "instance created");
        Ok(Instance::new(id, self.ltm))
    }

    /// Every entity whose `instance_of` points at this concept, ascending by id.
    pub fn get_instances(&self) -> Result<Vec<Instance<'a>>, KnowledgeError> {
        let ids = instances_of(self.ltm.conn(), self.entity_id)?;
        Ok(ids.into_iter().map(|id| Instance::new(id, self.ltm)).collect())
    }

    /// Delete every instance of this concept; the concept itself survives.
    ///
    /// Returns the number of instances deleted (zero is not an error).
    pub fn remove_instances(&self) -> Result<usize, KnowledgeError> {
        self.ltm
            .atomically(|conn| delete_instances_of(conn, self.entity_id))
    }

    /// Delete every instance of this concept and of all its descendant
    /// concepts.
    pub fn remove_instances_recursive(&self) -> Result<usize, KnowledgeError> {
        self.ltm.atomically(|conn| {
            let mut removed = delete_instances_of(conn, self.entity_id)?;
            for child in descendants(conn, self.entity_id)? {
                removed += delete_instances_of(conn, child)?;
            }
            Ok(removed)
        })
    }

    /// Drop every attribute that references this concept (instance links,
    /// `is_a` links from children, user facts). Returns the count.
    pub fn remove_references(&self) -> Result<usize, KnowledgeError> {
        self.ltm.atomically(|conn| {
            conn.execute(
                "DELETE FROM entity_attributes WHERE id_value = ?1",
                params![self.entity_id.0],
            )
            .storage()
        })
    }

    /// Record that this concept `is_a` kind of `parent`.
    pub fn add_parent(&self, parent: &Concept<'_>) -> Result<(), KnowledgeError> {
        self.ltm.add_attribute(self.entity_id, IS_A, parent.entity_id)
    }

    /// Concepts declaring `is_a` this concept. Other entities carrying an
    /// `is_a` link here are skipped.
    pub fn get_children(&self) -> Result<Vec<Concept<'a>>, KnowledgeError> {
        let conn = self.ltm.conn();
        let ids = entities_with_value(conn, IS_A, &AttributeValue::Id(self.entity_id))?;
        concept_handles(self.ltm, ids)
    }

    /// Transitive closure of [`Concept::get_children`].
    pub fn get_children_recursive(&self) -> Result<Vec<Concept<'a>>, KnowledgeError> {
        let ids = descendants(self.ltm.conn(), self.entity_id)?;
        concept_handles(self.ltm, ids)
    }
}

impl PartialEq for Concept<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
    }
}

impl fmt::Debug for Concept<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Concept")
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance
// ─────────────────────────────────────────────────────────────────────────────

/// An entity bound to a concept through `instance_of`.
#[derive(Clone, Copy)]
pub struct Instance<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Instance<'a> {
    pub(crate) fn new(entity_id: EntityId, ltm: &'a LongTermMemory) -> Self {
        Self { entity_id, ltm }
    }

    pub fn as_entity(&self) -> Entity<'a> {
        Entity::new(self.entity_id, self.ltm)
    }

    /// The most recently written `name`, if any.
    pub fn get_name(&self) -> Result<Option<String>, KnowledgeError> {
        read_name(self.ltm.conn(), self.entity_id)
    }

    /// The concept this instance belongs to, or `None` once the concept (or
    /// the instance) has been deleted.
    pub fn get_concept(&self) -> Result<Option<Concept<'a>>, KnowledgeError> {
        match latest_value(self.ltm.conn(), self.entity_id, INSTANCE_OF)? {
            Some(AttributeValue::Id(concept)) => Ok(Some(Concept::new(concept, self.ltm))),
            _ => Ok(None),
        }
    }

    /// Rebind this instance to `concept`, replacing its previous concept.
    ///
    /// Fails with [`KnowledgeError::InvalidEntity`] when either side has been
    /// deleted.
    pub fn make_instance_of(&self, concept: &Concept<'_>) -> Result<(), KnowledgeError> {
        self.ltm.atomically(|conn| {
            require_entity(conn, self.entity_id)?;
            let link = AttributeValue::Id(concept.entity_id);
            replace_attribute(conn, self.entity_id, INSTANCE_OF, &link)
        })?;
        debug!(instance = %self.entity_id, concept = %concept.entity_id, "instance rebound");
        Ok(())
    }

    /// The instance's concept followed by all of its `is_a` ancestors that
    /// are concepts.
    pub fn get_concepts_recursive(&self) -> Result<Vec<Concept<'a>>, KnowledgeError> {
        let Some(concept) = self.get_concept()? else {
            return Ok(Vec::new());
        };
        let ancestors = ancestors(self.ltm.conn(), concept.entity_id)?;
        let mut concepts = vec![concept];
        concepts.extend(concept_handles(self.ltm, ancestors)?);
        Ok(concepts)
    }

    pub fn has_concept(&self, concept: &Concept<'_>) -> Result<bool, KnowledgeError> {
        Ok(self
            .get_concept()?
            .is_some_and(|c| c.entity_id == concept.entity_id))
    }

    /// Whether `concept` is this instance's concept or one of its ancestors.
    pub fn has_concept_recursively(&self, concept: &Concept<'_>) -> Result<bool, KnowledgeError> {
        Ok(self
            .get_concepts_recursive()?
            .iter()
            .any(|c| c.entity_id == concept.entity_id))
    }

    pub fn delete(&self) -> Result<bool, KnowledgeError> {
        self.ltm.delete_entity(self.entity_id)
    }

    pub fn is_valid(&self) -> Result<bool, KnowledgeError> {
        self.ltm.entity_exists(self.entity_id)
    }
}

impl PartialEq for Instance<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
    }
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store-level taxonomy operations
// ─────────────────────────────────────────────────────────────────────────────

impl LongTermMemory {
    /// Get the concept called `name`, creating it if it does not exist.
    ///
    /// Lookup and creation happen in one transaction, so concurrent callers
    /// resolve the same name to the same entity.
    pub fn get_concept(&self, name: &str) -> Result<Concept<'_>, KnowledgeError> {
        let id = self.atomically(|conn| find_or_create_concept(conn, name))?;
        Ok(Concept::new(id, self))
    }

    /// Every concept, ascending by id.
    pub fn get_all_concepts(&self) -> Result<Vec<Concept<'_>>, KnowledgeError> {
        let ids = entities_with_value(self.conn(), IS_CONCEPT, &AttributeValue::Bool(true))?;
        Ok(ids.into_iter().map(|id| Concept::new(id, self)).collect())
    }

    /// Every entity bound to a concept, ascending by id.
    pub fn get_all_instances(&self) -> Result<Vec<Instance<'_>>, KnowledgeError> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT DISTINCT entity_id FROM entity_attributes
                 WHERE attribute_name = ?1 ORDER BY entity_id ASC",
            )
            .storage()?;
        let ids = stmt
            .query_map(params![INSTANCE_OF], |row| row.get::<_, i64>(0))
            .storage()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .storage()?;
        Ok(ids
            .into_iter()
            .map(|id| Instance::new(EntityId(id), self))
            .collect())
    }

    /// The oldest instance named `name`, if any. Never creates one.
    ///
    /// Only entities bound to a concept match; a named concept or a bare
    /// entity with a `name` is not an instance.
    pub fn get_instance_named(&self, name: &str) -> Result<Option<Instance<'_>>, KnowledgeError> {
        let id: Option<i64> = self
            .conn()
            .query_row(
                "SELECT n.entity_id FROM entity_attributes n
                 WHERE n.attribute_name = ?1 AND n.str_value = ?2
                   AND EXISTS (SELECT 1 FROM entity_attributes i
                               WHERE i.entity_id = n.entity_id AND i.attribute_name = ?3)
                 ORDER BY n.entity_id ASC LIMIT 1",
                params![NAME, name, INSTANCE_OF],
                |row| row.get(0),
            )
            .optional()
            .storage()?;
        Ok(id.map(|id| Instance::new(EntityId(id), self)))
    }

    /// The instance representing the robot this memory belongs to.
    ///
    /// Created on first use as the instance named `"robot"` of the concept
    /// [`ROBOT_CONCEPT`].
    pub fn get_robot(&self) -> Result<Instance<'_>, KnowledgeError> {
        let id = self.atomically(|conn| {
            let concept = find_or_create_concept(conn, ROBOT_CONCEPT)?;
            match instances_of(conn, concept)?.first() {
                Some(robot) => Ok(*robot),
                None => create_instance(conn, concept, Some(ROBOT_CONCEPT)),
            }
        })?;
        Ok(Instance::new(id, self))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn find_or_create_concept(conn: &Connection, name: &str) -> Result<EntityId, KnowledgeError> {
    if let Some(id) = find_concept(conn, name)? {
        return Ok(id);
    }
    let id = insert_entity(conn)?;
    insert_attribute(conn, id, NAME, &AttributeValue::Str(name.to_string()))?;
    insert_attribute(conn, id, IS_CONCEPT, &AttributeValue::Bool(true))?;
    debug!(concept = name, entity = %id, "concept created");
    Ok(id)
}

/// Lookup-only counterpart of [`find_or_create_concept`].
pub(crate) fn find_concept(conn: &Connection, name: &str) -> Result<Option<EntityId>, KnowledgeError> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT n.entity_id FROM entity_attributes n
             WHERE n.attribute_name = ?1 AND n.str_value = ?2
               AND EXISTS (SELECT 1 FROM entity_attributes c
                           WHERE c.entity_id = n.entity_id
                             AND c.attribute_name = ?3 AND c.bool_value = 1)
             ORDER BY n.entity_id ASC LIMIT 1",
            params![NAME, name, IS_CONCEPT],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    Ok(existing.map(EntityId))
}

pub(crate) fn create_instance(
    conn: &Connection,
    concept: EntityId,
    name: Option<&str>,
) -> Result<EntityId, KnowledgeError> {
    require_entity(conn, concept)?;
    let id = insert_entity(conn)?;
    insert_attribute(conn, id, INSTANCE_OF, &AttributeValue::Id(concept))?;
    if let Some(name) = name {
        insert_attribute(conn, id, NAME, &AttributeValue::Str(name.to_string()))?;
    }
    Ok(id)
}

pub(crate) fn instances_of(conn: &Connection, concept: EntityId) -> Result<Vec<EntityId>, KnowledgeError> {
    entities_with_value(conn, INSTANCE_OF, &AttributeValue::Id(concept))
}

fn delete_instances_of(conn: &Connection, concept: EntityId) -> Result<usize, KnowledgeError> {
    conn.execute(
        "DELETE FROM entities WHERE entity_id IN (
             SELECT entity_id FROM entity_attributes
             WHERE attribute_name = ?1 AND id_value = ?2)",
        params![INSTANCE_OF, concept.0],
    )
    .storage()
}

pub(crate) fn read_name(conn: &Connection, entity: EntityId) -> Result<Option<String>, KnowledgeError> {
    Ok(match latest_value(conn, entity, NAME)? {
        Some(AttributeValue::Str(name)) => Some(name),
        _ => None,
    })
}

fn is_concept(conn: &Connection, id: EntityId) -> Result<bool, KnowledgeError> {
    Ok(latest_value(conn, id, IS_CONCEPT)? == Some(AttributeValue::Bool(true)))
}

/// Handles for the entries of `ids` that are concepts, in order.
fn concept_handles(
    ltm: &LongTermMemory,
    ids: Vec<EntityId>,
) -> Result<Vec<Concept<'_>>, KnowledgeError> {
    let mut concepts = Vec::with_capacity(ids.len());
    for id in ids {
        if is_concept(ltm.conn(), id)? {
            concepts.push(Concept::new(id, ltm));
        }
    }
    Ok(concepts)
}

/// Concepts reachable by following `is_a` links downwards from `concept`.
fn descendants(conn: &Connection, concept: EntityId) -> Result<Vec<EntityId>, KnowledgeError> {
    collect_ids(
        conn,
        "WITH RECURSIVE below(id) AS (
             SELECT entity_id FROM entity_attributes
             WHERE attribute_name = ?1 AND id_value = ?2
             UNION
             SELECT ea.entity_id FROM entity_attributes ea JOIN below ON ea.id_value = below.id
             WHERE ea.attribute_name = ?1
         )
         SELECT id FROM below WHERE id != ?2 ORDER BY id ASC",
        concept,
    )
}

/// Concepts reachable by following `is_a` links upwards from `concept`.
fn ancestors(conn: &Connection, concept: EntityId) -> Result<Vec<EntityId>, KnowledgeError> {
    collect_ids(
        conn,
        "WITH RECURSIVE above(id) AS (
             SELECT id_value FROM entity_attributes
             WHERE attribute_name = ?1 AND entity_id = ?2
             UNION
             SELECT ea.id_value FROM entity_attributes ea JOIN above ON ea.entity_id = above.id
             WHERE ea.attribute_name = ?1
         )
         SELECT id FROM above WHERE id != ?2 ORDER BY id ASC",
        concept,
    )
}

fn collect_ids(conn: &Connection, sql: &str, concept: EntityId) -> Result<Vec<EntityId>, KnowledgeError> {
    let mut stmt = conn.prepare(sql).storage()?;
    let ids = stmt
        .query_map(params![IS_A, concept.0], |row| row.get::<_, i64>(0).map(EntityId))
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ltm() -> LongTermMemory {
        LongTermMemory::open_in_memory().unwrap()
    }

    #[test]
    fn get_concept_is_deterministic() {
        let ltm = make_ltm();
        let a = ltm.get_concept("never seen before").unwrap();
        let b = ltm.get_concept("never seen before").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get_name().unwrap().as_deref(), Some("never seen before"));
        assert_ne!(a, ltm.get_concept("something else").unwrap());
        assert_eq!(ltm.get_all_concepts().unwrap().len(), 2);
    }

    #[test]
    fn new_concept_has_no_instances() {
        let ltm = make_ltm();
        let concept = ltm.get_concept("never seen before").unwrap();
        assert!(concept.get_instances().unwrap().is_empty());
        assert_eq!(concept.remove_instances().unwrap(), 0);
        assert!(concept.get_instances().unwrap().is_empty());
    }

    #[test]
    fn create_instance_name_roundtrip() {
        let ltm = make_ltm();
        let concept = ltm.get_concept("never seen before").unwrap();
        let instance = concept.create_instance(Some("nsb")).unwrap();
        assert!(instance.is_valid().unwrap());
        assert_eq!(instance.get_name().unwrap().as_deref(), Some("nsb"));
        let names = instance.as_entity().get_attributes_named(NAME).unwrap();
        assert_eq!(names[0].get_string_value(), Some("nsb"));
        assert_eq!(instance.get_concept().unwrap(), Some(concept));
    }

    #[test]
    fn unnamed_instance_has_no_name() {
        let ltm = make_ltm();
        let instance = ltm.get_concept("cup").unwrap().create_instance(None).unwrap();
        assert_eq!(instance.get_name().unwrap(), None);
    }

    #[test]
    fn create_instance_on_deleted_concept_fails() {
        let ltm = make_ltm();
        let concept = ltm.get_concept("ghost").unwrap();
        concept.as_entity().delete().unwrap();
        let err = concept.create_instance(Some("boo")).unwrap_err();
        assert_eq!(err, KnowledgeError::InvalidEntity(concept.entity_id));
        assert!(ltm.get_instance_named("boo").unwrap().is_none());
    }

    #[test]
    fn remove_instances_deletes_only_instances() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let plate = ltm.get_concept("plate").unwrap();
        let c1 = cup.create_instance(Some("red cup")).unwrap();
        let c2 = cup.create_instance(None).unwrap();
        let p1 = plate.create_instance(None).unwrap();
        assert_eq!(cup.get_instances().unwrap(), vec![c1, c2]);

        assert_eq!(cup.remove_instances().unwrap(), 2);
        assert!(!c1.is_valid().unwrap());
        assert!(!c2.is_valid().unwrap());
        assert!(p1.is_valid().unwrap());
        assert!(cup.as_entity().is_valid().unwrap());
        assert!(cup.get_instances().unwrap().is_empty());
    }

    #[test]
    fn recreated_instance_gets_new_identity() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let first = cup.create_instance(Some("mine")).unwrap();
        first.delete().unwrap();
        let second = cup.create_instance(Some("mine")).unwrap();
        assert_ne!(first, second);
        assert!(!first.is_valid().unwrap());
    }

    #[test]
    fn deleting_concept_unbinds_instances() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let mine = cup.create_instance(None).unwrap();
        cup.as_entity().delete().unwrap();
        assert!(mine.is_valid().unwrap());
        assert_eq!(mine.get_concept().unwrap(), None);
        let fresh = ltm.get_concept("cup").unwrap();
        assert_ne!(fresh, cup);
    }

    #[test]
    fn hierarchy_children_and_ancestors() {
        let ltm = make_ltm();
        let food = ltm.get_concept("food").unwrap();
        let fruit = ltm.get_concept("fruit").unwrap();
        let apple = ltm.get_concept("apple").unwrap();
        fruit.add_parent(&food).unwrap();
        apple.add_parent(&fruit).unwrap();

        assert_eq!(food.get_children().unwrap(), vec![fruit]);
        assert_eq!(food.get_children_recursive().unwrap(), vec![fruit, apple]);

        let gala = apple.create_instance(Some("gala")).unwrap();
        let concepts = gala.get_concepts_recursive().unwrap();
        assert_eq!(concepts, vec![apple, food, fruit]);
        assert!(gala.has_concept(&apple).unwrap());
        assert!(!gala.has_concept(&food).unwrap());
        assert!(gala.has_concept_recursively(&food).unwrap());
    }

    #[test]
    fn concept_name_is_read_live() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let copy = cup;
        cup.as_entity().add_attribute(NAME, "mug").unwrap();
        assert_eq!(copy.get_name().unwrap().as_deref(), Some("mug"));
        cup.as_entity().remove_attribute(NAME).unwrap();
        assert_eq!(copy.get_name().unwrap(), None);
    }

    #[test]
    fn hierarchy_skips_entities_that_are_not_concepts() {
        let ltm = make_ltm();
        let fruit = ltm.get_concept("fruit").unwrap();
        let apple = ltm.get_concept("apple").unwrap();
        apple.add_parent(&fruit).unwrap();
        let stray = ltm.add_entity().unwrap();
        stray.add_attribute(IS_A, fruit.entity_id).unwrap();
        let plain = ltm.add_entity().unwrap();
        ltm.add_attribute(apple.entity_id, IS_A, plain.entity_id).unwrap();

        assert_eq!(fruit.get_children().unwrap(), vec![apple]);
        assert_eq!(fruit.get_children_recursive().unwrap(), vec![apple]);
        let gala = apple.create_instance(None).unwrap();
        assert_eq!(gala.get_concepts_recursive().unwrap(), vec![apple, fruit]);
    }

    #[test]
    fn make_instance_of_rebinds_concept() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let bowl = ltm.get_concept("bowl").unwrap();
        let thing = cup.create_instance(Some("thing")).unwrap();
        thing.make_instance_of(&bowl).unwrap();

        assert_eq!(thing.get_concept().unwrap(), Some(bowl));
        assert!(cup.get_instances().unwrap().is_empty());
        assert_eq!(bowl.get_instances().unwrap(), vec![thing]);
        let links = thing.as_entity().get_attributes_named(INSTANCE_OF).unwrap();
        assert_eq!(links.len(), 1);

        cup.as_entity().delete().unwrap();
        let err = thing.make_instance_of(&cup).unwrap_err();
        assert_eq!(err, KnowledgeError::InvalidEntity(cup.entity_id));
        assert_eq!(thing.get_concept().unwrap(), Some(bowl));
    }

    #[test]
    fn instance_named_ignores_non_instances() {
        let ltm = make_ltm();
        ltm.get_concept("mine").unwrap();
        let bare = ltm.add_entity().unwrap();
        bare.add_attribute(NAME, "mine").unwrap();
        assert_eq!(ltm.get_instance_named("mine").unwrap(), None);
        assert_eq!(ltm.get_all_instances().unwrap().len(), 0);
    }

    #[test]
    fn hierarchy_cycle_terminates() {
        let ltm = make_ltm();
        let a = ltm.get_concept("a").unwrap();
        let b = ltm.get_concept("b").unwrap();
        a.add_parent(&b).unwrap();
        b.add_parent(&a).unwrap();
        assert_eq!(a.get_children_recursive().unwrap(), vec![b]);
        let inst = a.create_instance(None).unwrap();
        assert_eq!(inst.get_concepts_recursive().unwrap(), vec![a, b]);
    }

    #[test]
    fn remove_instances_recursive_reaches_descendants() {
        let ltm = make_ltm();
        let fruit = ltm.get_concept("fruit").unwrap();
        let apple = ltm.get_concept("apple").unwrap();
        apple.add_parent(&fruit).unwrap();
        fruit.create_instance(None).unwrap();
        apple.create_instance(None).unwrap();
        apple.create_instance(None).unwrap();
        assert_eq!(fruit.remove_instances_recursive().unwrap(), 3);
        assert!(apple.get_instances().unwrap().is_empty());
    }

    #[test]
    fn remove_references_detaches_instances() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let mine = cup.create_instance(None).unwrap();
        assert_eq!(cup.remove_references().unwrap(), 1);
        assert!(cup.get_instances().unwrap().is_empty());
        assert!(mine.is_valid().unwrap());
    }

    #[test]
    fn instance_lookup_and_listing() {
        let ltm = make_ltm();
        let cup = ltm.get_concept("cup").unwrap();
        let mine = cup.create_instance(Some("mine")).unwrap();
        cup.create_instance(None).unwrap();
        assert_eq!(ltm.get_instance_named("mine").unwrap(), Some(mine));
        assert_eq!(ltm.get_instance_named("cup").unwrap(), None);
        assert_eq!(ltm.get_all_instances().unwrap().len(), 2);
    }

    #[test]
    fn robot_is_created_once() {
        let ltm = make_ltm();
        let robot = ltm.get_robot().unwrap();
        assert_eq!(ltm.get_robot().unwrap(), robot);
        assert_eq!(robot.get_name().unwrap().as_deref(), Some("robot"));
        let concept = ltm.get_concept(ROBOT_CONCEPT).unwrap();
        assert!(robot.has_concept(&concept).unwrap());
    }

    #[test]
    fn reset_makes_concepts_resolve_afresh() {
        let ltm = make_ltm();
        let before = ltm.get_concept("cup").unwrap();
        ltm.delete_all_attributes().unwrap();
        assert!(ltm.get_all_concepts().unwrap().is_empty());
        ltm.delete_all_entities().unwrap();
        let after = ltm.get_concept("cup").unwrap();
        assert_ne!(before, after);
        assert!(after.get_instances().unwrap().is_empty());
    }
}
