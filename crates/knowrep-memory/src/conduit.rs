//! Long-Term Memory Conduit.
//!
//! [`LongTermMemory`] owns the SQLite connection backing the knowledge store
//! and implements the entity store: allocation, existence checks and
//! cascading deletion. The attribute, taxonomy, spatial and query layers are
//! implemented as further `impl LongTermMemory` blocks in sibling modules.
//!
//! # Storage layout
//!
//! | table               | description                                              |
//! |---------------------|----------------------------------------------------------|
//! | `entities`          | `entity_id INTEGER PRIMARY KEY AUTOINCREMENT`             |
//! | `attributes`        | attribute name → registered value type                   |
//! | `entity_attributes` | one row per attribute instance, one column per value kind |
//!
//! `entity_attributes.entity_id` and `entity_attributes.id_value` both
//! reference `entities` with `ON DELETE CASCADE`, so deleting an entity drops
//! every fact about it and every fact pointing at it in the same statement.
//! `AUTOINCREMENT` guarantees identifiers are never handed out twice.
//!
//! Read-only views `entity_attributes_{int,float,bool,str,id}` expose each
//! value kind as `(entity_id, attribute_name, attribute_value)` for the raw
//! query escape hatch.
//!
//! # Example
//!
//! ```rust
//! use knowrep_memory::LongTermMemory;
//!
//! let ltm = LongTermMemory::open_in_memory().unwrap();
//! let cup = ltm.add_entity().unwrap();
//! assert!(ltm.entity_exists(cup.entity_id).unwrap());
//!
//! cup.delete().unwrap();
//! assert!(!ltm.entity_exists(cup.entity_id).unwrap());
//! ```

use std::path::Path;
use std::time::Duration;

use knowrep_types::{EntityId, KnowledgeError};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::entity::Entity;
use crate::registry;

// ─────────────────────────────────────────────────────────────────────────────
// Error plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Converts backend errors into [`KnowledgeError::Storage`].
pub(crate) trait StorageResult<T> {
    fn storage(self) -> Result<T, KnowledgeError>;
}

impl<T> StorageResult<T> for rusqlite::Result<T> {
    fn storage(self) -> Result<T, KnowledgeError> {
        self.map_err(|e| KnowledgeError::Storage(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StoreOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Connection tuning for [`LongTermMemory::open_with`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a writer waits for a competing process to release the
    /// database lock before the operation fails.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LongTermMemory
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed long-term memory of the robot.
///
/// Every mutating operation runs inside a single `IMMEDIATE` transaction, so
/// a concurrent reader never observes a half-applied write or cascade.
pub struct LongTermMemory {
    conn: Connection,
}

impl LongTermMemory {
    /// Open (or create) a persistent knowledge store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open (or create) a persistent knowledge store with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        info!("opening long-term memory at: {}", path.display());
        let conn = Connection::open(path).storage()?;
        conn.busy_timeout(options.busy_timeout).storage()?;
        let ltm = Self { conn };
        ltm.init_schema()?;
        Ok(ltm)
    }

    /// Open a temporary in-memory knowledge store (useful for testing).
    pub fn open_in_memory() -> Result<Self, KnowledgeError> {
        let conn = Connection::open_in_memory().storage()?;
        let ltm = Self { conn };
        ltm.init_schema()?;
        Ok(ltm)
    }

    fn init_schema(&self) -> Result<(), KnowledgeError> {
        self.conn
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                CREATE TABLE IF NOT EXISTS entities (
                    entity_id INTEGER PRIMARY KEY AUTOINCREMENT
                );
                CREATE TABLE IF NOT EXISTS attributes (
                    attribute_name TEXT NOT NULL PRIMARY KEY,
                    type           TEXT NOT NULL
                        CHECK (type IN ('int', 'float', 'bool', 'str', 'id'))
                );
                CREATE TABLE IF NOT EXISTS entity_attributes (
                    row_id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_id      INTEGER NOT NULL
                        REFERENCES entities(entity_id) ON DELETE CASCADE,
                    attribute_name TEXT NOT NULL
                        REFERENCES attributes(attribute_name) ON DELETE CASCADE,
                    int_value      INTEGER,
                    float_value    REAL,
                    bool_value     INTEGER,
                    str_value      TEXT,
                    id_value       INTEGER
                        REFERENCES entities(entity_id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS entity_attributes_subject
                    ON entity_attributes(entity_id, attribute_name);
                CREATE INDEX IF NOT EXISTS entity_attributes_str_lookup
                    ON entity_attributes(attribute_name, str_value);
                CREATE INDEX IF NOT EXISTS entity_attributes_id_lookup
                    ON entity_attributes(attribute_name, id_value);
                CREATE INDEX IF NOT EXISTS entity_attributes_referent
                    ON entity_attributes(id_value);
                CREATE VIEW IF NOT EXISTS entity_attributes_int AS
                    SELECT entity_id, attribute_name, int_value AS attribute_value
                    FROM entity_attributes WHERE int_value IS NOT NULL;
                CREATE VIEW IF NOT EXISTS entity_attributes_float AS
                    SELECT entity_id, attribute_name, float_value AS attribute_value
                    FROM entity_attributes WHERE float_value IS NOT NULL;
                CREATE VIEW IF NOT EXISTS entity_attributes_bool AS
                    SELECT entity_id, attribute_name, bool_value AS attribute_value
                    FROM entity_attributes WHERE bool_value IS NOT NULL;
                CREATE VIEW IF NOT EXISTS entity_attributes_str AS
                    SELECT entity_id, attribute_name, str_value AS attribute_value
                    FROM entity_attributes WHERE str_value IS NOT NULL;
                CREATE VIEW IF NOT EXISTS entity_attributes_id AS
                    SELECT entity_id, attribute_name, id_value AS attribute_value
                    FROM entity_attributes WHERE id_value IS NOT NULL;",
            )
            .storage()?;
        self.atomically(registry::seed_default_attributes)
    }

    /// Direct access to the connection for single-statement reads.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `op` inside one `IMMEDIATE` transaction, committing on success and
    /// rolling back on any error.
    pub(crate) fn atomically<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, KnowledgeError>,
    ) -> Result<T, KnowledgeError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate).storage()?;
        let out = op(&tx)?;
        tx.commit().storage()?;
        Ok(out)
    }

    // ── Entity store ─────────────────────────────────────────────────────────

    /// Allocate a fresh entity.
    pub fn add_entity(&self) -> Result<Entity<'_>, KnowledgeError> {
        let id = self.atomically(insert_entity)?;
        debug!(entity = %id, "entity added");
        Ok(Entity::new(id, self))
    }

    /// Allocate the entity `id` explicitly, e.g. when mirroring ids from
    /// another store.
    ///
    /// Returns `false` and allocates nothing when `id` is not positive or is
    /// not above every id ever handed out, since a lower id may have belonged
    /// to a deleted entity.
    pub fn add_entity_with_id(&self, id: EntityId) -> Result<bool, KnowledgeError> {
        let added = self.atomically(|conn| {
            if id.0 <= 0 || id.0 <= high_water_mark(conn)? {
                return Ok(false);
            }
            conn.execute("INSERT INTO entities (entity_id) VALUES (?1)", params![id.0])
                .storage()?;
            Ok(true)
        })?;
        if added {
            debug!(entity = %id, "entity added with explicit id");
        }
        Ok(added)
    }

    /// `true` iff `id` was allocated and has not been deleted.
    pub fn entity_exists(&self, id: EntityId) -> Result<bool, KnowledgeError> {
        entity_exists(&self.conn, id)
    }

    /// Return a handle for `id` if the entity exists.
    pub fn get_entity(&self, id: EntityId) -> Result<Option<Entity<'_>>, KnowledgeError> {
        Ok(self
            .entity_exists(id)?
            .then(|| Entity::new(id, self)))
    }

    /// Delete an entity together with every attribute it carries and every
    /// attribute referencing it.
    ///
    /// Returns `false` if the entity did not exist; deleting twice is a no-op.
    pub fn delete_entity(&self, id: EntityId) -> Result<bool, KnowledgeError> {
        let deleted = self.atomically(|conn| {
            conn.execute("DELETE FROM entities WHERE entity_id = ?1", params![id.0])
                .storage()
        })?;
        if deleted > 0 {
            debug!(entity = %id, "entity deleted");
        }
        Ok(deleted > 0)
    }

    /// Delete every entity (and, by cascade, every attribute instance).
    ///
    /// Returns the number of entities removed. The attribute registry is left
    /// untouched.
    pub fn delete_all_entities(&self) -> Result<usize, KnowledgeError> {
        let deleted = self.atomically(|conn| conn.execute("DELETE FROM entities", []).storage())?;
        info!(count = deleted, "deleted all entities");
        Ok(deleted)
    }

    /// All existing entities, in allocation order.
    pub fn get_all_entities(&self) -> Result<Vec<Entity<'_>>, KnowledgeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id FROM entities ORDER BY entity_id ASC")
            .storage()?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .storage()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .storage()?;
        Ok(ids.into_iter().map(|id| Entity::new(EntityId(id), self)).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers (usable inside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn insert_entity(conn: &Connection) -> Result<EntityId, KnowledgeError> {
    conn.execute("INSERT INTO entities DEFAULT VALUES", []).storage()?;
    Ok(EntityId(conn.last_insert_rowid()))
}

/// Largest id ever allocated, deleted or not.
fn high_water_mark(conn: &Connection) -> Result<i64, KnowledgeError> {
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'entities'",
            [],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    Ok(seq.unwrap_or(0))
}

pub(crate) fn entity_exists(conn: &Connection, id: EntityId) -> Result<bool, KnowledgeError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM entities WHERE entity_id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    Ok(found.is_some())
}

pub(crate) fn require_entity(conn: &Connection, id: EntityId) -> Result<(), KnowledgeError> {
    if entity_exists(conn, id)? {
        Ok(())
    } else {
        Err(KnowledgeError::InvalidEntity(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ltm() -> LongTermMemory {
        LongTermMemory::open_in_memory().unwrap()
    }

    #[test]
    fn add_entity_then_exists() {
        let ltm = make_ltm();
        let e = ltm.add_entity().unwrap();
        assert!(ltm.entity_exists(e.entity_id).unwrap());
        assert!(e.is_valid().unwrap());
    }

    #[test]
    fn entities_are_distinct() {
        let ltm = make_ltm();
        let a = ltm.add_entity().unwrap();
        let b = ltm.add_entity().unwrap();
        assert_ne!(a, b);
        assert_eq!(ltm.get_entity(b.entity_id).unwrap(), Some(b));
    }

    #[test]
    fn delete_entity_is_idempotent() {
        let ltm = make_ltm();
        let e = ltm.add_entity().unwrap();
        assert!(ltm.delete_entity(e.entity_id).unwrap());
        assert!(!ltm.entity_exists(e.entity_id).unwrap());
        assert!(!ltm.delete_entity(e.entity_id).unwrap());
        assert!(ltm.get_entity(e.entity_id).unwrap().is_none());
    }

    #[test]
    fn ids_are_never_reused() {
        let ltm = make_ltm();
        let first = ltm.add_entity().unwrap().entity_id;
        ltm.delete_entity(first).unwrap();
        ltm.delete_all_entities().unwrap();
        let second = ltm.add_entity().unwrap().entity_id;
        assert!(second > first);
    }

    #[test]
    fn explicit_ids_never_collide_or_reuse() {
        let ltm = make_ltm();
        let first = ltm.add_entity().unwrap().entity_id;
        assert!(!ltm.add_entity_with_id(first).unwrap());
        assert!(!ltm.add_entity_with_id(EntityId(0)).unwrap());

        let claimed = EntityId(first.0 + 10);
        assert!(ltm.add_entity_with_id(claimed).unwrap());
        assert!(ltm.entity_exists(claimed).unwrap());
        assert!(!ltm.add_entity_with_id(claimed).unwrap());

        ltm.delete_entity(claimed).unwrap();
        assert!(!ltm.add_entity_with_id(claimed).unwrap());
        assert!(!ltm.add_entity_with_id(EntityId(first.0 + 5)).unwrap());
        assert!(ltm.add_entity().unwrap().entity_id > claimed);
    }

    #[test]
    fn delete_cascades_subject_and_referencing_attributes() {
        let ltm = make_ltm();
        let table = ltm.add_entity().unwrap();
        let mug = ltm.add_entity().unwrap();
        mug.add_attribute("is_on", table.entity_id).unwrap();
        table.add_attribute("color", "white").unwrap();

        table.delete().unwrap();
        assert!(mug.get_attributes().unwrap().is_empty());
        assert!(table.get_attributes().unwrap().is_empty());
        assert!(mug.is_valid().unwrap());
    }

    #[test]
    fn delete_all_entities_twice_leaves_empty_store() {
        let ltm = make_ltm();
        ltm.add_entity().unwrap();
        ltm.add_entity().unwrap();
        assert_eq!(ltm.delete_all_entities().unwrap(), 2);
        assert!(ltm.get_all_entities().unwrap().is_empty());
        assert_eq!(ltm.delete_all_entities().unwrap(), 0);
        assert!(ltm.get_all_entities().unwrap().is_empty());
    }

    #[test]
    fn delete_all_entities_invalidates_handles() {
        let ltm = make_ltm();
        let concept = ltm.get_concept("cup").unwrap();
        let map = ltm.get_map("kitchen").unwrap();
        ltm.delete_all_entities().unwrap();
        assert!(!concept.as_entity().is_valid().unwrap());
        assert!(!map.as_entity().is_valid().unwrap());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("ltm.db");
        let id = {
            let ltm = LongTermMemory::open(&path).unwrap();
            let e = ltm.add_entity().unwrap();
            e.add_attribute("name", "charging dock").unwrap();
            e.entity_id
        };
        let ltm = LongTermMemory::open(&path).unwrap();
        assert!(ltm.entity_exists(id).unwrap());
        let attrs = ltm.get_attributes(id, Some("name")).unwrap();
        assert_eq!(attrs[0].get_string_value(), Some("charging dock"));
    }

    #[test]
    fn concurrent_connections_resolve_names_to_one_entity() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("ltm.db");
        let stores: Vec<LongTermMemory> = (0..6)
            .map(|_| LongTermMemory::open(&path).unwrap())
            .collect();

        let handles: Vec<_> = stores
            .into_iter()
            .map(|ltm| {
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        ltm.get_concept("cup").unwrap();
                        ltm.get_map("kitchen").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked");
        }

        let ltm = LongTermMemory::open(&path).unwrap();
        let cups = ltm
            .get_all_concepts()
            .unwrap()
            .into_iter()
            .filter(|c| c.get_name().unwrap().as_deref() == Some("cup"))
            .count();
        assert_eq!(cups, 1);
        assert_eq!(ltm.get_all_maps().unwrap().len(), 1);
    }

    #[test]
    fn open_with_custom_busy_timeout() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let options = StoreOptions {
            busy_timeout: Duration::from_millis(250),
        };
        let ltm = LongTermMemory::open_with(dir.path().join("ltm.db"), options).unwrap();
        assert!(ltm.add_entity().is_ok());
    }
}
