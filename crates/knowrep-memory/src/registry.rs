//! Attribute Type Registry.
//!
//! Binds every attribute name to exactly one [`AttributeValueType`]. The
//! binding is immutable: redeclaring a name under a different type is
//! rejected with [`KnowledgeError::DuplicateTypeConflict`].
//!
//! The registry is seeded with the attributes the taxonomy and spatial layers
//! rely on. Of those, [`IS_CONCEPT`], [`INSTANCE_OF`] and [`IN_MAP`] are
//! *reserved*: they encode structure and can only be written through
//! [`Concept`](crate::Concept) and [`Map`](crate::Map), never through
//! [`LongTermMemory::add_attribute`].

use knowrep_types::{AttributeValueType, KnowledgeError};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::conduit::{LongTermMemory, StorageResult};

/// Human-readable name of concepts, instances, maps and their contents.
pub const NAME: &str = "name";
/// Marks an entity as a taxonomy node.
pub const IS_CONCEPT: &str = "is_concept";
/// Links an instance to its concept.
pub const INSTANCE_OF: &str = "instance_of";
/// Links a concept to a parent concept.
pub const IS_A: &str = "is_a";
/// Links a point or pose to the map that owns it.
pub const IN_MAP: &str = "in_map";
pub const X: &str = "x";
pub const Y: &str = "y";
/// Orientation of a pose in radians.
pub const THETA: &str = "theta";
/// Region outline, one row per vertex; the n-th `vertex_x` pairs with the
/// n-th `vertex_y`.
pub const VERTEX_X: &str = "vertex_x";
pub const VERTEX_Y: &str = "vertex_y";

/// Attribute definitions present in every store, including after
/// [`LongTermMemory::delete_all_attributes`].
pub const DEFAULT_ATTRIBUTES: [(&str, AttributeValueType); 10] = [
    (NAME, AttributeValueType::Str),
    (IS_CONCEPT, AttributeValueType::Bool),
    (INSTANCE_OF, AttributeValueType::Id),
    (IS_A, AttributeValueType::Id),
    (IN_MAP, AttributeValueType::Id),
    (X, AttributeValueType::Float),
    (Y, AttributeValueType::Float),
    (THETA, AttributeValueType::Float),
    (VERTEX_X, AttributeValueType::Float),
    (VERTEX_Y, AttributeValueType::Float),
];

/// Structural attributes callers may not write or remove directly.
pub const RESERVED_ATTRIBUTES: [&str; 3] = [IS_CONCEPT, INSTANCE_OF, IN_MAP];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name)
}

pub fn is_default(name: &str) -> bool {
    DEFAULT_ATTRIBUTES.iter().any(|(n, _)| *n == name)
}

impl LongTermMemory {
    /// Register `name` with value type `ty`.
    ///
    /// Returns `true` if the name was newly registered and `false` if it was
    /// already registered with the same type.
    pub fn add_new_attribute(
        &self,
        name: &str,
        ty: AttributeValueType,
    ) -> Result<bool, KnowledgeError> {
        self.atomically(|conn| register(conn, name, ty))
    }

    pub fn attribute_exists(&self, name: &str) -> Result<bool, KnowledgeError> {
        Ok(attribute_type(self.conn(), name)?.is_some())
    }

    /// The type `name` is registered with, if any.
    pub fn attribute_type(&self, name: &str) -> Result<Option<AttributeValueType>, KnowledgeError> {
        attribute_type(self.conn(), name)
    }

    /// Every registered attribute with its type, ordered by name.
    pub fn get_all_attributes(&self) -> Result<Vec<(String, AttributeValueType)>, KnowledgeError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT attribute_name, type FROM attributes ORDER BY attribute_name ASC")
            .storage()?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let ty = type_column(row, 1)?;
                Ok((name, ty))
            })
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    /// Drop an attribute definition together with all of its instances.
    ///
    /// Default attributes cannot be deleted. Returns `false` if `name` was not
    /// registered.
    pub fn delete_attribute(&self, name: &str) -> Result<bool, KnowledgeError> {
        if is_default(name) {
            warn!(attribute = name, "refusing to delete default attribute");
            return Err(KnowledgeError::ReservedAttribute(name.to_string()));
        }
        let deleted = self.atomically(|conn| {
            conn.execute(
                "DELETE FROM attributes WHERE attribute_name = ?1",
                params![name],
            )
            .storage()
        })?;
        Ok(deleted > 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn attribute_type(
    conn: &Connection,
    name: &str,
) -> Result<Option<AttributeValueType>, KnowledgeError> {
    conn.query_row(
        "SELECT type FROM attributes WHERE attribute_name = ?1",
        params![name],
        |row| type_column(row, 0),
    )
    .optional()
    .storage()
}

pub(crate) fn register(
    conn: &Connection,
    name: &str,
    ty: AttributeValueType,
) -> Result<bool, KnowledgeError> {
    match attribute_type(conn, name)? {
        Some(registered) if registered == ty => Ok(false),
        Some(registered) => {
            warn!(attribute = name, %registered, requested = %ty, "attribute type conflict");
            Err(KnowledgeError::DuplicateTypeConflict {
                attribute: name.to_string(),
                registered,
                requested: ty,
            })
        }
        None => {
            conn.execute(
                "INSERT INTO attributes (attribute_name, type) VALUES (?1, ?2)",
                params![name, ty.as_str()],
            )
            .storage()?;
            debug!(attribute = name, ty = %ty, "attribute registered");
            Ok(true)
        }
    }
}

pub(crate) fn seed_default_attributes(conn: &Connection) -> Result<(), KnowledgeError> {
    for (name, ty) in DEFAULT_ATTRIBUTES {
        conn.execute(
            "INSERT OR IGNORE INTO attributes (attribute_name, type) VALUES (?1, ?2)",
            params![name, ty.as_str()],
        )
        .storage()?;
    }
    Ok(())
}

pub(crate) fn type_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<AttributeValueType> {
    let raw: String = row.get(idx)?;
    AttributeValueType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(idx, raw, rusqlite::types::Type::Text)
    })
}
