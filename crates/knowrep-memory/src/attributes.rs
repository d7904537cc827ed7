//! Attribute Store.
//!
//! Typed, multi-valued `(entity, name, value)` facts. Writes are validated
//! against the [registry](crate::registry): the first write of an unknown
//! name registers it under the value's type, later writes must match that
//! type exactly. Nothing is ever coerced.
//!
//! Each row of `entity_attributes` fills exactly one of the value columns
//! `int_value`, `float_value`, `bool_value`, `str_value` or `id_value`,
//! selected by the attribute's registered type. Reads return rows in
//! insertion order.

use knowrep_types::{AttributeValue, AttributeValueType, EntityAttribute, EntityId, KnowledgeError};
use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use tracing::{debug, info, warn};

use crate::conduit::{LongTermMemory, StorageResult, require_entity};
use crate::registry::{self, type_column};

/// Columns selected by [`row_to_attribute`], over
/// `entity_attributes ea JOIN attributes a USING (attribute_name)`.
pub(crate) const ATTRIBUTE_COLUMNS: &str = "ea.entity_id, ea.attribute_name, a.type, \
     ea.int_value, ea.float_value, ea.bool_value, ea.str_value, ea.id_value";

impl LongTermMemory {
    /// Append `value` under `name` to `entity`.
    ///
    /// Fails with [`KnowledgeError::InvalidEntity`] when the subject (or the
    /// target of an entity reference) does not exist,
    /// [`KnowledgeError::TypeMismatch`] when `name` is registered with
    /// another type, [`KnowledgeError::InvalidValue`] for NaN or infinite
    /// floats, and [`KnowledgeError::ReservedAttribute`] for structural
    /// names.
    pub fn add_attribute(
        &self,
        entity: EntityId,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<(), KnowledgeError> {
        if registry::is_reserved(name) {
            warn!(attribute = name, "rejected write to reserved attribute");
            return Err(KnowledgeError::ReservedAttribute(name.to_string()));
        }
        let value = value.into();
        self.atomically(|conn| insert_attribute(conn, entity, name, &value))
            .inspect_err(|e| {
                warn!(
                    entity = %entity,
                    attribute = name,
                    error = %e,
                    "attribute write rejected"
                )
            })
    }

    /// All attribute instances of `entity`, optionally restricted to `name`,
    /// in insertion order. A deleted entity has no attributes.
    pub fn get_attributes(
        &self,
        entity: EntityId,
        name: Option<&str>,
    ) -> Result<Vec<EntityAttribute>, KnowledgeError> {
        let conn = self.conn();
        let rows = match name {
            Some(name) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {ATTRIBUTE_COLUMNS}
                         FROM entity_attributes ea JOIN attributes a USING (attribute_name)
                         WHERE ea.entity_id = ?1 AND ea.attribute_name = ?2
                         ORDER BY ea.row_id ASC"
                    ))
                    .storage()?;
                let rows = stmt
                    .query_map(params![entity.0, name], row_to_attribute)
                    .storage()?
                    .collect::<rusqlite::Result<Vec<_>>>();
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {ATTRIBUTE_COLUMNS}
                         FROM entity_attributes ea JOIN attributes a USING (attribute_name)
                         WHERE ea.entity_id = ?1
                         ORDER BY ea.row_id ASC"
                    ))
                    .storage()?;
                let rows = stmt
                    .query_map(params![entity.0], row_to_attribute)
                    .storage()?
                    .collect::<rusqlite::Result<Vec<_>>>();
                rows
            }
        };
        rows.storage()
    }

    /// Remove every instance of `name` from `entity`; returns the count.
    pub fn remove_attribute(&self, entity: EntityId, name: &str) -> Result<usize, KnowledgeError> {
        if registry::is_reserved(name) {
            return Err(KnowledgeError::ReservedAttribute(name.to_string()));
        }
        self.atomically(|conn| {
            conn.execute(
                "DELETE FROM entity_attributes WHERE entity_id = ?1 AND attribute_name = ?2",
                params![entity.0, name],
            )
            .storage()
        })
    }

    /// Remove the instances of `name` on `entity` whose value equals `value`.
    pub fn remove_attribute_of_value(
        &self,
        entity: EntityId,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<usize, KnowledgeError> {
        if registry::is_reserved(name) {
            return Err(KnowledgeError::ReservedAttribute(name.to_string()));
        }
        let value = value.into();
        let column = value_column(value.value_type());
        self.atomically(|conn| {
            conn.execute(
                &format!(
                    "DELETE FROM entity_attributes
                     WHERE entity_id = ?1 AND attribute_name = ?2 AND {column} = ?3"
                ),
                params![entity.0, name, SqlValue(&value)],
            )
            .storage()
        })
    }

    /// Clear every attribute instance and every user-declared attribute
    /// definition, then re-seed the default definitions.
    ///
    /// Entities survive. Returns the number of attribute instances removed.
    pub fn delete_all_attributes(&self) -> Result<usize, KnowledgeError> {
        let removed = self.atomically(|conn| {
            let removed = conn.execute("DELETE FROM entity_attributes", []).storage()?;
            conn.execute("DELETE FROM attributes", []).storage()?;
            registry::seed_default_attributes(conn)?;
            Ok(removed)
        })?;
        info!(count = removed, "deleted all attributes");
        Ok(removed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value ↔ column mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Binds an [`AttributeValue`] as a statement parameter.
pub(crate) struct SqlValue<'a>(pub &'a AttributeValue);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            AttributeValue::Int(v) => ToSqlOutput::from(*v),
            AttributeValue::Float(v) => ToSqlOutput::from(*v),
            AttributeValue::Bool(v) => ToSqlOutput::from(*v),
            AttributeValue::Str(v) => ToSqlOutput::from(v.as_str()),
            AttributeValue::Id(v) => ToSqlOutput::from(v.0),
        })
    }
}

/// The `entity_attributes` column holding values of type `ty`.
pub(crate) fn value_column(ty: AttributeValueType) -> &'static str {
    match ty {
        AttributeValueType::Int => "int_value",
        AttributeValueType::Float => "float_value",
        AttributeValueType::Bool => "bool_value",
        AttributeValueType::Str => "str_value",
        AttributeValueType::Id => "id_value",
    }
}

pub(crate) fn row_to_attribute(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityAttribute> {
    let entity_id: i64 = row.get(0)?;
    let attribute_name: String = row.get(1)?;
    let value = match type_column(row, 2)? {
        AttributeValueType::Int => AttributeValue::Int(row.get(3)?),
        AttributeValueType::Float => AttributeValue::Float(row.get(4)?),
        AttributeValueType::Bool => AttributeValue::Bool(row.get(5)?),
        AttributeValueType::Str => AttributeValue::Str(row.get(6)?),
        AttributeValueType::Id => AttributeValue::Id(EntityId(row.get(7)?)),
    };
    Ok(EntityAttribute {
        entity_id: EntityId(entity_id),
        attribute_name,
        value,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Validate and append one attribute instance. Skips the reserved-name check
/// so the taxonomy and spatial layers can write structural links.
pub(crate) fn insert_attribute(
    conn: &Connection,
    entity: EntityId,
    name: &str,
    value: &AttributeValue,
) -> Result<(), KnowledgeError> {
    require_entity(conn, entity)?;
    match value {
        AttributeValue::Float(v) if !v.is_finite() => {
            // SQLite binds NaN as NULL, which no typed read can decode.
            return Err(KnowledgeError::InvalidValue {
                attribute: name.to_string(),
                reason: format!("{v} is not a finite float"),
            });
        }
        AttributeValue::Id(target) => require_entity(conn, *target)?,
        _ => {}
    }
    let found = value.value_type();
    match registry::attribute_type(conn, name)? {
        Some(expected) if expected != found => {
            return Err(KnowledgeError::TypeMismatch {
                attribute: name.to_string(),
                expected,
                found,
            });
        }
        Some(_) => {}
        None => {
            registry::register(conn, name, found)?;
        }
    }
    let column = value_column(found);
    conn.execute(
        &format!(
            "INSERT INTO entity_attributes (entity_id, attribute_name, {column})
             VALUES (?1, ?2, ?3)"
        ),
        params![entity.0, name, SqlValue(value)],
    )
    .storage()?;
    debug!(entity = %entity, attribute = name, value = %value, "attribute added");
    Ok(())
}

/// The most recently written value of `name` on `entity`.
pub(crate) fn latest_value(
    conn: &Connection,
    entity: EntityId,
    name: &str,
) -> Result<Option<AttributeValue>, KnowledgeError> {
    conn.query_row(
        &format!(
            "SELECT {ATTRIBUTE_COLUMNS}
             FROM entity_attributes ea JOIN attributes a USING (attribute_name)
             WHERE ea.entity_id = ?1 AND ea.attribute_name = ?2
             ORDER BY ea.row_id DESC LIMIT 1"
        ),
        params![entity.0, name],
        row_to_attribute,
    )
    .optional()
    .map(|attr| attr.map(|a| a.value))
    .storage()
}

/// Replace every instance of `name` on `entity` with a single `value`.
pub(crate) fn replace_attribute(
    conn: &Connection,
    entity: EntityId,
    name: &str,
    value: &AttributeValue,
) -> Result<(), KnowledgeError> {
    conn.execute(
        "DELETE FROM entity_attributes WHERE entity_id = ?1 AND attribute_name = ?2",
        params![entity.0, name],
    )
    .storage()?;
    insert_attribute(conn, entity, name, value)
}
