//! Query Layer.
//!
//! Typed lookups across the entity and attribute stores, plus the raw
//! `select_query_*` escape hatch. The raw queries run arbitrary SQL against
//! the backing database and surface `rusqlite` errors unchanged; they exist
//! for inspection and migration, not as part of the typed API.
//!
//! Raw queries must yield the columns `entity_id`, `attribute_name` and
//! `attribute_value`. The per-type views make that easy:
//!
//! ```rust
//! use knowrep_memory::LongTermMemory;
//!
//! let ltm = LongTermMemory::open_in_memory().unwrap();
//! let mug = ltm.get_concept("mug").unwrap().create_instance(Some("blue mug")).unwrap();
//!
//! let mut rows = Vec::new();
//! ltm.select_query_string("SELECT * FROM entity_attributes_str", &mut rows).unwrap();
//! assert!(rows.iter().any(|r| r.entity_id == mug.entity_id));
//! ```

use knowrep_types::{AttributeValue, EntityAttribute, EntityId, KnowledgeError};
use rusqlite::{Connection, params};

use crate::attributes::{ATTRIBUTE_COLUMNS, SqlValue, row_to_attribute, value_column};
use crate::conduit::{LongTermMemory, StorageResult};
use crate::entity::Entity;

impl LongTermMemory {
    /// Every entity carrying `name` with exactly `value`, ascending by id.
    ///
    /// Values are compared by type and content; an unregistered name, or one
    /// registered with another type, simply matches nothing.
    pub fn get_entities_with_attribute_of_value(
        &self,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<Vec<Entity<'_>>, KnowledgeError> {
        let ids = entities_with_value(self.conn(), name, &value.into())?;
        Ok(ids.into_iter().map(|id| Entity::new(id, self)).collect())
    }

    /// Every attribute instance in the store, in insertion order.
    pub fn get_all_entity_attributes(&self) -> Result<Vec<EntityAttribute>, KnowledgeError> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "SELECT {ATTRIBUTE_COLUMNS}
                 FROM entity_attributes ea JOIN attributes a USING (attribute_name)
                 ORDER BY ea.row_id ASC"
            ))
            .storage()?;
        let rows = stmt.query_map([], row_to_attribute).storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    /// Run `sql` and append each row's `attribute_value` as a string.
    pub fn select_query_string(
        &self,
        sql: &str,
        result: &mut Vec<EntityAttribute>,
    ) -> rusqlite::Result<()> {
        self.select_into(sql, result, |row| {
            Ok(AttributeValue::Str(row.get("attribute_value")?))
        })
    }

    /// Run `sql` and append each row's `attribute_value` as an integer.
    pub fn select_query_int(
        &self,
        sql: &str,
        result: &mut Vec<EntityAttribute>,
    ) -> rusqlite::Result<()> {
        self.select_into(sql, result, |row| {
            Ok(AttributeValue::Int(row.get("attribute_value")?))
        })
    }

    /// Run `sql` and append each row's `attribute_value` as a float.
    pub fn select_query_float(
        &self,
        sql: &str,
        result: &mut Vec<EntityAttribute>,
    ) -> rusqlite::Result<()> {
        self.select_into(sql, result, |row| {
            Ok(AttributeValue::Float(row.get("attribute_value")?))
        })
    }

    /// Run `sql` and append each row's `attribute_value` as a boolean.
    pub fn select_query_bool(
        &self,
        sql: &str,
        result: &mut Vec<EntityAttribute>,
    ) -> rusqlite::Result<()> {
        self.select_into(sql, result, |row| {
            Ok(AttributeValue::Bool(row.get("attribute_value")?))
        })
    }

    /// Run `sql` and append each row's `attribute_value` as an entity
    /// reference.
    pub fn select_query_entity(
        &self,
        sql: &str,
        result: &mut Vec<EntityAttribute>,
    ) -> rusqlite::Result<()> {
        self.select_into(sql, result, |row| {
            Ok(AttributeValue::Id(EntityId(row.get("attribute_value")?)))
        })
    }

    /// Rows are appended only if the whole query succeeds.
    fn select_into(
        &self,
        sql: &str,
        result: &mut Vec<EntityAttribute>,
        read_value: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<AttributeValue>,
    ) -> rusqlite::Result<()> {
        let mut stmt = self.conn().prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let entity_id: i64 = row.get("entity_id")?;
            let attribute_name: String = row.get("attribute_name")?;
            fetched.push(EntityAttribute::new(
                EntityId(entity_id),
                attribute_name,
                read_value(row)?,
            ));
        }
        result.extend(fetched);
        Ok(())
    }
}

/// Ids of entities carrying `name = value`, deduplicated and ascending.
pub(crate) fn entities_with_value(
    conn: &Connection,
    name: &str,
    value: &AttributeValue,
) -> Result<Vec<EntityId>, KnowledgeError> {
    let ty = value.value_type();
    let column = value_column(ty);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT DISTINCT ea.entity_id
             FROM entity_attributes ea JOIN attributes a USING (attribute_name)
             WHERE ea.attribute_name = ?1 AND a.type = ?2 AND ea.{column} = ?3
             ORDER BY ea.entity_id ASC"
        ))
        .storage()?;
    let ids = stmt
        .query_map(params![name, ty.as_str(), SqlValue(value)], |row| {
            row.get::<_, i64>(0).map(EntityId)
        })
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    Ok(ids)
}
