//! Spatial Map Model.
//!
//! Maps are passive, named containers of labelled positions and areas. Each
//! map is an instance of the concept `"map"`; each point, pose or region is
//! an instance of `"point"` / `"pose"` / `"region"` linked to its map through
//! the structural `in_map` attribute:
//!
//! | kind   | attributes                                         |
//! |--------|----------------------------------------------------|
//! | map    | `instance_of`, `name`                              |
//! | point  | `instance_of`, `name`, `in_map`, `x`, `y`          |
//! | pose   | `instance_of`, `name`, `in_map`, `x`, `y`, `theta` |
//! | region | `instance_of`, `name`, `in_map`, `vertex_x`…, `vertex_y`… |
//!
//! A region's outline is stored as one `vertex_x` and one `vertex_y` row per
//! vertex, in order. Containment uses the even-odd rule, and a position on
//! the outline counts as inside.
//!
//! Map names are unique. Point, pose and region names are not: adding a
//! second point called `"door"` creates a second entity, and lookups by name
//! return the most recently added one.
//!
//! Accessors read the latest stored value on every call, so a coordinate
//! updated through [`Entity::add_attribute`] is visible immediately.
//!
//! # Example
//!
//! ```rust
//! use knowrep_memory::LongTermMemory;
//!
//! let ltm = LongTermMemory::open_in_memory().unwrap();
//! let kitchen = ltm.get_map("kitchen").unwrap();
//! let sink = kitchen.add_pose("sink", 1.0, 2.0, 1.5).unwrap();
//!
//! assert_eq!(sink.x().unwrap(), 1.0);
//! assert_eq!(sink.theta().unwrap(), 1.5);
//! assert_eq!(kitchen.get_pose("sink").unwrap(), Some(sink));
//! ```

use std::fmt;

use knowrep_types::{AttributeValue, EntityId, KnowledgeError};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::attributes::{insert_attribute, latest_value, replace_attribute};
use crate::conduit::{LongTermMemory, StorageResult, require_entity};
use crate::entity::Entity;
use crate::registry::{IN_MAP, INSTANCE_OF, NAME, THETA, VERTEX_X, VERTEX_Y, X, Y};
use crate::taxonomy::{create_instance, find_concept, find_or_create_concept, instances_of, read_name};

pub const MAP_CONCEPT: &str = "map";
pub const POINT_CONCEPT: &str = "point";
pub const POSE_CONCEPT: &str = "pose";
pub const REGION_CONCEPT: &str = "region";

// ─────────────────────────────────────────────────────────────────────────────
// Map
// ─────────────────────────────────────────────────────────────────────────────

/// A named coordinate frame owning points, poses and regions.
#[derive(Clone, Copy)]
pub struct Map<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Map<'a> {
    pub fn as_entity(&self) -> Entity<'a> {
        Entity::new(self.entity_id, self.ltm)
    }

    pub fn get_name(&self) -> Result<Option<String>, KnowledgeError> {
        read_name(self.ltm.conn(), self.entity_id)
    }

    /// Add a labelled 2D position to this map.
    pub fn add_point(&self, name: &str, x: f64, y: f64) -> Result<Point<'a>, KnowledgeError> {
        let id = self.ltm.atomically(|conn| {
            let point = add_located(conn, self.entity_id, POINT_CONCEPT, name)?;
            insert_attribute(conn, point, X, &AttributeValue::Float(x))?;
            insert_attribute(conn, point, Y, &AttributeValue::Float(y))?;
            Ok(point)
        })?;
        debug!(map = %self.entity_id, point = %id, label = name, x, y, "point added");
        Ok(Point {
            entity_id: id,
            ltm: self.ltm,
        })
    }

    /// Add a labelled oriented position to this map. `theta` is stored as
    /// given, in radians, without normalisation.
    pub fn add_pose(
        &self,
        name: &str,
        x: f64,
        y: f64,
        theta: f64,
    ) -> Result<Pose<'a>, KnowledgeError> {
        let id = self.ltm.atomically(|conn| {
            let pose = add_located(conn, self.entity_id, POSE_CONCEPT, name)?;
            insert_attribute(conn, pose, X, &AttributeValue::Float(x))?;
            insert_attribute(conn, pose, Y, &AttributeValue::Float(y))?;
            insert_attribute(conn, pose, THETA, &AttributeValue::Float(theta))?;
            Ok(pose)
        })?;
        debug!(map = %self.entity_id, pose = %id, label = name, x, y, theta, "pose added");
        Ok(Pose {
            entity_id: id,
            ltm: self.ltm,
        })
    }

    /// Add a named polygon to this map, outlined by `vertices` in order.
    ///
    /// Fails with [`KnowledgeError::InvalidValue`] for fewer than three
    /// vertices or a non-finite coordinate.
    pub fn add_region(
        &self,
        name: &str,
        vertices: &[(f64, f64)],
    ) -> Result<Region<'a>, KnowledgeError> {
        if vertices.len() < 3 {
            return Err(KnowledgeError::InvalidValue {
                attribute: VERTEX_X.to_string(),
                reason: format!("a region needs at least 3 vertices, got {}", vertices.len()),
            });
        }
        let id = self.ltm.atomically(|conn| {
            let region = add_located(conn, self.entity_id, REGION_CONCEPT, name)?;
            for &(x, y) in vertices {
                insert_attribute(conn, region, VERTEX_X, &AttributeValue::Float(x))?;
                insert_attribute(conn, region, VERTEX_Y, &AttributeValue::Float(y))?;
            }
            Ok(region)
        })?;
        debug!(
            map = %self.entity_id,
            region = %id,
            label = name,
            vertices = vertices.len(),
            "region added"
        );
        Ok(Region {
            entity_id: id,
            ltm: self.ltm,
        })
    }

    /// The most recently added point called `name`.
    pub fn get_point(&self, name: &str) -> Result<Option<Point<'a>>, KnowledgeError> {
        let id = located_named(self.ltm.conn(), self.entity_id, POINT_CONCEPT, name)?;
        Ok(id.map(|entity_id| Point {
            entity_id,
            ltm: self.ltm,
        }))
    }

    /// The most recently added pose called `name`.
    pub fn get_pose(&self, name: &str) -> Result<Option<Pose<'a>>, KnowledgeError> {
        let id = located_named(self.ltm.conn(), self.entity_id, POSE_CONCEPT, name)?;
        Ok(id.map(|entity_id| Pose {
            entity_id,
            ltm: self.ltm,
        }))
    }

    pub fn get_all_points(&self) -> Result<Vec<Point<'a>>, KnowledgeError> {
        let ids = located_in(self.ltm.conn(), self.entity_id, POINT_CONCEPT)?;
        Ok(ids
            .into_iter()
            .map(|entity_id| Point {
                entity_id,
                ltm: self.ltm,
            })
            .collect())
    }

    pub fn get_all_poses(&self) -> Result<Vec<Pose<'a>>, KnowledgeError> {
        let ids = located_in(self.ltm.conn(), self.entity_id, POSE_CONCEPT)?;
        Ok(ids
            .into_iter()
            .map(|entity_id| Pose {
                entity_id,
                ltm: self.ltm,
            })
            .collect())
    }

    /// The most recently added region called `name`.
    pub fn get_region(&self, name: &str) -> Result<Option<Region<'a>>, KnowledgeError> {
        let id = located_named(self.ltm.conn(), self.entity_id, REGION_CONCEPT, name)?;
        Ok(id.map(|entity_id| Region {
            entity_id,
            ltm: self.ltm,
        }))
    }

    pub fn get_all_regions(&self) -> Result<Vec<Region<'a>>, KnowledgeError> {
        let ids = located_in(self.ltm.conn(), self.entity_id, REGION_CONCEPT)?;
        Ok(ids
            .into_iter()
            .map(|entity_id| Region {
                entity_id,
                ltm: self.ltm,
            })
            .collect())
    }

    /// Rename this map.
    ///
    /// Returns `false` without changing anything if another map already uses
    /// `new_name`.
    pub fn rename(&self, new_name: &str) -> Result<bool, KnowledgeError> {
        self.ltm.atomically(|conn| {
            require_entity(conn, self.entity_id)?;
            if let Some(other) = find_map(conn, new_name)? {
                return Ok(other == self.entity_id);
            }
            replace_attribute(conn, self.entity_id, NAME, &AttributeValue::Str(new_name.to_string()))?;
            Ok(true)
        })
    }

    /// Delete the map together with every point, pose and region it owns.
    ///
    /// Returns `false` if the map was already gone.
    pub fn delete(&self) -> Result<bool, KnowledgeError> {
        let (children, deleted) = self.ltm.atomically(|conn| {
            let children = conn
                .execute(
                    "DELETE FROM entities WHERE entity_id IN (
                         SELECT entity_id FROM entity_attributes
                         WHERE attribute_name = ?1 AND id_value = ?2)",
                    params![IN_MAP, self.entity_id.0],
                )
                .storage()?;
            let deleted = conn
                .execute(
                    "DELETE FROM entities WHERE entity_id = ?1",
                    params![self.entity_id.0],
                )
                .storage()?;
            Ok((children, deleted))
        })?;
        if deleted > 0 {
            info!(map = %self.entity_id, children, "map deleted");
        }
        Ok(deleted > 0)
    }
}

impl PartialEq for Map<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
    }
}

impl fmt::Debug for Map<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Point / Pose
// ─────────────────────────────────────────────────────────────────────────────

/// A labelled 2D position inside a [`Map`].
#[derive(Clone, Copy)]
pub struct Point<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Point<'a> {
    pub fn as_entity(&self) -> Entity<'a> {
        Entity::new(self.entity_id, self.ltm)
    }

    pub fn get_name(&self) -> Result<Option<String>, KnowledgeError> {
        read_name(self.ltm.conn(), self.entity_id)
    }

    pub fn x(&self) -> Result<f64, KnowledgeError> {
        coordinate(self.ltm.conn(), self.entity_id, X)
    }

    pub fn y(&self) -> Result<f64, KnowledgeError> {
        coordinate(self.ltm.conn(), self.entity_id, Y)
    }

    pub fn get_map(&self) -> Result<Option<Map<'a>>, KnowledgeError> {
        owning_map(self.ltm, self.entity_id)
    }

    /// Regions of the owning map whose outline encloses this point.
    pub fn get_containing_regions(&self) -> Result<Vec<Region<'a>>, KnowledgeError> {
        containing_regions(self.ltm, self.entity_id)
    }
}

/// A labelled oriented position inside a [`Map`].
#[derive(Clone, Copy)]
pub struct Pose<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Pose<'a> {
    pub fn as_entity(&self) -> Entity<'a> {
        Entity::new(self.entity_id, self.ltm)
    }

    pub fn get_name(&self) -> Result<Option<String>, KnowledgeError> {
        read_name(self.ltm.conn(), self.entity_id)
    }

    pub fn x(&self) -> Result<f64, KnowledgeError> {
        coordinate(self.ltm.conn(), self.entity_id, X)
    }

    pub fn y(&self) -> Result<f64, KnowledgeError> {
        coordinate(self.ltm.conn(), self.entity_id, Y)
    }

    /// Orientation in radians.
    pub fn theta(&self) -> Result<f64, KnowledgeError> {
        coordinate(self.ltm.conn(), self.entity_id, THETA)
    }

    pub fn get_map(&self) -> Result<Option<Map<'a>>, KnowledgeError> {
        owning_map(self.ltm, self.entity_id)
    }

    /// Regions of the owning map whose outline encloses this pose's position.
    pub fn get_containing_regions(&self) -> Result<Vec<Region<'a>>, KnowledgeError> {
        containing_regions(self.ltm, self.entity_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Region
// ─────────────────────────────────────────────────────────────────────────────

/// A named polygon inside a [`Map`].
#[derive(Clone, Copy)]
pub struct Region<'a> {
    pub entity_id: EntityId,
    ltm: &'a LongTermMemory,
}

impl<'a> Region<'a> {
    pub fn as_entity(&self) -> Entity<'a> {
        Entity::new(self.entity_id, self.ltm)
    }

    pub fn get_name(&self) -> Result<Option<String>, KnowledgeError> {
        read_name(self.ltm.conn(), self.entity_id)
    }

    pub fn get_map(&self) -> Result<Option<Map<'a>>, KnowledgeError> {
        owning_map(self.ltm, self.entity_id)
    }

    /// The outline in insertion order.
    ///
    /// Fails with [`KnowledgeError::MissingAttribute`] when the `vertex_x`
    /// and `vertex_y` rows no longer pair up.
    pub fn get_vertices(&self) -> Result<Vec<(f64, f64)>, KnowledgeError> {
        vertices(self.ltm, self.entity_id)
    }

    /// Whether `(x, y)` lies inside or on the outline.
    pub fn contains(&self, x: f64, y: f64) -> Result<bool, KnowledgeError> {
        Ok(polygon_contains(&self.get_vertices()?, x, y))
    }

    /// Points of the owning map that lie inside this region.
    pub fn get_contained_points(&self) -> Result<Vec<Point<'a>>, KnowledgeError> {
        let Some(map) = self.get_map()? else {
            return Ok(Vec::new());
        };
        let outline = self.get_vertices()?;
        let mut inside = Vec::new();
        for point in map.get_all_points()? {
            if let Some((x, y)) = position(self.ltm.conn(), point.entity_id)?
                && polygon_contains(&outline, x, y)
            {
                inside.push(point);
            }
        }
        Ok(inside)
    }

    /// Poses of the owning map whose position lies inside this region.
    pub fn get_contained_poses(&self) -> Result<Vec<Pose<'a>>, KnowledgeError> {
        let Some(map) = self.get_map()? else {
            return Ok(Vec::new());
        };
        let outline = self.get_vertices()?;
        let mut inside = Vec::new();
        for pose in map.get_all_poses()? {
            if let Some((x, y)) = position(self.ltm.conn(), pose.entity_id)?
                && polygon_contains(&outline, x, y)
            {
                inside.push(pose);
            }
        }
        Ok(inside)
    }
}

macro_rules! impl_handle_identity {
    ($($ty:ident),*) => {$(
        impl PartialEq for $ty<'_> {
            fn eq(&self, other: &Self) -> bool {
                self.entity_id == other.entity_id
            }
        }

        impl fmt::Debug for $ty<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("entity_id", &self.entity_id)
                    .finish()
            }
        }
    )*};
}

impl_handle_identity!(Point, Pose, Region);

// ─────────────────────────────────────────────────────────────────────────────
// Store-level map operations
// ─────────────────────────────────────────────────────────────────────────────

impl LongTermMemory {
    /// Get the map called `name`, creating it if it does not exist.
    pub fn get_map(&self, name: &str) -> Result<Map<'_>, KnowledgeError> {
        let id = self.atomically(|conn| {
            if let Some(existing) = find_map(conn, name)? {
                return Ok(existing);
            }
            let concept = find_or_create_concept(conn, MAP_CONCEPT)?;
            create_instance(conn, concept, Some(name))
        })?;
        Ok(Map {
            entity_id: id,
            ltm: self,
        })
    }

    /// Every map, ascending by id.
    pub fn get_all_maps(&self) -> Result<Vec<Map<'_>>, KnowledgeError> {
        let Some(concept) = find_concept(self.conn(), MAP_CONCEPT)? else {
            return Ok(Vec::new());
        };
        let ids = instances_of(self.conn(), concept)?;
        Ok(ids
            .into_iter()
            .map(|entity_id| Map {
                entity_id,
                ltm: self,
            })
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers
// ─────────────────────────────────────────────────────────────────────────────

fn find_map(conn: &Connection, name: &str) -> Result<Option<EntityId>, KnowledgeError> {
    let Some(concept) = find_concept(conn, MAP_CONCEPT)? else {
        return Ok(None);
    };
    let id: Option<i64> = conn
        .query_row(
            "SELECT n.entity_id FROM entity_attributes n
             JOIN entity_attributes i
               ON i.entity_id = n.entity_id AND i.attribute_name = ?1 AND i.id_value = ?2
             WHERE n.attribute_name = ?3 AND n.str_value = ?4
             ORDER BY n.entity_id ASC LIMIT 1",
            params![INSTANCE_OF, concept.0, NAME, name],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    Ok(id.map(EntityId))
}

/// Create a named instance of `kind` placed in `map`.
fn add_located(
    conn: &Connection,
    map: EntityId,
    kind: &str,
    name: &str,
) -> Result<EntityId, KnowledgeError> {
    require_entity(conn, map)?;
    let concept = find_or_create_concept(conn, kind)?;
    let id = create_instance(conn, concept, Some(name))?;
    insert_attribute(conn, id, IN_MAP, &AttributeValue::Id(map))?;
    Ok(id)
}

fn located_in(conn: &Connection, map: EntityId, kind: &str) -> Result<Vec<EntityId>, KnowledgeError> {
    let Some(concept) = find_concept(conn, kind)? else {
        return Ok(Vec::new());
    };
    let mut stmt = conn
        .prepare(
            "SELECT m.entity_id FROM entity_attributes m
             JOIN entity_attributes i
               ON i.entity_id = m.entity_id AND i.attribute_name = ?1 AND i.id_value = ?2
             WHERE m.attribute_name = ?3 AND m.id_value = ?4
             ORDER BY m.entity_id ASC",
        )
        .storage()?;
    let ids = stmt
        .query_map(params![INSTANCE_OF, concept.0, IN_MAP, map.0], |row| {
            row.get::<_, i64>(0).map(EntityId)
        })
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    Ok(ids)
}

fn located_named(
    conn: &Connection,
    map: EntityId,
    kind: &str,
    name: &str,
) -> Result<Option<EntityId>, KnowledgeError> {
    let Some(concept) = find_concept(conn, kind)? else {
        return Ok(None);
    };
    let id: Option<i64> = conn
        .query_row(
            "SELECT n.entity_id FROM entity_attributes n
             JOIN entity_attributes i
               ON i.entity_id = n.entity_id AND i.attribute_name = ?1 AND i.id_value = ?2
             JOIN entity_attributes m
               ON m.entity_id = n.entity_id AND m.attribute_name = ?3 AND m.id_value = ?4
             WHERE n.attribute_name = ?5 AND n.str_value = ?6
             ORDER BY n.entity_id DESC LIMIT 1",
            params![INSTANCE_OF, concept.0, IN_MAP, map.0, NAME, name],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    Ok(id.map(EntityId))
}

fn coordinate(conn: &Connection, entity: EntityId, axis: &str) -> Result<f64, KnowledgeError> {
    match latest_value(conn, entity, axis)? {
        Some(AttributeValue::Float(v)) => Ok(v),
        _ => Err(KnowledgeError::MissingAttribute {
            entity,
            attribute: axis.to_string(),
        }),
    }
}

/// `(x, y)` of a point or pose, or `None` if either coordinate is missing.
fn position(conn: &Connection, entity: EntityId) -> Result<Option<(f64, f64)>, KnowledgeError> {
    match (latest_value(conn, entity, X)?, latest_value(conn, entity, Y)?) {
        (Some(AttributeValue::Float(x)), Some(AttributeValue::Float(y))) => Ok(Some((x, y))),
        _ => Ok(None),
    }
}

fn vertices(ltm: &LongTermMemory, region: EntityId) -> Result<Vec<(f64, f64)>, KnowledgeError> {
    let xs = ltm.get_attributes(region, Some(VERTEX_X))?;
    let ys = ltm.get_attributes(region, Some(VERTEX_Y))?;
    if xs.len() != ys.len() {
        let short = if xs.len() < ys.len() { VERTEX_X } else { VERTEX_Y };
        return Err(KnowledgeError::MissingAttribute {
            entity: region,
            attribute: short.to_string(),
        });
    }
    Ok(xs
        .iter()
        .zip(&ys)
        .filter_map(|(x, y)| Some((x.get_float_value()?, y.get_float_value()?)))
        .collect())
}

fn containing_regions(
    ltm: &LongTermMemory,
    entity: EntityId,
) -> Result<Vec<Region<'_>>, KnowledgeError> {
    let Some(map) = owning_map(ltm, entity)? else {
        return Ok(Vec::new());
    };
    let Some((x, y)) = position(ltm.conn(), entity)? else {
        return Ok(Vec::new());
    };
    let mut regions = Vec::new();
    for region in map.get_all_regions()? {
        if region.contains(x, y)? {
            regions.push(region);
        }
    }
    Ok(regions)
}

/// Even-odd test; positions on an edge count as inside. Outlines with fewer
/// than three vertices contain nothing.
fn polygon_contains(outline: &[(f64, f64)], x: f64, y: f64) -> bool {
    if outline.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = outline.len() - 1;
    for (i, &(xi, yi)) in outline.iter().enumerate() {
        let (xj, yj) = outline[j];
        if on_segment((xi, yi), (xj, yj), (x, y)) {
            return true;
        }
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    cross == 0.0
        && p.0 >= a.0.min(b.0)
        && p.0 <= a.0.max(b.0)
        && p.1 >= a.1.min(b.1)
        && p.1 <= a.1.max(b.1)
}

fn owning_map(ltm: &LongTermMemory, entity: EntityId) -> Result<Option<Map<'_>>, KnowledgeError> {
    Ok(match latest_value(ltm.conn(), entity, IN_MAP)? {
        Some(AttributeValue::Id(map)) => Some(Map { entity_id: map, ltm }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ltm() -> LongTermMemory {
        LongTermMemory::open_in_memory().unwrap()
    }

    #[test]
    fn map_name_roundtrip() {
        let ltm = make_ltm();
        let map = ltm.get_map("test map").unwrap();
        assert_eq!(map.get_name().unwrap().as_deref(), Some("test map"));
    }

    #[test]
    fn get_map_is_deterministic() {
        let ltm = make_ltm();
        let a = ltm.get_map("kitchen").unwrap();
        let b = ltm.get_map("kitchen").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ltm.get_map("hallway").unwrap());
        assert_eq!(ltm.get_all_maps().unwrap().len(), 2);
    }

    #[test]
    fn map_is_not_confused_with_concept_of_same_name() {
        let ltm = make_ltm();
        let concept = ltm.get_concept("kitchen").unwrap();
        let map = ltm.get_map("kitchen").unwrap();
        assert_ne!(concept.entity_id, map.entity_id);
    }

    #[test]
    fn point_roundtrip() {
        let ltm = make_ltm();
        let map = ltm.get_map("test map").unwrap();
        let point = map.add_point("test", 0.0, 1.0).unwrap();
        assert_eq!(point.get_name().unwrap().as_deref(), Some("test"));
        assert_eq!(point.x().unwrap(), 0.0);
        assert_eq!(point.y().unwrap(), 1.0);
        assert_eq!(point.get_map().unwrap(), Some(map));
    }

    #[test]
    fn pose_roundtrip() {
        let ltm = make_ltm();
        let map = ltm.get_map("test map").unwrap();
        let pose = map.add_pose("test pose", 0.0, 1.0, 2.0).unwrap();
        assert_eq!(pose.get_name().unwrap().as_deref(), Some("test pose"));
        assert_eq!(pose.x().unwrap(), 0.0);
        assert_eq!(pose.y().unwrap(), 1.0);
        assert_eq!(pose.theta().unwrap(), 2.0);
        assert_eq!(pose.get_map().unwrap(), Some(map));
    }

    #[test]
    fn theta_is_not_normalised() {
        let ltm = make_ltm();
        let map = ltm.get_map("lab").unwrap();
        let pose = map.add_pose("spin", 0.0, 0.0, 7.5).unwrap();
        assert_eq!(pose.theta().unwrap(), 7.5);
    }

    #[test]
    fn accessors_read_latest_value() {
        let ltm = make_ltm();
        let map = ltm.get_map("lab").unwrap();
        let point = map.add_point("bin", 1.0, 1.0).unwrap();
        point.as_entity().add_attribute(X, 4.0).unwrap();
        assert_eq!(point.x().unwrap(), 4.0);
    }

    #[test]
    fn missing_coordinate_is_reported() {
        let ltm = make_ltm();
        let map = ltm.get_map("lab").unwrap();
        let point = map.add_point("bin", 1.0, 2.0).unwrap();
        point.as_entity().remove_attribute(Y).unwrap();
        let err = point.y().unwrap_err();
        assert_eq!(
            err,
            KnowledgeError::MissingAttribute {
                entity: point.entity_id,
                attribute: Y.to_string(),
            }
        );
    }

    #[test]
    fn duplicate_point_names_are_distinct_entities() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let first = map.add_point("door", 0.0, 0.0).unwrap();
        let second = map.add_point("door", 5.0, 0.0).unwrap();
        assert_ne!(first, second);
        assert_eq!(map.get_all_points().unwrap(), vec![first, second]);
        assert_eq!(map.get_point("door").unwrap(), Some(second));
        assert_eq!(map.get_point("window").unwrap(), None);
    }

    #[test]
    fn points_and_poses_are_kept_apart() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let point = map.add_point("desk", 1.0, 2.0).unwrap();
        let pose = map.add_pose("desk", 1.0, 2.0, 0.0).unwrap();
        assert_eq!(map.get_all_points().unwrap(), vec![point]);
        assert_eq!(map.get_all_poses().unwrap(), vec![pose]);
        assert_eq!(map.get_point("desk").unwrap(), Some(point));
        assert_eq!(map.get_pose("desk").unwrap(), Some(pose));
    }

    #[test]
    fn points_belong_to_their_own_map() {
        let ltm = make_ltm();
        let kitchen = ltm.get_map("kitchen").unwrap();
        let hallway = ltm.get_map("hallway").unwrap();
        kitchen.add_point("door", 0.0, 0.0).unwrap();
        assert!(hallway.get_all_points().unwrap().is_empty());
        assert_eq!(hallway.get_point("door").unwrap(), None);
    }

    #[test]
    fn add_point_to_deleted_map_fails() {
        let ltm = make_ltm();
        let map = ltm.get_map("gone").unwrap();
        map.delete().unwrap();
        let err = map.add_point("p", 0.0, 0.0).unwrap_err();
        assert_eq!(err, KnowledgeError::InvalidEntity(map.entity_id));
    }

    #[test]
    fn delete_removes_points_and_poses() {
        let ltm = make_ltm();
        let map = ltm.get_map("garage").unwrap();
        let point = map.add_point("car", 1.0, 1.0).unwrap();
        let pose = map.add_pose("charger", 2.0, 0.0, 3.0).unwrap();
        assert!(map.delete().unwrap());
        assert!(!map.as_entity().is_valid().unwrap());
        assert!(!point.as_entity().is_valid().unwrap());
        assert!(!pose.as_entity().is_valid().unwrap());
        assert!(!map.delete().unwrap());
        assert!(ltm.get_all_maps().unwrap().is_empty());
        assert_ne!(ltm.get_map("garage").unwrap(), map);
    }

    #[test]
    fn non_finite_pose_is_rejected_without_residue() {
        let ltm = make_ltm();
        let map = ltm.get_map("lab").unwrap();
        let before = ltm.get_all_entities().unwrap().len();

        let err = map.add_pose("bad", 0.0, 0.0, f64::NAN).unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::InvalidValue { ref attribute, .. } if attribute == THETA
        ));
        assert!(map.add_point("far", f64::INFINITY, 0.0).is_err());

        assert!(map.get_all_poses().unwrap().is_empty());
        assert!(map.get_all_points().unwrap().is_empty());
        assert_eq!(ltm.get_all_entities().unwrap().len(), before);
        assert!(ltm.get_all_entity_attributes().is_ok());
    }

    fn square(side: f64) -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)]
    }

    #[test]
    fn region_roundtrip() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let desk = map.add_region("desk area", &square(4.0)).unwrap();
        assert_eq!(desk.get_name().unwrap().as_deref(), Some("desk area"));
        assert_eq!(desk.get_vertices().unwrap(), square(4.0));
        assert_eq!(desk.get_map().unwrap(), Some(map));
        assert_eq!(map.get_region("desk area").unwrap(), Some(desk));
        assert_eq!(map.get_region("lobby").unwrap(), None);
        assert_eq!(map.get_all_regions().unwrap(), vec![desk]);
        assert!(map.get_all_points().unwrap().is_empty());
    }

    #[test]
    fn degenerate_regions_are_rejected() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let err = map.add_region("line", &[(0.0, 0.0), (1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidValue { .. }));

        let outline = [(0.0, 0.0), (f64::NAN, 1.0), (1.0, 0.0)];
        let err = map.add_region("broken", &outline).unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidValue { .. }));
        assert!(map.get_all_regions().unwrap().is_empty());
        assert!(ltm.get_all_entity_attributes().is_ok());
    }

    #[test]
    fn region_finds_contained_points_and_poses() {
        let ltm = make_ltm();
        let kitchen = ltm.get_map("kitchen").unwrap();
        let hallway = ltm.get_map("hallway").unwrap();
        let counter = kitchen.add_region("counter", &square(4.0)).unwrap();

        let inside = kitchen.add_point("mug", 1.0, 1.0).unwrap();
        let on_edge = kitchen.add_point("edge", 4.0, 2.0).unwrap();
        kitchen.add_point("fridge", 5.0, 5.0).unwrap();
        hallway.add_point("elsewhere", 1.0, 1.0).unwrap();
        let pose = kitchen.add_pose("reach", 2.0, 3.0, 0.5).unwrap();
        kitchen.add_pose("door", -1.0, 2.0, 0.0).unwrap();

        assert_eq!(counter.get_contained_points().unwrap(), vec![inside, on_edge]);
        assert_eq!(counter.get_contained_poses().unwrap(), vec![pose]);
        assert!(counter.contains(0.0, 0.0).unwrap());
        assert!(!counter.contains(4.5, 2.0).unwrap());
    }

    #[test]
    fn concave_region_excludes_its_notch() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let ell = [(0.0, 0.0), (4.0, 0.0), (4.0, 1.0), (1.0, 1.0), (1.0, 4.0), (0.0, 4.0)];
        let region = map.add_region("ell", &ell).unwrap();
        assert!(region.contains(0.5, 3.0).unwrap());
        assert!(region.contains(3.0, 0.5).unwrap());
        assert!(!region.contains(3.0, 3.0).unwrap());
    }

    #[test]
    fn positions_report_containing_regions() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let room = map.add_region("room", &square(10.0)).unwrap();
        let corner = map.add_region("corner", &square(2.0)).unwrap();
        let point = map.add_point("plant", 1.0, 1.0).unwrap();
        let pose = map.add_pose("window", 6.0, 6.0, 0.0).unwrap();

        assert_eq!(point.get_containing_regions().unwrap(), vec![room, corner]);
        assert_eq!(pose.get_containing_regions().unwrap(), vec![room]);

        let other = ltm.get_map("garage").unwrap();
        let stray = other.add_point("plant", 1.0, 1.0).unwrap();
        assert!(stray.get_containing_regions().unwrap().is_empty());
    }

    #[test]
    fn unpaired_vertices_are_reported() {
        let ltm = make_ltm();
        let map = ltm.get_map("office").unwrap();
        let region = map.add_region("desk", &square(1.0)).unwrap();
        region.as_entity().add_attribute(VERTEX_X, 2.0).unwrap();
        let err = region.get_vertices().unwrap_err();
        assert_eq!(
            err,
            KnowledgeError::MissingAttribute {
                entity: region.entity_id,
                attribute: VERTEX_Y.to_string(),
            }
        );
    }

    #[test]
    fn delete_removes_regions() {
        let ltm = make_ltm();
        let map = ltm.get_map("garage").unwrap();
        let region = map.add_region("bay", &square(3.0)).unwrap();
        assert!(map.delete().unwrap());
        assert!(!region.as_entity().is_valid().unwrap());
    }

    #[test]
    fn rename_keeps_names_unique() {
        let ltm = make_ltm();
        let kitchen = ltm.get_map("kitchen").unwrap();
        let hallway = ltm.get_map("hallway").unwrap();
        assert!(!hallway.rename("kitchen").unwrap());
        assert_eq!(hallway.get_name().unwrap().as_deref(), Some("hallway"));

        assert!(kitchen.rename("galley").unwrap());
        assert_eq!(kitchen.get_name().unwrap().as_deref(), Some("galley"));
        assert_eq!(ltm.get_map("galley").unwrap(), kitchen);
        assert!(kitchen.rename("galley").unwrap());
    }
}
