//! Versioned polygon storage. Every save of an area's geometry appends an
//! immutable version row; the `areas` row always mirrors the latest version.

use chrono::Utc;
use rusqlite::Connection;

use acre_core::ids::{AreaId, UserId, VersionId};
use acre_geometry::ValidPolygon;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug)]
pub struct AreaRow {
    pub id: AreaId,
    pub name: String,
    /// Closed exterior ring as `[lng, lat]` pairs.
    pub ring: Vec<[f64; 2]>,
    pub area_km2: f64,
    pub created_by: UserId,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct AreaVersionRow {
    pub id: VersionId,
    pub area_id: AreaId,
    pub version_number: i64,
    pub name: String,
    pub ring: Vec<[f64; 2]>,
    pub edited_by: UserId,
    pub created_at: String,
}

fn ring_of(polygon: &ValidPolygon) -> Vec<[f64; 2]> {
    polygon.exterior().iter().map(|c| [c.x, c.y]).collect()
}

fn ring_from_json(json: &str) -> Result<Vec<[f64; 2]>, StoreError> {
    Ok(serde_json::from_str(json)?)
}

pub struct AreaRepo {
    db: Database,
}

impl AreaRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a validated polygon as a new area, recording version 1.
    pub fn create(
        &self,
        name: &str,
        polygon: &ValidPolygon,
        created_by: &UserId,
    ) -> Result<AreaRow, StoreError> {
        let id = AreaId::new();
        let ring = ring_of(polygon);
        let ring_json = serde_json::to_string(&ring)?;
        let area_km2 = polygon.area_km2();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO areas (id, name, ring, area_km2, created_by_user_id, is_deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![id.as_str(), name, ring_json, area_km2, created_by.as_str(), now],
            )?;
            insert_version(conn, &id, 1, name, &ring_json, created_by, &now)?;

            Ok(AreaRow {
                id: id.clone(),
                name: name.to_string(),
                ring: ring.clone(),
                area_km2,
                created_by: created_by.clone(),
                is_deleted: false,
                created_at: now.clone(),
            })
        })
    }

    /// Replace an area's geometry, appending the next version.
    pub fn update_geometry(
        &self,
        area_id: &AreaId,
        polygon: &ValidPolygon,
        edited_by: &UserId,
    ) -> Result<AreaVersionRow, StoreError> {
        let ring = ring_of(polygon);
        let ring_json = serde_json::to_string(&ring)?;
        let area_km2 = polygon.area_km2();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let (name, next): (String, i64) = conn
                .query_row(
                    "SELECT a.name, COALESCE(MAX(v.version_number), 0) + 1
                     FROM areas a LEFT JOIN area_versions v ON v.area_id = a.id
                     WHERE a.id = ?1 AND a.is_deleted = 0
                     GROUP BY a.id",
                    [area_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|_| StoreError::NotFound(format!("area {area_id}")))?;

            conn.execute(
                "UPDATE areas SET ring = ?2, area_km2 = ?3 WHERE id = ?1",
                rusqlite::params![area_id.as_str(), ring_json, area_km2],
            )?;
            let version = insert_version(conn, area_id, next, &name, &ring_json, edited_by, &now)?;

            Ok(version)
        })
    }

    pub fn get(&self, id: &AreaId) -> Result<AreaRow, StoreError> {
        self.db.with_conn(|conn| {
            let (row, ring_json) = conn
                .query_row(
                    "SELECT id, name, ring, area_km2, created_by_user_id, is_deleted, created_at
                     FROM areas WHERE id = ?1",
                    [id.as_str()],
                    |row| {
                        Ok((
                            AreaRow {
                                id: AreaId::from_raw(row.get::<_, String>(0)?),
                                name: row.get(1)?,
                                ring: Vec::new(),
                                area_km2: row.get(3)?,
                                created_by: UserId::from_raw(row.get::<_, String>(4)?),
                                is_deleted: row.get(5)?,
                                created_at: row.get(6)?,
                            },
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .map_err(|_| StoreError::NotFound(format!("area {id}")))?;

            Ok(AreaRow {
                ring: ring_from_json(&ring_json)?,
                ..row
            })
        })
    }

    /// All live areas, newest first.
    pub fn list(&self) -> Result<Vec<AreaRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, ring, area_km2, created_by_user_id, is_deleted, created_at
                 FROM areas WHERE is_deleted = 0 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        AreaRow {
                            id: AreaId::from_raw(row.get::<_, String>(0)?),
                            name: row.get(1)?,
                            ring: Vec::new(),
                            area_km2: row.get(3)?,
                            created_by: UserId::from_raw(row.get::<_, String>(4)?),
                            is_deleted: row.get(5)?,
                            created_at: row.get(6)?,
                        },
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(row, ring_json)| {
                    Ok(AreaRow {
                        ring: ring_from_json(&ring_json)?,
                        ..row
                    })
                })
                .collect()
        })
    }

    pub fn soft_delete(&self, id: &AreaId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE areas SET is_deleted = 1 WHERE id = ?1",
                [id.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Version history for an area, oldest first.
    pub fn list_versions(&self, area_id: &AreaId) -> Result<Vec<AreaVersionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, area_id, version_number, name, ring, edited_by_user_id, created_at
                 FROM area_versions WHERE area_id = ?1 ORDER BY version_number",
            )?;
            let rows = stmt
                .query_map([area_id.as_str()], |row| {
                    Ok((
                        AreaVersionRow {
                            id: VersionId::from_raw(row.get::<_, String>(0)?),
                            area_id: AreaId::from_raw(row.get::<_, String>(1)?),
                            version_number: row.get(2)?,
                            name: row.get(3)?,
                            ring: Vec::new(),
                            edited_by: UserId::from_raw(row.get::<_, String>(5)?),
                            created_at: row.get(6)?,
                        },
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(row, ring_json)| {
                    Ok(AreaVersionRow {
                        ring: ring_from_json(&ring_json)?,
                        ..row
                    })
                })
                .collect()
        })
    }
}

fn insert_version(
    conn: &Connection,
    area_id: &AreaId,
    version_number: i64,
    name: &str,
    ring_json: &str,
    edited_by: &UserId,
    now: &str,
) -> Result<AreaVersionRow, StoreError> {
    let id = VersionId::new();
    conn.execute(
        "INSERT INTO area_versions (id, area_id, version_number, name, ring, edited_by_user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.as_str(),
            area_id.as_str(),
            version_number,
            name,
            ring_json,
            edited_by.as_str(),
            now
        ],
    )?;
    Ok(AreaVersionRow {
        id,
        area_id: area_id.clone(),
        version_number,
        name: name.to_string(),
        ring: ring_from_json(ring_json)?,
        edited_by: edited_by.clone(),
        created_at: now.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserRepo;
    use acre_geometry::GeometryFactory;

    fn setup() -> (AreaRepo, UserId) {
        let db = Database::in_memory().unwrap();
        let user = UserRepo::new(db.clone())
            .insert("ada@example.com", "Ada")
            .unwrap();
        (AreaRepo::new(db), user.id)
    }

    fn square(size: f64) -> ValidPolygon {
        GeometryFactory::wgs84()
            .validate(&[
                vec![0.0, 0.0],
                vec![size, 0.0],
                vec![size, size],
                vec![0.0, size],
            ])
            .unwrap()
    }

    #[test]
    fn create_records_first_version() {
        let (repo, user) = setup();
        let area = repo.create("field", &square(1.0), &user).unwrap();

        assert!(area.id.as_str().starts_with("area_"));
        assert_eq!(area.ring.len(), 5); // closing point appended
        assert!(area.area_km2 > 0.0);

        let versions = repo.list_versions(&area.id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[0].ring, area.ring);
    }

    #[test]
    fn update_geometry_appends_versions() {
        let (repo, user) = setup();
        let area = repo.create("field", &square(1.0), &user).unwrap();

        let v2 = repo.update_geometry(&area.id, &square(2.0), &user).unwrap();
        assert_eq!(v2.version_number, 2);

        let fetched = repo.get(&area.id).unwrap();
        assert_eq!(fetched.ring, v2.ring);
        assert!(fetched.area_km2 > area.area_km2);

        let versions = repo.list_versions(&area.id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[1].version_number, 2);
    }

    #[test]
    fn update_missing_area_fails() {
        let (repo, user) = setup();
        let err = repo
            .update_geometry(&AreaId::from_raw("area_missing"), &square(1.0), &user)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_skips_soft_deleted() {
        let (repo, user) = setup();
        let a = repo.create("one", &square(1.0), &user).unwrap();
        repo.create("two", &square(2.0), &user).unwrap();

        assert!(repo.soft_delete(&a.id).unwrap());

        let live = repo.list().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "two");
    }

    #[test]
    fn deleted_area_rejects_new_versions() {
        let (repo, user) = setup();
        let a = repo.create("one", &square(1.0), &user).unwrap();
        repo.soft_delete(&a.id).unwrap();

        assert!(repo.update_geometry(&a.id, &square(2.0), &user).is_err());
    }

    #[test]
    fn ring_round_trips_through_json() {
        let (repo, user) = setup();
        let area = repo.create("field", &square(1.5), &user).unwrap();
        let fetched = repo.get(&area.id).unwrap();
        assert_eq!(fetched.ring, area.ring);
        assert_eq!(fetched.ring.first(), fetched.ring.last());
    }
}
