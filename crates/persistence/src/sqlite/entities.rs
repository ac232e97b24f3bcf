//! Team / startup / staff CRUD operations

use chrono::{DateTime, Utc};
use pecoin_core::{Entity, EntityKind, EntityUpdate, Error, NewEntity, Result};
use sqlx::SqlitePool;

/// Database row shared by the three entity tables
#[derive(Debug, sqlx::FromRow)]
struct EntityRow {
    id: i64,
    name: String,
    wallet_address: Option<String>,
    logo_path: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn into_entity(self, kind: EntityKind) -> Entity {
        Entity {
            id: self.id,
            kind,
            name: self.name,
            wallet_address: self.wallet_address,
            logo_path: self.logo_path,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Blank strings are stored as NULL
fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// List every entity of a kind, ordered by name
pub async fn list_entities(pool: &SqlitePool, kind: EntityKind) -> Result<Vec<Entity>> {
    let sql = format!(
        r#"
        SELECT id, name, wallet_address, logo_path, description, created_at, updated_at
        FROM {}
        ORDER BY name COLLATE NOCASE
        "#,
        kind.table_name()
    );

    let rows: Vec<EntityRow> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows.into_iter().map(|r| r.into_entity(kind)).collect())
}

/// Get a specific entity by ID
pub async fn get_entity(pool: &SqlitePool, kind: EntityKind, id: i64) -> Result<Option<Entity>> {
    let sql = format!(
        r#"
        SELECT id, name, wallet_address, logo_path, description, created_at, updated_at
        FROM {}
        WHERE id = ?
        "#,
        kind.table_name()
    );

    let row: Option<EntityRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|r| r.into_entity(kind)))
}

/// Create an entity and return it
pub async fn create_entity(pool: &SqlitePool, kind: EntityKind, new: &NewEntity) -> Result<Entity> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(Error::ValidationError("name must not be empty".into()));
    }

    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO {} (name, wallet_address, logo_path, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        kind.table_name()
    );

    let result = sqlx::query(&sql)
        .bind(name)
        .bind(normalize(new.wallet_address.as_deref()))
        .bind(normalize(new.logo_path.as_deref()))
        .bind(normalize(new.description.as_deref()))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    let id = result.last_insert_rowid();
    get_entity(pool, kind, id)
        .await?
        .ok_or_else(|| Error::EntityNotFound {
            kind: kind.to_string(),
            id,
        })
}

/// Apply a partial update and return the new record
pub async fn update_entity(
    pool: &SqlitePool,
    kind: EntityKind,
    id: i64,
    update: &EntityUpdate,
) -> Result<Entity> {
    let current = get_entity(pool, kind, id)
        .await?
        .ok_or_else(|| Error::EntityNotFound {
            kind: kind.to_string(),
            id,
        })?;

    let name = match update.name.as_deref().map(str::trim) {
        Some("") => return Err(Error::ValidationError("name must not be empty".into())),
        Some(n) => n.to_string(),
        None => current.name,
    };
    let wallet_address = match update.wallet_address.as_deref() {
        Some(w) => normalize(Some(w)),
        None => current.wallet_address,
    };
    let logo_path = match update.logo_path.as_deref() {
        Some(p) => normalize(Some(p)),
        None => current.logo_path,
    };
    let description = match update.description.as_deref() {
        Some(d) => normalize(Some(d)),
        None => current.description,
    };

    let sql = format!(
        r#"
        UPDATE {}
        SET name = ?, wallet_address = ?, logo_path = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
        kind.table_name()
    );

    sqlx::query(&sql)
        .bind(&name)
        .bind(&wallet_address)
        .bind(&logo_path)
        .bind(&description)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    get_entity(pool, kind, id)
        .await?
        .ok_or_else(|| Error::EntityNotFound {
            kind: kind.to_string(),
            id,
        })
}

/// Delete an entity; returns whether a row was removed
pub async fn delete_entity(pool: &SqlitePool, kind: EntityKind, id: i64) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table_name());

    let result = sqlx::query(&sql)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() > 0)
}
