use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::behaviours::{Identity, Timestamps};
use crate::error::DbError;
use crate::ulid::Ulid;

/// Organisation owning scoped records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tenant {
    pub identity: Identity,
    pub timestamps: Timestamps,
    pub name: String,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identity: Identity::new(),
            timestamps: Timestamps::default(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Option<Ulid> {
        self.identity.id()
    }

    fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let id: Ulid = row.try_get("id").map_err(DbError::from_row_error)?;
        Ok(Self {
            identity: Identity::with_id(id),
            timestamps: Timestamps {
                created_at: row.try_get("created_at").map_err(DbError::from_row_error)?,
                updated_at: row.try_get("updated_at").map_err(DbError::from_row_error)?,
            },
            name: row.try_get("name").map_err(DbError::from_row_error)?,
        })
    }
}

pub struct TenantStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TenantStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new tenant, assigning its id if it has none.
    ///
    /// The tenant only gains its id and timestamps once the row is written.
    pub async fn insert(&self, tenant: &mut Tenant) -> Result<Ulid, DbError> {
        let mut identity = tenant.identity;
        let mut timestamps = tenant.timestamps;
        timestamps.on_insert(Utc::now());
        let id = identity.assign();

        sqlx::query("INSERT INTO tenants (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(&tenant.name)
            .bind(timestamps.created_at)
            .bind(timestamps.updated_at)
            .execute(self.pool)
            .await?;

        tenant.identity = identity;
        tenant.timestamps = timestamps;
        Ok(id)
    }

    pub async fn update(&self, tenant: &mut Tenant) -> Result<(), DbError> {
        let id = tenant.id().ok_or(sqlx::Error::RowNotFound)?;
        let mut timestamps = tenant.timestamps;
        timestamps.on_update(Utc::now());

        let result = sqlx::query("UPDATE tenants SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&tenant.name)
            .bind(timestamps.updated_at)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }
        tenant.timestamps = timestamps;
        Ok(())
    }

    pub async fn get(&self, id: Ulid) -> Result<Option<Tenant>, DbError> {
        let row = sqlx::query("SELECT id, name, created_at, updated_at FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.as_ref().map(Tenant::from_row).transpose()
    }

    /// All tenants in creation order
    pub async fn list(&self) -> Result<Vec<Tenant>, DbError> {
        let rows = sqlx::query("SELECT id, name, created_at, updated_at FROM tenants ORDER BY id")
            .fetch_all(self.pool)
            .await?;

        rows.iter().map(Tenant::from_row).collect()
    }

    pub async fn delete(&self, id: Ulid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_insert_assigns_id_once() {
        let db = Database::in_memory().await.unwrap();
        let store = db.tenants();

        let mut tenant = Tenant::new("Acme");
        assert!(tenant.id().is_none());

        let id = store.insert(&mut tenant).await.unwrap();
        assert_eq!(tenant.id(), Some(id));
        let created_at = tenant.timestamps.created_at;

        tenant.name = "Acme Corp".to_string();
        store.update(&mut tenant).await.unwrap();
        assert_eq!(tenant.id(), Some(id));
        assert_eq!(tenant.timestamps.created_at, created_at);

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Acme Corp");
        assert_eq!(stored.id(), Some(id));
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_tenant_untouched() {
        let db = Database::in_memory().await.unwrap();
        db.close().await;

        let mut tenant = Tenant::new("Offline");
        assert!(db.tenants().insert(&mut tenant).await.is_err());
        assert!(tenant.id().is_none());
        assert!(tenant.timestamps.created_at.is_none());
    }

    #[tokio::test]
    async fn test_preset_id_is_kept() {
        let db = Database::in_memory().await.unwrap();
        let store = db.tenants();
        let id = Ulid::decode("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();

        let mut tenant = Tenant::new("Imported");
        tenant.identity = Identity::with_id(id);
        assert_eq!(store.insert(&mut tenant).await.unwrap(), id);

        let raw: String = sqlx::query_scalar("SELECT id FROM tenants")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(raw, "01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }

    #[tokio::test]
    async fn test_list_is_creation_ordered() {
        let db = Database::in_memory().await.unwrap();
        let store = db.tenants();

        let mut ids = Vec::new();
        for name in ["first", "second", "third"] {
            let mut tenant = Tenant::new(name);
            ids.push(store.insert(&mut tenant).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_corrupt_id_is_data_integrity_error() {
        let db = Database::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO tenants (id, name, created_at, updated_at)
             VALUES ('IIIIIIIIIIIIIIIIIIIIIIIIII', 'broken', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        match db.tenants().list().await {
            Err(DbError::DataIntegrity { column, .. }) => assert_eq!(column, "id"),
            other => panic!("expected data integrity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_requires_persisted_tenant() {
        let db = Database::in_memory().await.unwrap();
        let mut tenant = Tenant::new("ghost");
        assert!(db.tenants().update(&mut tenant).await.is_err());
        assert!(tenant.id().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::in_memory().await.unwrap();
        let store = db.tenants();
        let mut tenant = Tenant::new("short-lived");
        let id = store.insert(&mut tenant).await.unwrap();

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }
}
