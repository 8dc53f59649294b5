use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::behaviours::{BaseModel, Identity, TenantScope, Timestamps};
use crate::error::DbError;
use crate::ulid::Ulid;

/// Tenant-scoped contact record built on [`BaseModel`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub base: BaseModel,
    pub email: String,
}

impl Contact {
    pub fn new(tenant_id: Option<Ulid>, email: impl Into<String>) -> Self {
        let base = match tenant_id {
            Some(tenant_id) => BaseModel::scoped_to(tenant_id),
            None => BaseModel::new(),
        };
        Self {
            base,
            email: email.into(),
        }
    }

    pub fn id(&self) -> Option<Ulid> {
        self.base.id()
    }

    fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        Ok(Self {
            base: BaseModel {
                identity: Identity::with_id(row.try_get("id").map_err(DbError::from_row_error)?),
                timestamps: Timestamps {
                    created_at: row.try_get("created_at").map_err(DbError::from_row_error)?,
                    updated_at: row.try_get("updated_at").map_err(DbError::from_row_error)?,
                },
                tenant: TenantScope {
                    tenant_id: row.try_get("tenant_id").map_err(DbError::from_row_error)?,
                },
            },
            email: row.try_get("email").map_err(DbError::from_row_error)?,
        })
    }
}

const SELECT: &str = "SELECT id, tenant_id, email, created_at, updated_at FROM contacts";

pub struct ContactStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ContactStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new contact; its id and timestamps are kept only on success
    pub async fn insert(&self, contact: &mut Contact) -> Result<Ulid, DbError> {
        let mut base = contact.base;
        let id = base.before_insert(Utc::now());

        sqlx::query(
            "INSERT INTO contacts (id, tenant_id, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(base.tenant.tenant_id)
        .bind(&contact.email)
        .bind(base.timestamps.created_at)
        .bind(base.timestamps.updated_at)
        .execute(self.pool)
        .await?;

        contact.base = base;
        Ok(id)
    }

    pub async fn get(&self, id: Ulid) -> Result<Option<Contact>, DbError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.as_ref().map(Contact::from_row).transpose()
    }

    /// Contacts of one tenant in creation order
    pub async fn list_for_tenant(&self, tenant_id: Ulid) -> Result<Vec<Contact>, DbError> {
        let rows = sqlx::query(&format!("{} WHERE tenant_id = ? ORDER BY id", SELECT))
            .bind(tenant_id)
            .fetch_all(self.pool)
            .await?;

        rows.iter().map(Contact::from_row).collect()
    }
}
