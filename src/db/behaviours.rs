//! Reusable persistence behaviours
//!
//! Entities embed the behaviours they need; each applies its own rule when
//! the entity is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ulid::Ulid;

/// ULID primary key, assigned when the entity is first inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: Option<Ulid>,
}

impl Identity {
    /// Not yet persisted
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: Ulid) -> Self {
        Self { id: Some(id) }
    }

    pub fn id(&self) -> Option<Ulid> {
        self.id
    }

    /// Generate an id unless one is already set; returns the id in effect
    pub fn assign(&mut self) -> Ulid {
        *self.id.get_or_insert_with(Ulid::generate)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn on_insert(&mut self, now: DateTime<Utc>) {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    pub fn on_update(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

/// Optional owning tenant; cleared when the tenant is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: Option<Ulid>,
}

impl TenantScope {
    pub fn of(tenant_id: Ulid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
        }
    }
}

/// Identity, timestamps and tenant scope together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseModel {
    pub identity: Identity,
    pub timestamps: Timestamps,
    pub tenant: TenantScope,
}

impl BaseModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scoped_to(tenant_id: Ulid) -> Self {
        Self {
            tenant: TenantScope::of(tenant_id),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<Ulid> {
        self.identity.id()
    }

    pub fn before_insert(&mut self, now: DateTime<Utc>) -> Ulid {
        self.timestamps.on_insert(now);
        self.identity.assign()
    }

    pub fn before_update(&mut self, now: DateTime<Utc>) {
        self.timestamps.on_update(now);
    }
}
