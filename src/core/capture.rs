//! Change capture: one immutable audit record per entity mutation.
//!
//! The engine is written once against [`Snapshot`] and the generic row layer
//! in [`crate::core::entity`]. It never names a concrete entity type; an
//! entity kind is audited when it appears in the observed set, which comes
//! from `[capture].kinds` in the store configuration.
//!
//! Callers run capture operations inside a broker write transaction, so the
//! mutation and its audit append commit or roll back together.

use crate::core::config::CaptureConfig;
use crate::core::entity::{self, FieldMap};
use crate::core::error::LedgerError;
use crate::core::time;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Capability every audited entity kind provides.
pub trait Snapshot {
    /// Entity kind, which is also its table name.
    fn kind(&self) -> &'static str;
    /// Stable identifier of the entity.
    fn entity_id(&self) -> &str;
    /// Full column -> value copy of the entity, including `id`.
    fn snapshot(&self) -> FieldMap;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(LedgerError::ValidationError(format!(
                "Unknown audit action: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub action: AuditAction,
    /// Row before the change; absent on CREATE.
    pub old_values: Option<FieldMap>,
    /// Row after the change; absent on DELETE.
    pub new_values: Option<FieldMap>,
    pub actor: Option<String>,
    pub created_at: i64,
}

pub const AUDIT_COLUMNS: &str =
    "id, entity_kind, entity_id, action, old_values, new_values, actor, created_at";

impl AuditRecord {
    /// Map a row selected with [`AUDIT_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> Result<Self, LedgerError> {
        let action: String = row.get(3)?;
        let old_values: Option<String> = row.get(4)?;
        let new_values: Option<String> = row.get(5)?;
        Ok(AuditRecord {
            id: row.get(0)?,
            entity_kind: row.get(1)?,
            entity_id: row.get(2)?,
            action: AuditAction::parse(&action)?,
            old_values: old_values.map(|s| serde_json::from_str(&s)).transpose()?,
            new_values: new_values.map(|s| serde_json::from_str(&s)).transpose()?,
            actor: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Who is writing and when. "Now" is always supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteContext {
    pub actor: Option<String>,
    pub now: i64,
}

impl WriteContext {
    pub fn at(now: i64) -> Self {
        Self { actor: None, now }
    }

    /// Context stamped with the wall clock.
    pub fn now() -> Self {
        Self::at(time::now_secs())
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn actor_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.actor.as_deref().unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeCapture {
    observed: BTreeSet<String>,
}

impl ChangeCapture {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            observed: kinds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.kinds.iter().cloned())
    }

    pub fn observes(&self, kind: &str) -> bool {
        self.observed.contains(kind)
    }

    pub fn observed_kinds(&self) -> impl Iterator<Item = &str> {
        self.observed.iter().map(String::as_str)
    }

    /// Insert `entity` and capture its post-create row.
    pub fn create<E: Snapshot + ?Sized>(
        &self,
        conn: &Connection,
        entity: &E,
        ctx: &WriteContext,
    ) -> Result<FieldMap, LedgerError> {
        let kind = entity.kind();
        let id = entity.entity_id();
        let fields = entity.snapshot();
        if fields.get("id").and_then(|v| v.as_str()) != Some(id) {
            return Err(LedgerError::ValidationError(format!(
                "{} snapshot does not carry its own id {}",
                kind, id
            )));
        }

        entity::insert_row(conn, kind, &fields)?;
        let after = load_existing(conn, kind, id)?;
        self.append(conn, kind, id, AuditAction::Create, None, Some(&after), ctx)?;
        Ok(after)
    }

    /// Apply `patch` to an existing entity, capturing the rows before and after.
    pub fn update(
        &self,
        conn: &Connection,
        kind: &str,
        id: &str,
        patch: &FieldMap,
        ctx: &WriteContext,
    ) -> Result<FieldMap, LedgerError> {
        let before = load_existing(conn, kind, id)?;
        entity::update_row(conn, kind, id, patch)?;
        let after = load_existing(conn, kind, id)?;
        self.append(conn, kind, id, AuditAction::Update, Some(&before), Some(&after), ctx)?;
        Ok(after)
    }

    /// Remove an entity, capturing its last row. Returns that row.
    pub fn delete(
        &self,
        conn: &Connection,
        kind: &str,
        id: &str,
        ctx: &WriteContext,
    ) -> Result<FieldMap, LedgerError> {
        let before = load_existing(conn, kind, id)?;
        entity::delete_row(conn, kind, id)?;
        self.append(conn, kind, id, AuditAction::Delete, Some(&before), None, ctx)?;
        Ok(before)
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        conn: &Connection,
        kind: &str,
        id: &str,
        action: AuditAction,
        old_values: Option<&FieldMap>,
        new_values: Option<&FieldMap>,
        ctx: &WriteContext,
    ) -> Result<Option<String>, LedgerError> {
        if !self.observes(kind) {
            return Ok(None);
        }
        let audit_id = time::new_event_id();
        let old_json = old_values.map(serde_json::to_string).transpose()?;
        let new_json = new_values.map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO audit_log(id, entity_kind, entity_id, action, old_values, new_values, actor, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                audit_id,
                kind,
                id,
                action.as_str(),
                old_json,
                new_json,
                ctx.actor,
                ctx.now
            ],
        )
        .map_err(|source| LedgerError::AtomicityFailure {
            kind: kind.to_string(),
            entity_id: id.to_string(),
            source,
        })?;

        debug!(kind, entity_id = id, action = action.as_str(), audit_id = %audit_id, "captured mutation");
        Ok(Some(audit_id))
    }
}

fn load_existing(conn: &Connection, kind: &str, id: &str) -> Result<FieldMap, LedgerError> {
    entity::load_row(conn, kind, id)?
        .ok_or_else(|| LedgerError::NotFound(format!("{}/{}", kind, id)))
}
