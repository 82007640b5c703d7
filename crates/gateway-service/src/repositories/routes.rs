//! Route rule persistence.
//!
//! Rules are keyed by `(request_path, method)`. Callers pass the method already
//! uppercased; stores compare it verbatim.

use crate::errors::GatewayError;
use crate::models::RouteRule;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence boundary for route rules.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn load(&self, path: &str, method: &str) -> Result<Option<RouteRule>, GatewayError>;

    /// Insert or replace the rule at its `(path, method)` key.
    async fn save(&self, rule: &RouteRule) -> Result<(), GatewayError>;

    /// Returns `true` if a rule was removed.
    async fn delete(&self, path: &str, method: &str) -> Result<bool, GatewayError>;

    async fn list(&self) -> Result<Vec<RouteRule>, GatewayError>;
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryRouteStore {
    rules: RwLock<HashMap<(String, String), RouteRule>>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn load(&self, path: &str, method: &str) -> Result<Option<RouteRule>, GatewayError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&(path.to_string(), method.to_string())).cloned())
    }

    async fn save(&self, rule: &RouteRule) -> Result<(), GatewayError> {
        self.rules.write().await.insert(rule.key(), rule.clone());
        Ok(())
    }

    async fn delete(&self, path: &str, method: &str) -> Result<bool, GatewayError> {
        let removed = self
            .rules
            .write()
            .await
            .remove(&(path.to_string(), method.to_string()));
        Ok(removed.is_some())
    }

    async fn list(&self) -> Result<Vec<RouteRule>, GatewayError> {
        let mut rules: Vec<RouteRule> = self.rules.read().await.values().cloned().collect();
        rules.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(rules)
    }
}

/// Row shape of the `gateway_routes` table.
#[derive(Debug, Clone, FromRow)]
struct RouteRow {
    request_path: String,
    method: String,
    target_url: Option<String>,
    service: Option<String>,
    description: Option<String>,
    access_mask: i32,
    permit_all: bool,
    request_encrypted: bool,
    allow_user_edit: bool,
}

impl TryFrom<RouteRow> for RouteRule {
    type Error = GatewayError;

    fn try_from(row: RouteRow) -> Result<Self, Self::Error> {
        let access_mask = u32::try_from(row.access_mask).map_err(|_| {
            GatewayError::Database(format!(
                "Negative access mask {} for {} {}",
                row.access_mask, row.method, row.request_path
            ))
        })?;

        Ok(RouteRule {
            request_path: row.request_path,
            method: row.method,
            target_url: row.target_url,
            service: row.service,
            description: row.description,
            access_mask,
            permit_all: row.permit_all,
            request_encrypted: row.request_encrypted,
            allow_user_edit: row.allow_user_edit,
        })
    }
}

/// PostgreSQL-backed store over the `gateway_routes` table.
#[derive(Debug, Clone)]
pub struct PgRouteStore {
    pool: PgPool,
}

impl PgRouteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteStore for PgRouteStore {
    async fn load(&self, path: &str, method: &str) -> Result<Option<RouteRule>, GatewayError> {
        let row = sqlx::query_as::<_, RouteRow>(
            r#"
            SELECT
                request_path, method, target_url, service, description,
                access_mask, permit_all, request_encrypted, allow_user_edit
            FROM gateway_routes
            WHERE request_path = $1 AND method = $2
            "#,
        )
        .bind(path)
        .bind(method)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::Database(format!("Failed to fetch route: {}", e)))?;

        row.map(RouteRule::try_from).transpose()
    }

    async fn save(&self, rule: &RouteRule) -> Result<(), GatewayError> {
        let access_mask = i32::try_from(rule.access_mask).map_err(|_| {
            GatewayError::Validation(format!("access mask {} out of range", rule.access_mask))
        })?;

        sqlx::query(
            r#"
            INSERT INTO gateway_routes (
                request_path, method, target_url, service, description,
                access_mask, permit_all, request_encrypted, allow_user_edit
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (request_path, method) DO UPDATE SET
                target_url = EXCLUDED.target_url,
                service = EXCLUDED.service,
                description = EXCLUDED.description,
                access_mask = EXCLUDED.access_mask,
                permit_all = EXCLUDED.permit_all,
                request_encrypted = EXCLUDED.request_encrypted,
                allow_user_edit = EXCLUDED.allow_user_edit,
                updated_at = NOW()
            "#,
        )
        .bind(&rule.request_path)
        .bind(&rule.method)
        .bind(&rule.target_url)
        .bind(&rule.service)
        .bind(&rule.description)
        .bind(access_mask)
        .bind(rule.permit_all)
        .bind(rule.request_encrypted)
        .bind(rule.allow_user_edit)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Database(format!("Failed to save route: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, path: &str, method: &str) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            r#"
            DELETE FROM gateway_routes
            WHERE request_path = $1 AND method = $2
            "#,
        )
        .bind(path)
        .bind(method)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Database(format!("Failed to delete route: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<RouteRule>, GatewayError> {
        let rows = sqlx::query_as::<_, RouteRow>(
            r#"
            SELECT
                request_path, method, target_url, service, description,
                access_mask, permit_all, request_encrypted, allow_user_edit
            FROM gateway_routes
            ORDER BY request_path, method
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::Database(format!("Failed to list routes: {}", e)))?;

        rows.into_iter().map(RouteRule::try_from).collect()
    }
}
