// src/store/postgres.rs
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgExecutor, Row};
use tracing::{debug, info};

use super::{DomainStore, Registration, Result, merge_registration};
use crate::error::StoreError;
use crate::plan::{PlanGate, PlanUsage};
use crate::types::{CertStatus, CheckFrequency, DomainId, DomainPatch, MonitoredDomain, Team, TeamId};

const DOMAIN_COLUMNS: &str = r#"
    id, domain, port, common_name, valid_from, valid_until, days_remaining,
    status, last_checked_at, next_check_at, check_frequency, notified,
    custom_alert_days, custom_emails, team_id
"#;

/// PostgreSQL domain store
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL database");

        let cleaned_url = Self::clean_connection_string(database_url);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&cleaned_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self { pool })
    }

    /// Remove connection string parameters sqlx does not understand
    fn clean_connection_string(url_str: &str) -> String {
        use url::Url;

        if let Ok(mut url) = Url::parse(url_str) {
            let unsupported_params = ["channel_binding"];

            let cleaned_pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !unsupported_params.contains(&key.as_ref()))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            if cleaned_pairs.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(cleaned_pairs);
            }

            url.to_string()
        } else {
            url_str.to_string()
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                default_alert_days INTEGER,
                default_emails TEXT[] NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create teams table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitored_domains (
                id BIGSERIAL PRIMARY KEY,
                domain TEXT NOT NULL,
                port INTEGER NOT NULL DEFAULT 443,
                common_name TEXT NOT NULL DEFAULT '',
                valid_from DATE,
                valid_until DATE,
                days_remaining BIGINT,
                status TEXT,
                last_checked_at TIMESTAMPTZ,
                next_check_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                check_frequency TEXT NOT NULL DEFAULT 'daily',
                notified BOOLEAN NOT NULL DEFAULT FALSE,
                custom_alert_days INTEGER,
                custom_emails TEXT[] NOT NULL DEFAULT '{}',
                team_id BIGINT REFERENCES teams(id) ON DELETE SET NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create monitored_domains table")?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_monitored_domains_domain
            ON monitored_domains(LOWER(domain))
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on domain")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_monitored_domains_next_check
            ON monitored_domains(next_check_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on next_check_at")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                free_used BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create app_state table")?;

        sqlx::query("INSERT INTO app_state (id, free_used) VALUES (1, FALSE) ON CONFLICT (id) DO NOTHING")
            .execute(&self.pool)
            .await
            .context("Failed to seed app_state")?;

        info!("Database migrations completed successfully");

        Ok(())
    }

    fn row_to_domain(row: &PgRow) -> Result<MonitoredDomain> {
        let status = row
            .try_get::<Option<String>, _>("status")?
            .map(|s| s.parse::<CertStatus>())
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let frequency: String = row.try_get("check_frequency")?;
        let port: i32 = row.try_get("port")?;

        Ok(MonitoredDomain {
            id: row.try_get("id")?,
            domain: row.try_get("domain")?,
            port: u16::try_from(port).unwrap_or(443),
            common_name: row.try_get("common_name")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            days_remaining: row.try_get("days_remaining")?,
            status,
            last_checked_at: row.try_get("last_checked_at")?,
            next_check_at: row.try_get("next_check_at")?,
            check_frequency: CheckFrequency::parse_lenient(&frequency),
            notified: row.try_get("notified")?,
            custom_alert_days: row
                .try_get::<Option<i32>, _>("custom_alert_days")?
                .map(|d| d.max(0) as u32),
            custom_emails: row.try_get("custom_emails")?,
            team_id: row.try_get("team_id")?,
        })
    }

    fn rows_to_domains(rows: Vec<PgRow>) -> Result<Vec<MonitoredDomain>> {
        rows.iter().map(Self::row_to_domain).collect()
    }

    async fn fetch_by_domain<'e, E: PgExecutor<'e>>(
        executor: E,
        domain: &str,
        for_update: bool,
    ) -> Result<Option<MonitoredDomain>> {
        let sql = format!(
            "SELECT {} FROM monitored_domains WHERE LOWER(domain) = LOWER($1) ORDER BY id LIMIT 1{}",
            DOMAIN_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql).bind(domain).fetch_optional(executor).await?;
        row.as_ref().map(Self::row_to_domain).transpose()
    }

    async fn insert_domain<'e, E: PgExecutor<'e>>(
        executor: E,
        record: &MonitoredDomain,
    ) -> Result<DomainId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO monitored_domains (
                domain, port, common_name, valid_from, valid_until, days_remaining,
                status, last_checked_at, next_check_at, check_frequency, notified,
                custom_alert_days, custom_emails, team_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(&record.domain)
        .bind(i32::from(record.port))
        .bind(&record.common_name)
        .bind(record.valid_from)
        .bind(record.valid_until)
        .bind(record.days_remaining)
        .bind(record.status.map(|s| s.as_str()))
        .bind(record.last_checked_at)
        .bind(record.next_check_at)
        .bind(record.check_frequency.as_str())
        .bind(record.notified)
        .bind(record.custom_alert_days.map(|d| d as i32))
        .bind(&record.custom_emails)
        .bind(record.team_id)
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    async fn replace_domain<'e, E: PgExecutor<'e>>(
        executor: E,
        record: &MonitoredDomain,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE monitored_domains SET
                domain = $2, port = $3, common_name = $4, valid_from = $5,
                valid_until = $6, days_remaining = $7, status = $8,
                last_checked_at = $9, next_check_at = $10, check_frequency = $11,
                notified = $12, custom_alert_days = $13, custom_emails = $14,
                team_id = $15
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.domain)
        .bind(i32::from(record.port))
        .bind(&record.common_name)
        .bind(record.valid_from)
        .bind(record.valid_until)
        .bind(record.days_remaining)
        .bind(record.status.map(|s| s.as_str()))
        .bind(record.last_checked_at)
        .bind(record.next_check_at)
        .bind(record.check_frequency.as_str())
        .bind(record.notified)
        .bind(record.custom_alert_days.map(|d| d as i32))
        .bind(&record.custom_emails)
        .bind(record.team_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DomainStore for PostgresStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredDomain>> {
        let sql = format!(
            "SELECT {} FROM monitored_domains WHERE next_check_at <= $1 ORDER BY next_check_at, id",
            DOMAIN_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(now).fetch_all(&self.pool).await?;

        debug!("Fetched {} due domains", rows.len());
        Self::rows_to_domains(rows)
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<MonitoredDomain>> {
        Self::fetch_by_domain(&self.pool, domain, false).await
    }

    async fn find_all(&self) -> Result<Vec<MonitoredDomain>> {
        let sql = format!("SELECT {} FROM monitored_domains ORDER BY id", DOMAIN_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Self::rows_to_domains(rows)
    }

    async fn find_next_scheduled(&self) -> Result<Option<MonitoredDomain>> {
        let sql = format!(
            "SELECT {} FROM monitored_domains ORDER BY next_check_at, id LIMIT 1",
            DOMAIN_COLUMNS
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_domain).transpose()
    }

    async fn upsert(&self, record: MonitoredDomain) -> Result<MonitoredDomain> {
        let mut tx = self.pool.begin().await?;

        let saved = match Self::fetch_by_domain(&mut *tx, &record.domain, true).await? {
            Some(existing) => {
                let updated = MonitoredDomain {
                    id: existing.id,
                    ..record
                };
                Self::replace_domain(&mut *tx, &updated).await?;
                updated
            }
            None => {
                let id = Self::insert_domain(&mut *tx, &record).await?;
                MonitoredDomain { id, ..record }
            }
        };

        tx.commit().await?;
        Ok(saved)
    }

    async fn update_fields(&self, id: DomainId, patch: &DomainPatch) -> Result<()> {
        // SET expressions see the pre-update row, so the re-arm comparison
        // uses the stored valid_until.
        let result = sqlx::query(
            r#"
            UPDATE monitored_domains SET
                common_name = COALESCE($2, common_name),
                valid_from = COALESCE($3, valid_from),
                valid_until = COALESCE($4, valid_until),
                days_remaining = COALESCE($5, days_remaining),
                status = COALESCE($6, status),
                last_checked_at = COALESCE($7, last_checked_at),
                next_check_at = COALESCE($8, next_check_at),
                notified = COALESCE(
                    $9,
                    CASE
                        WHEN $10 AND $4::date IS NOT NULL AND valid_until IS DISTINCT FROM $4::date
                        THEN FALSE
                        ELSE notified
                    END
                )
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.common_name.as_deref())
        .bind(patch.valid_from)
        .bind(patch.valid_until)
        .bind(patch.days_remaining)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.last_checked_at)
        .bind(patch.next_check_at)
        .bind(patch.notified)
        .bind(patch.rearm_on_renewal)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn find_alert_candidates(&self) -> Result<Vec<MonitoredDomain>> {
        let sql = format!(
            r#"
            SELECT {} FROM monitored_domains
            WHERE status IN ('valid', 'expiring', 'expired') AND notified = FALSE
            ORDER BY id
            "#,
            DOMAIN_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Self::rows_to_domains(rows)
    }

    async fn get_team(&self, id: TeamId) -> Result<Option<Team>> {
        let row = sqlx::query(
            "SELECT id, name, default_alert_days, default_emails FROM teams WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<Team> {
            Ok(Team {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                default_alert_days: r
                    .try_get::<Option<i32>, _>("default_alert_days")?
                    .map(|d| d.max(0) as u32),
                default_emails: r.try_get("default_emails")?,
            })
        })
        .transpose()
    }

    async fn upsert_team(&self, team: Team) -> Result<Team> {
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, default_alert_days, default_emails)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET name = $2, default_alert_days = $3, default_emails = $4
            "#,
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(team.default_alert_days.map(|d| d as i32))
        .bind(&team.default_emails)
        .execute(&self.pool)
        .await?;

        Ok(team)
    }

    async fn register(&self, record: MonitoredDomain, gate: &dyn PlanGate) -> Result<Registration> {
        let mut tx = self.pool.begin().await?;

        // Row lock on app_state serializes concurrent registrations
        let free_used: bool =
            sqlx::query_scalar("SELECT free_used FROM app_state WHERE id = 1 FOR UPDATE")
                .fetch_optional(&mut *tx)
                .await?
                .unwrap_or(false);

        if let Some(existing) = Self::fetch_by_domain(&mut *tx, &record.domain, true).await? {
            let merged = merge_registration(&existing, record);
            Self::replace_domain(&mut *tx, &merged).await?;
            tx.commit().await?;
            return Ok(Registration::Updated(merged));
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitored_domains")
            .fetch_one(&mut *tx)
            .await?;
        let usage = PlanUsage {
            existing_domains: count.max(0) as usize,
            free_used,
        };

        if !gate.can_add_domain(usage, true) {
            tx.rollback().await?;
            return Ok(Registration::Denied {
                reason: gate.describe(),
            });
        }

        let id = Self::insert_domain(&mut *tx, &record).await?;
        if gate.consumes_free_slot() && !free_used {
            sqlx::query("UPDATE app_state SET free_used = TRUE WHERE id = 1")
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Registration::Created(MonitoredDomain { id, ..record }))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_connection_string_drops_channel_binding() {
        let cleaned = PostgresStore::clean_connection_string(
            "postgresql://user:pw@db.example.com/certs?sslmode=require&channel_binding=require",
        );
        assert!(cleaned.contains("sslmode=require"));
        assert!(!cleaned.contains("channel_binding"));
    }

    #[test]
    fn test_clean_connection_string_passthrough() {
        assert_eq!(
            PostgresStore::clean_connection_string("not a url"),
            "not a url".to_string()
        );
        let cleaned =
            PostgresStore::clean_connection_string("postgresql://localhost/certs?channel_binding=x");
        assert!(!cleaned.contains('?'));
    }
}
