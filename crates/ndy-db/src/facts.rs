use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use ndy_eligibility::{
    ClassSessionId, MembershipStatus, OverrideFact, SessionVisibility, Subject, TenantGuardrails,
    TenantId, UserId,
};
use ndy_facts::{
    ClassSession, FactError, FactProvider, NewOverride, OverrideRecord, OverrideStore, TenantRole,
};

/// Postgres-backed fact provider and override store.
#[derive(Clone, Debug)]
pub struct PgFacts {
    pool: PgPool,
}

impl PgFacts {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Lowercase hex sha256 of a bearer token, as stored in `api_sessions`.
pub fn hash_api_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl FactProvider for PgFacts {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn tenant_guardrails(
        &self,
        tenant: TenantId,
    ) -> Result<Option<TenantGuardrails>, FactError> {
        let row: Option<(String, bool, bool)> = sqlx::query_as(
            r#"
            select system_of_record, kill_switch_disable_checkin, kill_switch_disable_booking
            from tenants
            where id = $1
            "#,
        )
        .bind(tenant.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("guardrails", e))?;

        Ok(row.map(|(sor, ks_checkin, ks_booking)| TenantGuardrails {
            system_of_record: sor,
            kill_switch_disable_checkin: ks_checkin,
            kill_switch_disable_booking: ks_booking,
        }))
    }

    async fn waiver_signed(&self, subject: &Subject) -> Result<bool, FactError> {
        let (signed,): (Option<bool>,) =
            sqlx::query_as("select has_signed_current_waiver($1, $2)")
                .bind(subject.tenant_id.0)
                .bind(subject.user_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| FactError::backend("waiver", e))?;

        Ok(signed.unwrap_or(false))
    }

    async fn membership_status(
        &self,
        subject: &Subject,
    ) -> Result<Option<MembershipStatus>, FactError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            select status
            from gym_memberships
            where tenant_id = $1 and user_id = $2
            limit 1
            "#,
        )
        .bind(subject.tenant_id.0)
        .bind(subject.user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("membership", e))?;

        Ok(row.map(|(s,)| MembershipStatus::parse(&s)))
    }

    async fn token_balance(&self, subject: &Subject) -> Result<Option<i64>, FactError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            select balance
            from token_wallets
            where tenant_id = $1 and user_id = $2
            limit 1
            "#,
        )
        .bind(subject.tenant_id.0)
        .bind(subject.user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("token_balance", e))?;

        Ok(row.map(|(b,)| b))
    }

    async fn latest_override(&self, subject: &Subject) -> Result<Option<OverrideFact>, FactError> {
        let row: Option<(Uuid, String, DateTime<Utc>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            select created_by, reason, created_at, expires_at
            from checkin_overrides
            where tenant_id = $1 and user_id = $2
            order by created_at desc
            limit 1
            "#,
        )
        .bind(subject.tenant_id.0)
        .bind(subject.user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("override", e))?;

        Ok(row.map(|(created_by, reason, created_at, expires_at)| OverrideFact {
            active: true,
            created_by: UserId(created_by),
            reason,
            created_at,
            expires_at,
        }))
    }

    async fn staff_role(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<TenantRole>, FactError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            select role
            from tenant_users
            where tenant_id = $1 and user_id = $2
            limit 1
            "#,
        )
        .bind(tenant.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("staff_role", e))?;

        Ok(row.map(|(r,)| TenantRole::parse(&r)))
    }

    async fn class_session(&self, id: ClassSessionId) -> Result<Option<ClassSession>, FactError> {
        // numeric -> float8 so the cost decodes without a decimal crate
        let row: Option<(Uuid, Uuid, Option<String>, Option<f64>, Option<f64>)> = sqlx::query_as(
            r#"
            select s.id,
                   s.tenant_id,
                   s.visibility,
                   s.token_cost::float8,
                   t.default_token_cost::float8
            from class_sessions s
            left join class_types t on t.id = s.class_type_id
            where s.id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("class_session", e))?;

        Ok(row.map(|(id, tenant_id, visibility, cost, type_cost)| ClassSession {
            id: ClassSessionId(id),
            tenant_id: TenantId(tenant_id),
            visibility: SessionVisibility::parse(visibility.as_deref()),
            token_cost: cost,
            class_type_default_token_cost: type_cost,
        }))
    }

    async fn actor_for_token(&self, token: &str) -> Result<Option<UserId>, FactError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            select user_id
            from api_sessions
            where token_sha256 = $1
              and not revoked
              and (expires_at is null or expires_at > now())
            "#,
        )
        .bind(hash_api_token(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FactError::backend("actor", e))?;

        Ok(row.map(|(u,)| UserId(u)))
    }
}

#[async_trait]
impl OverrideStore for PgFacts {
    async fn insert_override(&self, new: NewOverride) -> Result<OverrideRecord, FactError> {
        sqlx::query(
            r#"
            insert into checkin_overrides
              (id, tenant_id, user_id, reason, created_by, created_at, expires_at)
            values ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(new.override_id)
        .bind(new.tenant_id.0)
        .bind(new.user_id.0)
        .bind(&new.reason)
        .bind(new.created_by.0)
        .bind(new.created_at)
        .bind(new.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| FactError::InsertFailed(e.to_string()))?;

        Ok(OverrideRecord::from_new(new))
    }
}
