use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tourdesk_catalog::{Provider, ProviderInput, Service, ServiceInput};
use tourdesk_core::repository::{ProviderRepository, RepoResult, RepositoryError};
use tourdesk_core::views::{like_pattern, ProviderDetail, ProviderFilter};
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::rows::{blank_to_none, db_err};

const PROVIDER_COLUMNS: &str = "id, name, provider_type, contact_name, email, phone, address, notes, \
     is_active, created_at, updated_at";
const SERVICE_COLUMNS: &str = "id, provider_id, name, description, unit_price_cents, pricing_unit, \
     is_active, created_at, updated_at";

pub struct PgProviderRepository {
    pool: PgPool,
}

impl PgProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    id: Uuid,
    name: String,
    provider_type: String,
    contact_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    notes: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProviderRow {
    fn into_domain(self) -> RepoResult<Provider> {
        Ok(Provider {
            id: self.id,
            name: self.name,
            provider_type: self.provider_type.parse()?,
            contact_name: self.contact_name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            notes: self.notes,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    provider_id: Uuid,
    name: String,
    description: Option<String>,
    unit_price_cents: i64,
    pricing_unit: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRow {
    fn into_domain(self) -> RepoResult<Service> {
        Ok(Service {
            id: self.id,
            provider_id: self.provider_id,
            name: self.name,
            description: self.description,
            unit_price_cents: self.unit_price_cents,
            pricing_unit: self.pricing_unit.parse()?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProviderFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(kind) = filter.provider_type {
        qb.push(" AND provider_type = ").push_bind(kind.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR contact_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl ProviderRepository for PgProviderRepository {
    async fn create_provider(&self, input: &ProviderInput) -> RepoResult<Provider> {
        let sql = format!(
            r#"INSERT INTO providers
                   (id, name, provider_type, contact_name, email, phone, address, notes, is_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING {}"#,
            PROVIDER_COLUMNS
        );
        sqlx::query_as::<_, ProviderRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.name.trim())
            .bind(input.provider_type.as_str())
            .bind(blank_to_none(input.contact_name.as_deref()))
            .bind(blank_to_none(input.email.as_deref()))
            .bind(blank_to_none(input.phone.as_deref()))
            .bind(blank_to_none(input.address.as_deref()))
            .bind(blank_to_none(input.notes.as_deref()))
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .into_domain()
    }

    async fn get_provider(&self, id: Uuid) -> RepoResult<Option<ProviderDetail>> {
        let sql = format!("SELECT {} FROM providers WHERE id = $1 AND deleted_at IS NULL", PROVIDER_COLUMNS);
        let row = sqlx::query_as::<_, ProviderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let provider = row.into_domain()?;
        let services = self.list_services(id).await?;
        Ok(Some(ProviderDetail { provider, services }))
    }

    async fn list_providers(&self, filter: &ProviderFilter, page: &PageRequest) -> RepoResult<Page<Provider>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM providers");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(format!("SELECT {} FROM providers", PROVIDER_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let providers = qb
            .build_query_as::<ProviderRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(ProviderRow::into_domain)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(providers, total, page))
    }

    async fn update_provider(&self, id: Uuid, input: &ProviderInput) -> RepoResult<Provider> {
        let sql = format!(
            r#"UPDATE providers SET
                   name = $2, provider_type = $3, contact_name = $4, email = $5, phone = $6,
                   address = $7, notes = $8, is_active = $9, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            PROVIDER_COLUMNS
        );
        sqlx::query_as::<_, ProviderRow>(&sql)
            .bind(id)
            .bind(input.name.trim())
            .bind(input.provider_type.as_str())
            .bind(blank_to_none(input.contact_name.as_deref()))
            .bind(blank_to_none(input.email.as_deref()))
            .bind(blank_to_none(input.phone.as_deref()))
            .bind(blank_to_none(input.address.as_deref()))
            .bind(blank_to_none(input.notes.as_deref()))
            .bind(input.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("provider", id))?
            .into_domain()
    }

    async fn delete_provider(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (in_use,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS (
                   SELECT 1 FROM template_services ts
                   JOIN services s ON s.id = ts.service_id
                   JOIN tour_templates t ON t.id = ts.template_id
                   WHERE s.provider_id = $1 AND s.deleted_at IS NULL AND t.deleted_at IS NULL
               )"#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if in_use {
            return Err(RepositoryError::Conflict(
                "provider services are costed into tour templates".into(),
            ));
        }

        let result = sqlx::query(
            "UPDATE providers SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("provider", id));
        }

        sqlx::query("UPDATE services SET deleted_at = NOW(), updated_at = NOW() WHERE provider_id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn create_service(&self, provider_id: Uuid, input: &ServiceInput) -> RepoResult<Service> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM providers WHERE id = $1 AND deleted_at IS NULL")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(RepositoryError::not_found("provider", provider_id));
        }

        let sql = format!(
            r#"INSERT INTO services (id, provider_id, name, description, unit_price_cents, pricing_unit, is_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {}"#,
            SERVICE_COLUMNS
        );
        sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(provider_id)
            .bind(input.name.trim())
            .bind(blank_to_none(input.description.as_deref()))
            .bind(input.unit_price_cents)
            .bind(input.pricing_unit.as_str())
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .into_domain()
    }

    async fn list_services(&self, provider_id: Uuid) -> RepoResult<Vec<Service>> {
        let sql = format!(
            "SELECT {} FROM services WHERE provider_id = $1 AND deleted_at IS NULL ORDER BY name",
            SERVICE_COLUMNS
        );
        sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(ServiceRow::into_domain)
            .collect()
    }

    async fn update_service(&self, id: Uuid, input: &ServiceInput) -> RepoResult<Service> {
        let sql = format!(
            r#"UPDATE services SET
                   name = $2, description = $3, unit_price_cents = $4, pricing_unit = $5,
                   is_active = $6, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            SERVICE_COLUMNS
        );
        sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id)
            .bind(input.name.trim())
            .bind(blank_to_none(input.description.as_deref()))
            .bind(input.unit_price_cents)
            .bind(input.pricing_unit.as_str())
            .bind(input.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("service", id))?
            .into_domain()
    }

    async fn delete_service(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            "UPDATE services SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("service", id));
        }

        // Drop the service from template costings so estimates stop counting it.
        sqlx::query("DELETE FROM template_services WHERE service_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
