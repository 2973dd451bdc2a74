use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use tourdesk_catalog::{
    EstimateLine, InstanceChanges, InstanceStatus, ScheduleRequest, TemplateInput, Tour, TourInput,
    TourInstance, TourTemplate,
};
use tourdesk_core::assignment::{inherit_for_instance, reconcile, AssignmentTarget, TripAssignment};
use tourdesk_core::field::ManifestEntry;
use tourdesk_core::repository::{RepoResult, RepositoryError, TourRepository};
use tourdesk_core::views::{
    like_pattern, InstanceDetail, InstanceFilter, InstanceSummary, TemplateDetail,
    TemplateServiceInput, TourDetail, TourFilter, MAX_SERVICE_QUANTITY,
};
use tourdesk_core::CoreError;
use tourdesk_shared::{Page, PageRequest};
use tracing::info;
use uuid::Uuid;

use crate::rows::{
    assignments_for, blank_to_none, booked_seats, conflict_as, db_err, lock_instance, InstanceSummaryRow,
    TemplateRow, INSTANCE_SUMMARY_SELECT, TEMPLATE_COLUMNS,
};

const TOUR_COLUMNS: &str = "id, code, name, destination, description, is_active, created_at, updated_at";

pub struct PgTourRepository {
    pool: PgPool,
}

impl PgTourRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TourRow {
    id: Uuid,
    code: String,
    name: String,
    destination: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TourRow> for Tour {
    fn from(row: TourRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            destination: row.destination,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EstimateLineRow {
    service_id: Uuid,
    name: String,
    pricing_unit: String,
    unit_price_cents: i64,
    quantity: i32,
}

impl EstimateLineRow {
    fn into_domain(self) -> RepoResult<EstimateLine> {
        Ok(EstimateLine {
            service_id: self.service_id,
            name: self.name,
            pricing_unit: self.pricing_unit.parse()?,
            unit_price_cents: self.unit_price_cents,
            quantity: self.quantity,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ManifestRow {
    passenger_id: Uuid,
    booking_id: Uuid,
    booking_reference: String,
    booking_status: String,
    first_name: String,
    last_name: String,
    date_of_birth: Option<chrono::NaiveDate>,
    nationality: Option<String>,
    is_lead: bool,
}

impl ManifestRow {
    fn into_domain(self) -> RepoResult<ManifestEntry> {
        Ok(ManifestEntry {
            passenger_id: self.passenger_id,
            booking_id: self.booking_id,
            booking_reference: self.booking_reference,
            booking_status: self.booking_status.parse()?,
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth: self.date_of_birth,
            nationality: self.nationality,
            is_lead: self.is_lead,
        })
    }
}

fn push_tour_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TourFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR code ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR destination ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_instance_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &InstanceFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND i.status = ").push_bind(status.as_str());
    }
    if let Some(template_id) = filter.template_id {
        qb.push(" AND i.template_id = ").push_bind(template_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND i.start_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND i.start_date <= ").push_bind(to);
    }
}

async fn load_template(conn: &mut PgConnection, id: Uuid, lock: bool) -> RepoResult<TourTemplate> {
    let sql = format!(
        "SELECT {} FROM tour_templates WHERE id = $1 AND deleted_at IS NULL{}",
        TEMPLATE_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, TemplateRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .map(TourTemplate::from)
        .ok_or_else(|| RepositoryError::not_found("template", id))
}

async fn estimate_lines(conn: &mut PgConnection, template_id: Uuid) -> RepoResult<Vec<EstimateLine>> {
    sqlx::query_as::<_, EstimateLineRow>(
        r#"SELECT s.id AS service_id, s.name, s.pricing_unit, s.unit_price_cents, ts.quantity
           FROM template_services ts
           JOIN services s ON s.id = ts.service_id
           WHERE ts.template_id = $1 AND s.deleted_at IS NULL
           ORDER BY s.name"#,
    )
    .bind(template_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?
    .into_iter()
    .map(EstimateLineRow::into_domain)
    .collect()
}

async fn insert_assignment(conn: &mut PgConnection, assignment: &TripAssignment) -> RepoResult<()> {
    sqlx::query(
        r#"INSERT INTO trip_assignments
               (id, guide_id, template_id, tour_instance_id, status, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(assignment.id)
    .bind(assignment.guide_id)
    .bind(assignment.template_id)
    .bind(assignment.tour_instance_id)
    .bind(assignment.status.as_str())
    .bind(assignment.created_at)
    .bind(assignment.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn target_column(target: AssignmentTarget) -> (&'static str, Uuid) {
    match target {
        AssignmentTarget::Template(id) => ("template_id", id),
        AssignmentTarget::Instance(id) => ("tour_instance_id", id),
    }
}

/// Every id must be an active guide account.
async fn ensure_guides(conn: &mut PgConnection, guide_ids: &[Uuid]) -> RepoResult<()> {
    let wanted: HashSet<Uuid> = guide_ids.iter().copied().collect();
    if wanted.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = wanted.iter().copied().collect();
    let found: Vec<(Uuid,)> = sqlx::query_as(
        r#"SELECT id FROM users
           WHERE id = ANY($1) AND role = 'guide' AND is_active AND deleted_at IS NULL"#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    let found: HashSet<Uuid> = found.into_iter().map(|(id,)| id).collect();
    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        return Err(CoreError::ValidationError(format!("{} is not an active guide", missing)).into());
    }
    Ok(())
}

#[async_trait]
impl TourRepository for PgTourRepository {
    async fn create_tour(&self, input: &TourInput) -> RepoResult<Tour> {
        let sql = format!(
            r#"INSERT INTO tours (id, code, name, destination, description, is_active)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            TOUR_COLUMNS
        );
        let row = sqlx::query_as::<_, TourRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.normalized_code())
            .bind(input.name.trim())
            .bind(input.destination.trim())
            .bind(blank_to_none(input.description.as_deref()))
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_as("tour code already exists"))?;
        Ok(row.into())
    }

    async fn get_tour(&self, id: Uuid) -> RepoResult<Option<TourDetail>> {
        let sql = format!("SELECT {} FROM tours WHERE id = $1 AND deleted_at IS NULL", TOUR_COLUMNS);
        let row = sqlx::query_as::<_, TourRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM tour_templates WHERE tour_id = $1 AND deleted_at IS NULL ORDER BY title",
            TEMPLATE_COLUMNS
        );
        let templates = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(TourTemplate::from)
            .collect();

        Ok(Some(TourDetail { tour: row.into(), templates }))
    }

    async fn list_tours(&self, filter: &TourFilter, page: &PageRequest) -> RepoResult<Page<Tour>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM tours");
        push_tour_filter(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(format!("SELECT {} FROM tours", TOUR_COLUMNS));
        push_tour_filter(&mut qb, filter);
        qb.push(" ORDER BY name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = qb
            .build_query_as::<TourRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page::new(rows.into_iter().map(Tour::from).collect(), total, page))
    }

    async fn update_tour(&self, id: Uuid, input: &TourInput) -> RepoResult<Tour> {
        let sql = format!(
            r#"UPDATE tours SET
                   code = $2, name = $3, destination = $4, description = $5, is_active = $6,
                   updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            TOUR_COLUMNS
        );
        let row = sqlx::query_as::<_, TourRow>(&sql)
            .bind(id)
            .bind(input.normalized_code())
            .bind(input.name.trim())
            .bind(input.destination.trim())
            .bind(blank_to_none(input.description.as_deref()))
            .bind(input.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(conflict_as("tour code already exists"))?
            .ok_or_else(|| RepositoryError::not_found("tour", id))?;
        Ok(row.into())
    }

    async fn delete_tour(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (has_templates,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM tour_templates WHERE tour_id = $1 AND deleted_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if has_templates {
            return Err(RepositoryError::Conflict("tour still has templates".into()));
        }

        let result = sqlx::query(
            "UPDATE tours SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("tour", id));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn create_template(&self, tour_id: Uuid, input: &TemplateInput) -> RepoResult<TourTemplate> {
        let tour: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tours WHERE id = $1 AND deleted_at IS NULL")
            .bind(tour_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if tour.is_none() {
            return Err(RepositoryError::not_found("tour", tour_id));
        }

        let sql = format!(
            r#"INSERT INTO tour_templates
                   (id, tour_id, title, duration_days, itinerary, base_price_cents, default_capacity, margin)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {}"#,
            TEMPLATE_COLUMNS
        );
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(tour_id)
            .bind(input.title.trim())
            .bind(input.duration_days)
            .bind(Json(input.sorted_itinerary()))
            .bind(input.base_price_cents)
            .bind(input.default_capacity)
            .bind(input.margin)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn get_template(&self, id: Uuid) -> RepoResult<Option<TemplateDetail>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let template = match load_template(&mut conn, id, false).await {
            Ok(template) => template,
            Err(RepositoryError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let (tour_name,): (String,) = sqlx::query_as("SELECT name FROM tours WHERE id = $1")
            .bind(template.tour_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
        let services = estimate_lines(&mut conn, id).await?;
        let guides = assignments_for(&mut conn, "template_id", id).await?;

        Ok(Some(TemplateDetail { template, tour_name, services, guides }))
    }

    async fn update_template(&self, id: Uuid, input: &TemplateInput) -> RepoResult<TourTemplate> {
        let sql = format!(
            r#"UPDATE tour_templates SET
                   title = $2, duration_days = $3, itinerary = $4, base_price_cents = $5,
                   default_capacity = $6, margin = $7, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            TEMPLATE_COLUMNS
        );
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(id)
            .bind(input.title.trim())
            .bind(input.duration_days)
            .bind(Json(input.sorted_itinerary()))
            .bind(input.base_price_cents)
            .bind(input.default_capacity)
            .bind(input.margin)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("template", id))?;
        Ok(row.into())
    }

    async fn delete_template(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        load_template(&mut tx, id, true).await?;

        let (has_instances,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM tour_instances WHERE template_id = $1 AND deleted_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if has_instances {
            return Err(RepositoryError::Conflict("template still has departures".into()));
        }

        sqlx::query("UPDATE tour_templates SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM trip_assignments WHERE template_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn set_template_services(
        &self,
        template_id: Uuid,
        lines: &[TemplateServiceInput],
    ) -> RepoResult<Vec<EstimateLine>> {
        let mut seen = HashSet::new();
        for line in lines {
            if !(1..=MAX_SERVICE_QUANTITY).contains(&line.quantity) {
                return Err(CoreError::ValidationError(format!(
                    "service quantity must be between 1 and {}",
                    MAX_SERVICE_QUANTITY
                ))
                .into());
            }
            if !seen.insert(line.service_id) {
                return Err(CoreError::ValidationError(format!("service {} listed twice", line.service_id)).into());
            }
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        load_template(&mut tx, template_id, true).await?;

        let ids: Vec<Uuid> = lines.iter().map(|l| l.service_id).collect();
        let (live,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM services WHERE id = ANY($1) AND is_active AND deleted_at IS NULL",
        )
        .bind(&ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if live != ids.len() as i64 {
            return Err(CoreError::ValidationError("every service must exist and be active".into()).into());
        }

        sqlx::query("DELETE FROM template_services WHERE template_id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for line in lines {
            sqlx::query("INSERT INTO template_services (template_id, service_id, quantity) VALUES ($1, $2, $3)")
                .bind(template_id)
                .bind(line.service_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        let result = estimate_lines(&mut tx, template_id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(result)
    }

    async fn set_guides(&self, target: AssignmentTarget, guide_ids: &[Uuid]) -> RepoResult<Vec<TripAssignment>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        match target {
            AssignmentTarget::Template(id) => {
                load_template(&mut tx, id, true).await?;
            }
            AssignmentTarget::Instance(id) => {
                lock_instance(&mut tx, id).await?.ensure_open()?;
            }
        }
        ensure_guides(&mut tx, guide_ids).await?;

        let (column, target_id) = target_column(target);
        let existing = assignments_for(&mut tx, column, target_id).await?;
        let plan = reconcile(&existing, guide_ids);

        if !plan.remove.is_empty() {
            sqlx::query("DELETE FROM trip_assignments WHERE id = ANY($1)")
                .bind(&plan.remove)
                .execute(&mut *tx)
                .await
                .map_err(conflict_as("a removed guide already recorded check-ins or notes"))?;
        }
        for guide_id in &plan.add {
            insert_assignment(&mut tx, &TripAssignment::new(*guide_id, target)).await?;
        }

        let result = assignments_for(&mut tx, column, target_id).await?;
        tx.commit().await.map_err(db_err)?;

        info!(
            "Guides reconciled for {} {}: {} kept, {} added, {} removed",
            column,
            target_id,
            plan.keep.len(),
            plan.add.len(),
            plan.remove.len()
        );
        Ok(result)
    }

    async fn schedule_instance(&self, template_id: Uuid, req: ScheduleRequest) -> RepoResult<InstanceDetail> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let template = load_template(&mut tx, template_id, true).await?;
        let instance = TourInstance::schedule(&template, req)?;

        sqlx::query(
            r#"INSERT INTO tour_instances
                   (id, template_id, start_date, end_date, capacity, price_override_cents, status, notes,
                    created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(instance.id)
        .bind(instance.template_id)
        .bind(instance.start_date)
        .bind(instance.end_date)
        .bind(instance.capacity)
        .bind(instance.price_override_cents)
        .bind(instance.status.as_str())
        .bind(blank_to_none(instance.notes.as_deref()))
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let template_guides = assignments_for(&mut tx, "template_id", template_id).await?;
        for assignment in inherit_for_instance(&template_guides, instance.id) {
            insert_assignment(&mut tx, &assignment).await?;
        }

        tx.commit().await.map_err(db_err)?;
        info!("Departure {} scheduled from template {} on {}", instance.id, template_id, instance.start_date);

        self.get_instance(instance.id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("departure", instance.id))
    }

    async fn get_instance(&self, id: Uuid) -> RepoResult<Option<InstanceDetail>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let sql = format!("{} AND i.id = $1", INSTANCE_SUMMARY_SELECT);
        let row = sqlx::query_as::<_, InstanceSummaryRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let summary = row.into_domain()?;
        let guides = assignments_for(&mut conn, "tour_instance_id", id).await?;
        Ok(Some(InstanceDetail { summary, guides }))
    }

    async fn list_instances(&self, filter: &InstanceFilter, page: &PageRequest) -> RepoResult<Page<InstanceSummary>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM tour_instances i WHERE i.deleted_at IS NULL");
        push_instance_filter(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(INSTANCE_SUMMARY_SELECT);
        push_instance_filter(&mut qb, filter);
        qb.push(" ORDER BY i.start_date, tr.name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let summaries = qb
            .build_query_as::<InstanceSummaryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(InstanceSummaryRow::into_domain)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(summaries, total, page))
    }

    async fn update_instance(&self, id: Uuid, changes: InstanceChanges) -> RepoResult<TourInstance> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut instance = lock_instance(&mut tx, id).await?;
        let seats = booked_seats(&mut tx, id).await?;
        instance.apply(changes, seats)?;

        sqlx::query(
            r#"UPDATE tour_instances SET
                   start_date = $2, end_date = $3, capacity = $4, price_override_cents = $5,
                   notes = $6, updated_at = $7
               WHERE id = $1"#,
        )
        .bind(instance.id)
        .bind(instance.start_date)
        .bind(instance.end_date)
        .bind(instance.capacity)
        .bind(instance.price_override_cents)
        .bind(&instance.notes)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(instance)
    }

    async fn change_instance_status(&self, id: Uuid, next: InstanceStatus) -> RepoResult<(TourInstance, u64)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut instance = lock_instance(&mut tx, id).await?;
        instance.transition(next)?;

        sqlx::query("UPDATE tour_instances SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(instance.id)
            .bind(instance.status.as_str())
            .bind(instance.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        // transition() only lets completed and cancelled through.
        let bookings = if next == InstanceStatus::Cancelled {
            r#"UPDATE bookings SET status = 'cancelled', updated_at = NOW()
               WHERE tour_instance_id = $1 AND deleted_at IS NULL
                 AND status IN ('pending', 'confirmed')"#
        } else {
            r#"UPDATE bookings SET status = 'completed', updated_at = NOW()
               WHERE tour_instance_id = $1 AND deleted_at IS NULL AND status = 'confirmed'"#
        };
        let affected = sqlx::query(bookings)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        tx.commit().await.map_err(db_err)?;
        info!("Departure {} is now {}; {} bookings followed", id, next, affected);
        Ok((instance, affected))
    }

    async fn delete_instance(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_instance(&mut tx, id).await?;

        let (has_bookings,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS (SELECT 1 FROM bookings
                              WHERE tour_instance_id = $1 AND deleted_at IS NULL AND status <> 'cancelled')"#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if has_bookings {
            return Err(RepositoryError::Conflict("departure still has active bookings".into()));
        }

        sqlx::query("UPDATE tour_instances SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM trip_assignments WHERE tour_instance_id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn manifest(&self, instance_id: Uuid) -> RepoResult<Vec<ManifestEntry>> {
        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM tour_instances WHERE id = $1 AND deleted_at IS NULL")
                .bind(instance_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        if exists.is_none() {
            return Err(RepositoryError::not_found("departure", instance_id));
        }

        sqlx::query_as::<_, ManifestRow>(
            r#"SELECT p.id AS passenger_id, b.id AS booking_id, b.reference AS booking_reference,
                      b.status AS booking_status, p.first_name, p.last_name, p.date_of_birth,
                      p.nationality, p.is_lead
               FROM passengers p
               JOIN bookings b ON b.id = p.booking_id
               WHERE b.tour_instance_id = $1
                 AND b.deleted_at IS NULL AND p.deleted_at IS NULL
                 AND b.status <> 'cancelled'
               ORDER BY b.reference, p.is_lead DESC, p.last_name, p.first_name"#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(ManifestRow::into_domain)
        .collect()
    }
}
