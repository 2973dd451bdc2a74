use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use tourdesk_core::repository::{RepoResult, ReportRepository};
use tourdesk_core::views::{DashboardSummary, UpcomingDeparture};
use uuid::Uuid;

use crate::rows::db_err;

pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UpcomingRow {
    id: Uuid,
    tour_name: String,
    template_title: String,
    start_date: NaiveDate,
    capacity: i32,
    booked_seats: i32,
    unconfirmed_guides: i64,
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn dashboard(&self, today: NaiveDate, upcoming_days: i64) -> RepoResult<DashboardSummary> {
        let horizon = today + Duration::days(upcoming_days.max(0));

        let upcoming = sqlx::query_as::<_, UpcomingRow>(
            r#"SELECT i.id, tr.name AS tour_name, t.title AS template_title, i.start_date, i.capacity,
                      COALESCE((SELECT SUM(b.passenger_count) FROM bookings b
                                WHERE b.tour_instance_id = i.id
                                  AND b.deleted_at IS NULL
                                  AND b.status <> 'cancelled'), 0)::INT AS booked_seats,
                      (SELECT COUNT(*) FROM trip_assignments a
                       WHERE a.tour_instance_id = i.id AND a.status <> 'confirmed') AS unconfirmed_guides
               FROM tour_instances i
               JOIN tour_templates t ON t.id = i.template_id
               JOIN tours tr ON tr.id = t.tour_id
               WHERE i.deleted_at IS NULL
                 AND i.status = 'scheduled'
                 AND i.start_date BETWEEN $1 AND $2
               ORDER BY i.start_date, tr.name"#,
        )
        .bind(today)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let (pending_bookings,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE deleted_at IS NULL AND status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let (revenue_this_month_cents,): (i64,) = sqlx::query_as(
            r#"SELECT COALESCE(SUM(p.amount_cents), 0)::BIGINT
               FROM payments p
               JOIN bookings b ON b.id = p.booking_id
               WHERE b.deleted_at IS NULL
                 AND p.status = 'completed'
                 AND p.paid_at >= $1::date
                 AND p.paid_at < ($2::date + 1)"#,
        )
        .bind(month_start(today))
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        // Overpaid bookings count as settled, not as negative balance.
        let (outstanding_balance_cents,): (i64,) = sqlx::query_as(
            r#"SELECT COALESCE(SUM(GREATEST(b.total_cents - COALESCE(paid.amount, 0), 0)), 0)::BIGINT
               FROM bookings b
               LEFT JOIN (
                   SELECT booking_id, SUM(amount_cents) AS amount
                   FROM payments WHERE status = 'completed'
                   GROUP BY booking_id
               ) paid ON paid.booking_id = b.id
               WHERE b.deleted_at IS NULL AND b.status IN ('pending', 'confirmed')"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let (pending_assignments,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM trip_assignments a
               LEFT JOIN tour_instances i ON i.id = a.tour_instance_id
               LEFT JOIN tour_templates t ON t.id = a.template_id
               WHERE a.status = 'pending'
                 AND (i.id IS NULL OR (i.deleted_at IS NULL AND i.status = 'scheduled'))
                 AND (t.id IS NULL OR t.deleted_at IS NULL)"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(DashboardSummary {
            upcoming_departures: upcoming
                .into_iter()
                .map(|row| UpcomingDeparture {
                    tour_instance_id: row.id,
                    tour_name: row.tour_name,
                    template_title: row.template_title,
                    start_date: row.start_date,
                    capacity: row.capacity,
                    booked_seats: row.booked_seats,
                    unconfirmed_guides: row.unconfirmed_guides,
                })
                .collect(),
            pending_bookings,
            revenue_this_month_cents,
            outstanding_balance_cents,
            pending_assignments,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_start_is_first_day() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 17).unwrap();
        assert_eq!(month_start(day), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }
}
