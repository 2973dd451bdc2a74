use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tourdesk_core::identity::normalize_email;
use tourdesk_core::repository::{EmployeeRepository, RepoResult, RepositoryError};
use tourdesk_core::staff::{Employee, EmployeeInput};
use tourdesk_core::views::like_pattern;
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::rows::{blank_to_none, conflict_as, db_err};

const EMPLOYEE_COLUMNS: &str = "id, user_id, first_name, last_name, email, phone, position, department, \
     hire_date, is_active, created_at, updated_at";

pub struct PgEmployeeRepository {
    pool: PgPool,
}

impl PgEmployeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_user_exists(&self, user_id: Option<Uuid>) -> RepoResult<()> {
        let Some(user_id) = user_id else {
            return Ok(());
        };
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        found
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found("user", user_id))
    }
}

#[derive(sqlx::FromRow)]
struct EmployeeRow {
    id: Uuid,
    user_id: Option<Uuid>,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    position: String,
    department: Option<String>,
    hire_date: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            position: row.position,
            department: row.department,
            hire_date: row.hire_date,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (first_name || ' ' || last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR position ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl EmployeeRepository for PgEmployeeRepository {
    async fn create_employee(&self, input: &EmployeeInput) -> RepoResult<Employee> {
        self.ensure_user_exists(input.user_id).await?;

        let sql = format!(
            r#"INSERT INTO employees
                   (id, user_id, first_name, last_name, email, phone, position, department, hire_date, is_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.user_id)
            .bind(input.first_name.trim())
            .bind(input.last_name.trim())
            .bind(normalize_email(&input.email))
            .bind(blank_to_none(input.phone.as_deref()))
            .bind(input.position.trim())
            .bind(blank_to_none(input.department.as_deref()))
            .bind(input.hire_date)
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_as("an employee with this email already exists"))?;
        Ok(row.into())
    }

    async fn get_employee(&self, id: Uuid) -> RepoResult<Option<Employee>> {
        let sql = format!("SELECT {} FROM employees WHERE id = $1 AND deleted_at IS NULL", EMPLOYEE_COLUMNS);
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Employee::from))
    }

    async fn list_employees(&self, search: Option<&str>, page: &PageRequest) -> RepoResult<Page<Employee>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM employees");
        push_search(&mut count, search);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(format!("SELECT {} FROM employees", EMPLOYEE_COLUMNS));
        push_search(&mut qb, search);
        qb.push(" ORDER BY last_name, first_name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = qb
            .build_query_as::<EmployeeRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page::new(rows.into_iter().map(Employee::from).collect(), total, page))
    }

    async fn update_employee(&self, id: Uuid, input: &EmployeeInput) -> RepoResult<Employee> {
        self.ensure_user_exists(input.user_id).await?;

        let sql = format!(
            r#"UPDATE employees SET
                   user_id = $2, first_name = $3, last_name = $4, email = $5, phone = $6,
                   position = $7, department = $8, hire_date = $9, is_active = $10, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(id)
            .bind(input.user_id)
            .bind(input.first_name.trim())
            .bind(input.last_name.trim())
            .bind(normalize_email(&input.email))
            .bind(blank_to_none(input.phone.as_deref()))
            .bind(input.position.trim())
            .bind(blank_to_none(input.department.as_deref()))
            .bind(input.hire_date)
            .bind(input.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(conflict_as("an employee with this email already exists"))?
            .ok_or_else(|| RepositoryError::not_found("employee", id))?;
        Ok(row.into())
    }

    async fn delete_employee(&self, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE employees SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("employee", id));
        }
        Ok(())
    }
}
