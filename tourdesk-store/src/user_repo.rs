use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tourdesk_core::identity::{ensure_admin_remains, normalize_email, NewUser, Role, User, UserUpdate};
use tourdesk_core::repository::{RepoResult, RepositoryError, UserRepository};
use tourdesk_core::views::{like_pattern, UserFilter};
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::rows::{conflict_as, db_err, UserRow, USER_COLUMNS};

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

async fn count_active_admins(conn: &mut sqlx::PgConnection) -> RepoResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active AND deleted_at IS NULL",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(count)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, input: &NewUser, password_hash: &str) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, role) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.name.trim())
            .bind(normalize_email(&input.email))
            .bind(password_hash)
            .bind(input.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_as("email already in use"))?;
        row.into_domain()
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(UserRow::into_domain)
            .transpose()
    }

    async fn find_credentials(&self, email: &str) -> RepoResult<Option<(User, String)>> {
        let sql = format!(
            "SELECT {}, password_hash FROM users WHERE LOWER(email) = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some((row.user.into_domain()?, row.password_hash))),
            None => Ok(None),
        }
    }

    async fn list_users(&self, filter: &UserFilter, page: &PageRequest) -> RepoResult<Page<User>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let users = qb
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(UserRow::into_domain)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(users, total, page))
    }

    async fn list_guides(&self) -> RepoResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = $1 AND is_active AND deleted_at IS NULL ORDER BY name",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(Role::Guide.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(UserRow::into_domain)
            .collect()
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate, password_hash: Option<String>) -> RepoResult<User> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("user", id))?
            .into_domain()?;

        if update.removes_admin(&user) {
            ensure_admin_remains(count_active_admins(&mut tx).await?)?;
        }

        let sql = format!(
            r#"UPDATE users SET
                   name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   password_hash = COALESCE($4, password_hash),
                   role = COALESCE($5, role),
                   is_active = COALESCE($6, is_active),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(update.name.as_deref().map(str::trim))
            .bind(update.email.as_deref().map(normalize_email))
            .bind(password_hash)
            .bind(update.role.map(|r| r.as_str()))
            .bind(update.is_active)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_as("email already in use"))?;

        tx.commit().await.map_err(db_err)?;
        row.into_domain()
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("user", id))?
            .into_domain()?;

        if user.role == Role::Admin && user.is_active {
            ensure_admin_remains(count_active_admins(&mut tx).await?)?;
        }

        sqlx::query("UPDATE users SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        // A deleted guide no longer holds open assignments.
        sqlx::query("DELETE FROM trip_assignments WHERE guide_id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn count_users(&self) -> RepoResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count)
    }
}
