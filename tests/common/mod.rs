use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use lashloft::auth::new_id;

/// One-connection pool so the in-memory database is shared across queries.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open memory db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("apply migrations");

    pool
}

pub async fn insert_user(pool: &SqlitePool, role: &str, birthday: Option<&str>) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, birthday, active, created_at)
           VALUES (?, ?, ?, ?, 'x', ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(format!("{id}@test.example"))
    .bind("Test User")
    .bind(role)
    .bind(birthday)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert user");
    id
}

pub async fn insert_service(pool: &SqlitePool, name: &str, base_price: f64) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, name, category, base_price, duration_minutes)
           VALUES (?, ?, 'test', ?, 60)"#,
    )
    .bind(&id)
    .bind(name)
    .bind(base_price)
    .execute(pool)
    .await
    .expect("insert service");
    id
}

pub async fn insert_staff(pool: &SqlitePool, name: &str, price_multiplier: f64) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO staff (id, name, tier, price_multiplier)
           VALUES (?, ?, 'senior', ?)"#,
    )
    .bind(&id)
    .bind(name)
    .bind(price_multiplier)
    .execute(pool)
    .await
    .expect("insert staff");
    id
}

pub async fn insert_completed_appointments(
    pool: &SqlitePool,
    user_id: &str,
    service_id: &str,
    staff_id: &str,
    date: &str,
    count: usize,
) {
    for n in 0..count {
        sqlx::query(
            r#"INSERT INTO appointments
               (id, user_id, service_id, staff_id, appointment_date, appointment_time,
                total_price, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 100.0, 'completed', ?)"#,
        )
        .bind(new_id())
        .bind(user_id)
        .bind(service_id)
        .bind(staff_id)
        .bind(date)
        .bind(format!("{:02}:00", 8 + n))
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("insert completed appointment");
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}
