use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::{AppointmentDetailRow, StaffRow, UserRow, ROLE_ADMIN, ROLE_STAFF},
};

pub const SETTING_DEPOSIT_AMOUNT: &str = "deposit_amount";
pub const DEFAULT_DEPOSIT_AMOUNT: f64 = 20.0;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_services(pool).await?;
    seed_staff(pool).await?;
    Ok(())
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing =
        sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
            .bind(ROLE_ADMIN)
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@lashloft.example".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name = env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Studio Owner".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash =
        hash_password(&password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(email)
    .bind(display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Pricing reference data. Seeded once; the booking flow treats it as
/// immutable afterwards.
async fn seed_services(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM services")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let services: &[(&str, &str, f64, i64)] = &[
        ("Natural Full Set", "full-set", 120.0, 120),
        ("Hybrid Full Set", "full-set", 140.0, 135),
        ("Volume Full Set", "full-set", 160.0, 150),
        ("Mega Volume Full Set", "full-set", 190.0, 165),
        ("Lash Refill", "refill", 65.0, 60),
        ("Volume Refill", "refill", 80.0, 75),
        ("Lash Lift & Tint", "treatment", 95.0, 60),
        ("Brow Lamination", "brow", 85.0, 45),
    ];

    for (name, category, base_price, duration) in services {
        sqlx::query(
            r#"INSERT INTO services (id, name, category, base_price, duration_minutes)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(new_id())
        .bind(name)
        .bind(category)
        .bind(base_price)
        .bind(duration)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_staff(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let staff_seed = env::var("SEED_STAFF").unwrap_or_else(|_| "false".to_string());
    if staff_seed != "true" {
        return Ok(());
    }

    let exists = sqlx::query_as::<_, (String,)>("SELECT id FROM staff LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(());
    }

    let email = env::var("STAFF_EMAIL").unwrap_or_else(|_| "artist@lashloft.example".to_string());
    let password = env::var("STAFF_PASSWORD").unwrap_or_else(|_| "change-me".to_string());
    let display_name = env::var("STAFF_DISPLAY_NAME").unwrap_or_else(|_| "Lash Artist One".to_string());
    if password == "change-me" {
        log::warn!("STAFF_PASSWORD not set. Using default password 'change-me'. Set STAFF_PASSWORD in production.");
    }

    let password_hash =
        hash_password(&password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();
    let user_id = new_id();

    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&user_id)
    .bind(email)
    .bind(&display_name)
    .bind(ROLE_STAFF)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"INSERT INTO staff (id, user_id, name, tier, price_multiplier)
           VALUES (?, ?, ?, 'senior', 1.0)"#,
    )
    .bind(new_id())
    .bind(&user_id)
    .bind(&display_name)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_appointment_detail(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Option<AppointmentDetailRow> {
    sqlx::query_as::<_, AppointmentDetailRow>(
        r#"SELECT a.id, a.user_id, u.display_name AS client_name,
                  a.service_id, sv.name AS service_name,
                  a.staff_id, st.name AS staff_name,
                  a.appointment_date, a.appointment_time,
                  a.total_price, a.discount_applied, a.discount_type,
                  a.status, a.can_reschedule, a.recurring_booking_id
           FROM appointments a
           JOIN users u ON a.user_id = u.id
           JOIN services sv ON a.service_id = sv.id
           JOIN staff st ON a.staff_id = st.id
           WHERE a.id = ?
           LIMIT 1"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await
    .unwrap_or(None)
}

pub async fn fetch_user(pool: &SqlitePool, user_id: &str) -> Result<UserRow, crate::error::ApiError> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, display_name, role, password_hash, birthday, vip_streak,
                  referral_code, referred_by, active, created_at
           FROM users WHERE id = ?"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(crate::error::ApiError::Db)?
    .ok_or(crate::error::ApiError::NotFound("user"))
}

pub async fn staff_for_user(pool: &SqlitePool, user_id: &str) -> Option<StaffRow> {
    sqlx::query_as::<_, StaffRow>(
        "SELECT id, user_id, name, tier, price_multiplier FROM staff WHERE user_id = ? LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .unwrap_or(None)
}

pub async fn setting(pool: &SqlitePool, key: &str) -> Option<String> {
    sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .unwrap_or(None)
}

pub async fn deposit_amount(pool: &SqlitePool) -> f64 {
    setting(pool, SETTING_DEPOSIT_AMOUNT)
        .await
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(DEFAULT_DEPOSIT_AMOUNT)
}
