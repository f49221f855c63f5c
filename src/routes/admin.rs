use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, hash_password, new_id, AuthUser},
    booking,
    db::{self, fetch_appointment_detail},
    error::{conflict_on_unique, ApiError},
    loyalty,
    models::{
        AppointmentDetailRow, RecurringBookingRow, SettingRow, TimeOffRow,
        ROLE_ADMIN, ROLE_CLIENT, ROLE_MANAGER, ROLE_STAFF, ROLE_VIP, STATUS_COMPLETED,
        TIME_OFF_APPROVED, TIME_OFF_DECLINED, TIME_OFF_PENDING,
    },
    notify,
    recurring::{self, NewRecurringBooking},
    state::{AppState, ServerEvent},
};

#[derive(Deserialize)]
struct AppointmentFilter {
    status: Option<String>,
}

#[derive(Deserialize)]
struct AppointmentUpdateForm {
    status: Option<String>,
    staff_id: Option<String>,
    appointment_date: Option<String>,
    appointment_time: Option<String>,
}

#[derive(Deserialize)]
struct TimeOffReviewForm {
    status: String,
    review_notes: Option<String>,
}

#[derive(Deserialize)]
struct UserFilter {
    role: Option<String>,
}

#[derive(Deserialize)]
struct RoleForm {
    role: String,
}

#[derive(Deserialize)]
struct StaffCreateForm {
    email: String,
    display_name: String,
    password: String,
    tier: String,
    price_multiplier: f64,
}

#[derive(Deserialize)]
struct SettingForm {
    key: String,
    value: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(
                web::resource("/appointments/{id}")
                    .route(web::get().to(appointment_detail))
                    .route(web::post().to(update_appointment)),
            )
            .service(
                web::resource("/recurring")
                    .route(web::get().to(list_recurring))
                    .route(web::post().to(create_recurring)),
            )
            .service(web::resource("/recurring/{id}/pause").route(web::post().to(pause_recurring)))
            .service(
                web::resource("/recurring/{id}/resume").route(web::post().to(resume_recurring)),
            )
            .service(
                web::resource("/recurring/{id}").route(web::delete().to(delete_recurring)),
            )
            .service(web::resource("/time-off").route(web::get().to(list_time_off)))
            .service(
                web::resource("/time-off/{id}/review").route(web::post().to(review_time_off)),
            )
            .service(web::resource("/users").route(web::get().to(list_users)))
            .service(web::resource("/users/{id}/role").route(web::post().to(set_role)))
            .service(web::resource("/staff").route(web::post().to(create_staff)))
            .service(
                web::resource("/settings")
                    .route(web::get().to(list_settings))
                    .route(web::post().to(save_setting)),
            ),
    );
}

async fn dashboard(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut counts = serde_json::Map::new();
    for status in ["pending", "confirmed", "completed", "cancelled"] {
        let value =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM appointments WHERE status = ?")
                .bind(status)
                .fetch_one(&state.db)
                .await?;
        counts.insert(status.to_string(), value.into());
    }

    let revenue = sqlx::query_scalar::<_, f64>(
        "SELECT COALESCE(SUM(total_price), 0.0) FROM appointments WHERE status = ?",
    )
    .bind(STATUS_COMPLETED)
    .fetch_one(&state.db)
    .await?;

    let weekly = sqlx::query_as::<_, (String, i64, f64)>(
        r#"SELECT strftime('%Y-%W', appointment_date) AS week,
                  COUNT(*) AS appointments,
                  COALESCE(SUM(total_price), 0.0) AS revenue
           FROM appointments
           WHERE status = ?
           GROUP BY week
           ORDER BY week DESC
           LIMIT 8"#,
    )
    .bind(STATUS_COMPLETED)
    .fetch_all(&state.db)
    .await?;

    let weekly: Vec<_> = weekly
        .into_iter()
        .map(|(week, appointments, revenue)| {
            json!({ "week": week, "appointments": appointments, "revenue": revenue })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "counts": counts,
        "completed_revenue": revenue,
        "weekly": weekly,
    })))
}

async fn list_appointments(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> Result<HttpResponse, ApiError> {
    let base = r#"SELECT a.id, a.user_id, u.display_name AS client_name,
                  a.service_id, sv.name AS service_name,
                  a.staff_id, st.name AS staff_name,
                  a.appointment_date, a.appointment_time,
                  a.total_price, a.discount_applied, a.discount_type,
                  a.status, a.can_reschedule, a.recurring_booking_id
           FROM appointments a
           JOIN users u ON a.user_id = u.id
           JOIN services sv ON a.service_id = sv.id
           JOIN staff st ON a.staff_id = st.id"#;

    let rows = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => {
            sqlx::query_as::<_, AppointmentDetailRow>(&format!(
                "{base} WHERE a.status = ? ORDER BY a.appointment_date DESC, a.appointment_time"
            ))
            .bind(status)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, AppointmentDetailRow>(&format!(
                "{base} ORDER BY a.appointment_date DESC, a.appointment_time"
            ))
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(HttpResponse::Ok().json(rows))
}

async fn appointment_detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = path.into_inner();
    let detail = fetch_appointment_detail(&state.db, &appointment_id)
        .await
        .ok_or(ApiError::NotFound("appointment"))?;
    Ok(HttpResponse::Ok().json(detail))
}

async fn update_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<AppointmentUpdateForm>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = path.into_inner();
    let row = booking::fetch_appointment(&state.db, &appointment_id).await?;

    if let Some(staff_id) = form.staff_id.as_deref().filter(|s| !s.trim().is_empty()) {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM staff WHERE id = ?")
            .bind(staff_id)
            .fetch_one(&state.db)
            .await?;
        if exists == 0 {
            return Err(ApiError::NotFound("staff"));
        }
        sqlx::query("UPDATE appointments SET staff_id = ? WHERE id = ?")
            .bind(staff_id)
            .bind(&appointment_id)
            .execute(&state.db)
            .await
            .map_err(|err| conflict_on_unique(err, "This time slot is already booked."))?;
    }

    if let (Some(date), Some(time)) = (
        form.appointment_date.as_deref().filter(|s| !s.trim().is_empty()),
        form.appointment_time.as_deref().filter(|s| !s.trim().is_empty()),
    ) {
        recurring::parse_date(date, "appointment_date")?;
        sqlx::query(
            "UPDATE appointments SET appointment_date = ?, appointment_time = ? WHERE id = ?",
        )
        .bind(date)
        .bind(time)
        .bind(&appointment_id)
        .execute(&state.db)
        .await
        .map_err(|err| conflict_on_unique(err, "This time slot is already booked."))?;
    }

    if let Some(status) = form.status.as_deref().filter(|s| !s.trim().is_empty()) {
        booking::transition_status(&state.db, &row, status).await?;

        if status == STATUS_COMPLETED {
            loyalty::record_completion(&state.db, &row.user_id).await?;
        }

        notify::notify_user(
            &state,
            &row.user_id,
            "appointment_updated",
            "Appointment updated",
            &format!("Your appointment is now {status}."),
        )
        .await;
    }

    if let Some(detail) = fetch_appointment_detail(&state.db, &appointment_id).await {
        let _ = state
            .events
            .send(ServerEvent::from_appointment("appointment_updated", detail));
    }

    let updated = booking::fetch_appointment(&state.db, &appointment_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "appointment_id": updated.id,
        "status": updated.status,
        "staff_id": updated.staff_id,
        "appointment_date": updated.appointment_date,
        "appointment_time": updated.appointment_time,
    })))
}

async fn create_recurring(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<NewRecurringBooking>,
) -> Result<HttpResponse, ApiError> {
    let row = recurring::create_with_children(&state.db, &form).await?;

    log::info!(
        "{} created recurring series {} ({} appointments)",
        auth.display_name,
        row.id,
        row.total_appointments_generated
    );

    notify::notify_user(
        &state,
        &row.user_id,
        "recurring_created",
        "Recurring appointments booked",
        &format!(
            "Your {} series is confirmed ({} visits).",
            row.frequency, row.total_appointments_generated
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(row))
}

async fn list_recurring(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, RecurringBookingRow>(
        r#"SELECT id, user_id, service_id, staff_id, start_date, end_date, frequency,
                  appointment_time, is_active, total_appointments_generated, created_at
           FROM recurring_bookings
           ORDER BY created_at DESC"#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn set_recurring_active(
    state: &AppState,
    recurring_id: &str,
    is_active: i64,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("UPDATE recurring_bookings SET is_active = ? WHERE id = ?")
        .bind(is_active)
        .bind(recurring_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("recurring booking"));
    }

    Ok(HttpResponse::Ok().json(json!({ "id": recurring_id, "is_active": is_active == 1 })))
}

async fn pause_recurring(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    set_recurring_active(&state, &path.into_inner(), 0).await
}

async fn resume_recurring(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    set_recurring_active(&state, &path.into_inner(), 1).await
}

/// Deletes the template only. Generated appointments keep their rows and
/// stay on the calendar.
async fn delete_recurring(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let recurring_id = path.into_inner();
    let result = sqlx::query("DELETE FROM recurring_bookings WHERE id = ?")
        .bind(&recurring_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("recurring booking"));
    }

    Ok(HttpResponse::Ok().json(json!({ "id": recurring_id, "deleted": true })))
}

async fn list_time_off(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> Result<HttpResponse, ApiError> {
    let base = r#"SELECT id, staff_id, start_date, end_date, reason, status, reviewed_by,
                  review_notes, created_at
           FROM time_off_requests"#;

    let rows = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => {
            sqlx::query_as::<_, TimeOffRow>(&format!(
                "{base} WHERE status = ? ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, TimeOffRow>(&format!("{base} ORDER BY created_at DESC"))
                .fetch_all(&state.db)
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(rows))
}

async fn review_time_off(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<TimeOffReviewForm>,
) -> Result<HttpResponse, ApiError> {
    let request_id = path.into_inner();
    let form = form.into_inner();

    if form.status != TIME_OFF_APPROVED && form.status != TIME_OFF_DECLINED {
        return Err(ApiError::validation(
            "Review status must be approved or declined.",
        ));
    }

    let row = sqlx::query_as::<_, TimeOffRow>(
        r#"SELECT id, staff_id, start_date, end_date, reason, status, reviewed_by,
                  review_notes, created_at
           FROM time_off_requests WHERE id = ?"#,
    )
    .bind(&request_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("time off request"))?;

    // pending -> approved/declined is terminal; reviews are never reopened.
    if row.status != TIME_OFF_PENDING {
        return Err(ApiError::Conflict(
            "This request has already been reviewed.".to_string(),
        ));
    }

    sqlx::query(
        "UPDATE time_off_requests SET status = ?, reviewed_by = ?, review_notes = ? WHERE id = ?",
    )
    .bind(&form.status)
    .bind(&auth.id)
    .bind(form.review_notes.as_deref())
    .bind(&request_id)
    .execute(&state.db)
    .await?;

    let staff_user = sqlx::query_scalar::<_, Option<String>>(
        "SELECT user_id FROM staff WHERE id = ?",
    )
    .bind(&row.staff_id)
    .fetch_optional(&state.db)
    .await?
    .flatten();

    if let Some(staff_user_id) = staff_user {
        notify::notify_user(
            &state,
            &staff_user_id,
            "time_off_reviewed",
            "Time off reviewed",
            &format!("Your time off request was {}.", form.status),
        )
        .await;
    }

    let _ = state
        .events
        .send(ServerEvent::time_off(&request_id, &form.status));

    Ok(HttpResponse::Ok().json(json!({ "id": request_id, "status": form.status })))
}

async fn list_users(
    state: web::Data<AppState>,
    query: web::Query<UserFilter>,
) -> Result<HttpResponse, ApiError> {
    let base = r#"SELECT id, email, display_name, role, vip_streak, referral_code, active, created_at
           FROM users"#;

    let rows = match query.role.as_deref().filter(|s| !s.is_empty()) {
        Some(role) => {
            sqlx::query_as::<_, (String, String, String, String, i64, Option<String>, i64, String)>(
                &format!("{base} WHERE role = ? ORDER BY created_at DESC"),
            )
            .bind(role)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, (String, String, String, String, i64, Option<String>, i64, String)>(
                &format!("{base} ORDER BY created_at DESC"),
            )
            .fetch_all(&state.db)
            .await?
        }
    };

    let users: Vec<_> = rows
        .into_iter()
        .map(
            |(id, email, display_name, role, vip_streak, referral_code, active, created_at)| {
                json!({
                    "id": id,
                    "email": email,
                    "display_name": display_name,
                    "role": role,
                    "vip_streak": vip_streak,
                    "referral_code": referral_code,
                    "active": active == 1,
                    "created_at": created_at,
                })
            },
        )
        .collect();

    Ok(HttpResponse::Ok().json(users))
}

async fn set_role(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<RoleForm>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let form = form.into_inner();

    let allowed = [ROLE_CLIENT, ROLE_VIP, ROLE_STAFF, ROLE_MANAGER, ROLE_ADMIN];
    if !allowed.contains(&form.role.as_str()) {
        return Err(ApiError::validation(format!("Invalid role '{}'.", form.role)));
    }

    let user = db::fetch_user(&state.db, &user_id).await?;
    if user.role == ROLE_VIP && form.role != ROLE_VIP {
        return Err(ApiError::validation("VIP status is permanent."));
    }

    sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(&form.role)
        .bind(&user_id)
        .execute(&state.db)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "id": user_id, "role": form.role })))
}

async fn create_staff(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<StaffCreateForm>,
) -> Result<HttpResponse, ApiError> {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("A valid email is required."));
    }
    if form.display_name.trim().is_empty() {
        return Err(ApiError::validation("Display name is required."));
    }
    if form.password.trim().len() < 6 {
        return Err(ApiError::validation(
            "Password must be at least 6 characters.",
        ));
    }
    if form.price_multiplier <= 0.0 {
        return Err(ApiError::validation("price_multiplier must be positive."));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| ApiError::validation("Password could not be processed."))?;
    let now = Utc::now().to_rfc3339();
    let user_id = new_id();
    let staff_id = new_id();

    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&user_id)
    .bind(&email)
    .bind(form.display_name.trim())
    .bind(ROLE_STAFF)
    .bind(password_hash)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(|err| conflict_on_unique(err, "An account with this email already exists."))?;

    sqlx::query(
        r#"INSERT INTO staff (id, user_id, name, tier, price_multiplier)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&staff_id)
    .bind(&user_id)
    .bind(form.display_name.trim())
    .bind(form.tier.trim())
    .bind(form.price_multiplier)
    .execute(&state.db)
    .await?;

    log::info!("{} created staff profile {}", auth.display_name, staff_id);

    Ok(HttpResponse::Created().json(json!({
        "staff_id": staff_id,
        "user_id": user_id,
    })))
}

async fn list_settings(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, SettingRow>(
        "SELECT key, value, updated_at FROM settings ORDER BY key",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn save_setting(
    state: web::Data<AppState>,
    form: web::Json<SettingForm>,
) -> Result<HttpResponse, ApiError> {
    if form.key.trim().is_empty() {
        return Err(ApiError::validation("Setting key is required."));
    }

    sqlx::query(
        r#"INSERT INTO settings (key, value, updated_at)
           VALUES (?, ?, ?)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
    )
    .bind(form.key.trim())
    .bind(&form.value)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
