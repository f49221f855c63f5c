use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, staff_validator, AuthUser},
    booking,
    db::{self, fetch_appointment_detail},
    error::ApiError,
    loyalty, messaging,
    models::{
        AppointmentDetailRow, ConversationRow, StaffNoteRow, StaffRow, TimeOffRow,
        STATUS_COMPLETED, TIME_OFF_PENDING,
    },
    notify,
    recurring::parse_date,
    state::{AppState, ServerEvent},
};

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

#[derive(Deserialize)]
struct ScheduleQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct TimeOffForm {
    start_date: String,
    end_date: String,
    reason: String,
}

#[derive(Deserialize)]
struct NoteForm {
    note: String,
}

#[derive(Deserialize)]
struct MessageForm {
    body: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/staff-portal")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/schedule").route(web::get().to(schedule)))
            .service(
                web::resource("/appointments/{id}/status").route(web::post().to(update_status)),
            )
            .service(
                web::resource("/time-off")
                    .route(web::get().to(my_time_off))
                    .route(web::post().to(request_time_off)),
            )
            .service(
                web::resource("/clients/{id}/notes")
                    .route(web::get().to(client_notes))
                    .route(web::post().to(create_note)),
            )
            .service(
                web::resource("/notes/{id}")
                    .route(web::put().to(update_note))
                    .route(web::delete().to(delete_note)),
            )
            .service(web::resource("/conversations").route(web::get().to(my_conversations)))
            .service(
                web::resource("/conversations/{id}/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(send_message)),
            ),
    );
}

async fn require_staff(state: &AppState, auth: &AuthUser) -> Result<StaffRow, ApiError> {
    db::staff_for_user(&state.db, &auth.id)
        .await
        .ok_or(ApiError::NotFound("staff profile"))
}

async fn dashboard(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;

    let mut counts = serde_json::Map::new();
    for status in ["pending", "confirmed", "completed", "cancelled"] {
        let value = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM appointments WHERE staff_id = ? AND status = ?",
        )
        .bind(&staff.id)
        .bind(status)
        .fetch_one(&state.db)
        .await?;
        counts.insert(status.to_string(), value.into());
    }

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let todays = day_schedule(&state, &staff.id, &today).await?;

    Ok(HttpResponse::Ok().json(json!({
        "staff": staff,
        "counts": counts,
        "today": todays,
    })))
}

async fn schedule(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<ScheduleQuery>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let date = match query.date.as_deref() {
        Some(raw) => parse_date(raw, "date")?.format("%Y-%m-%d").to_string(),
        None => Utc::now().date_naive().format("%Y-%m-%d").to_string(),
    };

    let rows = day_schedule(&state, &staff.id, &date).await?;
    Ok(HttpResponse::Ok().json(json!({ "date": date, "appointments": rows })))
}

async fn day_schedule(
    state: &AppState,
    staff_id: &str,
    date: &str,
) -> Result<Vec<AppointmentDetailRow>, ApiError> {
    let rows = sqlx::query_as::<_, AppointmentDetailRow>(
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
           WHERE a.staff_id = ? AND a.appointment_date = ?
           ORDER BY a.appointment_time"#,
    )
    .bind(staff_id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;
    Ok(rows)
}

async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<StatusForm>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let appointment_id = path.into_inner();
    let form = form.into_inner();

    let row = booking::fetch_appointment(&state.db, &appointment_id).await?;
    if row.staff_id != staff.id {
        return Err(ApiError::Forbidden);
    }

    booking::transition_status(&state.db, &row, &form.status).await?;

    if form.status == STATUS_COMPLETED {
        loyalty::record_completion(&state.db, &row.user_id).await?;
    }

    notify::notify_user(
        &state,
        &row.user_id,
        "appointment_updated",
        "Appointment updated",
        &format!("Your appointment is now {}.", form.status),
    )
    .await;

    if let Some(detail) = fetch_appointment_detail(&state.db, &appointment_id).await {
        let _ = state
            .events
            .send(ServerEvent::from_appointment("appointment_updated", detail));
    }

    Ok(HttpResponse::Ok().json(json!({ "appointment_id": appointment_id, "status": form.status })))
}

async fn request_time_off(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<TimeOffForm>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;

    let start = parse_date(&form.start_date, "start_date")?;
    let end = parse_date(&form.end_date, "end_date")?;
    if end < start {
        return Err(ApiError::validation("end_date must not precede start_date"));
    }
    if form.reason.trim().is_empty() {
        return Err(ApiError::validation("A reason is required."));
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO time_off_requests
           (id, staff_id, start_date, end_date, reason, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&staff.id)
    .bind(&form.start_date)
    .bind(&form.end_date)
    .bind(form.reason.trim())
    .bind(TIME_OFF_PENDING)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    notify::notify_admins(
        &state,
        "time_off_requested",
        "Time off requested",
        &format!("{} requested time off.", staff.name),
    )
    .await;

    Ok(HttpResponse::Created().json(json!({ "id": id, "status": TIME_OFF_PENDING })))
}

async fn my_time_off(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;

    let rows = sqlx::query_as::<_, TimeOffRow>(
        r#"SELECT id, staff_id, start_date, end_date, reason, status, reviewed_by,
                  review_notes, created_at
           FROM time_off_requests WHERE staff_id = ?
           ORDER BY created_at DESC"#,
    )
    .bind(&staff.id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn client_notes(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_staff(&state, &auth).await?;
    let client_id = path.into_inner();

    let rows = sqlx::query_as::<_, StaffNoteRow>(
        r#"SELECT id, staff_id, client_id, note, created_at, updated_at
           FROM staff_notes WHERE client_id = ?
           ORDER BY created_at DESC"#,
    )
    .bind(&client_id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn create_note(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<NoteForm>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let client_id = path.into_inner();

    if form.note.trim().is_empty() {
        return Err(ApiError::validation("Note text is required."));
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(&client_id)
        .fetch_one(&state.db)
        .await?;
    if exists == 0 {
        return Err(ApiError::NotFound("client"));
    }

    let id = new_id();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO staff_notes (id, staff_id, client_id, note, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&staff.id)
    .bind(&client_id)
    .bind(form.note.trim())
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

async fn update_note(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<NoteForm>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let note_id = path.into_inner();

    if form.note.trim().is_empty() {
        return Err(ApiError::validation("Note text is required."));
    }

    let result = sqlx::query(
        "UPDATE staff_notes SET note = ?, updated_at = ? WHERE id = ? AND staff_id = ?",
    )
    .bind(form.note.trim())
    .bind(Utc::now().to_rfc3339())
    .bind(&note_id)
    .bind(&staff.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("note"));
    }

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn delete_note(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let note_id = path.into_inner();

    let result = sqlx::query("DELETE FROM staff_notes WHERE id = ? AND staff_id = ?")
        .bind(&note_id)
        .bind(&staff.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("note"));
    }

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn my_conversations(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;

    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"SELECT id, client_id, staff_id, created_at, last_message_at
           FROM conversations WHERE staff_id = ?
           ORDER BY last_message_at DESC"#,
    )
    .bind(&staff.id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn list_messages(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let conversation_id = path.into_inner();

    let conversation = messaging::conversation(&state.db, &conversation_id).await?;
    if conversation.staff_id != staff.id {
        return Err(ApiError::Forbidden);
    }

    let messages = messaging::list_messages(&state.db, &conversation_id).await?;
    messaging::mark_read(&state.db, &conversation_id, &auth.id).await?;

    Ok(HttpResponse::Ok().json(messages))
}

async fn send_message(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<MessageForm>,
) -> Result<HttpResponse, ApiError> {
    let staff = require_staff(&state, &auth).await?;
    let conversation_id = path.into_inner();

    let conversation = messaging::conversation(&state.db, &conversation_id).await?;
    if conversation.staff_id != staff.id {
        return Err(ApiError::Forbidden);
    }

    let message = messaging::send_message(&state.db, &conversation_id, &auth.id, &form.body).await?;

    let _ = state
        .events
        .send(ServerEvent::message(&conversation_id, &auth.id));

    notify::notify_user(
        &state,
        &conversation.client_id,
        "message",
        "New message",
        &format!("{} sent you a message.", staff.name),
    )
    .await;

    Ok(HttpResponse::Created().json(message))
}
