use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{authenticate_credentials, hash_password, new_id, AUTH_REALM},
    db::fetch_appointment_detail,
    error::{conflict_on_unique, ApiError},
    models::{ServiceRow, StaffRow, ROLE_CLIENT},
    state::AppState,
};

#[derive(Deserialize)]
struct RegisterForm {
    email: String,
    password: String,
    display_name: String,
    birthday: Option<String>,
    referral_code: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/services").route(web::get().to(list_services)))
        .service(web::resource("/staff").route(web::get().to(list_staff)))
        .service(web::resource("/status/{id}").route(web::get().to(appointment_status)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn register(
    state: web::Data<AppState>,
    form: web::Json<RegisterForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();

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

    let birthday = match form.birthday.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
                return Err(ApiError::validation("birthday must be YYYY-MM-DD"));
            }
            Some(raw.to_string())
        }
        _ => None,
    };

    let referred_by = match form.referral_code.as_deref() {
        Some(code) if !code.trim().is_empty() => {
            let referrer = sqlx::query_scalar::<_, String>(
                "SELECT id FROM users WHERE referral_code = ?",
            )
            .bind(code.trim())
            .fetch_optional(&state.db)
            .await?;
            match referrer {
                Some(id) => Some(id),
                None => return Err(ApiError::validation("Unknown referral code.")),
            }
        }
        _ => None,
    };

    let password_hash = hash_password(&form.password)
        .map_err(|_| ApiError::validation("Password could not be processed."))?;

    let user_id = new_id();
    sqlx::query(
        r#"INSERT INTO users
           (id, email, display_name, role, password_hash, birthday, referred_by, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&user_id)
    .bind(&email)
    .bind(form.display_name.trim())
    .bind(ROLE_CLIENT)
    .bind(password_hash)
    .bind(birthday)
    .bind(referred_by)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(|err| conflict_on_unique(err, "An account with this email already exists."))?;

    Ok(HttpResponse::Created().json(json!({
        "id": user_id,
        "email": email,
        "role": ROLE_CLIENT,
    })))
}

async fn login(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    match authenticate_credentials(&state, email, password).await {
        Some(user) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(json!({
                "id": user.id,
                "display_name": user.display_name,
                "role": user.role,
            })),
        None => auth_challenge(),
    }
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((
            header::WWW_AUTHENTICATE,
            format!("Basic realm=\"{}\"", AUTH_REALM),
        ))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let services = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, category, base_price, duration_minutes FROM services ORDER BY category, base_price",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(services))
}

async fn list_staff(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let staff = sqlx::query_as::<_, StaffRow>(
        "SELECT id, user_id, name, tier, price_multiplier FROM staff ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(staff))
}

/// Public lookup by appointment id, mirroring the booking-confirmation link
/// a client receives. Exposes only display fields.
async fn appointment_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = path.into_inner();
    let row = fetch_appointment_detail(&state.db, &appointment_id)
        .await
        .ok_or(ApiError::NotFound("appointment"))?;

    Ok(HttpResponse::Ok().json(json!({
        "appointment_id": row.id,
        "status": row.status,
        "service_name": row.service_name,
        "staff_name": row.staff_name,
        "appointment_date": row.appointment_date,
        "appointment_time": row.appointment_time,
    })))
}
