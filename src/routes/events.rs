use actix_web::{http::header, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::basic_validator,
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events")
            .wrap(HttpAuthentication::basic(basic_validator))
            .route(web::get().to(stream_events)),
    )
    .service(web::resource("/status/{id}/events").route(web::get().to(stream_status_events)));
}

async fn stream_events(state: web::Data<AppState>) -> HttpResponse {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event))),
        Err(_) => None,
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn event_to_bytes(event: &ServerEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}

#[derive(serde::Serialize)]
struct PublicStatusEvent {
    appointment_id: Option<String>,
    status: Option<String>,
    service_name: Option<String>,
    appointment_date: Option<String>,
    appointment_time: Option<String>,
    staff_name: Option<String>,
}

/// Unauthenticated per-appointment stream backing the public status link.
/// Exposes the same display fields as the status endpoint, nothing more.
async fn stream_status_events(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let appointment_id = path.into_inner();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if event.appointment_id.as_deref() != Some(&appointment_id) {
            return None;
        }
        let public = PublicStatusEvent {
            appointment_id: event.appointment_id,
            status: event.status,
            service_name: event.service_name,
            appointment_date: event.appointment_date,
            appointment_time: event.appointment_time,
            staff_name: event.staff_name,
        };
        Some(Ok::<web::Bytes, actix_web::Error>(public_event_to_bytes(&public)))
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn public_event_to_bytes(event: &PublicStatusEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}
