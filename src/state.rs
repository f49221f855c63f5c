use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::models::AppointmentDetailRow;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub push: PushConfig,
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl PushConfig {
    pub fn from_env() -> Self {
        Self {
            public_key: std::env::var("VAPID_PUBLIC_KEY").unwrap_or_default(),
            private_key: std::env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
            subject: std::env::var("PUSH_SUBJECT")
                .unwrap_or_else(|_| "mailto:hello@lashloft.example".to_string()),
        }
    }

    pub fn enabled(&self) -> bool {
        !(self.public_key.trim().is_empty() || self.private_key.trim().is_empty())
    }
}

/// One change event fanned out to every connected SSE listener.
#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub appointment_id: Option<String>,
    pub status: Option<String>,
    pub client_name: Option<String>,
    pub service_name: Option<String>,
    pub staff_name: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

impl ServerEvent {
    pub fn from_appointment(kind: &str, row: AppointmentDetailRow) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: Some(row.id),
            status: Some(row.status),
            client_name: Some(row.client_name),
            service_name: Some(row.service_name),
            staff_name: Some(row.staff_name),
            appointment_date: Some(row.appointment_date),
            appointment_time: Some(row.appointment_time),
            conversation_id: None,
            user_id: Some(row.user_id),
        }
    }

    pub fn message(conversation_id: &str, sender_id: &str) -> Self {
        Self {
            kind: "message_created".to_string(),
            appointment_id: None,
            status: None,
            client_name: None,
            service_name: None,
            staff_name: None,
            appointment_date: None,
            appointment_time: None,
            conversation_id: Some(conversation_id.to_string()),
            user_id: Some(sender_id.to_string()),
        }
    }

    pub fn time_off(request_id: &str, status: &str) -> Self {
        Self {
            kind: "time_off_decided".to_string(),
            appointment_id: Some(request_id.to_string()),
            status: Some(status.to_string()),
            client_name: None,
            service_name: None,
            staff_name: None,
            appointment_date: None,
            appointment_time: None,
            conversation_id: None,
            user_id: None,
        }
    }
}
