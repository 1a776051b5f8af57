// libs/appointment-cell/src/services/calendar.rs
//
// Read-only feed of committed appointments for an external calendar. Only
// approved and completed rows are exported; nothing here ever writes back.

use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, CalendarEntry, CalendarQuery};

pub struct CalendarService {
    supabase: SupabaseClient,
}

impl CalendarService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn entries_for_user(
        &self,
        user_id: Uuid,
        query: &CalendarQuery,
        auth_token: &str,
    ) -> Result<Vec<CalendarEntry>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?or=(patient_id.eq.{0},provider_id.eq.{0})&status=in.(approved,completed)&order=scheduled_at.asc",
            user_id,
        );
        if let Some(date_from) = query.date_from {
            let from = date_from.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
            path.push_str(&format!(
                "&scheduled_at=gte.{}",
                urlencoding::encode(&from.to_rfc3339())
            ));
        }
        if let Some(date_to) = query.date_to {
            let to = date_to.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
                + chrono::Duration::days(1);
            path.push_str(&format!(
                "&scheduled_at=lt.{}",
                urlencoding::encode(&to.to_rfc3339())
            ));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let appointments: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments
            .into_iter()
            .map(|a| entry_for(a, user_id))
            .collect())
    }
}

fn entry_for(appointment: Appointment, viewer_id: Uuid) -> CalendarEntry {
    let counterpart = if appointment.patient_id == viewer_id {
        format!("provider {}", appointment.provider_id)
    } else {
        format!("patient {}", appointment.patient_id)
    };

    CalendarEntry {
        start: appointment.scheduled_at,
        end: appointment.scheduled_end_time(),
        title: format!("Appointment with {}", counterpart),
        notes: appointment.notes,
        location: appointment.location,
    }
}
