// libs/appointment-cell/src/services/sweep.rs
//
// Auto-marks overdue approved appointments as no_show. Safe to run at any
// cadence and safe to run twice: the guarded PATCH only fires on rows still
// at `approved`, so a row swept (or completed) in between is skipped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use provider_cell::models::SchedulingPolicy;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::lifecycle::LifecycleService;

/// Actor recorded on autonomous transitions. The nil UUID never collides
/// with a real account id.
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

pub struct SweepService {
    supabase: SupabaseClient,
    lifecycle: LifecycleService,
    policy: SchedulingPolicy,
}

impl SweepService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: LifecycleService::new(config),
            policy: SchedulingPolicy::default(),
        }
    }

    /// One pass: find approved appointments whose grace window has elapsed
    /// with no outcome notes and transition them to `no_show`. Returns how
    /// many rows were actually moved.
    pub async fn sweep_overdue(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<usize, AppointmentError> {
        let grace = Duration::hours(self.policy.no_show_grace_hours);

        // The store filter is a superset (it ignores per-row duration); the
        // exact grace check happens in code below.
        let coarse_cutoff = now - grace;
        let path = format!(
            "/rest/v1/appointments?status=eq.approved&outcome_notes=is.null&scheduled_at=lt.{}",
            urlencoding::encode(&coarse_cutoff.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let candidates: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointments: {}", e)))?;

        let mut swept = 0;
        for appointment in candidates {
            if appointment.scheduled_end_time() + grace >= now {
                continue;
            }

            debug!("Sweeping overdue appointment {}", appointment.id);
            match self
                .lifecycle
                .commit_transition(
                    &appointment,
                    AppointmentStatus::NoShow,
                    SYSTEM_ACTOR,
                    json!({}),
                    auth_token,
                )
                .await
            {
                Ok(_) => swept += 1,
                // Lost the race: the row left `approved` since we read it.
                Err(AppointmentError::Conflict) => {
                    debug!("Appointment {} already transitioned, skipping", appointment.id)
                }
                Err(e) => {
                    warn!("Failed to sweep appointment {}: {}", appointment.id, e);
                }
            }
        }

        if swept > 0 {
            info!("No-show sweep transitioned {} appointment(s)", swept);
        }
        Ok(swept)
    }
}

/// Background driver spawned by the API binary.
pub fn spawn_periodic_sweep(config: Arc<AppConfig>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let sweep = SweepService::new(&config);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep.sweep_overdue(Utc::now(), &config.supabase_anon_key).await {
                warn!("No-show sweep pass failed: {}", e);
            }
        }
    });
}
