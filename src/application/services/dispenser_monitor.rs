//! Dispenser Monitor Service
//!
//! Watches dispenser status reports and marks units as offline when they
//! stop reporting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tokio::sync::RwLock;

use crate::infrastructure::database::entities::dispenser::{self, DispenserStatus};
use crate::support::shutdown::ShutdownSignal;

/// Configuration for dispenser fleet monitoring
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// How often to check for silent units (in seconds)
    pub check_interval_secs: u64,
    /// How long without a report before a unit is considered offline (in seconds)
    pub offline_threshold_secs: i64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            offline_threshold_secs: 180,
        }
    }
}

/// Fleet-wide dispenser statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetStats {
    /// Active units in the fleet
    pub total: usize,
    /// Reporting in and healthy (online or mid-dispense)
    pub online: usize,
    /// Offline, faulted, or under maintenance
    pub offline: usize,
    /// Nominally online but silent past the threshold; the next sweep
    /// will mark these offline
    pub stale: usize,
}

/// Dispenser Monitor Service
///
/// Runs in the background and sweeps the fleet on an interval, updating
/// the status of units that have gone silent.
pub struct DispenserMonitor {
    db: DatabaseConnection,
    settings: MonitorSettings,
    /// Running state
    running: Arc<RwLock<bool>>,
}

impl DispenserMonitor {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            settings: MonitorSettings::default(),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn offline_threshold_secs(&self) -> i64 {
        self.settings.offline_threshold_secs
    }

    /// Whether a unit with this report timestamp counts as silent
    pub fn is_stale(&self, last_report_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_report_at {
            Some(ts) => (now - ts).num_seconds() > self.settings.offline_threshold_secs,
            None => true,
        }
    }

    /// Start the monitor background task
    pub fn start(&self, shutdown: ShutdownSignal) {
        let db = self.db.clone();
        let settings = self.settings.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            {
                let mut r = running.write().await;
                *r = true;
            }

            info!(
                "Dispenser monitor started (check interval: {}s, offline threshold: {}s)",
                settings.check_interval_secs, settings.offline_threshold_secs
            );

            let mut interval =
                tokio::time::interval(Duration::from_secs(settings.check_interval_secs));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match sweep_silent_units(&db, &settings).await {
                            Ok(0) => {}
                            Ok(n) => info!("Marked {} silent dispenser(s) offline", n),
                            Err(e) => warn!("Dispenser sweep error: {}", e),
                        }
                    }
                    _ = shutdown.notified().wait() => {
                        info!("Dispenser monitor shutting down");
                        break;
                    }
                }
            }

            {
                let mut r = running.write().await;
                *r = false;
            }

            info!("Dispenser monitor stopped");
        });
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Fleet summary for the monitoring dashboard
    pub async fn fleet_stats(&self) -> Result<FleetStats, sea_orm::DbErr> {
        let now = Utc::now();
        let units = dispenser::Entity::find()
            .filter(dispenser::Column::IsActive.eq(true))
            .all(&self.db)
            .await?;

        let mut stats = FleetStats {
            total: units.len(),
            online: 0,
            offline: 0,
            stale: 0,
        };

        for unit in units {
            match unit.status {
                DispenserStatus::Online | DispenserStatus::Dispensing => {
                    if self.is_stale(unit.last_report_at, now) {
                        stats.stale += 1;
                    } else {
                        stats.online += 1;
                    }
                }
                DispenserStatus::Offline
                | DispenserStatus::Error
                | DispenserStatus::Maintenance => {
                    stats.offline += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Mark units that stopped reporting as offline. Returns how many were
/// transitioned. Units already offline or deliberately in maintenance are
/// left alone.
async fn sweep_silent_units(
    db: &DatabaseConnection,
    settings: &MonitorSettings,
) -> Result<usize, sea_orm::DbErr> {
    let now = Utc::now();
    let cutoff = now - chrono::Duration::seconds(settings.offline_threshold_secs);

    let units = dispenser::Entity::find()
        .filter(dispenser::Column::IsActive.eq(true))
        .all(db)
        .await?;

    let mut marked = 0usize;
    for unit in units {
        let silent = match unit.last_report_at {
            Some(ts) => ts < cutoff,
            None => true,
        };
        if !silent {
            continue;
        }

        match unit.status {
            DispenserStatus::Online | DispenserStatus::Dispensing | DispenserStatus::Error => {
                debug!(
                    "Dispenser {} silent since {:?}, marking offline",
                    unit.name, unit.last_report_at
                );
                let mut active: dispenser::ActiveModel = unit.into();
                active.status = Set(DispenserStatus::Offline);
                active.updated_at = Set(now);
                active.update(db).await?;
                marked += 1;
            }
            DispenserStatus::Offline | DispenserStatus::Maintenance => {}
        }
    }

    Ok(marked)
}
