// src/services/report_repository.rs
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    errors::{RideShareError as AppError, RideShareResult},
    models::report::{DriverStanding, Report},
};

/// Durable store of reports and per-driver moderation standing.
///
/// Like [`RideRepository`](crate::services::ride_repository::RideRepository),
/// updates run the mutation against a private copy and only store it when
/// the mutation returns `Ok`; the mutation may run more than once on retry.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert_report(&self, report: Report) -> RideShareResult<Report>;
    async fn list_reports(&self) -> RideShareResult<Vec<Report>>;
    async fn update_report(
        &self,
        report_id: &str,
        mutation: &mut (dyn for<'r> FnMut(&'r mut Report) -> RideShareResult<()> + Send),
    ) -> RideShareResult<Report>;
    async fn get_standing(&self, driver_id: &str) -> RideShareResult<Option<DriverStanding>>;
    async fn list_standings(&self) -> RideShareResult<Vec<DriverStanding>>;
    /// Mutate a driver's standing, starting from a clean record when none exists.
    async fn update_standing(
        &self,
        driver_id: &str,
        mutation: &mut (dyn for<'s> FnMut(&'s mut DriverStanding) -> RideShareResult<()> + Send),
    ) -> RideShareResult<DriverStanding>;
}

pub fn empty_standing(driver_id: &str) -> DriverStanding {
    DriverStanding {
        driver_id: driver_id.to_string(),
        ..Default::default()
    }
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<String, Report>>,
    standings: RwLock<HashMap<String, DriverStanding>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportRepository for MemoryReportStore {
    async fn insert_report(&self, report: Report) -> RideShareResult<Report> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Err(AppError::conflict(format!("Report id already in use: {}", report.id)));
        }
        reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    async fn list_reports(&self) -> RideShareResult<Vec<Report>> {
        Ok(self.reports.read().await.values().cloned().collect())
    }

    async fn update_report(
        &self,
        report_id: &str,
        mutation: &mut (dyn for<'r> FnMut(&'r mut Report) -> RideShareResult<()> + Send),
    ) -> RideShareResult<Report> {
        let mut reports = self.reports.write().await;
        let current = reports
            .get(report_id)
            .ok_or_else(|| AppError::report_not_found(report_id))?;

        let mut draft = current.clone();
        mutation(&mut draft)?;
        reports.insert(report_id.to_string(), draft.clone());
        Ok(draft)
    }

    async fn get_standing(&self, driver_id: &str) -> RideShareResult<Option<DriverStanding>> {
        Ok(self.standings.read().await.get(driver_id).cloned())
    }

    async fn list_standings(&self) -> RideShareResult<Vec<DriverStanding>> {
        Ok(self.standings.read().await.values().cloned().collect())
    }

    async fn update_standing(
        &self,
        driver_id: &str,
        mutation: &mut (dyn for<'s> FnMut(&'s mut DriverStanding) -> RideShareResult<()> + Send),
    ) -> RideShareResult<DriverStanding> {
        let mut standings = self.standings.write().await;
        let mut draft = standings
            .get(driver_id)
            .cloned()
            .unwrap_or_else(|| empty_standing(driver_id));

        mutation(&mut draft)?;
        standings.insert(driver_id.to_string(), draft.clone());
        Ok(draft)
    }
}
