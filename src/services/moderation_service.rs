// src/services/moderation_service.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{RideShareError as AppError, RideShareResult},
    models::{
        report::{
            DriverBanned, DriverStanding, DriverWarning, FileReportRequest, PlatformStats, Report,
            ReportStatus, ReviewReportRequest, WarningIssued,
        },
        ride::{RideFilter, RideStatus},
    },
    services::{
        report_repository::{empty_standing, ReportRepository},
        ride_service::RideOperations,
    },
    utils::id_generator::generate_report_id,
};

#[async_trait]
pub trait ModerationOperations: Send + Sync {
    async fn file_report(
        &self,
        ride_id: &str,
        reporter_id: &str,
        request: FileReportRequest,
    ) -> RideShareResult<Report>;
    async fn list_reports(&self) -> RideShareResult<Vec<Report>>;
    async fn reports_for_ride(&self, ride_id: &str) -> RideShareResult<Vec<Report>>;
    async fn warn_driver(
        &self,
        report_id: &str,
        admin_id: &str,
        review: ReviewReportRequest,
    ) -> RideShareResult<WarningIssued>;
    async fn ban_driver(
        &self,
        report_id: &str,
        admin_id: &str,
        review: ReviewReportRequest,
    ) -> RideShareResult<DriverBanned>;
    async fn dismiss_report(
        &self,
        report_id: &str,
        admin_id: &str,
        review: ReviewReportRequest,
    ) -> RideShareResult<Report>;
    async fn driver_standing(&self, driver_id: &str) -> RideShareResult<DriverStanding>;
    async fn is_banned(&self, user_id: &str) -> RideShareResult<bool>;
    /// Fail with `Forbidden` when `driver_id` is banned, cancelling any ride
    /// that slipped in while the ban was being applied.
    async fn enforce_ban(&self, driver_id: &str) -> RideShareResult<()>;
    async fn stats(&self) -> RideShareResult<PlatformStats>;
}

/// Sole writer of reports and driver standing.
///
/// Reports and standings go through the report store; ride state is only
/// touched through the lifecycle engine (existence checks and the ban cascade).
pub struct ModerationService {
    rides: Arc<dyn RideOperations>,
    store: Arc<dyn ReportRepository>,
}

impl ModerationService {
    pub fn new(rides: Arc<dyn RideOperations>, store: Arc<dyn ReportRepository>) -> Self {
        Self { rides, store }
    }

    /// Move a PENDING report to `status`, stamping the reviewer.
    async fn review(
        &self,
        report_id: &str,
        admin_id: &str,
        status: ReportStatus,
        admin_note: String,
    ) -> RideShareResult<Report> {
        self.store
            .update_report(report_id, &mut |report: &mut Report| {
                if report.status != ReportStatus::Pending {
                    tracing::warn!("Report {} already reviewed as {:?}", report_id, report.status);
                    return Err(AppError::ReportAlreadyReviewed(report_id.to_string()));
                }

                report.status = status;
                report.admin_note = Some(admin_note.clone());
                report.reviewed_by = Some(admin_id.to_string());
                report.reviewed_at = Some(Utc::now());
                Ok(())
            })
            .await
    }

    fn note_or(review: &ReviewReportRequest, default: &str) -> String {
        review
            .admin_note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .unwrap_or(default)
            .to_string()
    }
}

#[async_trait]
impl ModerationOperations for ModerationService {
    async fn file_report(
        &self,
        ride_id: &str,
        reporter_id: &str,
        request: FileReportRequest,
    ) -> RideShareResult<Report> {
        if request.reason.trim().is_empty() || request.description.trim().is_empty() {
            return Err(AppError::bad_request("Reason and description are required"));
        }

        let ride = self.rides.get_ride(ride_id).await?;
        let driver_id = request
            .driver_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(ride.driver_id);

        let report = Report {
            id: generate_report_id(),
            ride_id: ride.id,
            reported_by: reporter_id.to_string(),
            driver_id,
            reason: request.reason.trim().to_string(),
            description: request.description.trim().to_string(),
            status: ReportStatus::Pending,
            admin_note: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };

        let report = self.store.insert_report(report).await?;

        tracing::info!(
            "Report {} filed by {} against driver {} on ride {}",
            report.id,
            reporter_id,
            report.driver_id,
            report.ride_id
        );
        Ok(report)
    }

    async fn list_reports(&self) -> RideShareResult<Vec<Report>> {
        let mut reports = self.store.list_reports().await?;
        reports.sort_by(|a, b| {
            a.status
                .cmp(&b.status)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(reports)
    }

    async fn reports_for_ride(&self, ride_id: &str) -> RideShareResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .store
            .list_reports()
            .await?
            .into_iter()
            .filter(|r| r.ride_id == ride_id)
            .collect();
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(reports)
    }

    async fn warn_driver(
        &self,
        report_id: &str,
        admin_id: &str,
        review: ReviewReportRequest,
    ) -> RideShareResult<WarningIssued> {
        let note = Self::note_or(&review, "Warning issued by admin");
        let report = self
            .review(report_id, admin_id, ReportStatus::WarningIssued, note)
            .await?;

        let warning = DriverWarning {
            reason: format!("{}: {}", report.reason, report.description),
            report_id: report.id.clone(),
            issued_by: admin_id.to_string(),
            issued_at: Utc::now(),
        };
        let standing = self
            .store
            .update_standing(&report.driver_id, &mut |standing: &mut DriverStanding| {
                standing.warnings.push(warning.clone());
                Ok(())
            })
            .await?;
        let warning_count = standing.warnings.len();

        tracing::info!(
            "Warning issued to driver {} ({} total)",
            report.driver_id,
            warning_count
        );
        Ok(WarningIssued {
            report,
            warning_count,
        })
    }

    async fn ban_driver(
        &self,
        report_id: &str,
        admin_id: &str,
        review: ReviewReportRequest,
    ) -> RideShareResult<DriverBanned> {
        let note = Self::note_or(&review, "Account deleted by admin");
        let report = self
            .review(report_id, admin_id, ReportStatus::AccountDeleted, note)
            .await?;

        let detail = review
            .admin_note
            .clone()
            .unwrap_or_else(|| report.description.clone());
        let ban_reason = format!("Report: {} - {}", report.reason, detail);
        self.store
            .update_standing(&report.driver_id, &mut |standing: &mut DriverStanding| {
                standing.banned = true;
                standing.banned_at = Some(Utc::now());
                standing.ban_reason = Some(ban_reason.clone());
                Ok(())
            })
            .await?;

        let cancelled_rides = match self.rides.cascade_cancel_for_banned_driver(&report.driver_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Ride cascade for banned driver {} failed: {}", report.driver_id, e);
                0
            }
        };

        tracing::info!(
            "Driver {} banned by {}, {} rides cancelled",
            report.driver_id,
            admin_id,
            cancelled_rides
        );
        Ok(DriverBanned {
            report,
            cancelled_rides,
        })
    }

    async fn dismiss_report(
        &self,
        report_id: &str,
        admin_id: &str,
        review: ReviewReportRequest,
    ) -> RideShareResult<Report> {
        let note = Self::note_or(&review, "Dismissed by admin");
        let report = self
            .review(report_id, admin_id, ReportStatus::Dismissed, note)
            .await?;
        tracing::info!("Report {} dismissed by {}", report_id, admin_id);
        Ok(report)
    }

    async fn driver_standing(&self, driver_id: &str) -> RideShareResult<DriverStanding> {
        let mut standing = self
            .store
            .get_standing(driver_id)
            .await?
            .unwrap_or_else(|| empty_standing(driver_id));

        let reports = self.store.list_reports().await?;
        let against: Vec<&Report> = reports.iter().filter(|r| r.driver_id == driver_id).collect();
        standing.total_reports = against.len();
        standing.pending_reports = against
            .iter()
            .filter(|r| r.status == ReportStatus::Pending)
            .count();

        Ok(standing)
    }

    async fn is_banned(&self, user_id: &str) -> RideShareResult<bool> {
        Ok(self
            .store
            .get_standing(user_id)
            .await?
            .is_some_and(|standing| standing.banned))
    }

    async fn enforce_ban(&self, driver_id: &str) -> RideShareResult<()> {
        if !self.is_banned(driver_id).await? {
            return Ok(());
        }

        let cancelled = self.rides.cascade_cancel_for_banned_driver(driver_id).await?;
        tracing::warn!(
            "Banned driver {} slipped past the ban check, {} rides cancelled",
            driver_id,
            cancelled
        );
        Err(AppError::forbidden("This account has been deleted by an administrator"))
    }

    async fn stats(&self) -> RideShareResult<PlatformStats> {
        let rides = self.rides.list_rides(&RideFilter::default()).await?;
        let pending_reports = self
            .store
            .list_reports()
            .await?
            .iter()
            .filter(|r| r.status == ReportStatus::Pending)
            .count();
        let banned_drivers = self
            .store
            .list_standings()
            .await?
            .iter()
            .filter(|s| s.banned)
            .count();

        Ok(PlatformStats {
            total_rides: rides.len(),
            active_rides: rides.iter().filter(|r| r.is_active()).count(),
            completed_rides: rides.iter().filter(|r| r.status == RideStatus::Completed).count(),
            cancelled_rides: rides.iter().filter(|r| r.status == RideStatus::Cancelled).count(),
            pending_reports,
            banned_drivers,
        })
    }
}
