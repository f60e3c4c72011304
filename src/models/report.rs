// src/models/report.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,        // Waiting for an admin
    WarningIssued,
    AccountDeleted, // Driver banned, active rides cancelled
    Dismissed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Report {
    pub id: String,
    pub ride_id: String,
    pub reported_by: String,
    pub driver_id: String,
    pub reason: String,
    pub description: String,
    pub status: ReportStatus,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriverWarning {
    pub reason: String,
    pub report_id: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
}

/// Moderation record for a single driver.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DriverStanding {
    pub driver_id: String,
    pub warnings: Vec<DriverWarning>,
    pub banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub ban_reason: Option<String>,
    pub total_reports: usize,
    pub pending_reports: usize,
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileReportRequest {
    pub driver_id: Option<String>,
    pub reason: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ReviewReportRequest {
    pub admin_note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WarningIssued {
    pub report: Report,
    pub warning_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriverBanned {
    pub report: Report,
    pub cancelled_rides: usize,
}

/// Read-only view of a report attached to a ride.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RideReportSummary {
    pub report_id: String,
    pub reported_by: String,
    pub reason: String,
    pub description: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Report> for RideReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.id.clone(),
            reported_by: report.reported_by.clone(),
            reason: report.reason.clone(),
            description: report.description.clone(),
            status: report.status,
            created_at: report.created_at,
        }
    }
}

// Analytics Models
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PlatformStats {
    pub total_rides: usize,
    pub active_rides: usize,
    pub completed_rides: usize,
    pub cancelled_rides: usize,
    pub pending_reports: usize,
    pub banned_drivers: usize,
}
