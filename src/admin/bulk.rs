//! Paced bulk operations over every member or every session.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::AdminConsole;
use crate::error::CapabilityError;
use crate::interview::{AbortOutcome, StartOutcome};

/// Tally of a bulk operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Members left alone (e.g. already in an interview).
    pub skipped: usize,
}

impl AdminConsole {
    /// Start an interview for every member without a session, waiting the
    /// configured interval after each start.
    pub async fn start_all(&self) -> Result<BulkReport, CapabilityError> {
        let tenant = &self.interviewer.tenant().tenant_id;
        let members = self.interviewer.platform().list_members(tenant).await?;
        let mut report = BulkReport::default();

        for participant in members {
            match self.interviewer.start(&participant).await {
                Ok(StartOutcome::Started { .. }) => {
                    report.succeeded += 1;
                    tokio::time::sleep(self.pacing.start_interval).await;
                }
                Ok(StartOutcome::AlreadyActive) => report.skipped += 1,
                Err(e) => {
                    warn!(participant = %participant, error = %e, "Bulk start failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            started = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "Bulk start finished"
        );
        Ok(report)
    }

    /// Abort every session in the store.
    pub async fn stop_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for participant in self.interviewer.store().participants().await {
            match self.interviewer.abort(&participant).await {
                AbortOutcome::Aborted { .. } => report.succeeded += 1,
                AbortOutcome::NotFound => report.skipped += 1,
            }
        }
        info!(aborted = report.succeeded, "Bulk stop finished");
        report
    }

    /// Remove every role the interview can grant, plus the registration
    /// role, from every member. A member counts as failed if any removal
    /// failed.
    pub async fn clear_roles(&self) -> Result<BulkReport, CapabilityError> {
        let tenant = &self.interviewer.tenant().tenant_id;
        let members = self.interviewer.platform().list_members(tenant).await?;

        let mut roles: BTreeSet<String> = self
            .interviewer
            .graph()
            .await
            .map(|g| g.grantable_roles())
            .unwrap_or_default();
        if let Some(role) = &self.interviewer.tenant().registration_role {
            roles.insert(role.clone());
        }

        let mut report = BulkReport::default();
        for participant in members {
            let mut ok = true;
            for role in &roles {
                if let Err(e) = self.interviewer.platform().remove_role(&participant, role).await {
                    warn!(participant = %participant, role = %role, error = %e, "Failed to remove role");
                    ok = false;
                }
            }
            if ok {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            tokio::time::sleep(self.pacing.role_wipe_interval).await;
        }

        info!(
            roles = roles.len(),
            succeeded = report.succeeded,
            failed = report.failed,
            "Role removal finished"
        );
        Ok(report)
    }
}
