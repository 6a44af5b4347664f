use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::QuotaLimits;
use crate::db::{job_queries, project_queries};

/// Outcome of a concurrency-style admission check (projects, active jobs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { limit: i64, current: i64 },
}

/// Outcome of the monthly regeneration admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerationAdmission {
    Allowed,
    Denied {
        used: i64,
        limit: i64,
        reset_date: DateTime<Utc>,
    },
}

/// Compare a fresh usage count against its ceiling.
fn admit(current: i64, limit: i64) -> Admission {
    if current >= limit {
        Admission::Denied { limit, current }
    } else {
        Admission::Allowed
    }
}

/// Same comparison for the regeneration window; denials carry the usage and
/// the date the oldest counted regeneration leaves the window.
fn admit_regeneration(used: i64, limit: i64, reset_date: DateTime<Utc>) -> RegenerationAdmission {
    if used >= limit {
        RegenerationAdmission::Denied {
            used,
            limit,
            reset_date,
        }
    } else {
        RegenerationAdmission::Allowed
    }
}

/// The quota ledger: point-in-time usage counts against fixed ceilings.
///
/// Checks are advisory-but-authoritative at call time. No lock is held, so
/// two concurrent requests can both pass before either job row exists; the
/// overshoot is bounded because the row materializes immediately after the
/// check and later checks observe it.
///
/// Quota checks fail OPEN on store errors (a broken ledger must not block
/// legitimate work); authentication stays fail-closed.
#[derive(Clone)]
pub struct QuotaService {
    pool: PgPool,
    limits: QuotaLimits,
}

impl QuotaService {
    pub fn new(pool: PgPool, limits: QuotaLimits) -> Self {
        Self { pool, limits }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// May the user create another project? Ceiling: `max_projects`.
    pub async fn check_project_creation(&self, user_id: Uuid) -> Admission {
        match project_queries::count_projects(&self.pool, user_id).await {
            Ok(current) => admit(current, self.limits.max_projects),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "project quota check failed, allowing");
                Admission::Allowed
            }
        }
    }

    /// May the user start another job? Counts `queued` + `processing`.
    pub async fn check_job_admission(&self, user_id: Uuid) -> Admission {
        match job_queries::count_active_jobs(&self.pool, user_id).await {
            Ok(current) => admit(current, self.limits.max_active_jobs),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "job quota check failed, allowing");
                Admission::Allowed
            }
        }
    }

    /// May the user regenerate a section? Counts completed regenerations in
    /// the rolling 30-day window against `max_regenerations`.
    pub async fn check_regeneration_admission(&self, user_id: Uuid) -> RegenerationAdmission {
        match job_queries::regeneration_usage(&self.pool, user_id).await {
            Ok((used, reset_date)) => {
                admit_regeneration(used, self.limits.max_regenerations, reset_date)
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "regeneration quota check failed, allowing");
                RegenerationAdmission::Allowed
            }
        }
    }

    /// Usage snapshots for the read-only quota endpoints.
    pub async fn project_usage(&self, user_id: Uuid) -> Result<(i64, i64), sqlx::Error> {
        let used = project_queries::count_projects(&self.pool, user_id).await?;
        Ok((used, self.limits.max_projects))
    }

    pub async fn job_usage(&self, user_id: Uuid) -> Result<(i64, i64), sqlx::Error> {
        let used = job_queries::count_active_jobs(&self.pool, user_id).await?;
        Ok((used, self.limits.max_active_jobs))
    }

    pub async fn regeneration_quota(
        &self,
        user_id: Uuid,
    ) -> Result<(i64, i64, DateTime<Utc>), sqlx::Error> {
        let (used, reset_date) = job_queries::regeneration_usage(&self.pool, user_id).await?;
        Ok((used, self.limits.max_regenerations, reset_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_allowed() {
        assert_eq!(admit(0, 2), Admission::Allowed);
        assert_eq!(admit(1, 2), Admission::Allowed);
    }

    #[test]
    fn test_at_limit_denied_with_usage() {
        assert_eq!(
            admit(2, 2),
            Admission::Denied {
                limit: 2,
                current: 2
            }
        );
    }

    #[test]
    fn test_overshoot_still_denied() {
        // The check-then-create race can leave current above the ceiling;
        // subsequent checks must still deny.
        assert_eq!(
            admit(3, 2),
            Admission::Denied {
                limit: 2,
                current: 3
            }
        );
    }

    #[test]
    fn test_regeneration_under_limit_allowed() {
        let reset = Utc::now();
        assert_eq!(
            admit_regeneration(9, 10, reset),
            RegenerationAdmission::Allowed
        );
    }

    #[test]
    fn test_regeneration_at_limit_denied_with_window() {
        let reset = Utc::now() + chrono::Duration::days(3);
        assert_eq!(
            admit_regeneration(10, 10, reset),
            RegenerationAdmission::Denied {
                used: 10,
                limit: 10,
                reset_date: reset,
            }
        );
    }

    #[test]
    fn test_zero_limit_denies_everything() {
        assert_eq!(
            admit(0, 0),
            Admission::Denied {
                limit: 0,
                current: 0
            }
        );
    }
}
