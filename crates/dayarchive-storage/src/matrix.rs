//! Archive Matrix Builder
//!
//! Builds the complete set of archive jobs of one closed day:
//!
//! ```text
//! scopes   = global + platforms + categories + decision grounds
//! jobs     = scopes × {full, light}          (2 × (1 + P + C + G))
//! ```
//!
//! ## Claim-Then-Build
//!
//! A day is built at most once. The builder takes an in-process lock for the
//! day, fails fast if the day is already claimed, locates the day's id range,
//! and then claims the day and inserts every pending row in one transaction.
//! Concurrent builders of the same day, in this process or another, resolve to
//! exactly one winner; the others receive `Error::Conflict`.
//!
//! The day's id range is looked up once and shared by every job. Jobs are
//! separated by scope predicates during population, not by range.

use chrono::NaiveDate;
use dayarchive_core::{ArchivePaths, Scope, Variant, CATEGORIES, DECISION_GROUNDS};
use dayarchive_metadata::{DayArchive, DayArchiveStore, DayRange, NewDayArchive, StatementStore};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::boundary::BoundaryLocator;
use crate::error::{Error, Result};

/// Descriptor of one (day, scope, variant) archive consumed by later stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveJob {
    /// Id of the tracking row
    pub archive_id: i64,
    pub date: NaiveDate,
    pub scope: Scope,
    pub variant: Variant,
    pub slug: String,
    pub paths: ArchivePaths,
    pub range: DayRange,
}

impl From<&DayArchive> for ArchiveJob {
    fn from(archive: &DayArchive) -> Self {
        Self {
            archive_id: archive.id,
            date: archive.date,
            scope: archive.scope.clone(),
            variant: archive.variant,
            slug: archive.slug.clone(),
            paths: ArchivePaths::new(archive.date, &archive.slug, archive.variant),
            range: archive.range,
        }
    }
}

/// A scope and its slug, before any day is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeEntry {
    pub scope: Scope,
    pub slug: String,
}

type LockMap = HashMap<NaiveDate, Arc<Mutex<()>>>;

/// One async mutex per day, created on first use and dropped once no builder
/// holds or waits for it.
#[derive(Default)]
pub struct DayLocks {
    locks: Arc<StdMutex<LockMap>>,
}

impl DayLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `day` within this process.
    pub async fn acquire(&self, day: NaiveDate) -> DayGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(day).or_default())
        };
        DayGuard {
            day,
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of days with a live lock.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one day. Releasing the last guard of a day removes its
/// lock from the map.
pub struct DayGuard {
    day: NaiveDate,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl Drop for DayGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map still references the lock: no holder, no waiter
        if locks.get(&self.day).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.day);
        }
    }
}

pub struct MatrixBuilder {
    statements: Arc<dyn StatementStore>,
    archives: Arc<dyn DayArchiveStore>,
    locator: BoundaryLocator,
    locks: DayLocks,
}

impl MatrixBuilder {
    pub fn new(statements: Arc<dyn StatementStore>, archives: Arc<dyn DayArchiveStore>) -> Self {
        Self {
            locator: BoundaryLocator::new(Arc::clone(&statements)),
            statements,
            archives,
            locks: DayLocks::new(),
        }
    }

    pub fn locator(&self) -> &BoundaryLocator {
        &self.locator
    }

    /// Every scope of the deployment with a unique slug, global first.
    pub async fn build_basic_array(&self) -> Result<Vec<ScopeEntry>> {
        let platforms = self.statements.list_platforms().await?;

        let mut scopes = Vec::with_capacity(1 + platforms.len() + CATEGORIES.len() + DECISION_GROUNDS.len());
        scopes.push(Scope::Global);
        scopes.extend(platforms.into_iter().map(|p| Scope::Platform {
            id: p.id,
            name: p.name,
        }));
        scopes.extend(CATEGORIES.iter().map(|key| Scope::Category {
            key: key.to_string(),
        }));
        scopes.extend(DECISION_GROUNDS.iter().map(|key| Scope::DecisionGround {
            key: key.to_string(),
        }));

        // Fixed scopes keep their slugs; platforms yield on collision.
        let mut seen: HashSet<String> = scopes
            .iter()
            .filter(|scope| scope.platform_id().is_none())
            .map(Scope::default_slug)
            .collect();

        let entries = scopes
            .into_iter()
            .map(|scope| {
                let mut slug = scope.default_slug();
                if let Scope::Platform { id, .. } = &scope {
                    if slug.is_empty() {
                        slug = format!("platform-{}", id);
                    }
                    if seen.contains(&slug) {
                        slug = format!("{}-{}", slug, id);
                    }
                    seen.insert(slug.clone());
                }
                ScopeEntry { scope, slug }
            })
            .collect();

        Ok(entries)
    }

    /// Build the job matrix of a closed day relative to `today`.
    ///
    /// # Errors
    ///
    /// - `Validation`: `day` is not strictly before `today`
    /// - `Conflict`: the day is already claimed; no rows are created
    pub async fn build_starting_day_archives(
        &self,
        day: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<ArchiveJob>> {
        if day >= today {
            return Err(Error::Validation(format!(
                "When creating a day export you must supply a date in the past. Got {}",
                day
            )));
        }

        let _guard = self.locks.acquire(day).await;

        if self.archives.is_day_claimed(day).await? {
            return Err(Error::already_archived(day));
        }

        let range = self.locator.day_range(day).await?;
        let scopes = self.build_basic_array().await?;

        let pending: Vec<NewDayArchive> = scopes
            .into_iter()
            .flat_map(|entry| {
                Variant::ALL.into_iter().map(move |variant| NewDayArchive {
                    date: day,
                    scope: entry.scope.clone(),
                    variant,
                    slug: entry.slug.clone(),
                    range,
                })
            })
            .collect();

        let created = self.archives.claim_day(day, pending).await?;
        let jobs: Vec<ArchiveJob> = created.iter().map(ArchiveJob::from).collect();

        tracing::info!(
            date = %day,
            jobs = jobs.len(),
            first_id = range.first_id,
            last_id = range.last_id,
            "Built day archive matrix"
        );

        Ok(jobs)
    }

    /// Job descriptors of an already-built day, in matrix order.
    pub async fn jobs_for_day(&self, day: NaiveDate) -> Result<Vec<ArchiveJob>> {
        let archives = self.archives.list_for_date(day).await?;
        Ok(archives.iter().map(ArchiveJob::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_day_locks_serialize_same_day() {
        let locks = Arc::new(DayLocks::new());
        let day = NaiveDate::from_ymd_opt(2023, 8, 8).unwrap();
        let other = NaiveDate::from_ymd_opt(2023, 8, 9).unwrap();

        let guard = locks.acquire(day).await;

        // Another day is not blocked
        let _other_guard = locks.acquire(other).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(day).await;
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_day_locks_released_after_last_guard() {
        let locks = Arc::new(DayLocks::new());
        let day = NaiveDate::from_ymd_opt(2023, 8, 8).unwrap();

        let guard = locks.acquire(day).await;
        assert_eq!(locks.len(), 1);

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(day).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // A waiter keeps the entry alive past the first release
        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());

        for d in 1..=30 {
            let _g = locks.acquire(NaiveDate::from_ymd_opt(2023, 7, d).unwrap()).await;
        }
        assert!(locks.is_empty());
    }
}
