use chrono::Local;
use tracing::{debug, info, warn};

use crate::db::RecordStore;
use crate::error::{Result, TrackerError};
use crate::models::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, NewApplication, OwnerId,
    TimelineEntry,
};
use crate::stats::{self, ApplicationFilter, ApplicationStats, PlatformStats};

pub const LOAD_ERROR_MESSAGE: &str = "Failed to load applications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Uninitialized,
    Loading,
    Ready,
    Errored,
}

/// In-memory list of the connected wallet's applications. Every mutation goes
/// through here so readers always see one consistent snapshot.
///
/// The cache only changes after the store answers, and only with what the
/// store returned. A failed call leaves the list untouched.
///
/// Each owner change bumps an epoch. Results stamped with an older epoch are
/// dropped instead of being applied to another owner's list.
pub struct ApplicationsState<S: RecordStore> {
    store: S,
    owner: Option<OwnerId>,
    applications: Vec<Application>,
    phase: LoadPhase,
    error: Option<String>,
    epoch: u64,
}

impl<S: RecordStore> ApplicationsState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            owner: None,
            applications: Vec::new(),
            phase: LoadPhase::Uninitialized,
            error: None,
            epoch: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }

    /// User-facing message from the last failed load.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Binds a new wallet (or none). The previous owner's records are dropped
    /// before anything is fetched for the new one.
    pub fn set_owner(&mut self, owner: Option<OwnerId>) -> Result<()> {
        if self.owner == owner && self.phase != LoadPhase::Uninitialized {
            return Ok(());
        }

        self.epoch += 1;
        self.applications.clear();
        self.error = None;
        self.owner = owner;
        match &self.owner {
            Some(owner) => info!(owner = %owner, "wallet connected"),
            None => info!("wallet disconnected"),
        }

        self.load()
    }

    /// Replaces the cache with the owner's full list. On failure the last good
    /// list is kept and `error()` carries a message.
    pub fn load(&mut self) -> Result<()> {
        let Some(owner) = self.owner.clone() else {
            self.applications.clear();
            self.error = None;
            self.phase = LoadPhase::Ready;
            return Ok(());
        };

        let epoch = self.epoch;
        self.phase = LoadPhase::Loading;
        let outcome = self.store.list_by_owner(Some(&owner));
        self.settle_load(epoch, outcome)
    }

    fn settle_load(&mut self, epoch: u64, outcome: Result<Vec<Application>>) -> Result<()> {
        if epoch != self.epoch {
            warn!(epoch, current = self.epoch, "discarding load for a previous wallet");
            return Ok(());
        }

        match outcome {
            Ok(applications) => {
                debug!(count = applications.len(), "applications loaded");
                self.applications = applications;
                self.error = None;
                self.phase = LoadPhase::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to load applications");
                self.error = Some(LOAD_ERROR_MESSAGE.to_string());
                self.phase = LoadPhase::Errored;
                Err(e)
            }
        }
    }

    fn require_owner(&self) -> Result<OwnerId> {
        self.owner.clone().ok_or(TrackerError::NotAuthenticated)
    }

    pub fn create(&mut self, fields: NewApplication) -> Result<Application> {
        let owner = self.require_owner()?;
        fields.validate()?;
        let fields = fields.normalized();

        let epoch = self.epoch;
        let created = self.store.insert(&owner, &fields)?;
        self.settle_created(epoch, created.clone());
        Ok(created)
    }

    fn settle_created(&mut self, epoch: u64, created: Application) {
        if !self.accepts(epoch, &created) {
            return;
        }
        self.applications.retain(|a| a.id != created.id);
        self.applications.insert(0, created);
    }

    pub fn update(&mut self, id: &ApplicationId, patch: ApplicationPatch) -> Result<Application> {
        let owner = self.require_owner()?;
        patch.validate()?;
        let patch = patch.normalized();

        let epoch = self.epoch;
        let updated = self.store.update(id, &owner, &patch)?;
        self.settle_replaced(epoch, &updated);
        Ok(updated)
    }

    /// Status-only update. The timeline's old status comes from the cached
    /// record; if the record is not cached it is recorded as unknown.
    pub fn update_status(
        &mut self,
        id: &ApplicationId,
        status: ApplicationStatus,
        note: Option<&str>,
    ) -> Result<Application> {
        let owner = self.require_owner()?;
        let old_status = self.get(id).map(|a| a.status);

        let epoch = self.epoch;
        let updated = self
            .store
            .update_status(id, &owner, status, old_status, note)?;
        self.settle_replaced(epoch, &updated);
        Ok(updated)
    }

    // Replaces in place. A record that is no longer cached is not brought
    // back, so a late answer cannot resurrect a removed application.
    fn settle_replaced(&mut self, epoch: u64, updated: &Application) {
        if !self.accepts(epoch, updated) {
            return;
        }
        match self.applications.iter_mut().find(|a| a.id == updated.id) {
            Some(slot) => *slot = updated.clone(),
            None => debug!(id = %updated.id, "updated record not cached, leaving list as is"),
        }
    }

    pub fn remove(&mut self, id: &ApplicationId) -> Result<()> {
        let owner = self.require_owner()?;

        let epoch = self.epoch;
        self.store.remove(id, &owner)?;
        self.settle_removed(epoch, id);
        Ok(())
    }

    fn settle_removed(&mut self, epoch: u64, id: &ApplicationId) {
        if epoch != self.epoch {
            warn!(id = %id, "discarding removal for a previous wallet");
            return;
        }
        self.applications.retain(|a| &a.id != id);
    }

    fn accepts(&self, epoch: u64, record: &Application) -> bool {
        let current = epoch == self.epoch && self.owner.as_ref() == Some(&record.wallet_address);
        if !current {
            warn!(id = %record.id, epoch, current = self.epoch, "discarding stale result");
        }
        current
    }

    /// Straight to the store, never cached. Empty with no wallet connected.
    pub fn get_timeline(&self, id: &ApplicationId) -> Result<Vec<TimelineEntry>> {
        match &self.owner {
            Some(owner) => self.store.list_timeline(id, owner),
            None => Ok(Vec::new()),
        }
    }

    pub fn get(&self, id: &ApplicationId) -> Option<&Application> {
        self.applications.iter().find(|a| &a.id == id)
    }

    /// Like [`get`](Self::get), but a missing record is a not-found error.
    pub fn require(&self, id: &ApplicationId) -> Result<&Application> {
        self.get(id).ok_or_else(|| TrackerError::not_found(id))
    }

    /// The first `n` cached records, which are the most recent ones.
    pub fn recent(&self, n: usize) -> &[Application] {
        &self.applications[..n.min(self.applications.len())]
    }

    pub fn stats(&self) -> ApplicationStats {
        self.stats_at(Local::now().date_naive())
    }

    pub fn stats_at(&self, today: chrono::NaiveDate) -> ApplicationStats {
        stats::compute_stats(&self.applications, today)
    }

    pub fn company_names(&self) -> Vec<String> {
        stats::company_names(&self.applications)
    }

    pub fn by_status(&self, status: ApplicationStatus) -> Vec<&Application> {
        stats::by_status(&self.applications, status)
    }

    pub fn platform_stats(&self) -> Vec<PlatformStats> {
        stats::platform_stats(&self.applications)
    }

    pub fn filtered(&self, filter: &ApplicationFilter) -> Vec<&Application> {
        filter.apply(&self.applications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::PersistenceError;
    use crate::models::Platform;
    use std::cell::Cell;

    /// Real in-memory store that can be told to fail every call.
    struct FlakyStore {
        inner: Database,
        failing: Cell<bool>,
    }

    impl FlakyStore {
        fn new() -> Self {
            let inner = Database::open_in_memory().unwrap();
            inner.init().unwrap();
            Self {
                inner,
                failing: Cell::new(false),
            }
        }

        fn check(&self) -> Result<()> {
            if self.failing.get() {
                let err = rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
                    Some("disk I/O error".to_string()),
                );
                return Err(PersistenceError::Sqlite(err).into());
            }
            Ok(())
        }
    }

    impl RecordStore for FlakyStore {
        fn list_by_owner(&self, owner: Option<&OwnerId>) -> Result<Vec<Application>> {
            self.check()?;
            self.inner.list_by_owner(owner)
        }

        fn insert(&self, owner: &OwnerId, fields: &NewApplication) -> Result<Application> {
            self.check()?;
            self.inner.insert(owner, fields)
        }

        fn update(
            &self,
            id: &ApplicationId,
            owner: &OwnerId,
            patch: &ApplicationPatch,
        ) -> Result<Application> {
            self.check()?;
            self.inner.update(id, owner, patch)
        }

        fn update_status(
            &self,
            id: &ApplicationId,
            owner: &OwnerId,
            new_status: ApplicationStatus,
            old_status: Option<ApplicationStatus>,
            note: Option<&str>,
        ) -> Result<Application> {
            self.check()?;
            self.inner.update_status(id, owner, new_status, old_status, note)
        }

        fn remove(&self, id: &ApplicationId, owner: &OwnerId) -> Result<()> {
            self.check()?;
            self.inner.remove(id, owner)
        }

        fn list_timeline(
            &self,
            application_id: &ApplicationId,
            owner: &OwnerId,
        ) -> Result<Vec<TimelineEntry>> {
            self.check()?;
            self.inner.list_timeline(application_id, owner)
        }
    }

    fn owner(address: &str) -> OwnerId {
        OwnerId::parse(address).unwrap()
    }

    fn connected(address: &str) -> ApplicationsState<FlakyStore> {
        let mut state = ApplicationsState::new(FlakyStore::new());
        state.set_owner(Some(owner(address))).unwrap();
        state
    }

    fn acme() -> NewApplication {
        NewApplication::new("Acme", "Dev", Platform::Linkedin)
    }

    fn ids(state: &ApplicationsState<FlakyStore>) -> Vec<ApplicationId> {
        state.applications().iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn test_phases_through_load() {
        let mut state = ApplicationsState::new(FlakyStore::new());
        assert_eq!(state.phase(), LoadPhase::Uninitialized);

        state.set_owner(None).unwrap();
        assert_eq!(state.phase(), LoadPhase::Ready);
        assert!(state.applications().is_empty());

        state.set_owner(Some(owner("GALICE"))).unwrap();
        assert_eq!(state.phase(), LoadPhase::Ready);
        assert!(!state.is_loading());

        state.store().failing.set(true);
        assert!(state.load().is_err());
        assert_eq!(state.phase(), LoadPhase::Errored);
        assert_eq!(state.error(), Some(LOAD_ERROR_MESSAGE));

        state.store().failing.set(false);
        state.load().unwrap();
        assert_eq!(state.phase(), LoadPhase::Ready);
        assert_eq!(state.error(), None);
    }

    #[test]
    fn test_create_prepends_returned_record() {
        let mut state = connected("GALICE");
        let first = state.create(acme()).unwrap();
        let second = state
            .create(NewApplication::new("Beta", "QA", Platform::Indeed))
            .unwrap();

        assert_eq!(ids(&state), vec![second.id.clone(), first.id.clone()]);
        assert_eq!(state.get(&first.id), Some(&first));
    }

    #[test]
    fn test_create_requires_owner_then_fields() {
        let mut state = ApplicationsState::new(FlakyStore::new());
        let err = state.create(NewApplication::default()).unwrap_err();
        assert!(matches!(err, TrackerError::NotAuthenticated));

        let mut state = connected("GALICE");
        let err = state.create(NewApplication::default()).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        assert!(state.applications().is_empty());
    }

    #[test]
    fn test_failed_mutations_leave_cache_untouched() {
        let mut state = connected("GALICE");
        let app = state.create(acme()).unwrap();
        let before = state.applications().to_vec();

        state.store().failing.set(true);
        assert!(state.create(acme()).unwrap_err().is_persistence());
        assert!(state
            .update(&app.id, ApplicationPatch::status(ApplicationStatus::Aceptada))
            .is_err());
        assert!(state
            .update_status(&app.id, ApplicationStatus::Aceptada, Some("note"))
            .is_err());
        assert!(state.remove(&app.id).is_err());

        assert_eq!(state.applications(), before.as_slice());
    }

    #[test]
    fn test_update_replaces_in_place() {
        let mut state = connected("GALICE");
        let a = state.create(acme()).unwrap();
        let b = state
            .create(NewApplication::new("Beta", "QA", Platform::Indeed))
            .unwrap();

        let patch = ApplicationPatch {
            position_title: Some("Staff Dev".into()),
            is_priority: Some(true),
            ..Default::default()
        };
        let updated = state.update(&a.id, patch).unwrap();

        assert_eq!(ids(&state), vec![b.id.clone(), a.id.clone()]);
        assert_eq!(state.get(&a.id), Some(&updated));
        assert_eq!(state.get(&b.id), Some(&b));
        assert!(updated.is_priority);
    }

    #[test]
    fn test_update_status_records_cached_old_status() {
        let mut state = connected("GALICE");
        let app = state.create(acme()).unwrap();

        let updated = state
            .update_status(&app.id, ApplicationStatus::EntrevistaProgramada, Some("tuesday"))
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::EntrevistaProgramada);
        assert_eq!(
            state.get(&app.id).map(|a| a.status),
            Some(ApplicationStatus::EntrevistaProgramada)
        );

        let timeline = state.get_timeline(&app.id).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].old_status, Some(ApplicationStatus::Pendiente));
        assert_eq!(timeline[0].new_status, ApplicationStatus::EntrevistaProgramada);
    }

    #[test]
    fn test_update_status_uncached_record_has_unknown_old_status() {
        let mut state = connected("GALICE");
        // Inserted behind the container's back
        let app = state
            .store()
            .inner
            .insert(&owner("GALICE"), &acme())
            .unwrap();
        assert!(state.get(&app.id).is_none());

        state
            .update_status(&app.id, ApplicationStatus::Rechazada, Some("no fit"))
            .unwrap();
        let timeline = state.get_timeline(&app.id).unwrap();
        assert_eq!(timeline[0].old_status, None);
        // Not resurrected into a cache that never had it
        assert!(state.get(&app.id).is_none());
    }

    #[test]
    fn test_remove() {
        let mut state = connected("GALICE");
        let app = state.create(acme()).unwrap();
        state.remove(&app.id).unwrap();
        assert!(state.applications().is_empty());

        let err = state.remove(&app.id).unwrap_err();
        assert!(err.is_persistence());
    }

    #[test]
    fn test_update_platform_other_only_sticks_to_otro() {
        let mut state = connected("GALICE");
        let app = state.create(acme()).unwrap();

        let patch = ApplicationPatch {
            platform_other: Some(Some("Meetup".into())),
            ..Default::default()
        };
        let updated = state.update(&app.id, patch.clone()).unwrap();
        assert_eq!(updated.platform, Platform::Linkedin);
        assert_eq!(updated.platform_other, None);
        assert_eq!(state.get(&app.id).unwrap().platform_other, None);

        let to_otro = ApplicationPatch {
            platform: Some(Platform::Otro),
            ..patch
        };
        let updated = state.update(&app.id, to_otro).unwrap();
        assert_eq!(updated.platform_name(), "Meetup");

        let renamed = ApplicationPatch {
            platform_other: Some(Some("Hackathon".into())),
            ..Default::default()
        };
        let updated = state.update(&app.id, renamed).unwrap();
        assert_eq!(updated.platform_other.as_deref(), Some("Hackathon"));
    }

    #[test]
    fn test_load_replaces_instead_of_appending() {
        let mut state = connected("GALICE");
        state.create(acme()).unwrap();
        state
            .create(NewApplication::new("Beta", "QA", Platform::Indeed))
            .unwrap();
        let mut before = ids(&state);

        state.load().unwrap();
        state.load().unwrap();

        let mut after = ids(&state);
        assert_eq!(after.len(), 2);
        before.sort();
        after.sort();
        assert_eq!(after, before);
        assert_eq!(state.phase(), LoadPhase::Ready);
    }

    #[test]
    fn test_require_missing_record_is_not_found() {
        let mut state = connected("GALICE");
        let app = state.create(acme()).unwrap();
        assert_eq!(state.require(&app.id).unwrap(), &app);

        let err = state.require(&ApplicationId::from("nope")).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::Persistence(PersistenceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_failure_keeps_last_good_list() {
        let mut state = connected("GALICE");
        state.create(acme()).unwrap();

        state.store().failing.set(true);
        assert!(state.load().is_err());
        assert_eq!(state.applications().len(), 1);
    }

    #[test]
    fn test_switching_owner_never_shows_previous_records() {
        let mut state = connected("GALICE");
        state.create(acme()).unwrap();

        state.store().failing.set(true);
        assert!(state.set_owner(Some(owner("GBOB"))).is_err());
        assert!(state.applications().is_empty());
        assert_eq!(state.phase(), LoadPhase::Errored);

        state.store().failing.set(false);
        state.load().unwrap();
        assert!(state.applications().is_empty());

        state.set_owner(Some(owner("GALICE"))).unwrap();
        assert_eq!(state.applications().len(), 1);

        state.set_owner(None).unwrap();
        assert!(state.applications().is_empty());
        assert_eq!(state.phase(), LoadPhase::Ready);
    }

    #[test]
    fn test_results_from_previous_epoch_are_discarded() {
        let mut state = connected("GALICE");
        let app = state.create(acme()).unwrap();
        let stale_epoch = state.epoch;

        let mut late = app.clone();
        late.company_name = "Late".into();

        state.set_owner(Some(owner("GBOB"))).unwrap();
        state.settle_created(stale_epoch, late.clone());
        state.settle_replaced(stale_epoch, &late);
        assert!(state.applications().is_empty());

        state.set_owner(Some(owner("GALICE"))).unwrap();
        state.settle_replaced(stale_epoch, &late);
        assert_eq!(state.get(&app.id).map(|a| a.company_name.as_str()), Some("Acme"));

        let reload = state.store().inner.list_by_owner(Some(&owner("GBOB")));
        state.settle_load(stale_epoch, reload).unwrap();
        assert_eq!(state.applications().len(), 1);
    }

    #[test]
    fn test_timeline_without_owner_is_empty() {
        let state = ApplicationsState::new(FlakyStore::new());
        assert!(state
            .get_timeline(&ApplicationId::from("anything"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_derived_views_follow_list() {
        let mut state = connected("GALICE");
        let a = state.create(acme()).unwrap();
        state
            .create(NewApplication::new("Beta", "QA", Platform::Indeed))
            .unwrap();
        state
            .update_status(&a.id, ApplicationStatus::Aceptada, None)
            .unwrap();

        let stats = state.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.this_month, 2);
        assert_eq!(stats.response_rate, 50.0);
        assert_eq!(state.company_names(), vec!["Acme", "Beta"]);
        assert_eq!(state.by_status(ApplicationStatus::Aceptada).len(), 1);
        assert_eq!(state.platform_stats().len(), 2);
        assert_eq!(state.recent(1).len(), 1);
        assert_eq!(state.recent(10).len(), 2);

        let filter = ApplicationFilter {
            search: Some("bet".into()),
            ..Default::default()
        };
        assert_eq!(state.filtered(&filter).len(), 1);

        state.remove(&a.id).unwrap();
        assert_eq!(state.stats().total, 1);
        assert_eq!(state.company_names(), vec!["Beta"]);
    }
}
