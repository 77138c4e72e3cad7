//! Session coordinator: owns the "tonight" handle and turns start / stop /
//! clear intents into storage calls.
//!
//! Every intent runs as its own tokio task tied to the coordinator's shutdown
//! token. Storage calls go to the blocking pool; results are published from
//! the async task through `watch` channels, which observers subscribe to.
//!
//! Intents issued concurrently are not serialized against each other. A caller
//! that needs ordering awaits the returned handle before issuing the next one.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::db::SleepDatabaseDao;
use crate::error::Result;
use crate::format::{NightFormatter, PlainNightFormatter};
use crate::types::{DisplayRow, SleepNight};

pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    dao: Arc<dyn SleepDatabaseDao>,
    formatter: Arc<dyn NightFormatter>,
    clock: Arc<dyn Clock>,
    tonight: watch::Sender<Option<SleepNight>>,
    nights: watch::Sender<Vec<SleepNight>>,
    display_history: watch::Sender<Vec<DisplayRow>>,
    initialized: watch::Sender<bool>,
    shutdown_token: CancellationToken,
}

impl SessionCoordinator {
    /// Creates a coordinator with the plain formatter and the system clock.
    ///
    /// Must be called from within a tokio runtime: construction dispatches
    /// the initial load of tonight and the history.
    pub fn new(dao: Arc<dyn SleepDatabaseDao>) -> Self {
        Self::with_parts(
            dao,
            Arc::new(PlainNightFormatter::default()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        dao: Arc<dyn SleepDatabaseDao>,
        formatter: Arc<dyn NightFormatter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let coordinator = Self {
            inner: Arc::new(Inner {
                dao,
                formatter,
                clock,
                tonight: watch::Sender::new(None),
                nights: watch::Sender::new(Vec::new()),
                display_history: watch::Sender::new(Vec::new()),
                initialized: watch::Sender::new(false),
                shutdown_token: CancellationToken::new(),
            }),
        };
        coordinator.dispatch("initialize", |inner| async move { inner.initialize().await });
        coordinator
    }

    // ─────────────────────────────────────────────────────────────────────
    // Intents
    // ─────────────────────────────────────────────────────────────────────

    /// Records a new open night and makes it tonight.
    ///
    /// An already open night is not checked for; calling this twice leaves
    /// two open nights in storage.
    pub fn start_tracking(&self) -> JoinHandle<()> {
        self.dispatch("start_tracking", |inner| async move {
            inner.start_tracking().await
        })
    }

    /// Closes tonight. Does nothing when no night is held.
    ///
    /// The closed night stays in the handle, so a second call re-stamps the
    /// same record's end time.
    pub fn stop_tracking(&self) -> JoinHandle<()> {
        self.dispatch("stop_tracking", |inner| async move {
            inner.stop_tracking().await
        })
    }

    /// Deletes every night and drops the handle.
    pub fn clear_all(&self) -> JoinHandle<()> {
        self.dispatch("clear_all", |inner| async move { inner.clear_all().await })
    }

    /// Re-reads the history, for hosts whose storage is also written elsewhere.
    pub fn refresh_history(&self) -> JoinHandle<()> {
        self.dispatch("refresh_history", |inner| async move {
            inner.refresh_history().await
        })
    }

    /// Cancels in-flight work and rejects further intents.
    ///
    /// Storage calls already handed to the blocking pool still run to
    /// completion; their results are not published.
    pub fn shutdown(&self) {
        if !self.inner.shutdown_token.is_cancelled() {
            debug!("Session coordinator shutting down");
        }
        self.inner.shutdown_token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown_token.is_cancelled()
    }

    /// Resolves once the initial load has run, or the coordinator shuts down.
    pub async fn wait_initialized(&self) {
        let mut ready = self.inner.initialized.subscribe();
        tokio::select! {
            _ = ready.wait_for(|done| *done) => {}
            _ = self.inner.shutdown_token.cancelled() => {}
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observables
    // ─────────────────────────────────────────────────────────────────────

    pub fn tonight(&self) -> Option<SleepNight> {
        self.inner.tonight.borrow().clone()
    }

    pub fn subscribe_tonight(&self) -> watch::Receiver<Option<SleepNight>> {
        self.inner.tonight.subscribe()
    }

    /// Full history, most recent first.
    pub fn nights(&self) -> Vec<SleepNight> {
        self.inner.nights.borrow().clone()
    }

    pub fn subscribe_nights(&self) -> watch::Receiver<Vec<SleepNight>> {
        self.inner.nights.subscribe()
    }

    pub fn display_history(&self) -> Vec<DisplayRow> {
        self.inner.display_history.borrow().clone()
    }

    pub fn subscribe_display_history(&self) -> watch::Receiver<Vec<DisplayRow>> {
        self.inner.display_history.subscribe()
    }

    fn dispatch<F, Fut>(&self, op: &'static str, work: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<Inner>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.inner.shutdown_token.clone();
        if token.is_cancelled() {
            debug!(op, "Coordinator shut down; intent dropped");
            return tokio::spawn(async {});
        }

        let work = work(Arc::clone(&self.inner));
        debug!(op, "Dispatching");
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(op, "Cancelled before completion");
                }
                result = work => {
                    if let Err(err) = result {
                        warn!(op, error = %err, "Sleep tracking operation failed");
                    }
                }
            }
        })
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.inner.shutdown_token.cancel();
    }
}

impl Inner {
    async fn initialize(&self) -> Result<()> {
        let outcome = async {
            let tonight = self.load_tonight().await?;
            info!(
                night_id = ?tonight.as_ref().map(|night| night.night_id),
                "Loaded tonight"
            );
            self.tonight.send_replace(tonight);
            self.refresh_history().await
        }
        .await;
        self.initialized.send_replace(true);
        outcome
    }

    /// The most recent night, if it is still open.
    async fn load_tonight(&self) -> Result<Option<SleepNight>> {
        let latest = self.blocking(|dao| dao.get_tonight()).await?;
        Ok(latest.filter(SleepNight::is_open))
    }

    async fn start_tracking(&self) -> Result<()> {
        let mut night = SleepNight::starting_at(self.clock.now_millis());
        let unsaved = night.clone();
        night.night_id = self.blocking(move |dao| dao.insert(&unsaved)).await?;

        info!(
            night_id = night.night_id,
            start_time_milli = night.start_time_milli,
            "Started tracking"
        );
        self.tonight.send_replace(Some(night));
        self.refresh_history().await
    }

    async fn stop_tracking(&self) -> Result<()> {
        let current = self.tonight.borrow().clone();
        let Some(mut night) = current else {
            debug!("Stop ignored; no night in progress");
            return Ok(());
        };

        // End must differ from start or the night would still read as open.
        night.end_time_milli = self
            .clock
            .now_millis()
            .max(night.start_time_milli + 1);
        let closed = night.clone();
        self.blocking(move |dao| dao.update(&closed)).await?;

        info!(
            night_id = night.night_id,
            end_time_milli = night.end_time_milli,
            "Stopped tracking"
        );
        self.tonight.send_replace(Some(night));
        self.refresh_history().await
    }

    async fn clear_all(&self) -> Result<()> {
        self.blocking(|dao| dao.clear()).await?;
        info!("Cleared all nights");
        self.tonight.send_replace(None);
        self.refresh_history().await
    }

    async fn refresh_history(&self) -> Result<()> {
        let nights = self.blocking(|dao| dao.get_all_nights()).await?;
        let rows = self.formatter.format(&nights);
        debug!(count = nights.len(), "History refreshed");
        self.nights.send_replace(nights);
        self.display_history.send_replace(rows);
        Ok(())
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SleepDatabaseDao) -> Result<T> + Send + 'static,
    {
        let dao = Arc::clone(&self.dao);
        tokio::task::spawn_blocking(move || op(dao.as_ref())).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemorySleepDao;
    use crate::error::SleepError;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct StepClock(AtomicI64);

    impl StepClock {
        fn at(millis: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(millis)))
        }

        fn set(&self, millis: i64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for StepClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Wraps the in-memory store and counts writes.
    #[derive(Default)]
    struct CountingDao {
        store: InMemorySleepDao,
        writes: AtomicUsize,
    }

    impl CountingDao {
        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl SleepDatabaseDao for CountingDao {
        fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
            self.store.get_all_nights()
        }

        fn get_tonight(&self) -> Result<Option<SleepNight>> {
            self.store.get_tonight()
        }

        fn get(&self, night_id: i64) -> Result<Option<SleepNight>> {
            self.store.get(night_id)
        }

        fn insert(&self, night: &SleepNight) -> Result<i64> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.store.insert(night)
        }

        fn update(&self, night: &SleepNight) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.store.update(night)
        }

        fn clear(&self) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.store.clear()
        }
    }

    struct BrokenDao;

    impl SleepDatabaseDao for BrokenDao {
        fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
            Err(SleepError::LockPoisoned)
        }

        fn get_tonight(&self) -> Result<Option<SleepNight>> {
            Err(SleepError::LockPoisoned)
        }

        fn get(&self, _night_id: i64) -> Result<Option<SleepNight>> {
            Err(SleepError::LockPoisoned)
        }

        fn insert(&self, _night: &SleepNight) -> Result<i64> {
            Err(SleepError::LockPoisoned)
        }

        fn update(&self, _night: &SleepNight) -> Result<()> {
            Err(SleepError::LockPoisoned)
        }

        fn clear(&self) -> Result<()> {
            Err(SleepError::LockPoisoned)
        }
    }

    /// Holds every insert until the gate opens.
    #[derive(Default)]
    struct GatedDao {
        store: InMemorySleepDao,
        open: Mutex<bool>,
        opened: Condvar,
        insert_entered: Notify,
    }

    impl GatedDao {
        fn open_gate(&self) {
            *self.open.lock().unwrap() = true;
            self.opened.notify_all();
        }
    }

    impl SleepDatabaseDao for GatedDao {
        fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
            self.store.get_all_nights()
        }

        fn get_tonight(&self) -> Result<Option<SleepNight>> {
            self.store.get_tonight()
        }

        fn get(&self, night_id: i64) -> Result<Option<SleepNight>> {
            self.store.get(night_id)
        }

        fn insert(&self, night: &SleepNight) -> Result<i64> {
            self.insert_entered.notify_one();
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            drop(open);
            self.store.insert(night)
        }

        fn update(&self, night: &SleepNight) -> Result<()> {
            self.store.update(night)
        }

        fn clear(&self) -> Result<()> {
            self.store.clear()
        }
    }

    /// Reads work; every update fails.
    #[derive(Default)]
    struct ReadOnlyDao {
        store: InMemorySleepDao,
    }

    impl SleepDatabaseDao for ReadOnlyDao {
        fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
            self.store.get_all_nights()
        }

        fn get_tonight(&self) -> Result<Option<SleepNight>> {
            self.store.get_tonight()
        }

        fn get(&self, night_id: i64) -> Result<Option<SleepNight>> {
            self.store.get(night_id)
        }

        fn insert(&self, night: &SleepNight) -> Result<i64> {
            self.store.insert(night)
        }

        fn update(&self, _night: &SleepNight) -> Result<()> {
            Err(SleepError::LockPoisoned)
        }

        fn clear(&self) -> Result<()> {
            self.store.clear()
        }
    }

    async fn coordinator_over(
        dao: Arc<dyn SleepDatabaseDao>,
        clock: Arc<StepClock>,
    ) -> SessionCoordinator {
        let coordinator =
            SessionCoordinator::with_parts(dao, Arc::new(PlainNightFormatter::default()), clock);
        coordinator.wait_initialized().await;
        coordinator
    }

    #[tokio::test]
    async fn initialize_with_empty_storage_has_no_tonight() {
        let coordinator =
            coordinator_over(Arc::new(InMemorySleepDao::new()), StepClock::at(1_000)).await;

        assert!(coordinator.tonight().is_none());
        assert!(coordinator.nights().is_empty());
        assert!(coordinator.display_history().is_empty());
    }

    #[tokio::test]
    async fn initialize_picks_up_open_night() {
        let dao = Arc::new(InMemorySleepDao::new());
        let night_id = dao.insert(&SleepNight::starting_at(5_000)).unwrap();

        let coordinator = coordinator_over(dao, StepClock::at(9_000)).await;

        let tonight = coordinator.tonight().expect("open night");
        assert_eq!(tonight.night_id, night_id);
        assert_eq!(coordinator.nights().len(), 1);
    }

    #[tokio::test]
    async fn initialize_ignores_closed_latest_night() {
        let dao = Arc::new(InMemorySleepDao::new());
        let mut closed = SleepNight::starting_at(1_000);
        closed.end_time_milli = 2_000;
        dao.insert(&closed).unwrap();

        let coordinator = coordinator_over(dao, StepClock::at(9_000)).await;

        assert!(coordinator.tonight().is_none());
        assert_eq!(coordinator.display_history().len(), 1);
    }

    #[tokio::test]
    async fn start_inserts_open_night_and_publishes_it() {
        let dao = Arc::new(InMemorySleepDao::new());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;
        let mut tonight_rx = coordinator.subscribe_tonight();

        coordinator.start_tracking().await.unwrap();

        let stored = dao.get_all_nights().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_open());
        assert_eq!(stored[0].start_time_milli, 1_000);

        assert!(tonight_rx.has_changed().unwrap());
        let tonight = tonight_rx.borrow_and_update().clone().expect("tonight");
        assert_eq!(tonight, stored[0]);
        assert_eq!(coordinator.nights(), stored);
    }

    #[tokio::test]
    async fn stop_without_tonight_writes_nothing() {
        let dao = Arc::new(CountingDao::default());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;

        coordinator.stop_tracking().await.unwrap();

        assert_eq!(dao.writes(), 0);
        assert!(coordinator.tonight().is_none());
    }

    #[tokio::test]
    async fn stop_closes_tonight_and_keeps_it_in_handle() {
        let dao = Arc::new(InMemorySleepDao::new());
        let clock = StepClock::at(1_000);
        let coordinator = coordinator_over(dao.clone(), clock.clone()).await;

        coordinator.start_tracking().await.unwrap();
        clock.set(8_000);
        coordinator.stop_tracking().await.unwrap();

        let stored = dao.get_tonight().unwrap().expect("stored night");
        assert_eq!(stored.end_time_milli, 8_000);
        assert!(!stored.is_open());

        let held = coordinator.tonight().expect("handle keeps closed night");
        assert_eq!(held, stored);
        assert_eq!(coordinator.display_history()[0].duration.as_deref(), Some("0h 00m"));
    }

    #[tokio::test]
    async fn stop_in_same_millisecond_still_closes_night() {
        let dao = Arc::new(InMemorySleepDao::new());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;

        coordinator.start_tracking().await.unwrap();
        coordinator.stop_tracking().await.unwrap();

        let stored = dao.get_tonight().unwrap().unwrap();
        assert!(stored.end_time_milli > stored.start_time_milli);
    }

    #[tokio::test]
    async fn second_stop_restamps_same_record() {
        let dao = Arc::new(InMemorySleepDao::new());
        let clock = StepClock::at(1_000);
        let coordinator = coordinator_over(dao.clone(), clock.clone()).await;

        coordinator.start_tracking().await.unwrap();
        clock.set(2_000);
        coordinator.stop_tracking().await.unwrap();
        clock.set(3_000);
        coordinator.stop_tracking().await.unwrap();

        let nights = dao.get_all_nights().unwrap();
        assert_eq!(nights.len(), 1);
        assert_eq!(nights[0].end_time_milli, 3_000);
        assert_eq!(coordinator.tonight().unwrap().end_time_milli, 3_000);
    }

    #[tokio::test]
    async fn start_twice_leaves_two_open_nights() {
        let dao = Arc::new(InMemorySleepDao::new());
        let clock = StepClock::at(1_000);
        let coordinator = coordinator_over(dao.clone(), clock.clone()).await;

        coordinator.start_tracking().await.unwrap();
        clock.set(2_000);
        coordinator.start_tracking().await.unwrap();

        let nights = dao.get_all_nights().unwrap();
        assert_eq!(nights.len(), 2);
        assert!(nights.iter().all(SleepNight::is_open));
        assert_eq!(coordinator.tonight().unwrap().start_time_milli, 2_000);
    }

    #[tokio::test]
    async fn clear_empties_storage_and_handle() {
        let dao = Arc::new(InMemorySleepDao::new());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;

        coordinator.start_tracking().await.unwrap();
        coordinator.clear_all().await.unwrap();

        assert!(dao.get_all_nights().unwrap().is_empty());
        assert!(coordinator.tonight().is_none());
        assert!(coordinator.nights().is_empty());
        assert!(coordinator.display_history().is_empty());

        coordinator.clear_all().await.unwrap();
        assert!(dao.get_all_nights().unwrap().is_empty());
        assert!(coordinator.tonight().is_none());
    }

    #[tokio::test]
    async fn refresh_picks_up_external_writes() {
        let dao = Arc::new(InMemorySleepDao::new());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;

        dao.insert(&SleepNight::starting_at(4_000)).unwrap();
        assert!(coordinator.nights().is_empty());

        coordinator.refresh_history().await.unwrap();
        assert_eq!(coordinator.nights().len(), 1);
        assert_eq!(coordinator.display_history().len(), 1);
    }

    #[tokio::test]
    async fn storage_failures_leave_state_untouched() {
        let coordinator = coordinator_over(Arc::new(BrokenDao), StepClock::at(1_000)).await;

        coordinator.start_tracking().await.unwrap();
        coordinator.clear_all().await.unwrap();

        assert!(coordinator.tonight().is_none());
        assert!(coordinator.nights().is_empty());
    }

    #[tokio::test]
    async fn failed_stop_keeps_open_night_in_handle() {
        let dao = Arc::new(ReadOnlyDao::default());
        let night_id = dao.insert(&SleepNight::starting_at(1_000)).unwrap();
        let coordinator = coordinator_over(dao.clone(), StepClock::at(5_000)).await;
        let open = coordinator.tonight().expect("open night loaded");
        assert_eq!(open.night_id, night_id);

        coordinator.stop_tracking().await.unwrap();

        assert_eq!(coordinator.tonight(), Some(open.clone()));
        assert!(coordinator.tonight().unwrap().is_open());
        assert_eq!(dao.get(night_id).unwrap(), Some(open));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drop_cancels_in_flight_start_without_rollback() {
        let dao = Arc::new(GatedDao::default());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;
        let tonight_rx = coordinator.subscribe_tonight();

        let pending = coordinator.start_tracking();
        dao.insert_entered.notified().await;
        drop(coordinator);
        pending.await.unwrap();

        dao.open_gate();
        let mut stored = Vec::new();
        for _ in 0..200 {
            stored = dao.get_all_nights().unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_open());
        assert!(tonight_rx.borrow().is_none());
    }

    #[tokio::test]
    async fn intents_after_shutdown_do_not_touch_storage() {
        let dao = Arc::new(CountingDao::default());
        let coordinator = coordinator_over(dao.clone(), StepClock::at(1_000)).await;

        coordinator.shutdown();
        assert!(coordinator.is_shut_down());

        coordinator.start_tracking().await.unwrap();
        coordinator.clear_all().await.unwrap();

        assert_eq!(dao.writes(), 0);
        assert!(coordinator.tonight().is_none());
    }

    #[tokio::test]
    async fn wait_initialized_returns_after_shutdown() {
        let coordinator = SessionCoordinator::new(Arc::new(InMemorySleepDao::new()));
        coordinator.shutdown();
        coordinator.wait_initialized().await;
    }
}
