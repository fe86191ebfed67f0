//! # Register State Cache
//!
//! Holds the reconciled view of the active register for the front end.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌───────┐  init/refresh  ┌─────────┐   fetched    ┌────────┐         │
//! │   │ EMPTY │ ─────────────► │ LOADING │ ───────────► │ LOADED │         │
//! │   └───────┘                └─────────┘ ◄─────────── └────────┘         │
//! │       ▲                     │     ▲     refresh / new movement          │
//! │       │               failed│     │retry                                │
//! │       │                     ▼     │                                     │
//! │       │                    ┌───────┐                                    │
//! │       └──── reset ──────── │ ERROR │      (reset is legal from any     │
//! │                            └───────┘       state)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Last Request Wins
//! Every refresh takes a generation number before it goes remote. When
//! the result comes back, it is applied only if no newer refresh (or a
//! reset) has started meanwhile; otherwise it is dropped and the caller
//! gets [`RefreshOutcome::Superseded`]. The lock is never held across a
//! remote call.
//!
//! ## Filters
//! Balances are always reconciled over the full, unfiltered history. When
//! filters are active, a second fetch with those filters decides which
//! movements the view shows; their running balances still come from the
//! full fold.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use till_core::validation::{
    validate_close_register, validate_new_movement, validate_open_register, validate_register_id,
};
use till_core::{
    resolve, summarize, BalanceSource, CashMovement, CashRegister, CloseRegister,
    CoreError, DataQualityIssue, MovementFilters, MovementSummary, NewMovement, OpenRegister,
    ResolvedRegister,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::http::HttpMovementSource;
use crate::quality::{DataQualitySink, TracingSink};
use crate::retry::{retry, Idempotent, NonIdempotent, RetryPolicy};
use crate::source::MovementSource;

// =============================================================================
// Cache State
// =============================================================================

/// Lifecycle state of a [`RegisterCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Nothing loaded.
    #[default]
    Empty,
    /// A fetch is in flight.
    Loading,
    /// A reconciled view is available.
    Loaded,
    /// The last fetch failed; see [`RegisterCache::last_error`].
    Error,
}

impl CacheState {
    /// Returns true if the state machine allows moving to `next`.
    pub fn can_transition_to(self, next: CacheState) -> bool {
        use CacheState::*;
        matches!(
            (self, next),
            (_, Empty)
                | (Empty, Loading)
                | (Loading, Loaded)
                | (Loading, Error)
                | (Loaded, Loading)
                | (Error, Loading)
        )
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Empty => write!(f, "empty"),
            CacheState::Loading => write!(f, "loading"),
            CacheState::Loaded => write!(f, "loaded"),
            CacheState::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Register View
// =============================================================================

/// Snapshot of the cached register handed to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterView {
    pub register: CashRegister,
    /// Movements matching the filters, oldest first. Running balances are
    /// taken from the full history.
    pub movements: Vec<CashMovement>,
    pub balance_source: BalanceSource,
    /// Totals over `movements`.
    pub summary: MovementSummary,
    /// Filters the movement list was fetched with.
    #[serde(skip)]
    pub filters: MovementFilters,
    pub loaded_at: DateTime<Utc>,
}

impl RegisterView {
    pub fn current_balance(&self) -> till_core::Money {
        self.register
            .current_balance
            .unwrap_or(self.register.initial_balance)
    }
}

/// Result of a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The fetch completed and its result is now cached.
    Loaded(RegisterView),
    /// No register is open; the cache is empty.
    NoActiveRegister,
    /// A newer refresh or a reset started while this one was in flight;
    /// its result was discarded.
    Superseded,
}

// =============================================================================
// Inner State
// =============================================================================

/// Result of one remote load.
struct Fetched {
    /// Full history, reconciled.
    resolved: ResolvedRegister,
    /// Ids of the movements the filters matched; `None` shows everything.
    visible: Option<HashSet<String>>,
}

struct Inner {
    state: CacheState,
    resolved: Option<ResolvedRegister>,
    visible: Option<HashSet<String>>,
    loaded_at: DateTime<Utc>,
    filters: MovementFilters,
    generation: u64,
    last_error: Option<String>,
}

impl Inner {
    fn new() -> Self {
        Inner {
            state: CacheState::Empty,
            resolved: None,
            visible: None,
            loaded_at: Utc::now(),
            filters: MovementFilters::default(),
            generation: 0,
            last_error: None,
        }
    }

    fn transition(&mut self, next: CacheState) -> ClientResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ClientError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "Cache state change");
        self.state = next;
        Ok(())
    }

    /// Enters LOADING and claims a new generation. A refresh that starts
    /// while another is in flight stays in LOADING and takes over.
    fn begin_load(&mut self) -> ClientResult<u64> {
        if self.state != CacheState::Loading {
            self.transition(CacheState::Loading)?;
        }
        self.generation += 1;
        Ok(self.generation)
    }

    fn install(&mut self, fetched: Fetched) -> ClientResult<()> {
        self.resolved = Some(fetched.resolved);
        self.visible = fetched.visible;
        self.loaded_at = Utc::now();
        self.last_error = None;
        self.transition(CacheState::Loaded)
    }

    fn clear(&mut self) {
        self.generation += 1;
        self.resolved = None;
        self.visible = None;
        self.filters = MovementFilters::default();
        self.last_error = None;
        self.state = CacheState::Empty;
    }

    fn view(&self) -> Option<RegisterView> {
        let resolved = self.resolved.as_ref()?;
        let movements: Vec<CashMovement> = match &self.visible {
            Some(ids) => resolved
                .movements
                .iter()
                .filter(|m| ids.contains(&m.id))
                .cloned()
                .collect(),
            None => resolved.movements.clone(),
        };
        Some(RegisterView {
            register: resolved.register.clone(),
            summary: summarize(&movements),
            movements,
            balance_source: resolved.balance_source,
            filters: self.filters.clone(),
            loaded_at: self.loaded_at,
        })
    }
}

// =============================================================================
// Register Cache
// =============================================================================

/// Cached, reconciled view of the active cash register.
pub struct RegisterCache {
    source: Arc<dyn MovementSource>,
    sink: Arc<dyn DataQualitySink>,
    policy: RetryPolicy,
    refresh_after_submit: bool,
    inner: RwLock<Inner>,
}

impl RegisterCache {
    /// Creates a cache that reports data-quality issues through tracing.
    pub fn new(source: Arc<dyn MovementSource>, config: &ClientConfig) -> Self {
        Self::with_sink(source, Arc::new(TracingSink), config)
    }

    /// Creates a cache with a custom data-quality sink.
    pub fn with_sink(
        source: Arc<dyn MovementSource>,
        sink: Arc<dyn DataQualitySink>,
        config: &ClientConfig,
    ) -> Self {
        RegisterCache {
            source,
            sink,
            policy: config.retry_policy(),
            refresh_after_submit: config.cache.refresh_after_submit,
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Creates a cache backed by the REST API described in `config`.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let source = HttpMovementSource::from_config(config)?;
        Ok(Self::new(Arc::new(source), config))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub async fn state(&self) -> CacheState {
        self.inner.read().await.state
    }

    /// Message of the last failed load, cleared by the next success.
    pub async fn last_error(&self) -> Option<String> {
        self.inner.read().await.last_error.clone()
    }

    /// The last successfully loaded view, if any.
    ///
    /// A stale view stays readable while a refresh is in flight or after
    /// it failed.
    pub async fn get(&self) -> Option<RegisterView> {
        self.inner.read().await.view()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads the active register and its movements.
    ///
    /// Returns `None` when no register is open.
    pub async fn init(&self) -> ClientResult<Option<RegisterView>> {
        match self.refresh().await? {
            RefreshOutcome::Loaded(view) => Ok(Some(view)),
            RefreshOutcome::NoActiveRegister => Ok(None),
            RefreshOutcome::Superseded => Ok(self.get().await),
        }
    }

    /// Re-fetches with the current filters.
    pub async fn refresh(&self) -> ClientResult<RefreshOutcome> {
        let filters = self.inner.read().await.filters.clone();
        self.refresh_with(filters).await
    }

    /// Re-fetches with new filters, which then become the current ones.
    pub async fn refresh_with(&self, filters: MovementFilters) -> ClientResult<RefreshOutcome> {
        let generation = {
            let mut inner = self.inner.write().await;
            let generation = inner.begin_load()?;
            inner.filters = filters.clone();
            generation
        };

        let result = self.fetch(&filters).await;

        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "Discarding superseded refresh");
            return Ok(RefreshOutcome::Superseded);
        }

        match result {
            Ok(Some(fetched)) => {
                let resolved = &fetched.resolved;
                let register_id = resolved.register.id.clone();
                let issues = resolved.issues.clone();
                info!(
                    register_id = %register_id,
                    movements = resolved.movements.len(),
                    shown = fetched.visible.as_ref().map_or(resolved.movements.len(), |ids| ids.len()),
                    balance_source = ?resolved.balance_source,
                    balance = %resolved.current_balance(),
                    "Register loaded"
                );
                inner.install(fetched)?;
                let view = inner.view().ok_or(ClientError::NotLoaded)?;
                drop(inner);

                self.report(&register_id, &issues);
                Ok(RefreshOutcome::Loaded(view))
            }
            Ok(None) => {
                info!("No active register");
                inner.resolved = None;
                inner.visible = None;
                inner.transition(CacheState::Empty)?;
                Ok(RefreshOutcome::NoActiveRegister)
            }
            Err(err) => {
                warn!(error = %err, "Register load failed");
                inner.last_error = Some(err.to_string());
                inner.transition(CacheState::Error)?;
                Err(err)
            }
        }
    }

    async fn fetch(&self, filters: &MovementFilters) -> ClientResult<Option<Fetched>> {
        let register = retry(Idempotent, &self.policy, "fetch_active_register", || {
            self.source.fetch_active_register()
        })
        .await?;

        let Some(register) = register else {
            return Ok(None);
        };
        validate_register_id(&register.id)?;

        let unfiltered = MovementFilters::default();
        let movements = retry(Idempotent, &self.policy, "fetch_movements", || {
            self.source.fetch_movements(&register.id, &unfiltered)
        })
        .await?;

        let visible = if filters.is_empty() {
            None
        } else {
            let matching = retry(Idempotent, &self.policy, "fetch_movements", || {
                self.source.fetch_movements(&register.id, filters)
            })
            .await?;
            Some(matching.into_iter().map(|m| m.id).collect())
        };

        Ok(Some(Fetched {
            resolved: resolve(register, movements),
            visible,
        }))
    }

    /// Drops the cached register. In-flight refreshes are discarded when
    /// they complete.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.clear();
        debug!(generation = inner.generation, "Cache reset");
    }

    // =========================================================================
    // Movements
    // =========================================================================

    /// Adds a movement that is already persisted upstream, without a
    /// re-fetch.
    ///
    /// While filters are active the movement counts towards the balance
    /// but stays out of the list until the next refresh asks the source
    /// whether it matches.
    pub async fn apply_new_movement(&self, movement: CashMovement) -> ClientResult<RegisterView> {
        let mut inner = self.inner.write().await;
        if inner.state != CacheState::Loaded {
            return Err(ClientError::NotLoaded);
        }

        inner.transition(CacheState::Loading)?;
        let applied = match inner.resolved.as_mut() {
            Some(resolved) => resolved.apply(movement).map_err(ClientError::from),
            None => Err(ClientError::NotLoaded),
        };
        inner.transition(CacheState::Loaded)?;

        let issue = applied?;
        let view = inner.view().ok_or(ClientError::NotLoaded)?;
        drop(inner);

        if let Some(issue) = issue {
            self.report(&view.register.id, &[issue]);
        }
        debug!(
            register_id = %view.register.id,
            balance = %view.current_balance(),
            "Movement applied"
        );
        Ok(view)
    }

    /// Validates, submits once, and folds the new movement into the view.
    ///
    /// Invalid input is rejected before any remote call. The submission is
    /// never retried.
    pub async fn register_movement(&self, movement: NewMovement) -> ClientResult<CashMovement> {
        validate_new_movement(&movement)?;

        let register_id = self.loaded_open_register_id().await?;

        let created = retry(NonIdempotent, &self.policy, "submit_movement", || {
            self.source.submit_movement(&register_id, &movement)
        })
        .await?;

        info!(
            register_id = %register_id,
            movement_id = %created.id,
            movement_type = %created.movement_type,
            amount = %created.amount,
            "Movement registered"
        );

        let filtered = !self.inner.read().await.filters.is_empty();
        if self.refresh_after_submit || filtered {
            self.refresh().await?;
        } else if let Err(err) = self.apply_new_movement(created.clone()).await {
            warn!(error = %err, "Could not apply movement locally, refreshing");
            self.refresh().await?;
        }

        Ok(created)
    }

    // =========================================================================
    // Register Lifecycle
    // =========================================================================

    /// Opens a new register and loads it.
    pub async fn open_register(&self, request: OpenRegister) -> ClientResult<RegisterView> {
        validate_open_register(&request)?;

        let register = retry(NonIdempotent, &self.policy, "open_register", || {
            self.source.open_register(&request)
        })
        .await?;
        info!(register_id = %register.id, initial_balance = %register.initial_balance, "Register opened");

        let mut inner = self.inner.write().await;
        inner.begin_load()?;
        inner.filters = MovementFilters::default();
        inner.install(Fetched {
            resolved: resolve(register, Vec::new()),
            visible: None,
        })?;
        inner.view().ok_or(ClientError::NotLoaded)
    }

    /// Closes the loaded register and empties the cache.
    pub async fn close_register(&self, request: CloseRegister) -> ClientResult<CashRegister> {
        validate_close_register(&request)?;

        let register_id = self.loaded_open_register_id().await?;

        let closed = retry(NonIdempotent, &self.policy, "close_register", || {
            self.source.close_register(&register_id, &request)
        })
        .await?;
        info!(register_id = %closed.id, "Register closed");

        self.reset().await;
        Ok(closed)
    }

    async fn loaded_open_register_id(&self) -> ClientResult<String> {
        let inner = self.inner.read().await;
        let resolved = inner.resolved.as_ref().ok_or(ClientError::NotLoaded)?;
        if !resolved.register.is_open() {
            return Err(CoreError::RegisterClosed(resolved.register.id.clone()).into());
        }
        Ok(resolved.register.id.clone())
    }

    fn report(&self, register_id: &str, issues: &[DataQualityIssue]) {
        for issue in issues {
            self.sink.report(register_id, issue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::CollectingSink;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use till_core::{Money, MovementType, RegisterStatus};

    // =========================================================================
    // Scripted Source
    // =========================================================================

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn register(id: &str, initial: i64, current: Option<i64>) -> CashRegister {
        CashRegister {
            id: id.to_string(),
            initial_balance: Money::from_major(initial),
            current_balance: current.map(Money::from_major),
            status: RegisterStatus::Open,
            opened_at: t0(),
            closed_at: None,
            opened_by: None,
            notes: None,
            extra: Map::new(),
        }
    }

    fn movement(id: &str, register_id: &str, kind: MovementType, major: i64, secs: i64) -> CashMovement {
        CashMovement {
            id: id.to_string(),
            register_id: register_id.to_string(),
            movement_type: kind,
            amount: Money::from_major(major),
            concept: format!("movement {id}"),
            notes: None,
            created_at: t0() + ChronoDuration::seconds(secs),
            running_balance: None,
            extra: Map::new(),
        }
    }

    type ActiveResponse = (Duration, ClientResult<Option<CashRegister>>);

    #[derive(Default)]
    struct ScriptedSource {
        /// Consumed first; once empty, `active` is served.
        scripted: Mutex<VecDeque<ActiveResponse>>,
        active: Mutex<Option<CashRegister>>,
        movements: Mutex<Vec<CashMovement>>,
        submit_error: Mutex<Option<ClientError>>,
        active_calls: AtomicU32,
        movement_calls: AtomicU32,
        submit_calls: AtomicU32,
    }

    impl ScriptedSource {
        fn with_register(register: CashRegister, movements: Vec<CashMovement>) -> Self {
            let source = ScriptedSource::default();
            *source.active.lock().unwrap() = Some(register);
            *source.movements.lock().unwrap() = movements;
            source
        }

        fn script(&self, delay_ms: u64, response: ClientResult<Option<CashRegister>>) {
            self.scripted
                .lock()
                .unwrap()
                .push_back((Duration::from_millis(delay_ms), response));
        }
    }

    #[async_trait]
    impl MovementSource for ScriptedSource {
        async fn fetch_active_register(&self) -> ClientResult<Option<CashRegister>> {
            self.active_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.scripted.lock().unwrap().pop_front();
            match next {
                Some((delay, response)) => {
                    tokio::time::sleep(delay).await;
                    response
                }
                None => Ok(self.active.lock().unwrap().clone()),
            }
        }

        async fn fetch_movements(
            &self,
            register_id: &str,
            filters: &MovementFilters,
        ) -> ClientResult<Vec<CashMovement>> {
            self.movement_calls.fetch_add(1, Ordering::SeqCst);
            let kind = filters
                .pairs()
                .iter()
                .find(|(key, _)| key == "movement_type")
                .map(|(_, value)| MovementType::parse(value));
            Ok(self
                .movements
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.register_id == register_id)
                .filter(|m| kind.as_ref().map_or(true, |kind| &m.movement_type == kind))
                .cloned()
                .collect())
        }

        async fn submit_movement(
            &self,
            register_id: &str,
            new: &NewMovement,
        ) -> ClientResult<CashMovement> {
            let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(err) = self.submit_error.lock().unwrap().take() {
                return Err(err);
            }
            let created = CashMovement {
                id: format!("new-{n}"),
                register_id: register_id.to_string(),
                movement_type: new.movement_type.clone(),
                amount: new.amount,
                concept: new.concept.clone(),
                notes: new.notes.clone(),
                created_at: t0() + ChronoDuration::hours(n as i64),
                running_balance: None,
                extra: Map::new(),
            };
            self.movements.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn open_register(&self, request: &OpenRegister) -> ClientResult<CashRegister> {
            let mut opened = register("opened", 0, None);
            opened.initial_balance = request.initial_balance;
            *self.active.lock().unwrap() = Some(opened.clone());
            Ok(opened)
        }

        async fn close_register(
            &self,
            register_id: &str,
            _request: &CloseRegister,
        ) -> ClientResult<CashRegister> {
            let mut closed = self
                .active
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ClientError::from_status(404, "not found"))?;
            assert_eq!(closed.id, register_id);
            closed.status = RegisterStatus::Closed;
            closed.closed_at = Some(t0() + ChronoDuration::hours(12));
            Ok(closed)
        }
    }

    fn cache_with(source: Arc<ScriptedSource>) -> RegisterCache {
        RegisterCache::new(source, &ClientConfig::default())
    }

    fn sample_source() -> ScriptedSource {
        ScriptedSource::with_register(
            register("r1", 450_000, Some(0)),
            vec![
                movement("m2", "r1", MovementType::Expense, 900, 20),
                movement("m1", "r1", MovementType::Income, 20_000, 10),
            ],
        )
    }

    // =========================================================================
    // State Machine
    // =========================================================================

    #[test]
    fn test_state_transitions() {
        use CacheState::*;
        assert!(Empty.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Loaded));
        assert!(Loading.can_transition_to(Error));
        assert!(Loaded.can_transition_to(Loading));
        assert!(Error.can_transition_to(Loading));
        for state in [Empty, Loading, Loaded, Error] {
            assert!(state.can_transition_to(Empty));
        }

        assert!(!Empty.can_transition_to(Loaded));
        assert!(!Empty.can_transition_to(Error));
        assert!(!Loaded.can_transition_to(Error));
        assert!(!Error.can_transition_to(Loaded));
    }

    #[test]
    fn test_illegal_transition_is_error() {
        let mut inner = Inner::new();
        let err = inner.transition(CacheState::Loaded).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidTransition {
                from: CacheState::Empty,
                to: CacheState::Loaded
            }
        ));
        assert_eq!(inner.state, CacheState::Empty);
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[tokio::test]
    async fn test_init_reconciles_zeroed_upstream_balance() {
        let source = Arc::new(sample_source());
        let cache = cache_with(source.clone());

        let view = cache.init().await.unwrap().unwrap();

        assert_eq!(cache.state().await, CacheState::Loaded);
        assert_eq!(view.balance_source, BalanceSource::Reconciled);
        assert_eq!(view.current_balance(), Money::from_major(469_100));
        let ids: Vec<_> = view.movements.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
        assert_eq!(view.movements[0].running_balance, Some(Money::from_major(470_000)));
        assert_eq!(view.summary.net_change, Money::from_major(19_100));
        assert_eq!(cache.get().await, Some(view));
    }

    #[tokio::test]
    async fn test_init_without_active_register() {
        let source = Arc::new(ScriptedSource::default());
        let cache = cache_with(source.clone());

        assert!(cache.init().await.unwrap().is_none());
        assert_eq!(cache.state().await, CacheState::Empty);
        assert!(cache.get().await.is_none());
        assert_eq!(source.active_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.movement_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_retries_transient_failures() {
        let source = Arc::new(sample_source());
        source.script(0, Err(ClientError::Timeout));
        source.script(0, Err(ClientError::from_status(502, "bad gateway")));
        let cache = cache_with(source.clone());

        let view = cache.init().await.unwrap().unwrap();

        assert_eq!(view.register.id, "r1");
        assert_eq!(source.active_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.state().await, CacheState::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_enter_error_then_recover() {
        let source = Arc::new(sample_source());
        for _ in 0..3 {
            source.script(0, Err(ClientError::Transport("connection refused".into())));
        }
        let cache = cache_with(source.clone());

        let err = cache.init().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(source.active_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.state().await, CacheState::Error);
        assert!(cache.last_error().await.unwrap().contains("connection refused"));

        let outcome = cache.refresh().await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Loaded(_)));
        assert_eq!(cache.state().await, CacheState::Loaded);
        assert!(cache.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let source = Arc::new(sample_source());
        source.script(0, Err(ClientError::from_status(401, "unauthorized")));
        let cache = cache_with(source.clone());

        let err = cache.init().await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 401, .. }));
        assert_eq!(source.active_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_keeps_filters() {
        let source = Arc::new(sample_source());
        let cache = cache_with(source);

        let filters = MovementFilters::new().movement_type(&MovementType::Income);
        let outcome = cache.refresh_with(filters.clone()).await.unwrap();
        let RefreshOutcome::Loaded(view) = outcome else {
            panic!("expected a loaded view");
        };
        assert_eq!(view.filters, filters);
        let ids: Vec<_> = view.movements.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1"]);
        assert_eq!(view.current_balance(), Money::from_major(469_100));

        cache.refresh().await.unwrap();
        assert_eq!(cache.get().await.unwrap().filters, filters);
    }

    #[tokio::test]
    async fn test_filtered_view_keeps_full_history_balance() {
        let source = Arc::new(ScriptedSource::with_register(
            register("r1", 1_000, None),
            vec![
                movement("m1", "r1", MovementType::Income, 500, 1),
                movement("m2", "r1", MovementType::Expense, 200, 2),
            ],
        ));
        let cache = cache_with(source.clone());

        let unfiltered = cache.init().await.unwrap().unwrap();
        assert_eq!(unfiltered.current_balance(), Money::from_major(1_300));

        let filters = MovementFilters::new().movement_type(&MovementType::Expense);
        let RefreshOutcome::Loaded(view) = cache.refresh_with(filters).await.unwrap() else {
            panic!("expected a loaded view");
        };

        assert_eq!(view.balance_source, BalanceSource::Reconciled);
        assert_eq!(view.current_balance(), Money::from_major(1_300));
        assert_eq!(view.movements.len(), 1);
        assert_eq!(view.movements[0].id, "m2");
        assert_eq!(view.movements[0].running_balance, Some(Money::from_major(1_300)));
        assert_eq!(view.summary.expense_total, Money::from_major(200));
        assert_eq!(view.summary.income_count, 0);

        // A locally applied movement moves the balance but is not listed
        // until a refresh re-applies the filters.
        let view = cache
            .apply_new_movement(movement("m3", "r1", MovementType::Income, 50, 3))
            .await
            .unwrap();
        assert_eq!(view.current_balance(), Money::from_major(1_350));
        assert_eq!(view.movements.len(), 1);
    }

    #[tokio::test]
    async fn test_submission_under_filters_refreshes() {
        let source = Arc::new(sample_source());
        let cache = cache_with(source.clone());
        let filters = MovementFilters::new().movement_type(&MovementType::Expense);
        cache.refresh_with(filters).await.unwrap();
        assert_eq!(source.movement_calls.load(Ordering::SeqCst), 2);

        cache
            .register_movement(NewMovement::new(
                MovementType::Expense,
                Money::from_major(100),
                "Supplies",
            ))
            .await
            .unwrap();

        assert_eq!(source.movement_calls.load(Ordering::SeqCst), 4);
        let view = cache.get().await.unwrap();
        let ids: Vec<_> = view.movements.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m2", "new-1"]);
        assert_eq!(view.current_balance(), Money::from_major(469_000));
    }

    #[tokio::test]
    async fn test_blank_register_id_is_rejected_before_movement_fetch() {
        let source = Arc::new(ScriptedSource::with_register(register(" ", 0, None), vec![]));
        let cache = cache_with(source.clone());

        let err = cache.init().await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(source.movement_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.state().await, CacheState::Error);
    }

    #[tokio::test]
    async fn test_upstream_balance_is_kept_when_non_zero() {
        let source = Arc::new(ScriptedSource::with_register(
            register("r1", 1_000, Some(1_234)),
            vec![movement("m1", "r1", MovementType::Income, 100, 1)],
        ));
        let cache = cache_with(source);

        let view = cache.init().await.unwrap().unwrap();
        assert_eq!(view.balance_source, BalanceSource::Upstream);
        assert_eq!(view.current_balance(), Money::from_major(1_234));
    }

    #[tokio::test]
    async fn test_data_quality_issues_reach_sink() {
        let source = Arc::new(ScriptedSource::with_register(
            register("r1", 1_000, None),
            vec![
                movement("m1", "r1", MovementType::Income, 100, 1),
                movement("m2", "r1", MovementType::Unknown("TRANSFER".into()), 50, 2),
            ],
        ));
        let sink = Arc::new(CollectingSink::new());
        let cache = RegisterCache::with_sink(source, sink.clone(), &ClientConfig::default());

        let view = cache.init().await.unwrap().unwrap();
        assert_eq!(view.current_balance(), Money::from_major(1_100));
        assert_eq!(view.movements.len(), 2);
        assert_eq!(view.summary.flagged_count, 1);

        let issues = sink.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].0, "r1");
        assert_eq!(issues[0].1.movement_id(), "m2");
    }

    // =========================================================================
    // Last Request Wins
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_slower_older_refresh_is_discarded() {
        let source = Arc::new(sample_source());
        source.script(300, Ok(Some(register("stale", 1, Some(1)))));
        source.script(10, Ok(Some(register("fresh", 2, Some(2)))));
        let cache = cache_with(source);

        let (first, second) = tokio::join!(cache.refresh(), cache.refresh());

        assert_eq!(first.unwrap(), RefreshOutcome::Superseded);
        let RefreshOutcome::Loaded(view) = second.unwrap() else {
            panic!("newest refresh should win");
        };
        assert_eq!(view.register.id, "fresh");
        assert_eq!(cache.get().await.unwrap().register.id, "fresh");
        assert_eq!(cache.state().await, CacheState::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_refresh() {
        let source = Arc::new(sample_source());
        source.script(100, Ok(Some(register("r1", 1, Some(1)))));
        let cache = cache_with(source);

        let reset_later = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.reset().await;
        };
        let (outcome, ()) = tokio::join!(cache.refresh(), reset_later);

        assert_eq!(outcome.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(cache.state().await, CacheState::Empty);
        assert!(cache.get().await.is_none());
    }

    // =========================================================================
    // Movements
    // =========================================================================

    #[tokio::test]
    async fn test_apply_requires_loaded_register() {
        let cache = cache_with(Arc::new(ScriptedSource::default()));
        let err = cache
            .apply_new_movement(movement("m1", "r1", MovementType::Income, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotLoaded));
    }

    #[tokio::test]
    async fn test_apply_rejects_foreign_movement() {
        let cache = cache_with(Arc::new(sample_source()));
        cache.init().await.unwrap();

        let err = cache
            .apply_new_movement(movement("x", "other", MovementType::Income, 1, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Core(CoreError::RegisterMismatch { .. })));
        assert_eq!(cache.state().await, CacheState::Loaded);
    }

    #[tokio::test]
    async fn test_register_movement_applies_incrementally() {
        let source = Arc::new(sample_source());
        let cache = cache_with(source.clone());
        cache.init().await.unwrap();

        let created = cache
            .register_movement(NewMovement::new(
                MovementType::Income,
                Money::from_major(200),
                "Float top-up",
            ))
            .await
            .unwrap();

        assert_eq!(created.id, "new-1");
        assert_eq!(source.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.movement_calls.load(Ordering::SeqCst), 1);

        let view = cache.get().await.unwrap();
        assert_eq!(view.movements.len(), 3);
        assert_eq!(view.current_balance(), Money::from_major(469_300));
        assert_eq!(
            view.movements.last().unwrap().running_balance,
            Some(Money::from_major(469_300))
        );
    }

    #[tokio::test]
    async fn test_register_movement_refreshes_when_configured() {
        let source = Arc::new(sample_source());
        let mut config = ClientConfig::default();
        config.cache.refresh_after_submit = true;
        let cache = RegisterCache::new(source.clone(), &config);
        cache.init().await.unwrap();

        cache
            .register_movement(NewMovement::new(
                MovementType::Expense,
                Money::from_major(100),
                "Supplies",
            ))
            .await
            .unwrap();

        assert_eq!(source.movement_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            cache.get().await.unwrap().current_balance(),
            Money::from_major(469_000)
        );
    }

    #[tokio::test]
    async fn test_invalid_movement_never_reaches_source() {
        let source = Arc::new(sample_source());
        let cache = cache_with(source.clone());
        cache.init().await.unwrap();

        let err = cache
            .register_movement(NewMovement::new(MovementType::Income, Money::zero(), "Nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let err = cache
            .register_movement(NewMovement::new(MovementType::Income, Money::from_major(1), "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        assert_eq!(source.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_is_attempted_once() {
        let source = Arc::new(sample_source());
        *source.submit_error.lock().unwrap() = Some(ClientError::Timeout);
        let cache = cache_with(source.clone());
        cache.init().await.unwrap();

        let err = cache
            .register_movement(NewMovement::new(
                MovementType::Income,
                Money::from_major(5),
                "Tip jar",
            ))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(source.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state().await, CacheState::Loaded);
        assert_eq!(cache.get().await.unwrap().movements.len(), 2);
    }

    #[tokio::test]
    async fn test_register_movement_requires_loaded_register() {
        let source = Arc::new(ScriptedSource::default());
        let cache = cache_with(source.clone());

        let err = cache
            .register_movement(NewMovement::new(MovementType::Income, Money::from_major(1), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotLoaded));
        assert_eq!(source.submit_calls.load(Ordering::SeqCst), 0);
    }

    // =========================================================================
    // Register Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn test_open_then_close_register() {
        let source = Arc::new(ScriptedSource::default());
        let cache = cache_with(source.clone());
        assert!(cache.init().await.unwrap().is_none());

        let view = cache
            .open_register(OpenRegister {
                initial_balance: Money::from_major(500),
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(cache.state().await, CacheState::Loaded);
        assert_eq!(view.register.id, "opened");
        assert_eq!(view.current_balance(), Money::from_major(500));
        assert!(view.movements.is_empty());

        let closed = cache.close_register(CloseRegister::default()).await.unwrap();
        assert_eq!(closed.status, RegisterStatus::Closed);
        assert_eq!(cache.state().await, CacheState::Empty);
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_open_register_rejects_negative_float() {
        let cache = cache_with(Arc::new(ScriptedSource::default()));
        let err = cache
            .open_register(OpenRegister {
                initial_balance: Money::from_major(-1),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(cache.state().await, CacheState::Empty);
    }
}
