//! Cycle orchestrator
//!
//! Drives the periodic check-in loop: gate checks against the remote
//! policy, the active-hours window, per-group task processing with retry
//! and outcome classification, and the between-cycle wait. The service
//! client and the notification channel are injected as traits so the loop
//! is testable without a network.

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::cli::display::CycleDisplay;
use crate::client::CheckinClient;
use crate::cycle::classify::{classify, Outcome};
use crate::cycle::history::{CycleHistory, CycleRecord};
use crate::cycle::task::{TaskDescriptor, TaskKind, TaskStatus};
use crate::error::ServiceAccessError;
use crate::geo::{CoordinateSimulator, GeneratedCoordinate, Zone, DEFAULT_ACCURACY_M};
use crate::log::JsonlLogger;
use crate::notify::{Notifier, NotifyEvent};
use crate::policy::RemotePolicyCache;
use crate::settings::{ExitMode, Settings};
use crate::signal::{ControlFlags, RunSignal};
use crate::status::StatusSnapshot;

/// Tries per task before giving up for the cycle.
const ATTEMPTS_PER_TASK: u32 = 2;
/// Linear backoff step between attempt retries.
const RETRY_BACKOFF_SECS: u64 = 2;
/// Minimum gap between repeated waiting notices.
const NOTICE_THROTTLE_SECS: i64 = 60;

/// Outcome of one group within a cycle, folded into a [`CycleRecord`].
struct GroupTally {
    found: usize,
    processed: usize,
    skipped: usize,
    error: Option<String>,
}

/// Drives check-in cycles against the service through an injected client
/// and notifier.
pub struct CycleOrchestrator<C, N> {
    client: C,
    notifier: N,
    settings: Settings,
    simulator: CoordinateSimulator,
    zone: Option<Zone>,
    policy: std::sync::Arc<RemotePolicyCache>,
    device_id: String,
    signal: RunSignal,
    flags: ControlFlags,
    display: CycleDisplay,
    rng: StdRng,
    jsonl: Option<JsonlLogger>,

    cycle_number: u64,
    total_confirmed: u64,
    next_cycle_time: Option<DateTime<Utc>>,
    last_notice_time: Option<DateTime<Utc>>,
    history: CycleHistory,
    /// Tasks confirmed this session, never re-attempted.
    confirmed: HashSet<String>,
    /// Tasks found permanently unanswerable this session.
    invalid: HashSet<String>,
    /// (task id, event) pairs already notified, so each fires once.
    notified: HashSet<(String, NotifyEvent)>,
    groups_succeeded: HashSet<String>,
}

impl<C: CheckinClient, N: Notifier> CycleOrchestrator<C, N> {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client: C,
        notifier: N,
        settings: Settings,
        simulator: CoordinateSimulator,
        zone: Option<Zone>,
        policy: std::sync::Arc<RemotePolicyCache>,
        device_id: String,
        signal: RunSignal,
        flags: ControlFlags,
    ) -> Self {
        Self::with_rng(
            client,
            notifier,
            settings,
            simulator,
            zone,
            policy,
            device_id,
            signal,
            flags,
            StdRng::from_entropy(),
        )
    }

    /// Like [`new`](Self::new) with an explicit RNG, for deterministic
    /// coordinate generation in tests.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn with_rng(
        client: C,
        notifier: N,
        settings: Settings,
        simulator: CoordinateSimulator,
        zone: Option<Zone>,
        policy: std::sync::Arc<RemotePolicyCache>,
        device_id: String,
        signal: RunSignal,
        flags: ControlFlags,
        rng: StdRng,
    ) -> Self {
        Self {
            client,
            notifier,
            settings,
            simulator,
            zone,
            policy,
            device_id,
            signal,
            flags,
            display: CycleDisplay::new(),
            rng,
            jsonl: None,
            cycle_number: 0,
            total_confirmed: 0,
            next_cycle_time: None,
            last_notice_time: None,
            history: CycleHistory::new(),
            confirmed: HashSet::new(),
            invalid: HashSet::new(),
            notified: HashSet::new(),
            groups_succeeded: HashSet::new(),
        }
    }

    /// Run cycles until shutdown, an access gate denies, or exit-after-
    /// success is satisfied.
    pub async fn run_loop(&mut self) -> Result<(), ServiceAccessError> {
        while self.signal.is_set() {
            if self.flags.stop_requested() {
                info!("stop requested");
                self.signal.clear();
                break;
            }
            self.check_gates()?;

            if !self.wait_for_window().await {
                break;
            }
            if !self.signal.is_set() {
                break;
            }

            self.execute_cycle().await;

            if self.exit_satisfied() {
                info!("exit-after-success condition met, stopping");
                self.display.exit_notice(self.groups_succeeded.len());
                self.signal.clear();
                break;
            }

            self.wait_for_next_cycle().await;
        }
        self.next_cycle_time = None;
        Ok(())
    }

    /// Run a single cycle (after the gate checks) and return.
    pub async fn run_once(&mut self) -> Result<(), ServiceAccessError> {
        self.check_gates()?;
        self.execute_cycle().await;
        Ok(())
    }

    /// Persist each cycle record to a JSONL log as well as the in-memory
    /// history.
    pub fn attach_jsonl_logger(&mut self, logger: JsonlLogger) {
        self.jsonl = Some(logger);
    }

    /// Request that the next cycle start immediately.
    pub fn trigger_immediate_cycle(&self) {
        self.flags.request_immediate_cycle();
    }

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let mut groups: Vec<String> = self.groups_succeeded.iter().cloned().collect();
        groups.sort();
        StatusSnapshot {
            running: self.signal.is_set(),
            cycles_completed: self.cycle_number,
            confirmed: self.confirmed.len(),
            permanently_invalid: self.invalid.len(),
            total_confirmed: self.total_confirmed,
            last_record: self.history.latest().cloned(),
            next_cycle_time: self.next_cycle_time,
            groups_succeeded: groups,
        }
    }

    #[must_use]
    pub fn history(&self) -> &CycleHistory {
        &self.history
    }

    /// Evaluate the remote access gates. A denial clears the run signal so
    /// every cooperating task winds down.
    fn check_gates(&self) -> Result<(), ServiceAccessError> {
        if self.policy.is_globally_disabled() {
            self.signal.clear();
            return Err(ServiceAccessError::GloballyDisabled(
                self.policy.global_disable_message(),
            ));
        }
        if !self.policy.is_device_allowed(&self.device_id) {
            self.signal.clear();
            return Err(ServiceAccessError::DeviceBlocked(
                self.policy.device_block_message(&self.device_id),
            ));
        }
        Ok(())
    }

    /// Whether the configured active-hours window currently admits cycles.
    /// A window whose start equals its end admits nothing; a start after
    /// the end spans midnight.
    #[must_use]
    pub fn within_window(&self, now: chrono::NaiveTime) -> bool {
        if !self.settings.window.enabled {
            return true;
        }
        let (Ok(start), Ok(end)) =
            (self.settings.window.start_time(), self.settings.window.end_time())
        else {
            // Validation rejects unparseable times up front.
            return true;
        };
        if start == end {
            return false;
        }
        if start < end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }

    /// Block until inside the window or shutdown. Immediate-cycle
    /// requests arriving outside the window are consumed and refused.
    /// Returns `false` on shutdown.
    async fn wait_for_window(&mut self) -> bool {
        while self.signal.is_set() && !self.within_window(Local::now().time()) {
            if self.flags.take_run_now() {
                info!("immediate cycle requested outside the active-hours window, refusing");
            }
            if self.notice_due() {
                self.display.window_wait_notice(
                    &self.settings.window.start,
                    &self.settings.window.end,
                );
            }
            if !self.signal.sleep_while_running(1).await {
                return false;
            }
        }
        self.signal.is_set()
    }

    async fn execute_cycle(&mut self) {
        self.cycle_number += 1;
        let start_time = Utc::now();

        let coordinate = self.cycle_coordinate();
        self.display
            .cycle_header(self.cycle_number, self.settings.group_ids.len(), &coordinate);

        let group_ids = self.settings.group_ids.clone();
        for group_id in &group_ids {
            if !self.signal.is_set() {
                break;
            }
            let tally = self.process_group(group_id, &coordinate).await;
            self.display.group_summary(
                group_id,
                tally.found,
                tally.processed,
                tally.skipped,
                tally.error.as_deref(),
            );
            let record = CycleRecord {
                cycle_number: self.cycle_number,
                start_time,
                group_id: group_id.clone(),
                found: tally.found,
                processed: tally.processed,
                skipped: tally.skipped,
                error: tally.error,
            };
            if let Some(logger) = &self.jsonl {
                if let Err(e) = logger.append(&record) {
                    warn!(error = %e, "failed to persist cycle record");
                }
            }
            self.history.push(record);

            // In any-mode one confirmed group is enough; skip the rest of
            // the cycle.
            if self.settings.exit_after_success.enabled
                && self.settings.exit_after_success.mode == ExitMode::Any
                && !self.groups_succeeded.is_empty()
            {
                break;
            }
        }
    }

    /// The coordinate used for every non-geofenced attempt this cycle.
    /// Falls back to the fixed configured coordinate when no zone is
    /// active or generation fails.
    fn cycle_coordinate(&mut self) -> GeneratedCoordinate {
        if let Some(zone) = self.zone.clone() {
            match self.simulator.generate(&zone, &mut self.rng) {
                Ok(coord) => return coord,
                Err(e) => {
                    warn!(zone = %zone.id, error = %e, "coordinate generation failed, using fixed coordinate");
                }
            }
        }
        GeneratedCoordinate {
            lat: self.settings.coordinate.lat,
            lng: self.settings.coordinate.lng,
            accuracy: self.settings.coordinate.accuracy,
            source: "configured".to_string(),
        }
    }

    async fn process_group(
        &mut self,
        group_id: &str,
        coordinate: &GeneratedCoordinate,
    ) -> GroupTally {
        let tasks = match self.client.fetch_tasks(group_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(group = %group_id, error = %e, "task fetch failed");
                return GroupTally {
                    found: 0,
                    processed: 0,
                    skipped: 0,
                    error: Some(e.to_string()),
                };
            }
        };

        let mut tally = GroupTally {
            found: tasks.len(),
            processed: 0,
            skipped: 0,
            error: None,
        };

        for task in &tasks {
            if !self.signal.is_set() {
                break;
            }
            if self.confirmed.contains(&task.id) || self.invalid.contains(&task.id) {
                debug!(task = %task.id, "already resolved this session");
                tally.skipped += 1;
                continue;
            }

            match self.prefilter(task) {
                Prefilter::Attempt => {}
                Prefilter::Processed => {
                    // Completed out of band still counts toward the
                    // exit condition for this group.
                    self.groups_succeeded.insert(group_id.to_string());
                    tally.processed += 1;
                    continue;
                }
                Prefilter::Skipped(reason) => {
                    self.display.task_skipped(&task.id, &task.title, reason);
                    tally.skipped += 1;
                    continue;
                }
                Prefilter::NeedsSecret => {
                    self.invalid.insert(task.id.clone());
                    self.notify_once(task, NotifyEvent::NeedsSecret, group_id).await;
                    self.display.task_skipped(&task.id, &task.title, "requires a secret");
                    tally.skipped += 1;
                    continue;
                }
            }

            match self.attempt_task(group_id, task, coordinate).await {
                Some(body) => {
                    let outcome = classify(&body);
                    self.apply_outcome(group_id, task, outcome, &mut tally).await;
                }
                None => tally.skipped += 1,
            }
        }

        tally
    }

    fn prefilter(&mut self, task: &TaskDescriptor) -> Prefilter {
        if task.status == TaskStatus::Done {
            // Completed out of band; count it without re-attempting or
            // re-notifying.
            self.confirmed.insert(task.id.clone());
            return Prefilter::Processed;
        }
        if task.requires_secret || task.kind == TaskKind::SecretRequired {
            return Prefilter::NeedsSecret;
        }
        if task.kind == TaskKind::RollCall {
            return Prefilter::Skipped("roll call needs a live response");
        }
        if task.kind == TaskKind::ScanCode {
            // Unsupported kind, never attempted again.
            self.invalid.insert(task.id.clone());
            return Prefilter::Skipped("scan code needs a physical code");
        }
        match task.status {
            TaskStatus::NotStarted => Prefilter::Skipped("not yet open"),
            TaskStatus::Closed => Prefilter::Skipped("closed"),
            _ => Prefilter::Attempt,
        }
    }

    /// Submit the attempt with bounded retries. Returns the response body,
    /// or `None` when the task could not be answered this cycle.
    async fn attempt_task(
        &mut self,
        group_id: &str,
        task: &TaskDescriptor,
        coordinate: &GeneratedCoordinate,
    ) -> Option<String> {
        let coordinate = self.effective_coordinate(task, coordinate);

        for attempt in 1..=ATTEMPTS_PER_TASK {
            match self.client.attempt(group_id, task, &coordinate).await {
                Ok(body) => return Some(body),
                Err(crate::error::AttemptError::Status(404)) => {
                    warn!(task = %task.id, "task no longer exists");
                    self.invalid.insert(task.id.clone());
                    return None;
                }
                Err(crate::error::AttemptError::Status(code @ (401 | 403))) => {
                    warn!(
                        task = %task.id,
                        code,
                        "attempt rejected, session credential may have expired"
                    );
                    self.display.credential_warning();
                    return None;
                }
                Err(e) => {
                    warn!(task = %task.id, attempt, error = %e, "attempt failed");
                    if attempt < ATTEMPTS_PER_TASK {
                        let backoff = RETRY_BACKOFF_SECS * u64::from(attempt);
                        if !self.signal.sleep_while_running(backoff).await {
                            return None;
                        }
                    }
                }
            }
        }
        None
    }

    /// Geofenced tasks get a coordinate near the fence center instead of
    /// the cycle coordinate, offset within the per-task limit.
    fn effective_coordinate(
        &mut self,
        task: &TaskDescriptor,
        cycle_coordinate: &GeneratedCoordinate,
    ) -> GeneratedCoordinate {
        let Some(fence) = task.geofence else {
            return cycle_coordinate.clone();
        };
        let limit = self.simulator.task_offset_limit(fence.radius_m);
        let (lat, lng) = self
            .simulator
            .offset(fence.lat, fence.lng, limit, &mut self.rng);
        GeneratedCoordinate {
            lat,
            lng,
            accuracy: DEFAULT_ACCURACY_M,
            source: "geofence".to_string(),
        }
    }

    async fn apply_outcome(
        &mut self,
        group_id: &str,
        task: &TaskDescriptor,
        outcome: Outcome,
        tally: &mut GroupTally,
    ) {
        self.display.task_outcome(&task.id, &task.title, outcome);
        match outcome {
            Outcome::Success => {
                self.confirmed.insert(task.id.clone());
                self.total_confirmed += 1;
                self.groups_succeeded.insert(group_id.to_string());
                tally.processed += 1;
                self.notify_once(task, NotifyEvent::Success, group_id).await;
            }
            Outcome::AlreadyDone => {
                self.confirmed.insert(task.id.clone());
                self.groups_succeeded.insert(group_id.to_string());
                tally.processed += 1;
                self.notify_once(task, NotifyEvent::AlreadyDone, group_id).await;
            }
            Outcome::NeedsSecret => {
                self.invalid.insert(task.id.clone());
                self.notify_once(task, NotifyEvent::NeedsSecret, group_id).await;
                tally.skipped += 1;
            }
            Outcome::InvalidOrNotFound => {
                self.invalid.insert(task.id.clone());
                tally.skipped += 1;
            }
            Outcome::NotOpenOrClosed | Outcome::OutOfRange => {
                tally.skipped += 1;
            }
            Outcome::Ambiguous => {
                if self.settings.confirm_ambiguous {
                    info!(task = %task.id, "ambiguous response treated as confirmed");
                    self.confirmed.insert(task.id.clone());
                    self.total_confirmed += 1;
                    self.groups_succeeded.insert(group_id.to_string());
                    tally.processed += 1;
                    self.notify_once(task, NotifyEvent::Success, group_id).await;
                } else {
                    tally.skipped += 1;
                }
            }
        }
    }

    /// Fire a notification at most once per task and event for the session.
    async fn notify_once(&mut self, task: &TaskDescriptor, event: NotifyEvent, group_id: &str) {
        let key = (task.id.clone(), event);
        if self.notified.contains(&key) {
            return;
        }
        self.notified.insert(key);
        let context = if task.title.is_empty() {
            format!("task {} in group {group_id}", task.id)
        } else {
            format!("'{}' ({}) in group {group_id}", task.title, task.id)
        };
        if !self.notifier.notify(event, &context).await {
            warn!(task = %task.id, event = event.label(), "notification delivery failed");
        }
    }

    /// Whether the configured exit-after-success condition holds.
    #[must_use]
    pub fn exit_satisfied(&self) -> bool {
        if !self.settings.exit_after_success.enabled {
            return false;
        }
        match self.settings.exit_after_success.mode {
            ExitMode::Any => self
                .settings
                .group_ids
                .iter()
                .any(|g| self.groups_succeeded.contains(g)),
            ExitMode::All => self
                .settings
                .group_ids
                .iter()
                .all(|g| self.groups_succeeded.contains(g)),
        }
    }

    /// Sleep out the configured interval in one-second slices, ending
    /// early on shutdown or an immediate-cycle request.
    async fn wait_for_next_cycle(&mut self) {
        let interval = self.settings.interval_secs;
        self.next_cycle_time = Some(Utc::now() + ChronoDuration::seconds(interval as i64));

        for remaining in (1..=interval).rev() {
            if !self.signal.is_set() {
                break;
            }
            if self.flags.take_run_now() {
                info!("immediate cycle requested");
                break;
            }
            if self.notice_due() {
                self.display.waiting_notice(remaining);
            }
            if !self.signal.sleep_while_running(1).await {
                break;
            }
        }
        self.next_cycle_time = None;
    }

    /// Throttle repeated waiting notices to one per minute.
    fn notice_due(&mut self) -> bool {
        let now = Utc::now();
        let due = self
            .last_notice_time
            .is_none_or(|t| (now - t).num_seconds() >= NOTICE_THROTTLE_SECS);
        if due {
            self.last_notice_time = Some(now);
        }
        due
    }
}

enum Prefilter {
    Attempt,
    Processed,
    Skipped(&'static str),
    NeedsSecret,
}
