//! The stimulus scheduler: one cooperative task that walks the plan, plus a
//! trigger path that may fire at any point while that task is suspended.
//!
//! ```text
//! Idle -> TrialActive -(display)-> InterTrialCooldown -(delay)-> Idle ... -> Finished
//! ```
//!
//! Both paths mutate [`RunState`] only under its mutex, and a trial record
//! accepts a single classification, so a trigger hit and the post-display
//! timeout can never both resolve the same trial.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use perimetry_core::{
    Classification, Collaborator, DisplaySink, FalsePositiveRecord, GazeOracle, PerimetryError,
    PostProcessor, Result, SchedulerState, StimulusPlan,
};
use perimetry_timing::Timer;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ExperimentConfig;
use crate::log::{LogSinks, RunInfo, RunSummary, TrialLog};
use crate::threshold::{ThresholdEntry, ThresholdTable};
use crate::trial::ActiveTrial;

/// Where the trial task is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionPoint {
    Display,
    Cooldown,
}

impl fmt::Display for SuspensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SuspensionPoint::Display => "display",
            SuspensionPoint::Cooldown => "cooldown",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped by a shutdown request; data was still flushed.
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub summary: RunSummary,
    pub thresholds: Vec<ThresholdEntry>,
    pub log: TrialLog,
}

/// Result of a trigger press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Credited to the active trial.
    Hit { index: usize, latency: Duration },
    /// Trial active but the response limit had already passed.
    Late { index: usize },
    /// The active trial was resolved earlier.
    AlreadyClassified { index: usize },
    /// Pressed between trials.
    FalsePositive,
    /// Before the run started or after it ended.
    Ignored,
}

/// State shared between the trial task and the trigger path.
pub(crate) struct RunState {
    state: SchedulerState,
    displayed: usize,
    test_start: Duration,
    onset: Option<Duration>,
    pressed: bool,
    gaze: Option<Arc<dyn GazeOracle>>,
    log: TrialLog,
}

impl RunState {
    fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            displayed: 0,
            test_start: Duration::ZERO,
            onset: None,
            pressed: false,
            gaze: None,
            log: TrialLog::new(),
        }
    }

    /// Single guarded entry point for every state change.
    fn transition(&mut self, next: SchedulerState) -> bool {
        let legal = self.state.can_transition_to(next);
        debug_assert!(legal, "illegal transition {:?} -> {:?}", self.state, next);
        if !legal {
            error!(from = ?self.state, to = ?next, "illegal scheduler transition");
            return false;
        }
        debug!(from = ?self.state, to = ?next, "scheduler transition");
        self.state = next;
        true
    }

    fn is_fixating(&self) -> bool {
        self.gaze
            .as_ref()
            .is_some_and(|g| g.is_fixating_active_stimulus())
    }

    fn since_start(&self, now: Duration) -> f64 {
        now.saturating_sub(self.test_start).as_secs_f64()
    }
}

fn lock(shared: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subject response input. Cheap to clone; safe to call from any thread.
#[derive(Clone)]
pub struct TriggerHandle<T: Timer> {
    shared: Arc<Mutex<RunState>>,
    timer: T,
    response_limit: Duration,
}

impl<T: Timer> TriggerHandle<T> {
    pub fn press(&self) -> TriggerOutcome {
        let now = self.timer.now();
        let mut run = lock(&self.shared);
        run.pressed = true;

        match run.state {
            SchedulerState::TrialActive => {
                let (Some(index), Some(onset)) = (run.log.current_index(), run.onset) else {
                    return TriggerOutcome::Ignored;
                };
                let latency = now.saturating_sub(onset);
                if latency > self.response_limit {
                    debug!(trial = index, latency_ms = latency.as_secs_f64() * 1e3, "late press");
                    return TriggerOutcome::Late { index };
                }
                let hit = Classification::Hit {
                    response_time_since_start: run.since_start(now),
                    latency: latency.as_secs_f64(),
                    was_fixating: run.is_fixating(),
                };
                match run.log.classify(index, hit) {
                    Ok(true) => {
                        info!(
                            trial = index,
                            latency_ms = latency.as_secs_f64() * 1e3,
                            "response recorded"
                        );
                        TriggerOutcome::Hit { index, latency }
                    }
                    Ok(false) => TriggerOutcome::AlreadyClassified { index },
                    Err(e) => {
                        error!(error = %e, "active trial missing from log");
                        TriggerOutcome::Ignored
                    }
                }
            }
            SchedulerState::InterTrialCooldown => {
                let record = FalsePositiveRecord {
                    time_since_start: run.since_start(now),
                    time_since_last_onset: run
                        .onset
                        .map_or(0.0, |o| now.saturating_sub(o).as_secs_f64()),
                };
                run.log.record_false_positive(record);
                info!(at = record.time_since_start, "false positive between trials");
                TriggerOutcome::FalsePositive
            }
            SchedulerState::Idle | SchedulerState::Finished => TriggerOutcome::Ignored,
        }
    }

    /// Clears the pressed flag. No scheduling or recording effect.
    pub fn release(&self) {
        lock(&self.shared).pressed = false;
    }

    pub fn is_pressed(&self) -> bool {
        lock(&self.shared).pressed
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.shared).state
    }

    /// Stimuli shown so far.
    pub fn displayed(&self) -> usize {
        lock(&self.shared).displayed
    }
}

/// Requests early termination. The run still hides the stimulus, stops
/// tracking and flushes every sink before returning.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub struct StimulusScheduler<T, R, W>
where
    T: Timer,
    R: Rng,
    W: Write,
{
    plan: StimulusPlan,
    config: ExperimentConfig,
    timer: T,
    rng: R,
    thresholds: ThresholdTable,
    sinks: LogSinks<W>,
    display: Option<Box<dyn DisplaySink>>,
    post_processor: Option<(Box<dyn PostProcessor>, PathBuf)>,
    active: Option<ActiveTrial>,
    shared: Arc<Mutex<RunState>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T, R, W> StimulusScheduler<T, R, W>
where
    T: Timer,
    R: Rng + Send,
    W: Write + Send,
{
    pub fn new(
        plan: StimulusPlan,
        config: ExperimentConfig,
        timer: T,
        rng: R,
        sinks: LogSinks<W>,
    ) -> Result<Self> {
        config.validate()?;
        let thresholds = ThresholdTable::new(config.staircase(), plan.positions());
        let (tx, rx) = watch::channel(false);
        Ok(Self {
            plan,
            config,
            timer,
            rng,
            thresholds,
            sinks,
            display: None,
            post_processor: None,
            active: None,
            shared: Arc::new(Mutex::new(RunState::new())),
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        })
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_gaze(self, gaze: Arc<dyn GazeOracle>) -> Self {
        lock(&self.shared).gaze = Some(gaze);
        self
    }

    /// `output` is handed to the post-processor after a completed run.
    pub fn with_post_processor(
        mut self,
        post_processor: Box<dyn PostProcessor>,
        output: PathBuf,
    ) -> Self {
        self.post_processor = Some((post_processor, output));
        self
    }

    pub fn trigger_handle(&self) -> TriggerHandle<T> {
        TriggerHandle {
            shared: Arc::clone(&self.shared),
            timer: self.timer.clone(),
            response_limit: self.plan.response_time_limit(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.shared).state
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// Runs the whole plan. Sinks are flushed whether the run completes,
    /// is shut down, or fails on an internal invariant.
    pub async fn run(mut self) -> Result<RunReport> {
        self.report_degraded_collaborators();
        lock(&self.shared).test_start = self.timer.now();
        info!(
            stimuli = self.plan.total_stimuli(),
            positions = self.thresholds.len(),
            response_limit_s = self.plan.response_time_limit().as_secs_f64(),
            "run started"
        );

        let outcome = self.drive().await;
        self.finish(outcome)
    }

    fn report_degraded_collaborators(&self) {
        if self.display.is_none() {
            warn!("{}", PerimetryError::MissingCollaborator(Collaborator::Display));
        }
        if lock(&self.shared).gaze.is_none() {
            warn!(
                "{}; every trial counts as not fixating",
                PerimetryError::MissingCollaborator(Collaborator::Gaze)
            );
        }
        if self.post_processor.is_none() {
            debug!("{}", PerimetryError::MissingCollaborator(Collaborator::PostProcessor));
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome> {
        let total = self.plan.total_stimuli();
        for slot in 0..total {
            if *self.shutdown_rx.borrow() {
                return Ok(RunOutcome::Aborted);
            }

            self.start_trial(slot)?;
            if !self.suspend(self.config.display_duration(), SuspensionPoint::Display).await {
                return Ok(RunOutcome::Aborted);
            }
            self.end_trial()?;

            let delay = self.draw_cooldown();
            if !self.suspend(delay, SuspensionPoint::Cooldown).await {
                return Ok(RunOutcome::Aborted);
            }
            if slot + 1 < total {
                lock(&self.shared).transition(SchedulerState::Idle);
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Parks the task for `d`. Returns `false` if shutdown cut it short.
    async fn suspend(&mut self, d: Duration, point: SuspensionPoint) -> bool {
        let sleep = self.timer.sleep(d);
        let shutdown = shutdown_requested(&mut self.shutdown_rx);
        tokio::select! {
            _ = sleep => true,
            _ = shutdown => {
                info!(%point, "shutdown requested while suspended");
                false
            }
        }
    }

    fn draw_cooldown(&mut self) -> Duration {
        let (lo, hi) = self.config.cooldown_range_ms;
        Duration::from_millis(self.rng.random_range(lo..=hi))
    }

    fn start_trial(&mut self, slot: usize) -> Result<()> {
        let position = self
            .plan
            .position(slot)
            .ok_or(PerimetryError::UnknownTrial(slot + 1))?;
        let opacity = self.thresholds.get(&position)?;

        let mut run = lock(&self.shared);
        let handle = self.display.as_mut().map(|d| d.show(position, opacity));
        let onset = self.timer.now();
        let index = run.log.open_trial(position);
        run.onset = Some(onset);
        run.displayed += 1;
        run.transition(SchedulerState::TrialActive);
        drop(run);

        info!(trial = index, %position, opacity, "stimulus shown");
        self.active = Some(ActiveTrial {
            index,
            position,
            onset,
            handle,
        });
        Ok(())
    }

    fn end_trial(&mut self) -> Result<()> {
        let Some(trial) = self.active.take() else {
            return Ok(());
        };
        let limit = self.plan.response_time_limit();

        let mut run = lock(&self.shared);
        if let (Some(display), Some(handle)) = (self.display.as_mut(), trial.handle) {
            display.hide(handle);
        }
        let now = self.timer.now();
        let was_fixating = run.is_fixating();
        let threshold = self.thresholds.adjust(&trial.position, was_fixating)?;
        let latency = now.saturating_sub(trial.onset);

        let already = run
            .log
            .get(trial.index)
            .ok_or(PerimetryError::UnknownTrial(trial.index))?
            .is_classified();
        let resolution = if already {
            "trigger"
        } else if self.config.credit_unanswered_within_limit && latency <= limit {
            let hit = Classification::Hit {
                response_time_since_start: run.since_start(now),
                latency: latency.as_secs_f64(),
                was_fixating,
            };
            run.log.classify(trial.index, hit)?;
            "credited"
        } else {
            let time_since_start = run.since_start(now);
            run.log.classify(trial.index, Classification::TimedOut)?;
            run.log.record_false_positive(FalsePositiveRecord {
                time_since_start,
                time_since_last_onset: latency.as_secs_f64(),
            });
            "timeout"
        };
        run.transition(SchedulerState::InterTrialCooldown);
        drop(run);

        debug!(
            trial = trial.index,
            was_fixating,
            threshold,
            resolution,
            "stimulus hidden"
        );
        Ok(())
    }

    fn finish(mut self, outcome: Result<RunOutcome>) -> Result<RunReport> {
        let mut run = lock(&self.shared);
        if let Some(trial) = self.active.take() {
            if let (Some(display), Some(handle)) = (self.display.as_mut(), trial.handle) {
                display.hide(handle);
            }
        }
        run.transition(SchedulerState::Finished);
        if let Some(gaze) = &run.gaze {
            gaze.stop();
        }

        let info = RunInfo {
            stimulus_label: self.config.stimulus_label.clone(),
            canvas_label: self.config.canvas_label.clone(),
            response_time_limit: self.plan.response_time_limit().as_secs_f64(),
        };
        let thresholds = self.thresholds.entries();
        let completion = self.timer.now().as_secs_f64();
        let flushed = run.log.flush(&mut self.sinks, completion, &info, &thresholds);
        let summary = run.log.summary();
        let log = std::mem::take(&mut run.log);
        drop(run);

        let outcome = match (outcome, flushed) {
            (Ok(outcome), Ok(())) => outcome,
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    error!(error = %flush_err, "failed to flush run data after error");
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
        };

        info!(
            outcome = ?outcome,
            trials = summary.trials,
            hits = summary.hits,
            timeouts = summary.timeouts,
            false_positives = summary.false_positives,
            hit_rate = summary.hit_rate(),
            mean_latency_s = summary.mean_latency,
            "run finished"
        );

        if outcome == RunOutcome::Completed {
            if let Some((post_processor, output)) = &self.post_processor {
                post_processor.notify_run_complete(output);
            }
        }

        Ok(RunReport {
            outcome,
            summary,
            thresholds,
            log,
        })
    }
}
