//! Trial state machine
//!
//! Drives one cognitive test through `Ready -> Instructions -> Running ->
//! Complete`. Time comes from the caller: [`TrialStateMachine::advance`] fires
//! due timers and [`TrialStateMachine::respond`] delivers key presses. Each
//! trial is resolved exactly once, by a qualifying response or by its timeout.
//!
//! Follow-up timers are scheduled from the deadline that fired, not from the
//! polling time, so a late `advance` replays the same schedule.

use super::sequence;
use super::summary::SessionSummary;
use super::types::{Phase, Response, ResponseKey, Stimulus, TestType, Trial, TrialOutcome};
use crate::config::CognitionConfig;
use crate::report::SessionReport;
use crate::timer::TimerQueue;
use crate::types::Millis;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CognitionTimer {
    LeadIn,
    TrialTimeout,
    InterTrial,
}

/// Something the presentation layer should react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent {
    TrialStarted { index: usize, stimulus: Stimulus },
    TrialResolved { trial: Trial },
    Completed { summary: SessionSummary },
}

/// The trial currently on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTrial {
    pub index: usize,
    pub stimulus: Stimulus,
    pub is_target: bool,
    pub presented_at: Millis,
    /// Set once the trial has an outcome; later responses are ignored
    pub response_taken: bool,
}

pub struct TrialStateMachine {
    test_type: TestType,
    config: CognitionConfig,
    phase: Phase,
    rng: StdRng,
    stimuli: Vec<Stimulus>,
    trials: Vec<Trial>,
    active: Option<ActiveTrial>,
    timers: TimerQueue<CognitionTimer>,
    summary: Option<SessionSummary>,
    completed_at: Option<DateTime<Utc>>,
}

impl TrialStateMachine {
    /// Create an idle machine. `seed` fixes the stimulus sequence.
    pub fn new(test_type: TestType, config: CognitionConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            test_type,
            config,
            phase: Phase::Ready,
            rng,
            stimuli: Vec::new(),
            trials: Vec::new(),
            active: None,
            timers: TimerQueue::new(),
            summary: None,
            completed_at: None,
        }
    }

    /// (Re)start the session: regenerate stimuli and show instructions.
    pub fn start(&mut self, now: Millis) {
        self.reset();
        self.stimuli = sequence::generate(self.test_type, &self.config, &mut self.rng);
        self.phase = Phase::Instructions;
        self.timers
            .arm(CognitionTimer::LeadIn, now + self.config.lead_in_ms);
        info!(
            test = %self.test_type,
            trials = self.stimuli.len(),
            "cognition session started"
        );
    }

    /// Fire every timer due at or before `now`, in deadline order.
    pub fn advance(&mut self, now: Millis) -> Vec<MachineEvent> {
        let mut events = Vec::new();
        while let Some((token, due_at)) = self.timers.pop_due(now) {
            match token.role {
                CognitionTimer::LeadIn if self.stimuli.is_empty() => {
                    events.push(self.complete());
                }
                CognitionTimer::LeadIn => {
                    self.phase = Phase::Running;
                    events.push(self.present(0, due_at));
                }
                CognitionTimer::TrialTimeout => {
                    if let Some(trial) = self.resolve(None, due_at) {
                        events.push(MachineEvent::TrialResolved { trial });
                    }
                }
                CognitionTimer::InterTrial => {
                    let next = self.active.map(|a| a.index + 1).unwrap_or(0);
                    if next < self.stimuli.len() {
                        events.push(self.present(next, due_at));
                    } else {
                        events.push(self.complete());
                    }
                }
            }
        }
        events
    }

    /// Deliver a response.
    ///
    /// Returns the resolved trial if the response was accepted. Responses
    /// outside a running trial, after its outcome, outside its response
    /// window or with a key the test does not use are ignored.
    pub fn respond(&mut self, response: Response) -> Option<Trial> {
        if self.phase != Phase::Running {
            return None;
        }
        let active = self.active?;
        if active.response_taken
            || !self.qualifies(response.key)
            || response.timestamp_ms < active.presented_at
        {
            return None;
        }
        match self.timers.deadline(CognitionTimer::TrialTimeout) {
            Some(deadline) if response.timestamp_ms <= deadline => {}
            _ => return None,
        }

        self.resolve(Some(response), response.timestamp_ms)
    }

    /// Cancel everything and return to `Ready` without recording the
    /// in-flight trial.
    pub fn reset(&mut self) {
        self.timers.cancel_all();
        self.active = None;
        self.trials.clear();
        self.stimuli.clear();
        self.summary = None;
        self.completed_at = None;
        self.phase = Phase::Ready;
    }

    fn present(&mut self, index: usize, at: Millis) -> MachineEvent {
        let stimulus = self.stimuli[index];
        let is_target = match self.test_type {
            TestType::Stroop => true,
            TestType::NBack => sequence::is_n_back_match(&self.stimuli, index, self.config.n_back),
            TestType::GoNoGo => stimulus == Stimulus::Go,
        };
        self.active = Some(ActiveTrial {
            index,
            stimulus,
            is_target,
            presented_at: at,
            response_taken: false,
        });
        self.timers
            .arm(CognitionTimer::TrialTimeout, at + self.config.trial_timeout_ms);
        debug!(index, %stimulus, is_target, "trial presented");
        MachineEvent::TrialStarted { index, stimulus }
    }

    fn qualifies(&self, key: ResponseKey) -> bool {
        match self.test_type {
            TestType::Stroop => key.is_color(),
            TestType::NBack | TestType::GoNoGo => key == ResponseKey::Press,
        }
    }

    /// Record the active trial's outcome and schedule the next trial
    fn resolve(&mut self, response: Option<Response>, at: Millis) -> Option<Trial> {
        let active = self.active.as_mut()?;
        if active.response_taken {
            return None;
        }
        active.response_taken = true;

        let outcome = match (self.test_type, response) {
            (TestType::Stroop, Some(r)) => match active.stimulus {
                Stimulus::Stroop { ink, .. } if ink.key() == r.key => TrialOutcome::Hit,
                _ => TrialOutcome::FalseAlarm,
            },
            (_, Some(_)) if active.is_target => TrialOutcome::Hit,
            (_, Some(_)) => TrialOutcome::FalseAlarm,
            (_, None) if active.is_target => TrialOutcome::Miss,
            (_, None) => TrialOutcome::CorrectRejection,
        };

        let trial = Trial {
            index: active.index,
            stimulus: active.stimulus,
            is_target: active.is_target,
            response: response.map(|r| r.key),
            reaction_time_ms: response.map(|r| r.timestamp_ms - active.presented_at),
            outcome,
        };
        debug!(index = trial.index, ?outcome, "trial resolved");

        self.trials.push(trial.clone());
        self.timers.cancel(CognitionTimer::TrialTimeout);
        self.timers
            .arm(CognitionTimer::InterTrial, at + self.config.inter_trial_ms);
        Some(trial)
    }

    fn complete(&mut self) -> MachineEvent {
        let summary = SessionSummary::from_trials(self.test_type, &self.trials);
        self.phase = Phase::Complete;
        self.active = None;
        self.summary = Some(summary.clone());
        self.completed_at = Some(Utc::now());
        info!(
            test = %self.test_type,
            accuracy = summary.accuracy_percent,
            d_prime = ?summary.d_prime,
            "cognition session complete"
        );
        MachineEvent::Completed { summary }
    }

    pub fn test_type(&self) -> TestType {
        self.test_type
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn stimuli(&self) -> &[Stimulus] {
        &self.stimuli
    }

    pub fn active_trial(&self) -> Option<&ActiveTrial> {
        self.active.as_ref()
    }

    /// Frozen summary, present once the session is complete
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Running summary over the trials recorded so far
    pub fn live_summary(&self) -> SessionSummary {
        SessionSummary::from_trials(self.test_type, &self.trials)
    }

    /// Whether any timer is still pending
    pub fn has_pending_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Report for a completed session
    pub fn report(&self) -> Option<SessionReport> {
        let summary = self.summary.clone()?;
        let timestamp = self.completed_at?;
        Some(SessionReport {
            test_type: self.test_type,
            timestamp,
            trials: self.trials.clone(),
            summary,
        })
    }
}
