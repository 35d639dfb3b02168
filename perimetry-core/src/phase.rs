/// Lifecycle of the stimulus scheduler.
///
/// Exactly one state holds at a time. `Idle` means no trial is active and the
/// next one may start; `Finished` is terminal.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    TrialActive,
    InterTrialCooldown,
    Finished,
}

impl SchedulerState {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// Any non-terminal state may jump to `Finished` so a forced shutdown can
    /// close the run from wherever it was suspended.
    pub fn can_transition_to(&self, next: SchedulerState) -> bool {
        use SchedulerState::*;
        matches!(
            (self, next),
            (Idle, TrialActive)
                | (TrialActive, InterTrialCooldown)
                | (InterTrialCooldown, Idle)
                | (Idle | TrialActive | InterTrialCooldown, Finished)
        )
    }

    pub fn is_trial_active(&self) -> bool {
        matches!(self, Self::TrialActive)
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, Self::InterTrialCooldown)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}
