use std::fmt;

use serde::Serialize;

/// A named stage of an ingest run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    UploadingStorage,
    InsertingAccount,
    InsertingTweets,
    InsertingLikes,
    InsertingMentions,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::UploadingStorage => "UploadingStorage",
            Phase::InsertingAccount => "InsertingAccount",
            Phase::InsertingTweets => "InsertingTweets",
            Phase::InsertingLikes => "InsertingLikes",
            Phase::InsertingMentions => "InsertingMentions",
            Phase::Done => "Done",
        }
    }

    /// Human-readable label used in progress output.
    pub fn label(self) -> &'static str {
        match self {
            Phase::UploadingStorage => "Uploading archive",
            Phase::InsertingAccount => "Inserting account",
            Phase::InsertingTweets => "Inserting tweets",
            Phase::InsertingLikes => "Inserting likes",
            Phase::InsertingMentions => "Inserting mentions",
            Phase::Done => "Done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Running(Phase),
    Done,
    Failed(Phase),
}

impl IngestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestState::Done | IngestState::Failed(_))
    }

    /// Move to `phase`. Phases only move forward; terminal states are final.
    pub(crate) fn enter(&mut self, phase: Phase) {
        debug_assert!(
            match *self {
                IngestState::Idle => true,
                IngestState::Running(current) => current < phase,
                IngestState::Done | IngestState::Failed(_) => false,
            },
            "invalid transition {self:?} -> {phase:?}"
        );
        *self = if phase == Phase::Done {
            IngestState::Done
        } else {
            IngestState::Running(phase)
        };
    }

    pub(crate) fn fail(&mut self, phase: Phase) {
        debug_assert!(!self.is_terminal(), "{self:?} is terminal");
        *self = IngestState::Failed(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::UploadingStorage < Phase::InsertingAccount);
        assert!(Phase::InsertingAccount < Phase::InsertingTweets);
        assert!(Phase::InsertingTweets < Phase::InsertingLikes);
        assert!(Phase::InsertingLikes < Phase::InsertingMentions);
        assert!(Phase::InsertingMentions < Phase::Done);
    }

    #[test]
    fn skipping_phases_is_allowed() {
        let mut state = IngestState::Idle;
        state.enter(Phase::UploadingStorage);
        state.enter(Phase::InsertingAccount);
        state.enter(Phase::InsertingTweets);
        state.enter(Phase::Done);
        assert_eq!(state, IngestState::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn failure_records_phase() {
        let mut state = IngestState::Idle;
        state.enter(Phase::UploadingStorage);
        state.fail(Phase::UploadingStorage);
        assert_eq!(state, IngestState::Failed(Phase::UploadingStorage));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid transition")]
    fn going_back_panics_in_debug() {
        let mut state = IngestState::Idle;
        state.enter(Phase::InsertingTweets);
        state.enter(Phase::InsertingAccount);
    }
}
