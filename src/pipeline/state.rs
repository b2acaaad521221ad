//! Per-folder pipeline state machine: states, legal transitions, and the
//! operation kinds each phase is allowed to issue.

use serde::Serialize;

use crate::core::errors::{Result, UnpackrError};
use crate::safety::OperationKind;

/// Pipeline state for one source folder. Transitions are forward-only; any
/// phase may short-circuit to `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelinePhase {
    Discovered,
    Scanning,
    Classified,
    ParityPhase,
    ExtractPhase,
    ValidatePhase,
    MovePhase,
    CleanupPhase,
    Deleted,
    Preserved,
    Errored,
}

impl PipelinePhase {
    /// Stable name used in audit records and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Discovered => "Discovered",
            Self::Scanning => "Scanning",
            Self::Classified => "Classified",
            Self::ParityPhase => "ParityPhase",
            Self::ExtractPhase => "ExtractPhase",
            Self::ValidatePhase => "ValidatePhase",
            Self::MovePhase => "MovePhase",
            Self::CleanupPhase => "CleanupPhase",
            Self::Deleted => "Deleted",
            Self::Preserved => "Preserved",
            Self::Errored => "Errored",
        }
    }

    const fn order(self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Scanning => 1,
            Self::Classified => 2,
            Self::ParityPhase => 3,
            Self::ExtractPhase => 4,
            Self::ValidatePhase => 5,
            Self::MovePhase => 6,
            Self::CleanupPhase => 7,
            Self::Deleted | Self::Preserved | Self::Errored => 8,
        }
    }

    /// Whether this state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Preserved | Self::Errored)
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// Forward-only, with two sanctioned jumps: `Classified → Preserved`
    /// (content folders) and `Classified → CleanupPhase` (junk folders).
    /// `Errored` is reachable from any non-terminal state.
    #[must_use]
    pub fn may_transition(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Errored => true,
            Self::Preserved => self == Self::Classified,
            Self::Deleted => self == Self::CleanupPhase,
            Self::CleanupPhase => matches!(
                self,
                Self::Classified
                    | Self::ParityPhase
                    | Self::ExtractPhase
                    | Self::ValidatePhase
                    | Self::MovePhase
            ),
            _ => next.order() == self.order() + 1,
        }
    }

    /// Which operation kinds this phase may issue (invariant I7).
    #[must_use]
    pub const fn may_issue(self, kind: OperationKind) -> bool {
        match self {
            Self::ExtractPhase => matches!(kind, OperationKind::WriteFile),
            Self::ValidatePhase => matches!(kind, OperationKind::DeleteFile),
            Self::MovePhase => matches!(kind, OperationKind::MoveFile),
            Self::CleanupPhase => {
                matches!(kind, OperationKind::DeleteFile | OperationKind::DeleteFolder)
            }
            _ => false,
        }
    }
}

/// State holder that refuses illegal transitions.
///
/// An illegal transition is a programmer error, not an external condition,
/// so it surfaces as a structured error the orchestrator treats as a
/// `HardFail` for the folder.
#[derive(Debug)]
pub struct PhaseTracker {
    current: PipelinePhase,
}

impl PhaseTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: PipelinePhase::Discovered,
        }
    }

    #[must_use]
    pub const fn current(&self) -> PipelinePhase {
        self.current
    }

    /// Advance to `next`, refusing illegal transitions.
    pub fn advance(&mut self, next: PipelinePhase) -> Result<()> {
        if !self.current.may_transition(next) {
            return Err(UnpackrError::IllegalTransition {
                from: self.current.name(),
                to: next.name(),
            });
        }
        self.current = next;
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
