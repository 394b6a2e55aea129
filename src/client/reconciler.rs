//! Decides whether a server push may overwrite what the user is looking at.
//!
//! While the user has an edit form open, a push does not refetch; it raises
//! a notice instead and the user picks between reloading (losing the draft)
//! and dismissing (keeping it).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilerState {
    /// No local edit in progress.
    #[default]
    Idle,
    /// An edit form is open.
    Editing,
    /// A push arrived while editing; the refresh is deferred.
    PendingUpdateNotice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerEvent {
    BeginEdit,
    Save,
    Cancel,
    PushReceived,
    ChooseReload,
    Dismiss,
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Refetch and replace cached query data.
    Refetch,
    /// Throw away the edit draft, then refetch.
    DiscardDraftAndRefetch,
}

impl ReconcilerState {
    /// Apply `event`, returning the next state and the effect to run.
    pub fn transition(self, event: ReconcilerEvent) -> (ReconcilerState, Effect) {
        use Effect as E;
        use ReconcilerEvent as Ev;
        use ReconcilerState::*;

        match (self, event) {
            (Idle, Ev::BeginEdit) => (Editing, E::None),
            (Idle, Ev::PushReceived) => (Idle, E::Refetch),

            (Editing, Ev::Save | Ev::Cancel) => (Idle, E::None),
            (Editing, Ev::PushReceived) => (PendingUpdateNotice, E::None),

            (PendingUpdateNotice, Ev::ChooseReload) => (Idle, E::DiscardDraftAndRefetch),
            (PendingUpdateNotice, Ev::Dismiss) => (Editing, E::None),
            // Leaving the form while a refresh is deferred applies it.
            (PendingUpdateNotice, Ev::Save | Ev::Cancel) => (Idle, E::Refetch),
            (PendingUpdateNotice, Ev::PushReceived) => (PendingUpdateNotice, E::None),

            (state, _) => (state, E::None),
        }
    }

    pub fn is_editing(self) -> bool {
        matches!(self, Self::Editing | Self::PendingUpdateNotice)
    }

    pub fn has_pending_update(self) -> bool {
        self == Self::PendingUpdateNotice
    }
}
