//! Per-address liveness state machine.
//!
//! Kept free of IO so the rules can be checked exhaustively. The echo
//! cross-check against the latest link-layer sweep is a separate guard
//! ([`echo_signal`]) evaluated before [`transition`].

use crate::pool::{EntryPatch, Usage};
use chrono::{DateTime, Utc};

/// Evidence about one address from one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The address answered (link-layer sighting or echo reply)
    Alive,
    /// The echo probe failed and the address was not seen at the link layer
    Unreachable,
}

/// What a signal does to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `in_use` flips; both timestamps move
    Changed(Usage),
    /// `in_use` stays; only `last_checked_at` moves
    Checked,
}

pub fn transition(previous: Usage, signal: Signal) -> Transition {
    match (previous, signal) {
        (Usage::Unknown | Usage::Free, Signal::Alive) => Transition::Changed(Usage::InUse),
        (Usage::InUse, Signal::Alive) => Transition::Checked,
        (Usage::InUse, Signal::Unreachable) => Transition::Changed(Usage::Free),
        // An address never seen alive stays unknown rather than free
        (Usage::Free | Usage::Unknown, Signal::Unreachable) => Transition::Checked,
    }
}

/// Turn an echo result into a signal.
///
/// A failed echo for an address the last link-layer sweep saw yields no
/// signal at all: no demotion and no `last_checked_at` refresh. Such an
/// address keeps its old check time for as long as it stays firewalled.
pub fn echo_signal(alive: bool, seen_on_link: bool) -> Option<Signal> {
    match (alive, seen_on_link) {
        (true, _) => Some(Signal::Alive),
        (false, true) => None,
        (false, false) => Some(Signal::Unreachable),
    }
}

impl Transition {
    pub fn patch(self, now: DateTime<Utc>) -> EntryPatch {
        match self {
            Transition::Changed(usage) => EntryPatch {
                in_use: Some(usage),
                last_checked_at: Some(now),
                last_changed_at: Some(now),
                ..EntryPatch::default()
            },
            Transition::Checked => EntryPatch {
                last_checked_at: Some(now),
                ..EntryPatch::default()
            },
        }
    }
}
