//! Simulation time model.
//!
//! # Design
//!
//! Virtual time is an absolute millisecond count since the Unix epoch, held
//! in [`SimTime`].  The driver advances it in fixed increments (the iteration
//! size); all schedule arithmetic is integer math, so comparisons are exact
//! and O(1).
//!
//! A scheduled wake-up is a [`DueTime`]: either a concrete instant or
//! `Indefinite` ("never, until someone wakes me explicitly").  `DueTime`
//! derives `Ord` with `Indefinite` comparing greatest, which lets event
//! queues and min-folds treat sleeping twins uniformly instead of reserving
//! a magic far-future timestamp.
//!
//! [`Delay`] is the tri-state a behavior hands back to the controller: no
//! request, a finite offset, or sleep indefinitely.

use std::fmt;

// ── SimTime ──────────────────────────────────────────────────────────────────

/// An absolute virtual timestamp, in milliseconds since the Unix epoch.
///
/// Stored as `u64`: at millisecond resolution a u64 lasts ~584 million years,
/// so overflow is not a practical concern.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// The instant `millis` after `self`.
    #[inline]
    pub fn offset(self, millis: u64) -> SimTime {
        SimTime(self.0 + millis)
    }

    /// Milliseconds elapsed from `earlier` to `self`.
    ///
    /// # Panics
    /// Panics in debug mode if `earlier > self`.
    #[inline]
    pub fn since(self, earlier: SimTime) -> u64 {
        self.0 - earlier.0
    }
}

impl std::ops::Add<u64> for SimTime {
    type Output = SimTime;
    #[inline]
    fn add(self, rhs: u64) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl std::ops::Sub for SimTime {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: SimTime) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ── DueTime ──────────────────────────────────────────────────────────────────

/// When an event is next due.
///
/// The derived `Ord` places `Indefinite` after every `At(_)`, so the minimum
/// of a set of due times is always the earliest concrete instant when one
/// exists.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DueTime {
    /// Due at a concrete virtual instant.
    At(SimTime),
    /// Not due until explicitly rescheduled (an indefinitely delayed twin).
    Indefinite,
}

impl DueTime {
    #[inline]
    pub fn is_indefinite(self) -> bool {
        matches!(self, DueTime::Indefinite)
    }

    /// The concrete instant, if there is one.
    #[inline]
    pub fn instant(self) -> Option<SimTime> {
        match self {
            DueTime::At(t) => Some(t),
            DueTime::Indefinite => None,
        }
    }
}

impl fmt::Display for DueTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueTime::At(t) => write!(f, "{t}"),
            DueTime::Indefinite => write!(f, "indefinite"),
        }
    }
}

// ── Delay ────────────────────────────────────────────────────────────────────

/// A delay request recorded by the invocation controller during one firing.
///
/// `Finite(0)` is meaningful: it asks for an immediate re-fire within the
/// current step, not "no delay".
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Delay {
    /// No delay requested; the default cadence applies.
    #[default]
    None,
    /// Re-fire `millis` after the current instant.
    Finite(u64),
    /// Sleep until explicitly woken.
    Indefinite,
}

impl Delay {
    #[inline]
    pub fn is_requested(self) -> bool {
        !matches!(self, Delay::None)
    }
}
