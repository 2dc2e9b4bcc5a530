//! Unit-graph traversal.
//!
//! Pure graph walking over a process's unit list. Successor links are
//! `u16` indices into `Process::units`, never references; a 64-bit
//! visited bitmap bounds processes to `MAX_UNITS` units and detects
//! revisits in constant time.
//!
//! Forks are surfaced to the visitor through `Unit::forks` and are
//! never traversed here.

use std::fmt;

use crate::domain::{Process, Unit};

/// Upper bound on `Process::units` — the visited bitmap is 64 bits and
/// index 0 doubles as the reserved "none" successor.
pub const MAX_UNITS: usize = 63;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Traversal failures independent of any visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkError {
    /// The process has no units to visit.
    Empty,
    /// The process has more units than the visited bitmap can track.
    TooManyUnits(usize),
    /// The requested start index is not a unit of the process.
    StartOutOfRange { start: u16, len: usize },
    /// A non-terminal unit has no successor (`next == 0`).
    DanglingNext { at: u16 },
    /// The successor link revisits an already-visited unit.
    Cycle { at: u16, next: u16 },
    /// The successor link points outside the unit list.
    NextOutOfRange { at: u16, next: u16, len: usize },
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkError::Empty => write!(f, "no units to visit"),
            WalkError::TooManyUnits(n) => {
                write!(f, "too many units to visit: {} (limit {})", n, MAX_UNITS)
            }
            WalkError::StartOutOfRange { start, len } => {
                write!(f, "start index {} out of range (units: {})", start, len)
            }
            WalkError::DanglingNext { at } => {
                write!(f, "non-terminal unit {} has no next unit (zero idx)", at)
            }
            WalkError::Cycle { at, next } => {
                write!(f, "circular reference detected: unit {} links back to {}", at, next)
            }
            WalkError::NextOutOfRange { at, next, len } => {
                write!(f, "unit {} next index {} out of range (units: {})", at, next, len)
            }
        }
    }
}

impl std::error::Error for WalkError {}

/// Outcome of a walk with a fallible visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitError<E> {
    /// The graph itself is ill-formed.
    Walk(WalkError),
    /// The visitor aborted the traversal.
    Visitor(E),
}

impl<E> From<WalkError> for VisitError<E> {
    fn from(err: WalkError) -> Self {
        VisitError::Walk(err)
    }
}

impl<E: fmt::Display> fmt::Display for VisitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitError::Walk(err) => err.fmt(f),
            VisitError::Visitor(err) => err.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for VisitError<E> {}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Walk the unit graph in `next`-linked order from `start_idx`,
/// invoking `visitor(index, unit)` for each visited unit.
///
/// The walk ends successfully at the first terminal unit. A visitor
/// error aborts immediately. Advancing checks revisit before the
/// reserved-zero and bounds conditions, so a back-edge to the entry
/// unit reports `Cycle` rather than `DanglingNext`.
pub fn visit_units<E, F>(
    process: &Process,
    start_idx: u16,
    mut visitor: F,
) -> Result<(), VisitError<E>>
where
    F: FnMut(u16, &Unit) -> Result<(), E>,
{
    let len = process.units.len();
    if len == 0 {
        return Err(WalkError::Empty.into());
    }
    if len > MAX_UNITS {
        return Err(WalkError::TooManyUnits(len).into());
    }
    if start_idx as usize >= len {
        return Err(WalkError::StartOutOfRange { start: start_idx, len }.into());
    }

    let mut idx = start_idx;
    let mut visited: u64 = 1 << start_idx;

    // The entry unit is the only one reached without an advance, so its
    // dangling check happens on arrival.
    {
        let unit = &process.units[idx as usize];
        if !unit.terminator.is_terminal() && unit.next == 0 {
            return Err(WalkError::DanglingNext { at: idx }.into());
        }
    }

    loop {
        let unit = &process.units[idx as usize];
        visitor(idx, unit).map_err(VisitError::Visitor)?;
        if unit.terminator.is_terminal() {
            return Ok(());
        }

        let next = unit.next;
        if (next as usize) < 64 && visited & (1u64 << next) != 0 {
            return Err(WalkError::Cycle { at: idx, next }.into());
        }
        if next == 0 {
            return Err(WalkError::DanglingNext { at: idx }.into());
        }
        if next as usize >= len {
            return Err(WalkError::NextOutOfRange { at: idx, next, len }.into());
        }
        visited |= 1 << next;
        idx = next;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, Terminator};

    fn unit(terminator: Terminator, sequence: u16, next: u16) -> Unit {
        Unit {
            terminator,
            sequence,
            next,
            forks: Vec::new(),
        }
    }

    fn process(units: Vec<Unit>) -> Process {
        Process {
            entity: Entity::default(),
            crc: 0,
            flags: 0,
            start: 0,
            config_crc: 0,
            units,
        }
    }

    /// Collect visited indices, never failing.
    fn collect(process: &Process, start: u16) -> Result<Vec<u16>, VisitError<()>> {
        let mut seen = Vec::new();
        visit_units(process, start, |idx, _u| {
            seen.push(idx);
            Ok::<(), ()>(())
        })?;
        Ok(seen)
    }

    #[test]
    fn single_terminal_unit() {
        let p = process(vec![unit(Terminator::End, 0, 0)]);
        assert_eq!(collect(&p, 0).unwrap(), vec![0]);
    }

    #[test]
    fn restart_is_terminal_too() {
        let p = process(vec![unit(Terminator::Restart, 0, 0)]);
        assert_eq!(collect(&p, 0).unwrap(), vec![0]);
    }

    #[test]
    fn linear_chain_of_max_units() {
        // 63-unit chain 0 → 1 → … → 62, last unit terminal.
        let mut units: Vec<Unit> = (0..62)
            .map(|i| unit(Terminator::Continue, 0, i + 1))
            .collect();
        units.push(unit(Terminator::End, 0, 0));
        let p = process(units);
        let seen = collect(&p, 0).unwrap();
        assert_eq!(seen.len(), MAX_UNITS);
        assert_eq!(seen, (0..63).collect::<Vec<u16>>());
    }

    #[test]
    fn cycle_back_to_entry_unit() {
        // U0 → U1 → U0: the walker reports the revisit, not a dangling
        // link, because the entry bit is seeded in the bitmap.
        let p = process(vec![
            unit(Terminator::Continue, 0, 1),
            unit(Terminator::Continue, 0, 0),
        ]);
        let err = collect(&p, 0).unwrap_err();
        assert_eq!(err, VisitError::Walk(WalkError::Cycle { at: 1, next: 0 }));
    }

    #[test]
    fn cycle_between_inner_units() {
        let p = process(vec![
            unit(Terminator::Continue, 0, 1),
            unit(Terminator::Continue, 0, 2),
            unit(Terminator::Continue, 0, 1),
        ]);
        let err = collect(&p, 0).unwrap_err();
        assert_eq!(err, VisitError::Walk(WalkError::Cycle { at: 2, next: 1 }));
    }

    #[test]
    fn dangling_next_on_entry_unit() {
        let p = process(vec![unit(Terminator::Continue, 0, 0)]);
        let err = collect(&p, 0).unwrap_err();
        assert_eq!(err, VisitError::Walk(WalkError::DanglingNext { at: 0 }));
    }

    #[test]
    fn dangling_next_with_nonzero_start() {
        // Starting at 2, a zero link with unit 0 unvisited is dangling.
        let p = process(vec![
            unit(Terminator::End, 0, 0),
            unit(Terminator::End, 0, 0),
            unit(Terminator::Continue, 0, 0),
        ]);
        let err = collect(&p, 2).unwrap_err();
        assert_eq!(err, VisitError::Walk(WalkError::DanglingNext { at: 2 }));
    }

    #[test]
    fn next_out_of_range() {
        let p = process(vec![
            unit(Terminator::Continue, 0, 5),
            unit(Terminator::End, 0, 0),
        ]);
        let err = collect(&p, 0).unwrap_err();
        assert_eq!(
            err,
            VisitError::Walk(WalkError::NextOutOfRange { at: 0, next: 5, len: 2 })
        );
    }

    #[test]
    fn preconditions() {
        let p = process(Vec::new());
        assert_eq!(collect(&p, 0).unwrap_err(), VisitError::Walk(WalkError::Empty));

        let p = process(vec![unit(Terminator::End, 0, 0); 64]);
        assert_eq!(
            collect(&p, 0).unwrap_err(),
            VisitError::Walk(WalkError::TooManyUnits(64))
        );

        let p = process(vec![unit(Terminator::End, 0, 0)]);
        assert_eq!(
            collect(&p, 3).unwrap_err(),
            VisitError::Walk(WalkError::StartOutOfRange { start: 3, len: 1 })
        );
    }

    #[test]
    fn visitor_error_aborts_traversal() {
        let p = process(vec![
            unit(Terminator::Continue, 0, 1),
            unit(Terminator::End, 0, 0),
        ]);
        let mut seen = Vec::new();
        let err = visit_units(&p, 0, |idx, _u| {
            seen.push(idx);
            Err("stop")
        })
        .unwrap_err();
        assert_eq!(err, VisitError::Visitor("stop"));
        assert_eq!(seen, vec![0]);
    }

    #[test]
    fn forks_are_surfaced_not_traversed() {
        let mut forked = unit(Terminator::End, 0, 0);
        forked.forks = vec![1, 2];
        let p = process(vec![
            forked,
            unit(Terminator::End, 1, 0),
            unit(Terminator::End, 2, 0),
        ]);
        let mut fork_lists = Vec::new();
        visit_units(&p, 0, |_idx, u| {
            fork_lists.push(u.forks.clone());
            Ok::<(), ()>(())
        })
        .unwrap();
        // Only the entry unit is visited; its forks are visible.
        assert_eq!(fork_lists, vec![vec![1, 2]]);
    }
}
