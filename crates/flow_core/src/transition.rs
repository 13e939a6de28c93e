//! Bookkeeping of completed step changes and the direction hint the
//! rendering layer animates with.

use std::collections::VecDeque;

use serde::Serialize;
use shared::domain::{Direction, Step};
use tracing::trace;

/// What caused a step change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOrigin {
    Initialize,
    /// In-app action that pushed a frame.
    Advance,
    /// In-app action that rewrote the current frame.
    Replace,
    /// Platform back/forward traversal.
    Pop,
}

impl TransitionOrigin {
    /// Platform traversals animate backward, whichever way they went.
    pub fn direction(self) -> Direction {
        match self {
            TransitionOrigin::Pop => Direction::Back,
            TransitionOrigin::Initialize
            | TransitionOrigin::Advance
            | TransitionOrigin::Replace => Direction::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub seq: u64,
    pub from: Step,
    pub to: Step,
    pub origin: TransitionOrigin,
    pub direction: Direction,
}

impl Transition {
    /// `(enter_offset, exit_offset)` as percent of view width for the entering
    /// and leaving views.
    pub fn motion(&self) -> (i32, i32) {
        (self.direction.enter_offset(), self.direction.exit_offset())
    }
}

const LOG_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct TransitionDirector {
    log: VecDeque<Transition>,
    next_seq: u64,
    current: Step,
    direction: Direction,
}

impl Default for TransitionDirector {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionDirector {
    pub fn new() -> Self {
        Self {
            log: VecDeque::with_capacity(LOG_CAPACITY),
            next_seq: 1,
            current: Step::Search,
            direction: Direction::Forward,
        }
    }

    pub fn record(&mut self, from: Step, to: Step, origin: TransitionOrigin) -> Transition {
        let transition = Transition {
            seq: self.next_seq,
            from,
            to,
            origin,
            direction: origin.direction(),
        };
        self.next_seq += 1;
        self.current = to;
        self.direction = transition.direction;

        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(transition);
        trace!(seq = transition.seq, %from, %to, ?origin, "transition recorded");
        transition
    }

    pub fn current(&self) -> Step {
        self.current
    }

    /// Direction of the most recent transition; forward before any.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn last(&self) -> Option<&Transition> {
        self.log.back()
    }

    /// Oldest first. Only the most recent transitions are retained.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.log.iter()
    }

    pub fn since(&self, seq: u64) -> impl Iterator<Item = &Transition> + '_ {
        self.log.iter().filter(move |transition| transition.seq > seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_origin() {
        let mut director = TransitionDirector::new();
        assert_eq!(director.direction(), Direction::Forward);

        director.record(Step::Search, Step::Details, TransitionOrigin::Advance);
        assert_eq!(director.direction(), Direction::Forward);

        let back = director.record(Step::Details, Step::Search, TransitionOrigin::Pop);
        assert_eq!(back.direction, Direction::Back);
        assert_eq!(back.motion(), (-100, 100));
        assert_eq!(director.current(), Step::Search);

        director.record(Step::Processing, Step::Success, TransitionOrigin::Replace);
        assert_eq!(director.direction(), Direction::Forward);
    }

    #[test]
    fn sequence_numbers_increase() {
        let mut director = TransitionDirector::new();
        director.record(Step::Search, Step::Search, TransitionOrigin::Initialize);
        director.record(Step::Search, Step::Details, TransitionOrigin::Advance);
        director.record(Step::Details, Step::Services, TransitionOrigin::Advance);

        let seqs: Vec<u64> = director.transitions().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        let recent: Vec<Step> = director.since(1).map(|t| t.to).collect();
        assert_eq!(recent, vec![Step::Details, Step::Services]);
        assert_eq!(director.last().map(|t| t.seq), Some(3));
    }

    #[test]
    fn log_keeps_most_recent_entries() {
        let mut director = TransitionDirector::new();
        for _ in 0..LOG_CAPACITY + 10 {
            director.record(Step::Search, Step::Details, TransitionOrigin::Advance);
        }
        assert_eq!(director.transitions().count(), LOG_CAPACITY);
        assert_eq!(director.transitions().next().map(|t| t.seq), Some(11));
    }
}
