//! Rail accidents
//!
//! An accident is an in-game outcome, not an error. Scripts raise it from a
//! train action by returning `Err(Accident)`; it travels out of the dispatch
//! to the tick driver, which hands it to the active mission.

use std::fmt;

use super::types::{SegmentId, TrainId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccidentKind {
    /// Two trains occupied the same stretch of track
    Collision,
    /// A train hit the end of the track too fast
    BufferOverrun,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accident {
    pub kind: AccidentKind,
    pub trains: Vec<TrainId>,
    pub segment: SegmentId,
}

impl Accident {
    pub fn collision(first: TrainId, second: TrainId, segment: SegmentId) -> Self {
        Self {
            kind: AccidentKind::Collision,
            trains: vec![first, second],
            segment,
        }
    }

    pub fn buffer_overrun(train: TrainId, segment: SegmentId) -> Self {
        Self {
            kind: AccidentKind::BufferOverrun,
            trains: vec![train],
            segment,
        }
    }

    pub fn involves(&self, train: TrainId) -> bool {
        self.trains.contains(&train)
    }
}

impl fmt::Display for Accident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trains: Vec<String> = self.trains.iter().map(ToString::to_string).collect();
        match self.kind {
            AccidentKind::Collision => {
                write!(f, "collision of {} on {}", trains.join(" and "), self.segment)
            }
            AccidentKind::BufferOverrun => {
                write!(f, "{} overran the buffer on {}", trains.join(", "), self.segment)
            }
        }
    }
}

/// Result of dispatching a train action: `Ok(cancel)` or the accident raised
pub type ActionResult = Result<bool, Accident>;
