//! Train state and movement along the segment graph
//!
//! A train is tracked by the position of its lead point plus the trail of
//! segments the lead has passed, which is enough to recover the footprint of
//! the whole consist for reversal, splitting and collision checks.

use log::debug;
use std::collections::VecDeque;

use super::control::TrainCommand;
use super::segment_graph::SegmentGraph;
use super::signal::SignalTable;
use super::types::{
    Endpoint, SegmentId, TrainId, ACCEL_PER_NOTCH, BRAKE_DECEL, COAST_DECEL, MAX_SPEED,
    MAX_THROTTLE, STANDSTILL_EPSILON,
};

/// A single car in a consist
#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub length: f32,
    pub weight: f32,
    pub loaded: bool,
    /// Marked by the operator for loading/unloading
    pub selected: bool,
}

impl Car {
    pub fn new(length: f32, weight: f32) -> Self {
        Self {
            length,
            weight,
            loaded: false,
            selected: false,
        }
    }
}

/// Location of a train's lead point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub segment: SegmentId,
    /// Fraction of the segment already travelled toward `heading`
    pub progress: f32,
    /// The end of `segment` the train is moving toward
    pub heading: Endpoint,
}

impl Position {
    pub fn new(segment: SegmentId, progress: f32, heading: Endpoint) -> Self {
        Self {
            segment,
            progress: progress.clamp(0.0, 1.0),
            heading,
        }
    }

    /// Distance from the segment's Begin end
    pub fn offset(&self, length: f32) -> f32 {
        match self.heading {
            Endpoint::End => self.progress * length,
            Endpoint::Begin => (1.0 - self.progress) * length,
        }
    }

    fn from_offset(segment: SegmentId, offset: f32, length: f32, heading: Endpoint) -> Self {
        let fraction = offset / length;
        let progress = match heading {
            Endpoint::End => fraction,
            Endpoint::Begin => 1.0 - fraction,
        };
        Self::new(segment, progress, heading)
    }
}

/// A segment the lead has passed through, in the direction it was travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrailEntry {
    segment: SegmentId,
    heading: Endpoint,
}

/// The stretch of one segment covered by a train, measured from its Begin end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub segment: SegmentId,
    pub start: f32,
    pub end: f32,
}

impl Span {
    /// True when the spans share more than a touching point
    pub fn overlaps(&self, other: &Span) -> bool {
        const TOUCH: f32 = 1e-3;
        self.segment == other.segment
            && self.start < other.end - TOUCH
            && other.start < self.end - TOUCH
    }
}

/// What happened while a train moved this tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Motion {
    pub distance: f32,
    pub entered: Vec<SegmentId>,
    /// Speed at which the train ran into the end of the track
    pub buffer_impact: Option<f32>,
    pub reversed: bool,
}

#[derive(Debug, Clone)]
pub struct Train {
    pub id: TrainId,
    pub cars: Vec<Car>,
    pub velocity: f32,
    pub throttle: u8,
    pub brake: bool,
    pub reverse_requested: bool,
    pub split_requested: bool,
    pub selected: bool,
    pub position: Position,
    trail: VecDeque<TrailEntry>,
    last_impact: Option<f32>,
}

impl Train {
    /// Places a train with its lead at `position`; the rest of the consist
    /// trails behind along the currently switched route.
    pub fn new(id: TrainId, cars: Vec<Car>, position: Position, graph: &SegmentGraph) -> Self {
        let mut train = Self {
            id,
            cars,
            velocity: 0.0,
            throttle: 0,
            brake: false,
            reverse_requested: false,
            split_requested: false,
            selected: false,
            position,
            trail: VecDeque::from([TrailEntry {
                segment: position.segment,
                heading: position.heading,
            }]),
            last_impact: None,
        };

        let mut covered = position.progress * graph.length(position.segment);
        let mut current = TrailEntry {
            segment: position.segment,
            heading: position.heading,
        };
        while covered < train.length() {
            let Some(step) = graph.step(current.segment, current.heading.opposite()) else {
                break;
            };
            current = TrailEntry {
                segment: step.segment,
                heading: step.entry,
            };
            train.trail.push_back(current);
            covered += graph.length(step.segment);
        }
        train
    }

    pub fn length(&self) -> f32 {
        self.cars.iter().map(|car| car.length).sum()
    }

    pub fn weight(&self) -> f32 {
        self.cars.iter().map(|car| car.weight).sum()
    }

    pub fn is_stationary(&self) -> bool {
        self.velocity.abs() < STANDSTILL_EPSILON
    }

    pub fn request_reverse(&mut self) {
        self.reverse_requested = true;
    }

    pub fn request_split(&mut self) {
        self.split_requested = true;
    }

    pub fn set_throttle(&mut self, throttle: u8) {
        self.throttle = throttle.min(MAX_THROTTLE);
    }

    /// Applies an operator command directly to the train's settings
    pub fn apply(&mut self, command: TrainCommand) {
        if command.adjust(&mut self.throttle, &mut self.brake) {
            return;
        }
        match command {
            TrainCommand::Reverse => self.request_reverse(),
            TrainCommand::Split => self.request_split(),
            _ => {}
        }
    }

    pub fn unload_cargo(&mut self) {
        let any_selected = self.cars.iter().any(|car| car.selected);
        for car in self.cars.iter_mut().filter(|car| car.selected || !any_selected) {
            car.loaded = false;
        }
        debug!("{} unloaded", self.id);
    }

    pub fn load_cargo(&mut self) {
        let any_selected = self.cars.iter().any(|car| car.selected);
        for car in self.cars.iter_mut().filter(|car| car.selected || !any_selected) {
            car.loaded = true;
        }
        debug!("{} loaded", self.id);
    }

    pub fn toggle_car(&mut self, index: usize) -> bool {
        match self.cars.get_mut(index) {
            Some(car) => {
                car.selected = !car.selected;
                true
            }
            None => false,
        }
    }

    /// Speed at which the train hit the buffer during its last move
    pub fn last_impact(&self) -> Option<f32> {
        self.last_impact
    }

    /// The segment the lead came from
    pub fn origin(&self, graph: &SegmentGraph) -> Option<SegmentId> {
        graph.origin(self.position.segment, self.position.heading)
    }

    /// Distance left on the lead's segment
    pub fn distance_to_segment_end(&self, graph: &SegmentGraph) -> f32 {
        (1.0 - self.position.progress) * graph.length(self.position.segment)
    }

    /// Everything the train covers, from the lead backwards
    pub fn footprint(&self, graph: &SegmentGraph) -> Vec<Span> {
        self.spans_within(self.length(), graph)
    }

    /// Spans covering `reach` units behind the lead, one per trail entry
    fn spans_within(&self, reach: f32, graph: &SegmentGraph) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut remaining = reach;

        let lead_length = graph.length(self.position.segment);
        let lead = self.position.offset(lead_length);
        let behind_lead = self.position.progress * lead_length;
        let take = remaining.min(behind_lead);
        spans.push(match self.position.heading {
            Endpoint::End => Span {
                segment: self.position.segment,
                start: lead - take,
                end: lead,
            },
            Endpoint::Begin => Span {
                segment: self.position.segment,
                start: lead,
                end: lead + take,
            },
        });
        remaining -= take;

        for entry in self.trail.iter().skip(1) {
            if remaining <= 0.0 {
                break;
            }
            let length = graph.length(entry.segment);
            let take = remaining.min(length);
            spans.push(match entry.heading {
                Endpoint::End => Span {
                    segment: entry.segment,
                    start: length - take,
                    end: length,
                },
                Endpoint::Begin => Span {
                    segment: entry.segment,
                    start: 0.0,
                    end: take,
                },
            });
            remaining -= take;
        }
        spans
    }

    /// Rear-most point of a span list, as a position heading the same way as the trail
    fn tail_of(&self, spans: &[Span], graph: &SegmentGraph) -> Option<(usize, Position)> {
        let index = spans.len().checked_sub(1)?;
        let span = spans[index];
        let heading = self.trail.get(index)?.heading;
        let offset = match heading {
            Endpoint::End => span.start,
            Endpoint::Begin => span.end,
        };
        let length = graph.length(span.segment);
        Some((index, Position::from_offset(span.segment, offset, length, heading)))
    }

    /// Swaps lead and tail
    fn reverse(&mut self, graph: &SegmentGraph) {
        let spans = self.footprint(graph);
        let Some((index, tail)) = self.tail_of(&spans, graph) else {
            return;
        };

        let length = graph.length(tail.segment);
        let offset = tail.offset(length);
        let heading = tail.heading.opposite();
        self.position = Position::from_offset(tail.segment, offset, length, heading);
        self.trail = self
            .trail
            .iter()
            .take(index + 1)
            .rev()
            .map(|entry| TrailEntry {
                segment: entry.segment,
                heading: entry.heading.opposite(),
            })
            .collect();
        debug!("{} reversed onto {}", self.id, self.position.segment);
    }

    /// Detaches the rear car as a new train standing behind this one
    pub fn split_rear(&mut self, new_id: TrainId, graph: &SegmentGraph) -> Option<Train> {
        if self.cars.len() < 2 {
            return None;
        }
        let rear_car = self.cars.pop()?;
        let spans = self.spans_within(self.length(), graph);
        let Some((index, tail)) = self.tail_of(&spans, graph) else {
            self.cars.push(rear_car);
            return None;
        };

        let rear_trail: VecDeque<TrailEntry> = self.trail.iter().skip(index).copied().collect();
        self.trail.truncate(index + 1);

        debug!("{} split off rear car as {}", self.id, new_id);
        Some(Train {
            id: new_id,
            cars: vec![rear_car],
            velocity: 0.0,
            throttle: 0,
            brake: true,
            reverse_requested: false,
            split_requested: false,
            selected: false,
            position: tail,
            trail: rear_trail,
            last_impact: None,
        })
    }

    /// Drops trail entries no longer under the train
    fn trim_trail(&mut self, graph: &SegmentGraph) {
        let mut covered = self.position.progress * graph.length(self.position.segment);
        let mut keep = 1;
        for entry in self.trail.iter().skip(1) {
            if covered >= self.length() {
                break;
            }
            covered += graph.length(entry.segment);
            keep += 1;
        }
        self.trail.truncate(keep);
    }

    /// Advances the train by one tick of `dt` seconds.
    ///
    /// Pending reversal is honoured only at a standstill. Entering a signal
    /// segment through its approach endpoint notifies the program.
    pub fn advance(&mut self, dt: f32, graph: &SegmentGraph, signals: &mut SignalTable) -> Motion {
        let mut motion = Motion::default();
        self.last_impact = None;

        if self.reverse_requested && self.is_stationary() {
            self.reverse(graph);
            self.reverse_requested = false;
            motion.reversed = true;
        }

        let accel = if self.brake {
            -BRAKE_DECEL
        } else if self.throttle > 0 {
            self.throttle as f32 * ACCEL_PER_NOTCH
        } else {
            -COAST_DECEL
        };
        self.velocity = (self.velocity + accel * dt).clamp(0.0, MAX_SPEED);

        let mut remaining = self.velocity * dt;
        motion.distance = remaining;
        while remaining > 0.0 {
            let length = graph.length(self.position.segment);
            let left = (1.0 - self.position.progress) * length;
            if remaining < left {
                self.position.progress += remaining / length;
                break;
            }
            remaining -= left;

            match graph.step(self.position.segment, self.position.heading) {
                None => {
                    self.position.progress = 1.0;
                    motion.distance -= remaining;
                    motion.buffer_impact = Some(self.velocity);
                    self.last_impact = Some(self.velocity);
                    debug!("{} reached end of track at {:.1}", self.id, self.velocity);
                    self.velocity = 0.0;
                    break;
                }
                Some(step) => {
                    self.position = Position::new(step.segment, 0.0, step.heading());
                    self.trail.push_front(TrailEntry {
                        segment: step.segment,
                        heading: step.heading(),
                    });
                    if let Some(site) = signals.governing_mut(step.segment, step.entry) {
                        site.program.enter(self);
                    }
                    motion.entered.push(step.segment);
                }
            }
        }

        self.trim_trail(graph);
        motion
    }
}
