//! Automatic train control
//!
//! Every tick the control walks the track ahead of the train far enough to
//! cover its stopping distance and the short sight range, lets each signal on
//! the way react, and then
//! overrides the operator's throttle and brake when a red aspect, the end of
//! the track or a yellow aspect calls for it. While it overrides, the
//! operator's last settings are kept aside and restored once the way is
//! clear again.

use log::debug;

use super::control::{ControlEnv, ControlRegistry, TrainCommand, TrainControl};
use super::error::{parse_or, SimResult};
use super::signal::Reaction;
use super::train::Train;
use super::types::{
    Aspect, SaveMap, SegmentId, BRAKE_DECEL, SIGNAL_SIGHT_RANGE, SLOW_SPEED, YELLOW_MAX_SPEED,
};

/// Distance needed to brake from `speed` down to `target`
pub fn braking_distance(speed: f32, target: f32) -> f32 {
    if speed <= target {
        0.0
    } else {
        (speed * speed - target * target) / (2.0 * BRAKE_DECEL)
    }
}

/// Hazards found by one lookahead walk
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scan {
    /// Distance to the first red aspect or the end of the track
    pub red: Option<f32>,
    /// Distance to the first yellow aspect
    pub yellow: Option<f32>,
    /// First governing signal ahead and its distance
    pub nearest: Option<(SegmentId, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YellowApproach {
    Clear,
    Crawl,
    HardStop,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomaticControl {
    desired_throttle: u8,
    desired_brake: bool,
    /// Set while the control overrides the operator's settings
    modifying: bool,
    crossing_horn: bool,
    departure_horn: bool,
}

impl AutomaticControl {
    pub const TYPE_NAME: &'static str = "automatic";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_modifying(&self) -> bool {
        self.modifying
    }

    pub fn desired(&self) -> (u8, bool) {
        (self.desired_throttle, self.desired_brake)
    }

    /// Hands the train back to the operator's last settings
    fn release(&mut self, train: &mut Train) {
        train.throttle = self.desired_throttle;
        train.brake = self.desired_brake;
        self.modifying = false;
    }

    fn hold(&mut self, train: &mut Train) {
        train.throttle = 0;
        train.brake = true;
        self.modifying = true;
    }

    /// Horn once per approach to a level crossing
    fn sound_crossing(&mut self, train: &Train, env: &mut ControlEnv<'_>) {
        let position = train.position;
        let here = env.graph.is_crossing(position.segment);
        let ahead = env
            .graph
            .step_far(position.segment, position.heading)
            .is_some_and(|step| env.graph.is_crossing(step.segment));

        if here || ahead {
            if !self.crossing_horn {
                debug!("{} approaching level crossing", train.id);
                env.horn.sound(train.id);
                self.crossing_horn = true;
            }
        } else {
            self.crossing_horn = false;
        }
    }

    /// Walks ahead until `range` is exceeded, the track ends or a red
    /// signal is seen. Every governing signal passed gets a `reacting` call.
    pub fn look_ahead(train: &mut Train, env: &mut ControlEnv<'_>, range: f32) -> Scan {
        let mut scan = Scan::default();
        let mut distance = train.distance_to_segment_end(env.graph);
        let mut segment = train.position.segment;
        let mut heading = train.position.heading;

        loop {
            let Some(step) = env.graph.step_far(segment, heading) else {
                scan.red = Some(distance);
                break;
            };

            if let Some(site) = env.signals.governing_mut(step.segment, step.entry) {
                let aspect = match site.program.reacting(train, env.clock) {
                    Reaction::Release => Aspect::Green,
                    Reaction::Hold => site.program.status(),
                };
                if scan.nearest.is_none() {
                    scan.nearest = Some((step.segment, distance));
                }
                match aspect {
                    Aspect::Red => {
                        scan.red = Some(distance);
                        break;
                    }
                    Aspect::Yellow => {
                        if scan.yellow.is_none() {
                            scan.yellow = Some(distance);
                        }
                    }
                    Aspect::Green => {}
                }
            }

            if distance > range {
                break;
            }
            distance += env.graph.length(step.segment);
            segment = step.segment;
            heading = step.heading();
        }
        scan
    }
}

impl TrainControl for AutomaticControl {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn run(&mut self, train: &mut Train, env: &mut ControlEnv<'_>) -> bool {
        if !self.modifying {
            self.desired_throttle = train.throttle;
            self.desired_brake = train.brake;
        }

        let speed = train.velocity;
        let stationary = train.is_stationary();
        if !stationary {
            self.departure_horn = false;
        }
        let tick_travel = speed * env.dt;
        let max_stop = braking_distance(speed, 0.0) + tick_travel;
        let max_slow = braking_distance(speed, SLOW_SPEED) + tick_travel;

        self.sound_crossing(train, env);
        // Far enough for the stopping distance and for the short-range checks
        let scan = Self::look_ahead(train, env, max_stop.max(SIGNAL_SIGHT_RANGE));

        // A stopped train has no stopping distance, so it holds for any red in sight
        let stop_zone = if stationary { SIGNAL_SIGHT_RANGE } else { max_stop };
        if let Some(red) = scan.red {
            if red <= stop_zone {
                if !self.modifying {
                    debug!("{} stopping, hazard in {:.1}", train.id, red);
                }
                self.hold(train);
                return train.selected;
            }
        }

        let mut approach = YellowApproach::Clear;
        if let Some(yellow) = scan.yellow {
            if yellow > 0.0 && yellow <= max_slow {
                self.modifying = true;
                if speed > YELLOW_MAX_SPEED {
                    train.throttle = 0;
                    train.brake = true;
                    approach = YellowApproach::HardStop;
                } else {
                    train.throttle = 1;
                    train.brake = self.desired_brake;
                    approach = YellowApproach::Crawl;
                }
            }
        }

        if let Some((signal, distance)) = scan.nearest {
            if distance <= SIGNAL_SIGHT_RANGE {
                match env.signals.aspect(signal) {
                    Some(Aspect::Yellow)
                        if self.desired_throttle > 0 && approach != YellowApproach::HardStop =>
                    {
                        if stationary && !self.departure_horn {
                            env.horn.sound(train.id);
                            self.departure_horn = true;
                        }
                        train.throttle = 1;
                        train.brake = false;
                        self.modifying = true;
                        return train.selected;
                    }
                    Some(Aspect::Green) if approach == YellowApproach::Clear => {
                        self.release(train);
                        return train.selected;
                    }
                    _ => {}
                }
            }
        }

        if approach == YellowApproach::Clear {
            self.release(train);
        }
        train.selected
    }

    fn process(&mut self, train: &mut Train, command: TrainCommand) {
        if self.modifying && command.adjust(&mut self.desired_throttle, &mut self.desired_brake) {
            return;
        }
        train.apply(command);
    }

    fn save(&self) -> SaveMap {
        SaveMap::from([
            (
                "desired_throttle".to_string(),
                self.desired_throttle.to_string(),
            ),
            ("desired_brake".to_string(), self.desired_brake.to_string()),
            ("modifying".to_string(), self.modifying.to_string()),
        ])
    }

    fn load(&mut self, map: &SaveMap, _registry: &ControlRegistry) -> SimResult<()> {
        let desired_throttle = parse_or(map, "desired_throttle", 0)?;
        let desired_brake = parse_or(map, "desired_brake", false)?;
        let modifying = parse_or(map, "modifying", false)?;
        self.desired_throttle = desired_throttle;
        self.desired_brake = desired_brake;
        self.modifying = modifying;
        Ok(())
    }
}
