//! Core types for the rail simulation
//!
//! Identifiers, endpoints, aspects and the tuning constants shared by the
//! train physics and the automatic control.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::SimError;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for track segment IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub SimId);

/// A wrapper type for train IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrainId(pub SimId);

/// A wrapper type for standalone train action listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub usize);

/// Index of a script in its manager's registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub usize);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment #{}", self.0 .0)
    }
}

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "train #{}", self.0 .0)
    }
}

/// One of the two ends of a track segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Begin,
    End,
}

impl Endpoint {
    pub fn opposite(self) -> Endpoint {
        match self {
            Endpoint::Begin => Endpoint::End,
            Endpoint::End => Endpoint::Begin,
        }
    }
}

/// The color shown by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
    Green,
    Yellow,
    Red,
}

impl Aspect {
    pub fn as_str(self) -> &'static str {
        match self {
            Aspect::Green => "green",
            Aspect::Yellow => "yellow",
            Aspect::Red => "red",
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aspect {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(Aspect::Green),
            "yellow" => Ok(Aspect::Yellow),
            "red" => Ok(Aspect::Red),
            other => Err(SimError::InvalidValue {
                key: "color".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted state of any stateful unit (signal programs, controls)
pub type SaveMap = BTreeMap<String, String>;

/// Highest throttle notch
pub const MAX_THROTTLE: u8 = 10;

/// Acceleration gained per throttle notch (units/s²)
pub const ACCEL_PER_NOTCH: f32 = 0.4;

/// Deceleration with the brake applied (units/s²)
pub const BRAKE_DECEL: f32 = 3.0;

/// Deceleration while coasting with throttle at zero (units/s²)
pub const COAST_DECEL: f32 = 0.2;

/// Top speed of any train (units/s)
pub const MAX_SPEED: f32 = 30.0;

/// Target speed when approaching a yellow aspect
pub const SLOW_SPEED: f32 = 5.0;

/// Above this speed a yellow approach forces a hard stop
pub const YELLOW_MAX_SPEED: f32 = 6.0;

/// Range in which the nearest signal ahead is re-queried every tick
pub const SIGNAL_SIGHT_RANGE: f32 = 40.0;

/// Speeds below this are treated as standing still
pub const STANDSTILL_EPSILON: f32 = 1e-3;
