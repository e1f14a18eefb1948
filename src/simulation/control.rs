//! Train control: the per-train decision component run once per tick
//!
//! Controls are trait objects created by name through a [`ControlRegistry`]
//! so saved games and mixed controls can rebuild them.

use std::collections::BTreeMap;

use super::automatic::AutomaticControl;
use super::error::{SimError, SimResult};
use super::mixed::MixedControl;
use super::segment_graph::SegmentGraph;
use super::signal::{Clock, SignalTable};
use super::train::Train;
use super::types::{SaveMap, TrainId, MAX_THROTTLE};

/// Receives horn requests. Playback itself lives outside the core.
pub trait Horn {
    fn sound(&mut self, train: TrainId);
}

impl Horn for Vec<TrainId> {
    fn sound(&mut self, train: TrainId) {
        self.push(train);
    }
}

/// Everything a control may consult or touch besides its own train
pub struct ControlEnv<'a> {
    pub graph: &'a SegmentGraph,
    pub signals: &'a mut SignalTable,
    pub clock: &'a dyn Clock,
    pub horn: &'a mut dyn Horn,
    /// Tick length in seconds
    pub dt: f32,
}

/// Operator input for a train
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainCommand {
    ThrottleUp,
    ThrottleDown,
    SetThrottle(u8),
    ToggleBrake,
    Reverse,
    Split,
}

impl TrainCommand {
    /// Name of the train action dispatched to scripts before applying
    pub fn event_name(&self) -> &'static str {
        match self {
            TrainCommand::ThrottleUp => "throttle_up",
            TrainCommand::ThrottleDown => "throttle_down",
            TrainCommand::SetThrottle(_) => "throttle",
            TrainCommand::ToggleBrake => "brake",
            TrainCommand::Reverse => "reverse",
            TrainCommand::Split => "split",
        }
    }

    /// Applies throttle/brake commands to the given settings.
    /// Returns false for commands that are not about throttle or brake.
    pub fn adjust(&self, throttle: &mut u8, brake: &mut bool) -> bool {
        match *self {
            TrainCommand::ThrottleUp => *throttle = throttle.saturating_add(1).min(MAX_THROTTLE),
            TrainCommand::ThrottleDown => *throttle = throttle.saturating_sub(1),
            TrainCommand::SetThrottle(value) => *throttle = value.min(MAX_THROTTLE),
            TrainCommand::ToggleBrake => *brake = !*brake,
            TrainCommand::Reverse | TrainCommand::Split => return false,
        }
        true
    }
}

pub trait TrainControl {
    /// Registry key used to rebuild this control
    fn type_name(&self) -> &'static str;

    /// Decides throttle and brake for this tick. Returns the train's selection state.
    fn run(&mut self, train: &mut Train, env: &mut ControlEnv<'_>) -> bool;

    /// Applies operator input
    fn process(&mut self, train: &mut Train, command: TrainCommand);

    fn select(&mut self) {}

    fn deselect(&mut self) {}

    /// Toggles the operator's selection of a car
    fn select_car(&mut self, train: &mut Train, index: usize) -> bool {
        train.toggle_car(index)
    }

    fn load_cargo(&mut self, train: &mut Train) {
        if train.is_stationary() {
            train.load_cargo();
        }
    }

    fn unload_cargo(&mut self, train: &mut Train) {
        if train.is_stationary() {
            train.unload_cargo();
        }
    }

    fn save(&self) -> SaveMap;

    /// Restores persisted state. On error the control is left untouched.
    fn load(&mut self, map: &SaveMap, registry: &ControlRegistry) -> SimResult<()>;
}

/// The operator drives directly; the control only relays input
#[derive(Debug, Clone, Default)]
pub struct ManualControl;

impl ManualControl {
    pub const TYPE_NAME: &'static str = "manual";

    pub fn new() -> Self {
        Self
    }
}

impl TrainControl for ManualControl {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn run(&mut self, train: &mut Train, _env: &mut ControlEnv<'_>) -> bool {
        train.selected
    }

    fn process(&mut self, train: &mut Train, command: TrainCommand) {
        train.apply(command);
    }

    fn save(&self) -> SaveMap {
        SaveMap::new()
    }

    fn load(&mut self, _map: &SaveMap, _registry: &ControlRegistry) -> SimResult<()> {
        Ok(())
    }
}

type ControlConstructor = fn() -> Box<dyn TrainControl>;

/// Named constructors for train controls
pub struct ControlRegistry {
    constructors: BTreeMap<&'static str, ControlConstructor>,
}

impl Default for ControlRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ControlRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the manual, automatic and mixed controls
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ManualControl::TYPE_NAME, || Box::new(ManualControl::new()));
        registry.register(AutomaticControl::TYPE_NAME, || {
            Box::new(AutomaticControl::new())
        });
        registry.register(MixedControl::TYPE_NAME, || Box::new(MixedControl::new()));
        registry
    }

    pub fn register(&mut self, name: &'static str, constructor: ControlConstructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn create_instance(&self, name: &str) -> SimResult<Box<dyn TrainControl>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| SimError::UnknownControl(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}
