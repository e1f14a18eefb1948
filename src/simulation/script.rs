//! Scripts and train action listeners
//!
//! Scripts are pluggable behaviour units. They take part in the game
//! lifecycle (`init`, `modify_segments`), can veto frame actions, and receive
//! train actions for the listener conditions they register. The mission is a
//! script too and always goes first.
//!
//! Listener callbacks run while the manager is iterating its condition list,
//! so they never touch that list directly. Instead they queue work on the
//! [`ActionContext`], which the world runs at the top of the next tick.

use std::collections::BTreeMap;

use super::accident::ActionResult;
use super::error::{SimError, SimResult};
use super::segment_graph::{SegmentGraph, TrackLayout};
use super::time_queue::TimeQueue;
use super::train::Train;
use super::types::{HandlerId, ScriptId, TrainId};
use super::world::{ControlledTrain, SimWorld};

/// Work postponed until the top of a later tick
pub type DeferredTask = Box<dyn FnOnce(&mut SimWorld)>;

/// Who receives the actions matched by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerRef {
    /// The active mission
    Mission,
    Script(ScriptId),
    Handler(HandlerId),
}

/// A subscription: `None` filters match anything
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerCondition {
    pub listener: ListenerRef,
    pub train: Option<TrainId>,
    pub event: Option<String>,
}

impl ListenerCondition {
    pub fn new(listener: ListenerRef, train: Option<TrainId>, event: Option<&str>) -> Self {
        Self {
            listener,
            train,
            event: event.map(str::to_string),
        }
    }

    pub fn matches(&self, train: TrainId, event: &str) -> bool {
        self.train.is_none_or(|filter| filter == train)
            && self.event.as_deref().is_none_or(|filter| filter == event)
    }
}

/// Read-only view of the world handed to listeners
#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    pub graph: &'a SegmentGraph,
    /// Every train except the one the action is about
    pub trains: &'a BTreeMap<TrainId, ControlledTrain>,
    pub elapsed: f32,
}

/// What a listener may do while an action is being dispatched
pub struct ActionContext<'a> {
    pub view: WorldView<'a>,
    deferred: &'a mut Vec<DeferredTask>,
    timers: &'a mut TimeQueue<DeferredTask>,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        view: WorldView<'a>,
        deferred: &'a mut Vec<DeferredTask>,
        timers: &'a mut TimeQueue<DeferredTask>,
    ) -> Self {
        Self {
            view,
            deferred,
            timers,
        }
    }

    /// Runs `task` at the top of the next tick
    pub fn run_in_loop(&mut self, task: impl FnOnce(&mut SimWorld) + 'static) {
        self.deferred.push(Box::new(task));
    }

    /// Runs `task` at the first tick at or after `elapsed` seconds
    pub fn run_at(&mut self, elapsed: f32, task: impl FnOnce(&mut SimWorld) + 'static) {
        self.timers.add(elapsed, Box::new(task));
    }

    pub fn add_condition_later(&mut self, condition: ListenerCondition) {
        self.run_in_loop(move |world| world.scripts.add_condition(condition));
    }

    pub fn remove_condition_later(&mut self, condition: ListenerCondition) {
        self.run_in_loop(move |world| {
            world.scripts.remove_condition(&condition);
        });
    }

    /// Runs `action` on `train`'s next step, once
    pub fn defer_into_step(
        &mut self,
        train: TrainId,
        action: impl FnOnce(&mut ActionContext<'_>, &mut Train) -> ActionResult + 'static,
    ) {
        self.run_in_loop(move |world| {
            world.scripts.defer_into_step(train, action);
        });
    }
}

/// Receives train actions for the conditions it is registered under
pub trait TrainActionListener {
    /// Returns `Ok(true)` to cancel the action, `Err` to declare an accident
    fn train_action(
        &mut self,
        ctx: &mut ActionContext<'_>,
        train: &mut Train,
        event: &str,
    ) -> ActionResult;
}

/// Registration handle given to a script during `init`
pub struct ScriptInit<'a> {
    /// How conditions registered here refer back to the script
    pub listener: ListenerRef,
    pub(crate) conditions: &'a mut Vec<ListenerCondition>,
}

impl ScriptInit<'_> {
    /// Subscribes the script to `event` for `train` (`None` = any)
    pub fn listen(&mut self, train: Option<TrainId>, event: Option<&str>) {
        self.conditions
            .push(ListenerCondition::new(self.listener, train, event));
    }
}

pub trait Script {
    fn name(&self) -> &'static str;

    /// Whether missions enable this script without being asked
    fn on_by_default(&self) -> bool {
        true
    }

    fn init(&mut self, _init: &mut ScriptInit<'_>) {}

    /// Transforms the track layout before it is frozen
    fn modify_segments(&mut self, layout: TrackLayout) -> TrackLayout {
        layout
    }

    /// Returns true to cancel the named frame action
    fn play_frame_action(&mut self, _name: &str) -> bool {
        false
    }

    fn train_action(
        &mut self,
        _ctx: &mut ActionContext<'_>,
        _train: &mut Train,
        _event: &str,
    ) -> ActionResult {
        Ok(false)
    }
}

/// Per-frame rendering hook; drawing itself lives outside the core
pub trait DrawListener {
    fn draw(&mut self, frame: &DrawFrame<'_>);
}

pub struct DrawFrame<'a> {
    pub elapsed: f32,
    pub trains: &'a BTreeMap<TrainId, ControlledTrain>,
    pub messages: Vec<&'a str>,
}

type ScriptConstructor = fn() -> Box<dyn Script>;

/// Named constructors for scripts
pub struct ScriptRegistry {
    constructors: BTreeMap<&'static str, ScriptConstructor>,
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ScriptRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the built-in accident detection scripts
    pub fn with_defaults() -> Self {
        use super::mission::{BufferWatch, CollisionWatch};

        let mut registry = Self::empty();
        registry.register(CollisionWatch::NAME, || Box::new(CollisionWatch));
        registry.register(BufferWatch::NAME, || Box::new(BufferWatch::default()));
        registry
    }

    pub fn register(&mut self, name: &'static str, constructor: ScriptConstructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn create_instance(&self, name: &str) -> SimResult<Box<dyn Script>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| SimError::UnknownScript(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}
