//! Standalone rail simulation module
//!
//! This module contains the simulation core: track topology, signal
//! programs, train controls, the script event bus and the tick driver. It has
//! no rendering or sound of its own and can be driven from the console or
//! from tests.

mod accident;
mod automatic;
mod control;
mod error;
mod mission;
mod mixed;
mod script;
mod script_manager;
mod segment_graph;
mod signal;
mod stats;
mod time_queue;
mod train;
mod types;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use accident::{Accident, AccidentKind, ActionResult};
#[allow(unused_imports)]
pub use automatic::{braking_distance, AutomaticControl, Scan};
#[allow(unused_imports)]
pub use control::{ControlEnv, ControlRegistry, Horn, ManualControl, TrainCommand, TrainControl};
#[allow(unused_imports)]
pub use error::{SimError, SimResult};
#[allow(unused_imports)]
pub use mission::{
    AccidentResponse, BufferWatch, CollisionWatch, FreePlay, Mission, BUFFER_SAFE_SPEED,
};
#[allow(unused_imports)]
pub use mixed::MixedControl;
#[allow(unused_imports)]
pub use script::{
    ActionContext, DeferredTask, DrawFrame, DrawListener, ListenerCondition, ListenerRef, Script,
    ScriptInit, ScriptRegistry, TrainActionListener, WorldView,
};
#[allow(unused_imports)]
pub use script_manager::ScriptManager;
#[allow(unused_imports)]
pub use segment_graph::{
    LayoutSegment, LinkEdge, Segment, SegmentGraph, SegmentKind, Step, TrackLayout, TrackLink,
};
#[allow(unused_imports)]
pub use signal::{
    Clock, GreenRed, ManualClock, Reaction, RedUTurn, SignalProgram, SignalSite, SignalTable,
    SystemClock, UlGreenRed, UlStage, UlUTurn, UnloadLoadCycle, Yellow, FINISH_DELAY_MS,
    LOAD_DELAY_MS, UNLOAD_DELAY_MS,
};
#[allow(unused_imports)]
pub use stats::SimStats;
#[allow(unused_imports)]
pub use time_queue::TimeQueue;
#[allow(unused_imports)]
pub use train::{Car, Motion, Position, Span, Train};
#[allow(unused_imports)]
pub use types::{
    Aspect, Endpoint, HandlerId, SaveMap, ScriptId, SegmentId, SimId, TrainId, ACCEL_PER_NOTCH,
    BRAKE_DECEL, COAST_DECEL, MAX_SPEED, MAX_THROTTLE, SIGNAL_SIGHT_RANGE, SLOW_SPEED,
    STANDSTILL_EPSILON, YELLOW_MAX_SPEED,
};
pub use world::{ControlledTrain, SimWorld, TickReport};
