//! Main simulation world that ties everything together
//!
//! Owns the frozen track, the signal programs, the trains with their
//! controls and the script manager led by the active mission, and drives
//! them one tick at a time.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use super::accident::Accident;
use super::control::{ControlEnv, ControlRegistry, ManualControl, TrainCommand, TrainControl};
use super::error::{SimError, SimResult};
use super::mission::{AccidentResponse, FreePlay, Mission};
use super::script::{DrawFrame, ScriptRegistry, WorldView};
use super::script_manager::ScriptManager;
use super::segment_graph::{SegmentGraph, TrackLayout};
use super::signal::{
    Clock, GreenRed, ManualClock, SignalTable, SystemClock, UlGreenRed, Yellow,
};
use super::stats::SimStats;
use super::time_queue::TimeQueue;
use super::train::{Car, Position, Train};
use super::types::{Endpoint, SaveMap, SegmentId, SimId, TrainId, MAX_THROTTLE};

/// A train together with the control that drives it
pub struct ControlledTrain {
    pub train: Train,
    pub control: Box<dyn TrainControl>,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub accidents: Vec<Accident>,
    /// Trains that sounded their horn
    pub horns: Vec<TrainId>,
}

/// The main simulation world
pub struct SimWorld {
    pub graph: SegmentGraph,
    pub signals: SignalTable,
    pub trains: BTreeMap<TrainId, ControlledTrain>,
    /// Scripts, with the active mission leading them
    pub scripts: ScriptManager,
    pub controls: ControlRegistry,

    /// Time source for timed signal stages
    clock: Box<dyn Clock>,
    /// Set when `clock` follows simulated time instead of the wall clock
    sim_clock: Option<Rc<ManualClock>>,

    /// On-screen messages and the times they fade out
    messages: BTreeMap<usize, String>,
    message_expiry: TimeQueue<usize>,

    horns: Vec<TrainId>,

    /// Next ID to assign
    next_id: usize,

    /// Simulation time
    pub time: f32,

    pub stats: SimStats,

    /// Optional seeded RNG for reproducible scenarios
    rng: Option<StdRng>,
}

impl SimWorld {
    /// Builds a world: the mission creates its scripts, the scripts initialise
    /// and adjust the layout, then the layout is frozen.
    pub fn new(
        layout: TrackLayout,
        mission: Box<dyn Mission>,
        registry: &ScriptRegistry,
    ) -> Result<Self> {
        Self::with_clock(layout, mission, registry, Box::new(SystemClock::new()))
    }

    pub fn with_clock(
        layout: TrackLayout,
        mission: Box<dyn Mission>,
        registry: &ScriptRegistry,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let mut scripts = mission
            .create_script_manager(registry)
            .with_context(|| format!("mission {} could not create its scripts", mission.name()))?;
        let title = format!("{} ({})", mission.name(), mission.rwm_filename());
        scripts.set_mission(mission);
        scripts.init();
        let layout = scripts.modify_segments(layout);
        let (graph, signals) = layout.build().context("invalid track layout")?;

        info!(
            "Loaded {}: {} segments, {} signals, scripts {:?}",
            title,
            graph.segment_count(),
            signals.len(),
            scripts.script_names()
        );

        let stats = SimStats {
            total_segments: graph.segment_count() as u32,
            total_signals: signals.len() as u32,
            ..SimStats::default()
        };
        let next_id = graph
            .segments()
            .map(|segment| segment.id.0 .0 + 1)
            .max()
            .unwrap_or(0);

        Ok(Self {
            graph,
            signals,
            trains: BTreeMap::new(),
            scripts,
            controls: ControlRegistry::with_defaults(),
            clock,
            sim_clock: None,
            messages: BTreeMap::new(),
            message_expiry: TimeQueue::new(),
            horns: Vec::new(),
            next_id,
            time: 0.0,
            stats,
            rng: None,
        })
    }

    /// Like [`SimWorld::new`], but station stops are timed in simulated
    /// seconds, so runs do not depend on how fast ticks are computed.
    pub fn with_simulated_clock(
        layout: TrackLayout,
        mission: Box<dyn Mission>,
        registry: &ScriptRegistry,
    ) -> Result<Self> {
        let clock = Rc::new(ManualClock::new());
        let mut world = Self::with_clock(layout, mission, registry, Box::new(clock.clone()))?;
        world.sim_clock = Some(clock);
        Ok(world)
    }

    /// Use a seeded RNG for anything random in this world
    pub fn seed(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::RangeInclusive<u8>) -> u8 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Places a train with its lead at `position`, driven by the named control
    pub fn add_train(
        &mut self,
        cars: Vec<Car>,
        position: Position,
        control_type: &str,
    ) -> Result<TrainId> {
        if cars.is_empty() {
            bail!("a train needs at least one car");
        }
        if !self.graph.contains(position.segment) {
            bail!("cannot place a train on unknown {}", position.segment);
        }
        let control = self.controls.create_instance(control_type)?;

        let id = TrainId(self.next_sim_id());
        let train = Train::new(id, cars, position, &self.graph);
        debug!("{} placed on {} with {} control", id, position.segment, control_type);
        self.trains.insert(id, ControlledTrain { train, control });
        self.stats.total_trains_added += 1;
        self.stats.active_trains = self.trains.len() as u32;
        Ok(id)
    }

    pub fn remove_train(&mut self, id: TrainId) -> Option<ControlledTrain> {
        self.trains.remove(&id)
    }

    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.trains.get(&id).map(|unit| &unit.train)
    }

    pub fn train_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.get_mut(&id).map(|unit| &mut unit.train)
    }

    pub fn set_switch(&mut self, segment: SegmentId, end: Endpoint, index: usize) -> Result<()> {
        self.graph.set_switch(segment, end, index)
    }

    /// Shows `text` for `duration` seconds
    pub fn post_message(&mut self, text: impl Into<String>, duration: f32) {
        let id = self.next_sim_id().0;
        self.messages.insert(id, text.into());
        self.message_expiry.add(self.time + duration, id);
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.values().map(String::as_str)
    }

    pub fn mission(&self) -> Option<&dyn Mission> {
        self.scripts.mission()
    }

    /// Asks the mission and every script whether the named frame action should be cancelled
    pub fn play_frame_action(&mut self, name: &str) -> bool {
        self.scripts.play_frame_action(name)
    }

    pub fn draw(&mut self) {
        let frame = DrawFrame {
            elapsed: self.time,
            trains: &self.trains,
            messages: self.messages.values().map(String::as_str).collect(),
        };
        self.scripts.draw(&frame);
    }

    /// Dispatches a train action with `id` temporarily taken out of the roster
    fn dispatch(&mut self, id: TrainId, event: &str) -> SimResult<Result<bool, Accident>> {
        let mut unit = self.trains.remove(&id).ok_or(SimError::TrainNotFound(id))?;
        let view = WorldView {
            graph: &self.graph,
            trains: &self.trains,
            elapsed: self.time,
        };
        let result = self.scripts.train_action(view, &mut unit.train, event);
        self.trains.insert(id, unit);
        Ok(result)
    }

    /// Sends operator input to a train unless a script cancels it.
    /// Returns whether the command was applied.
    pub fn command(&mut self, id: TrainId, command: TrainCommand) -> SimResult<bool> {
        match self.dispatch(id, command.event_name())? {
            Err(accident) => {
                self.handle_accident(&accident);
                Ok(false)
            }
            Ok(true) => {
                debug!("{} command {:?} cancelled by a script", id, command);
                Ok(false)
            }
            Ok(false) => {
                let unit = self.trains.get_mut(&id).ok_or(SimError::TrainNotFound(id))?;
                unit.control.process(&mut unit.train, command);
                Ok(true)
            }
        }
    }

    pub fn select_train(&mut self, id: TrainId) -> SimResult<()> {
        if let Err(accident) = self.dispatch(id, "selected")? {
            self.handle_accident(&accident);
            return Ok(());
        }
        let unit = self.trains.get_mut(&id).ok_or(SimError::TrainNotFound(id))?;
        unit.train.selected = true;
        unit.control.select();
        Ok(())
    }

    pub fn deselect_train(&mut self, id: TrainId) -> SimResult<()> {
        if let Err(accident) = self.dispatch(id, "deselected")? {
            self.handle_accident(&accident);
            return Ok(());
        }
        let unit = self.trains.get_mut(&id).ok_or(SimError::TrainNotFound(id))?;
        unit.train.selected = false;
        unit.control.deselect();
        Ok(())
    }

    /// Saved state of a train's control, tagged with its type
    pub fn save_control(&self, id: TrainId) -> SimResult<(&'static str, SaveMap)> {
        let unit = self.trains.get(&id).ok_or(SimError::TrainNotFound(id))?;
        Ok((unit.control.type_name(), unit.control.save()))
    }

    /// Replaces a train's control with a freshly loaded one
    pub fn restore_control(&mut self, id: TrainId, type_name: &str, map: &SaveMap) -> SimResult<()> {
        let mut control = self.controls.create_instance(type_name)?;
        control.load(map, &self.controls)?;
        let unit = self.trains.get_mut(&id).ok_or(SimError::TrainNotFound(id))?;
        if unit.train.selected {
            control.select();
        }
        unit.control = control;
        Ok(())
    }

    fn handle_accident(&mut self, accident: &Accident) {
        self.stats.total_accidents += 1;
        if self.scripts.accident(accident) == AccidentResponse::RemoveTrains {
            for id in &accident.trains {
                self.trains.remove(id);
            }
        }
        self.post_message(accident.to_string(), 5.0);
    }

    /// Runs the deferred tasks due now
    fn run_deferred(&mut self) {
        for task in self.scripts.take_due_tasks(self.time) {
            task(self);
        }
    }

    fn expire_messages(&mut self) {
        while let Some(id) = self.message_expiry.poll(self.time) {
            self.messages.remove(&id);
        }
    }

    /// Step, control and move a single train
    fn step_train(&mut self, id: TrainId, delta_secs: f32) -> Result<(), Accident> {
        let Some(mut unit) = self.trains.remove(&id) else {
            return Ok(());
        };

        let view = WorldView {
            graph: &self.graph,
            trains: &self.trains,
            elapsed: self.time,
        };
        if let Err(accident) = self.scripts.train_step(view, &mut unit.train) {
            self.trains.insert(id, unit);
            return Err(accident);
        }

        let mut env = ControlEnv {
            graph: &self.graph,
            signals: &mut self.signals,
            clock: self.clock.as_ref(),
            horn: &mut self.horns,
            dt: delta_secs,
        };
        unit.control.run(&mut unit.train, &mut env);
        unit.train.advance(delta_secs, &self.graph, &mut self.signals);

        let split = if unit.train.split_requested && unit.train.is_stationary() {
            unit.train.split_requested = false;
            let new_id = TrainId(self.next_sim_id());
            unit.train.split_rear(new_id, &self.graph)
        } else {
            None
        };

        self.trains.insert(id, unit);
        if let Some(rear) = split {
            self.stats.total_trains_added += 1;
            self.trains.insert(
                rear.id,
                ControlledTrain {
                    train: rear,
                    control: Box::new(ManualControl::new()),
                },
            );
        }
        Ok(())
    }

    /// Advances the whole simulation by one tick
    pub fn tick(&mut self, delta_secs: f32) -> TickReport {
        self.time += delta_secs;
        if let Some(clock) = &self.sim_clock {
            clock.set((self.time * 1000.0) as u64);
        }
        self.horns.clear();

        self.run_deferred();
        self.expire_messages();

        let mut report = TickReport::default();
        let mut halted: HashSet<TrainId> = HashSet::new();
        let train_ids: Vec<TrainId> = self.trains.keys().copied().collect();
        for id in train_ids {
            if halted.contains(&id) {
                continue;
            }
            if let Err(accident) = self.step_train(id, delta_secs) {
                halted.extend(accident.trains.iter().copied());
                self.handle_accident(&accident);
                report.accidents.push(accident);
            }
        }

        report.horns = std::mem::take(&mut self.horns);
        self.stats.ticks += 1;
        self.stats.elapsed_time = self.time;
        self.stats.total_horns += report.horns.len() as u32;
        self.stats.active_trains = self.trains.len() as u32;
        report
    }

    /// A loop of track with a station, a level crossing and a caution signal,
    /// plus a terminus spur. Trains run under automatic control.
    pub fn create_demo_world(seed: Option<u64>, train_count: usize) -> Result<Self> {
        let mut layout = TrackLayout::new();
        let ring: Vec<SegmentId> = (0..8)
            .map(|index| match index {
                2 => layout.add_signal(60.0, Endpoint::Begin, Box::new(UlGreenRed::new())),
                5 => layout.add_crossing(20.0),
                6 => layout.add_signal(80.0, Endpoint::Begin, Box::new(Yellow)),
                _ => layout.add_track(100.0),
            })
            .collect();
        for pair in ring.windows(2) {
            layout.chain(pair[0], pair[1]);
        }
        layout.chain(ring[ring.len() - 1], ring[0]);

        let spur_gate = layout.add_signal(50.0, Endpoint::Begin, Box::new(GreenRed::new()));
        let spur_end = layout.add_track(40.0);
        layout.connect(ring[3], Endpoint::End, spur_gate, Endpoint::Begin);
        layout.chain(spur_gate, spur_end);

        let mut world = Self::with_simulated_clock(
            layout,
            Box::new(FreePlay::new()),
            &ScriptRegistry::with_defaults(),
        )?;
        if let Some(seed) = seed {
            world.seed(seed);
        }

        let starts = [ring[0], ring[4], ring[7], ring[1]];
        for &start in starts.iter().take(train_count) {
            let cars = vec![Car::new(15.0, 40.0), Car::new(12.0, 25.0), Car::new(12.0, 25.0)];
            let id = world.add_train(cars, Position::new(start, 0.6, Endpoint::End), "automatic")?;
            let throttle = world.random_range(3..=MAX_THROTTLE);
            if let Some(train) = world.train_mut(id) {
                train.set_throttle(throttle);
            }
        }
        if let Some(briefing) = world.mission().map(|mission| mission.briefing()) {
            world.post_message(briefing, 10.0);
        }
        Ok(world)
    }

    /// Print a summary of the current simulation state
    pub fn print_summary(&self) {
        println!("=== Simulation Summary ===");
        println!("Time: {:.1}s", self.time);
        println!("Segments: {}", self.graph.segment_count());
        println!("Signals: {}", self.signals.len());
        println!("Trains: {}", self.trains.len());
        for (id, unit) in &self.trains {
            let train = &unit.train;
            println!(
                "  {} [{}] on {} at {:.0}% speed {:.1} throttle {} brake {}",
                id,
                unit.control.type_name(),
                train.position.segment,
                train.position.progress * 100.0,
                train.velocity,
                train.throttle,
                train.brake
            );
        }
        for message in self.messages() {
            println!("  > {}", message);
        }
    }
}
