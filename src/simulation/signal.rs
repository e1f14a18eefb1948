//! Signal programs
//!
//! Each signal segment carries a program that reacts to trains entering it
//! through its approach endpoint and to trains standing in front of it.
//! Automatic control reads the resulting aspect during its lookahead.

use log::debug;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use super::error::{parse_or, required, SimError, SimResult};
use super::train::Train;
use super::types::{Aspect, Endpoint, SaveMap, SegmentId};

/// Milliseconds a train stands before unloading starts
pub const UNLOAD_DELAY_MS: u64 = 1000;
/// Milliseconds between unloading and loading
pub const LOAD_DELAY_MS: u64 = 1000;
/// Milliseconds between loading and completion
pub const FINISH_DELAY_MS: u64 = 500;

/// Millisecond time source for timed signal stages
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since construction
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Outcome of a `reacting` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Use the program's current aspect
    Hold,
    /// Treat the signal as green for this evaluation only; `status()` is unchanged
    Release,
}

/// Behaviour attached to a signal segment
pub trait SignalProgram: fmt::Debug {
    fn name(&self) -> &'static str;

    /// A train's lead entered the governed segment from the approach endpoint
    fn enter(&mut self, train: &mut Train);

    /// The train is being evaluated in front of this signal
    fn reacting(&mut self, train: &mut Train, clock: &dyn Clock) -> Reaction;

    fn status(&self) -> Aspect;

    /// Display glyph
    fn icon(&self) -> char {
        match self.status() {
            Aspect::Green => 'G',
            Aspect::Yellow => 'Y',
            Aspect::Red => 'R',
        }
    }

    fn save(&self) -> SaveMap;

    /// Restores persisted state. On error the program is left untouched.
    fn load(&mut self, map: &SaveMap) -> SimResult<()>;
}

/// Green until the first train enters, then red until reloaded
#[derive(Debug, Clone, PartialEq)]
pub struct GreenRed {
    aspect: Aspect,
}

impl GreenRed {
    pub fn new() -> Self {
        Self {
            aspect: Aspect::Green,
        }
    }
}

impl Default for GreenRed {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalProgram for GreenRed {
    fn name(&self) -> &'static str {
        "green_red"
    }

    fn enter(&mut self, train: &mut Train) {
        if self.aspect != Aspect::Red {
            debug!("{} passed green_red signal, now red", train.id);
        }
        self.aspect = Aspect::Red;
    }

    fn reacting(&mut self, _train: &mut Train, _clock: &dyn Clock) -> Reaction {
        Reaction::Hold
    }

    fn status(&self) -> Aspect {
        self.aspect
    }

    fn save(&self) -> SaveMap {
        SaveMap::from([("color".to_string(), self.aspect.to_string())])
    }

    fn load(&mut self, map: &SaveMap) -> SimResult<()> {
        self.aspect = required(map, "color")?.parse()?;
        Ok(())
    }
}

/// Permanently yellow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Yellow;

impl SignalProgram for Yellow {
    fn name(&self) -> &'static str {
        "yellow"
    }

    fn enter(&mut self, _train: &mut Train) {}

    fn reacting(&mut self, _train: &mut Train, _clock: &dyn Clock) -> Reaction {
        Reaction::Hold
    }

    fn status(&self) -> Aspect {
        Aspect::Yellow
    }

    fn save(&self) -> SaveMap {
        SaveMap::new()
    }

    fn load(&mut self, _map: &SaveMap) -> SimResult<()> {
        Ok(())
    }
}

/// Red signal that turns stopped trains around
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedUTurn;

impl SignalProgram for RedUTurn {
    fn name(&self) -> &'static str {
        "red_u_turn"
    }

    fn enter(&mut self, _train: &mut Train) {}

    fn reacting(&mut self, train: &mut Train, _clock: &dyn Clock) -> Reaction {
        if !train.is_stationary() {
            return Reaction::Hold;
        }
        debug!("{} turned around at red_u_turn signal", train.id);
        train.request_reverse();
        Reaction::Release
    }

    fn status(&self) -> Aspect {
        Aspect::Red
    }

    fn save(&self) -> SaveMap {
        SaveMap::new()
    }

    fn load(&mut self, _map: &SaveMap) -> SimResult<()> {
        Ok(())
    }
}

/// Stage of an unload/load stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UlStage {
    #[default]
    Idle,
    WaitingToUnload,
    WaitingToLoad,
    WaitingToFinish,
}

impl UlStage {
    fn index(self) -> u8 {
        match self {
            UlStage::Idle => 0,
            UlStage::WaitingToUnload => 1,
            UlStage::WaitingToLoad => 2,
            UlStage::WaitingToFinish => 3,
        }
    }

    fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(UlStage::Idle),
            1 => Some(UlStage::WaitingToUnload),
            2 => Some(UlStage::WaitingToLoad),
            3 => Some(UlStage::WaitingToFinish),
            _ => None,
        }
    }
}

/// Timed unload/load cycle shared by the station signal programs.
///
/// The cycle advances only while the train stands still; any motion aborts it
/// back to idle. After completing, it stays idle until the train moves again,
/// so the completion hook fires once per stop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnloadLoadCycle {
    stage: UlStage,
    stamp: u64,
    completed: bool,
}

impl UnloadLoadCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> UlStage {
        self.stage
    }

    pub fn reset(&mut self) {
        self.stage = UlStage::Idle;
        self.stamp = 0;
        self.completed = false;
    }

    /// Advances the cycle for a train standing at the signal.
    /// Returns true on the call that ran `on_finished`.
    pub fn react(
        &mut self,
        train: &mut Train,
        clock: &dyn Clock,
        on_finished: impl FnOnce(&mut Train),
    ) -> bool {
        if !train.is_stationary() {
            self.reset();
            return false;
        }

        let now = clock.now_ms();
        let waited = now.saturating_sub(self.stamp);
        match self.stage {
            UlStage::Idle => {
                if !self.completed {
                    self.stage = UlStage::WaitingToUnload;
                    self.stamp = now;
                }
            }
            UlStage::WaitingToUnload => {
                if waited >= UNLOAD_DELAY_MS {
                    train.unload_cargo();
                    self.stage = UlStage::WaitingToLoad;
                    self.stamp = now;
                }
            }
            UlStage::WaitingToLoad => {
                if waited >= LOAD_DELAY_MS {
                    train.load_cargo();
                    self.stage = UlStage::WaitingToFinish;
                    self.stamp = now;
                }
            }
            UlStage::WaitingToFinish => {
                if waited >= FINISH_DELAY_MS {
                    self.stage = UlStage::Idle;
                    self.completed = true;
                    on_finished(train);
                    return true;
                }
            }
        }
        false
    }

    fn save_into(&self, map: &mut SaveMap) {
        map.insert("stage".to_string(), self.stage.index().to_string());
        map.insert("stamp".to_string(), self.stamp.to_string());
        map.insert("completed".to_string(), self.completed.to_string());
    }

    fn parse(map: &SaveMap) -> SimResult<Self> {
        let index: u8 = parse_or(map, "stage", 0)?;
        let stage = UlStage::from_index(index).ok_or_else(|| SimError::InvalidValue {
            key: "stage".to_string(),
            value: index.to_string(),
        })?;
        Ok(Self {
            stage,
            stamp: parse_or(map, "stamp", 0)?,
            completed: parse_or(map, "completed", false)?,
        })
    }
}

/// Station stop: red on entry, green once unloading and loading are done
#[derive(Debug, Clone, PartialEq)]
pub struct UlGreenRed {
    aspect: Aspect,
    cycle: UnloadLoadCycle,
}

impl UlGreenRed {
    pub fn new() -> Self {
        Self {
            aspect: Aspect::Red,
            cycle: UnloadLoadCycle::new(),
        }
    }

    pub fn stage(&self) -> UlStage {
        self.cycle.stage()
    }
}

impl Default for UlGreenRed {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalProgram for UlGreenRed {
    fn name(&self) -> &'static str {
        "ul_green_red"
    }

    fn enter(&mut self, _train: &mut Train) {
        self.aspect = Aspect::Red;
        self.cycle.reset();
    }

    fn reacting(&mut self, train: &mut Train, clock: &dyn Clock) -> Reaction {
        let aspect = &mut self.aspect;
        self.cycle.react(train, clock, |train| {
            debug!("{} finished station stop, signal green", train.id);
            *aspect = Aspect::Green;
        });
        Reaction::Hold
    }

    fn status(&self) -> Aspect {
        self.aspect
    }

    fn save(&self) -> SaveMap {
        let mut map = SaveMap::from([("color".to_string(), self.aspect.to_string())]);
        self.cycle.save_into(&mut map);
        map
    }

    fn load(&mut self, map: &SaveMap) -> SimResult<()> {
        let aspect = parse_or(map, "color", Aspect::Red)?;
        let cycle = UnloadLoadCycle::parse(map)?;
        self.aspect = aspect;
        self.cycle = cycle;
        Ok(())
    }
}

/// Terminus stop: unload, load, then send the train back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UlUTurn {
    cycle: UnloadLoadCycle,
}

impl UlUTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> UlStage {
        self.cycle.stage()
    }
}

impl SignalProgram for UlUTurn {
    fn name(&self) -> &'static str {
        "ul_u_turn"
    }

    fn enter(&mut self, _train: &mut Train) {
        self.cycle.reset();
    }

    fn reacting(&mut self, train: &mut Train, clock: &dyn Clock) -> Reaction {
        let finished = self.cycle.react(train, clock, |train| {
            debug!("{} finished terminus stop, turning around", train.id);
            train.request_reverse();
        });
        if finished {
            Reaction::Release
        } else {
            Reaction::Hold
        }
    }

    fn status(&self) -> Aspect {
        Aspect::Red
    }

    fn save(&self) -> SaveMap {
        let mut map = SaveMap::new();
        self.cycle.save_into(&mut map);
        map
    }

    fn load(&mut self, map: &SaveMap) -> SimResult<()> {
        self.cycle = UnloadLoadCycle::parse(map)?;
        Ok(())
    }
}

/// A program together with the endpoint it governs
#[derive(Debug)]
pub struct SignalSite {
    pub approach: Endpoint,
    pub program: Box<dyn SignalProgram>,
}

impl SignalSite {
    pub fn new(approach: Endpoint, program: Box<dyn SignalProgram>) -> Self {
        Self { approach, program }
    }

    /// True when a train entering through `entry` is gated by this signal
    pub fn governs(&self, entry: Endpoint) -> bool {
        self.approach == entry
    }
}

/// Signal programs by the segment that hosts them
#[derive(Debug, Default)]
pub struct SignalTable {
    sites: HashMap<SegmentId, SignalSite>,
}

impl SignalTable {
    pub fn insert(&mut self, segment: SegmentId, site: SignalSite) {
        self.sites.insert(segment, site);
    }

    pub fn get(&self, segment: SegmentId) -> Option<&SignalSite> {
        self.sites.get(&segment)
    }

    pub fn get_mut(&mut self, segment: SegmentId) -> Option<&mut SignalSite> {
        self.sites.get_mut(&segment)
    }

    /// The site on `segment` if it gates trains entering through `entry`
    pub fn governing_mut(&mut self, segment: SegmentId, entry: Endpoint) -> Option<&mut SignalSite> {
        self.sites
            .get_mut(&segment)
            .filter(|site| site.governs(entry))
    }

    pub fn aspect(&self, segment: SegmentId) -> Option<Aspect> {
        self.sites.get(&segment).map(|site| site.program.status())
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SegmentId, &SignalSite)> {
        self.sites.iter()
    }
}
