//! Missions and the built-in accident detection scripts
//!
//! A mission is the distinguished script of a game: it picks the map, builds
//! the script manager, takes part in the script lifecycle ahead of the other
//! scripts and decides what happens after an accident.

use log::{info, warn};

use super::accident::{Accident, ActionResult};
use super::error::SimResult;
use super::script::{ActionContext, Script, ScriptInit, ScriptRegistry};
use super::script_manager::ScriptManager;
use super::train::Train;

/// Impact speed a buffer stop absorbs without damage
pub const BUFFER_SAFE_SPEED: f32 = 3.0;

/// What the world does with the trains involved in an accident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccidentResponse {
    KeepTrains,
    RemoveTrains,
}

pub trait Mission: Script {
    /// Map file the mission is played on
    fn rwm_filename(&self) -> &str;

    fn briefing(&self) -> String;

    /// Builds the scripts active for this mission
    fn create_script_manager(&self, registry: &ScriptRegistry) -> SimResult<ScriptManager>;

    fn accident(&mut self, accident: &Accident) -> AccidentResponse;
}

/// Open-ended play with every default script; wrecks are cleared away
#[derive(Debug, Clone, Default)]
pub struct FreePlay {
    accidents: Vec<Accident>,
}

impl FreePlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accidents(&self) -> &[Accident] {
        &self.accidents
    }
}

impl Script for FreePlay {
    fn name(&self) -> &'static str {
        "Free play"
    }
}

impl Mission for FreePlay {
    fn rwm_filename(&self) -> &str {
        "freeplay.rwm"
    }

    fn briefing(&self) -> String {
        "Keep the trains moving. Signals are yours to trust, collisions are yours to avoid."
            .to_string()
    }

    fn create_script_manager(&self, registry: &ScriptRegistry) -> SimResult<ScriptManager> {
        let mut manager = ScriptManager::new();
        for name in registry.names() {
            let script = registry.create_instance(name)?;
            if script.on_by_default() {
                manager.add_script(script);
            }
        }
        Ok(manager)
    }

    fn accident(&mut self, accident: &Accident) -> AccidentResponse {
        warn!("Accident: {}", accident);
        self.accidents.push(accident.clone());
        info!("{} accident(s) so far", self.accidents.len());
        AccidentResponse::RemoveTrains
    }
}

/// Declares a collision when the stepping train overlaps another train
#[derive(Debug, Clone, Default)]
pub struct CollisionWatch;

impl CollisionWatch {
    pub const NAME: &'static str = "collision_watch";
}

impl Script for CollisionWatch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, init: &mut ScriptInit<'_>) {
        init.listen(None, Some("step"));
    }

    fn train_action(
        &mut self,
        ctx: &mut ActionContext<'_>,
        train: &mut Train,
        _event: &str,
    ) -> ActionResult {
        let graph = ctx.view.graph;
        let ours = train.footprint(graph);
        for (other_id, other) in ctx.view.trains {
            if *other_id == train.id {
                continue;
            }
            let theirs = other.train.footprint(graph);
            let hit = ours
                .iter()
                .find(|span| theirs.iter().any(|other_span| span.overlaps(other_span)));
            if let Some(span) = hit {
                return Err(Accident::collision(train.id, *other_id, span.segment));
            }
        }
        Ok(false)
    }
}

/// Declares an accident when a train hits the end of the track too fast
#[derive(Debug, Clone)]
pub struct BufferWatch {
    pub safe_speed: f32,
}

impl Default for BufferWatch {
    fn default() -> Self {
        Self {
            safe_speed: BUFFER_SAFE_SPEED,
        }
    }
}

impl BufferWatch {
    pub const NAME: &'static str = "buffer_watch";
}

impl Script for BufferWatch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, init: &mut ScriptInit<'_>) {
        init.listen(None, Some("step"));
    }

    fn train_action(
        &mut self,
        _ctx: &mut ActionContext<'_>,
        train: &mut Train,
        _event: &str,
    ) -> ActionResult {
        match train.last_impact() {
            Some(speed) if speed > self.safe_speed => {
                Err(Accident::buffer_overrun(train.id, train.position.segment))
            }
            _ => Ok(false),
        }
    }
}
