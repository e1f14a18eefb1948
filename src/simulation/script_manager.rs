//! Script manager: the event bus between trains and scripts
//!
//! The mission comes first, then the scripts in registration order; that is
//! the order lifecycle events reach them. Train actions go to every listener
//! condition whose filters match; the cancel results are OR-ed without
//! short-circuiting so every matching listener observes the action.

use log::{debug, warn};
use std::collections::BTreeMap;

use super::accident::{Accident, ActionResult};
use super::mission::{AccidentResponse, Mission};
use super::script::{
    ActionContext, DeferredTask, DrawFrame, DrawListener, ListenerCondition, ListenerRef,
    Script, ScriptInit, TrainActionListener, WorldView,
};
use super::segment_graph::TrackLayout;
use super::time_queue::TimeQueue;
use super::train::Train;
use super::types::{HandlerId, ScriptId, TrainId};

/// Runs a caller-supplied action on a train's next step, then removes itself
struct StepOnce {
    id: HandlerId,
    action: Option<Box<dyn FnOnce(&mut ActionContext<'_>, &mut Train) -> ActionResult>>,
}

impl TrainActionListener for StepOnce {
    fn train_action(
        &mut self,
        ctx: &mut ActionContext<'_>,
        train: &mut Train,
        _event: &str,
    ) -> ActionResult {
        let Some(action) = self.action.take() else {
            return Ok(false);
        };
        let id = self.id;
        ctx.run_in_loop(move |world| world.scripts.remove_handler(id));
        action(ctx, train)
    }
}

#[derive(Default)]
pub struct ScriptManager {
    mission: Option<Box<dyn Mission>>,
    scripts: Vec<Box<dyn Script>>,
    handlers: BTreeMap<HandlerId, Box<dyn TrainActionListener>>,
    draw_listeners: Vec<Box<dyn DrawListener>>,
    conditions: Vec<ListenerCondition>,
    deferred: Vec<DeferredTask>,
    timers: TimeQueue<DeferredTask>,
    next_handler: usize,
}

impl ScriptManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_script(&mut self, script: Box<dyn Script>) -> ScriptId {
        let id = ScriptId(self.scripts.len());
        debug!("registered script {} as {:?}", script.name(), id);
        self.scripts.push(script);
        id
    }

    /// Installs the mission ahead of every script
    pub fn set_mission(&mut self, mission: Box<dyn Mission>) {
        debug!("mission {} takes part as a script", mission.name());
        self.mission = Some(mission);
    }

    pub fn mission(&self) -> Option<&dyn Mission> {
        self.mission.as_deref()
    }

    /// Lets the mission decide what becomes of the trains in an accident
    pub fn accident(&mut self, accident: &Accident) -> AccidentResponse {
        match &mut self.mission {
            Some(mission) => mission.accident(accident),
            None => AccidentResponse::KeepTrains,
        }
    }

    pub fn script_names(&self) -> Vec<&'static str> {
        self.scripts.iter().map(|script| script.name()).collect()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Registers a standalone listener. Conditions for it are added separately.
    pub fn add_handler(&mut self, handler: Box<dyn TrainActionListener>) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.insert(id, handler);
        id
    }

    /// Drops a listener together with every condition that targets it
    pub fn remove_handler(&mut self, id: HandlerId) {
        self.handlers.remove(&id);
        self.conditions
            .retain(|condition| condition.listener != ListenerRef::Handler(id));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Adds a condition immediately. From inside a listener use
    /// [`ActionContext::add_condition_later`] instead.
    pub fn add_condition(&mut self, condition: ListenerCondition) {
        self.conditions.push(condition);
    }

    /// Removes the first structurally equal condition
    pub fn remove_condition(&mut self, condition: &ListenerCondition) -> bool {
        match self.conditions.iter().position(|c| c == condition) {
            Some(index) => {
                self.conditions.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn conditions(&self) -> &[ListenerCondition] {
        &self.conditions
    }

    /// Registers a one-shot listener for `train`'s next "step"
    pub fn defer_into_step(
        &mut self,
        train: TrainId,
        action: impl FnOnce(&mut ActionContext<'_>, &mut Train) -> ActionResult + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.insert(
            id,
            Box::new(StepOnce {
                id,
                action: Some(Box::new(action)),
            }),
        );
        self.conditions.push(ListenerCondition::new(
            ListenerRef::Handler(id),
            Some(train),
            Some("step"),
        ));
        id
    }

    pub fn add_draw_listener(&mut self, listener: Box<dyn DrawListener>) {
        self.draw_listeners.push(listener);
    }

    pub fn draw(&mut self, frame: &DrawFrame<'_>) {
        for listener in &mut self.draw_listeners {
            listener.draw(frame);
        }
    }

    /// Queues `task` for the top of the next tick
    pub fn run_in_loop(&mut self, task: impl FnOnce(&mut super::world::SimWorld) + 'static) {
        self.deferred.push(Box::new(task));
    }

    /// Queues `task` for the first tick at or after `elapsed` seconds
    pub fn run_at(
        &mut self,
        elapsed: f32,
        task: impl FnOnce(&mut super::world::SimWorld) + 'static,
    ) {
        self.timers.add(elapsed, Box::new(task));
    }

    pub fn pending_tasks(&self) -> usize {
        self.deferred.len() + self.timers.len()
    }

    /// Takes every task due at `now`: queued ones first, then timers in time order.
    /// Tasks queued while these run wait for the following tick.
    pub fn take_due_tasks(&mut self, now: f32) -> Vec<DeferredTask> {
        let mut due = std::mem::take(&mut self.deferred);
        while let Some(task) = self.timers.poll(now) {
            due.push(task);
        }
        due
    }

    pub fn init(&mut self) {
        if let Some(mission) = &mut self.mission {
            let mut init = ScriptInit {
                listener: ListenerRef::Mission,
                conditions: &mut self.conditions,
            };
            mission.init(&mut init);
        }
        for (index, script) in self.scripts.iter_mut().enumerate() {
            let mut init = ScriptInit {
                listener: ListenerRef::Script(ScriptId(index)),
                conditions: &mut self.conditions,
            };
            script.init(&mut init);
        }
    }

    /// Passes the layout through the mission, then every script in order
    pub fn modify_segments(&mut self, layout: TrackLayout) -> TrackLayout {
        let layout = match &mut self.mission {
            Some(mission) => mission.modify_segments(layout),
            None => layout,
        };
        self.scripts
            .iter_mut()
            .fold(layout, |layout, script| script.modify_segments(layout))
    }

    /// True if the mission or any script cancels the frame action. Every one is asked.
    pub fn play_frame_action(&mut self, name: &str) -> bool {
        let mut cancelled = false;
        if let Some(mission) = &mut self.mission {
            cancelled |= mission.play_frame_action(name);
        }
        for script in &mut self.scripts {
            cancelled |= script.play_frame_action(name);
        }
        cancelled
    }

    /// Delivers `event` for `train` to every matching condition.
    ///
    /// Returns whether any listener cancelled the action. An accident raised
    /// by a listener ends the dispatch and is returned to the caller.
    pub fn train_action(
        &mut self,
        view: WorldView<'_>,
        train: &mut Train,
        event: &str,
    ) -> ActionResult {
        let Self {
            mission,
            scripts,
            handlers,
            conditions,
            deferred,
            timers,
            ..
        } = self;
        let mut ctx = ActionContext::new(view, deferred, timers);

        let mut cancelled = false;
        for condition in conditions.iter() {
            if !condition.matches(train.id, event) {
                continue;
            }
            let result = match condition.listener {
                ListenerRef::Mission => match mission.as_deref_mut() {
                    Some(mission) => mission.train_action(&mut ctx, train, event),
                    None => continue,
                },
                ListenerRef::Script(id) => match scripts.get_mut(id.0) {
                    Some(script) => script.train_action(&mut ctx, train, event),
                    None => {
                        warn!("condition targets missing script {:?}", id);
                        continue;
                    }
                },
                ListenerRef::Handler(id) => match handlers.get_mut(&id) {
                    Some(handler) => handler.train_action(&mut ctx, train, event),
                    None => continue,
                },
            };
            cancelled |= result?;
        }
        Ok(cancelled)
    }

    pub fn train_step(&mut self, view: WorldView<'_>, train: &mut Train) -> ActionResult {
        self.train_action(view, train, "step")
    }
}
