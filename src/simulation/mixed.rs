//! Mixed train control
//!
//! Hands the train to one of two sub-controls depending on whether the
//! operator has it selected: by default the operator drives a selected train
//! and automatic control takes over when it is deselected. The train's own
//! selection flag decides, so a control loaded for an already selected train
//! picks the right side on its first tick.

use super::automatic::AutomaticControl;
use super::control::{ControlEnv, ControlRegistry, ManualControl, TrainCommand, TrainControl};
use super::error::{required, SimResult};
use super::train::Train;
use super::types::SaveMap;

const SELECTED_TYPE_KEY: &str = "selected";
const DESELECTED_TYPE_KEY: &str = "deselected";
const SELECTED_PREFIX: &str = "S";
const DESELECTED_PREFIX: &str = "D";

pub struct MixedControl {
    when_selected: Box<dyn TrainControl>,
    when_deselected: Box<dyn TrainControl>,
    is_selected: bool,
}

impl Default for MixedControl {
    fn default() -> Self {
        Self::new()
    }
}

impl MixedControl {
    pub const TYPE_NAME: &'static str = "mixed";

    pub fn new() -> Self {
        Self::with_controls(
            Box::new(ManualControl::new()),
            Box::new(AutomaticControl::new()),
        )
    }

    pub fn with_controls(
        when_selected: Box<dyn TrainControl>,
        when_deselected: Box<dyn TrainControl>,
    ) -> Self {
        Self {
            when_selected,
            when_deselected,
            is_selected: false,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    /// Type names of the (selected, deselected) sub-controls
    pub fn sub_types(&self) -> (&'static str, &'static str) {
        (
            self.when_selected.type_name(),
            self.when_deselected.type_name(),
        )
    }

    /// Catches up with a selection change that bypassed `select`/`deselect`
    fn follow(&mut self, train: &Train) {
        if train.selected != self.is_selected {
            if train.selected {
                self.select();
            } else {
                self.deselect();
            }
        }
    }

    fn active(&mut self) -> &mut Box<dyn TrainControl> {
        if self.is_selected {
            &mut self.when_selected
        } else {
            &mut self.when_deselected
        }
    }
}

fn prefixed(prefix: &str, map: SaveMap, into: &mut SaveMap) {
    for (key, value) in map {
        into.insert(format!("{prefix}{key}"), value);
    }
}

fn unprefixed(prefix: &str, map: &SaveMap) -> SaveMap {
    map.iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|stripped| (stripped.to_string(), value.clone()))
        })
        .collect()
}

impl TrainControl for MixedControl {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn run(&mut self, train: &mut Train, env: &mut ControlEnv<'_>) -> bool {
        self.follow(train);
        self.active().run(train, env)
    }

    fn process(&mut self, train: &mut Train, command: TrainCommand) {
        self.follow(train);
        self.active().process(train, command);
    }

    fn select(&mut self) {
        self.is_selected = true;
        self.active().select();
    }

    fn deselect(&mut self) {
        self.is_selected = false;
        self.active().deselect();
    }

    fn select_car(&mut self, train: &mut Train, index: usize) -> bool {
        self.follow(train);
        self.active().select_car(train, index)
    }

    fn load_cargo(&mut self, train: &mut Train) {
        self.follow(train);
        self.active().load_cargo(train);
    }

    fn unload_cargo(&mut self, train: &mut Train) {
        self.follow(train);
        self.active().unload_cargo(train);
    }

    fn save(&self) -> SaveMap {
        let mut map = SaveMap::new();
        map.insert(
            SELECTED_TYPE_KEY.to_string(),
            self.when_selected.type_name().to_string(),
        );
        map.insert(
            DESELECTED_TYPE_KEY.to_string(),
            self.when_deselected.type_name().to_string(),
        );
        prefixed(SELECTED_PREFIX, self.when_selected.save(), &mut map);
        prefixed(DESELECTED_PREFIX, self.when_deselected.save(), &mut map);
        map
    }

    fn load(&mut self, map: &SaveMap, registry: &ControlRegistry) -> SimResult<()> {
        let mut when_selected = registry.create_instance(required(map, SELECTED_TYPE_KEY)?)?;
        let mut when_deselected = registry.create_instance(required(map, DESELECTED_TYPE_KEY)?)?;
        when_selected.load(&unprefixed(SELECTED_PREFIX, map), registry)?;
        when_deselected.load(&unprefixed(DESELECTED_PREFIX, map), registry)?;

        self.when_selected = when_selected;
        self.when_deselected = when_deselected;
        Ok(())
    }
}
