//! Train control behaviour: automatic lookahead, mixed delegation and the
//! control registry

use rail_sim::simulation::{
    braking_distance, AutomaticControl, Car, ControlEnv, ControlRegistry, Endpoint, GreenRed,
    ManualClock, ManualControl, MixedControl, Position, RedUTurn, SaveMap, SegmentGraph,
    SegmentId, SignalProgram, SignalTable, SimError, SimId, TrackLayout, Train, TrainCommand,
    TrainControl, TrainId, Yellow, BRAKE_DECEL,
};

const DT: f32 = 0.1;

/// Approach track, a 20-unit signal segment, then more track
struct SignalLine {
    graph: SegmentGraph,
    signals: SignalTable,
    approach: SegmentId,
    signal: SegmentId,
    clock: ManualClock,
}

impl SignalLine {
    fn new(program: Box<dyn SignalProgram>) -> Self {
        let mut layout = TrackLayout::new();
        let approach = layout.add_track(100.0);
        let signal = layout.add_signal(20.0, Endpoint::Begin, program);
        let beyond = layout.add_track(100.0);
        layout.chain(approach, signal);
        layout.chain(signal, beyond);
        let (graph, signals) = layout.build().expect("valid layout");
        Self {
            graph,
            signals,
            approach,
            signal,
            clock: ManualClock::new(),
        }
    }

    fn set_color(&mut self, color: &str) {
        let map = SaveMap::from([("color".to_string(), color.to_string())]);
        self.signals
            .get_mut(self.signal)
            .expect("signal site")
            .program
            .load(&map)
            .expect("valid color");
    }

    /// A train whose lead is `distance` units short of the signal
    fn train_before_signal(&self, distance: f32, velocity: f32, throttle: u8) -> Train {
        let progress = 1.0 - distance / 100.0;
        let mut train = Train::new(
            TrainId(SimId(50)),
            vec![Car::new(10.0, 10.0), Car::new(10.0, 10.0)],
            Position::new(self.approach, progress, Endpoint::End),
            &self.graph,
        );
        train.velocity = velocity;
        train.throttle = throttle;
        train
    }

    /// Runs one control tick and returns the horn requests
    fn run(&mut self, control: &mut dyn TrainControl, train: &mut Train) -> Vec<TrainId> {
        let mut horn: Vec<TrainId> = Vec::new();
        let mut env = ControlEnv {
            graph: &self.graph,
            signals: &mut self.signals,
            clock: &self.clock,
            horn: &mut horn,
            dt: DT,
        };
        control.run(train, &mut env);
        horn
    }
}

#[test]
fn test_braking_distance() {
    assert_eq!(braking_distance(0.0, 0.0), 0.0);
    assert_eq!(braking_distance(4.0, 5.0), 0.0);
    let expected = 100.0 / (2.0 * BRAKE_DECEL);
    assert!((braking_distance(10.0, 0.0) - expected).abs() < 1e-4);
}

#[test]
fn test_stationary_train_held_at_nearby_red() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 0);
    assert!(train.brake);
    assert!(control.is_modifying());
    assert_eq!(control.desired(), (5, false));
}

#[test]
fn test_stationary_train_ignores_distant_red() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(90.0, 0.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 5);
    assert!(!train.brake);
    assert!(!control.is_modifying());
}

/// A stopped train 5 units short of a plain `gap`-unit segment, with the
/// signal segment behind that
fn run_stopped_behind_gap(
    gap: f32,
    program: Box<dyn SignalProgram>,
    color: Option<&str>,
) -> (Train, Vec<TrainId>) {
    let mut layout = TrackLayout::new();
    let approach = layout.add_track(100.0);
    let between = layout.add_track(gap);
    let signal = layout.add_signal(20.0, Endpoint::Begin, program);
    let beyond = layout.add_track(100.0);
    layout.chain(approach, between);
    layout.chain(between, signal);
    layout.chain(signal, beyond);
    let (graph, mut signals) = layout.build().expect("valid layout");
    if let Some(color) = color {
        let map = SaveMap::from([("color".to_string(), color.to_string())]);
        signals
            .get_mut(signal)
            .expect("signal site")
            .program
            .load(&map)
            .expect("valid color");
    }

    let mut train = Train::new(
        TrainId(SimId(3)),
        vec![Car::new(10.0, 10.0)],
        Position::new(approach, 0.95, Endpoint::End),
        &graph,
    );
    train.throttle = 5;
    let clock = ManualClock::new();
    let mut horn: Vec<TrainId> = Vec::new();
    let mut env = ControlEnv {
        graph: &graph,
        signals: &mut signals,
        clock: &clock,
        horn: &mut horn,
        dt: DT,
    };
    AutomaticControl::new().run(&mut train, &mut env);
    (train, horn)
}

#[test]
fn test_stationary_train_held_for_red_beyond_next_segment() {
    for gap in [10.0, 20.0] {
        let (train, _) = run_stopped_behind_gap(gap, Box::new(GreenRed::new()), Some("red"));
        assert_eq!(train.throttle, 0, "red {} units ahead", gap + 5.0);
        assert!(train.brake);
    }

    let (train, _) = run_stopped_behind_gap(50.0, Box::new(GreenRed::new()), Some("red"));
    assert_eq!(train.throttle, 5);
    assert!(!train.brake);
}

#[test]
fn test_stationary_train_crawls_toward_yellow_beyond_next_segment() {
    let (train, horn) = run_stopped_behind_gap(20.0, Box::new(Yellow), None);
    assert_eq!(train.throttle, 1);
    assert!(!train.brake);
    assert_eq!(horn, vec![train.id]);
}

#[test]
fn test_moving_train_brakes_for_red_within_stopping_distance() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    // Stopping distance at 10 is about 16.7 plus one tick of travel
    let mut train = line.train_before_signal(15.0, 10.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 0);
    assert!(train.brake);
}

#[test]
fn test_moving_train_keeps_going_when_red_is_far() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(50.0, 10.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 5);
    assert!(!train.brake);
}

#[test]
fn test_green_restores_operator_settings() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);
    assert_eq!(train.throttle, 0);

    line.set_color("green");
    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 5);
    assert!(!train.brake);
    assert!(!control.is_modifying());
}

#[test]
fn test_operator_input_while_held_updates_desired_settings() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);
    control.process(&mut train, TrainCommand::ThrottleUp);

    assert_eq!(train.throttle, 0);
    assert_eq!(control.desired(), (6, false));

    line.set_color("green");
    line.run(&mut control, &mut train);
    assert_eq!(train.throttle, 6);
}

#[test]
fn test_end_of_track_holds_like_red() {
    let mut layout = TrackLayout::new();
    let only = layout.add_track(100.0);
    let (graph, mut signals) = layout.build().expect("valid layout");
    let mut train = Train::new(
        TrainId(SimId(1)),
        vec![Car::new(10.0, 10.0)],
        Position::new(only, 0.9, Endpoint::End),
        &graph,
    );
    train.throttle = 3;
    let clock = ManualClock::new();
    let mut horn: Vec<TrainId> = Vec::new();
    let mut control = AutomaticControl::new();

    let mut env = ControlEnv {
        graph: &graph,
        signals: &mut signals,
        clock: &clock,
        horn: &mut horn,
        dt: DT,
    };
    control.run(&mut train, &mut env);

    assert_eq!(train.throttle, 0);
    assert!(train.brake);
}

#[test]
fn test_yellow_slows_train_to_crawl() {
    let mut line = SignalLine::new(Box::new(Yellow));
    let mut train = line.train_before_signal(1.0, 5.5, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 1);
    assert!(!train.brake);
    assert!(control.is_modifying());
    assert_eq!(control.desired(), (5, false));
}

#[test]
fn test_yellow_crawl_pulls_a_coasting_train() {
    let mut line = SignalLine::new(Box::new(Yellow));
    let mut train = line.train_before_signal(1.0, 5.5, 0);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 1);
    assert!(!train.brake);
    assert_eq!(control.desired(), (0, false));
}

#[test]
fn test_yellow_hard_stop_when_too_fast() {
    let mut line = SignalLine::new(Box::new(Yellow));
    let mut train = line.train_before_signal(5.0, 8.0, 5);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert_eq!(train.throttle, 0);
    assert!(train.brake);
    assert!(control.is_modifying());
}

#[test]
fn test_departure_horn_sounds_once_at_yellow() {
    let mut line = SignalLine::new(Box::new(Yellow));
    let mut train = line.train_before_signal(20.0, 0.0, 5);
    let mut control = AutomaticControl::new();

    let horn = line.run(&mut control, &mut train);
    assert_eq!(horn, vec![train.id]);
    assert_eq!(train.throttle, 1);

    let horn = line.run(&mut control, &mut train);
    assert!(horn.is_empty());
    assert_eq!(train.throttle, 1);
}

#[test]
fn test_red_u_turn_ahead_requests_reversal() {
    let mut line = SignalLine::new(Box::new(RedUTurn));
    let mut train = line.train_before_signal(10.0, 0.0, 4);
    let mut control = AutomaticControl::new();

    line.run(&mut control, &mut train);

    assert!(train.reverse_requested);
    assert_eq!(train.throttle, 4);
    assert!(!train.brake);
}

#[test]
fn test_crossing_horn_sounds_once_per_approach() {
    let mut layout = TrackLayout::new();
    let approach = layout.add_track(100.0);
    let crossing = layout.add_crossing(10.0);
    let beyond = layout.add_track(100.0);
    layout.chain(approach, crossing);
    layout.chain(crossing, beyond);
    let (graph, mut signals) = layout.build().expect("valid layout");
    let clock = ManualClock::new();
    let mut control = AutomaticControl::new();
    let mut train = Train::new(
        TrainId(SimId(9)),
        vec![Car::new(10.0, 10.0)],
        Position::new(approach, 0.5, Endpoint::End),
        &graph,
    );

    let mut sounded = 0;
    for _ in 0..3 {
        let mut horn: Vec<TrainId> = Vec::new();
        let mut env = ControlEnv {
            graph: &graph,
            signals: &mut signals,
            clock: &clock,
            horn: &mut horn,
            dt: DT,
        };
        control.run(&mut train, &mut env);
        sounded += horn.len();
    }
    assert_eq!(sounded, 1);

    // Once clear of the crossing the latch resets
    train.position = Position::new(beyond, 0.5, Endpoint::End);
    let mut horn: Vec<TrainId> = Vec::new();
    let mut env = ControlEnv {
        graph: &graph,
        signals: &mut signals,
        clock: &clock,
        horn: &mut horn,
        dt: DT,
    };
    control.run(&mut train, &mut env);
    assert!(horn.is_empty());
}

#[test]
fn test_automatic_save_and_load() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 7);
    let mut control = AutomaticControl::new();
    line.run(&mut control, &mut train);

    let saved = control.save();
    assert_eq!(saved.get("modifying").map(String::as_str), Some("true"));
    assert_eq!(saved.get("desired_throttle").map(String::as_str), Some("7"));

    let mut restored = AutomaticControl::new();
    restored
        .load(&saved, &ControlRegistry::with_defaults())
        .expect("saved state loads");
    assert_eq!(restored, control);
}

#[test]
fn test_automatic_load_rejects_garbage() {
    let mut control = AutomaticControl::new();
    let bad = SaveMap::from([("desired_throttle".to_string(), "lots".to_string())]);
    assert!(matches!(
        control.load(&bad, &ControlRegistry::with_defaults()),
        Err(SimError::InvalidValue { key, .. }) if key == "desired_throttle"
    ));
    assert_eq!(control, AutomaticControl::new());
}

#[test]
fn test_manual_control_relays_commands() {
    let line = SignalLine::new(Box::new(GreenRed::new()));
    let mut train = line.train_before_signal(50.0, 0.0, 0);
    let mut control = ManualControl::new();

    control.process(&mut train, TrainCommand::SetThrottle(3));
    control.process(&mut train, TrainCommand::ThrottleUp);
    control.process(&mut train, TrainCommand::ToggleBrake);
    control.process(&mut train, TrainCommand::Reverse);

    assert_eq!(train.throttle, 4);
    assert!(train.brake);
    assert!(train.reverse_requested);
}

#[test]
fn test_manual_control_ignores_red() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(5.0, 0.0, 5);
    let mut control = ManualControl::new();

    line.run(&mut control, &mut train);
    assert_eq!(train.throttle, 5);
    assert!(!train.brake);
}

#[test]
fn test_cargo_only_handled_when_stationary() {
    let line = SignalLine::new(Box::new(GreenRed::new()));
    let mut train = line.train_before_signal(50.0, 3.0, 0);
    let mut control = ManualControl::new();

    control.load_cargo(&mut train);
    assert!(train.cars.iter().all(|car| !car.loaded));

    train.velocity = 0.0;
    assert!(control.select_car(&mut train, 1));
    control.load_cargo(&mut train);
    assert!(!train.cars[0].loaded);
    assert!(train.cars[1].loaded);
    assert!(!control.select_car(&mut train, 5));
}

#[test]
fn test_mixed_switches_with_selection() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 5);
    let mut control = MixedControl::new();

    train.selected = true;
    control.select();
    assert!(control.is_selected());
    line.run(&mut control, &mut train);
    assert_eq!(train.throttle, 5);

    train.selected = false;
    control.deselect();
    line.run(&mut control, &mut train);
    assert_eq!(train.throttle, 0);
    assert!(train.brake);
}

#[test]
fn test_mixed_follows_train_selection_without_hooks() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 5);
    let mut control = MixedControl::new();

    train.selected = true;
    line.run(&mut control, &mut train);
    assert!(control.is_selected());
    assert_eq!(train.throttle, 5);
    assert!(!train.brake);
}

#[test]
fn test_mixed_save_and_load_round_trip() {
    let mut line = SignalLine::new(Box::new(GreenRed::new()));
    line.set_color("red");
    let mut train = line.train_before_signal(20.0, 0.0, 3);
    let mut control = MixedControl::with_controls(
        Box::new(AutomaticControl::new()),
        Box::new(ManualControl::new()),
    );
    train.selected = true;
    control.select();
    line.run(&mut control, &mut train);

    let saved = control.save();
    assert_eq!(saved.get("selected").map(String::as_str), Some("automatic"));
    assert_eq!(saved.get("deselected").map(String::as_str), Some("manual"));
    assert_eq!(saved.get("Smodifying").map(String::as_str), Some("true"));

    let mut restored = MixedControl::new();
    restored
        .load(&saved, &ControlRegistry::with_defaults())
        .expect("saved state loads");
    assert_eq!(restored.sub_types(), ("automatic", "manual"));
    assert_eq!(restored.save(), saved);
}

#[test]
fn test_mixed_load_with_unknown_type_keeps_state() {
    let mut control = MixedControl::new();
    let map = SaveMap::from([
        ("selected".to_string(), "warp_drive".to_string()),
        ("deselected".to_string(), "manual".to_string()),
    ]);

    assert!(matches!(
        control.load(&map, &ControlRegistry::with_defaults()),
        Err(SimError::UnknownControl(name)) if name == "warp_drive"
    ));
    assert_eq!(control.sub_types(), ("manual", "automatic"));
}

#[test]
fn test_registry_creates_controls_by_name() {
    let registry = ControlRegistry::with_defaults();
    let names: Vec<_> = registry.names().collect();
    assert_eq!(names, vec!["automatic", "manual", "mixed"]);

    for name in names {
        let control = registry.create_instance(name).expect("registered");
        assert_eq!(control.type_name(), name);
    }

    assert!(matches!(
        registry.create_instance("steam"),
        Err(SimError::UnknownControl(name)) if name == "steam"
    ));
}
