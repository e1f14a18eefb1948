//! Signal program behaviour
//!
//! Programs are exercised directly against a single-segment track and a
//! manual clock, so stage timing is fully controlled.

use rail_sim::simulation::{
    Aspect, Car, Endpoint, GreenRed, ManualClock, Position, Reaction, RedUTurn, SaveMap,
    SegmentGraph, SignalProgram, SimError, SimId, TrackLayout, Train, TrainId, UlGreenRed,
    UlStage, UlUTurn, Yellow, FINISH_DELAY_MS, LOAD_DELAY_MS, UNLOAD_DELAY_MS,
};

fn single_segment() -> SegmentGraph {
    let mut layout = TrackLayout::new();
    layout.add_track(100.0);
    let (graph, _) = layout.build().expect("valid layout");
    graph
}

fn standing_train(graph: &SegmentGraph) -> Train {
    let segment = graph.segments().next().expect("one segment").id;
    let mut cars = vec![Car::new(10.0, 20.0), Car::new(10.0, 20.0)];
    for car in &mut cars {
        car.loaded = true;
    }
    Train::new(
        TrainId(SimId(100)),
        cars,
        Position::new(segment, 0.5, Endpoint::End),
        graph,
    )
}

/// Runs a station program through a whole stop, one stage per call
fn run_full_cycle(program: &mut dyn SignalProgram, train: &mut Train, clock: &ManualClock) {
    program.reacting(train, clock);
    clock.advance(UNLOAD_DELAY_MS);
    program.reacting(train, clock);
    clock.advance(LOAD_DELAY_MS);
    program.reacting(train, clock);
    clock.advance(FINISH_DELAY_MS);
}

#[test]
fn test_green_red_turns_red_on_entry_and_stays_red() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let mut signal = GreenRed::new();
    assert_eq!(signal.status(), Aspect::Green);

    signal.enter(&mut train);
    assert_eq!(signal.status(), Aspect::Red);

    signal.enter(&mut train);
    assert_eq!(signal.status(), Aspect::Red);
    assert_eq!(signal.icon(), 'R');
}

#[test]
fn test_green_red_save_and_load() {
    let mut signal = GreenRed::new();
    let saved = signal.save();
    assert_eq!(saved.get("color").map(String::as_str), Some("green"));

    let red = SaveMap::from([("color".to_string(), "red".to_string())]);
    signal.load(&red).expect("valid color");
    assert_eq!(signal.status(), Aspect::Red);
}

#[test]
fn test_green_red_load_requires_color() {
    let mut signal = GreenRed::new();
    let result = signal.load(&SaveMap::new());
    assert!(matches!(result, Err(SimError::MissingKey(key)) if key == "color"));
    assert_eq!(signal.status(), Aspect::Green);

    let bad = SaveMap::from([("color".to_string(), "purple".to_string())]);
    assert!(matches!(
        signal.load(&bad),
        Err(SimError::InvalidValue { .. })
    ));
    assert_eq!(signal.status(), Aspect::Green);
}

#[test]
fn test_yellow_is_always_yellow() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let clock = ManualClock::new();
    let mut signal = Yellow;

    signal.enter(&mut train);
    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Hold);
    assert_eq!(signal.status(), Aspect::Yellow);
    assert!(signal.save().is_empty());
}

#[test]
fn test_red_u_turn_reverses_stopped_train_and_stays_red() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let clock = ManualClock::new();
    let mut signal = RedUTurn;

    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Release);
    assert!(train.reverse_requested);
    assert_eq!(signal.status(), Aspect::Red);
}

#[test]
fn test_red_u_turn_ignores_moving_train() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    train.velocity = 4.0;
    let clock = ManualClock::new();
    let mut signal = RedUTurn;

    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Hold);
    assert!(!train.reverse_requested);
}

#[test]
fn test_ul_green_red_runs_stages_in_order() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let clock = ManualClock::new();
    let mut signal = UlGreenRed::new();
    assert_eq!(signal.status(), Aspect::Red);

    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::WaitingToUnload);

    clock.advance(UNLOAD_DELAY_MS - 1);
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::WaitingToUnload);
    assert!(train.cars.iter().all(|car| car.loaded));

    clock.advance(1);
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::WaitingToLoad);
    assert!(train.cars.iter().all(|car| !car.loaded));

    clock.advance(LOAD_DELAY_MS);
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::WaitingToFinish);
    assert!(train.cars.iter().all(|car| car.loaded));
    assert_eq!(signal.status(), Aspect::Red);

    clock.advance(FINISH_DELAY_MS);
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::Idle);
    assert_eq!(signal.status(), Aspect::Green);
}

#[test]
fn test_ul_green_red_completes_once_per_stop() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let clock = ManualClock::new();
    let mut signal = UlGreenRed::new();

    run_full_cycle(&mut signal, &mut train, &clock);
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.status(), Aspect::Green);

    // Standing on after completion does not start another cycle
    clock.advance(UNLOAD_DELAY_MS * 5);
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::Idle);
    assert_eq!(signal.status(), Aspect::Green);

    // The next train to enter finds it red with a fresh cycle
    train.velocity = 5.0;
    signal.enter(&mut train);
    assert_eq!(signal.status(), Aspect::Red);
    train.velocity = 0.0;
    signal.reacting(&mut train, &clock);
    assert_eq!(signal.stage(), UlStage::WaitingToUnload);
}

#[test]
fn test_ul_cycle_aborts_when_train_moves() {
    let graph = single_segment();
    let delays = [UNLOAD_DELAY_MS, LOAD_DELAY_MS];

    for reached in [
        UlStage::WaitingToUnload,
        UlStage::WaitingToLoad,
        UlStage::WaitingToFinish,
    ] {
        let mut train = standing_train(&graph);
        let clock = ManualClock::new();
        let mut signal = UlGreenRed::new();

        signal.reacting(&mut train, &clock);
        for delay in delays {
            if signal.stage() == reached {
                break;
            }
            clock.advance(delay);
            signal.reacting(&mut train, &clock);
        }
        assert_eq!(signal.stage(), reached);

        train.velocity = 1.0;
        signal.reacting(&mut train, &clock);
        assert_eq!(signal.stage(), UlStage::Idle, "aborted from {:?}", reached);
        assert_eq!(signal.status(), Aspect::Red);

        // Stopped again: the old timestamps no longer count, so nothing
        // finishes before a complete new cycle has run
        train.velocity = 0.0;
        clock.advance(FINISH_DELAY_MS * 10);
        signal.reacting(&mut train, &clock);
        assert_eq!(signal.stage(), UlStage::WaitingToUnload);
        for delay in delays {
            assert_eq!(signal.status(), Aspect::Red);
            clock.advance(delay - 1);
            signal.reacting(&mut train, &clock);
            assert_eq!(signal.status(), Aspect::Red);
            clock.advance(1);
            signal.reacting(&mut train, &clock);
        }
        assert_eq!(signal.stage(), UlStage::WaitingToFinish);
        clock.advance(FINISH_DELAY_MS - 1);
        signal.reacting(&mut train, &clock);
        assert_eq!(signal.status(), Aspect::Red);

        clock.advance(1);
        signal.reacting(&mut train, &clock);
        assert_eq!(signal.stage(), UlStage::Idle);
        assert_eq!(signal.status(), Aspect::Green);
    }
}

#[test]
fn test_ul_u_turn_releases_and_reverses_when_done() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let clock = ManualClock::new();
    let mut signal = UlUTurn::new();

    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Hold);
    clock.advance(UNLOAD_DELAY_MS);
    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Hold);
    clock.advance(LOAD_DELAY_MS);
    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Hold);
    assert!(!train.reverse_requested);

    clock.advance(FINISH_DELAY_MS);
    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Release);
    assert!(train.reverse_requested);
    assert_eq!(signal.status(), Aspect::Red);

    // Only the finishing call releases
    assert_eq!(signal.reacting(&mut train, &clock), Reaction::Hold);
}

#[test]
fn test_ul_green_red_save_and_load_mid_cycle() {
    let graph = single_segment();
    let mut train = standing_train(&graph);
    let clock = ManualClock::new();
    let mut signal = UlGreenRed::new();

    clock.set(2_000);
    signal.reacting(&mut train, &clock);
    clock.advance(UNLOAD_DELAY_MS);
    signal.reacting(&mut train, &clock);
    let saved = signal.save();
    assert_eq!(saved.get("stage").map(String::as_str), Some("2"));
    assert_eq!(saved.get("color").map(String::as_str), Some("red"));

    let mut restored = UlGreenRed::new();
    restored.load(&saved).expect("saved state loads");
    assert_eq!(restored, signal);
}

#[test]
fn test_ul_load_rejects_bad_stage_and_keeps_state() {
    let mut signal = UlGreenRed::new();
    let bad = SaveMap::from([
        ("color".to_string(), "green".to_string()),
        ("stage".to_string(), "9".to_string()),
    ]);

    assert!(matches!(
        signal.load(&bad),
        Err(SimError::InvalidValue { key, .. }) if key == "stage"
    ));
    assert_eq!(signal.status(), Aspect::Red);
    assert_eq!(signal.stage(), UlStage::Idle);
}

#[test]
fn test_ul_green_red_defaults_to_red_when_color_missing() {
    let mut signal = UlGreenRed::new();
    let map = SaveMap::from([("stage".to_string(), "1".to_string())]);
    signal.load(&map).expect("color is optional");
    assert_eq!(signal.status(), Aspect::Red);
    assert_eq!(signal.stage(), UlStage::WaitingToUnload);
}
