mod common;

use common::{engine, frame, line_frame};

#[test]
fn rate_window_suppresses_between_fires() {
    let engine = engine();
    let mut tp = line_frame("b1", "views.py", 10);
    tp.args.rate_limit = Some(1000);
    engine.dispatcher.replace_tracepoints(vec![tp]).unwrap();

    let site = frame("views.py", "handle", 10);
    for at in [0, 100, 200, 1100, 1200] {
        engine.clock.set_ms(at);
        engine.hit(&site);
    }

    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].start_ms, 0);
    assert_eq!(events[0].tags.suppressed, 0);
    assert_eq!(events[1].start_ms, 1100);
    assert_eq!(events[1].tags.suppressed, 2);

    // The hit at t=1200 stays accumulated for the next fire.
    engine.clock.set_ms(2500);
    engine.hit(&site);
    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags.suppressed, 1);
}

#[test]
fn no_two_fires_closer_than_the_window() {
    let engine = engine();
    let mut tp = line_frame("b1", "views.py", 10);
    tp.args.rate_limit = Some(250);
    engine.dispatcher.replace_tracepoints(vec![tp]).unwrap();

    let site = frame("views.py", "handle", 10);
    for at in (0..2000).step_by(100) {
        engine.clock.set_ms(at);
        engine.hit(&site);
    }

    let events = engine.sink.drain_events();
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[1].start_ms - pair[0].start_ms >= 250);
    }
}

#[test]
fn fire_count_limit_is_exact() {
    let engine = engine();
    let mut tp = line_frame("b2", "views.py", 10);
    tp.args.rate_limit = Some(0);
    tp.fire_count_limit = Some(2);
    engine.dispatcher.replace_tracepoints(vec![tp]).unwrap();

    let site = frame("views.py", "handle", 10);
    for at in 0..10 {
        engine.clock.set_ms(at);
        engine.hit(&site);
    }

    assert_eq!(engine.sink.drain_events().len(), 2);
}

#[test]
fn unbounded_fire_count_via_minus_one() {
    let engine = engine();
    let mut tp = line_frame("b3", "views.py", 10);
    tp.args.rate_limit = Some(0);
    tp.fire_count_limit = Some(-1);
    engine.dispatcher.replace_tracepoints(vec![tp]).unwrap();

    let site = frame("views.py", "handle", 10);
    for at in 0..25 {
        engine.clock.set_ms(at);
        engine.hit(&site);
    }

    assert_eq!(engine.sink.drain_events().len(), 25);
}

#[test]
fn identical_replace_resets_rate_history() {
    let engine = engine();
    let make = || {
        let mut tp = line_frame("b4", "views.py", 10);
        tp.args.rate_limit = Some(60_000);
        tp.fire_count_limit = Some(1);
        tp
    };
    engine.dispatcher.replace_tracepoints(vec![make()]).unwrap();

    let site = frame("views.py", "handle", 10);
    engine.clock.set_ms(0);
    engine.hit(&site);
    engine.clock.set_ms(1);
    engine.hit(&site);
    assert_eq!(engine.sink.drain_events().len(), 1);

    // Same definition set again: active tracepoints unchanged, but the
    // fire-count and window history start over.
    engine.dispatcher.replace_tracepoints(vec![make()]).unwrap();
    engine.clock.set_ms(2);
    engine.hit(&site);
    assert_eq!(engine.sink.drain_events().len(), 1);
}

#[test]
fn default_rate_limit_comes_from_settings() {
    let mut settings = linetap_engine::EngineSettings::default();
    settings.default_rate_limit_ms = 1000;
    let engine = common::engine_with(settings);
    engine
        .dispatcher
        .replace_tracepoints(vec![line_frame("b5", "views.py", 10)])
        .unwrap();

    let site = frame("views.py", "handle", 10);
    engine.clock.set_ms(0);
    engine.hit(&site);
    engine.clock.set_ms(500);
    engine.hit(&site);
    assert_eq!(engine.sink.drain_events().len(), 1);
    assert_eq!(engine.dispatcher.metrics().hits_suppressed, 1);
}
