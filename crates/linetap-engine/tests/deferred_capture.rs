mod common;

use std::sync::Arc;

use common::{engine, frame, line_frame};
use linetap_engine::{ExecutionEvent, Frame, InterceptHook, Value};
use smol_str::SmolStr;

fn two_phase(id: &str, line: u32, hook: &str) -> linetap_engine::TracepointDto {
    let mut tp = line_frame(id, "views.py", line);
    tp.args.rate_limit = Some(0);
    tp.args.line_hook = Some(SmolStr::new(hook));
    tp
}

#[test]
fn pending_capture_waits_for_matching_frame() {
    // Scenario: a data_left hit on thread T at frame F stays queued
    // across events at other frames and completes only back at F.
    let engine = engine();
    engine
        .dispatcher
        .replace_tracepoints(vec![two_phase("b3", 10, "data_left")])
        .unwrap();

    engine.clock.set_ms(5);
    engine.hit(&frame("views.py", "handle", 10));
    assert_eq!(engine.sink.event_count(), 0);

    // Return event in a different frame: not the correlated
    // continuation, the entry stays queued.
    engine.clock.set_ms(6);
    engine
        .dispatcher
        .on_event(&ExecutionEvent::Return, &frame("views.py", "helper", 3), 1);
    assert_eq!(engine.sink.event_count(), 0);

    engine.clock.set_ms(9);
    engine.hit(&frame("views.py", "handle", 11));

    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tracepoint_id, "b3");
    assert_eq!(events[0].start_ms, 5);
    assert_eq!(events[0].end_ms, 9);
}

#[test]
fn other_threads_do_not_complete_the_capture() {
    let engine = engine();
    engine
        .dispatcher
        .replace_tracepoints(vec![two_phase("t", 10, "data_left")])
        .unwrap();

    engine.hit_on(&frame("views.py", "handle", 10), 1);
    // Matching frame but wrong thread.
    engine
        .dispatcher
        .on_event(&ExecutionEvent::Line, &frame("views.py", "handle", 11), 2);
    assert_eq!(engine.sink.event_count(), 0);

    engine.hit_on(&frame("views.py", "handle", 11), 1);
    assert_eq!(engine.sink.drain_events().len(), 1);
}

#[test]
fn data_right_merges_post_line_state() {
    let engine = engine();
    let mut tp = two_phase("dr", 10, "data_right");
    tp.args
        .watchers
        .insert(SmolStr::new("seen"), SmolStr::new("x"));
    engine.dispatcher.replace_tracepoints(vec![tp]).unwrap();

    let before = Arc::new(Frame::new("views.py", "handle", 10).local("x", Value::Int(1)));
    engine.hit(&before);
    assert_eq!(engine.sink.event_count(), 0);

    let after = Arc::new(Frame::new("views.py", "handle", 11).local("x", Value::Int(2)));
    engine.hit(&after);

    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 1);
    // Right side wins the merge: the post-assignment value is visible.
    assert_eq!(events[0].variables.get("x"), Some(&Value::Int(2)));
    assert_eq!(
        events[0].watch_results.get("seen"),
        Some(&linetap_engine::WatchResult::Value(Value::Int(2)))
    );
}

#[test]
fn exception_completion_carries_error_tag() {
    let engine = engine();
    engine
        .dispatcher
        .replace_tracepoints(vec![two_phase("ex", 10, "data_left")])
        .unwrap();

    engine.hit(&frame("views.py", "handle", 10));
    engine.dispatcher.on_event(
        &ExecutionEvent::Exception {
            message: SmolStr::new("ZeroDivisionError: division by zero"),
        },
        &frame("views.py", "handle", 10),
        1,
    );

    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].tags.error.as_deref(),
        Some("ZeroDivisionError: division by zero")
    );
}

#[test]
fn completions_preserve_fifo_order() {
    let engine = engine();
    engine
        .dispatcher
        .replace_tracepoints(vec![
            two_phase("first", 10, "data_left"),
            two_phase("second", 11, "data_left"),
        ])
        .unwrap();

    engine.hit(&frame("views.py", "handle", 10));
    engine.hit(&frame("views.py", "handle", 11));
    // The second line hit completed the first pending entry and queued
    // its own; one more event at the frame completes the second.
    engine.hit(&frame("views.py", "handle", 12));

    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tracepoint_id, "first");
    assert_eq!(events[1].tracepoint_id, "second");
}

#[test]
fn pending_capture_survives_registry_replace() {
    // Deliberate behavior, preserved from the reference: a capture
    // already in flight still completes after its definition is
    // dropped, as long as the engine itself stays active (the
    // registry-empty fast path would skip everything otherwise).
    let engine = engine();
    engine
        .dispatcher
        .replace_tracepoints(vec![two_phase("doomed", 10, "data_left")])
        .unwrap();

    engine.hit(&frame("views.py", "handle", 10));
    assert_eq!(engine.sink.event_count(), 0);

    // Replace with an unrelated definition; "doomed" is gone from the
    // active set but its pending capture is not cancelled.
    engine
        .dispatcher
        .replace_tracepoints(vec![line_frame("other", "models.py", 4)])
        .unwrap();

    engine.hit(&frame("views.py", "handle", 11));
    let events = engine.sink.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tracepoint_id, "doomed");
}
