#![allow(dead_code)]

use std::sync::Arc;

use linetap_engine::tracepoint::TracepointArgs;
use linetap_engine::{
    BufferSink, Dispatcher, EngineSettings, ExecutionEvent, ExprEvaluator, Frame, InterceptHook,
    ManualClock, TracepointDto, Value,
};
use smol_str::SmolStr;

pub struct TestEngine {
    pub dispatcher: Dispatcher,
    pub sink: Arc<BufferSink>,
    pub clock: ManualClock,
}

impl TestEngine {
    pub fn hit(&self, frame: &Arc<Frame>) {
        self.dispatcher.on_event(&ExecutionEvent::Line, frame, 1);
    }

    pub fn hit_on(&self, frame: &Arc<Frame>, thread_id: u64) {
        self.dispatcher
            .on_event(&ExecutionEvent::Line, frame, thread_id);
    }
}

pub fn engine() -> TestEngine {
    engine_with(EngineSettings::default())
}

pub fn engine_with(settings: EngineSettings) -> TestEngine {
    let sink = Arc::new(BufferSink::new());
    let clock = ManualClock::new();
    let dispatcher = Dispatcher::with_parts(
        Arc::new(ExprEvaluator),
        sink.clone(),
        Arc::new(clock.clone()),
        settings,
    );
    TestEngine {
        dispatcher,
        sink,
        clock,
    }
}

pub fn dto(id: &str, file: &str, line: u32, kind: &str) -> TracepointDto {
    TracepointDto {
        id: SmolStr::new(id),
        file: SmolStr::new(file),
        line,
        kind: SmolStr::new(kind),
        condition: None,
        fire_count_limit: None,
        args: TracepointArgs::default(),
    }
}

pub fn line_frame(id: &str, file: &str, line: u32) -> TracepointDto {
    dto(id, file, line, "LINE_FRAME")
}

pub fn frame(file: &str, function: &str, line: u32) -> Arc<Frame> {
    Arc::new(Frame::new(file, function, line))
}

pub fn frame_with_x(file: &str, function: &str, line: u32, x: i64) -> Arc<Frame> {
    Arc::new(Frame::new(file, function, line).local("x", Value::Int(x)))
}
