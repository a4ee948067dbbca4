use std::sync::Arc;

use modelwalk::{
    ChannelSink, ChannelSinkConfig, Controller, EngineError, EventPayload, EventSink, Module, Type,
    Value,
};

fn module() -> Module {
    Module::builder()
        .variable("x", Type::number())
        .rule("inc", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            vars.assign("x", Value::from(x + 1))
        })
        .invariant("at_most_two", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            if x > 2 {
                return Err(EngineError::violation(format!("x is {x}")));
            }
            Ok(())
        })
        .build()
        .unwrap()
}

#[test]
fn controller_streams_lifecycle_events() {
    let (sink, stream) = ChannelSink::new(&ChannelSinkConfig::default()).unwrap();
    let sink = Arc::new(sink);
    let mut ctl = Controller::builder(module())
        .sink(Arc::clone(&sink) as Arc<dyn EventSink>)
        .on_error(|_, _| Ok(()))
        .build()
        .unwrap();

    for _ in 0..3 {
        ctl.fire_by_name("inc").unwrap();
    }
    ctl.restore(1).unwrap();
    ctl.reset_to_starting_state().unwrap();

    let payloads: Vec<_> = stream.drain().into_iter().map(|ev| ev.payload).collect();
    assert_eq!(
        payloads,
        vec![
            EventPayload::Committed {
                index: 1,
                message: "inc (changed x)".to_string(),
                changes: vec!["x".to_string()],
            },
            EventPayload::Committed {
                index: 2,
                message: "inc (changed x)".to_string(),
                changes: vec!["x".to_string()],
            },
            EventPayload::Committed {
                index: 3,
                message: "inc (changed x)".to_string(),
                changes: vec!["x".to_string()],
            },
            EventPayload::InvariantFailed {
                invariant: "at_most_two".to_string(),
                message: "Failed invariant at_most_two: x is 3".to_string(),
            },
            EventPayload::Restored { index: 1 },
            EventPayload::Reset,
        ]
    );
    assert_eq!(sink.dropped_events(), 0);
}

#[test]
fn dry_runs_and_no_op_firings_emit_nothing() {
    let (sink, stream) = ChannelSink::new(&ChannelSinkConfig::default()).unwrap();
    let module = Module::builder()
        .variable("x", Type::number())
        .rule("read_only", |vars, ctx| {
            vars.read("x", ctx)?;
            Ok(())
        })
        .build()
        .unwrap();
    let mut ctl = Controller::builder(module)
        .sink(Arc::new(sink))
        .build()
        .unwrap();

    ctl.fire_by_name("read_only").unwrap();
    ctl.would_change_state(|vars| vars.assign("x", Value::from(4)))
        .unwrap();
    assert!(stream.try_next().is_none());
}

#[test]
fn full_queue_drops_instead_of_blocking() {
    let (sink, stream) = ChannelSink::new(&ChannelSinkConfig { capacity: 1 }).unwrap();
    let sink = Arc::new(sink);
    let mut ctl = Controller::builder(module())
        .sink(Arc::clone(&sink) as Arc<dyn EventSink>)
        .build()
        .unwrap();

    ctl.fire_by_name("inc").unwrap();
    ctl.fire_by_name("inc").unwrap();
    assert_eq!(sink.dropped_events(), 1);
    assert_eq!(stream.drain().len(), 1);
}

#[test]
fn events_serialize_for_forwarding() {
    let (sink, stream) = ChannelSink::new(&ChannelSinkConfig::default()).unwrap();
    let mut ctl = Controller::builder(module())
        .sink(Arc::new(sink))
        .build()
        .unwrap();
    ctl.fire_by_name("inc").unwrap();

    let event = stream.try_next().unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["payload"]["type"], "committed");
    assert_eq!(json["payload"]["changes"][0], "x");
    assert!(json["timestamp"].is_string());
}
