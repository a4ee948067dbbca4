use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use serde_json::json;

use modelwalk::{
    Controller, EngineError, ExecutionSnapshot, Module, NullSink, SerializedState, Type, Value,
    ValueError,
};

fn counter_module() -> Module {
    Module::builder()
        .variable("x", Type::number())
        .rule("inc", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            vars.assign("x", Value::from(x + 1))
        })
        .invariant("below_ten", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            if x >= 10 {
                return Err(EngineError::violation(format!("x is {x}")));
            }
            Ok(())
        })
        .build()
        .unwrap()
}

fn quiet(module: Module) -> Controller {
    Controller::builder(module)
        .sink(Arc::new(NullSink))
        .build()
        .unwrap()
}

#[test]
fn firing_inc_three_times_records_four_snapshots() {
    let mut ctl = quiet(counter_module());
    for _ in 0..3 {
        ctl.fire_by_name("inc").unwrap();
    }

    let states: Vec<_> = ctl.history().iter().map(|s| s.state.to_json()).collect();
    assert_eq!(
        states,
        vec![json!({"x": 0}), json!({"x": 1}), json!({"x": 2}), json!({"x": 3})]
    );
    for (i, snapshot) in ctl.history().iter().enumerate() {
        assert_eq!(snapshot.index, i);
    }
    assert_eq!(ctl.current().state, ctl.serialize_state());
}

#[test]
fn violated_invariant_reaches_error_hook() {
    let failures = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&failures);
    let mut ctl = Controller::builder(counter_module())
        .sink(Arc::new(NullSink))
        .on_error(move |message, violation| {
            seen.borrow_mut()
                .push((message.to_string(), violation.message.clone()));
            Ok(())
        })
        .build()
        .unwrap();

    for _ in 0..10 {
        ctl.fire_by_name("inc").unwrap();
    }
    assert_eq!(ctl.variables().peek("x").unwrap(), &Value::from(10));
    assert!(!ctl.invariants_hold());
    assert_eq!(failures.borrow().len(), 1);

    assert!(!ctl.check_invariants().unwrap());
    let failures = failures.borrow();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[1].0, "Failed invariant below_ten: x is 10");
    assert_eq!(failures[1].1, "x is 10");
}

#[test]
fn default_error_hook_is_fatal_but_keeps_the_transition() {
    let mut ctl = quiet(counter_module());
    ctl.try_change_state(|vars| {
        vars.assign("x", Value::from(9))?;
        Ok(Some("jump".to_string()))
    })
    .unwrap();

    let err = ctl.fire_by_name("inc").unwrap_err();
    assert!(err.is_violation());
    assert_eq!(err.to_string(), "Failed invariant below_ten: x is 10");
    assert_eq!(ctl.history().len(), 3);
    assert_eq!(ctl.current().state.to_json(), json!({"x": 10}));
}

#[test]
fn restore_rewinds_and_rechecks() {
    let mut ctl = quiet(counter_module());
    for _ in 0..3 {
        ctl.fire_by_name("inc").unwrap();
    }
    let target = ctl.history()[1].clone();

    assert!(ctl.restore(target.index).unwrap());
    assert_eq!(ctl.history().len(), target.index + 1);
    assert_eq!(ctl.serialize_state(), target.state);
    assert!(ctl.invariants_hold());

    ctl.fire_by_name("inc").unwrap();
    assert_eq!(ctl.history().len(), 3);
    assert_eq!(ctl.current().state.to_json(), json!({"x": 2}));
}

#[test]
fn restore_rechecks_a_violating_snapshot() {
    let mut ctl = Controller::builder(counter_module())
        .sink(Arc::new(NullSink))
        .on_error(|_, _| Ok(()))
        .build()
        .unwrap();
    ctl.try_change_state(|vars| {
        vars.assign("x", Value::from(12))?;
        Ok(None)
    })
    .unwrap();
    ctl.try_change_state(|vars| {
        vars.assign("x", Value::from(1))?;
        Ok(None)
    })
    .unwrap();
    assert!(ctl.invariants_hold());
    assert!(!ctl.restore(1).unwrap());
}

#[test]
fn would_change_state_never_alters_observable_state() {
    let mut ctl = quiet(counter_module());
    ctl.fire_by_name("inc").unwrap();
    let before = ctl.serialize_state();
    let history_len = ctl.history().len();

    let changes = ctl
        .would_change_state(|vars| vars.assign("x", Value::from(5)))
        .unwrap();
    assert_eq!(changes.unwrap().to_string(), "x");
    assert_eq!(ctl.serialize_state(), before);
    assert_eq!(ctl.history().len(), history_len);

    let unchanged = ctl
        .would_change_state(|vars| vars.assign("x", Value::from(1)))
        .unwrap();
    assert!(unchanged.is_none());
    assert_eq!(ctl.serialize_state(), before);
}

#[test]
fn no_op_rule_caches_exactly_what_it_read() {
    let module = Module::builder()
        .variable("x", Type::number())
        .variable("y", Type::number())
        .variable("z", Type::number())
        .rule("guarded", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            let y = vars.read("y", ctx)?.as_number().unwrap_or(0);
            if x > 0 && y > 0 {
                vars.assign("z", Value::from(x + y))?;
            }
            Ok(())
        })
        .build()
        .unwrap();
    let mut ctl = quiet(module);
    let id = ctl.rule_id("guarded").unwrap();

    assert!(ctl.fire(id).unwrap().is_empty());
    assert_eq!(ctl.history().len(), 1);
    let rule = ctl.rule(id).unwrap();
    assert!(!rule.is_active());
    let read: Vec<_> = rule.readset().unwrap().iter().cloned().collect();
    assert_eq!(read, vec!["x".to_string(), "y".to_string()]);
    assert!(ctl.active_rules().is_empty());
}

#[test]
fn rule_family_regenerates_when_domain_shrinks() {
    let module = Module::builder()
        .variable("n", Type::range(0, 5).unwrap())
        .variable("hits", Type::number())
        .rule_for(
            "r",
            |vars, ctx| {
                let n = vars.read("n", ctx)?.as_number().unwrap_or(0);
                Ok((0..n).map(Value::from).collect())
            },
            |i, vars, ctx| {
                let hits = vars.read("hits", ctx)?.as_number().unwrap_or(0);
                vars.assign("hits", Value::from(hits + i64::try_from(i).unwrap_or(0)))
            },
        )
        .rule("shrink", |vars, ctx| {
            let n = vars.read("n", ctx)?.as_number().unwrap_or(0);
            vars.assign("n", Value::from((n - 1).max(0)))
        })
        .init(|vars| vars.assign("n", Value::from(3)))
        .build()
        .unwrap();
    let mut ctl = quiet(module);

    let names = |ctl: &Controller| -> Vec<String> {
        ctl.rulesets()[0]
            .rules()
            .iter()
            .map(|rule| rule.name().to_string())
            .collect()
    };
    assert_eq!(names(&ctl), vec!["r(0)", "r(1)", "r(2)"]);

    ctl.fire_by_name("r(2)").unwrap();
    assert_eq!(ctl.variables().peek("hits").unwrap(), &Value::from(2));
    assert_eq!(names(&ctl), vec!["r(0)", "r(1)", "r(2)"]);

    ctl.fire_by_name("shrink").unwrap();
    assert_eq!(names(&ctl), vec!["r(0)", "r(1)"]);
    assert!(ctl.fire_by_name("r(2)").is_err());
}

#[test]
fn rolled_back_dry_run_reactivates_every_cached_rule() {
    let module = Module::builder()
        .variable("x", Type::number())
        .variable("y", Type::number())
        .variable("z", Type::number())
        .rule("guarded", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            let y = vars.read("y", ctx)?.as_number().unwrap_or(0);
            if x > 0 && y > 0 {
                vars.assign("z", Value::from(x + y))?;
            }
            Ok(())
        })
        .rule_for(
            "watch",
            |vars, ctx| {
                vars.read("y", ctx)?;
                Ok(vec![Value::from(0), Value::from(1)])
            },
            |_, vars, ctx| {
                vars.read("x", ctx)?;
                Ok(())
            },
        )
        .build()
        .unwrap();
    let mut ctl = quiet(module);
    for name in ["guarded", "watch(0)", "watch(1)"] {
        assert!(ctl.fire_by_name(name).unwrap().is_empty());
    }
    assert!(ctl.active_rules().is_empty());

    // Nothing reads z, so only the rollback can bring the rules back.
    let changes = ctl
        .would_change_state(|vars| vars.assign("z", Value::from(1)))
        .unwrap();
    assert_eq!(changes.unwrap().to_string(), "z");

    for name in ["guarded", "watch(0)", "watch(1)"] {
        let rule = ctl.rule(ctl.rule_id(name).unwrap()).unwrap();
        assert!(rule.is_active(), "{name} stayed inactive");
        assert!(rule.readset().is_none(), "{name} kept its readset");
    }
    assert_eq!(ctl.active_rules().len(), 3);
    assert_eq!(ctl.serialize_state(), ctl.current().state);
}

#[test]
fn rejected_restore_keeps_live_state_on_the_last_snapshot() {
    let module = Module::builder()
        .variable("x", Type::number())
        .variable("level", Type::range(0, 3).unwrap())
        .rule("inc", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            vars.assign("x", Value::from(x + 1))
        })
        .build()
        .unwrap();
    let mut ctl = quiet(module);
    ctl.fire_by_name("inc").unwrap();
    let before = ctl.serialize_state();

    let partial: SerializedState = serde_json::from_value(json!({"x": 40})).unwrap();
    assert!(ctl.restore_state(&partial).is_err());
    assert_eq!(ctl.serialize_state(), before);
    assert_eq!(ctl.serialize_state(), ctl.current().state);

    let out_of_range: SerializedState =
        serde_json::from_value(json!({"x": 40, "level": 7})).unwrap();
    assert!(ctl.restore_state(&out_of_range).unwrap_err().is_bounds());
    assert_eq!(ctl.serialize_state(), before);
    assert_eq!(ctl.history().len(), 2);
}

#[test]
fn failed_reset_leaves_state_and_history_alone() {
    let refuse = Rc::new(Cell::new(false));
    let flag = Rc::clone(&refuse);
    let resets = Rc::new(Cell::new(0));
    let counted = Rc::clone(&resets);
    let module = Module::builder()
        .variable("x", Type::number())
        .variable("y", Type::number())
        .rule("inc", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            vars.assign("x", Value::from(x + 1))
        })
        .init(move |vars| {
            vars.assign("y", Value::from(1))?;
            if flag.get() {
                return Err(ValueError::internal("init refused").into());
            }
            Ok(())
        })
        .build()
        .unwrap();
    let mut ctl = Controller::builder(module)
        .sink(Arc::new(NullSink))
        .on_reset(move || counted.set(counted.get() + 1))
        .build()
        .unwrap();
    ctl.fire_by_name("inc").unwrap();
    ctl.fire_by_name("inc").unwrap();
    let before = ctl.serialize_state();

    refuse.set(true);
    let err = ctl.reset_to_starting_state().unwrap_err();
    assert_eq!(err, ValueError::internal("init refused").into());
    assert_eq!(ctl.serialize_state(), before);
    assert_eq!(ctl.serialize_state(), ctl.current().state);
    assert_eq!(ctl.history().len(), 3);
    assert_eq!(resets.get(), 0);

    refuse.set(false);
    ctl.reset_to_starting_state().unwrap();
    assert_eq!(ctl.current().state.to_json(), json!({"x": 0, "y": 1}));
    assert_eq!(resets.get(), 1);
}

#[test]
fn reset_restores_init_and_does_not_check_invariants() {
    let resets = Rc::new(RefCell::new(0));
    let failures = Rc::new(RefCell::new(0));
    let (r, f) = (Rc::clone(&resets), Rc::clone(&failures));
    let module = Module::builder()
        .variable("x", Type::number())
        .constant("start", Type::number(), Value::from(20))
        .rule("inc", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            vars.assign("x", Value::from(x + 1))
        })
        .invariant("below_ten", |vars, ctx| {
            let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
            if x >= 10 {
                return Err(EngineError::violation(format!("x is {x}")));
            }
            Ok(())
        })
        .init(|vars| {
            let start = vars.peek("start")?.clone();
            vars.assign("x", start)
        })
        .build()
        .unwrap();

    let mut ctl = Controller::builder(module)
        .sink(Arc::new(NullSink))
        .on_error(move |_, _| {
            *f.borrow_mut() += 1;
            Ok(())
        })
        .on_reset(move || *r.borrow_mut() += 1)
        .build()
        .unwrap();
    assert_eq!(*failures.borrow(), 1);

    ctl.fire_by_name("inc").unwrap();
    assert_eq!(*failures.borrow(), 2);

    ctl.reset_to_starting_state().unwrap();
    assert_eq!(*resets.borrow(), 1);
    assert_eq!(*failures.borrow(), 2);
    assert_eq!(ctl.history().len(), 1);
    assert_eq!(ctl.current().message, "Reset");
    assert_eq!(ctl.current().state.to_json(), json!({"x": 20}));
}

#[test]
fn views_follow_every_history_change() {
    let lengths = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&lengths);
    let mut ctl = Controller::builder(counter_module())
        .sink(Arc::new(NullSink))
        .view(move |history: &[ExecutionSnapshot]| seen.borrow_mut().push(history.len()))
        .build()
        .unwrap();

    ctl.fire_by_name("inc").unwrap();
    ctl.fire_by_name("inc").unwrap();
    ctl.would_change_state(|vars| vars.assign("x", Value::from(7)))
        .unwrap();
    ctl.restore(1).unwrap();
    ctl.reset_to_starting_state().unwrap();

    assert_eq!(*lengths.borrow(), vec![2, 3, 2, 1]);
}

#[test]
fn ordered_set_overflow_propagates_and_rolls_back() {
    let module = Module::builder()
        .variable(
            "queue",
            Type::ordered_set(Type::number(), &Type::range(0, 2).unwrap()).unwrap(),
        )
        .variable("next", Type::number())
        .rule("enqueue", |vars, ctx| {
            let next = vars.read("next", ctx)?.as_number().unwrap_or(0);
            vars.assign("next", Value::from(next + 1))?;
            let queue = vars.read_mut("queue", ctx)?;
            match queue.as_ordered_set_mut() {
                Some(set) => Ok(set.push(Value::from(next))?),
                None => Err(modelwalk::ValueError::internal("queue is not a set").into()),
            }
        })
        .rule("dequeue", |vars, ctx| {
            let queue = vars.read_mut("queue", ctx)?;
            if let Some(set) = queue.as_ordered_set_mut() {
                if !set.is_empty() {
                    set.pop()?;
                }
            }
            Ok(())
        })
        .build()
        .unwrap();
    let mut ctl = quiet(module);

    for _ in 0..3 {
        ctl.fire_by_name("enqueue").unwrap();
    }
    assert_eq!(ctl.current().state.get("queue"), Some(&json!([0, 1, 2])));

    let err = ctl.fire_by_name("enqueue").unwrap_err();
    assert!(err.is_bounds());
    assert_eq!(ctl.serialize_state(), ctl.current().state);
    assert_eq!(ctl.current().state.get("next"), Some(&json!(3)));

    ctl.fire_by_name("dequeue").unwrap();
    assert_eq!(ctl.current().state.get("queue"), Some(&json!([0, 1])));
    assert_eq!(ctl.current().message, "dequeue (changed queue)");
}
