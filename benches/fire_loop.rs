use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use modelwalk::{Controller, EngineError, Module, NullSink, Type, Value};

/// `width` independent counters, one rule family instance per counter, plus
/// an invariant over every counter.
fn make_controller(width: i64) -> Controller {
    let index = Type::range(0, width - 1).unwrap();
    let module = Module::builder()
        .variable("counters", Type::array(Type::number(), &index).unwrap())
        .constant("width", Type::number(), Value::from(width))
        .rule_for(
            "bump",
            |vars, ctx| {
                let width = vars.read("width", ctx)?.as_number().unwrap_or(0);
                Ok((0..width).map(Value::from).collect())
            },
            |i, vars, ctx| {
                let counters = vars.read_mut("counters", ctx)?;
                if let Value::Array(array) = counters {
                    let slot = array.get_mut(i64::try_from(i).unwrap_or(0))?;
                    *slot = Value::from(slot.as_number().unwrap_or(0) + 1);
                }
                Ok(())
            },
        )
        .invariant("non_negative", |vars, ctx| {
            let counters = vars.read("counters", ctx)?;
            match counters.as_array() {
                Some(array) if array.items().iter().all(|v| v.as_number().unwrap_or(0) >= 0) => Ok(()),
                _ => Err(EngineError::violation("negative counter")),
            }
        })
        .build()
        .unwrap();
    Controller::builder(module)
        .sink(Arc::new(NullSink))
        .build()
        .unwrap()
}

fn bench_fire_committed(c: &mut Criterion) {
    let mut group = c.benchmark_group("fire");
    group.throughput(Throughput::Elements(1));

    for width in [4_i64, 64] {
        group.bench_function(format!("committed_width_{width}"), |b| {
            b.iter_custom(|iters| {
                // Fresh controller per sample so history growth does not leak between samples.
                let mut ctl = make_controller(width);
                let ids = ctl.active_rules();

                let start = Instant::now();
                for n in 0..iters {
                    let id = ids[usize::try_from(n).unwrap_or(0) % ids.len()];
                    ctl.fire(id).unwrap();
                }
                start.elapsed()
            });
        });
    }
    group.finish();
}

fn bench_would_fire(c: &mut Criterion) {
    c.bench_function("fire/would_fire_width_16", |b| {
        b.iter_custom(|iters| {
            let mut ctl = make_controller(16);
            let id = ctl.active_rules()[0];

            let start = Instant::now();
            for _ in 0..iters {
                let _ = ctl.would_fire(id).unwrap();
            }
            start.elapsed()
        });
    });
}

criterion_group!(fire_loop, bench_fire_committed, bench_would_fire);
criterion_main!(fire_loop);
