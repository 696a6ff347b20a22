use std::sync::Arc;
use std::thread;

use anyhow::{Result, anyhow, bail};
use lkr_dispatch::class::ClassId;
use lkr_dispatch::dispatch::{CallSiteStats, DispatchConfiguration, SpecializationKind};
use lkr_dispatch::{ClassRegistry, DispatchOptions, DispatchRuntime, Value};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SimulateReport {
    pub classes: usize,
    pub calls: usize,
    pub threads: usize,
    pub cache_limit: usize,
    pub stats: CallSiteStats,
    pub chain: Vec<SpecializationKind>,
}

#[derive(Debug, Serialize)]
pub struct RedefineReport {
    pub before: i64,
    pub after: i64,
    pub stats: CallSiteStats,
}

fn define_value_class(registry: &ClassRegistry, index: usize) -> Result<ClassId> {
    let class = registry.define_class(&format!("Sim{index}"), registry.core().object)?;
    let value = index as i64;
    registry.define_method(class, "value", move |_, _, _| Ok(Value::Int(value)))?;
    Ok(class)
}

/// Call `value` `calls` times, round-robin over `classes` receivers, split across
/// `threads`. Every result is checked against the receiver's class.
pub fn simulate(options: DispatchOptions, classes: usize, calls: usize, threads: usize) -> Result<SimulateReport> {
    if classes == 0 {
        bail!("--classes must be at least 1");
    }
    if threads == 0 {
        bail!("--threads must be at least 1");
    }

    let registry = Arc::new(ClassRegistry::new());
    let cache_limit = options.cache_limit;
    let runtime = DispatchRuntime::builder(registry.clone()).options(options).build();
    let receivers = (0..classes)
        .map(|i| define_value_class(&registry, i).and_then(|class| registry.instantiate(class)))
        .collect::<Result<Vec<_>>>()?;
    let site = runtime.call_site("value", DispatchConfiguration::Public);

    thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                let (site, receivers) = (&site, &receivers);
                scope.spawn(move || -> Result<()> {
                    for call in (worker..calls).step_by(threads) {
                        let slot = call % receivers.len();
                        let result = site.call(&receivers[slot], &[], None)?;
                        if result != Value::Int(slot as i64) {
                            bail!("call {call}: expected {slot}, got {}", result.inspect());
                        }
                    }
                    Ok(())
                })
            })
            .collect();
        workers.into_iter().try_for_each(|worker| {
            worker
                .join()
                .map_err(|_| anyhow!("simulation thread panicked"))?
        })
    })?;

    tracing::info!(target: "lkr::dispatch", classes, calls, threads, "simulation finished");
    Ok(SimulateReport {
        classes,
        calls,
        threads,
        cache_limit,
        stats: site.stats(),
        chain: site.chain_kinds(),
    })
}

/// Warm a monomorphic site, redefine the method, and check the very next call.
pub fn redefine(options: DispatchOptions, calls: usize) -> Result<RedefineReport> {
    let registry = Arc::new(ClassRegistry::new());
    let runtime = DispatchRuntime::builder(registry.clone()).options(options).build();
    let class = registry.define_class("Versioned", registry.core().object)?;
    registry.define_method(class, "value", |_, _, _| Ok(Value::Int(1)))?;
    let receiver = registry.instantiate(class)?;
    let site = runtime.call_site("value", DispatchConfiguration::Public);

    let mut before = Value::Nil;
    for _ in 0..calls.max(1) {
        before = site.call(&receiver, &[], None)?;
    }
    registry.define_method(class, "value", |_, _, _| Ok(Value::Int(2)))?;
    let after = site.call(&receiver, &[], None)?;

    let (Value::Int(before), Value::Int(after)) = (&before, &after) else {
        bail!("unexpected results {} / {}", before.inspect(), after.inspect());
    };
    if *before != 1 {
        bail!("warm-up dispatched to the wrong body: got {before}");
    }
    if *after != 2 {
        bail!("stale dispatch after redefinition: got {after}");
    }
    Ok(RedefineReport {
        before: *before,
        after: *after,
        stats: site.stats(),
    })
}
