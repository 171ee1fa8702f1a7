//! Benchmarks for plan execution.

use criterion::{criterion_group, criterion_main, Criterion};
use planflow::prelude::*;
use std::sync::Arc;

fn linear_plan(len: usize) -> Plan {
    let mut builder = Plan::builder("bench", "Bench");
    for i in 0..len {
        let mut node = PlanNode::new(format!("n{i}"), format!("n{i}"), FacilitatorType::Sync);
        if i + 1 < len {
            node = node.with_next(format!("n{}", i + 1));
        }
        builder = builder.node(node);
    }
    builder.build().expect("valid plan")
}

struct NoOpStep;

#[async_trait::async_trait]
impl StepExecutor for NoOpStep {
    async fn execute(&self, _input: StepInput) -> Result<StepOutcome, OrchestrationError> {
        Ok(StepOutcome::succeeded(None))
    }
}

fn engine_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");

    c.bench_function("linear_plan_10_nodes", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut facilitators = FacilitatorRegistry::new();
                facilitators
                    .register(Arc::new(SyncFacilitator::new(Arc::new(NoOpStep))))
                    .expect("register");
                let ctx = EngineContext::builder(Arc::new(InMemoryExecutionStore::new()))
                    .with_facilitators(facilitators)
                    .build();
                let engine = OrchestrationEngine::new(ctx);
                let exec = engine.start_execution(linear_plan(10), None).await.expect("start");
                engine.await_completion(exec.id).await.expect("completion")
            })
        })
    });
}

criterion_group!(benches, engine_benchmark);
criterion_main!(benches);
