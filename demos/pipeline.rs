//! Stage pipelines: map, filter, batch, tee and merge
//!
//! Run with: cargo run --example pipeline

use std::time::Duration;
use tributary::prelude::*;

/// Example 1: Transform and filter
async fn transform_filter_example(scope: &Scope) {
    println!("=== Transform and Filter ===");

    let pipeline = Pipeline::builder(scope)
        .stage(map(|x: i64| x * 2))
        .stage(filter(|x: &i64| x % 3 == 0))
        .build();

    let output = pipeline.run(from_iter(scope, 1..=20));
    println!("{:?}", collect(output).await);
    println!();
}

/// Example 2: Batching
async fn batch_example(scope: &Scope) {
    println!("=== Batching ===");

    let output = batch(4).apply(scope, from_iter(scope, 1..=10));
    while let Some(group) = output.recv().await {
        println!("Batch: {group:?}");
    }
    println!();
}

/// Example 3: Tee into an audit stream
async fn tee_example(scope: &Scope) {
    println!("=== Tee ===");

    let (audit_tx, audit_rx) = channel(8);
    let audit = tokio::spawn(async move {
        while let Some(item) = audit_rx.recv().await {
            println!("audit saw {item}");
        }
    });

    let pipeline = Pipeline::builder(scope)
        .stage(tee(vec![audit_tx]))
        .stage(map(|x: u32| x * x))
        .build();

    for square in collect(pipeline.run(from_iter(scope, 1..=4))).await {
        println!("square {square}");
    }
    let _ = audit.await;
    println!();
}

/// Example 4: Merging several sources
async fn merge_example(scope: &Scope) {
    println!("=== Merge ===");

    let sources = ["alpha", "beta", "gamma"].map(|name| {
        from_iter(scope, (1..=3).map(move |i| format!("{name}-{i}")))
    });

    let mut merged = collect(merge(scope, sources)).await;
    merged.sort();
    println!("{merged:?}");
    println!();
}

/// Example 5: Closing a pipeline early
async fn close_example(scope: &Scope) {
    println!("=== Close ===");

    let pipeline = Pipeline::builder(scope)
        .stage(map(|x: u64| x + 1))
        .build();
    let output = pipeline.run(from_iter(scope, 0..));

    let mut seen = 0;
    while let Some(item) = output.recv().await {
        seen += 1;
        if item >= 5 {
            pipeline.close();
        }
    }
    println!("stopped after {seen} items (closed: {})", pipeline.is_closed());
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let root = ContextOptions::default()
        .with_timeout(Duration::from_secs(10))
        .scope();

    transform_filter_example(&root).await;
    batch_example(&root).await;
    tee_example(&root).await;
    merge_example(&root).await;
    close_example(&root).await;

    Ok(())
}
