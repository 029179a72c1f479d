//! A small worker pool fed from a producer task
//!
//! Run with: cargo run --example pool

use std::time::Duration;
use tributary::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let scope = Scope::new();
    let (jobs, input) = channel(1);

    let pool = Pool::new(3, |_scope, job: u32| async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        Ok(format!("processed-{job}"))
    });
    let results = pool.run(&scope, input);

    tokio::spawn(async move {
        for job in 0..8 {
            if jobs.send(job).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = results.recv().await {
        println!("{result}");
    }
    Ok(())
}
