//! Fan-out, round robin and bounded concurrent maps
//!
//! Run with: cargo run --example mapreduce

use std::time::Duration;
use tributary::prelude::*;

async fn word_length(_scope: Scope, word: String) -> Result<(String, usize)> {
    tokio::time::sleep(Duration::from_millis(5)).await;
    let len = word.chars().count();
    Ok((word, len))
}

#[tokio::main]
async fn main() -> Result<()> {
    let scope = Scope::new();

    println!("=== MapConcurrent ===");
    let squares = map_concurrent(&scope, vec![1, 2, 3, 4, 5, 6], 3, |_scope, v: i64| async move {
        Ok(v * v)
    })
    .await?;
    println!("{squares:?}");
    println!();

    let words: Vec<String> = "the quick brown fox jumps over the lazy dog"
        .split_whitespace()
        .map(String::from)
        .collect();

    println!("=== FanOut ===");
    let lengths = fan_out(&scope, from_iter(&scope, words.clone()), 3, word_length);
    let total: usize = collect(lengths).await.iter().map(|(_, len)| len).sum();
    println!("total letters: {total}");
    println!();

    println!("=== RoundRobin ===");
    let output = round_robin(&scope, from_iter(&scope, words.clone()), 3, word_length);
    while let Some((word, len)) = output.recv().await {
        println!("{word}: {len}");
    }
    println!();

    println!("=== FanOutFanIn ===");
    let output = fan_out_fan_in(&scope, from_iter(&scope, words), 4, word_length);
    let longest = collect(output).await.into_iter().max_by_key(|(_, len)| *len);
    println!("longest: {longest:?}");

    Ok(())
}
