//! Example: semantic chunking of a text file with live streaming output.
//!
//! Requires an OpenAI-compatible server (LM Studio, llama.cpp, vLLM...).
//!
//! Run with: `cargo run --example semantic_chunking -- <file> [model]`
//!
//! `LLM_BASE_URL` overrides the default `http://localhost:1234/v1`.
//! Press Ctrl-C to cancel; chunks merged so far are still printed.

use llm_extract::{
    ChannelEventHandler, Event, ExecCtx, ExtractConfig, Pipeline, Record, RunState, Task,
};
use std::io::Write;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: semantic_chunking <file> [model]")?;
    let text = std::fs::read_to_string(&path)?;

    let mut config = ExtractConfig::default().with_chunking(5000, 500);
    if let Ok(base_url) = std::env::var("LLM_BASE_URL") {
        config = config.with_base_url(base_url);
    }

    // Pick the requested model, or the first one the server offers.
    let models = Pipeline::new(ExecCtx::builder(config.clone()).build()?)
        .list_models()
        .await?;
    let model = match args.next() {
        Some(model) => model,
        None => models.first().cloned().ok_or("server offers no models")?,
    };
    println!("model: {} (available: {})", model, models.join(", "));

    let (handler, mut events) = ChannelEventHandler::new(1024);
    let pipeline = Pipeline::new(
        ExecCtx::builder(config.with_model(model))
            .event_handler(Arc::new(handler))
            .build()?,
    );

    let run = pipeline.spawn(text, Task::SemanticChunking);
    // The event channel closes once the run task drops the last context.
    drop(pipeline);
    let handle = run.handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::Delta { chunk, .. } => {
                    print!("{}", chunk);
                    let _ = std::io::stdout().flush();
                }
                Event::Progress { message, .. } => println!("\n== {}", message),
                Event::StreamStats(stats) => {
                    tracing::debug!(chars = stats.chars, tps = stats.tokens_per_second, "streaming")
                }
                Event::StateChanged(state) if state.is_terminal() => break,
                _ => {}
            }
        }
    });

    let outcome = run.join.await?;
    let _ = printer.await;

    println!("\n\n{:?}: {} chunk(s)", outcome.state, outcome.result.len());
    for record in outcome.result.iter() {
        if let Record::Chunk { id, title, summary, content } = record {
            println!("#{} {} ({} chars)\n   {}", id, title, content.chars().count(), summary);
        }
    }
    println!(
        "tokens: prompt {} + completion {} = {}",
        outcome.stats.prompt_tokens, outcome.stats.completion_tokens, outcome.stats.total_tokens
    );
    if outcome.state == RunState::Failed {
        if let Some(err) = outcome.error {
            return Err(err.into());
        }
    }
    Ok(())
}
