//! Example: two-phase named entity analysis against a live server.
//!
//! Run with: `cargo run --example ner_two_phase -- <config.json> <file>`
//!
//! The config file uses the same camelCase keys as `ExtractConfig`, e.g.
//!
//! ```json
//! { "baseUrl": "http://localhost:1234/v1", "model": "qwen3-8b", "outputFormat": "tsv" }
//! ```

use llm_extract::{
    Event, ExecCtx, ExtractConfig, FnEventHandler, NerState, Pipeline, Record, Severity,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, text_path] = args.as_slice() else {
        return Err("usage: ner_two_phase <config.json> <file>".into());
    };
    let config = ExtractConfig::from_json(&std::fs::read_to_string(config_path)?)?;
    let text = std::fs::read_to_string(text_path)?;
    println!("config: {:?}", config);

    let ctx = ExecCtx::builder(config)
        .event_handler(Arc::new(FnEventHandler(|event: Event| match event {
            Event::Log { message, severity } => {
                let tag = match severity {
                    Severity::Info => "INFO",
                    Severity::Success => " OK ",
                    Severity::Warn => "WARN",
                    Severity::Error => "FAIL",
                };
                println!("[{}] {}", tag, message);
            }
            Event::PhaseComplete { phase, .. } => println!("--- {} complete ---", phase.label()),
            Event::Stats(stats) => println!(
                "    {}/{} segments, {} tokens",
                stats.segments_processed, stats.segments_total, stats.total_tokens
            ),
            _ => {}
        })))
        .build()?;
    let pipeline = Pipeline::new(ctx);

    let handle = pipeline.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = pipeline.analyze_entities(&text).await;
    match outcome.state {
        NerState::NoTypesDiscovered => println!("no entity types found in the document"),
        NerState::Failed => {
            let error = outcome
                .extraction
                .as_ref()
                .and_then(|run| run.error.as_ref())
                .or(outcome.discovery.error.as_ref());
            println!("analysis failed: {:?}", error);
        }
        NerState::Completed | NerState::Canceled => {
            let records = outcome.extraction.iter().flat_map(|run| run.result.iter());
            let (mut entities, mut relations) = (0, 0);
            for record in records {
                match record {
                    Record::Entity { text, entity_type } => {
                        entities += 1;
                        println!("{}\t{}", entity_type, text);
                    }
                    Record::Relation { relation_type, subject, object } => {
                        relations += 1;
                        println!("{}\t{}\t{}", subject, relation_type, object);
                    }
                    _ => {}
                }
            }
            println!("{:?}: {} entities, {} relations", outcome.state, entities, relations);
        }
    }
    println!("total tokens: {}", outcome.stats().total_tokens);
    Ok(())
}
