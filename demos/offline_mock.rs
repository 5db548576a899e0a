//! Example: a two-phase entity analysis against MockBackend, no server needed.
//!
//! Run with: `cargo run --example offline_mock`

use llm_extract::{Event, ExecCtx, ExtractConfig, FnEventHandler, MockBackend, Pipeline, Record};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Replies are played in order: type discovery, then extraction.
    let discovery = "<think>文本讲的是人物和地点。</think>\n\
                     ENTITIES: 人物, 地点, 机构\n\
                     RELATIONS: 位于, 就读于";
    let extraction = "ENTITY\t人物\t张三\n\
                      ENTITY\t机构\t北京大学\n\
                      ENTITY\t地点\t北京\n\
                      RELATION\t就读于\t张三\t北京大学\n\
                      RELATION\t位于\t北京大学\t北京";
    let mock = MockBackend::new(vec![discovery.to_string(), extraction.to_string()]);

    let config = ExtractConfig::default()
        .with_model("mock-model")
        .with_output_format(llm_extract::OutputFormat::Tsv);

    let ctx = ExecCtx::builder(config)
        .backend(Arc::new(mock))
        .event_handler(Arc::new(FnEventHandler(|event: Event| match event {
            Event::Progress { message, fraction } => {
                println!("[{:>3.0}%] {}", fraction * 100.0, message)
            }
            Event::Log { message, severity } => println!("[{:?}] {}", severity, message),
            _ => {}
        })))
        .build()?;

    let outcome = Pipeline::new(ctx)
        .analyze_entities("张三在北京大学读书，北京大学位于北京。")
        .await;

    println!("\nstate: {:?}", outcome.state);
    println!("entity types: {:?}", outcome.vocabulary.entity_types());
    if let Some(extraction) = &outcome.extraction {
        for record in extraction.result.iter() {
            match record {
                Record::Entity { text, entity_type } => println!("  {} ({})", text, entity_type),
                Record::Relation { relation_type, subject, object } => {
                    println!("  {} -[{}]-> {}", subject, relation_type, object)
                }
                _ => {}
            }
        }
    }
    let stats = outcome.stats();
    println!("tokens: {} (estimated: {})", stats.total_tokens, stats.usage_estimated);

    Ok(())
}
