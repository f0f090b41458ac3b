/// Lantern Quest example: a small story driven frame by frame.
///
/// The village node rolls for luck and calls the road node, which lights
/// lanterns one per frame, plays a host sound, and buys its way into the
/// tower if the roll paid off.
///
/// Run with: cargo run --example lantern_quest

use narrative_flow::core::actions::CommandHandler;
use narrative_flow::core::engine::FlowEngine;
use narrative_flow::core::node::{Directive, ExecContext, Step};
use narrative_flow::schema::value::Value;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Host command that "plays" a sound by printing it.
struct PlaySound;

impl CommandHandler for PlaySound {
    fn on_enter(&mut self, args: &[Value], ctx: &mut ExecContext<'_>) -> Step {
        let sound = args
            .first()
            .map(Value::to_string)
            .unwrap_or_else(|| "silence".to_string());
        println!("    ~ [{}] plays '{}'", ctx.node, sound);
        Step::Continue
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut engine = FlowEngine::builder()
        .story_path("stories/lantern_quest.ron")
        .seed(2026)
        .command("play_sound", Box::new(PlaySound))
        .build()
        .expect("Failed to build engine");

    println!("=== Lantern Quest ===\n");

    engine.execute("village").expect("village node exists");
    print_output(&mut engine);

    // --- Drive waiting nodes one frame at a time ---
    let frame = Duration::from_millis(16);
    for tick in 1..=10 {
        if engine.is_complete("road").unwrap_or(true) {
            break;
        }
        println!("  -- frame {} --", tick);
        engine.tick(frame);
        print_output(&mut engine);
    }

    println!("\n=== Final state ===\n");
    for name in engine.node_names() {
        if let Some(node) = engine.node(name) {
            println!("  {:<10} {:?}", name, node.status());
        }
    }
    for variable in engine.variables().locals() {
        println!("  {:<10} = {}", variable.key(), variable.peek());
    }
    if let Some(lamps) = engine.globals().get("lamps_lit") {
        println!("  {:<10} = {} (global)", "lamps_lit", lamps.peek());
    }

    for diagnostic in engine.take_diagnostics() {
        println!("  ! {}", diagnostic);
    }
}

fn print_output(engine: &mut FlowEngine) {
    for directive in engine.take_output() {
        match directive {
            Directive::Say {
                speaker: Some(speaker),
                text,
                ..
            } => println!("  {}: \"{}\"", speaker, text),
            Directive::Say { text, .. } => println!("  {}", text),
            Directive::NodeCompleted(name) => println!("  [{} complete]", name),
        }
    }
}
