/// Story Runner: interactive shell for stepping through story files.
///
/// Usage: story_runner --story <path> [--config <path>] [--seed <n>]
///
/// Commands:
///   run <node>               execute a node from its first order
///   continue <node> [index]  resume a node
///   stop <node>              stop a node
///   tick [ms]                advance waiting nodes (default 16 ms)
///   status                   list nodes and their status
///   vars                     list variables
///   reset                    reset variables to their first-read values
///   diag                     print and clear diagnostics
///   help                     list commands
///   quit                     exit
///
/// Log output is controlled with `RUST_LOG` (default `info`).

use narrative_flow::core::engine::FlowEngine;
use narrative_flow::core::node::Directive;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut story_path = None;
    let mut config_path = None;
    let mut seed = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--story" if i + 1 < args.len() => {
                i += 1;
                story_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse::<u64>().ok();
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(story_path) = story_path else {
        eprintln!("ERROR: --story is required");
        print_usage();
        std::process::exit(1);
    };

    let mut builder = FlowEngine::builder();
    builder = if Path::new(&story_path).is_dir() {
        builder.stories_dir(&story_path)
    } else {
        builder.story_path(&story_path)
    };
    if let Some(ref path) = config_path {
        builder = builder.config_path(path);
    }
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }

    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} nodes", engine.node_names().len());
    println!("Seed: {}", engine.config().seed);
    print_diagnostics(&mut engine);
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("story> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" => print_help(),
            "run" if parts.len() >= 2 => {
                if let Err(e) = engine.execute(parts[1]) {
                    println!("Error: {}", e);
                }
            }
            "continue" if parts.len() >= 2 => {
                let index = parts.get(2).and_then(|s| s.parse::<usize>().ok());
                if let Err(e) = engine.continue_at(parts[1], index) {
                    println!("Error: {}", e);
                }
            }
            "stop" if parts.len() >= 2 => {
                if let Err(e) = engine.stop(parts[1]) {
                    println!("Error: {}", e);
                }
            }
            "tick" => {
                let ms = parts.get(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(16);
                engine.tick(Duration::from_millis(ms));
            }
            "status" => {
                for name in engine.node_names() {
                    if let Some(node) = engine.node(name) {
                        println!("  {:<20} {:?}", name, node.status());
                    }
                }
            }
            "vars" => {
                for variable in engine.variables().locals() {
                    println!(
                        "  {:<20} {:<8} {}",
                        variable.key(),
                        variable.scope().to_string(),
                        variable.peek()
                    );
                }
                for key in engine.globals().keys() {
                    if let Some(variable) = engine.globals().get(&key) {
                        println!("  {:<20} {:<8} {}", key, "global", variable.peek());
                    }
                }
            }
            "reset" => {
                engine.reset_variables();
                println!("Variables reset.");
            }
            "diag" => {}
            _ => {
                println!("Unknown command '{}'. Type 'help' for commands.", line);
                continue;
            }
        }

        print_output(&mut engine);
        print_diagnostics(&mut engine);
    }
}

fn print_usage() {
    println!("Usage: story_runner --story <path> [--config <path>] [--seed <n>]");
    println!();
    println!("  --story <path>   story file or directory of .ron story files");
    println!("  --config <path>  engine configuration (.ron)");
    println!("  --seed <n>       dice seed (overrides the configuration)");
}

fn print_help() {
    println!("Commands:");
    println!("  run <node>               execute a node from its first order");
    println!("  continue <node> [index]  resume a node");
    println!("  stop <node>              stop a node");
    println!("  tick [ms]                advance waiting nodes (default 16 ms)");
    println!("  status                   list nodes and their status");
    println!("  vars                     list variables");
    println!("  reset                    reset variables");
    println!("  diag                     print diagnostics");
    println!("  quit                     exit");
}

fn print_output(engine: &mut FlowEngine) {
    for directive in engine.take_output() {
        match directive {
            Directive::Say {
                speaker: Some(speaker),
                text,
                ..
            } => println!("{}: {}", speaker, text),
            Directive::Say { text, .. } => println!("{}", text),
            Directive::NodeCompleted(name) => println!("  [{} complete]", name),
        }
    }
}

fn print_diagnostics(engine: &mut FlowEngine) {
    for diagnostic in engine.take_diagnostics() {
        println!("  ! {}", diagnostic);
    }
}
