/// Program Linter: checks story files for structural and reference
/// problems without running them.
///
/// Usage: program_linter <story_file_or_dir> [--strict]

use narrative_flow::core::program::{Program, StructuralIssue};
use narrative_flow::core::template::{TemplateSegment, TextTemplate};
use narrative_flow::schema::operator::ComparisonOperator;
use narrative_flow::schema::order::{Instruction, Scope};
use narrative_flow::schema::value::ValueKind;
use narrative_flow::schema::story::Story;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: program_linter <story_file_or_dir> [--strict]");
        println!("  --strict   treat warnings as errors");
        process::exit(0);
    }

    let story_path = Path::new(&args[1]);
    let strict = args[2..].iter().any(|a| a == "--strict");

    let mut story = Story::default();
    if story_path.is_file() {
        match Story::load_from_ron(story_path) {
            Ok(loaded) => story.merge(loaded),
            Err(e) => {
                eprintln!("ERROR: Failed to load story file: {}", e);
                process::exit(1);
            }
        }
    } else if story_path.is_dir() {
        load_stories_recursive(story_path, &mut story);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", story_path.display());
        process::exit(1);
    }

    println!(
        "Loaded {} nodes, {} variables",
        story.nodes.len(),
        story.variables.len()
    );

    let (errors, warnings) = lint_story(&story);

    println!("\n=== Program Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() && !(strict && !warnings.is_empty()) {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_stories_recursive(dir: &Path, story: &mut Story) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            load_stories_recursive(&path, story);
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            match Story::load_from_ron(&path) {
                Ok(loaded) => {
                    println!("  Loaded: {}", path.display());
                    story.merge(loaded);
                }
                Err(e) => {
                    eprintln!("  ERROR loading {}: {}", path.display(), e);
                }
            }
        }
    }
}

fn lint_story(story: &Story) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let node_names: FxHashSet<&str> = story.nodes.iter().map(|n| n.name.as_str()).collect();
    let declared: FxHashSet<&str> = story.variables.iter().map(|v| v.key.as_str()).collect();
    let mut referenced: FxHashSet<String> = FxHashSet::default();

    for node in &story.nodes {
        let program = Program::from(node.orders.clone());

        // Check 1: block structure
        for issue in program.validate() {
            let message = format!("{}: {}", node.name, issue);
            match issue {
                StructuralIssue::IndentJump { .. } | StructuralIssue::DuplicateLabel { .. } => {
                    warnings.push(message)
                }
                _ => errors.push(message),
            }
        }

        for order in program.iter().filter(|o| o.enabled) {
            let at = format!("{}#{}", node.name, order.index());

            // Check 2: conditions name their variables
            if let Some(block) = order.instruction.condition() {
                if !block.has_operands() {
                    errors.push(format!("{}: condition has no variable", at));
                }
                if block.conditions.is_empty() {
                    warnings.push(format!("{}: empty condition list is always false", at));
                }
                for condition in &block.conditions {
                    let operand = &condition.operand;
                    if condition.op == ComparisonOperator::Completed
                        && operand.literal.kind() != ValueKind::Node
                    {
                        errors.push(format!("{}: 'completed' needs a node variable", at));
                    }
                    for reference in operand.variable.iter().chain(operand.source.iter()) {
                        referenced.insert(reference.key.clone());
                        if reference.scope != Scope::Global && !declared.contains(reference.key.as_str()) {
                            errors.push(format!("{}: undeclared variable '{}'", at, reference.key));
                        }
                    }
                }
            }

            match &order.instruction {
                // Check 3: call targets exist
                Instruction::Call { node: target, .. } if !node_names.contains(target.as_str()) => {
                    errors.push(format!("{}: call to unknown node '{}'", at, target));
                }
                // Check 4: text templates parse and refer to known variables
                Instruction::Say { text, .. } => match TextTemplate::parse(text) {
                    Ok(template) => {
                        for segment in &template.segments {
                            if let TemplateSegment::Variable(key) = segment {
                                referenced.insert(key.clone());
                                if !declared.contains(key.as_str()) {
                                    warnings.push(format!(
                                        "{}: text refers to undeclared variable '{}'",
                                        at, key
                                    ));
                                }
                            }
                        }
                    }
                    Err(e) => errors.push(format!("{}: {}", at, e)),
                },
                // Check 5: dice are rollable
                Instruction::RollDice {
                    variable,
                    count,
                    sides,
                } => {
                    referenced.insert(variable.key.clone());
                    if *count == 0 || *sides == 0 {
                        errors.push(format!("{}: cannot roll {}d{}", at, count, sides));
                    }
                }
                Instruction::SetVariable { operand, .. } => {
                    for reference in operand.variable.iter().chain(operand.source.iter()) {
                        referenced.insert(reference.key.clone());
                        if reference.scope != Scope::Global && !declared.contains(reference.key.as_str()) {
                            errors.push(format!("{}: undeclared variable '{}'", at, reference.key));
                        }
                    }
                }
                Instruction::ResetVariable(reference) => {
                    referenced.insert(reference.key.clone());
                }
                _ => {}
            }
        }
    }

    // Check 6: unused declarations
    for decl in &story.variables {
        if !referenced.contains(&decl.key) {
            warnings.push(format!("variable '{}' is never used", decl.key));
        }
    }

    (errors, warnings)
}
