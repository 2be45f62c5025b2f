//! Lexes a file with the calc language, optionally applies edits, and prints
//! the token hierarchy and the events each edit produced.
//!
//! Usage: tokdump [-v] FILE [OFFSET:REMOVE:TEXT]...

use std::sync;

use itertools::Itertools;

use lexhier::config;
use lexhier::lang::calc;
use lexhier::lang::calc::CalcKind;
use lexhier::model::hierarchy::TokenHierarchyEvent;
use lexhier::model::text::Edit;
use lexhier::model::token::TokenKind;
use lexhier::TextBuffer;
use lexhier::TokenHierarchy;
use lexhier::TokenSequence;

fn setup_tracing(verbose: bool) {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(if verbose { tracing::Level::TRACE } else { tracing::Level::WARN })
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn parse_edit(arg: &str) -> Result<Edit, String> {
    let mut parts = arg.splitn(3, ':');
    let (Some(offset), Some(length), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected OFFSET:REMOVE:TEXT, got {:?}", arg));
    };

    let offset = offset.parse().map_err(|e| format!("bad offset {:?}: {}", offset, e))?;
    let length = length.parse().map_err(|e| format!("bad length {:?}: {}", length, e))?;

    Ok(Edit::Replace { offset, length, text: text.to_string() })
}

fn dump(sequence: &mut TokenSequence<CalcKind>, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    while sequence.move_next()? {
        let (Some(token), Some(text)) = (sequence.token()?, sequence.token_text()?) else {
            break;
        };

        println!("{:indent$}{:>5} {:<20} {:?}", "", token.offset, token.kind.name(), text, indent = depth * 2);

        if let Some(mut embedded) = sequence.embedded()? {
            dump(&mut embedded, depth + 1)?;
        }
    }

    Ok(())
}

fn describe(event: &TokenHierarchyEvent<CalcKind>) {
    for change in &event.changes {
        println!("  {} at [{}] index {}: -{} +{}{}",
                 if change.path.is_empty() { "root".to_string() } else { format!("embedded {}", change.path.iter().join(".")) },
                 change.start_offset,
                 change.index,
                 change.removed_count(),
                 change.added_count(),
                 if change.full_rebuild { " (full rebuild)" } else { "" });
        println!("    removed: {}", change.removed.iter().map(|t| t.kind.name()).join(" "));
        println!("    added:   {}", change.added.iter().map(|t| t.kind.name()).join(" "));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let verbose = args.first().is_some_and(|arg| arg == "-v");
    if verbose {
        args.remove(0);
    }
    setup_tracing(verbose);

    if let Err(e) = config::load_user_config() {
        tracing::warn!(%e, "ignoring user config");
    }

    let Some(path) = args.first() else {
        eprintln!("usage: tokdump [-v] FILE [OFFSET:REMOVE:TEXT]...");
        std::process::exit(2);
    };

    let source = std::fs::read_to_string(path)?;
    let edits = args[1..].iter().map(|arg| parse_edit(arg)).collect::<Result<Vec<_>, _>>()?;

    let buffer = sync::Arc::new(TextBuffer::new(&source));
    let hierarchy = TokenHierarchy::new(buffer.clone(), calc::language());

    dump(&mut hierarchy.token_sequence()?, 0)?;

    hierarchy.add_listener(|event: &TokenHierarchyEvent<CalcKind>| {
        if let Some(modification) = event.modification() {
            println!("edit at {}: {:?} -> {:?}", modification.offset(), modification.removed_text(), modification.inserted_text());
        }
        describe(event);
    });

    let edited = !edits.is_empty();
    for edit in edits {
        buffer.apply(edit)?;
    }

    if edited {
        println!();
        dump(&mut hierarchy.token_sequence()?, 0)?;
    }

    Ok(())
}
