//! REPL – Read-Eval-Print Loop for inspecting the knowledge store.
//!
//! Supported slash-commands:
//!   /help              – show this list
//!   /entities          – list every entity id
//!   /concepts          – list concepts with their instance counts
//!   /instances <name>  – list the instances of a concept
//!   /attrs <id>        – list the attributes of an entity
//!   /maps              – list maps
//!   /map <name>        – list the points, poses and regions of a map
//!   /sql <query>       – run a raw query returning string values
//!   /reset             – delete every entity and attribute
//!   /quit | /exit      – gracefully exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use knowrep_memory::{Concept, EntityId, KnowledgeError, LongTermMemory, Map};
use tracing::{info, warn};

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(ltm: &LongTermMemory, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "knowrep>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        if cmd == "/reset" && !confirm_reset() {
            continue;
        }

        match dispatch(ltm, cmd, &mut stdout) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => eprintln!("{}: {}", "Write error".red(), e),
        }
    }
}

/// Execute one command line, writing its output to `out`.
pub fn dispatch(ltm: &LongTermMemory, line: &str, out: &mut impl Write) -> io::Result<Flow> {
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };

    let result = match (cmd, arg) {
        ("/help", _) => cmd_help(out).map(Ok),
        ("/entities", _) => cmd_entities(ltm, out),
        ("/concepts", _) => cmd_concepts(ltm, out),
        ("/instances", name) if !name.is_empty() => cmd_instances(ltm, name, out),
        ("/attrs", id) if !id.is_empty() => cmd_attrs(ltm, id, out),
        ("/maps", _) => cmd_maps(ltm, out),
        ("/map", name) if !name.is_empty() => cmd_map(ltm, name, out),
        ("/sql", query) if !query.is_empty() => cmd_sql(ltm, query, out).map(Ok),
        ("/reset", _) => cmd_reset(ltm, out),
        ("/quit" | "/exit", _) => {
            writeln!(out, "{}", "Goodbye.".green())?;
            return Ok(Flow::Quit);
        }
        ("/instances" | "/attrs" | "/map" | "/sql", _) => {
            writeln!(
                out,
                "{} {} needs an argument. Type {} for usage.",
                "Missing argument:".red(),
                cmd.yellow(),
                "/help".bold()
            )
            .map(Ok)
        }
        (other, _) => writeln!(
            out,
            "{} '{}'. Type {} for available commands.",
            "Unknown command:".red(),
            other.yellow(),
            "/help".bold()
        )
        .map(Ok),
    };

    if let Err(e) = result? {
        warn!(command = cmd, error = %e, "command failed");
        writeln!(out, "{}: {}", "Error".red(), e)?;
    }
    Ok(Flow::Continue)
}

type CmdResult = io::Result<Result<(), KnowledgeError>>;

/// Run a store operation, keeping store errors apart from write errors.
macro_rules! store {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "knowrep Commands".bold().underline())?;
    writeln!(out, "  {}          – list every entity", "/entities".bold().cyan())?;
    writeln!(out, "  {}          – list concepts", "/concepts".bold().cyan())?;
    writeln!(out, "  {}  – list instances of a concept", "/instances <name>".bold().cyan())?;
    writeln!(out, "  {}         – list attributes of an entity", "/attrs <id>".bold().cyan())?;
    writeln!(out, "  {}              – list maps", "/maps".bold().cyan())?;
    writeln!(out, "  {}        – list points, poses and regions of a map", "/map <name>".bold().cyan())?;
    writeln!(out, "  {}       – raw query (entity_id, attribute_name, attribute_value)", "/sql <query>".bold().cyan())?;
    writeln!(out, "  {}             – delete every entity and attribute", "/reset".bold().cyan())?;
    writeln!(out, "  {}       – exit the CLI", "/quit  /exit".bold().cyan())?;
    writeln!(out)
}

fn cmd_entities(ltm: &LongTermMemory, out: &mut impl Write) -> CmdResult {
    let entities = store!(ltm.get_all_entities());
    writeln!(out, "{} ({})", "Entities".bold().underline(), entities.len())?;
    for e in &entities {
        writeln!(out, "  {}", e.entity_id.to_string().bold())?;
    }
    Ok(Ok(()))
}

fn cmd_concepts(ltm: &LongTermMemory, out: &mut impl Write) -> CmdResult {
    let concepts = store!(ltm.get_all_concepts());
    writeln!(out, "{} ({})", "Concepts".bold().underline(), concepts.len())?;
    for c in &concepts {
        let instances = store!(c.get_instances()).len();
        let name = store!(c.get_name()).unwrap_or_default();
        writeln!(
            out,
            "  {} {} – {} instance(s)",
            c.entity_id.to_string().dimmed(),
            name.bold(),
            instances
        )?;
    }
    Ok(Ok(()))
}

fn cmd_instances(ltm: &LongTermMemory, name: &str, out: &mut impl Write) -> CmdResult {
    let Some(concept) = store!(find_concept(ltm, name)) else {
        writeln!(out, "{} '{}'", "No such concept:".yellow(), name)?;
        return Ok(Ok(()));
    };
    let instances = store!(concept.get_instances());
    writeln!(out, "{} of {} ({})", "Instances".bold().underline(), name.bold(), instances.len())?;
    for i in &instances {
        let label = store!(i.get_name()).unwrap_or_else(|| "<unnamed>".to_string());
        writeln!(out, "  {} {}", i.entity_id.to_string().dimmed(), label)?;
    }
    Ok(Ok(()))
}

fn cmd_attrs(ltm: &LongTermMemory, raw_id: &str, out: &mut impl Write) -> CmdResult {
    let Ok(id) = raw_id.parse::<i64>().map(EntityId) else {
        writeln!(out, "{} '{}' is not an entity id", "Warning:".yellow(), raw_id)?;
        return Ok(Ok(()));
    };
    if !store!(ltm.entity_exists(id)) {
        writeln!(out, "{} {}", "No such entity:".yellow(), id)?;
        return Ok(Ok(()));
    }
    let attrs = store!(ltm.get_attributes(id, None));
    writeln!(out, "{} of {} ({})", "Attributes".bold().underline(), id, attrs.len())?;
    for a in &attrs {
        writeln!(
            out,
            "  {} = {} {}",
            a.attribute_name.bold(),
            a.value,
            format!("({})", a.value.value_type()).dimmed()
        )?;
    }
    Ok(Ok(()))
}

fn cmd_maps(ltm: &LongTermMemory, out: &mut impl Write) -> CmdResult {
    let maps = store!(ltm.get_all_maps());
    writeln!(out, "{} ({})", "Maps".bold().underline(), maps.len())?;
    for m in &maps {
        let name = store!(m.get_name()).unwrap_or_default();
        writeln!(out, "  {} {}", m.entity_id.to_string().dimmed(), name.bold())?;
    }
    Ok(Ok(()))
}

fn cmd_map(ltm: &LongTermMemory, name: &str, out: &mut impl Write) -> CmdResult {
    let Some(map) = store!(find_map(ltm, name)) else {
        writeln!(out, "{} '{}'", "No such map:".yellow(), name)?;
        return Ok(Ok(()));
    };
    writeln!(out, "{} {}", "Map".bold().underline(), name.bold())?;
    for p in store!(map.get_all_points()) {
        let label = store!(p.get_name()).unwrap_or_default();
        let (x, y) = (store!(p.x()), store!(p.y()));
        writeln!(out, "  point {} ({}, {})", label.bold(), x, y)?;
    }
    for p in store!(map.get_all_poses()) {
        let label = store!(p.get_name()).unwrap_or_default();
        let (x, y, theta) = (store!(p.x()), store!(p.y()), store!(p.theta()));
        writeln!(out, "  pose  {} ({}, {}, θ={})", label.bold(), x, y, theta)?;
    }
    for r in store!(map.get_all_regions()) {
        let label = store!(r.get_name()).unwrap_or_default();
        let vertices = store!(r.get_vertices()).len();
        writeln!(out, "  region {} [{} vertices]", label.bold(), vertices)?;
    }
    Ok(Ok(()))
}

fn cmd_sql(ltm: &LongTermMemory, query: &str, out: &mut impl Write) -> io::Result<()> {
    let mut rows = Vec::new();
    match ltm.select_query_string(query, &mut rows) {
        Ok(()) => {
            for r in &rows {
                writeln!(out, "  {} {} = {}", r.entity_id, r.attribute_name.bold(), r.value)?;
            }
            writeln!(out, "{}", format!("{} row(s)", rows.len()).dimmed())
        }
        Err(e) => writeln!(out, "{}: {}", "Query failed".red(), e),
    }
}

fn cmd_reset(ltm: &LongTermMemory, out: &mut impl Write) -> CmdResult {
    let entities = store!(ltm.delete_all_entities());
    store!(ltm.delete_all_attributes());
    info!(entities, "knowledge store reset from the REPL");
    writeln!(out, "{} {} entities deleted", "✓".green().bold(), entities)?;
    Ok(Ok(()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Lookup without the get-or-create side effect of `get_map`.
fn find_map<'a>(ltm: &'a LongTermMemory, name: &str) -> Result<Option<Map<'a>>, KnowledgeError> {
    for map in ltm.get_all_maps()? {
        if map.get_name()?.as_deref() == Some(name) {
            return Ok(Some(map));
        }
    }
    Ok(None)
}

/// Lookup without the get-or-create side effect of `get_concept`.
fn find_concept<'a>(ltm: &'a LongTermMemory, name: &str) -> Result<Option<Concept<'a>>, KnowledgeError> {
    for concept in ltm.get_all_concepts()? {
        if concept.get_name()?.as_deref() == Some(name) {
            return Ok(Some(concept));
        }
    }
    Ok(None)
}

fn confirm_reset() -> bool {
    let answer = prompt_str(
        &format!("  {} Type 'yes' to continue: ", "This deletes all knowledge.".yellow().bold()),
        "no",
    );
    answer.eq_ignore_ascii_case("yes")
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
pub fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
