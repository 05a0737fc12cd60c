mod init;
pub use init::{cmd_init, create_tasks_file};

use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::model::config::Config;
use crate::model::task::{Priority, TaskRecord};
use crate::ops::search::{search_sections, Matcher};
use crate::ops::session::Session;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// How long `watch` blocks between checks for signals
const WATCH_POLL: Duration = Duration::from_secs(1);

/// Global flags shared by every command that opens a vault
struct Context {
    vault: Option<String>,
    profile: Option<String>,
    json: bool,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let Cli {
        command,
        json,
        vault,
        profile,
    } = cli;
    let ctx = Context {
        vault,
        profile,
        json,
    };

    match command {
        Commands::Init => cmd_init(),
        Commands::List(args) => cmd_list(&ctx, args),
        Commands::Toggle(args) => cmd_toggle(&ctx, args),
        Commands::Edit(args) => cmd_edit(&ctx, args),
        Commands::Delete(args) => cmd_delete(&ctx, args),
        Commands::Add(args) => cmd_add(&ctx, args),
        Commands::Priority(args) => cmd_priority(&ctx, args),
        Commands::Search(args) => cmd_search(&ctx, args),
        Commands::Watch(args) => cmd_watch(&ctx, args),
        Commands::Open(args) => cmd_open(&ctx, args),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    match config_io::config_path() {
        Some(path) => Ok(config_io::load_config(&path)?),
        None => Ok(Config::default()),
    }
}

fn open_session(ctx: &Context, query: Option<&str>) -> Result<Session, Box<dyn std::error::Error>> {
    let config = load_config()?;
    let profile = config_io::resolve_settings(
        &config,
        ctx.vault.as_deref(),
        ctx.profile.as_deref(),
        query,
    )?;
    Ok(Session::open(&profile)?)
}

/// Split `FILE:LINE` at the last colon.
pub fn parse_location(location: &str) -> Result<(PathBuf, usize), String> {
    let (file, line) = location
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:LINE, got '{}'", location))?;
    let line: usize = line
        .parse()
        .map_err(|_| format!("invalid line number in '{}'", location))?;
    if file.is_empty() || line == 0 {
        return Err(format!("expected FILE:LINE, got '{}'", location));
    }
    Ok((PathBuf::from(file), line))
}

/// Find the file a location names: absolute, inside the vault, or relative
/// to the current directory.
fn locate_file(session: &Session, file: &Path) -> PathBuf {
    if file.is_absolute() {
        return file.to_path_buf();
    }
    let in_vault = session.vault().join(file);
    if in_vault.exists() {
        return in_vault;
    }
    std::fs::canonicalize(file).unwrap_or(in_vault)
}

fn locate(session: &Session, location: &str) -> Result<TaskRecord, Box<dyn std::error::Error>> {
    let (file, line) = parse_location(location)?;
    let path = locate_file(session, &file);
    Ok(session.task_at(&path, line)?)
}

/// Print one change per affected task, as text or a JSON array.
fn report(ctx: &Context, vault: &Path, changes: &[(&'static str, TaskRecord, Option<TaskRecord>)]) -> CmdResult {
    if ctx.json {
        let out: Vec<ChangeJson> = changes
            .iter()
            .map(|(action, before, after)| {
                change_to_json(vault, action, &before.path, before.line, after.as_ref())
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (action, before, after) in changes {
            let shown = after.as_ref().unwrap_or(before);
            println!("{}: {}", action, format_task_line(vault, shown));
        }
    }
    Ok(())
}

fn print_sections(ctx: &Context, session: &Session) -> CmdResult {
    if ctx.json {
        let out = sections_to_json(session.vault(), session.sections());
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render_sections(session.vault(), session.sections()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(ctx: &Context, args: ListArgs) -> CmdResult {
    let session = open_session(ctx, args.query.as_deref())?;
    print_sections(ctx, &session)
}

fn cmd_search(ctx: &Context, args: SearchArgs) -> CmdResult {
    let session = open_session(ctx, args.query.as_deref())?;
    let matcher = Matcher::new(&args.pattern);
    let hits = search_sections(session.sections(), &matcher);
    if ctx.json {
        let out: Vec<SearchHitJson> = hits
            .iter()
            .map(|h| hit_to_json(session.vault(), h))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render_hits(session.vault(), &hits));
    }
    Ok(())
}

fn cmd_watch(ctx: &Context, args: ListArgs) -> CmdResult {
    let mut session = open_session(ctx, args.query.as_deref())?;
    if !session.start_watching() {
        return Err("file watching is unavailable on this system".into());
    }
    print_sections(ctx, &session)?;

    loop {
        let Some(signal) = session.next_signal(WATCH_POLL) else {
            continue;
        };
        match session.handle_signal(&signal) {
            Ok(true) => print_sections(ctx, &session)?,
            Ok(false) => {}
            Err(e) => eprintln!("error: {}", e),
        }
    }
}

fn cmd_open(ctx: &Context, args: LocationArgs) -> CmdResult {
    let mut session = open_session(ctx, None)?;
    let record = locate(&session, &args.location)?;
    let editor = session.editor_command(&record);
    let result = match editor.to_command().status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(std::io::Error::other(format!(
            "{} exited with {}",
            editor.program, status
        ))),
        Err(e) => Err(e),
    };
    session.editor_finished(result)?;
    if let Ok(current) = session.task_at(&record.path, record.line) {
        report(ctx, session.vault(), &[("opened", record, Some(current))])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_toggle(ctx: &Context, args: LocationsArgs) -> CmdResult {
    let mut session = open_session(ctx, None)?;
    let mut changes = Vec::new();
    for location in &args.locations {
        let record = locate(&session, location)?;
        let updated = session.toggle(&record)?;
        changes.push(("toggled", record, Some(updated)));
    }
    report(ctx, session.vault(), &changes)
}

fn cmd_edit(ctx: &Context, args: TextArgs) -> CmdResult {
    let mut session = open_session(ctx, None)?;
    let record = locate(&session, &args.location)?;
    let updated = session.edit(&record, &args.text)?;
    report(ctx, session.vault(), &[("edited", record, Some(updated))])
}

fn cmd_delete(ctx: &Context, args: LocationsArgs) -> CmdResult {
    let mut session = open_session(ctx, None)?;
    let mut records = Vec::new();
    for location in &args.locations {
        records.push(locate(&session, location)?);
    }
    // Bottom-up within each file so earlier line numbers stay valid
    records.sort_by_key(|r| (r.path.clone(), Reverse(r.line)));
    records.dedup_by(|a, b| a.is_at(&b.path, b.line));

    let mut changes = Vec::new();
    for record in records {
        session.delete(&record)?;
        changes.push(("deleted", record, None));
    }
    report(ctx, session.vault(), &changes)
}

fn cmd_add(ctx: &Context, args: TextArgs) -> CmdResult {
    let mut session = open_session(ctx, None)?;
    let record = locate(&session, &args.location)?;
    let added = session.add(&record, &args.text)?;
    report(ctx, session.vault(), &[("added", added.clone(), Some(added))])
}

fn cmd_priority(ctx: &Context, args: PriorityArgs) -> CmdResult {
    let mut session = open_session(ctx, None)?;
    let record = locate(&session, &args.location)?;
    let updated = match args.level.to_ascii_lowercase().as_str() {
        "up" => session.cycle_priority_up(&record)?,
        "down" => session.cycle_priority_down(&record)?,
        level => {
            let priority = Priority::parse_name(level).ok_or_else(|| {
                format!(
                    "unknown priority '{}' (use highest, high, medium, normal, low, lowest, up or down)",
                    args.level
                )
            })?;
            session.set_priority(&record, priority)?
        }
    };
    report(ctx, session.vault(), &[("priority", record, Some(updated))])
}
