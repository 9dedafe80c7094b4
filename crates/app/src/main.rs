use std::fmt;
use std::path::PathBuf;

use orbit_core::model::{GroupId, ItemId};
use services::{AppServices, Clock};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { command: &'static str, name: &'static str },
    UnknownArg(String),
    InvalidNumber { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { command, name } => {
                write!(f, "{command} requires <{name}>")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { raw } => write!(f, "not a valid number: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [args] [--db <sqlite_url>] [--curriculum <path>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                   level, XP and per-group completion (default)");
    eprintln!("  graph                    groups, prerequisites and lock state");
    eprintln!("  complete <item>          mark an item completed, e.g. basics-1");
    eprintln!("  unlock <group>           unlock a group directly");
    eprintln!("  focus <group|none>       set the current group");
    eprintln!("  xp <amount>              award XP");
    eprintln!("  quiz <group> <answers>   grade comma-separated option indices, e.g. 0,2,1");
    eprintln!("  load <group> [section]   print a group's content, or one section of it");
    eprintln!("  export [path]            write the progress document (stdout by default)");
    eprintln!("  import <path>            replace progress with an exported document");
    eprintln!("  reset                    reset progress, keeping settings");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://orbit.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ORBIT_DB_URL, ORBIT_CURRICULUM, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Graph,
    Complete(String),
    Unlock(String),
    Focus(Option<String>),
    Xp(u64),
    Quiz { group: String, answers: Vec<usize> },
    Load { group: String, section: Option<String> },
    Export(Option<PathBuf>),
    Import(PathBuf),
    Reset,
}

struct Args {
    command: Command,
    db_url: String,
    curriculum: Option<PathBuf>,
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url = std::env::var("ORBIT_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://orbit.sqlite3".into(), normalize_sqlite_url);
        let mut curriculum = std::env::var("ORBIT_CURRICULUM").ok().map(PathBuf::from);
        let mut positional = Vec::new();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--curriculum" => {
                    curriculum = Some(PathBuf::from(require_value(&mut args, "--curriculum")?));
                }
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(flag.to_owned())),
                _ => positional.push(arg),
            }
        }

        let command = parse_command(positional)?;
        Ok(Some(Self {
            command,
            db_url,
            curriculum,
        }))
    }
}

fn parse_command(positional: Vec<String>) -> Result<Command, ArgsError> {
    let mut words = positional.into_iter();
    let Some(name) = words.next() else {
        return Ok(Command::Status);
    };
    let mut arg = |command: &'static str, name: &'static str| {
        words
            .next()
            .ok_or(ArgsError::MissingArgument { command, name })
    };

    let command = match name.as_str() {
        "status" => Command::Status,
        "graph" => Command::Graph,
        "complete" => Command::Complete(arg("complete", "item")?),
        "unlock" => Command::Unlock(arg("unlock", "group")?),
        "focus" => {
            let group = arg("focus", "group")?;
            Command::Focus((group != "none").then_some(group))
        }
        "xp" => Command::Xp(parse_number(arg("xp", "amount")?)?),
        "quiz" => {
            let group = arg("quiz", "group")?;
            let answers = arg("quiz", "answers")?
                .split(',')
                .map(|raw| parse_number(raw.trim().to_owned()))
                .collect::<Result<_, _>>()?;
            Command::Quiz { group, answers }
        }
        "load" => Command::Load {
            group: arg("load", "group")?,
            section: words.next(),
        },
        "export" => Command::Export(words.next().map(PathBuf::from)),
        "import" => Command::Import(PathBuf::from(arg("import", "path")?)),
        "reset" => Command::Reset,
        _ => return Err(ArgsError::UnknownArg(name)),
    };

    if let Some(extra) = words.next() {
        return Err(ArgsError::UnknownArg(extra));
    }
    Ok(command)
}

fn parse_number<T: std::str::FromStr>(raw: String) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidNumber { raw })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn print_status(app: &AppServices) {
    let progress = app.progress();
    let user = progress.get_user().await;
    let state = progress.get_progress().await;
    let stats = progress.get_stats().await;

    println!(
        "level {} | {} XP | {:.1}% overall | {} achievements",
        user.level,
        user.total_xp,
        state.overall_progress_percent,
        progress.get_achievements().await.len()
    );
    if let Some(current) = &state.current_group {
        println!("current group: {current}");
    }
    println!(
        "items completed: {} | groups explored: {} | quizzes taken: {}",
        stats.items_completed, stats.groups_explored, stats.quizzes_taken
    );
    for group in progress.all_group_progress().await {
        let marker = match (group.unlocked, group.is_finished()) {
            (false, _) => "x",
            (true, true) => "*",
            (true, false) => " ",
        };
        println!(
            "[{marker}] {:<12} {:>3}/{:<3} {:>5.1}%",
            group.group_id.as_str(),
            group.completed,
            group.total,
            group.percent
        );
    }
}

async fn print_graph(app: &AppServices) {
    let progress = app.progress();
    for group in app.graph().groups() {
        let state = if progress.is_group_unlocked(group.id().as_str()).await {
            "unlocked"
        } else {
            "locked"
        };
        let prerequisites: Vec<&str> = group.prerequisites().iter().map(GroupId::as_str).collect();
        println!(
            "{:<12} {:<8} items={:<3} requires=[{}]",
            group.id().as_str(),
            state,
            group.item_count(),
            prerequisites.join(", ")
        );
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match Args::parse(argv) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    let curriculum = parsed
        .curriculum
        .as_ref()
        .map(std::fs::read_to_string)
        .transpose()?;
    let graph = AppServices::graph_from_json(curriculum.as_deref())?;

    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::new_sqlite(&parsed.db_url, Clock::system(), graph).await?;
    tracing::debug!(db = %parsed.db_url, groups = app.graph().len(), "services ready");
    let progress = app.progress();

    match parsed.command {
        Command::Status => print_status(&app).await,
        Command::Graph => print_graph(&app).await,
        Command::Complete(item) => {
            let item = ItemId::new(item)?;
            if progress.complete_item(item.clone()).await {
                println!("completed {item}");
            } else {
                println!("{item} was already completed");
            }
            print_status(&app).await;
        }
        Command::Unlock(group) => {
            let group = GroupId::new(group)?;
            if progress.unlock_group(&group).await {
                println!("unlocked {group}");
            } else {
                println!("{group} is unknown or already unlocked");
            }
        }
        Command::Focus(group) => {
            let group = group.map(GroupId::new).transpose()?;
            progress.set_current_group(group).await;
        }
        Command::Xp(amount) => {
            progress.add_xp(amount).await;
            print_status(&app).await;
        }
        Command::Quiz { group, answers } => {
            let (outcome, score) = app.take_quiz(&group, &answers).await?;
            println!(
                "{group}: {}/{} correct ({}%), {}",
                outcome.correct,
                outcome.total,
                outcome.percent,
                if outcome.passed { "passed" } else { "not passed" }
            );
            println!(
                "best {}% after {} attempts",
                score.best_percent, score.attempts
            );
        }
        Command::Load {
            group,
            section: Some(section),
        } => {
            let bundle = app.content().load_group(&group).await?;
            let section = bundle
                .section(&section)
                .ok_or_else(|| format!("{group} has no section `{section}`"))?;
            println!("{}", section.title);
            println!("{}", section.body);
        }
        Command::Load {
            group,
            section: None,
        } => {
            let bundle = app.content().load_group(&group).await?;
            println!("{}", bundle.overview.title);
            println!("{}", bundle.overview.summary);
            for section in &bundle.sections {
                println!("  section {}: {}", section.id, section.title);
            }
            for exercise in &bundle.exercises {
                println!("  exercise {}: {}", exercise.id, exercise.prompt);
            }
            println!(
                "  quiz {}: {} questions, pass at {}%",
                bundle.quiz.id,
                bundle.quiz.questions.len(),
                bundle.quiz.passing_percent
            );
        }
        Command::Export(path) => {
            let document = serde_json::to_string_pretty(&progress.export_document().await)?;
            match path {
                Some(path) => std::fs::write(path, document)?,
                None => println!("{document}"),
            }
        }
        Command::Import(path) => {
            let raw = std::fs::read_to_string(&path)?;
            progress.import_document(&raw).await?;
            println!("imported {}", path.display());
        }
        Command::Reset => {
            progress.reset_progress().await;
            println!("progress reset");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
