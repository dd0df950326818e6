use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use std::path::PathBuf;

use drivetag::config::Config;
use drivetag::session::{resolve_link, Session};
use drivetag::tags::{export_tags, ExportFormat};
use drivetag::logging;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Id { link: String },
    Show { link: String },
    Annotate {
        link: String,
        date: Option<String>,
        tags: Vec<String>,
        force: bool,
    },
    ListTags { format: ExportFormat },
    AddTag {
        name: String,
        archtype: String,
        description: String,
    },
    Archtypes,
}

#[derive(Debug)]
struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args_from(&args) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_help();
            std::process::exit(0);
        }
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!("Run `drivetag --help` for usage.");
            std::process::exit(2);
        }
    }
}

/// `Ok(None)` means help was requested.
fn parse_args_from(args: &[String]) -> Result<Option<Args>, String> {
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut date = None;
    let mut tags = Vec::new();
    let mut force = false;
    let mut archtype = String::new();
    let mut description = String::new();
    let mut format = ExportFormat::Table;

    let mut i = 0;
    while i < args.len() {
        let value_for = move |flag: &str| -> Result<String, String> {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };

        match args[i].as_str() {
            "--help" | "-h" => return Ok(None),
            "--version" | "-V" => {
                println!("drivetag {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value_for("--config")?));
                i += 1;
            }
            "--date" | "-d" => {
                date = Some(value_for("--date")?);
                i += 1;
            }
            "--tag" | "-t" => {
                tags.push(value_for("--tag")?);
                i += 1;
            }
            "--archtype" | "-a" => {
                archtype = value_for("--archtype")?;
                i += 1;
            }
            "--description" => {
                description = value_for("--description")?;
                i += 1;
            }
            "--force" | "-f" => force = true,
            "--csv" => format = ExportFormat::Csv,
            "--json" => format = ExportFormat::Json,
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("Unknown argument: {}", flag));
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let mut next_positional = |what: &str| positional.next().ok_or_else(|| format!("missing {}", what));

    let command = match next_positional("command")?.as_str() {
        "id" => Command::Id { link: next_positional("link")? },
        "show" => Command::Show { link: next_positional("link")? },
        "annotate" => Command::Annotate {
            link: next_positional("link")?,
            date,
            tags,
            force,
        },
        "archtypes" => Command::Archtypes,
        "tags" => match next_positional("tags subcommand (list or add)")?.as_str() {
            "list" => Command::ListTags { format },
            "add" => Command::AddTag {
                name: next_positional("tag name")?,
                archtype,
                description,
            },
            other => return Err(format!("Unknown tags subcommand: {}", other)),
        },
        other => return Err(format!("Unknown command: {}", other)),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    Ok(Some(Args { config_path, command }))
}

fn print_help() {
    println!(
        r#"drivetag - tag Google Drive files with a date and categories

USAGE:
    drivetag [OPTIONS] <COMMAND>

COMMANDS:
    id <link>                     Print the Drive id in a share link
    show <link>                   Show the current date and tags of a file or folder
    annotate <link>               Write date and tags into the description
        --date, -d DATE           DD/MM/YYYY or YYYY-MM-DD (default: today)
        --tag, -t NAME            Tag to apply, repeatable
        --force, -f               Allow tags missing from the tag list
    tags list [--csv|--json]      List the tag vocabulary
    tags add <name>               Add a tag to the vocabulary
        --archtype, -a TEXT       Category, new or existing
        --description TEXT        Free text
    archtypes                     List archtypes already in use

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    DRIVETAG_CONFIG                  Path to config file (overrides default location)
    DRIVETAG_ACCESS_TOKEN            OAuth bearer token, skips service account auth
    GOOGLE_APPLICATION_CREDENTIALS   Service account key file
    DRIVETAG_LOG                     Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/drivetag/config.toml"#
    );
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(input, "%Y-%m-%d"))
        .with_context(|| format!("Invalid date '{}', expected DD/MM/YYYY or YYYY-MM-DD", input))
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(None);

    // No remote access needed just to read a link
    if let Command::Id { link } = &args.command {
        println!("{}", resolve_link(link)?);
        return Ok(());
    }

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let session = Session::connect(&config).context("Failed to start Drive session")?;
    run(&session, args.command)
}

fn run(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Id { .. } => unreachable!("handled before connecting"),
        Command::Show { link } => {
            let (metadata, annotation) = session.inspect(&link).context("Failed to read file metadata")?;
            println!("Name: {}", metadata.name);
            println!("Type: {}", metadata.mime_type);
            match annotation {
                Some(annotation) => {
                    let date = annotation
                        .date
                        .map(|d| d.format("%d/%m/%Y").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("Date: {}", date);
                    println!("Tags: {}", annotation.tags.join(", "));
                }
                None => match metadata.description.as_deref() {
                    Some(text) if !text.is_empty() => println!("Description: {}", text),
                    _ => println!("No annotation yet"),
                },
            }
        }
        Command::Annotate { link, date, tags, force } => {
            let date = match date {
                Some(input) => parse_date(&input)?,
                None => Local::now().date_naive(),
            };
            if !force {
                let unknown = session.unknown_tags(&tags)?;
                if !unknown.is_empty() {
                    bail!(
                        "Unknown tags: {} (add them with `drivetag tags add` or pass --force)",
                        unknown.join(", ")
                    );
                }
            }
            let text = session
                .annotate_link(&link, date, &tags)
                .context("Failed to update description")?;
            println!("Description updated:\n{}", text);
        }
        Command::ListTags { format } => {
            let tags = session.tags().list_tags().context("Failed to read tags")?;
            tracing::debug!(count = tags.len(), format = format.name(), "Listing tags");
            export_tags(&tags, format, std::io::stdout().lock())?;
        }
        Command::AddTag { name, archtype, description } => {
            let existing = session.tags().archtypes()?;
            if !archtype.is_empty() && !existing.contains(&archtype) {
                tracing::info!(archtype = %archtype, "New archtype");
            }
            session
                .add_tag(&name, &archtype, &description)
                .context("Failed to add tag")?;
            println!("Added tag '{}'", name);
        }
        Command::Archtypes => {
            for archtype in session.tags().archtypes()? {
                println!("{}", archtype);
            }
        }
    }
    Ok(())
}
