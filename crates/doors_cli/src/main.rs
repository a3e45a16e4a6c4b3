use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use doors_cli::{run, CommandKind, CommonOptions, DEFAULT_ID_LENGTH};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = CommonOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--root" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --root".to_string())?;
                options.root = Some(PathBuf::from(value));
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "validate" => {
            if !command_args.is_empty() {
                return Err("validate takes no arguments".to_string());
            }
            CommandKind::Validate
        }
        "check-open" => {
            if command_args.is_empty() {
                return Err("check-open requires at least one document".to_string());
            }
            CommandKind::CheckOpen {
                documents: command_args.to_vec(),
            }
        }
        "doors" => CommandKind::Doors {
            document: single_arg(command, command_args)?,
        },
        "rename" => {
            let mut positional = Vec::new();
            let mut project = false;
            for arg in command_args {
                if arg == "--project" {
                    project = true;
                } else {
                    positional.push(arg.clone());
                }
            }
            let [document, old_id, new_id] = <[String; 3]>::try_from(positional)
                .map_err(|_| "rename requires <document> <old-id> <new-id>".to_string())?;
            CommandKind::Rename {
                document,
                old_id,
                new_id,
                project,
            }
        }
        "gen-id" => {
            let length = match command_args {
                [] => DEFAULT_ID_LENGTH,
                [value] => value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid length '{value}' (expected usize)"))?,
                _ => return Err("gen-id takes at most one argument".to_string()),
            };
            CommandKind::GenId { length }
        }
        "assign-ids" => CommandKind::AssignIds {
            document: single_arg(command, command_args)?,
        },
        "travel" => match command_args {
            [document, door] => CommandKind::Travel {
                document: document.clone(),
                door: door.clone(),
            },
            _ => return Err("travel requires <document> <door-id>".to_string()),
        },
        "prefs" => {
            let validation_on_play = match command_args {
                [] => None,
                [flag, value] if flag == "--validation-on-play" => Some(parse_switch(value)?),
                _ => {
                    return Err("prefs takes [--validation-on-play <on|off>]".to_string());
                }
            };
            CommandKind::Prefs { validation_on_play }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, options, &mut io::stdout())
}

fn single_arg(command: &str, args: &[String]) -> Result<String, String> {
    match args {
        [value] => Ok(value.clone()),
        _ => Err(format!("{command} requires exactly one document")),
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        other => Err(format!("invalid switch '{other}' (expected on or off)")),
    }
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "doors_cli - door link validation and maintenance",
        "",
        "Usage:",
        "  doors_cli [--root <dir>] validate",
        "  doors_cli [--root <dir>] check-open <document...>",
        "  doors_cli [--root <dir>] doors <document>",
        "  doors_cli [--root <dir>] rename <document> <old-id> <new-id> [--project]",
        "  doors_cli gen-id [length]",
        "  doors_cli [--root <dir>] assign-ids <document>",
        "  doors_cli [--root <dir>] travel <document> <door-id>",
        "  doors_cli [--root <dir>] prefs [--validation-on-play <on|off>]",
        "",
        "Documents are selected by guid or by path under documents/.",
        "Without --root the project is taken from DOORS_PROJECT_ROOT or found",
        "by walking up from the current directory.",
    ]
    .join("\n")
}
