mod debug_report;

use std::io::{self, IsTerminal, Read};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    std::process::exit(debug_report::print_run(&config));
}

pub struct CliConfig {
    pub when: String,
    pub wheres: Vec<String>,
    pub groups: Vec<(String, String)>,
    pub color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut when: Option<String> = None;
    let mut wheres: Vec<String> = Vec::new();
    let mut groups: Vec<(String, String)> = Vec::new();
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("happenstance {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--when" | "-w" => {
                let value = args.next().ok_or_else(|| "error: --when expects a value".to_string())?;
                if when.is_some() {
                    return Err("error: WHEN clause provided multiple times".to_string());
                }
                when = Some(value);
            }
            "--where" => {
                let value = args.next().ok_or_else(|| "error: --where expects a value".to_string())?;
                wheres.push(value);
            }
            "--group" => {
                let value = args.next().ok_or_else(|| "error: --group expects name=expr".to_string())?;
                groups.push(parse_group(&value)?);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if when.is_some() {
                        return Err("error: WHEN clause provided multiple times".to_string());
                    }
                    when = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--when=") => {
                let value = arg.trim_start_matches("--when=");
                if when.is_some() {
                    return Err("error: WHEN clause provided multiple times".to_string());
                }
                when = Some(value.to_string());
            }
            _ if arg.starts_with("--where=") => {
                wheres.push(arg.trim_start_matches("--where=").to_string());
            }
            _ if arg.starts_with("--group=") => {
                groups.push(parse_group(arg.trim_start_matches("--group="))?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if when.is_some() {
                    return Err("error: WHEN clause provided multiple times".to_string());
                }
                when = Some(rest);
                break;
            }
        }
    }

    let when = match when {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if when.trim().is_empty() {
        return Err(format!("error: no WHEN clause provided\n\n{}", help_text()));
    }

    Ok(CliConfig { when, wheres, groups, color })
}

fn parse_group(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, expr)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), expr.to_string()))
        }
        _ => Err(format!("error: invalid --group '{value}' (expected name=expr)")),
    }
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer.trim_end().to_string())
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "happenstance {version}

World-event rules engine CLI: compiles a WHEN clause (and optional WHERE
clauses) and prints the predicate tree, atoms, and zone resolution.

Usage:
  happenstance [OPTIONS] [--] <when clause...>
  happenstance [OPTIONS] --when <expr>

Options:
  -w, --when <expr>          WHEN clause to compile. If omitted, reads remaining
                             args or stdin when no args are provided.
  --where <expr>             WHERE clause to resolve; may repeat (clauses union).
  --group <name=expr>        Define a named zone group; may repeat.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Exit codes:
  0  Success.
  1  Clause failed to parse.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION")
    )
}
