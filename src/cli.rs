// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::config::DEFAULT_CONFIG_FILE;
use crate::infra::logging::{init_logging, level_for_verbosity};
use crate::infra::t;

pub mod commands;

use commands::run::RunArgs;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for `--lang <VALUE>` or `--lang=<VALUE>`.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        return args.get(pos + 1).cloned();
    }
    args.iter()
        .find_map(|arg| arg.strip_prefix("--lang=").map(str::to_string))
}

fn config_arg(locale: &str) -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help(t!("cli.arg_config", locale = locale).to_string())
        .value_name("CONFIG")
        .default_value(DEFAULT_CONFIG_FILE)
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

fn project_dir_arg(locale: &str) -> Arg {
    Arg::new("project-dir")
        .long("project-dir")
        .help(t!("cli.arg_project_dir", locale = locale).to_string())
        .value_name("PROJECT_DIR")
        .default_value(".")
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

fn axis_arg(locale: &str) -> Arg {
    Arg::new("axis")
        .long("axis")
        .env("ENVMATRIX_AXIS")
        .help(t!("cli.arg_axis", locale = locale).to_string())
        .value_name("VALUE")
        .action(ArgAction::Set)
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("envmatrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.arg_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help(t!("cli.arg_verbose", locale = locale).to_string())
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help(t!("cli.arg_log_level", locale = locale).to_string())
                .value_name("LEVEL")
                .default_value("warn")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.cmd_run_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .arg(project_dir_arg(locale))
                .arg(
                    Arg::new("env")
                        .short('e')
                        .long("env")
                        .help(t!("cli.arg_env", locale = locale).to_string())
                        .value_name("PATTERN")
                        .action(ArgAction::Append),
                )
                .arg(axis_arg(locale))
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .env("ENVMATRIX_JOBS")
                        .help(t!("cli.arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::builder::RangedU64ValueParser::<usize>::new().range(1..))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("recreate")
                        .short('r')
                        .long("recreate")
                        .help(t!("cli.arg_recreate", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("keep-failed")
                        .long("keep-failed")
                        .help(t!("cli.arg_keep_failed", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("set-env")
                        .long("set-env")
                        .help(t!("cli.arg_set_env", locale = locale).to_string())
                        .value_name("KEY=VALUE")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .help(t!("cli.arg_quiet", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("cli.arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("cli.arg_json", locale = locale).to_string())
                        .value_name("JSON")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("passthrough")
                        .help(t!("cli.arg_passthrough", locale = locale).to_string())
                        .value_name("ARGS")
                        .num_args(0..)
                        .last(true)
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("list")
                .about(t!("cli.cmd_list_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .arg(project_dir_arg(locale))
                .arg(axis_arg(locale)),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_init_output", locale = locale).to_string())
                        .value_name("PATH")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("cli.arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn path_arg(matches: &ArgMatches, id: &str) -> PathBuf {
    matches.get_one::<PathBuf>(id).cloned().unwrap_or_default()
}

fn strings_arg(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Parses the command line and runs the selected subcommand.
/// Returns `Ok(false)` when a run finished but not every environment succeeded.
pub async fn run() -> Result<bool> {
    // Pre-parse language and initialize i18n first.
    let explicit_lang = pre_parse_language();
    let language = match &explicit_lang {
        Some(lang) => lang.clone(),
        None => crate::detect_locale(),
    };
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();

    let base_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("warn");
    init_logging(level_for_verbosity(base_level, matches.get_count("verbose")));

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = RunArgs {
                config: path_arg(run_matches, "config"),
                project_dir: path_arg(run_matches, "project-dir"),
                selectors: strings_arg(run_matches, "env"),
                axis: run_matches.get_one::<String>("axis").cloned(),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                recreate: run_matches.get_flag("recreate"),
                keep_failed: run_matches.get_flag("keep-failed"),
                set_env: strings_arg(run_matches, "set-env"),
                quiet: run_matches.get_flag("quiet"),
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                json: run_matches.get_one::<PathBuf>("json").cloned(),
                passthrough: strings_arg(run_matches, "passthrough"),
                lang: explicit_lang,
            };
            commands::run::execute(args).await
        }
        Some(("list", list_matches)) => {
            commands::list::execute(
                path_arg(list_matches, "config"),
                path_arg(list_matches, "project-dir"),
                list_matches.get_one::<String>("axis").cloned(),
                &language,
            )?;
            Ok(true)
        }
        Some(("init", init_matches)) => {
            // Show language detection message if it was auto-detected
            if explicit_lang.is_none() {
                println!(
                    "{}",
                    t!("init.language_detected", locale = &language, lang = &language)
                );
            }
            commands::init::execute(
                path_arg(init_matches, "output"),
                init_matches.get_flag("non-interactive"),
                init_matches.get_flag("force"),
                &language,
            )?;
            Ok(true)
        }
        // `subcommand_required` makes clap print help and exit before this.
        _ => Ok(true),
    }
}
