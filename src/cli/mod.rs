use crate::{
    collect_manual_args,
    services::{validate_recording_request, LogSink, Recorder, ScriptLauncher, TracingSink},
    ActionError, Config, Dispatcher, FunctionBuilder, FunctionRegistry, ParameterSpec,
};
use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI entry point for the action-gen tool
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = command().get_matches();
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    config.ensure_layout()?;

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
    match matches.subcommand() {
        Some(("record", sub)) => record(&config, sub, sink).await,
        Some(("build", sub)) => build(&config, sub),
        Some(("list", _)) => list(&config),
        Some(("show", sub)) => show(&config, sub),
        Some(("replace", sub)) => replace(&config, sub),
        Some(("run", sub)) => run_function(&config, sub, sink).await,
        Some(("remove", sub)) => remove(&config, sub),
        Some(("rebuild", _)) => rebuild(&config),
        Some(("query", sub)) => query(&config, sub, sink).await,
        _ => Err(anyhow!("no subcommand given, see --help")),
    }
}

/// Command-line definition
pub fn command() -> Command {
    let name_arg = || {
        Arg::new("name")
            .short('n')
            .long("name")
            .value_name("NAME")
            .help("Function name (letters, digits, `_` and `-`)")
            .required(true)
    };
    let description_arg = || {
        Arg::new("description")
            .short('d')
            .long("description")
            .value_name("TEXT")
            .help("What the function does; shown to the LLM")
            .required(true)
    };
    let param_arg = || {
        Arg::new("param")
            .short('p')
            .long("param")
            .value_name("KIND:VARIABLE:DESCRIPTION")
            .help("Declare a parameter, e.g. string:query:search words (repeatable)")
            .action(ArgAction::Append)
    };
    let function_arg = || {
        Arg::new("function")
            .help("Name of a saved function")
            .required(true)
            .index(1)
    };

    Command::new("action-gen")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Record browser actions as functions and run them by hand or from a prompt")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Config file (default: action-gen.json if present)")
                .global(true),
        )
        .subcommand(
            Command::new("record")
                .about("Record a browser session and save it as a function")
                .arg(
                    Arg::new("url")
                        .help("Start page (defaults to the configured URL)")
                        .index(1),
                )
                .arg(name_arg())
                .arg(description_arg())
                .arg(param_arg()),
        )
        .subcommand(
            Command::new("build")
                .about("Save an existing recorded script as a function")
                .arg(
                    Arg::new("script")
                        .help("Path to the raw recorded script")
                        .required(true)
                        .index(1),
                )
                .arg(name_arg())
                .arg(description_arg())
                .arg(param_arg()),
        )
        .subcommand(Command::new("list").about("List saved functions"))
        .subcommand(
            Command::new("show")
                .about("Print a saved function's script")
                .arg(function_arg()),
        )
        .subcommand(
            Command::new("replace")
                .about("Overwrite a saved function's script with an edited file")
                .arg(function_arg())
                .arg(
                    Arg::new("source")
                        .help("File holding the new script")
                        .required(true)
                        .index(2),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run a saved function with explicit arguments")
                .arg(function_arg())
                .arg(
                    Arg::new("arg")
                        .short('a')
                        .long("arg")
                        .value_name("VARIABLE=VALUE")
                        .help("Argument value (repeatable)")
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a saved function and its script")
                .arg(function_arg()),
        )
        .subcommand(
            Command::new("rebuild").about("Recreate the registry from the scripts on disk"),
        )
        .subcommand(
            Command::new("query")
                .about("Let the LLM pick and run a function for a prompt")
                .arg(
                    Arg::new("prompt")
                        .help("What you want done")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .value_name("MODEL")
                        .help("Model to use (overrides config)"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Only show which function would run")
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Parse every `--param kind:variable:description`
pub fn parse_params(matches: &ArgMatches) -> anyhow::Result<Vec<ParameterSpec>> {
    matches
        .get_many::<String>("param")
        .into_iter()
        .flatten()
        .map(|raw| raw.parse::<ParameterSpec>().map_err(|err| anyhow!(err)))
        .collect()
}

/// Parse every `--arg variable=value`
pub fn parse_args(matches: &ArgMatches) -> anyhow::Result<Vec<(String, String)>> {
    matches
        .get_many::<String>("arg")
        .into_iter()
        .flatten()
        .map(|raw| {
            raw.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| anyhow!("invalid argument `{}` (expected variable=value)", raw))
        })
        .collect()
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> anyhow::Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing <{}>", id))
}

async fn record(config: &Config, matches: &ArgMatches, sink: Arc<dyn LogSink>) -> anyhow::Result<()> {
    let url = matches
        .get_one::<String>("url")
        .cloned()
        .unwrap_or_else(|| config.default_url.clone());
    let name = required(matches, "name")?;
    let description = required(matches, "description")?;
    let params = parse_params(matches)?;

    validate_recording_request(&url, name, description, &params)?;

    let recorder = Recorder::from_config(config, sink);
    let Some(raw) = recorder.record(&url).await? else {
        warn!("Nothing was recorded; no function saved");
        return Ok(());
    };

    let builder = FunctionBuilder::from_config(config)?;
    let report = builder.build(&raw, name, description, &params)?;
    info!("Function saved: {}", report.script_path.display());
    Ok(())
}

fn build(config: &Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let script = required(matches, "script")?;
    let raw = std::fs::read_to_string(script).with_context(|| format!("reading {}", script))?;
    let params = parse_params(matches)?;

    let builder = FunctionBuilder::from_config(config)?;
    let report = builder.build(
        &raw,
        required(matches, "name")?,
        required(matches, "description")?,
        &params,
    )?;
    info!(
        "Function saved: {} ({} warnings)",
        report.script_path.display(),
        report.warnings.len()
    );
    Ok(())
}

fn list(config: &Config) -> anyhow::Result<()> {
    let descriptors = FunctionRegistry::from_config(config).load();
    if descriptors.is_empty() {
        println!("No functions saved yet.");
        return Ok(());
    }

    for descriptor in descriptors {
        println!("{}", descriptor.name);
        println!("    {}", descriptor.description);
        for param in &descriptor.parameters {
            println!(
                "    --{} ({}): {}",
                param.variable, param.kind, param.description
            );
        }
    }
    Ok(())
}

fn show(config: &Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let name = required(matches, "function")?;
    let source = FunctionRegistry::from_config(config).read_script(name)?;
    print!("{}", source);
    Ok(())
}

fn replace(config: &Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let name = required(matches, "function")?;
    let path = required(matches, "source")?;
    let registry = FunctionRegistry::from_config(config);
    if registry.get(name).is_none() {
        return Err(ActionError::FunctionNotFound(name.to_string()).into());
    }

    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    registry.write_script(name, &source)?;
    Ok(())
}

async fn run_function(
    config: &Config,
    matches: &ArgMatches,
    sink: Arc<dyn LogSink>,
) -> anyhow::Result<()> {
    let name = required(matches, "function")?;
    let registry = FunctionRegistry::from_config(config);
    let descriptor = registry
        .get(name)
        .ok_or_else(|| ActionError::FunctionNotFound(name.to_string()))?;
    let args = collect_manual_args(&descriptor, &parse_args(matches)?)?;

    let launcher = ScriptLauncher::new(config.interpreter.clone(), sink);
    let outcome = launcher
        .launch(&registry.script_path(name), &args)?
        .wait()
        .await?;
    if !outcome.success {
        return Err(anyhow!("{} exited with {:?}", name, outcome.code));
    }
    Ok(())
}

fn remove(config: &Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let name = required(matches, "function")?;
    if FunctionRegistry::from_config(config).remove(name)? {
        info!("Deleted {}", name);
    } else {
        warn!("{} was not registered; removed any leftover script", name);
    }
    Ok(())
}

fn rebuild(config: &Config) -> anyhow::Result<()> {
    let descriptors = FunctionRegistry::from_config(config).rebuild_from_directory()?;
    info!("Registry rebuilt with {} functions", descriptors.len());
    Ok(())
}

async fn query(config: &Config, matches: &ArgMatches, sink: Arc<dyn LogSink>) -> anyhow::Result<()> {
    let prompt = required(matches, "prompt")?;
    let mut dispatcher = Dispatcher::from_config(config, sink);
    if let Some(model) = matches.get_one::<String>("model") {
        dispatcher = dispatcher.with_model(model.clone());
    }

    info!("Model: {}", dispatcher.model());
    info!("Prompt: {}", prompt);

    if matches.get_flag("dry-run") {
        let selection = dispatcher.select(prompt).await?;
        println!("{}", selection.describe());
        return Ok(());
    }

    let outcome = dispatcher.dispatch(prompt).await?;
    println!("{}", outcome.selection.describe());
    if let Some(text) = &outcome.selection.assistant_text {
        info!("Model said: {}", text);
    }

    for handle in outcome.runs {
        let name = handle.name().to_string();
        let result = handle.wait().await?;
        if !result.success {
            warn!("{} exited with {:?}", name, result.code);
        }
    }
    Ok(())
}
