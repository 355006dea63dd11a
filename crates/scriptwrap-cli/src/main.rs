//! # scriptwrap
//!
//! Command-line front end for the hook engine.
//!
//! - `scriptwrap check <file>` compiles a script and reports its first
//!   syntax error.
//! - `scriptwrap run --config <hook.json>` loads a persisted hook and drives
//!   one build lifecycle against local collaborators, printing the outcome
//!   as JSON.
//! - `scriptwrap modes` prints the selectable phase filters.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scriptwrap_hooks::local::{LocalBuild, LocalLauncher, SinkListener, WriterSink};
use scriptwrap_hooks::{
    Build, BuildListener, EnvVars, Environment, InterpretedEngine, Launcher, LogSink, Phase,
    ScriptHook, descriptor, load_hook_json,
};
use scriptwrap_settings::EngineSettings;
use tracing::{debug, info};

/// Check and dry-run build hook scripts.
#[derive(Parser, Debug)]
#[command(name = "scriptwrap", version, about = "Check and dry-run build hook scripts")]
struct Cli {
    /// Settings file (defaults to `$SCRIPTWRAP_SETTINGS` or `~/.scriptwrap/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script file without running it.
    Check {
        /// Script source file.
        file: PathBuf,

        /// Also validate a phase filter name.
        #[arg(long)]
        mode: Option<String>,
    },
    /// Run a persisted hook through one build lifecycle.
    Run(RunArgs),
    /// List selectable phase filters as JSON.
    Modes,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Persisted hook JSON (`{"type", "source", "mode"}`).
    #[arg(long)]
    config: PathBuf,

    /// Project name of the simulated build.
    #[arg(long, default_value = "local")]
    project: String,

    /// Build number of the simulated build.
    #[arg(long, default_value_t = 1)]
    number: u64,

    /// Workspace directory of the simulated build.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Initial build variable, `KEY=VALUE`. Repeatable.
    #[arg(long = "var", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Initial environment variable, `KEY=VALUE`. Repeatable.
    #[arg(long = "env", value_parser = parse_key_val)]
    env: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_settings(path: Option<&Path>) -> Arc<EngineSettings> {
    if let Some(path) = path {
        scriptwrap_settings::reload_settings_from_path(path);
    }
    scriptwrap_settings::get_settings()
}

fn init_logging(settings: &EngineSettings) {
    if settings.logging.json {
        scriptwrap_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        scriptwrap_core::logging::init_subscriber(&settings.logging.level);
    }
}

fn check(file: &Path, mode: Option<&str>) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script: {}", file.display()))?;
    if let Some(mode) = mode {
        let _: Phase = mode.parse()?;
    }
    let name = file
        .file_stem()
        .map_or_else(|| "script".to_string(), |s| s.to_string_lossy().into_owned());
    let program = scriptwrap_lang::compile(&name, &source)
        .map_err(|e| anyhow::anyhow!("{}:{}:{}: {}", file.display(), e.line, e.column, e.message))?;

    let functions = program.function_names();
    println!(
        "ok: {} ({} statements{})",
        file.display(),
        program.statement_count(),
        if functions.is_empty() {
            String::new()
        } else {
            format!(", functions: {}", functions.join(", "))
        }
    );
    Ok(())
}

/// Outcome of one simulated lifecycle.
#[derive(Debug)]
struct RunReport {
    launcher: String,
    build_variables: EnvVars,
    environment: EnvVars,
    torn_down: bool,
}

impl RunReport {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "launcher": self.launcher,
            "buildVariables": self.build_variables,
            "environment": self.environment,
            "tearDown": self.torn_down,
        })
    }
}

/// Drive `hook` through setup, decoration, variables and teardown.
fn run_lifecycle(hook: &ScriptHook, args: &RunArgs, log: &Arc<dyn LogSink>) -> Result<RunReport> {
    let mut build = LocalBuild::new(args.project.clone(), args.number);
    if let Some(workspace) = &args.workspace {
        build = build.with_workspace(workspace.clone());
    }
    let build: Arc<dyn Build> = Arc::new(build);
    let launcher: Arc<dyn Launcher> = Arc::new(LocalLauncher::default());
    let listener: Arc<dyn BuildListener> = Arc::new(SinkListener::new(Arc::clone(log)));

    let env = hook.set_up(&build, &launcher, &listener).context("setup failed")?;
    let launcher = hook
        .decorate_launcher(&build, &launcher, &listener)
        .context("launcher decoration failed")?;
    let logger = hook
        .decorate_logger(&build, log)
        .context("logger decoration failed")?;
    logger
        .write_line(&format!("Started {} using {}", build.display_name(), launcher.name()))
        .context("failed to write build log")?;

    let mut build_variables: EnvVars = args.vars.iter().cloned().collect();
    hook.make_build_variables(&build, &mut build_variables)
        .context("build variables failed")?;

    let mut environment: EnvVars = args.env.iter().cloned().collect();
    env.contribute_vars(&build, &mut environment)
        .context("environment variables failed")?;

    let torn_down = env.tear_down(&build, &listener).context("teardown failed")?;
    debug!(torn_down, "lifecycle finished");

    Ok(RunReport {
        launcher: launcher.name(),
        build_variables,
        environment,
        torn_down,
    })
}

fn run(args: &RunArgs) -> Result<bool> {
    let json = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Failed to read hook config: {}", args.config.display()))?;
    let hook = load_hook_json(InterpretedEngine::shared(), &json)
        .with_context(|| format!("Invalid hook config: {}", args.config.display()))?;
    info!(mode = %hook.mode(), unit = %hook.unit_name(), "hook loaded");

    let log: Arc<dyn LogSink> = Arc::new(WriterSink::stderr());
    let report = run_lifecycle(&hook, args, &log)?;
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    Ok(report.torn_down)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref());
    init_logging(&settings);

    match cli.command {
        Command::Check { file, mode } => {
            check(&file, mode.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            if run(&args)? {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("teardown reported failure");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Modes => {
            let modes = descriptor::mode_values();
            let out = serde_json::json!({
                "displayName": descriptor::DISPLAY_NAME,
                "default": descriptor::default_mode(),
                "modes": modes,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptwrap_hooks::ScriptEngine;
    use scriptwrap_hooks::local::MemorySink;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["scriptwrap", "run", "--config", "hook.json"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_key_val_splits_on_first_equals() {
        assert_eq!(parse_key_val("A=b=c").unwrap(), ("A".into(), "b=c".into()));
        assert_eq!(parse_key_val("EMPTY=").unwrap(), ("EMPTY".into(), String::new()));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn run_args_parse() {
        let args = args(&["--project", "app", "--number", "9", "--var", "A=1", "--var", "B=2"]);
        assert_eq!(args.project, "app");
        assert_eq!(args.number, 9);
        assert_eq!(args.vars.len(), 2);
        assert!(args.env.is_empty());
    }

    #[test]
    fn lifecycle_applies_every_phase() {
        let engine: Arc<dyn ScriptEngine> = Arc::new(InterpretedEngine::default());
        let source = r"
            if (phase == 'DECORATE_LAUNCHER') { return launcher.decorate_by_prefix(['nice']) }
            if (phase == 'DECORATE_LOGGER') { return logger.with_prefix('[hook] ') }
            if (phase == 'BUILD_VARIABLES') { vars['NUMBER'] = build.number }
            if (phase == 'ENVIRONMENT_VARIABLES') { vars['STAGE'] = 'ci' }
            if (phase == 'TEAR_DOWN') { return build.number == 5 }
            null
        ";
        let hook = ScriptHook::with_engine(engine, source, "ALL").unwrap();
        let memory = Arc::new(MemorySink::new());
        let log: Arc<dyn LogSink> = memory.clone();

        let report = run_lifecycle(&hook, &args(&["--number", "5", "--env", "PATH=/bin"]), &log)
            .unwrap();

        assert_eq!(report.launcher, "local [nice]");
        assert_eq!(report.build_variables["NUMBER"], "5");
        assert_eq!(report.environment["STAGE"], "ci");
        assert_eq!(report.environment["PATH"], "/bin");
        assert_eq!(memory.lines(), vec!["[hook] Started local #5 using local [nice]"]);
        assert!(report.torn_down);
        assert_eq!(report.to_json()["buildVariables"]["NUMBER"], "5");
    }

    #[test]
    fn check_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.hook");
        std::fs::write(&path, "let a = 1\nlet b = (\n").unwrap();
        let err = check(&path, None).unwrap_err();
        assert!(err.to_string().contains("broken.hook:"));

        std::fs::write(&path, "fn twice(x) { x * 2 }\ntwice(2)").unwrap();
        check(&path, Some("SETUP")).unwrap();
        assert!(check(&path, Some("sometimes")).is_err());
    }
}
