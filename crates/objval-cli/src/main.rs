//! objval - validation of digital-preservation objects
//!
//! ## Commands
//!
//! - `validate`: run the validation modules of a context against a target
//! - `run`: run an explicit set of plugins against a target
//! - `plugins`: describe all registered plugins
//! - `identify`: identify the format of a file with fido
//! - `checksum`: print the digest of a file
//!
//! `validate` and `run` print the job report as JSON and exit with 0 when the
//! target is valid, 1 when it is invalid and 2 when validation is incomplete.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn, Level};

use objval_core::plugins::FidoPlugin;
use objval_core::{
    AppConfig, Args, ExecutionContext, HashAlgorithm, JobOptions, ModuleCatalog, Plugin,
    PluginConfig, PluginRegistry, Report, ValidationContext, ValidationJob, Verdict,
};

#[derive(Parser)]
#[command(name = "objval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate digital-preservation objects and BagIt packages", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory that job targets are resolved against
    #[arg(long, global = true, env = "FS_MOUNT_POINT")]
    mount_point: Option<PathBuf>,

    /// JHOVE executable
    #[arg(long, global = true, env = "DEFAULT_JHOVE_CMD")]
    jhove_cmd: Option<String>,

    /// fido executable
    #[arg(long, global = true, env = "DEFAULT_FIDO_CMD")]
    fido_cmd: Option<String>,

    /// Directory with external command plugin descriptors (*.json)
    #[arg(long, global = true, env = "ADDITIONAL_VALIDATION_PLUGINS_DIR")]
    plugins_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a target with the modules of a validation context
    Validate {
        /// Target file or BagIt directory, relative to the mount point
        target: PathBuf,

        /// Validation context
        #[arg(long, value_enum, default_value_t = ContextArg::Object)]
        context: ContextArg,

        /// Module to run (repeatable); all modules of the context if omitted
        #[arg(long = "module")]
        modules: Vec<String>,

        /// Module arguments as JSON: {"<module>": {"<name>": <value>}}
        #[arg(long)]
        args: Option<String>,

        /// Treat a run without any selected module as valid
        #[arg(long)]
        empty_valid: bool,
    },

    /// Run explicitly configured plugins against a target
    Run {
        /// Target file or directory, relative to the mount point
        target: PathBuf,

        /// Plugin to run as ID=NAME (repeatable)
        #[arg(long = "plugin", value_parser = parse_key_val, required = true)]
        plugins: Vec<(String, String)>,

        /// Arguments for plugin ID as ID=JSON (repeatable)
        #[arg(long = "plugin-args", value_parser = parse_key_val)]
        plugin_args: Vec<(String, String)>,

        /// Treat a run without any accepted plugin as valid
        #[arg(long)]
        empty_valid: bool,
    },

    /// Describe all registered plugins as JSON
    Plugins,

    /// Identify the format of a file
    Identify {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = VocabularyArg::Mimetype)]
        vocabulary: VocabularyArg,
    },

    /// Print the checksum of a file in manifest-line format
    Checksum {
        file: PathBuf,

        /// One of md5, sha1, sha256, sha512
        #[arg(long, default_value = "sha256")]
        method: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ContextArg {
    Object,
    Ip,
}

impl From<ContextArg> for ValidationContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Object => ValidationContext::Object,
            ContextArg::Ip => ValidationContext::Ip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VocabularyArg {
    Puid,
    Mimetype,
}

impl VocabularyArg {
    fn plugin_name(self) -> &'static str {
        match self {
            Self::Puid => FidoPlugin::PUID,
            Self::Mimetype => FidoPlugin::MIMETYPE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    objval_core::init_tracing(cli.json, level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Validate {
            target,
            context,
            modules,
            args,
            empty_valid,
        } => {
            let kwargs = parse_kwargs(args.as_deref())?;
            let requested = (!modules.is_empty()).then_some(modules);
            cmd_validate(
                &config,
                &target,
                context.into(),
                requested,
                &kwargs,
                JobOptions {
                    empty_plan_valid: empty_valid,
                },
            )
            .await
        }
        Commands::Run {
            target,
            plugins,
            plugin_args,
            empty_valid,
        } => {
            let request = plugin_request(plugins, plugin_args)?;
            cmd_run(
                &config,
                &target,
                &request,
                JobOptions {
                    empty_plan_valid: empty_valid,
                },
            )
            .await
        }
        Commands::Plugins => cmd_plugins(&config),
        Commands::Identify { file, vocabulary } => cmd_identify(&config, &file, vocabulary),
        Commands::Checksum { file, method } => cmd_checksum(&config, &file, &method),
    }
}

/// Environment configuration overridden by command-line flags.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::from_env().context("Failed to read configuration")?;
    if let Some(mount_point) = &cli.mount_point {
        config.fs_mount_point = mount_point.clone();
    }
    if let Some(jhove_cmd) = &cli.jhove_cmd {
        config.jhove_cmd = jhove_cmd.clone();
    }
    if let Some(fido_cmd) = &cli.fido_cmd {
        config.fido_cmd = fido_cmd.clone();
    }
    if let Some(plugins_dir) = &cli.plugins_dir {
        config.plugins_dir = Some(plugins_dir.clone());
    }
    Ok(config)
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("missing ID in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse `--args`, a JSON object of per-module argument objects.
fn parse_kwargs(raw: Option<&str>) -> Result<BTreeMap<String, Args>> {
    match raw {
        Some(raw) => serde_json::from_str(raw)
            .context("--args must be a JSON object of argument objects"),
        None => Ok(BTreeMap::new()),
    }
}

/// Combine `--plugin` and `--plugin-args` into a plugin-config request.
fn plugin_request(
    plugins: Vec<(String, String)>,
    plugin_args: Vec<(String, String)>,
) -> Result<Vec<(String, PluginConfig)>> {
    let mut args: BTreeMap<String, Args> = BTreeMap::new();
    for (id, raw) in plugin_args {
        let parsed: Args = serde_json::from_str(&raw)
            .with_context(|| format!("arguments for '{id}' must be a JSON object"))?;
        args.insert(id, parsed);
    }

    let mut request = Vec::new();
    for (id, name) in plugins {
        if request.iter().any(|(seen, _): &(String, PluginConfig)| *seen == id) {
            bail!("plugin id '{id}' given more than once");
        }
        let bound = args.remove(&id).unwrap_or_default();
        request.push((id, PluginConfig::new(name, bound)));
    }
    if let Some(id) = args.keys().next() {
        bail!("arguments given for unknown plugin id '{id}'");
    }
    Ok(request)
}

fn exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Valid => 0,
        Verdict::Invalid => 1,
        Verdict::Incomplete => 2,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

/// Run `job` on the blocking pool; Ctrl-C cancels it cooperatively.
async fn execute_job(job: ValidationJob) -> Result<Report> {
    let cancel = job.cancel_token();
    let mut handle = tokio::task::spawn_blocking(move || {
        job.run(&mut |progress| debug!(progress, "job progress"))
    });

    tokio::select! {
        report = &mut handle => return report.context("Validation job panicked"),
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "cannot listen for interrupts");
            } else {
                warn!("interrupt received, cancelling validation");
                cancel.cancel();
            }
        }
    }
    handle.await.context("Validation job panicked")
}

async fn finish_job(job: ValidationJob) -> Result<ExitCode> {
    let report = execute_job(job).await?;
    let verdict = report.verdict();
    info!(token = %report.token, verdict = ?verdict, "validation finished");
    print_json(&report)?;
    Ok(ExitCode::from(exit_code(verdict)))
}

async fn cmd_validate(
    config: &AppConfig,
    target: &Path,
    context: ValidationContext,
    requested: Option<Vec<String>>,
    kwargs: &BTreeMap<String, Args>,
    options: JobOptions,
) -> Result<ExitCode> {
    let registry = PluginRegistry::from_config(config).context("Failed to load plugins")?;
    let catalog = ModuleCatalog::standard(&registry).context("Failed to build module catalog")?;
    let plan = catalog.select(context, requested.as_deref(), kwargs);
    let job = ValidationJob::new(config.resolve_target(target), plan).with_options(options);
    finish_job(job).await
}

async fn cmd_run(
    config: &AppConfig,
    target: &Path,
    request: &[(String, PluginConfig)],
    options: JobOptions,
) -> Result<ExitCode> {
    let registry = PluginRegistry::from_config(config).context("Failed to load plugins")?;
    let plan = registry.plan(request);
    let job = ValidationJob::new(config.resolve_target(target), plan).with_options(options);
    finish_job(job).await
}

fn cmd_plugins(config: &AppConfig) -> Result<ExitCode> {
    let registry = PluginRegistry::from_config(config).context("Failed to load plugins")?;
    print_json(&registry.describe())?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_identify(config: &AppConfig, file: &Path, vocabulary: VocabularyArg) -> Result<ExitCode> {
    let registry = PluginRegistry::from_config(config).context("Failed to load plugins")?;
    let name = vocabulary.plugin_name();
    let plugin = registry
        .identification(name)
        .ok_or_else(|| anyhow!("identification plugin '{name}' is not registered"))?;

    let mut args = Args::new();
    args.insert("path".to_string(), json!(file.to_string_lossy()));
    let mut context = ExecutionContext::detached(plugin.display_name());
    let result = plugin.identify(&mut context, &args);
    print_json(&result)?;
    Ok(if result.success == Some(true) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn cmd_checksum(config: &AppConfig, file: &Path, method: &str) -> Result<ExitCode> {
    println!("{}", checksum_line(file, method, config.hash_block_size)?);
    Ok(ExitCode::SUCCESS)
}

fn checksum_line(file: &Path, method: &str, block_size: usize) -> Result<String> {
    let algorithm: HashAlgorithm = method.parse()?;
    let digest = algorithm
        .hash_file_with_block(file, block_size)
        .with_context(|| format!("Failed to hash '{}'", file.display()))?;
    Ok(format!("{digest}  {}", file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use objval_core::plugins::IntegrityPlugin;
    use objval_core::{ModuleSelectionPlan, SelectedModule};
    use std::sync::Arc;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("fmt=jhove-fido-mimetype").expect("pair"),
            ("fmt".to_string(), "jhove-fido-mimetype".to_string())
        );
        assert_eq!(
            parse_key_val(r#"bag={"method": "md5"}"#).expect("pair").1,
            r#"{"method": "md5"}"#
        );
        assert!(parse_key_val("no-separator").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_parse_kwargs() {
        let kwargs = parse_kwargs(Some(r#"{"file_integrity": {"value": "abc"}}"#)).expect("kwargs");
        assert_eq!(kwargs["file_integrity"]["value"], "abc");
        assert!(parse_kwargs(None).expect("empty").is_empty());
        assert!(parse_kwargs(Some(r#"{"file_integrity": 5}"#)).is_err());
    }

    #[test]
    fn test_plugin_request_binds_args() {
        let request = plugin_request(
            vec![
                ("bag".to_string(), "integrity-bagit".to_string()),
                ("fmt".to_string(), "jhove-fido-mimetype".to_string()),
            ],
            vec![("bag".to_string(), r#"{"method": "md5"}"#.to_string())],
        )
        .expect("request");
        assert_eq!(request[0].0, "bag");
        assert_eq!(request[0].1.args["method"], "md5");
        assert!(request[1].1.args.is_empty());
    }

    #[test]
    fn test_plugin_request_rejects_stray_args() {
        let err = plugin_request(
            vec![("bag".to_string(), "integrity-bagit".to_string())],
            vec![("other".to_string(), "{}".to_string())],
        )
        .expect_err("stray args");
        assert!(err.to_string().contains("'other'"));

        let err = plugin_request(
            vec![
                ("bag".to_string(), "integrity-bagit".to_string()),
                ("bag".to_string(), "integrity".to_string()),
            ],
            vec![],
        )
        .expect_err("duplicate id");
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(Verdict::Valid), 0);
        assert_eq!(exit_code(Verdict::Invalid), 1);
        assert_eq!(exit_code(Verdict::Incomplete), 2);
    }

    #[test]
    fn test_checksum_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "hello\n").expect("write");
        let line = checksum_line(&file, "md5", 16).expect("checksum");
        assert_eq!(
            line,
            format!("b1946ac92492d2347c6235b4d2611184  {}", file.display())
        );
        assert!(checksum_line(&file, "crc32", 16).is_err());
    }

    #[test]
    fn test_cli_parses_validate() {
        let cli = Cli::try_parse_from([
            "objval",
            "validate",
            "ip/bag-1",
            "--context",
            "ip",
            "--module",
            "payload_integrity",
            "--module",
            "file_format",
            "--jhove-cmd",
            "/opt/jhove/jhove",
        ])
        .expect("parse");
        assert_eq!(cli.jhove_cmd.as_deref(), Some("/opt/jhove/jhove"));
        match cli.command {
            Commands::Validate {
                context, modules, ..
            } => {
                assert_eq!(context, ContextArg::Ip);
                assert_eq!(modules, vec!["payload_integrity", "file_format"]);
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_vocabulary_maps_to_plugin() {
        assert_eq!(VocabularyArg::Puid.plugin_name(), "fido-puid");
        assert_eq!(VocabularyArg::Mimetype.plugin_name(), "fido-mimetype");
    }

    #[tokio::test]
    async fn test_execute_job_reports_valid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello\n").expect("write");

        let mut args = Args::new();
        args.insert("batch".to_string(), json!(false));
        args.insert("value".to_string(), json!("b1946ac92492d2347c6235b4d2611184"));
        let mut plan = ModuleSelectionPlan::default();
        plan.modules.push(SelectedModule {
            id: "file_integrity".to_string(),
            plugin: Arc::new(IntegrityPlugin::new()),
            args,
        });

        let report = execute_job(ValidationJob::new(&file, plan))
            .await
            .expect("report");
        assert_eq!(report.verdict(), Verdict::Valid);
        assert_eq!(report.data.details["file_integrity"].record_count(), 1);
    }
}
