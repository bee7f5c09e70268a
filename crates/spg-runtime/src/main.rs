use anyhow::{bail, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use spg_overlay::{merge, Provenance};
use spg_runtime::{
    DryRunSandboxFactory, FileSetGenerator, Generator, HttpGenerator, PreviewConfig, PreviewError,
    PreviewRuntime,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn cli() -> Command {
    Command::new("spg")
        .version(spg_runtime::VERSION)
        .about("Storefront Preview Guard")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to a TOML config file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("check")
                .about("Run a prompt through the safety gate")
                .arg(
                    Arg::new("prompt")
                        .long("prompt")
                        .required(true)
                        .help("Prompt text"),
                ),
        )
        .subcommand(Command::new("overlay").about("List overlay modules"))
        .subcommand(
            Command::new("merge")
                .about("Merge a generated file set with the overlay")
                .arg(
                    Arg::new("files")
                        .long("files")
                        .required(true)
                        .help("Generated file set JSON"),
                ),
        )
        .subcommand(
            Command::new("preview")
                .about("Run the full mount pipeline against a dry-run sandbox")
                .arg(
                    Arg::new("prompt")
                        .long("prompt")
                        .required(true)
                        .help("Prompt text"),
                )
                .arg(
                    Arg::new("files")
                        .long("files")
                        .conflicts_with("endpoint")
                        .help("Serve this generated file set JSON instead of calling a generator"),
                )
                .arg(
                    Arg::new("endpoint")
                        .long("endpoint")
                        .help("Generator endpoint URL"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<PreviewConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => Ok(PreviewConfig::load(path)?),
        None => Ok(PreviewConfig::default().with_env_overrides()),
    }
}

fn read_file_set(path: &str) -> anyhow::Result<FileSetGenerator> {
    let text = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read {path}"))?;
    Ok(FileSetGenerator::from_json(&text)?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("check", args)) => {
            let prompt = args.get_one::<String>("prompt").map_or("", String::as_str);
            let gate = spg_moderation::SafetyGate::new(config.moderation.build_catalog()?);
            let verdict = gate.validate_prompt(prompt);
            let output = serde_json::json!({
                "safe": verdict.safe,
                "sanitized": verdict.sanitized,
                "flags": verdict.flags(),
                "warning": verdict.warning(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            if !verdict.safe {
                std::process::exit(1);
            }
        }
        Some(("overlay", _)) => {
            let overlay = spg_overlay::Overlay::from_config(&config.overlay)?;
            for file in overlay.files() {
                let marker = if overlay.is_protected(&file.path) {
                    "protected"
                } else {
                    "fallback"
                };
                println!("{:<10} {}", marker, file.path);
            }
        }
        Some(("merge", args)) => {
            let path = args.get_one::<String>("files").map_or("", String::as_str);
            let generated = read_file_set(path)?.into_files();
            let overlay = spg_overlay::Overlay::from_config(&config.overlay)?;
            let outcome = merge(&generated, &overlay);
            let output = serde_json::json!({
                "fingerprint": outcome.files.fingerprint().to_string(),
                "shadowed": outcome.shadowed,
                "files": outcome.files,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Some(("preview", args)) => {
            let prompt = args.get_one::<String>("prompt").map_or("", String::as_str);
            let generator: Arc<dyn Generator> = match (
                args.get_one::<String>("files"),
                args.get_one::<String>("endpoint")
                    .or(config.generator_endpoint.as_ref()),
            ) {
                (Some(files), _) => Arc::new(read_file_set(files)?),
                (None, Some(endpoint)) => {
                    Arc::new(HttpGenerator::new(endpoint, config.generation_timeout())?)
                }
                (None, None) => bail!("no generator: pass --files or --endpoint"),
            };
            let sandboxes = Arc::new(DryRunSandboxFactory::new(config.entry_module.clone()));
            let runtime = PreviewRuntime::builder(config, generator, sandboxes).build()?;

            let handle = match runtime.mount(prompt).await {
                Ok(handle) => handle,
                Err(PreviewError::ModerationBlocked { category, message }) => {
                    eprintln!("blocked ({category}): {message}");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            };

            let merged = runtime.merged(handle)?;
            println!("Preview {handle}");
            println!("  Files: {}", merged.len());
            println!("  Fingerprint: {}", merged.fingerprint());
            for path in merged.paths_with(Provenance::OverlayProtected) {
                println!("  Protected: {path}");
            }
            println!("  Boundary: {}", runtime.snapshot(handle)?.state);
            if let Some(fault) = runtime.snapshot(handle)?.last_fault {
                println!("  Fault: {fault}");
            }

            let report = runtime.unmount(handle)?;
            println!(
                "  Released: {} modules, {} timers, {} listeners",
                report.modules, report.timers, report.listeners
            );
        }
        _ => {}
    }

    Ok(())
}
