//! CLI for Rise Scout infrastructure synthesis.
//!
//! Pipeline: resolve layer deps -> declare network/data -> package -> declare compute -> validate -> write.

use clap::{Args, Parser, Subcommand, ValueEnum};
use scout_core::env::{DEFAULT_ENVIRONMENT, DEFAULT_REGION};
use scout_core::{units, ScoutError};
use scout_packager::container::{DEFAULT_BUNDLING_IMAGE, DEFAULT_ENGINE};
use scout_packager::{DependencyResolver, LockfileResolver, Packager, UvCompileResolver};
use scout_synth::reporter::Report;
use scout_synth::sink::assembly::write_assembly;
use scout_synth::sink::json_stream::JsonStreamSink;
use scout_synth::sink::resource_rows;
use scout_synth::{DeployTarget, Orchestrator, PassConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "scout-infra", version, about = "Rise Scout infrastructure synthesizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a full pass and write the assembly.
    Synth {
        #[command(flatten)]
        pass: PassArgs,

        /// Print the manifest as JSON instead of the plan report.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Also write NDJSON resource rows; "-" for stdout.
        #[arg(long)]
        rows: Option<String>,
    },
    /// Print the pinned layer requirements.
    Resolve {
        #[command(flatten)]
        pass: PassArgs,
    },
    /// Package one function unit into the output directory.
    Package {
        #[command(flatten)]
        pass: PassArgs,

        /// Logical unit name, e.g. `score-decay`.
        #[arg(long)]
        unit: String,
    },
}

#[derive(Args, Debug)]
struct PassArgs {
    /// Environment name; `prod` selects the production tier.
    #[arg(short, long, env = "RISE_SCOUT_ENV", default_value = DEFAULT_ENVIRONMENT)]
    env: String,

    /// Target account; defaults to the deploying credentials' account.
    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    account: Option<String>,

    #[arg(long, env = "CDK_DEFAULT_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Root of the application source tree.
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Dependency manifest, relative to the project root.
    #[arg(long, default_value = "pyproject.toml")]
    manifest: PathBuf,

    /// Staging directory; relative paths are under the project root.
    #[arg(short, long, default_value = "cdk.out")]
    out: PathBuf,

    #[arg(long, default_value = DEFAULT_BUNDLING_IMAGE)]
    bundling_image: String,

    #[arg(long, default_value = DEFAULT_ENGINE)]
    container_engine: String,

    #[arg(long, value_enum, default_value_t = ResolverKind::Lock)]
    resolver: ResolverKind,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResolverKind {
    /// Read the committed `uv.lock`.
    Lock,
    /// Run `uv pip compile`.
    Uv,
}

impl PassArgs {
    fn config(&self) -> PassConfig {
        let mut config = PassConfig::new(
            Some(self.env.clone()),
            DeployTarget::new(self.account.clone(), self.region.clone()),
            self.project_root.clone(),
        );
        config.manifest = self.manifest.clone();
        config.out_dir = self.project_root.join(&self.out);
        config
    }

    fn packager(&self, config: &PassConfig) -> Packager {
        Packager::with_defaults(&config.out_dir, self.bundling_image.as_str(), self.container_engine.as_str())
    }

    fn orchestrator(&self) -> Orchestrator {
        let config = self.config();
        let packager = self.packager(&config);
        match self.resolver {
            ResolverKind::Lock => Orchestrator::new(config, LockfileResolver::new(), packager),
            ResolverKind::Uv => Orchestrator::new(config, UvCompileResolver::default(), packager),
        }
    }

    fn resolver(&self) -> Box<dyn DependencyResolver> {
        match self.resolver {
            ResolverKind::Lock => Box::new(LockfileResolver::new()),
            ResolverKind::Uv => Box::new(UvCompileResolver::default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { pass, json, rows } => {
            let orchestrator = pass.orchestrator();
            let out_dir = orchestrator.config().out_dir.clone();
            tracing::info!(env = %pass.env, resolver = orchestrator.resolver_name(), out = %out_dir.display(), "synth");

            let synthesis = orchestrator.run_blocking().await?;
            write_assembly(&synthesis.assembly, &out_dir)?;

            if let Some(ref target) = rows {
                let rows = resource_rows(synthesis.environment.name(), &synthesis.assembly)?;
                if target == "-" {
                    let mut sink = JsonStreamSink::stdout();
                    sink.write_rows(&rows)?;
                    let n = sink.finish()?;
                    tracing::info!(rows = n, "ndjson rows: wrote to stdout");
                } else {
                    let file = std::fs::File::create(target)?;
                    let mut sink = JsonStreamSink::new(file);
                    sink.write_rows(&rows)?;
                    let n = sink.finish()?;
                    tracing::info!(rows = n, path = %target, "ndjson rows: wrote to file");
                }
            }

            let report = Report::build(&synthesis);
            if json {
                println!("{}", serde_json::to_string_pretty(&synthesis.assembly.manifest()?)?);
            } else if rows.as_deref() == Some("-") {
                // Keep stdout clean for the rows.
                eprint!("{}", report.render());
            } else {
                print!("{}", report.render());
            }
        }

        Commands::Resolve { pass } => {
            let config = pass.config();
            let resolver = pass.resolver();
            let manifest = config.manifest_path();
            let pinned = tokio::task::spawn_blocking(move || resolver.resolve(&manifest))
                .await
                .map_err(|e| ScoutError::Internal(format!("spawn_blocking panicked: {e}")))??;
            for requirement in &pinned {
                println!("{requirement}");
            }
        }

        Commands::Package { pass, unit } => {
            let unit = units::lookup(&unit).ok_or_else(|| {
                let known: Vec<&str> = units::ALL.iter().map(|u| u.logical_name).collect();
                ScoutError::InvalidInput(format!("unknown unit {unit:?}; expected one of {known:?}"))
            })?;
            let config = pass.config();
            let packager = pass.packager(&config);
            let project_root = config.project_root.clone();
            let artifact = tokio::task::spawn_blocking(move || packager.package(&project_root, unit))
                .await
                .map_err(|e| ScoutError::Internal(format!("spawn_blocking panicked: {e}")))??;
            println!(
                "{}\t{}\t{}",
                artifact.unit,
                artifact.strategy,
                artifact.output_directory.display()
            );
        }
    }

    Ok(())
}
