//! Modeller CLI - drive an Emme Modeller engine from the command line.

mod colors;
mod output;
mod params;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use modeller_bridge::{DisplayWrapper, EngineConfig, ModellerController};

#[derive(Parser)]
#[command(name = "modeller")]
#[command(about = "Run Emme Modeller tools through the modeller bridge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    engine: EngineArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// Emme project file (*.emp)
    #[arg(short, long, global = true, env = "MODELLER_PROJECT")]
    project: Option<PathBuf>,

    /// User initials passed to the engine
    #[arg(long, global = true, default_value = "XTMF")]
    user: String,

    /// Enable the engine's performance analysis
    #[arg(long, global = true)]
    performance: bool,

    /// Secondary databank to open
    #[arg(long, global = true)]
    databank: Option<String>,

    /// Emme installation directory (defaults to $EMMEPATH)
    #[arg(long, global = true)]
    emme_path: Option<PathBuf>,

    /// Path to ModellerBridge.py
    #[arg(long, global = true)]
    script: Option<PathBuf>,

    /// Launch the engine without a virtual display
    #[arg(long, global = true)]
    no_display_wrapper: bool,
}

impl EngineArgs {
    fn config(&self) -> anyhow::Result<EngineConfig> {
        let Some(project) = &self.project else {
            anyhow::bail!("No project file given (use --project or MODELLER_PROJECT)");
        };
        let mut config = EngineConfig::new(project)
            .with_user_initials(&self.user)
            .with_performance_analysis(self.performance);
        if let Some(databank) = &self.databank {
            config = config.with_databank(databank);
        }
        if let Some(dir) = &self.emme_path {
            config = config.with_installation_dir(dir);
        }
        if let Some(script) = &self.script {
            config = config.with_bridge_script(script);
        }
        if self.no_display_wrapper {
            config = config.with_display_wrapper(DisplayWrapper::None);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tool with a single argument string
    Run {
        /// Tool namespace (e.g. tmg.assignment.road)
        tool: String,

        /// Argument string passed verbatim to the tool
        #[arg(default_value = "")]
        args: String,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a tool with named parameters
    RunParams {
        /// Tool namespace
        tool: String,

        /// Parameter as name=value (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// JSON file with an array of {"name", "value"} objects
        #[arg(long)]
        params_file: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a tool namespace exists
    Exists {
        /// Tool namespace
        namespace: String,
    },

    /// Clear the modeller logbook
    CleanLog,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format bridge errors with recovery hints
    let format_error = |err: modeller_bridge::Error| -> anyhow::Error {
        anyhow::anyhow!("{}", err.with_hint())
    };

    // Parameters are read before the engine starts so bad input fails fast
    let parameters = match &cli.command {
        Commands::RunParams {
            params,
            params_file,
            ..
        } => Some(params::collect(params, params_file.as_deref())?),
        _ => None,
    };

    let config = cli.engine.config()?;
    let controller = ModellerController::launch(&config).map_err(format_error)?;
    controller.set_message_sink(output::StdoutSink);

    match cli.command {
        Commands::Run { tool, args, json } => {
            let mut progress = output::ProgressBar::new(&tool);
            let result = controller.run(&tool, &args, Some(&mut |p: f32| progress.update(p)));
            progress.finish();
            output::report(result, json).map_err(format_error)?;
        }

        Commands::RunParams { tool, json, .. } => {
            let parameters = parameters.unwrap_or_default();
            let mut progress = output::ProgressBar::new(&tool);
            let result = controller.run_with_parameters(
                &tool,
                &parameters,
                Some(&mut |p: f32| progress.update(p)),
            );
            progress.finish();
            output::report(result, json).map_err(format_error)?;
        }

        Commands::Exists { namespace } => {
            let exists = controller.namespace_exists(&namespace).map_err(format_error)?;
            println!("{}", exists);
            controller.dispose();
            if !exists {
                std::process::exit(1);
            }
        }

        Commands::CleanLog => {
            controller.clean_log().map_err(format_error)?;
            eprintln!("{}Logbook cleaned{}", colors::GREEN, colors::RESET);
        }
    }

    controller.dispose();
    Ok(())
}
