use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use forma_api::Value;
use forma_engine::config::SchemaConfig;
use forma_engine::error::EngineError;
use forma_engine::registry::ModelRegistry;

#[derive(Parser)]
#[command(name = "forma", about = "Coerce JSON documents into schema models")]
struct Cli {
    /// Path to TOML schema file.
    #[arg(long, default_value = "models.toml", env = "FORMA_SCHEMA")]
    schema: String,

    /// Model to convert the document into.
    #[arg(long)]
    model: String,

    /// JSON input file. Reads stdin when omitted.
    input: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!(error = %e, model = %cli.model, "conversion failed");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<String, EngineError> {
    tracing::info!(schema = %cli.schema, "loading schema");
    let config = SchemaConfig::load(&cli.schema)?;
    let registry = ModelRegistry::build(&config)?;

    let text = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let input: serde_json::Value = serde_json::from_str(&text)?;

    let value = registry.convert(&cli.model, Value::from(input))?;
    Ok(serde_json::to_string_pretty(&value.to_json())?)
}
