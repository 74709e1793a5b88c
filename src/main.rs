use anyhow::Context as _;
use clap::Parser;
use stache::tpl::FilesystemLoader;
use stache::{Engine, EngineOptions};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

/// Render a Mustache template to stdout.
#[derive(Parser, Debug)]
#[command(name = "stache", version)]
struct Args {
    /// Template file to render.
    template: PathBuf,

    /// JSON file with the data to render against.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Directory holding `<name>.mustache` partials.
    #[arg(long)]
    partials: Option<PathBuf>,

    /// Pragma enabled for every template, e.g. FILTERS. Repeatable.
    #[arg(long = "pragma", value_name = "NAME")]
    pragmas: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let source = fs::read_to_string(&args.template)
        .with_context(|| format!("reading template {}", args.template.display()))?;

    let data: serde_json::Value = match &args.data {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading data {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing data {}", path.display()))?
        }
        None => serde_json::Value::Null,
    };

    let mut options = EngineOptions::new().pragmas(&args.pragmas);
    if let Some(dir) = &args.partials {
        options = options.partials_loader(FilesystemLoader::new(dir)?);
    }
    let engine = Engine::new(options)?;

    print!("{}", engine.render(&source, &data)?);
    Ok(())
}
