use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use nvtool_bag::msg::MsgCatalog;
use nvtool_bag::{codec, render, NvBag};
use nvtool_host::{FatalPolicy, ScriptHost};

#[derive(Parser)]
#[command(name = "nvtool")]
#[command(about = "Build fault-report property-bag fixtures from scripts.", long_about = None)]
struct Cli {
    /// Script fragment to run; repeatable, executed in the order given.
    #[arg(short = 'e', long = "script", value_name = "SCRIPT")]
    script: Vec<String>,

    /// Load the initial bag from a binary-encoded file instead of starting
    /// empty.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,

    /// Render the bag as JSON instead of the plain text dump.
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Decode the named templated field and print only the resolved string.
    #[arg(short = 'g', long = "get-field", value_name = "FIELD", requires = "catalog")]
    get_field: Option<String>,

    /// JSON message-catalog file used by -g.
    #[arg(short = 'm', long = "catalog", value_name = "FILE")]
    catalog: Option<PathBuf>,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("nvtool: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let bag = match &cli.input {
        Some(path) => load_bag(path)?,
        None => NvBag::new(),
    };

    let mut host = ScriptHost::new(bag)?;
    host.run_scripts(&cli.script, FatalPolicy::Propagate)?;
    let bag = host.into_bag()?;

    if let Some(field) = &cli.get_field {
        let path = cli
            .catalog
            .as_ref()
            .context("-g requires a message catalog (-m FILE)")?;
        let catalog = MsgCatalog::load(path)?;
        let resolved = catalog.decode(&bag, field)?;
        println!("{resolved}");
    } else if cli.json {
        println!("{}", render::render_json(&bag));
    } else {
        print!("{}", render::render_text(&bag));
    }

    Ok(ExitCode::SUCCESS)
}

fn load_bag(path: &Path) -> Result<NvBag> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("stat input: {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("input is not a regular file: {}", path.display());
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("read input: {}", path.display()))?;
    codec::from_bytes(&bytes).with_context(|| format!("parse input: {}", path.display()))
}
