use clap::Parser;
use quire::{QuireError, SessionBuilder};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Compile a LuaLaTeX document in a sandboxed session.
#[derive(Parser, Debug)]
#[command(name = "quire", version)]
#[command(about = "Compile a LuaLaTeX document in a sandboxed session")]
struct Cli {
    /// Source document. The built-in sample is compiled when omitted.
    input: Option<PathBuf>,

    /// Where to save the rendered PDF
    #[arg(short, long, default_value = "output.pdf")]
    output: PathBuf,

    /// Style file to stage next to the source (repeatable)
    #[arg(short = 's', long = "style", value_name = "FILE")]
    styles: Vec<PathBuf>,

    /// Engine program run on the host
    #[arg(long, default_value = "lualatex", env = "QUIRE_ENGINE")]
    engine: PathBuf,

    /// Directory holding lualatex.fmt
    #[arg(long, value_name = "DIR", default_value = ".", env = "QUIRE_ASSETS")]
    assets: PathBuf,

    /// texmf tree copied to /texmf in every sandbox
    #[arg(long, value_name = "DIR", env = "QUIRE_TEXMF")]
    texmf: Option<PathBuf>,

    /// Build version tagged onto fetched resources (default: current time)
    #[arg(long)]
    build: Option<String>,

    /// Directory caching format blobs per build version
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Print a JSON summary instead of the log
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    status: &'a str,
    meta: &'a str,
    output: Option<String>,
    log: Vec<&'a str>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

async fn run(cli: Cli) -> Result<bool, QuireError> {
    let mut builder = SessionBuilder::new()
        .with_host_engine(&cli.engine, cli.texmf.as_deref())
        .with_asset_dir(&cli.assets);
    if let Some(build) = &cli.build {
        builder = builder.with_build_id(build.clone());
    }
    if let Some(dir) = &cli.cache_dir {
        builder = builder.with_format_cache_dir(dir);
    }
    let mut controller = builder.start()?;

    if let Some(input) = &cli.input {
        controller.load_source_from_file(input).await?;
    }
    if !cli.styles.is_empty() {
        controller.add_style_files(&cli.styles).await?;
    }

    controller.run_compile();
    controller.wait_idle().await;

    let succeeded = controller.active_output().is_some() && controller.status() == "done";
    let saved = if succeeded {
        controller.save_output(&cli.output).await?;
        Some(cli.output.display().to_string())
    } else {
        None
    };

    if cli.json {
        let summary = Summary {
            status: controller.status(),
            meta: controller.meta(),
            output: saved.clone(),
            log: controller.log().lines().collect(),
        };
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|e| QuireError::Config(format!("cannot render summary: {}", e)))?;
        println!("{}", rendered);
    } else {
        for line in controller.log().lines() {
            println!("{}", line);
        }
        println!("status: {}", controller.status());
        if let Some(path) = &saved {
            println!("{} saved to {}", controller.meta(), path);
        }
    }

    controller.shutdown().await;
    Ok(succeeded)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
