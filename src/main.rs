use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use wolfram_bridge::{
    bridge::Bridge,
    cli::{Cli, Command},
    config::Config,
    engine::EngineMode,
    server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let default_level = if matches!(args.command, Command::Serve) { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = Config::load();
    // CLI flags outrank config; applied directly rather than through the
    // environment, which is not safe to mutate once worker threads run.
    let use_kernel = args.use_kernel || cfg.use_kernel();
    let (executable, mode) = if use_kernel {
        (
            args.kernel_path.clone().map(PathBuf::from).unwrap_or_else(|| cfg.kernel_path()),
            EngineMode::Kernel,
        )
    } else {
        (
            args.script_path.clone().map(PathBuf::from).unwrap_or_else(|| cfg.script_path()),
            EngineMode::Script,
        )
    };
    let bridge = Bridge::from_config(&cfg).with_executable(executable, mode);

    match args.command {
        Command::Serve => server::run(bridge).await,
        Command::TestConnection => match bridge.test_connection().await {
            Ok(out) => {
                println!("Wolfram Language connected");
                println!("{}", out.text);
                println!("Executable: {}", bridge.executable().display());
                Ok(())
            }
            Err(err) => {
                eprintln!("Connection failed ({}): {}", err.kind().as_str(), err);
                eprintln!("Executable: {}", bridge.executable().display());
                std::process::exit(1);
            }
        },
        _ => {
            // to_request is Some for every non-serve subcommand
            let request = args
                .to_request()
                .ok_or_else(|| anyhow::anyhow!("subcommand produced no tool request"))?;
            match bridge.dispatch(request).await {
                Ok(out) => {
                    println!("{}", out.text);
                    Ok(())
                }
                Err(err) => {
                    eprintln!("error ({}): {}", err.kind().as_str(), err);
                    std::process::exit(1);
                }
            }
        }
    }
}
