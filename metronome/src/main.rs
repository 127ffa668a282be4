//! Entrypoint of the metronome binary
use dotenvy::dotenv;
use metronome_clap_blocks::{logging::LoggingConfig, tokio::TokioIoConfig};

mod commands {
    pub(crate) mod common;
    pub(crate) mod fetch;
    pub(crate) mod find;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "metronome",
    version,
    about = "Browse and fetch Metronome metrics the way Graphite sees them",
    long_about = r#"Browse and fetch Metronome metrics the way Graphite sees them

Examples:
    # List the servers below the PowerDNS view tree
    metronome find --metronome-url http://metronome:8000/ '_pdns_view.auth.*'

    # Fetch the last 6 hours of query rates for two servers
    metronome fetch --metronome-url http://metronome:8000/ --range 6h \
        pdns.ns1.auth.udp-queries_dt pdns.ns2.auth.udp-queries_dt

    # Same, with debug logging of every backend request
    METRONOME_URL=http://metronome:8000/ metronome fetch -vv pdns.ns1.auth.udp-queries
"#
)]
struct Config {
    #[clap(flatten)]
    runtime_config: TokioIoConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// List the metric tree nodes matching a Graphite path pattern
    Find(commands::find::Config),

    /// Fetch the series of one or more metric paths as JSON
    Fetch(commands::fetch::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = config.runtime_config.builder()?.build()?;

    tokio_runtime.block_on(async move {
        fn handle_init_logs(config: &LoggingConfig) {
            if let Err(e) = config.install_global_subscriber("info") {
                eprintln!("Initializing logs failed: {e}");
                std::process::exit(ReturnCode::Failure as _);
            }
        }

        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Find(config)) => {
                handle_init_logs(&config.common.logging);
                if let Err(e) = commands::find::command(config).await {
                    eprintln!("Find command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Fetch(config)) => {
                handle_init_logs(&config.common.logging);
                if let Err(e) = commands::fetch::command(config).await {
                    eprintln!("Fetch command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is not an error, clap applies the defaults
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}
