//! Implementation of command line option for listing metric tree nodes
use super::common::MetronomeCommandConfig;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Common(#[from] super::common::Error),

    #[error(transparent)]
    Finder(#[from] metronome_finder::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    pub(crate) common: MetronomeCommandConfig,

    /// The Graphite path pattern, e.g. `pdns.*.auth.{udp,tcp}-queries`
    #[clap(required = true)]
    pattern: String,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let finder = config.common.finder()?;

    for node in finder.find(&config.pattern).await? {
        let kind = if node.is_leaf() { "leaf" } else { "branch" };
        println!("{} {kind}", node.path());
    }

    Ok(())
}
