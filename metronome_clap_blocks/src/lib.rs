//! Configuration blocks shared by the `metronome` CLI commands
pub mod logging;
pub mod metronome;
pub mod tokio;
