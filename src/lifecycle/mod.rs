//! Process and loop lifecycle: OS shutdown signals and cooperative stop tokens

mod shutdown;
mod stop;

pub use shutdown::ShutdownSignal;
pub use stop::StopToken;
