//! Tracing subscriber setup for hosts embedding the synchronizer.

use tracing_subscriber::{EnvFilter, filter::Directive};

use crate::config::Config;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` plus `directive`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(directive: &str) -> bool {
   let filter = match directive.parse::<Directive>() {
      Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
      Err(e) => {
         eprintln!("invalid log filter '{directive}': {e}");
         EnvFilter::from_default_env()
      },
   };

   tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_target(false)
      .try_init()
      .is_ok()
}

pub fn init_from_config(config: &Config) -> bool {
   init(&config.log_filter)
}
