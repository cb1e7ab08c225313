mod bootstrap;
mod loop_runner;
mod replay;

pub(crate) use bootstrap::{build_app, init_tracing, parse_args, usage_text, CliCommand};
pub(crate) use loop_runner::run;
