//! Thin CLI glue (SPEC_FULL §1 Non-goals: "thin CLIs... are explicitly out
//! of scope" — this crate exists only so the workspace produces a runnable
//! binary exercising `helm-core`/`helm-planner`/`helm-providers`; it is not
//! a deliverable surface in its own right).

pub mod cli_args;
pub mod commands;
pub mod ui_writer_impl;

pub use cli_args::Cli;
