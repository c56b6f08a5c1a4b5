//! `cargo run -p architecture-lint [AGENT_DIR]`
//!
//! Without an argument the agent crate is found next to this tool in the
//! workspace (`<workspace>/agent`).

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    let agent_dir = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_agent_dir);
    let Some(agent_dir) = agent_dir else {
        report("cannot find the agent crate; pass its directory as the first argument");
        return ExitCode::FAILURE;
    };

    match architecture_lint::lint_agent_sources(&agent_dir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

fn default_agent_dir() -> Option<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .map(|dir| dir.join("agent"))
        .find(|candidate| candidate.join("Cargo.toml").is_file())
}

fn report(message: &str) {
    let _ = writeln!(io::stderr().lock(), "{message}");
}
