//! Repro launcher (C8): single-commit resolve/compile-if-needed/cache/
//! extract/launch path used by non-bisect commands.

use crate::bundle::store::ArtifactStore;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::vcs::Vcs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The terminal collaborator's sub-window launch contract. The core never
/// couples to ANSI specifics; it only asks for a command to run in a
/// titled, row-bounded sub-window, optionally swallowing further interrupts
/// so the user can exit a hung binary without exiting the session.
pub trait Terminal {
    fn execute_in_subwindow(
        &self,
        command: &[String],
        title: &str,
        rows: u16,
        swallow_signal: bool,
        cwd: &Path,
    ) -> Result<bool>;
}

/// Invokes the build (C5) for a single commit outside of an orchestrated
/// range, used when `launch` needs to compile on demand.
pub trait Compile {
    fn compile_uncached(&self, commit: &str) -> Result<bool>;
    fn produced_binary(&self, binary_name: &str) -> Option<PathBuf>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    NotLaunched,
    InvalidRef(String),
    NotCached(String),
    CompileFailed(String),
}

/// Resolves `reference`, compiling it if it isn't already cached (unless
/// `cache_only`), then extracts and launches it. `discard` skips caching the
/// freshly compiled binary into the store, launching straight out of the
/// live workspace instead. Returns `Ok` with the outcome even on compile
/// failure — that is caller-visible state, not a process exit.
#[instrument(skip(vcs, store, compile, terminal, present_versions))]
pub fn launch(
    reference: &str,
    execution_parameters: &str,
    present_versions: &mut HashSet<String>,
    discard: bool,
    cache_only: bool,
    working_directory: &Path,
    config: &Configuration,
    vcs: &Vcs,
    store: &ArtifactStore,
    compile: &dyn Compile,
    terminal: &dyn Terminal,
) -> Result<LaunchOutcome> {
    let Some(commit) = vcs.resolve(reference) else {
        return Ok(LaunchOutcome::InvalidRef(reference.to_string()));
    };

    if !present_versions.contains(&commit) {
        if cache_only {
            return Ok(LaunchOutcome::NotCached(commit));
        }
        if !compile.compile_uncached(&commit)? {
            return Ok(LaunchOutcome::CompileFailed(commit));
        }
        if discard {
            let Some(binary) = compile.produced_binary(&config.binary_name) else {
                return Ok(LaunchOutcome::CompileFailed(commit));
            };
            return launch_binary(&binary, execution_parameters, working_directory, config, terminal);
        }
        let dest = store.version_path(&commit);
        std::fs::create_dir_all(&dest)?;
        if let Some(binary) = compile.produced_binary(&config.binary_name) {
            std::fs::copy(&binary, dest.join(binary.file_name().unwrap_or_default()))?;
        }
        present_versions.insert(commit.clone());
    }

    launch_cached(&commit, execution_parameters, working_directory, config, store, terminal)
}

fn launch_cached(
    commit: &str,
    execution_parameters: &str,
    working_directory: &Path,
    config: &Configuration,
    store: &ArtifactStore,
    terminal: &dyn Terminal,
) -> Result<LaunchOutcome> {
    store.extract(commit, None).map_err(|_| Error::bundle_missing(commit, "<unknown>"))?;
    let binary = find_executable(&store.version_path(commit), &config.binary_name)
        .ok_or_else(|| Error::bundle_missing(commit, "<no executable>"))?;
    launch_binary(&binary, execution_parameters, working_directory, config, terminal)
}

fn launch_binary(
    binary: &Path,
    execution_parameters: &str,
    working_directory: &Path,
    config: &Configuration,
    terminal: &dyn Terminal,
) -> Result<LaunchOutcome> {
    let binary = binary.canonicalize().unwrap_or_else(|_| binary.to_path_buf());
    let mut command = vec![binary.to_string_lossy().into_owned()];
    command.extend(shell_split(execution_parameters));
    let launched = terminal.execute_in_subwindow(&command, "session", config.subwindow_rows, true, working_directory)?;
    Ok(if launched { LaunchOutcome::Launched } else { LaunchOutcome::NotLaunched })
}

/// Finds the binary directly under `base`, falling back to a recursive
/// search for any file whose path contains `binary_name` as a component.
fn find_executable(base: &Path, binary_name: &str) -> Option<PathBuf> {
    let direct = base.join(binary_name);
    if direct.exists() {
        return Some(direct);
    }
    walkdir::WalkDir::new(base)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy().contains(binary_name))
        .map(|e| e.path().to_path_buf())
}

fn shell_split(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTerminal {
        called: std::cell::Cell<bool>,
    }

    impl Terminal for FakeTerminal {
        fn execute_in_subwindow(&self, _command: &[String], _title: &str, _rows: u16, _swallow: bool, _cwd: &Path) -> Result<bool> {
            self.called.set(true);
            Ok(true)
        }
    }

    #[test]
    fn find_executable_direct_hit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("game"), "x").unwrap();
        let found = find_executable(tmp.path(), "game");
        assert_eq!(found, Some(tmp.path().join("game")));
    }

    #[test]
    fn find_executable_recurses() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        std::fs::write(tmp.path().join("bin").join("game.x86_64"), "x").unwrap();
        let found = find_executable(tmp.path(), "game.x86_64");
        assert!(found.is_some());
    }

    #[test]
    fn shell_split_handles_flags() {
        assert_eq!(shell_split("--flag value"), vec!["--flag".to_string(), "value".to_string()]);
    }
}
