//! VCS adapter (C1).
//!
//! Reflects the underlying `git` CLI's operations one-to-one; no
//! commit-graph traversal is reimplemented in-process, only output parsing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

/// Shells out to `git -C <workspace>` and memoizes the calls whose results
/// are stable for the lifetime of a resolved ref (`resolve`, `commit_time`,
/// and the short-name/short-log display helpers).
///
/// The memo tables are owned by the instance, not process-global statics:
/// a fresh adapter starts cold, and tests can construct independent adapters
/// without sharing state.
pub struct Vcs {
    workspace: PathBuf,
    resolve_cache: Mutex<HashMap<String, Option<String>>>,
    commit_time_cache: Mutex<HashMap<String, i64>>,
    short_name_cache: Mutex<HashMap<String, String>>,
}

impl Vcs {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            resolve_cache: Mutex::new(HashMap::new()),
            commit_time_cache: Mutex::new(HashMap::new()),
            short_name_cache: Mutex::new(HashMap::new()),
        }
    }

    fn git_output(&self, args: &[&str]) -> String {
        let output = Command::new("git").arg("-C").arg(&self.workspace).args(args).output();
        let Ok(output) = output else {
            return String::new();
        };
        if !output.status.success() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            text[1..text.len() - 1].to_string()
        } else {
            text
        }
    }

    /// Resolves a ref (branch, tag, `HEAD`, abbreviation) to a commit ID.
    /// `None` means "unresolvable" — a recoverable condition, not an error.
    #[instrument(skip(self))]
    pub fn resolve(&self, ref_str: &str) -> Option<String> {
        if let Some(cached) = self.resolve_cache.lock().unwrap().get(ref_str) {
            return cached.clone();
        }
        let resolved = self.git_output(&["rev-parse", "--revs-only", ref_str]);
        let result = if resolved.is_empty() { None } else { Some(resolved) };
        self.resolve_cache.lock().unwrap().insert(ref_str.to_string(), result.clone());
        result
    }

    pub fn commit_time(&self, commit: &str) -> i64 {
        if let Some(&cached) = self.commit_time_cache.lock().unwrap().get(commit) {
            return cached;
        }
        let output = self.git_output(&["show", "-s", "--format=%ct", commit]);
        let time = output.parse().unwrap_or(-1);
        self.commit_time_cache.lock().unwrap().insert(commit.to_string(), time);
        time
    }

    pub fn commit_times(&self, commits: &[String]) -> HashMap<String, i64> {
        let mut result = HashMap::new();
        let mut missing = Vec::new();
        {
            let cache = self.commit_time_cache.lock().unwrap();
            for commit in commits {
                match cache.get(commit) {
                    Some(&time) => {
                        result.insert(commit.clone(), time);
                    }
                    None => missing.push(commit.clone()),
                }
            }
        }
        if missing.is_empty() {
            return result;
        }
        let mut args = vec!["show", "-s", "--format=%ct"];
        args.extend(missing.iter().map(String::as_str));
        let output = self.git_output(&args);
        let times: Vec<i64> = output.split_whitespace().filter_map(|s| s.parse().ok()).collect();
        if times.len() == missing.len() {
            let mut cache = self.commit_time_cache.lock().unwrap();
            for (commit, time) in missing.into_iter().zip(times) {
                cache.insert(commit.clone(), time);
                result.insert(commit, time);
            }
        }
        result
    }

    /// Reverse rev-list (parent-first order) between `start` and `end`.
    #[instrument(skip(self))]
    pub fn rev_list(
        &self,
        start: &str,
        end: &str,
        path_spec: Option<&str>,
        before: Option<i64>,
    ) -> Vec<String> {
        let range = format!("{start}..{end}");
        let mut args = vec!["rev-list", "--reverse", range.as_str()];
        let before_arg;
        if let Some(before) = before {
            before_arg = format!("--before={before}");
            args.push(&before_arg);
        }
        if let Some(path_spec) = path_spec.filter(|s| !s.is_empty()) {
            args.push("--");
            args.push(path_spec);
        }
        let output = self.git_output(&args);
        output.split_whitespace().map(str::to_string).collect()
    }

    /// The `rev-list --bisect-all` candidate set, best-first.
    #[instrument(skip(self, goods, bads))]
    pub fn bisect_candidates(
        &self,
        goods: &[String],
        bads: &[String],
        path_spec: Option<&str>,
        before: Option<i64>,
    ) -> Vec<String> {
        let mut args = vec!["rev-list".to_string(), "--bisect-all".to_string()];
        args.extend(goods.iter().map(|c| format!("^{c}")));
        args.extend(bads.iter().cloned());
        if let Some(before) = before {
            args.push(format!("--before={before}"));
        }
        if let Some(path_spec) = path_spec.filter(|s| !s.is_empty()) {
            args.push("--".to_string());
            args.push(path_spec.to_string());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.git_output(&args);
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }

    pub fn is_ancestor(&self, possible_ancestor: &str, commit: &str) -> bool {
        !self.rev_list(possible_ancestor, commit, None, None).is_empty()
    }

    pub fn tags(&self) -> Vec<String> {
        self.git_output(&["tag", "-l"]).lines().map(str::trim).map(str::to_string).collect()
    }

    pub fn checkout(&self, rev: &str) {
        self.git_output(&["checkout", "-q", rev]);
    }

    pub fn fetch(&self) {
        self.git_output(&["fetch", "--tags", "--prune", "origin"]);
    }

    pub fn has_local_changes(&self) -> bool {
        !self.git_output(&["add", "-An"]).trim().is_empty()
    }

    pub fn clear_local_changes(&self) {
        self.git_output(&["reset", "--hard", "HEAD"]);
        self.git_output(&["clean", "-df"]);
    }

    /// Abbreviated hash, e.g. `a1b2c3d`.
    pub fn short_name(&self, commit: &str) -> String {
        if self.resolve(commit).is_none() {
            return commit.to_string();
        }
        if let Some(cached) = self.short_name_cache.lock().unwrap().get(commit) {
            return cached.clone();
        }
        let short = self.git_output(&["log", "--pretty=format:%h", commit, "-n", "1", "--abbrev-commit"]);
        self.short_name_cache.lock().unwrap().insert(commit.to_string(), short.clone());
        short
    }

    /// Abbreviated hash plus the subject line, e.g. `a1b2c3d fix off-by-one`.
    pub fn short_log(&self, commit: &str) -> String {
        let subject = self.git_output(&["log", "--pretty=format:%s", commit, "-n", "1", "--abbrev-commit"]);
        format!("{} {subject}", self.short_name(commit))
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_start_empty() {
        let vcs = Vcs::new(".");
        assert!(vcs.resolve_cache.lock().unwrap().is_empty());
        assert!(vcs.commit_time_cache.lock().unwrap().is_empty());
    }
}
