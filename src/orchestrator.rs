//! Build orchestrator (C5): sequential compile loop, warm-up error
//! quarantine, periodic bundle flush, progress reporting.

use crate::bundle::store::ArtifactStore;
use crate::config::Configuration;
use crate::error::Result;
use crate::vcs::Vcs;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

const MIN_SUCCESSES: u32 = 3;

/// Result of compiling one commit.
pub enum CompileOutcome {
    Success,
    Failure,
}

/// Invokes the compile subprocess for the checked-out working tree.
/// Implemented by the terminal/compile collaborator; the orchestrator only
/// consumes its exit status.
pub trait Compiler {
    fn compile(&self, commit: &str, compiler_flags: &str) -> Result<CompileOutcome>;
    /// Path to the binary the compile step produced, if it succeeded.
    fn produced_binary(&self, binary_name: &str) -> Option<std::path::PathBuf>;
}

/// Per-invocation state for one `compile`/`update` call. The warm-up counter
/// and in-memory error accumulator live here, not in a process-global —
/// a fresh session is created per command.
pub struct CompileSession<'a> {
    vcs: &'a Vcs,
    store: &'a ArtifactStore,
    config: &'a Configuration,
    successes: u32,
    errors: Vec<String>,
    warm_up_cleared: bool,
    timings: Vec<Duration>,
}

pub struct ProgressSnapshot {
    pub index: usize,
    pub total: usize,
    pub average_time: Duration,
    pub remaining_time: Duration,
    pub error_count: usize,
}

impl<'a> CompileSession<'a> {
    pub fn new(vcs: &'a Vcs, store: &'a ArtifactStore, config: &'a Configuration) -> Self {
        Self { vcs, store, config, successes: 0, errors: Vec::new(), warm_up_cleared: false, timings: Vec::new() }
    }

    /// Refuses to proceed on local changes unless force-mode is on.
    pub fn handle_local_changes(&self) -> Result<bool> {
        if !self.vcs.has_local_changes() {
            return Ok(true);
        }
        if self.config.force {
            self.vcs.clear_local_changes();
            return Ok(true);
        }
        Ok(false)
    }

    #[instrument(skip(self, compiler, commits))]
    pub fn compile(
        &mut self,
        compiler: &dyn Compiler,
        commits: &[String],
        full_rev_list: &[String],
        should_compress: bool,
        fatal_compress: bool,
    ) -> Result<()> {
        for (index, commit) in commits.iter().enumerate() {
            if crate::signal::soft_killed() {
                break;
            }

            let started = Instant::now();
            self.vcs.checkout(commit);
            let outcome = compiler.compile(commit, &self.config.compiler_flags)?;
            self.timings.push(started.elapsed());

            match outcome {
                CompileOutcome::Success => {
                    if let Some(binary) = compiler.produced_binary(&self.config.binary_name) {
                        self.cache_binary(commit, &binary)?;
                    }
                    self.successes += 1;
                    self.maybe_clear_warm_up()?;
                }
                CompileOutcome::Failure => {
                    self.errors.push(commit.clone());
                    if self.warm_up_cleared {
                        self.store.add_error_commits(std::slice::from_ref(commit))?;
                    }
                }
            }

            self.report_progress(index, commits.len());

            if should_compress && self.successes > 0 && self.successes % (2 * self.config.compress_pack_size as u32) == 0 {
                if let Err(error) = self.flush_bundles(full_rev_list, false) {
                    if fatal_compress {
                        return Err(error);
                    }
                    warn!(%error, "bundle compression failed, continuing");
                }
            }
        }
        Ok(())
    }

    fn cache_binary(&self, commit: &str, binary: &Path) -> Result<()> {
        let dest = self.store.version_path(commit);
        std::fs::create_dir_all(&dest)?;
        let dest_binary = dest.join(binary.file_name().unwrap_or_default());
        std::fs::copy(binary, &dest_binary)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&dest_binary)?.permissions();
            perms.set_mode(perms.mode() | 0o111);
            std::fs::set_permissions(&dest_binary, perms)?;
        }
        Ok(())
    }

    /// Once `MIN_SUCCESSES` successes have elapsed, flush everything
    /// accumulated so far and persist subsequent errors eagerly.
    fn maybe_clear_warm_up(&mut self) -> Result<()> {
        if !self.warm_up_cleared && self.successes >= MIN_SUCCESSES {
            self.warm_up_cleared = true;
            if !self.errors.is_empty() {
                self.store.add_error_commits(&self.errors)?;
            }
        }
        Ok(())
    }

    /// Groups unbundled commits per the bundle-grouping policy and
    /// compresses every ready group. `compress_all` flushes undersized
    /// trailing groups too.
    pub fn flush_bundles(&self, full_rev_list: &[String], compress_all: bool) -> Result<usize> {
        let unbundled = self.store.unbundled_versions(full_rev_list)?;
        let groups = group_for_bundling(full_rev_list, &unbundled, self.config.compress_pack_size, compress_all);
        let mut compressed = 0;
        for group in groups {
            let bundle_id = group[0].clone();
            if self.store.compress_bundle(&bundle_id, &group)? {
                compressed += 1;
            }
        }
        Ok(compressed)
    }

    fn report_progress(&self, index: usize, total: usize) {
        let average =
            if self.timings.is_empty() { Duration::ZERO } else { self.timings.iter().sum::<Duration>() / self.timings.len() as u32 };
        let remaining = average * (total.saturating_sub(index + 1)) as u32;
        let snapshot = ProgressSnapshot { index, total, average_time: average, remaining_time: remaining, error_count: self.errors.len() };
        trace!(
            index = snapshot.index,
            total = snapshot.total,
            remaining = %format_duration(snapshot.remaining_time),
            errors = snapshot.error_count,
            "compile progress"
        );
    }
}

/// Groups unbundled commits into packs of `pack_size`, walking them in
/// `full_rev_list` order. A commit from `full_rev_list` that is absent from
/// `unbundled` (not yet compiled, still mid-compile, or already bundled) is a
/// gap: it breaks the run, so a pack never spans non-contiguous history. A
/// trailing undersized run is only flushed when `compress_all` is set.
fn group_for_bundling(full_rev_list: &[String], unbundled: &[String], pack_size: usize, compress_all: bool) -> Vec<Vec<String>> {
    let unbundled: HashSet<&str> = unbundled.iter().map(String::as_str).collect();
    let pack_size = pack_size.max(1);
    let mut groups = Vec::new();
    let mut run: Vec<String> = Vec::new();
    for commit in full_rev_list {
        if unbundled.contains(commit.as_str()) {
            run.push(commit.clone());
            if run.len() == pack_size {
                groups.push(std::mem::take(&mut run));
            }
        } else if !run.is_empty() {
            if compress_all {
                groups.push(std::mem::take(&mut run));
            } else {
                run.clear();
            }
        }
    }
    if compress_all && !run.is_empty() {
        groups.push(run);
    }
    groups
}

fn format_duration(d: Duration) -> String {
    let total_seconds = d.as_secs();
    let days = total_seconds / 86400;
    if days > 0 {
        return format!("{days}d");
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Splits the full rev-list into `bin_count` equal-width buckets and reports
/// the fraction of each bucket that is present in the cache, for the
/// terminal layer's timeline histogram.
pub fn histogram_buckets(full_rev_list: &[String], present: &HashSet<String>, bin_count: usize) -> Vec<f64> {
    if full_rev_list.is_empty() || bin_count == 0 {
        return Vec::new();
    }
    let bin_count = bin_count.min(full_rev_list.len()).max(1);
    let bin_size = (full_rev_list.len() + bin_count - 1) / bin_count;
    full_rev_list
        .chunks(bin_size.max(1))
        .map(|chunk| {
            let cached = chunk.iter().filter(|c| present.contains(c.as_str())).count();
            cached as f64 / chunk.len() as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_into_full_packs() {
        let rev_list: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let groups = group_for_bundling(&rev_list, &rev_list, 4, false);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 4);
        assert_eq!(groups[1].len(), 4);
    }

    #[test]
    fn compress_all_flushes_trailing_group() {
        let rev_list: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let groups = group_for_bundling(&rev_list, &rev_list, 4, true);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].len(), 2);
    }

    #[test]
    fn gap_in_full_rev_list_breaks_contiguity() {
        // v0..v9, but v3 was never built (not present in `unbundled`): the
        // run [v0,v1,v2] must not be packed together with [v4..].
        let rev_list: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let unbundled: Vec<String> = rev_list.iter().filter(|c| c.as_str() != "v3").cloned().collect();
        let groups = group_for_bundling(&rev_list, &unbundled, 4, false);
        // [v0,v1,v2] never reaches pack_size 4 before the gap, so it's
        // dropped for this round; [v4,v5,v6,v7] forms one full pack.
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0], vec!["v4", "v5", "v6", "v7"]);
    }

    #[test]
    fn gap_flushed_with_compress_all() {
        let rev_list: Vec<String> = (0..6).map(|i| format!("v{i}")).collect();
        let unbundled: Vec<String> = rev_list.iter().filter(|c| c.as_str() != "v3").cloned().collect();
        let groups = group_for_bundling(&rev_list, &unbundled, 4, true);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec!["v0", "v1", "v2"]);
        assert_eq!(groups[1], vec!["v4", "v5"]);
    }

    #[test]
    fn format_duration_switches_granularity() {
        assert_eq!(format_duration(Duration::from_secs(45)), "00:45");
        assert_eq!(format_duration(Duration::from_secs(3700)), "01:01:40");
        assert_eq!(format_duration(Duration::from_secs(90000)), "1d");
    }

    #[test]
    fn histogram_reports_presence_fraction() {
        let rev_list: Vec<String> = (0..8).map(|i| format!("c{i}")).collect();
        let present: HashSet<String> = ["c0".to_string(), "c1".to_string(), "c4".to_string()].into_iter().collect();
        let buckets = histogram_buckets(&rev_list, &present, 4);
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0], 1.0);
        assert_eq!(buckets[2], 0.5);
    }
}
