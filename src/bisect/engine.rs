//! Bisection engine (C6): verdict sets drive next-commit selection through a
//! two-phase (cached-then-compile) search, with untestable-commit filtering
//! and a remaining-step estimate.

use crate::vcs::Vcs;
use std::collections::HashSet;

/// Why `add_verdict` rejected an insertion into the verdict sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerdictError {
    /// The new bad would be an ancestor of an existing good (or vice versa).
    AncestryViolation,
}

/// Outcome of `select_next`; the empty-candidate cases are recoverable
/// "what happened" results, not errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// A single candidate to test next.
    Next(String),
    /// A single candidate to test next, but every candidate in the pool was
    /// both ignored and in the error set — there was no better option. The
    /// caller should warn and disable autoopen rather than autocompile it.
    NextLastResort(String),
    /// The search has converged on a single suspect.
    Converged(String),
    /// The range end is marked good: "already fixed?"
    AlreadyFixed,
    /// The range start is marked bad: no bracket, prompt to extend.
    NoBracket,
    /// No untested candidates remain (cache-only mode exhausted the cache).
    Exhausted,
}

/// Whether the engine just transitioned between cache-preferring and
/// compile-on-demand search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseTransition {
    None,
    EnteredPhaseTwo,
    ReturnedToPhaseOne,
}

#[derive(Clone)]
pub struct BisectEngine {
    pub goods: HashSet<String>,
    pub bads: HashSet<String>,
    pub skips: HashSet<String>,
    pub path_spec: String,
    pub before: Option<i64>,
    pub phase_two: bool,
    range_start: String,
    range_end: String,
}

impl BisectEngine {
    pub fn new(range_start: String, range_end: String, path_spec: String, before: Option<i64>) -> Self {
        Self {
            goods: HashSet::new(),
            bads: HashSet::new(),
            skips: HashSet::new(),
            path_spec,
            before,
            phase_two: false,
            range_start,
            range_end,
        }
    }

    /// Accepts a verdict, validating disjointness. An overlap with the
    /// opposite set is tolerated as a re-mark; the previous verdict (if any)
    /// is returned so the caller can warn the user when it differs from the
    /// new one. Only a good/bad ancestry violation is rejected.
    pub fn add_verdict(
        &mut self,
        vcs: &Vcs,
        commit: &str,
        kind: Verdict,
    ) -> Result<Option<Verdict>, VerdictError> {
        let previous = if self.goods.contains(commit) {
            Some(Verdict::Good)
        } else if self.bads.contains(commit) {
            Some(Verdict::Bad)
        } else if self.skips.contains(commit) {
            Some(Verdict::Skip)
        } else {
            None
        };

        self.skips.remove(commit);
        self.goods.remove(commit);
        self.bads.remove(commit);

        match kind {
            Verdict::Good => {
                if self.bads.iter().any(|bad| vcs.is_ancestor(bad, commit)) {
                    self.restore(commit, previous);
                    return Err(VerdictError::AncestryViolation);
                }
                self.goods.insert(commit.to_string());
            }
            Verdict::Bad => {
                if self.goods.iter().any(|good| vcs.is_ancestor(commit, good)) {
                    self.restore(commit, previous);
                    return Err(VerdictError::AncestryViolation);
                }
                self.bads.insert(commit.to_string());
            }
            Verdict::Skip => {
                self.skips.insert(commit.to_string());
            }
            Verdict::Unmark => {}
        }
        Ok(previous)
    }

    /// Puts a rejected verdict's prior membership back after a failed
    /// ancestry check, so a rejected insertion leaves the sets unchanged.
    fn restore(&mut self, commit: &str, previous: Option<Verdict>) {
        match previous {
            Some(Verdict::Good) => {
                self.goods.insert(commit.to_string());
            }
            Some(Verdict::Bad) => {
                self.bads.insert(commit.to_string());
            }
            Some(Verdict::Skip) => {
                self.skips.insert(commit.to_string());
            }
            Some(Verdict::Unmark) | None => {}
        }
    }

    /// Ancestry-incomparable reduction of `goods`.
    pub fn minimal_goods(&self, vcs: &Vcs) -> HashSet<String> {
        minimal_set(&self.goods, |a, b| vcs.is_ancestor(a, b))
    }

    /// Ancestry-incomparable reduction of `bads`.
    pub fn minimal_bads(&self, vcs: &Vcs) -> HashSet<String> {
        minimal_set(&self.bads, |a, b| vcs.is_ancestor(b, a))
    }

    /// Runs the selection algorithm. `dry_run` performs the same computation
    /// without mutating `self.phase_two` — used by speculative prefetch.
    pub fn select_next(
        &mut self,
        vcs: &Vcs,
        present_versions: &HashSet<String>,
        ignored: &HashSet<String>,
        errors: &HashSet<String>,
        cache_only: bool,
        dry_run: bool,
    ) -> (Selection, PhaseTransition) {
        if self.bads.contains(&self.range_start) {
            return (Selection::NoBracket, PhaseTransition::None);
        }
        if self.goods.contains(&self.range_end) {
            return (Selection::AlreadyFixed, PhaseTransition::None);
        }

        let candidates = self.candidates(vcs);
        let candidates: Vec<String> =
            candidates.into_iter().filter(|c| !self.skips.contains(c)).collect();

        if candidates.is_empty() {
            let minimal_bads = self.minimal_bads(vcs);
            if let Some(only) = minimal_bads.iter().next().filter(|_| minimal_bads.len() == 1) {
                return (Selection::Converged(only.clone()), PhaseTransition::None);
            }
            return (Selection::Exhausted, PhaseTransition::None);
        }

        // Pre-phase (no good or no bad yet, so nothing is bracketed): the
        // cached-vs-compile phase distinction doesn't apply until there's a
        // bracket to search inside, so skip it entirely rather than let it
        // spuriously flip `phase_two`.
        let pre_phase = self.goods.is_empty() || self.bads.is_empty();

        let pool: Vec<String>;
        let mut transition = PhaseTransition::None;
        if pre_phase {
            pool = candidates.clone();
        } else {
            let present_candidates: Vec<String> =
                candidates.iter().filter(|c| present_versions.contains(c.as_str())).cloned().collect();

            let mut phase_two = self.phase_two;
            pool = if !phase_two {
                if present_candidates.is_empty() && !cache_only {
                    phase_two = true;
                    transition = PhaseTransition::EnteredPhaseTwo;
                    candidates.clone()
                } else {
                    present_candidates
                }
            } else if !present_candidates.is_empty() {
                phase_two = false;
                transition = PhaseTransition::ReturnedToPhaseOne;
                present_candidates
            } else {
                candidates.clone()
            };

            if !dry_run {
                self.phase_two = phase_two;
            }
        }

        if pool.is_empty() {
            return (Selection::Exhausted, PhaseTransition::None);
        }

        let (filtered, last_resort) = filter_untestable(&pool, ignored, errors);
        match filtered.first() {
            Some(commit) if filtered.len() == 1 => (Selection::Converged(commit.clone()), transition),
            Some(commit) if last_resort => (Selection::NextLastResort(commit.clone()), transition),
            Some(commit) => (Selection::Next(commit.clone()), transition),
            None => (Selection::Exhausted, transition),
        }
    }

    /// The pre-phase / bisection-phase candidate set, before skip filtering.
    fn candidates(&self, vcs: &Vcs) -> Vec<String> {
        if self.bads.is_empty() || self.goods.is_empty() {
            // Pre-phase: we have not bracketed the regression yet.
            let full = vcs.rev_list(&self.range_start, &self.range_end, Some(&self.path_spec), self.before);
            if self.bads.is_empty() {
                // Need a bad: full range minus the ancestry of each good.
                full.into_iter()
                    .filter(|c| !self.goods.iter().any(|good| vcs.is_ancestor(c, good) || c == good))
                    .collect()
            } else {
                // Need a good: restrict to the ancestry of each bad.
                full.into_iter()
                    .filter(|c| self.bads.iter().any(|bad| vcs.is_ancestor(c, bad) || c == bad))
                    .collect()
            }
        } else {
            let goods: Vec<String> = self.minimal_goods(vcs).into_iter().collect();
            let bads: Vec<String> = self.minimal_bads(vcs).into_iter().collect();
            vcs.bisect_candidates(&goods, &bads, Some(&self.path_spec), self.before)
        }
    }

    pub fn range_start(&self) -> &str {
        &self.range_start
    }

    pub fn range_end(&self) -> &str {
        &self.range_end
    }

    /// `⌈log₂(|candidates ∪ minimal_bads|)⌉`, plus one per empty of
    /// {goods, bads}.
    pub fn remaining_steps(&self, vcs: &Vcs) -> u32 {
        let candidates = self.candidates(vcs);
        let minimal_bads = self.minimal_bads(vcs);
        let union: HashSet<&str> =
            candidates.iter().map(String::as_str).chain(minimal_bads.iter().map(String::as_str)).collect();
        let n = union.len().max(1) as f64;
        let mut steps = n.log2().ceil() as u32;
        if self.goods.is_empty() {
            steps += 1;
        }
        if self.bads.is_empty() {
            steps += 1;
        }
        steps
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Good,
    Bad,
    Skip,
    Unmark,
}

fn minimal_set(set: &HashSet<String>, a_below_b: impl Fn(&str, &str) -> bool) -> HashSet<String> {
    set.iter()
        .filter(|candidate| {
            !set.iter().any(|other| other != *candidate && a_below_b(other, candidate))
        })
        .cloned()
        .collect()
}

/// Prefers candidates that are neither ignored nor error-set members; falls
/// back through (unerrored-but-ignored), (ignored-but-unerrored), (both) in
/// that order. The returned `bool` is set only for the last of those —
/// every candidate both ignored and errored, the pick is a last resort.
fn filter_untestable(candidates: &[String], ignored: &HashSet<String>, errors: &HashSet<String>) -> (Vec<String>, bool) {
    let clean: Vec<String> =
        candidates.iter().filter(|c| !ignored.contains(c.as_str()) && !errors.contains(c.as_str())).cloned().collect();
    if !clean.is_empty() {
        return (clean, false);
    }
    let unerrored_ignored: Vec<String> =
        candidates.iter().filter(|c| ignored.contains(c.as_str()) && !errors.contains(c.as_str())).cloned().collect();
    if !unerrored_ignored.is_empty() {
        return (unerrored_ignored, false);
    }
    let ignored_unerrored: Vec<String> =
        candidates.iter().filter(|c| !ignored.contains(c.as_str()) && errors.contains(c.as_str())).cloned().collect();
    if !ignored_unerrored.is_empty() {
        return (ignored_unerrored, false);
    }
    (candidates.to_vec(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_set_drops_ancestors() {
        let vcs = Vcs::new(".");
        // is_ancestor shells out to git and will fail (empty) against a real
        // repo-less tempdir; minimal_set here is exercised against a fake
        // predicate instead to keep this a pure unit test.
        let set: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let reduced = minimal_set(&set, |a, _b| a == "a");
        assert!(!reduced.contains("b"));
        assert!(!reduced.contains("c"));
        assert!(reduced.contains("a"));
        let _ = vcs;
    }

    #[test]
    fn filter_untestable_prefers_clean_candidates() {
        let candidates = vec!["a".to_string(), "b".to_string()];
        let ignored: HashSet<String> = ["a".to_string()].into_iter().collect();
        let errors = HashSet::new();
        let (result, last_resort) = filter_untestable(&candidates, &ignored, &errors);
        assert_eq!(result, vec!["b".to_string()]);
        assert!(!last_resort);
    }

    #[test]
    fn filter_untestable_falls_back_to_last_resort() {
        let candidates = vec!["a".to_string()];
        let ignored: HashSet<String> = ["a".to_string()].into_iter().collect();
        let errors: HashSet<String> = ["a".to_string()].into_iter().collect();
        let (result, last_resort) = filter_untestable(&candidates, &ignored, &errors);
        assert_eq!(result, vec!["a".to_string()]);
        assert!(last_resort);
    }
}
