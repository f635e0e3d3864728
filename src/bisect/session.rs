//! Session runner (C7): the interactive init/status/prefetch/verdict loop
//! and its speculative prefetch driver. Owns the verdict loop only — it
//! never draws to the screen itself, it hands launch requests down to the
//! repro launcher and status data up to whatever is reading its return
//! values.

use crate::bisect::engine::{BisectEngine, PhaseTransition, Selection, Verdict};
use crate::bisect::tokenizer::tokenize;
use crate::bundle::scheduler::DecompressScheduler;
use crate::bundle::store::ArtifactStore;
use crate::config::Configuration;
use crate::error::Result;
use crate::repro::{self, Compile, Terminal};
use crate::vcs::Vcs;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const WARN_TIME_SECONDS: i64 = 60 * 60 * 24 * 7;

/// What `Session::new` decided at startup, before the interactive loop
/// begins. The Python original calls `sys.exit(0)` from inside its
/// constructor when there is nothing to bisect; that exit path is
/// re-expressed here as a plain enum the caller decides how to act on.
pub enum InitOutcome {
    Ready(Session),
    NothingToDo,
}

/// A prompt the caller should put to the user before the session proceeds;
/// the session runner owns the verdict loop but prompts are still routed
/// through a trait so a non-interactive caller (tests, a scripted runner)
/// can answer without stdin.
pub trait Prompt {
    fn confirm(&self, message: &str) -> bool;
    fn ask(&self, message: &str) -> String;
    fn notice(&self, message: &str);
}

/// The default stdin/stdout prompt, used by every non-test caller.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        dialoguer::Confirm::new().with_prompt(message).default(false).interact().unwrap_or(false)
    }

    fn ask(&self, message: &str) -> String {
        dialoguer::Input::new().with_prompt(message).interact_text().unwrap_or_default()
    }

    fn notice(&self, message: &str) {
        println!("{message}");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Autoopen,
    Pause,
    Open,
    List,
    Status,
    Help,
    Exit,
}

const COMMAND_TABLE: [(&str, Command); 8] = [
    ("autoopen", Command::Autoopen),
    ("pause", Command::Pause),
    ("open", Command::Open),
    ("list", Command::List),
    ("status", Command::Status),
    ("help", Command::Help),
    ("exit", Command::Exit),
    ("quit", Command::Exit),
];

/// Matches the fixed command table by unique prefix; `s` alone is
/// deliberately ambiguous between `status` and `skip` and must not match
/// here, it's a verdict-tokenizer keyword clash left for the caller to
/// disambiguate by requiring a longer prefix.
fn match_command(word: &str) -> Option<Command> {
    if word.eq_ignore_ascii_case("s") {
        return None;
    }
    let word = word.to_ascii_lowercase();
    let mut matched = None;
    for (keyword, command) in COMMAND_TABLE {
        if keyword.starts_with(word.as_str()) {
            if matched.is_some() {
                return None;
            }
            matched = Some(command);
        }
    }
    matched
}

pub enum CommandOutcome {
    Continue,
    Exit,
    LaunchRequested(String),
    Unknown(String),
}

pub struct Session {
    vcs: Arc<Vcs>,
    store: Arc<ArtifactStore>,
    scheduler: Option<DecompressScheduler>,
    config: Configuration,
    engine: BisectEngine,
    present_versions: HashSet<String>,
    ignored_commits: HashSet<String>,
    error_commits: HashSet<String>,
    current_commit: Option<String>,
    autoopen: bool,
    has_unstarted: bool,
    discard: bool,
    cache_only: bool,
    execution_parameters: String,
    path_spec_relaxed: bool,
}

pub struct StatusMessage {
    pub steps_remaining: u32,
    pub current_commit: Option<String>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vcs: Arc<Vcs>,
        store: Arc<ArtifactStore>,
        config: Configuration,
        discard: bool,
        cache_only: bool,
        execution_parameters: String,
        initial: (HashSet<String>, HashSet<String>, HashSet<String>),
        prompt: &dyn Prompt,
    ) -> Result<InitOutcome> {
        let present_versions = store.present_versions(&vcs)?;
        let ignored_commits = store.ignored_commits()?;
        let error_commits = if config.ignore_old_errors { HashSet::new() } else { store.error_commits()? };

        let mut commit_list = vcs.rev_list(&config.range_start, &config.range_end, Some(&config.path_spec), None);
        let mut path_spec = config.path_spec.clone();
        let mut range_start = config.range_start.clone();

        if commit_list.is_empty() {
            if prompt.confirm("No matching commits found going back to the start of the range. Set an earlier start point?") {
                loop {
                    let candidate = prompt.ask("Enter a new start point: ");
                    if vcs.resolve(&candidate).is_none() {
                        prompt.notice(&format!("Invalid commit: {candidate}"));
                        continue;
                    }
                    range_start = candidate;
                    commit_list = vcs.rev_list(&range_start, &config.range_end, Some(&path_spec), None);
                    if !commit_list.is_empty() {
                        break;
                    }
                    if !prompt.confirm("No matching commits found going back to that start point, either. Try another?") {
                        break;
                    }
                }
            }
            if commit_list.is_empty() && !path_spec.is_empty() {
                let no_spec = vcs.rev_list(&range_start, &config.range_end, None, None);
                if !no_spec.is_empty() && prompt.confirm("Perhaps your path spec is too restrictive. Continue without it?") {
                    path_spec.clear();
                    commit_list = no_spec;
                }
            }
            if commit_list.is_empty() {
                prompt.notice("Nothing to be done, then.");
                return Ok(InitOutcome::NothingToDo);
            }
        }

        let latest_present = commit_list.iter().rev().find(|c| present_versions.contains(c.as_str())).cloned();
        handle_time_warnings(&vcs, &commit_list, latest_present.as_deref(), cache_only, prompt);

        let mut engine = BisectEngine::new(range_start, config.range_end.clone(), path_spec, None);
        for commit in &initial.0 {
            let _ = engine.add_verdict(&vcs, commit, Verdict::Good);
        }
        for commit in &initial.1 {
            let _ = engine.add_verdict(&vcs, commit, Verdict::Bad);
        }
        for commit in &initial.2 {
            let _ = engine.add_verdict(&vcs, commit, Verdict::Skip);
        }

        let (selection, _) =
            engine.select_next(&vcs, &present_versions, &ignored_commits, &error_commits, cache_only, false);
        let current_commit = match selection {
            Selection::Next(c) | Selection::NextLastResort(c) | Selection::Converged(c) => Some(c),
            _ => None,
        };

        let scheduler = if config.background_decompression_layers > 0 {
            Some(DecompressScheduler::new(Arc::clone(&store), config.extraction_pool_size))
        } else {
            None
        };

        Ok(InitOutcome::Ready(Session {
            vcs,
            store,
            scheduler,
            config,
            engine,
            present_versions,
            ignored_commits,
            error_commits,
            current_commit,
            autoopen: false,
            has_unstarted: false,
            discard,
            cache_only,
            execution_parameters,
            path_spec_relaxed: false,
        }))
    }

    pub fn status(&self) -> StatusMessage {
        StatusMessage { steps_remaining: self.engine.remaining_steps(&self.vcs), current_commit: self.current_commit.clone() }
    }

    /// Breadth-first, depth-bounded expansion of hypothetical verdict
    /// futures, submitted to the decompress scheduler to warm the cache
    /// ahead of the next few verdicts.
    pub fn queue_decompress_nexts(&self) {
        let Some(scheduler) = &self.scheduler else { return };
        let Some(current) = self.current_commit.clone() else { return };
        let layers = self.config.background_decompression_layers;

        let mut to_decompress: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32, HashSet<String>, HashSet<String>)> = VecDeque::new();
        queue.push_back((current, 0, HashSet::new(), HashSet::new()));

        while let Some((commit, layer, inherited_goods, inherited_bads)) = queue.pop_front() {
            if layer >= layers {
                break;
            }

            let mut new_goods = inherited_goods.clone();
            new_goods.insert(commit.clone());
            if let Some(next) = self.dry_run_next(&new_goods, &inherited_bads) {
                if seen.insert(next.clone()) {
                    to_decompress.push(next.clone());
                    queue.push_back((next, layer + 1, new_goods.clone(), inherited_bads.clone()));
                }
            }

            let mut new_bads = inherited_bads.clone();
            new_bads.insert(commit);
            if let Some(next) = self.dry_run_next(&inherited_goods, &new_bads) {
                if seen.insert(next.clone()) {
                    to_decompress.push(next.clone());
                    queue.push_back((next, layer + 1, inherited_goods.clone(), new_bads));
                }
            }
        }

        scheduler.enqueue(&to_decompress);
    }

    fn dry_run_next(&self, goods: &HashSet<String>, bads: &HashSet<String>) -> Option<String> {
        let mut scratch = self.engine.clone();
        scratch.goods = self.engine.goods.union(goods).cloned().collect();
        scratch.bads = self.engine.bads.union(bads).cloned().collect();
        let (selection, _) = scratch.select_next(
            &self.vcs,
            &self.present_versions,
            &self.ignored_commits,
            &self.error_commits,
            self.cache_only,
            true,
        );
        match selection {
            Selection::Next(c) | Selection::NextLastResort(c) | Selection::Converged(c) => Some(c),
            _ => None,
        }
    }

    /// Applies a resolved verdict set, advancing `current_commit`. Returns
    /// `false` when the session has converged or run out of bracket and
    /// should exit.
    pub fn apply_verdicts(&mut self, refs: &[(String, Verdict)], prompt: &dyn Prompt) -> bool {
        for (reference, verdict) in refs {
            let Some(commit) = self.vcs.resolve(reference) else {
                prompt.notice(&format!("Invalid ref: {reference}"));
                continue;
            };
            match self.engine.add_verdict(&self.vcs, &commit, *verdict) {
                Ok(Some(previous)) if previous != *verdict => {
                    prompt.notice(&format!(
                        "Note: {commit} was already marked {previous:?}, now marked {verdict:?}."
                    ));
                }
                Ok(_) => {}
                Err(_) => {
                    prompt.notice("Invalid command: that would contradict an existing verdict.");
                    return true;
                }
            }
        }

        let (mut selection, transition) = self.engine.select_next(
            &self.vcs,
            &self.present_versions,
            &self.ignored_commits,
            &self.error_commits,
            self.cache_only,
            false,
        );

        // A verdict that leaves no remaining candidate is, once per session,
        // an invitation to drop the path-spec rather than a dead end.
        if matches!(selection, Selection::Exhausted)
            && !self.path_spec_relaxed
            && !self.engine.path_spec.is_empty()
            && prompt.confirm("That would result in no possible remaining commits. Would you like to continue without the path spec?")
        {
            self.path_spec_relaxed = true;
            self.engine.path_spec.clear();
            let (retried, _) = self.engine.select_next(
                &self.vcs,
                &self.present_versions,
                &self.ignored_commits,
                &self.error_commits,
                self.cache_only,
                false,
            );
            selection = retried;
        }

        match transition {
            PhaseTransition::EnteredPhaseTwo => prompt.notice("No more useful precompiled commits to test. Switching to compiling versions as needed."),
            PhaseTransition::ReturnedToPhaseOne => prompt.notice("Precompiled commits are back inside the possible range. Switching back to searching precompiled commits."),
            PhaseTransition::None => {}
        }

        match selection {
            Selection::Next(commit) => {
                self.current_commit = Some(commit);
                self.queue_decompress_nexts();
                true
            }
            Selection::NextLastResort(commit) => {
                prompt.notice(&format!(
                    "{commit} is both ignored and marked as a compile error; testing it anyway since nothing better is left."
                ));
                if self.autoopen {
                    prompt.notice("Disabling autoopen to avoid autocompiling untestable commits.");
                    self.autoopen = false;
                }
                self.current_commit = Some(commit);
                self.queue_decompress_nexts();
                true
            }
            Selection::Converged(commit) => {
                self.current_commit = Some(commit);
                false
            }
            Selection::AlreadyFixed => {
                prompt.notice("The last commit in the range got marked as good; perhaps the issue has already been fixed?");
                false
            }
            Selection::NoBracket => {
                prompt.notice("The first commit in the range is marked bad, so there's no possible start point.");
                false
            }
            Selection::Exhausted => {
                if self.has_unstarted {
                    // already warned once this session, stay quiet.
                } else if self.autoopen {
                    prompt.notice("Disabling autoopen to avoid autocompiling untestable commits.");
                    self.autoopen = false;
                    self.has_unstarted = true;
                }
                false
            }
        }
    }

    pub fn process_command(&mut self, line: &str, prompt: &dyn Prompt) -> CommandOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return CommandOutcome::Continue;
        }
        let mut words = trimmed.split_whitespace();
        let Some(first) = words.next() else { return CommandOutcome::Continue };

        if let Some(command) = match_command(first) {
            return match command {
                Command::Autoopen => {
                    self.autoopen = true;
                    self.current_commit.clone().map(CommandOutcome::LaunchRequested).unwrap_or(CommandOutcome::Continue)
                }
                Command::Pause => {
                    self.autoopen = false;
                    CommandOutcome::Continue
                }
                Command::Open => {
                    let reference = words.next().map(str::to_string).or_else(|| self.current_commit.clone());
                    match reference {
                        Some(r) => {
                            if let Some(commit) = self.vcs.resolve(&r) {
                                self.current_commit = Some(commit.clone());
                                self.queue_decompress_nexts();
                                CommandOutcome::LaunchRequested(commit)
                            } else {
                                prompt.notice(&format!("Invalid ref: {r}"));
                                CommandOutcome::Continue
                            }
                        }
                        None => {
                            prompt.notice("No current commit to open.");
                            CommandOutcome::Continue
                        }
                    }
                }
                Command::List => {
                    for commit in self.bisect_commits() {
                        prompt.notice(&self.vcs.short_log(&commit));
                    }
                    CommandOutcome::Continue
                }
                Command::Status => {
                    let status = self.status();
                    prompt.notice(&format!("Approximately {} tests remaining.", status.steps_remaining));
                    CommandOutcome::Continue
                }
                Command::Help => CommandOutcome::Continue,
                Command::Exit => CommandOutcome::Exit,
            };
        }

        let current = self.current_commit.clone().unwrap_or_default();
        let tokenized = tokenize(trimmed, &current);
        if !tokenized.conflicts.is_empty() {
            prompt.notice("Warning: some commits were already marked as something else. Updating anyway.");
        }
        if tokenized.refs.is_empty() {
            return CommandOutcome::Unknown(first.to_string());
        }

        if self.apply_verdicts(&tokenized.refs, prompt) {
            if self.autoopen {
                if let Some(commit) = self.current_commit.clone() {
                    return CommandOutcome::LaunchRequested(commit);
                }
            }
            CommandOutcome::Continue
        } else {
            CommandOutcome::Exit
        }
    }

    fn bisect_commits(&self) -> Vec<String> {
        if self.engine.goods.is_empty() || self.engine.bads.is_empty() {
            return Vec::new();
        }
        let goods: Vec<String> = self.engine.minimal_goods(&self.vcs).into_iter().collect();
        let bads: Vec<String> = self.engine.minimal_bads(&self.vcs).into_iter().collect();
        self.vcs.bisect_candidates(&goods, &bads, Some(&self.engine.path_spec), self.engine.before)
    }

    /// Minimal good/bad/skip sets, for resuming a session later.
    pub fn resume_sets(&self) -> (HashSet<String>, HashSet<String>, HashSet<String>) {
        (self.engine.minimal_goods(&self.vcs), self.engine.minimal_bads(&self.vcs), self.engine.skips.clone())
    }

    pub fn launch_current(&mut self, compile: &dyn Compile, terminal: &dyn Terminal) -> Result<()> {
        let Some(commit) = self.current_commit.clone() else { return Ok(()) };
        let cwd = self.vcs.workspace().to_path_buf();
        repro::launch(
            &commit,
            &self.execution_parameters,
            &mut self.present_versions,
            self.discard,
            self.cache_only,
            &cwd,
            &self.config,
            &self.vcs,
            &self.store,
            compile,
            terminal,
        )?;
        Ok(())
    }
}

fn handle_time_warnings(vcs: &Vcs, commit_list: &[String], latest_present: Option<&str>, cache_only: bool, prompt: &dyn Prompt) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);

    if let Some(latest) = commit_list.last() {
        let latest_time = vcs.commit_time(latest);
        if now - latest_time > WARN_TIME_SECONDS {
            prompt.notice(&format!("The latest known commit is {} days old.", (now - latest_time) / 86400));
        }
    }

    let Some(latest_present) = latest_present else {
        if !commit_list.is_empty() {
            prompt.notice("No cached version found in the range.");
        }
        return;
    };

    let present_time = vcs.commit_time(latest_present);
    if now - present_time > WARN_TIME_SECONDS {
        prompt.notice(&format!("The latest cached version is {} days old.", (now - present_time) / 86400));
        if !cache_only && !commit_list.is_empty() && prompt.confirm("Would you like to compile the latest commit to initially test against instead?") {
            prompt.notice("The latest commit will be compiled for testing before precompiled versions are used.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoPrompt;
    impl Prompt for NoPrompt {
        fn confirm(&self, _message: &str) -> bool {
            false
        }
        fn ask(&self, _message: &str) -> String {
            String::new()
        }
        fn notice(&self, _message: &str) {}
    }

    #[test]
    fn matches_command_by_unique_prefix() {
        assert_eq!(match_command("stat"), Some(Command::Status));
        assert_eq!(match_command("o"), Some(Command::Open));
        assert_eq!(match_command("s"), None);
    }

    #[test]
    fn unmatched_single_s_falls_through_to_tokenizer() {
        assert!(match_command("s").is_none());
        let _ = NoPrompt;
    }
}
