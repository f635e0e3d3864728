use bisect_foundry::bisect::engine::{BisectEngine, Selection, Verdict};
use bisect_foundry::vcs::Vcs;
use std::process::Command;
use tempfile::tempdir;

/// Builds a tiny linear history of `count` commits in a fresh repo and
/// returns (workspace, commit ids oldest-to-newest).
fn linear_history(count: usize) -> (tempfile::TempDir, Vec<String>) {
    let tmp = tempdir().unwrap();
    let run = |args: &[&str]| {
        let status = Command::new("git").arg("-C").arg(tmp.path()).args(args).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    };

    run(&["init", "-q"]);
    run(&["config", "user.email", "bisect@example.com"]);
    run(&["config", "user.name", "bisect"]);

    let mut commits = Vec::new();
    for i in 0..count {
        std::fs::write(tmp.path().join("marker"), i.to_string()).unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-q", "-m", &format!("commit {i}")]);
        let output = Command::new("git").arg("-C").arg(tmp.path()).args(["rev-parse", "HEAD"]).output().unwrap();
        commits.push(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    (tmp, commits)
}

#[test]
fn converges_on_linear_history() {
    let (tmp, commits) = linear_history(8);
    let vcs = Vcs::new(tmp.path());
    let present = Default::default();
    let ignored = Default::default();
    let errors = Default::default();

    let mut engine = BisectEngine::new(commits[0].clone(), commits[7].clone(), String::new(), None);
    engine.add_verdict(&vcs, &commits[0], Verdict::Good).unwrap();
    engine.add_verdict(&vcs, &commits[7], Verdict::Bad).unwrap();

    let mut last_suspect = None;
    for _ in 0..10 {
        let (selection, _) = engine.select_next(&vcs, &present, &ignored, &errors, false, false);
        match selection {
            Selection::Converged(commit) => {
                last_suspect = Some(commit);
                break;
            }
            Selection::Next(commit) => {
                let index = commits.iter().position(|c| *c == commit).unwrap();
                // Deterministic oracle: commit 5 is the regression point.
                let verdict = if index < 5 { Verdict::Good } else { Verdict::Bad };
                engine.add_verdict(&vcs, &commit, verdict).unwrap();
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    assert_eq!(last_suspect, Some(commits[5].clone()));
}

#[test]
fn no_bracket_when_start_marked_bad() {
    let (tmp, commits) = linear_history(3);
    let vcs = Vcs::new(tmp.path());
    let present = Default::default();
    let ignored = Default::default();
    let errors = Default::default();

    let mut engine = BisectEngine::new(commits[0].clone(), commits[2].clone(), String::new(), None);
    engine.add_verdict(&vcs, &commits[0], Verdict::Bad).unwrap();

    let (selection, _) = engine.select_next(&vcs, &present, &ignored, &errors, false, false);
    assert_eq!(selection, Selection::NoBracket);
}

#[test]
fn pre_phase_never_reports_a_phase_transition() {
    use bisect_foundry::bisect::engine::PhaseTransition;

    let (tmp, commits) = linear_history(5);
    let vcs = Vcs::new(tmp.path());
    // Nothing present, nothing marked: this is pre-phase (no bracket yet).
    // The cached-vs-compile phase distinction only applies once a bracket
    // exists, so it must never fire here even though no candidate is cached.
    let present = Default::default();
    let ignored = Default::default();
    let errors = Default::default();

    let mut engine = BisectEngine::new(commits[0].clone(), commits[4].clone(), String::new(), None);
    let (selection, transition) = engine.select_next(&vcs, &present, &ignored, &errors, false, false);
    assert_eq!(transition, PhaseTransition::None);
    assert!(matches!(selection, Selection::Next(_)));
    assert!(!engine.phase_two);
}

#[test]
fn already_fixed_when_end_marked_good() {
    let (tmp, commits) = linear_history(3);
    let vcs = Vcs::new(tmp.path());
    let present = Default::default();
    let ignored = Default::default();
    let errors = Default::default();

    let mut engine = BisectEngine::new(commits[0].clone(), commits[2].clone(), String::new(), None);
    engine.add_verdict(&vcs, &commits[2], Verdict::Good).unwrap();

    let (selection, _) = engine.select_next(&vcs, &present, &ignored, &errors, false, false);
    assert_eq!(selection, Selection::AlreadyFixed);
}
