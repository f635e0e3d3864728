use bisect_foundry::bundle::store::ArtifactStore;
use bisect_foundry::config::{Configuration, PrintMode};
use bisect_foundry::orchestrator::{CompileOutcome, CompileSession, Compiler};
use bisect_foundry::vcs::Vcs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn init_repo() -> (tempfile::TempDir, Vec<String>) {
    let tmp = tempdir().unwrap();
    let run = |args: &[&str]| {
        let status = Command::new("git").arg("-C").arg(tmp.path()).args(args).status().unwrap();
        assert!(status.success());
    };
    run(&["init", "-q"]);
    run(&["config", "user.email", "bisect@example.com"]);
    run(&["config", "user.name", "bisect"]);

    let mut commits = Vec::new();
    for i in 0..5 {
        std::fs::write(tmp.path().join("marker"), i.to_string()).unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-q", "-m", &format!("commit {i}")]);
        let output = Command::new("git").arg("-C").arg(tmp.path()).args(["rev-parse", "HEAD"]).output().unwrap();
        commits.push(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    (tmp, commits)
}

fn test_config(workspace_path: PathBuf) -> Configuration {
    Configuration {
        range_start: String::new(),
        range_end: String::new(),
        workspace_path,
        force: true,
        ignore_old_errors: false,
        path_spec: String::new(),
        subwindow_rows: 20,
        show_tags_on_histogram: true,
        color_enabled: false,
        message_color: String::new(),
        important_color: String::new(),
        commit_color: String::new(),
        good_color: String::new(),
        error_color: String::new(),
        warning_color: String::new(),
        progress_foreground_color: String::new(),
        progress_background_color: String::new(),
        heatmap_colors: Vec::new(),
        print_mode: PrintMode::Quiet,
        enable_hotkeys: false,
        mark_good_hotkey: String::new(),
        mark_bad_hotkey: String::new(),
        compress_pack_size: 2,
        compiler_flags: String::new(),
        binary_name: "game".to_string(),
        default_execution_parameters: String::new(),
        background_decompression_layers: 0,
        extraction_pool_size: 1,
    }
}

/// Always succeeds and "produces" a fixed fake binary file.
struct AlwaysSucceeds {
    binary: PathBuf,
}

impl Compiler for AlwaysSucceeds {
    fn compile(&self, _commit: &str, _compiler_flags: &str) -> bisect_foundry::Result<CompileOutcome> {
        Ok(CompileOutcome::Success)
    }

    fn produced_binary(&self, _binary_name: &str) -> Option<PathBuf> {
        Some(self.binary.clone())
    }
}

#[test]
fn compiling_every_commit_caches_and_flushes_bundles() {
    init_tracing();
    let (repo, commits) = init_repo();
    let store_root = tempdir().unwrap();
    let store = ArtifactStore::new(store_root.path());
    store.init().unwrap();

    let fake_binary = repo.path().join("built-binary");
    std::fs::write(&fake_binary, "binary contents").unwrap();

    let vcs = Vcs::new(repo.path());
    let config = test_config(repo.path().to_path_buf());
    let mut session = CompileSession::new(&vcs, &store, &config);
    let compiler = AlwaysSucceeds { binary: fake_binary };

    session.compile(&compiler, &commits, &commits, true, true).unwrap();

    for commit in &commits {
        let present = store.present_versions(&vcs).unwrap();
        assert!(present.contains(commit), "expected {commit} to be cached or bundled");
    }
}

#[test]
fn local_changes_block_unless_forced() {
    let (repo, _commits) = init_repo();
    std::fs::write(repo.path().join("marker"), "dirty").unwrap();

    let store_root = tempdir().unwrap();
    let store = ArtifactStore::new(store_root.path());
    store.init().unwrap();

    let vcs = Vcs::new(repo.path());
    let mut config = test_config(repo.path().to_path_buf());
    config.force = false;

    let session = CompileSession::new(&vcs, &store, &config);
    assert!(!session.handle_local_changes().unwrap());
}
