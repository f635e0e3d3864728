use bisect_foundry::bundle::store::ArtifactStore;
use std::fs;
use tempfile::tempdir;

fn write_loose(store: &ArtifactStore, commit: &str, marker: &str) {
    let dir = store.version_path(commit);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("payload"), marker).unwrap();
}

#[test]
fn unbundled_versions_respects_rev_list_order() {
    let tmp = tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.init().unwrap();

    let rev_list: Vec<String> = (0..5).map(|i| i.to_string().repeat(40)).collect();
    for commit in [&rev_list[1], &rev_list[3]] {
        write_loose(&store, commit, commit);
    }

    let unbundled = store.unbundled_versions(&rev_list).unwrap();
    assert_eq!(unbundled, vec![rev_list[1].clone(), rev_list[3].clone()]);
}

#[test]
fn compress_then_extract_multiple_bundles_coexist() {
    let tmp = tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.init().unwrap();

    let first = vec!["a".repeat(40), "b".repeat(40)];
    let second = vec!["c".repeat(40), "d".repeat(40)];
    for commit in first.iter().chain(second.iter()) {
        write_loose(&store, commit, commit);
    }

    assert!(store.compress_bundle(&first[0], &first).unwrap());
    assert!(store.compress_bundle(&second[0], &second).unwrap());

    for commit in first.iter().chain(second.iter()) {
        store.extract(commit, None).unwrap();
        let contents = fs::read_to_string(store.version_path(commit).join("payload")).unwrap();
        assert_eq!(contents, *commit);
    }
}

#[test]
fn error_commits_are_append_only_and_deduplicated() {
    let tmp = tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path());
    store.init().unwrap();

    let commit = "e".repeat(40);
    store.add_error_commits(&[commit.clone()]).unwrap();
    store.add_error_commits(&[commit.clone()]).unwrap();

    let errors = store.error_commits().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors.contains(&commit));
}
