// End-to-end runs over local repositories

mod common;

use common::{add_commit, create_test_repo, path_str, remove_file_commit, test_settings};
use repomine::model::Project;
use repomine::pipeline::MiningRun;
use repomine::repository::GitSource;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn start(settings: repomine::config::Settings) -> MiningRun {
    MiningRun::start(settings, Arc::new(GitSource::new())).unwrap()
}

fn project_root(target: &Path, id: u64) -> PathBuf {
    Project::new("", id, &target.join("projects"), 4).root().to_path_buf()
}

fn sample_repos() -> Vec<(TempDir, PathBuf)> {
    let mut repos = Vec::new();
    for n in 0..2 {
        let (dir, path, repo) = create_test_repo();
        add_commit(&repo, &[("index.js", b"shared"), ("README.md", b"docs")], "init");
        add_commit(&repo, &[("index.js", format!("repo {}", n).as_bytes())], "edit");
        remove_file_commit(&repo, "index.js", "drop");
        repos.push((dir, path));
    }
    repos
}

#[test]
fn test_failed_clone_is_isolated() {
    let target = TempDir::new().unwrap();
    let repos = sample_repos();
    let missing = target.path().join("no-such-repo");

    let run = start(test_settings(target.path()));
    let first = run.schedule_url(&path_str(&repos[0].1));
    let bad = run.schedule_url(&path_str(&missing));
    let second = run.schedule_url(&path_str(&repos[1].1));
    let summary = run.finalize().unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.errors, 1);
    // "shared" plus one edit per repository
    assert_eq!(summary.distinct_contents, 3);
    assert_eq!(summary.snapshots, 6);

    let failed = fs::read_to_string(target.path().join("failed_projects.csv")).unwrap();
    assert_eq!(failed, format!("{},{}\n", path_str(&missing), bad));

    for id in [first, second] {
        let root = project_root(target.path(), id);
        let log = fs::read_to_string(root.join("log.csv")).unwrap();
        assert!(log.starts_with(&format!("{},", id)));
        let snapshots = fs::read_to_string(root.join("snapshots.csv")).unwrap();
        assert_eq!(snapshots.lines().count(), 3);
        assert!(snapshots.lines().last().unwrap().starts_with("2,-1,1,"));
        assert!(!root.join("repo").exists());
    }
    assert!(!project_root(target.path(), bad).join("log.csv").exists());
    assert!(!project_root(target.path(), bad).join("repo").exists());

    let stamp = fs::read_to_string(target.path().join("runs_downloader.csv")).unwrap();
    let fields: Vec<&str> = stamp.trim_end().split(',').collect();
    assert_eq!(fields.len(), 6);
    assert_eq!(&fields[1..5], &["3", "1", "3", "6"]);
}

#[test]
fn test_incremental_rerun_skips_finished_projects() {
    let target = TempDir::new().unwrap();
    let repos = sample_repos();

    let run = start(test_settings(target.path()));
    let id = run.schedule_url(&path_str(&repos[0].1));
    let first = run.finalize().unwrap();
    assert_eq!(first.errors, 0);

    let (_extra_dir, extra_path, extra) = create_test_repo();
    add_commit(&extra, &[("other.js", b"shared")], "init");

    let run = start(test_settings(target.path()));
    run.schedule(&path_str(&repos[0].1), id);
    let next = run.schedule_url(&path_str(&extra_path));
    let second = run.finalize().unwrap();

    assert_eq!(next, id + 1);
    assert_eq!(second.completed, 2);
    assert_eq!(second.errors, 0);
    // the skipped project adds nothing and "shared" keeps its id
    assert_eq!(second.snapshots, 1);
    assert_eq!(second.distinct_contents, first.distinct_contents);

    let mapping = fs::read_to_string(target.path().join("content_hashes.csv")).unwrap();
    assert_eq!(mapping.lines().count() as u64, first.distinct_contents);
    let snapshots =
        fs::read_to_string(project_root(target.path(), next).join("snapshots.csv")).unwrap();
    assert!(snapshots.starts_with("0,0,-1,"));
}

#[test]
fn test_fresh_run_starts_over() {
    let target = TempDir::new().unwrap();
    let repos = sample_repos();

    let run = start(test_settings(target.path()));
    run.schedule_url(&path_str(&repos[0].1));
    run.finalize().unwrap();

    let mut settings = test_settings(target.path());
    settings.incremental = false;
    let run = start(settings);
    let id = run.schedule_url(&path_str(&repos[0].1));
    let summary = run.finalize().unwrap();

    assert_eq!(id, 0);
    assert_eq!(summary.snapshots, 3);
    assert_eq!(summary.distinct_contents, 2);
}

#[test]
fn test_feed_schedules_valid_lines() {
    let target = TempDir::new().unwrap();
    let repos = sample_repos();
    let input = target.path().join("projects.csv");
    fs::write(
        &input,
        format!(
            "{},7\n{},seven\n{}\n",
            path_str(&repos[0].1),
            path_str(&repos[1].1),
            path_str(&repos[1].1)
        ),
    )
    .unwrap();

    let run = start(test_settings(target.path()));
    let fed = run.feed_from(&input).unwrap();
    let summary = run.finalize().unwrap();

    assert_eq!((fed.scheduled, fed.invalid), (2, 1));
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.errors, 0);
    assert!(project_root(target.path(), 7).join("log.csv").is_file());
    // the auto-assigned id lands above the replayed one
    assert!(project_root(target.path(), 8).join("log.csv").is_file());
}

#[test]
fn test_keep_repos_and_compaction() {
    let target = TempDir::new().unwrap();
    let (_dir, path, repo) = create_test_repo();
    for i in 0..9 {
        add_commit(&repo, &[("gen.js", format!("version {}", i).as_bytes())], "bump");
    }

    let mut settings = test_settings(target.path());
    settings.keep_repos = true;
    let run = start(settings);
    let id = run.schedule_url(&path_str(&path));
    let summary = run.finalize().unwrap();

    assert_eq!(summary.distinct_contents, 9);
    assert!(project_root(target.path(), id).join("repo/gen.js").is_file());
    // fan-out 4: ids 0-3 and 4-7 fill two shards, 8 stays raw
    let files = target.path().join("files");
    assert!(files.join("files.tar.gz").is_file());
    assert!(files.join("files_1/files.tar.gz").is_file());
    assert!(files.join("files_2/8.raw").is_file());
}

#[cfg(target_os = "linux")]
#[test]
fn test_stamp_is_written_when_mapping_flush_fails() {
    let device = Path::new("/dev/full");
    if !device.exists() {
        return;
    }
    let target = TempDir::new().unwrap();
    let repos = sample_repos();
    // every flush of the mapping file runs out of space
    std::os::unix::fs::symlink(device, target.path().join("content_hashes.csv")).unwrap();

    let run = start(test_settings(target.path()));
    let id = run.schedule_url(&path_str(&repos[0].1));
    assert!(run.finalize().is_err());

    let failed = fs::read_to_string(target.path().join("failed_projects.csv")).unwrap();
    assert_eq!(failed, format!("{},{}\n", path_str(&repos[0].1), id));
    let stamp = fs::read_to_string(target.path().join("runs_downloader.csv")).unwrap();
    let fields: Vec<&str> = stamp.trim_end().split(',').collect();
    assert_eq!(fields.len(), 6);
    assert_eq!(&fields[1..3], &["1", "1"]);
}
