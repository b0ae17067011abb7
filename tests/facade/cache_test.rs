/*!
 * Cache Policy Tests
 * Generator invocation counts across reads for each policy
 */

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use scriptfs::{FilesystemFacade, Mount, MANIFEST_FILE};
use tempfile::TempDir;

/// Source tree with one virtual file whose generator appends a line to
/// a counter file on every run.
fn setup_counted(cache_yaml: &str) -> (TempDir, FilesystemFacade) {
    let temp = TempDir::new().unwrap();
    let counter = temp.path().join("count");
    let manifest = format!(
        concat!(
            "- filename: counted.txt\n",
            "  out_script: \"echo x >> \\\"$CNT\\\"; printf hello\"\n",
            "  env:\n",
            "    CNT: {}\n",
            "{}",
        ),
        counter.display(),
        cache_yaml,
    );
    fs::write(temp.path().join(MANIFEST_FILE), manifest).unwrap();
    let mount = Arc::new(Mount::new(temp.path(), temp.path()).unwrap());
    (temp, FilesystemFacade::new(mount))
}

fn runs(temp: &TempDir) -> usize {
    fs::read_to_string(temp.path().join("count"))
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

fn read_once(fs_facade: &FilesystemFacade, path: &str) -> Vec<u8> {
    let fh = fs_facade.open(path, libc::O_RDONLY).unwrap();
    let data = fs_facade.read(path, 4096, 0, fh).unwrap();
    fs_facade.release(path, fh).unwrap();
    data
}

#[test]
fn test_pass_through_runs_generator_every_read() {
    let (temp, fs_facade) = setup_counted("");

    for _ in 0..3 {
        assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    }
    assert_eq!(runs(&temp), 3);
}

#[test]
fn test_mtime_watch_runs_once_until_watch_changes() {
    let (temp, fs_facade) = setup_counted(concat!(
        "  cache:\n",
        "    method: stat\n",
        "    path: watched.txt\n",
    ));
    fs::write(temp.path().join("watched.txt"), "v1").unwrap();

    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(runs(&temp), 1);

    // The witness is the watched file's mtime; allow for coarse
    // filesystem timestamp granularity before touching it.
    thread::sleep(Duration::from_millis(1100));
    fs::write(temp.path().join("watched.txt"), "v2").unwrap();

    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(runs(&temp), 2);
}

#[test]
fn test_mtime_watch_recurse_sees_nested_changes() {
    let (temp, fs_facade) = setup_counted(concat!(
        "  cache:\n",
        "    method: stat\n",
        "    path: tree\n",
        "    recurse: true\n",
    ));
    let nested = temp.path().join("tree/deeper");
    fs::create_dir_all(&nested).unwrap();

    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(runs(&temp), 1);

    thread::sleep(Duration::from_millis(1100));
    fs::write(nested.join("new-file"), "x").unwrap();

    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(runs(&temp), 2);
}

#[test]
fn test_time_debounce_coalesces_reads_within_window() {
    let (temp, fs_facade) = setup_counted(concat!(
        "  cache:\n",
        "    method: debounce\n",
        "    window_secs: 1\n",
    ));

    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(runs(&temp), 1);

    thread::sleep(Duration::from_millis(1300));
    assert_eq!(read_once(&fs_facade, "/counted.txt"), b"hello");
    assert_eq!(runs(&temp), 2);
}

#[test]
fn test_policy_state_survives_re_resolution() {
    // Nodes are rebuilt on every resolution; the policy instance must
    // come from the mount registry, not the node.
    let (temp, fs_facade) = setup_counted(concat!(
        "  cache:\n",
        "    method: stat\n",
        "    path: watched.txt\n",
    ));
    fs::write(temp.path().join("watched.txt"), "v1").unwrap();

    // getattr and read both resolve fresh nodes.
    fs_facade.getattr("/counted.txt").unwrap();
    read_once(&fs_facade, "/counted.txt");
    fs_facade.getattr("/counted.txt").unwrap();
    assert_eq!(runs(&temp), 1);
}

#[test]
fn test_entries_watching_same_path_keep_separate_values() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("watched.txt"), "v1").unwrap();
    let manifest = concat!(
        "- filename: a.gen\n",
        "  out_script: printf a\n",
        "  cache:\n",
        "    method: stat\n",
        "    path: watched.txt\n",
        "- filename: b.gen\n",
        "  out_script: printf b\n",
        "  cache:\n",
        "    method: stat\n",
        "    path: watched.txt\n",
    );
    fs::write(temp.path().join(MANIFEST_FILE), manifest).unwrap();
    let mount = Arc::new(Mount::new(temp.path(), temp.path()).unwrap());
    let fs_facade = FilesystemFacade::new(mount);

    // One watch target, two entries: cached values never bleed across.
    assert_eq!(read_once(&fs_facade, "/a.gen"), b"a");
    assert_eq!(read_once(&fs_facade, "/b.gen"), b"b");
    assert_eq!(read_once(&fs_facade, "/a.gen"), b"a");
}
