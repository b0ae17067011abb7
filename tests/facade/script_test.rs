/*!
 * Virtual File Tests
 * Manifest-declared entries: listing, generation, read-only
 * enforcement, and degradation when a generator breaks
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use scriptfs::{FilesystemFacade, FsError, Mount, MANIFEST_FILE};
use tempfile::TempDir;

fn setup_with_manifest(manifest: &str) -> (TempDir, FilesystemFacade) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(MANIFEST_FILE), manifest).unwrap();
    let mount = Arc::new(Mount::new(temp.path(), temp.path()).unwrap());
    (temp, FilesystemFacade::new(mount))
}

fn read_all(fs_facade: &FilesystemFacade, path: &str) -> Vec<u8> {
    let fh = fs_facade.open(path, libc::O_RDONLY).unwrap();
    let data = fs_facade.read(path, 1 << 20, 0, fh).unwrap();
    fs_facade.release(path, fh).unwrap();
    data
}

#[test]
fn test_end_to_end_listing_and_read() {
    let (temp, fs_facade) = setup_with_manifest("- filename: b.txt\n  out_script: echo hello\n");
    fs::write(temp.path().join("a.txt"), b"real bytes").unwrap();

    let names: Vec<_> = fs_facade
        .readdir("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert!(names.contains(&"a.txt".to_string()));
    assert!(names.contains(&"b.txt".to_string()));

    assert_eq!(read_all(&fs_facade, "/b.txt"), b"hello\n");
    assert_eq!(read_all(&fs_facade, "/a.txt"), b"real bytes");
}

#[test]
fn test_virtual_getattr_is_synthetic() {
    let (_temp, fs_facade) =
        setup_with_manifest("- filename: gen.txt\n  out_script: printf 12345\n");

    let stat = fs_facade.getattr("/gen.txt").unwrap();
    assert!(stat.is_file());
    assert_eq!(stat.size, 5);
    assert_eq!(stat.nlink, 1);
    assert_eq!(stat.mode & 0o777, 0o440);
    assert_eq!(stat.mtime, std::time::UNIX_EPOCH);
}

#[test]
fn test_real_entry_shadows_virtual_for_any_order() {
    let manifests = [
        concat!(
            "- filename: b.txt\n  out_script: echo virtual\n",
            "- filename: other\n  out_script: echo x\n",
        ),
        concat!(
            "- filename: other\n  out_script: echo x\n",
            "- filename: b.txt\n  out_script: echo virtual\n",
        ),
    ];

    for manifest in manifests {
        let (temp, fs_facade) = setup_with_manifest(manifest);
        fs::write(temp.path().join("b.txt"), b"real wins").unwrap();

        assert_eq!(read_all(&fs_facade, "/b.txt"), b"real wins");

        // Listing reports the shadowed name exactly once.
        let count = fs_facade
            .readdir("/")
            .unwrap()
            .into_iter()
            .filter(|e| e.name == "b.txt")
            .count();
        assert_eq!(count, 1);
    }
}

#[test]
fn test_read_offsets_clip_to_content() {
    let (_temp, fs_facade) =
        setup_with_manifest("- filename: gen.txt\n  out_script: printf hello\n");

    let fh = fs_facade.open("/gen.txt", libc::O_RDONLY).unwrap();
    assert_eq!(fs_facade.read("/gen.txt", 5, 0, fh).unwrap(), b"hello");
    // Overrunning size returns the valid-range tail only.
    assert_eq!(fs_facade.read("/gen.txt", 100, 3, fh).unwrap(), b"lo");
    // At or past the end: empty, never an error.
    assert_eq!(fs_facade.read("/gen.txt", 10, 5, fh).unwrap(), b"");
    assert_eq!(fs_facade.read("/gen.txt", 10, 9999, fh).unwrap(), b"");
    fs_facade.release("/gen.txt", fh).unwrap();
}

#[test]
fn test_every_mutation_is_permission_denied() {
    let (_temp, fs_facade) =
        setup_with_manifest("- filename: gen.txt\n  out_script: printf hi\n");

    let denied = |result: Result<(), FsError>| {
        assert!(matches!(result, Err(FsError::PermissionDenied(_))));
    };

    let fh = fs_facade.open("/gen.txt", libc::O_WRONLY).unwrap();
    assert!(matches!(
        fs_facade.write("/gen.txt", b"x", 0, fh),
        Err(FsError::PermissionDenied(_))
    ));
    fs_facade.release("/gen.txt", fh).unwrap();

    denied(fs_facade.truncate("/gen.txt", 0));
    denied(fs_facade.chmod("/gen.txt", 0o777));
    denied(fs_facade.chown("/gen.txt", Some(0), Some(0)));
    denied(fs_facade.unlink("/gen.txt"));
    denied(fs_facade.rename("/gen.txt", "/elsewhere.txt"));
    denied(fs_facade.mkdir("/gen.txt", 0o755));
    denied(fs_facade.rmdir("/gen.txt"));
    denied(fs_facade.mknod("/gen.txt", libc::S_IFREG as u32 | 0o644, 0));
    denied(fs_facade.symlink("/gen.txt", Path::new("target")));
    denied(fs_facade.link("/gen.txt", "/somewhere"));
    denied(fs_facade.utimens("/gen.txt", None, None));
    denied(fs_facade.setxattr("/gen.txt", std::ffi::OsStr::new("user.x"), b"v"));
    assert!(matches!(
        fs_facade.readdir("/gen.txt"),
        Err(FsError::PermissionDenied(_))
    ));

    assert!(matches!(
        fs_facade.create("/gen.txt", 0o644),
        Err(FsError::PermissionDenied(_))
    ));
}

#[test]
fn test_denied_mutation_leaves_cache_untouched() {
    let temp = TempDir::new().unwrap();
    let counter = temp.path().join("count");
    fs::write(temp.path().join("watched"), "v1").unwrap();
    let manifest = format!(
        concat!(
            "- filename: gen.txt\n",
            "  out_script: \"echo x >> \\\"$CNT\\\"; printf hi\"\n",
            "  env:\n",
            "    CNT: {}\n",
            "  cache:\n",
            "    method: stat\n",
            "    path: watched\n",
        ),
        counter.display()
    );
    fs::write(temp.path().join(MANIFEST_FILE), manifest).unwrap();
    let mount = Arc::new(Mount::new(temp.path(), temp.path()).unwrap());
    let fs_facade = FilesystemFacade::new(mount);

    assert_eq!(read_all(&fs_facade, "/gen.txt"), b"hi");
    let runs_before = fs::read_to_string(&counter).unwrap().lines().count();
    assert_eq!(runs_before, 1);

    assert!(fs_facade.truncate("/gen.txt", 0).is_err());
    assert!(fs_facade.chmod("/gen.txt", 0o777).is_err());

    // Cached state survives rejected mutations: the next read reuses
    // the stored value without another generator run.
    assert_eq!(read_all(&fs_facade, "/gen.txt"), b"hi");
    let runs_after = fs::read_to_string(&counter).unwrap().lines().count();
    assert_eq!(runs_after, 1);
}

#[test]
fn test_failing_generator_degrades_to_diagnostic_content() {
    let (temp, fs_facade) =
        setup_with_manifest("- filename: broken.txt\n  out_script: \"echo doom >&2; exit 1\"\n");
    fs::write(temp.path().join("fine.txt"), b"still fine").unwrap();

    let diagnostic = read_all(&fs_facade, "/broken.txt");
    assert!(!diagnostic.is_empty());
    let text = String::from_utf8_lossy(&diagnostic);
    assert!(text.contains("doom"));

    // The mount stays responsive for unrelated operations.
    assert_eq!(read_all(&fs_facade, "/fine.txt"), b"still fine");
    assert!(fs_facade.readdir("/").is_ok());
}

#[test]
fn test_virtual_open_flush_fsync_release_succeed() {
    let (_temp, fs_facade) =
        setup_with_manifest("- filename: gen.txt\n  out_script: printf hi\n");

    let fh = fs_facade.open("/gen.txt", libc::O_RDONLY).unwrap();
    fs_facade.flush("/gen.txt", fh).unwrap();
    fs_facade.fsync("/gen.txt", false, fh).unwrap();
    fs_facade.fsync("/gen.txt", true, fh).unwrap();
    fs_facade.release("/gen.txt", fh).unwrap();
}

#[test]
fn test_virtual_access_always_succeeds() {
    let (_temp, fs_facade) =
        setup_with_manifest("- filename: gen.txt\n  out_script: printf hi\n");
    fs_facade.access("/gen.txt", libc::R_OK).unwrap();
}

#[test]
fn test_workdir_and_root_reach_the_generator() {
    let temp = TempDir::new().unwrap();
    let workdir = temp.path().join("inner");
    fs::create_dir(&workdir).unwrap();
    let manifest = concat!(
        "- filename: where.txt\n",
        "  out_script: \"printf '%s|%s' \\\"$(pwd)\\\" \\\"$ROOT\\\"\"\n",
        "  workdir: inner\n",
    );
    fs::write(temp.path().join(MANIFEST_FILE), manifest).unwrap();
    let mount = Arc::new(Mount::new(temp.path(), temp.path()).unwrap());
    let mountpoint = mount.mountpoint().to_path_buf();
    let fs_facade = FilesystemFacade::new(mount);

    let out = String::from_utf8(read_all(&fs_facade, "/where.txt")).unwrap();
    let (pwd, root) = out.split_once('|').unwrap();
    assert_eq!(Path::new(pwd), workdir.canonicalize().unwrap());
    assert_eq!(Path::new(root), mountpoint);
}

#[test]
fn test_manifest_edits_apply_without_remount() {
    let (temp, fs_facade) = setup_with_manifest("- filename: v1.txt\n  out_script: printf one\n");

    assert_eq!(read_all(&fs_facade, "/v1.txt"), b"one");
    assert!(matches!(
        fs_facade.getattr("/v2.txt"),
        Err(FsError::NotFound(_))
    ));

    fs::write(
        temp.path().join(MANIFEST_FILE),
        "- filename: v2.txt\n  out_script: printf two\n",
    )
    .unwrap();

    // Manifests are re-read on every resolution.
    assert_eq!(read_all(&fs_facade, "/v2.txt"), b"two");
    assert!(matches!(
        fs_facade.getattr("/v1.txt"),
        Err(FsError::NotFound(_))
    ));
}
