/*!
 * Pass-Through Fidelity Tests
 * Operations on paths untouched by any manifest behave exactly like
 * the underlying filesystem
 */

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use scriptfs::{FilesystemFacade, FsError, Mount};
use tempfile::TempDir;

fn setup() -> (TempDir, FilesystemFacade) {
    let temp = TempDir::new().unwrap();
    let mount = Arc::new(Mount::new(temp.path(), temp.path()).unwrap());
    (temp, FilesystemFacade::new(mount))
}

#[test]
fn test_read_matches_underlying_bytes() {
    let (temp, fs_facade) = setup();
    fs::write(temp.path().join("data.bin"), b"\x00\x01binary\xff").unwrap();

    let fh = fs_facade.open("/data.bin", libc::O_RDONLY).unwrap();
    let via_facade = fs_facade.read("/data.bin", 4096, 0, fh).unwrap();
    fs_facade.release("/data.bin", fh).unwrap();

    assert_eq!(via_facade, fs::read(temp.path().join("data.bin")).unwrap());
}

#[test]
fn test_getattr_matches_lstat() {
    let (temp, fs_facade) = setup();
    let backing = temp.path().join("file.txt");
    fs::write(&backing, b"hello").unwrap();

    let stat = fs_facade.getattr("/file.txt").unwrap();
    let md = fs::symlink_metadata(&backing).unwrap();

    assert_eq!(stat.size, md.size());
    assert_eq!(stat.mode, md.mode());
    assert_eq!(stat.uid, md.uid());
    assert_eq!(stat.gid, md.gid());
    assert_eq!(stat.nlink as u64, md.nlink());
}

#[test]
fn test_getattr_missing_path_is_not_found() {
    let (_temp, fs_facade) = setup();
    assert!(matches!(
        fs_facade.getattr("/never-created"),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn test_readdir_matches_fs_listing() {
    let (temp, fs_facade) = setup();
    fs::write(temp.path().join("one.txt"), b"1").unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();

    let mut names: Vec<_> = fs_facade
        .readdir("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec![".", "..", "one.txt", "sub"]);
}

#[test]
fn test_mutations_reflect_on_backing_store() {
    let (temp, fs_facade) = setup();

    fs_facade.mkdir("/made", 0o755).unwrap();
    assert!(temp.path().join("made").is_dir());

    let fh = fs_facade.create("/made/f.txt", 0o644).unwrap();
    fs_facade.write("/made/f.txt", b"contents", 0, fh).unwrap();
    fs_facade.release("/made/f.txt", fh).unwrap();
    assert_eq!(fs::read(temp.path().join("made/f.txt")).unwrap(), b"contents");

    fs_facade.rename("/made/f.txt", "/made/g.txt").unwrap();
    assert!(!temp.path().join("made/f.txt").exists());
    assert_eq!(fs::read(temp.path().join("made/g.txt")).unwrap(), b"contents");

    fs_facade.truncate("/made/g.txt", 3).unwrap();
    assert_eq!(fs::read(temp.path().join("made/g.txt")).unwrap(), b"con");

    fs_facade.unlink("/made/g.txt").unwrap();
    assert!(!temp.path().join("made/g.txt").exists());

    fs_facade.rmdir("/made").unwrap();
    assert!(!temp.path().join("made").exists());
}

#[test]
fn test_symlink_and_readlink() {
    let (temp, fs_facade) = setup();
    fs::write(temp.path().join("target.txt"), b"t").unwrap();

    fs_facade
        .symlink("/alias.txt", Path::new("target.txt"))
        .unwrap();
    assert_eq!(
        fs_facade.readlink("/alias.txt").unwrap(),
        Path::new("target.txt")
    );
    // The link resolves through the backing filesystem.
    assert_eq!(fs::read(temp.path().join("alias.txt")).unwrap(), b"t");
}

#[test]
fn test_hard_link_shares_content() {
    let (temp, fs_facade) = setup();
    fs::write(temp.path().join("orig.txt"), b"shared").unwrap();

    fs_facade.link("/hard.txt", "/orig.txt").unwrap();
    assert_eq!(fs::read(temp.path().join("hard.txt")).unwrap(), b"shared");
    assert_eq!(
        fs::symlink_metadata(temp.path().join("orig.txt"))
            .unwrap()
            .nlink(),
        2
    );
}

#[test]
fn test_statfs_reports_backing_filesystem() {
    let (_temp, fs_facade) = setup();
    let stats = fs_facade.statfs("/").unwrap();
    assert!(stats.bsize > 0);
    assert!(stats.blocks > 0);
}

#[test]
fn test_concurrent_reads_on_shared_handle() {
    let (temp, fs_facade) = setup();
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    fs::write(temp.path().join("big.bin"), &payload).unwrap();

    let fs_facade = Arc::new(fs_facade);
    let fh = fs_facade.open("/big.bin", libc::O_RDONLY).unwrap();

    let mut handles = Vec::new();
    for chunk in 0..8u64 {
        let fs_facade = fs_facade.clone();
        let expected = payload[(chunk * 8192) as usize..((chunk + 1) * 8192) as usize].to_vec();
        handles.push(std::thread::spawn(move || {
            for _ in 0..20 {
                let got = fs_facade
                    .read("/big.bin", 8192, (chunk * 8192) as i64, fh)
                    .unwrap();
                // The per-handle lock keeps seek+read atomic, so every
                // read sees exactly its own range.
                assert_eq!(got, expected);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
