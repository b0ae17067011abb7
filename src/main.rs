/*!
 * scriptfs - Main Entry Point
 * Mounts a source directory as an overlay where manifests may declare
 * command-generated virtual files
 */

use std::fs;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use scriptfs::{init_tracing, FilesystemFacade, Mount};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(source), Some(mountpoint)) = (args.next(), args.next()) else {
        eprintln!("usage: scriptfs <source-directory> <mount-point>");
        std::process::exit(2);
    };

    fs::create_dir_all(&mountpoint)
        .with_context(|| format!("creating mount point {}", mountpoint))?;

    let mount = Mount::new(&source, &mountpoint)
        .with_context(|| format!("resolving {} and {}", source, mountpoint))?;
    info!(
        root = %mount.root().display(),
        mountpoint = %mount.mountpoint().display(),
        "mounting"
    );

    let target = mount.mountpoint().to_path_buf();
    let facade = FilesystemFacade::new(Arc::new(mount));
    scriptfs::fuse::mount(facade, &target).context("serving filesystem")?;

    info!("unmounted");
    Ok(())
}
