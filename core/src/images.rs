//! Image checksum warmup
//!
//! Disk images are large and their checksums are requested repeatedly
//! by backends at boot. Precomputing a `.crc32` sidecar per image once
//! at startup turns those requests into a file read. Runs as a
//! detached background job: a failure here never blocks startup.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::Result;

const SIDECAR_EXT: &str = "crc32";

fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = image.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXT);
    PathBuf::from(name)
}

fn is_sidecar(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == SIDECAR_EXT)
}

fn checksum_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:08x}", hasher.finalize()))
}

/// Walk `images_dir` and write a `<file>.crc32` sidecar next to every
/// image that does not already have one. Returns the number of
/// checksums computed. A missing directory is not an error, just a
/// fresh install with no images yet.
pub async fn precompute_image_checksums(images_dir: PathBuf) -> Result<usize> {
    tokio::task::spawn_blocking(move || {
        if !images_dir.is_dir() {
            debug!(dir = %images_dir.display(), "image directory absent, skipping checksum warmup");
            return Ok(0);
        }

        let mut computed = 0usize;
        for entry in WalkDir::new(&images_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || is_sidecar(path) {
                continue;
            }
            let sidecar = sidecar_path(path);
            if sidecar.exists() {
                continue;
            }
            match checksum_file(path) {
                Ok(digest) => {
                    if let Err(e) = std::fs::write(&sidecar, &digest) {
                        warn!(image = %path.display(), error = %e, "failed to write checksum sidecar");
                        continue;
                    }
                    debug!(image = %path.display(), %digest, "computed image checksum");
                    computed += 1;
                }
                Err(e) => {
                    warn!(image = %path.display(), error = %e, "failed to checksum image");
                }
            }
        }
        Ok(computed)
    })
    .await
    .map_err(|e| crate::errors::CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
