use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes through a sibling temp file so a crash never leaves a half-written save.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path_for(path);
    if let Err(error) = fs::write(&staging, text.as_bytes()) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    swap_into_place(&staging, path)
}

fn swap_into_place(staging: &Path, destination: &Path) -> io::Result<()> {
    match fs::remove_file(destination) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(staging);
            return Err(error);
        }
    }

    fs::rename(staging, destination).map_err(|error| {
        let _ = fs::remove_file(staging);
        error
    })
}

fn staging_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("director.save");
    path.with_file_name(format!("{file_name}.partial"))
}
