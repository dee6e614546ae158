//! Per-user runtime directory for forwarding sockets.
//!
//! Resolution happens once, at the composition boundary (dialer or
//! connector construction); the tunnel itself only ever sees an injected
//! path.

use crate::error::Result;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;

/// Resolves the directory that holds ssh forwarding sockets.
///
/// `$XDG_RUNTIME_DIR` wins when set. The fallback is
/// `/tmp/podlink-runtime-<user>`, created with mode `0700`. An existing
/// fallback must be a real directory (not a symlink, so it cannot be
/// pointed elsewhere), owned by the current user, with no group/other
/// access; anything else is removed and recreated.
///
/// Multiple tunnels in one process share the directory but never the same
/// socket file, so creation is idempotent.
///
/// # Errors
///
/// Returns an I/O error when the fallback cannot be inspected or created.
pub fn runtime_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(dir));
    }

    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| {
            // SAFETY: getuid never fails.
            let uid = unsafe { libc::getuid() };
            uid.to_string()
        });
    let fallback = PathBuf::from(format!("/tmp/podlink-runtime-{user}"));

    match fs::symlink_metadata(&fallback) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            create_private_dir(&fallback)?;
        }
        Err(e) => return Err(e.into()),
        Ok(meta) => {
            // SAFETY: getuid never fails.
            let uid = unsafe { libc::getuid() };
            let mode = meta.permissions().mode();
            if !meta.is_dir() {
                tracing::warn!(path = %fallback.display(), "runtime dir fallback is not a directory, replacing");
                fs::remove_file(&fallback)?;
                create_private_dir(&fallback)?;
            } else if meta.uid() != uid || mode & 0o077 != 0 {
                tracing::warn!(
                    path = %fallback.display(),
                    mode = format!("{:o}", mode & 0o777),
                    "runtime dir fallback has unsafe ownership or permissions, replacing"
                );
                fs::remove_dir(&fallback)?;
                create_private_dir(&fallback)?;
            }
        }
    }

    Ok(fallback)
}

fn create_private_dir(path: &std::path::Path) -> Result<()> {
    fs::create_dir(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(())
}
