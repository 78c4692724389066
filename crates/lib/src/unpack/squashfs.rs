//! Squashfs fallback.
//!
//! The image is written to a scratch file, loop-mounted read-only, and its
//! tree is copied out with a tar pipe. The mount is released by a guard so
//! it is undone on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use super::UnpackError;

/// Copy the contents of the squashfs image `data` into `dest`.
pub fn extract(data: &[u8], dest: &Path, tmp_dir: &Path) -> Result<(), UnpackError> {
  std::fs::create_dir_all(tmp_dir).map_err(|e| UnpackError::Filesystem {
    path: tmp_dir.to_path_buf(),
    source: e,
  })?;

  let mut image = tempfile::Builder::new()
    .prefix("revi-image-")
    .tempfile_in(tmp_dir)
    .map_err(|e| UnpackError::Filesystem {
      path: tmp_dir.to_path_buf(),
      source: e,
    })?;
  image
    .write_all(data)
    .and_then(|_| image.flush())
    .map_err(|e| UnpackError::Filesystem {
      path: image.path().to_path_buf(),
      source: e,
    })?;

  let mount_point = tempfile::Builder::new()
    .prefix("revi-mnt-")
    .tempdir_in(tmp_dir)
    .map_err(|e| UnpackError::Filesystem {
      path: tmp_dir.to_path_buf(),
      source: e,
    })?;

  // Declared after the scratch paths so it drops first.
  let _mounted = MountGuard::mount(image.path(), mount_point.path())?;

  debug!(image = ?image.path(), mount = ?mount_point.path(), dest = ?dest, "copying squashfs tree");
  copy_tree(mount_point.path(), dest)
}

/// Copy `src` into `dest` through a `tar -c | tar -x` pipe.
///
/// Both ends must exit successfully; a reader that dies early still leaves a
/// well-formed but short stream for the writer.
fn copy_tree(src: &Path, dest: &Path) -> Result<(), UnpackError> {
  let copy_error = |detail: String| UnpackError::Copy {
    dest: dest.to_path_buf(),
    detail,
  };

  let mut reader = Command::new("tar")
    .arg("-cC")
    .arg(src)
    .arg(".")
    .stdout(Stdio::piped())
    .spawn()
    .map_err(|e| copy_error(format!("failed to start tar -c: {}", e)))?;
  let stream = reader
    .stdout
    .take()
    .ok_or_else(|| copy_error("tar -c has no output stream".to_string()))?;

  let written = Command::new("tar").arg("-xpC").arg(dest).stdin(stream).status();
  let read = reader
    .wait()
    .map_err(|e| copy_error(format!("failed to wait for tar -c: {}", e)))?;
  let written = written.map_err(|e| copy_error(format!("failed to start tar -x: {}", e)))?;

  if !read.success() {
    return Err(copy_error(format!("tar -c exited with {}", read)));
  }
  if !written.success() {
    return Err(copy_error(format!("tar -x exited with {}", written)));
  }
  Ok(())
}

/// A read-only loop mount, unmounted on drop.
struct MountGuard {
  target: PathBuf,
}

impl MountGuard {
  fn mount(image: &Path, target: &Path) -> Result<Self, UnpackError> {
    let output = Command::new("mount")
      .args(["-t", "squashfs", "-o", "ro,loop"])
      .arg(image)
      .arg(target)
      .output()
      .map_err(|e| UnpackError::Mount {
        image: image.to_path_buf(),
        detail: e.to_string(),
      })?;

    if !output.status.success() {
      return Err(UnpackError::Mount {
        image: image.to_path_buf(),
        detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    debug!(image = ?image, target = ?target, "mounted squashfs image");
    Ok(Self {
      target: target.to_path_buf(),
    })
  }
}

impl Drop for MountGuard {
  fn drop(&mut self) {
    if let Err(e) = unmount(&self.target) {
      warn!(target = ?self.target, error = %e, "failed to unmount squashfs image");
    }
  }
}

#[cfg(target_os = "linux")]
fn unmount(target: &Path) -> std::io::Result<()> {
  rustix::mount::unmount(target, rustix::mount::UnmountFlags::empty())?;
  Ok(())
}

#[cfg(not(target_os = "linux"))]
fn unmount(target: &Path) -> std::io::Result<()> {
  let status = Command::new("umount").arg(target).status()?;
  if status.success() {
    Ok(())
  } else {
    Err(std::io::Error::other(format!("umount exited with {}", status)))
  }
}
