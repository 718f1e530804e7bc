//! Health marker file support.
//!
//! An external supervisor watches the marker's mtime; a stale marker means
//! the process is unhealthy.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Refresh the health marker's modification time, creating it if needed.
pub fn touch_health_marker(path: &Path) -> io::Result<()> {
  if path.exists() {
    let file = OpenOptions::new().append(true).open(path)?;
    file.set_modified(SystemTime::now())
  } else {
    File::create(path).map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn creates_and_refreshes_marker() {
    let dir = std::env::temp_dir().join(format!("meridian-health-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let marker = dir.join("health.txt");

    touch_health_marker(&marker).unwrap();
    assert!(marker.exists());
    let first = std::fs::metadata(&marker).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    touch_health_marker(&marker).unwrap();
    let second = std::fs::metadata(&marker).unwrap().modified().unwrap();
    assert!(second >= first);

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
