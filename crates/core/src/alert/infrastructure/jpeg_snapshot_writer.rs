use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;

use crate::alert::domain::snapshot_writer::{AlertError, SnapshotWriter};
use crate::shared::frame::Frame;

/// Writes alert snapshots as
/// `<dir>/alert_<session>_<YYYYmmdd-HHMMSS>.jpg`.
///
/// A second alert for the same session within the same second gets a
/// `_<n>` suffix instead of replacing the first.
pub struct JpegSnapshotWriter {
    dir: PathBuf,
    quality: u8,
}

const MAX_COLLISIONS: u32 = 10_000;

impl JpegSnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality: quality.clamp(1, 100),
        }
    }

    fn create_unique(&self, stem: &str) -> Result<(PathBuf, fs::File), AlertError> {
        for n in 0..MAX_COLLISIONS {
            let name = if n == 0 {
                format!("{stem}.jpg")
            } else {
                format!("{stem}_{n}.jpg")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(AlertError::Persistence { path, source }),
            }
        }
        Err(AlertError::Persistence {
            path: self.dir.join(format!("{stem}.jpg")),
            source: std::io::Error::new(ErrorKind::AlreadyExists, "too many snapshots this second"),
        })
    }
}

impl SnapshotWriter for JpegSnapshotWriter {
    fn persist(
        &self,
        session_id: &str,
        frame: &Frame,
        timestamp: &DateTime<Local>,
    ) -> Result<PathBuf, AlertError> {
        let image = frame
            .to_rgb_image()
            .ok_or_else(|| AlertError::Encode("frame is not RGB".to_string()))?;

        fs::create_dir_all(&self.dir).map_err(|source| AlertError::Persistence {
            path: self.dir.clone(),
            source,
        })?;

        let stem = format!(
            "alert_{}_{}",
            sanitize(session_id),
            timestamp.format("%Y%m%d-%H%M%S")
        );
        let (path, file) = self.create_unique(&stem)?;

        let mut writer = BufWriter::new(file);
        let encoded = JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(&image)
            .map_err(|e| AlertError::Encode(e.to_string()))
            .and_then(|_| {
                writer.flush().map_err(|source| AlertError::Persistence {
                    path: path.clone(),
                    source,
                })
            });
        if let Err(e) = encoded {
            drop(writer);
            discard(&path);
            return Err(e);
        }
        Ok(path)
    }
}

/// Keeps session ids from escaping the alert directory.
fn sanitize(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::debug!("Could not remove partial snapshot {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_filename_carries_session_and_time() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JpegSnapshotWriter::new(dir.path(), 90);
        let path = writer
            .persist("alice", &Frame::filled(16, 16, [10, 20, 30], 0), &timestamp())
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "alert_alice_20240309-140507.jpg"
        );
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_same_second_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JpegSnapshotWriter::new(dir.path(), 90);
        let frame = Frame::filled(8, 8, [0, 0, 0], 0);
        let first = writer.persist("bob", &frame, &timestamp()).unwrap();
        let second = writer.persist("bob", &frame, &timestamp()).unwrap();
        let third = writer.persist("bob", &frame, &timestamp()).unwrap();
        assert_ne!(first, second);
        assert!(second.to_str().unwrap().ends_with("_1.jpg"));
        assert!(third.to_str().unwrap().ends_with("_2.jpg"));
    }

    #[test]
    fn test_snapshot_decodes_to_original_colours() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JpegSnapshotWriter::new(dir.path(), 95);
        let path = writer
            .persist("carol", &Frame::filled(32, 32, [200, 40, 40], 0), &timestamp())
            .unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        let px = decoded.get_pixel(16, 16).0;
        assert!((px[0] as i32 - 200).abs() < 12);
        assert!((px[1] as i32 - 40).abs() < 12);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("alerts");
        let writer = JpegSnapshotWriter::new(&nested, 90);
        writer
            .persist("dave", &Frame::filled(4, 4, [1, 2, 3], 0), &timestamp())
            .unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_session_id_cannot_escape_directory() {
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize(""), "anonymous");
    }

    #[test]
    fn test_unwritable_directory_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let writer = JpegSnapshotWriter::new(blocker.join("alerts"), 90);
        let result = writer.persist("erin", &Frame::filled(4, 4, [0, 0, 0], 0), &timestamp());
        assert!(matches!(result, Err(AlertError::Persistence { .. })));
    }
}
