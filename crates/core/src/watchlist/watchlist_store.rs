use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::shared::constants::WATCHLIST_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::watchlist::domain::face_analyzer::FaceAnalyzer;
use crate::watchlist::domain::watchlist_snapshot::{WatchlistEncoding, WatchlistSnapshot};

/// Why a reference image contributed no encoding.
#[derive(Error, Debug)]
pub enum WatchlistError {
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("no face found in {0}")]
    NoFace(PathBuf),
}

/// Holds the active watchlist snapshot and matches frames against it.
///
/// Readers clone the snapshot `Arc` and keep using it for as long as they
/// like; a refresh builds the next snapshot without holding any lock that
/// readers take, then swaps the pointer.
pub struct WatchlistStore {
    current: RwLock<Arc<WatchlistSnapshot>>,
    analyzer: Option<Arc<FaceAnalyzer>>,
    tolerance: f64,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl WatchlistStore {
    pub fn new(analyzer: Option<Arc<FaceAnalyzer>>, tolerance: f64) -> Self {
        if analyzer.is_none() {
            log::warn!("No face model configured; watchlist matching is disabled");
        }
        Self {
            current: RwLock::new(Arc::new(WatchlistSnapshot::default())),
            analyzer,
            tolerance,
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn is_enabled(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn current(&self) -> Arc<WatchlistSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Builds a snapshot from the reference images in `dir` without
    /// publishing it.
    ///
    /// Images are read in file-name order. Unreadable images and images
    /// without a face are logged and skipped. A missing directory yields an
    /// empty snapshot.
    pub fn load(&self, dir: &Path) -> WatchlistSnapshot {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(analyzer) = self.analyzer.as_deref() else {
            return WatchlistSnapshot::new(generation, Vec::new());
        };

        let mut entries = Vec::new();
        for path in reference_images(dir) {
            match encode_reference(analyzer, &path) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping watchlist image: {e}"),
            }
        }
        log::info!(
            "Loaded {} watchlist encodings from {} (generation {generation})",
            entries.len(),
            dir.display()
        );
        WatchlistSnapshot::new(generation, entries)
    }

    /// Reloads `dir` and publishes the result. Matches already holding the
    /// previous snapshot finish against it.
    pub fn refresh(&self, dir: &Path) -> Arc<WatchlistSnapshot> {
        let _serial = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(self.load(dir));
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&next);
        next
    }

    /// True when any face in `frame` lies within tolerance of a reference.
    ///
    /// An empty snapshot matches nothing and skips face analysis entirely.
    pub fn matches(&self, frame: &Frame, snapshot: &WatchlistSnapshot) -> bool {
        if snapshot.is_empty() {
            return false;
        }
        let Some(analyzer) = self.analyzer.as_deref() else {
            return false;
        };

        let encodings = match analyzer.encodings(frame) {
            Ok(encodings) => encodings,
            Err(e) => {
                log::warn!("Face analysis failed on frame {}: {e}", frame.index());
                return false;
            }
        };

        encodings.iter().any(|encoding| {
            match snapshot.nearest_within(encoding, self.tolerance) {
                Some((hit, distance)) => {
                    log::debug!(
                        "Frame {} matches watchlist entry {} (distance {distance:.3})",
                        frame.index(),
                        hit.source
                    );
                    true
                }
                None => false,
            }
        })
    }
}

fn reference_images(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::info!("Watchlist directory {} unavailable: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_watchlist_extension(path))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    paths
}

fn has_watchlist_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| WATCHLIST_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn encode_reference(analyzer: &FaceAnalyzer, path: &Path) -> Result<WatchlistEncoding, WatchlistError> {
    let decode_error = |reason: String| WatchlistError::Decode {
        path: path.to_path_buf(),
        reason,
    };
    let image = image::open(path).map_err(|e| decode_error(e.to_string()))?;
    let frame = Frame::from_rgb_image(image.to_rgb8(), 0);

    let vector = analyzer
        .first_encoding(&frame)
        .map_err(|e| decode_error(e.to_string()))?
        .ok_or_else(|| WatchlistError::NoFace(path.to_path_buf()))?;

    Ok(WatchlistEncoding {
        vector,
        source: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}
