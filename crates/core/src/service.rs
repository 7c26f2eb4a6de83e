use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::alert::alert_dispatcher::AlertDispatcher;
use crate::alert::domain::alert_event::AlertEvent;
use crate::alert::domain::notifier::{CompositeNotifier, Notifier};
use crate::alert::infrastructure::bell_notifier::BellNotifier;
use crate::alert::infrastructure::jpeg_snapshot_writer::JpegSnapshotWriter;
use crate::alert::infrastructure::log_notifier::LogNotifier;
use crate::detection::domain::model_ref::ModelRef;
use crate::detection::infrastructure::model_cache::{ModelCache, ModelLoader};
use crate::jobs::job_pool::{JobHandle, JobPool};
use crate::pipeline::analyze_video_use_case::AnalyzeVideoUseCase;
use crate::pipeline::frame_pipeline::PipelineContext;
use crate::session::monitor_session::Session;
use crate::session::session_registry::{SessionError, SessionRegistry};
use crate::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL,
};
use crate::shared::model_resolver::{self, ProgressFn};
use crate::shared::settings::{ConfigError, Settings};
use crate::stream::frame_sequence::FrameSequence;
use crate::video::domain::frame_source::SourceOpener;
use crate::video::domain::source_spec::SourceSpec;
use crate::video::infrastructure::default_source_opener::DefaultSourceOpener;
use crate::watchlist::domain::face_analyzer::FaceAnalyzer;
use crate::watchlist::domain::face_encoder::FaceEncoder;
use crate::watchlist::domain::face_locator::FaceLocator;
use crate::watchlist::infrastructure::histogram_face_encoder::HistogramFaceEncoder;
use crate::watchlist::infrastructure::onnx_face_encoder::OnnxFaceEncoder;
use crate::watchlist::infrastructure::onnx_face_locator::OnnxFaceLocator;
use crate::watchlist::watchlist_store::WatchlistStore;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to store upload at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pluggable parts of a [`MonitorService`].
pub struct Collaborators {
    pub opener: Arc<dyn SourceOpener>,
    pub face_analyzer: Option<Arc<FaceAnalyzer>>,
    pub model_loader: Option<ModelLoader>,
    pub notifier: Box<dyn Notifier>,
}

impl Collaborators {
    /// Production wiring: ffmpeg and image sources, ONNX models, log
    /// notifications plus the terminal bell when enabled. Unset watchlist
    /// models are resolved from the model cache, downloading them on first
    /// use unless `watchlist.download_models` is off.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
        if settings.alerts.bell {
            notifiers.push(Box::new(BellNotifier));
        }
        Self {
            opener: Arc::new(DefaultSourceOpener),
            face_analyzer: face_analyzer(settings),
            model_loader: None,
            notifier: Box::new(CompositeNotifier::new(notifiers)),
        }
    }
}

/// Turns resolved model files into the watchlist's locator and encoder.
trait FaceModelLoader {
    fn locator(
        &self,
        path: &Path,
        confidence: f64,
    ) -> Result<Arc<dyn FaceLocator>, Box<dyn std::error::Error>>;

    fn encoder(&self, path: &Path) -> Result<Arc<dyn FaceEncoder>, Box<dyn std::error::Error>>;
}

struct OnnxFaceModels;

impl FaceModelLoader for OnnxFaceModels {
    fn locator(
        &self,
        path: &Path,
        confidence: f64,
    ) -> Result<Arc<dyn FaceLocator>, Box<dyn std::error::Error>> {
        Ok(Arc::new(OnnxFaceLocator::new(path, confidence)?))
    }

    fn encoder(&self, path: &Path) -> Result<Arc<dyn FaceEncoder>, Box<dyn std::error::Error>> {
        Ok(Arc::new(OnnxFaceEncoder::new(path)?))
    }
}

fn face_analyzer(settings: &Settings) -> Option<Arc<FaceAnalyzer>> {
    build_face_analyzer(settings, &OnnxFaceModels)
}

/// Watchlist matching is enabled whenever a face detector resolves and
/// loads. The encoder falls back to colour histograms.
fn build_face_analyzer(
    settings: &Settings,
    loader: &dyn FaceModelLoader,
) -> Option<Arc<FaceAnalyzer>> {
    let watchlist = &settings.watchlist;
    let face_model = model_path(
        settings,
        watchlist.face_model.as_deref(),
        FACE_MODEL_NAME,
        FACE_MODEL_URL,
    );
    let Some(face_model) = face_model else {
        log::warn!("No face model available; watchlist matching is disabled");
        return None;
    };
    let locator = match loader.locator(&face_model, watchlist.face_confidence) {
        Ok(locator) => locator,
        Err(e) => {
            log::error!("Failed to load face model {}: {e}", face_model.display());
            return None;
        }
    };
    log::info!("Watchlist face detector: {}", face_model.display());

    let embedding = model_path(
        settings,
        watchlist.embedding_model.as_deref(),
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
    );
    let encoder: Arc<dyn FaceEncoder> = match embedding.map(|path| (loader.encoder(&path), path)) {
        Some((Ok(encoder), _)) => encoder,
        Some((Err(e), path)) => {
            log::error!(
                "Failed to load embedding model {}: {e}; using colour histograms",
                path.display()
            );
            Arc::new(HistogramFaceEncoder::new())
        }
        None => {
            log::info!("No embedding model available; using colour histograms");
            Arc::new(HistogramFaceEncoder::new())
        }
    };

    Some(Arc::new(FaceAnalyzer::new(locator, encoder)))
}

/// A configured path wins; otherwise `name` is looked up in the model cache
/// and the data directory's `models/`, and downloaded when allowed.
fn model_path(
    settings: &Settings,
    configured: Option<&Path>,
    name: &str,
    url: &str,
) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(settings.resolve_path(path));
    }

    let cache_dir = match settings.watchlist.model_cache_dir.as_deref() {
        Some(dir) => settings.resolve_path(dir),
        None => match model_resolver::model_cache_dir() {
            Ok(dir) => dir,
            Err(e) => {
                log::warn!("Cannot locate the model cache: {e}");
                return model_resolver::find_in(&settings.model_dir(), name, None);
            }
        },
    };
    let bundled = settings.model_dir();
    if !settings.watchlist.download_models {
        return model_resolver::find_in(&cache_dir, name, Some(&bundled));
    }

    let label = name.to_string();
    let logged_decile = Cell::new(0);
    let progress: ProgressFn = Box::new(move |done, total| {
        let decile = if total > 0 { done * 10 / total } else { 0 };
        if decile > logged_decile.get() {
            logged_decile.set(decile);
            log::info!("{label}: {}% of {} MB", decile * 10, total / 1_000_000);
        }
    });
    match model_resolver::resolve_in(&cache_dir, name, url, Some(&bundled), Some(progress)) {
        Ok(path) => Some(path),
        Err(e) => {
            log::warn!("Cannot resolve {name}: {e}");
            None
        }
    }
}

/// Library entry point: live sessions, uploads and the watchlist behind
/// one object.
pub struct MonitorService {
    settings: Settings,
    context: PipelineContext,
    registry: SessionRegistry,
    analyze: Arc<AnalyzeVideoUseCase>,
    jobs: JobPool,
}

impl MonitorService {
    /// Creates the data directory layout and loads the watchlist.
    pub fn new(settings: Settings, collaborators: Collaborators) -> Result<Self, ConfigError> {
        settings.ensure_dirs()?;

        let confidence = settings.detection.confidence;
        let models = match collaborators.model_loader {
            Some(loader) => ModelCache::new(loader, confidence),
            None => ModelCache::onnx(confidence),
        };
        let watchlist = WatchlistStore::new(collaborators.face_analyzer, settings.watchlist.tolerance);
        watchlist.refresh(&settings.watchlist_dir());
        let alerts = AlertDispatcher::new(
            Box::new(JpegSnapshotWriter::new(settings.alert_dir(), settings.alerts.jpeg_quality)),
            collaborators.notifier,
            settings.alerts.queue_capacity,
            settings.alerts.journal_capacity,
        );

        let context = PipelineContext {
            models: Arc::new(models),
            watchlist: Arc::new(watchlist),
            alerts: Arc::new(alerts),
            motion: settings.motion.clone(),
        };
        let registry = SessionRegistry::new(
            Arc::clone(&collaborators.opener),
            context.clone(),
            settings.stream.jpeg_quality,
        );
        let analyze = Arc::new(AnalyzeVideoUseCase::new(collaborators.opener, context.clone()));
        let jobs = JobPool::new(settings.jobs.workers);

        Ok(Self {
            settings,
            context,
            registry,
            analyze,
            jobs,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Starts (or replaces) session `id` on `source`, analysed with the
    /// model configured for `role`. Unknown roles use motion detection.
    pub fn start_session(&self, id: &str, source: &str, role: &str) -> Result<Arc<Session>, SessionError> {
        let spec = match source.parse::<SourceSpec>() {
            Ok(spec) => spec,
            Err(never) => match never {},
        };
        self.registry.start(id, spec, self.model_for(role))
    }

    pub fn session(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.registry.get(id)
    }

    pub fn sessions(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// The session's multipart JPEG stream; see
    /// [`STREAM_CONTENT_TYPE`](crate::shared::constants::STREAM_CONTENT_TYPE).
    pub fn stream(&self, id: &str) -> Result<FrameSequence, SessionError> {
        self.registry.get(id)?.take_stream()
    }

    pub fn stop_session(&self, id: &str) -> Result<(), SessionError> {
        self.registry.stop(id)
    }

    /// Stores `payload` under the upload directory and analyses it in the
    /// background.
    pub fn upload(&self, id: &str, role: &str, payload: &[u8]) -> Result<JobHandle, UploadError> {
        let path = self.settings.upload_dir().join(format!("{}.mp4", Uuid::new_v4()));
        fs::write(&path, payload).map_err(|source| UploadError::Persist {
            path: path.clone(),
            source,
        })?;
        log::info!("Stored upload for {id} at {}", path.display());
        Ok(self.process_file(id, role, &path))
    }

    /// Analyses an existing video file in the background.
    pub fn process_file(&self, id: &str, role: &str, path: &Path) -> JobHandle {
        let analyze = Arc::clone(&self.analyze);
        let session_id = id.to_string();
        let spec = SourceSpec::File(path.to_path_buf());
        let model = self.model_for(role);
        self.jobs.submit(id, move || {
            analyze
                .execute(&session_id, &spec, model.as_ref())
                .map_err(|e| e.to_string())
        })
    }

    /// Reloads the watchlist directory; returns the number of encodings now
    /// active.
    pub fn refresh_watchlist(&self) -> usize {
        self.context
            .watchlist
            .refresh(&self.settings.watchlist_dir())
            .len()
    }

    /// Whether a face detector is loaded, so watchlist matches can fire.
    pub fn watchlist_enabled(&self) -> bool {
        self.context.watchlist.is_enabled()
    }

    pub fn recent_alerts(&self) -> Vec<AlertEvent> {
        self.context.alerts.recent()
    }

    /// Blocks until every alert raised so far has been written and
    /// notified.
    pub fn flush_alerts(&self) {
        self.context.alerts.flush();
    }

    pub fn dropped_alerts(&self) -> u64 {
        self.context.alerts.dropped()
    }

    pub fn shutdown(&self) {
        self.registry.stop_all();
        self.flush_alerts();
    }

    fn model_for(&self, role: &str) -> Option<ModelRef> {
        let model = self.settings.model_for_role(role);
        if model.is_none() {
            log::info!("No model configured for role {role}; using motion detection");
        }
        model
    }
}
