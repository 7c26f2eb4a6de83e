use std::sync::Arc;

use crate::detection::domain::model_ref::ModelRef;
use crate::jobs::job_pool::JobReport;
use crate::pipeline::frame_pipeline::PipelineContext;
use crate::pipeline::pipeline_logger::LogPipelineLogger;
use crate::video::domain::frame_source::{SourceError, SourceOpener};
use crate::video::domain::source_spec::SourceSpec;

const PROGRESS_EVERY: usize = 50;

/// Runs a finite source through the detect → match → alert chain without
/// producing a stream. Alerts are the only output.
pub struct AnalyzeVideoUseCase {
    opener: Arc<dyn SourceOpener>,
    context: PipelineContext,
}

impl AnalyzeVideoUseCase {
    pub fn new(opener: Arc<dyn SourceOpener>, context: PipelineContext) -> Self {
        Self { opener, context }
    }

    pub fn execute(
        &self,
        session_id: &str,
        spec: &SourceSpec,
        model: Option<&ModelRef>,
    ) -> Result<JobReport, SourceError> {
        let mut source = self.opener.open(spec)?;
        let total = source.metadata().total_frames;
        let logger = LogPipelineLogger::new(session_id, PROGRESS_EVERY);
        let mut pipeline = self.context.pipeline(session_id, model, Box::new(logger));

        while let Some(frame) = source.read() {
            pipeline.process(&frame, total);
        }
        source.close();
        pipeline.finish();

        Ok(JobReport {
            frames: pipeline.frames(),
            alerts: pipeline.alerts_raised(),
        })
    }
}
