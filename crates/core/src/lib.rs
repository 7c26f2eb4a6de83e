//! Per-session video analysis: anomaly detection, watchlist matching,
//! asynchronous alerts and MJPEG streaming.
//!
//! [`service::MonitorService`] is the entry point.

pub mod alert {
    pub mod alert_dispatcher;
    pub mod domain {
        pub mod alert_event;
        pub mod notifier;
        pub mod snapshot_writer;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod annotator;
        pub mod background_model;
        pub mod detection_engine;
        pub mod detection_result;
        pub mod model_ref;
        pub mod motion_detector;
        pub mod object_detector;
    }
    pub mod infrastructure;
}

pub mod jobs {
    pub mod job_pool;
}

pub mod pipeline {
    pub mod analyze_video_use_case;
    pub mod frame_pipeline;
    pub mod pipeline_logger;
}

pub mod service;

pub mod session {
    pub mod monitor_session;
    pub mod session_registry;
}

pub mod shared;

pub mod stream {
    pub mod frame_sequence;
    pub mod mjpeg_encoder;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
        pub mod source_spec;
    }
    pub mod infrastructure;
}

pub mod watchlist {
    pub mod domain {
        pub mod face_analyzer;
        pub mod face_encoder;
        pub mod face_locator;
        pub mod watchlist_snapshot;
    }
    pub mod infrastructure;
    pub mod watchlist_store;
}
