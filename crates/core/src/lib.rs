//! Live face tracking with sampled emotion classification.
//!
//! A [`session::session_controller::SessionController`] owns one camera and
//! runs a capture thread and a processing thread per session. The processor
//! detects faces, keeps short-lived identities by centroid proximity,
//! classifies expressions on every Nth frame, and publishes an annotated
//! frame and an emotion summary that any number of readers can poll.

pub mod annotation {
    pub mod domain {
        pub mod frame_annotator;
    }
    pub mod infrastructure {
        pub mod box_annotator;
    }
}

pub mod detection {
    pub mod domain {
        pub mod face_detector;
        pub mod face_tracker;
    }
    pub mod infrastructure;
}

pub mod emotion {
    pub mod domain {
        pub mod emotion;
        pub mod emotion_classifier;
        pub mod emotion_summary;
    }
    pub mod infrastructure {
        pub mod onnx_emotion_classifier;
    }
}

pub mod pipeline {
    pub mod frame_channel;
    pub mod frame_processor;
    pub mod frame_stream;
    pub mod live_feed;
    pub mod pipeline_config;
    pub mod pipeline_logger;
    pub mod infrastructure {
        pub mod threaded_session_pipeline;
    }
}

pub mod session {
    pub mod domain {
        pub mod session;
        pub mod session_repository;
    }
    pub mod infrastructure {
        pub mod in_memory_session_repository;
        pub mod json_file_session_repository;
        pub mod session_tables;
    }
    pub mod session_controller;
}

pub mod shared {
    pub mod constants;
    pub mod face_box;
    pub mod frame;
    pub mod model_resolver;
    pub mod onnx_session;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
        pub mod image_encoder;
    }
    pub mod infrastructure {
        pub mod ffmpeg_frame_source;
        pub mod jpeg_image_encoder;
    }
}

#[cfg(test)]
mod testing;
