use serde::{Deserialize, Serialize};

/// Processing state reported by the remote transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Unspecified,
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Error message attached to a failed job
    pub error: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self { state, error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamSpec {
    pub codec: String,
    pub bitrate_bps: u32,
    pub frame_rate: f64,
    pub width_pixels: u32,
    pub height_pixels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamSpec {
    pub codec: String,
    pub bitrate_bps: u32,
    pub sample_rate_hertz: u32,
    pub channel_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamSpec {
    Video(VideoStreamSpec),
    Audio(AudioStreamSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementaryStream {
    pub key: String,
    pub spec: StreamSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxStream {
    pub key: String,
    pub container: String,
    pub elementary_streams: Vec<String>,
}

/// Everything the remote service needs to run one transcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub input_uri: String,
    pub output_uri: String,
    pub elementary_streams: Vec<ElementaryStream>,
    pub mux_streams: Vec<MuxStream>,
}

/// Characteristics of the source, probed before submitting a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCharacteristics {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

/// Target encoding for cloud jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudStreamProfile {
    pub video: VideoStreamSpec,
    pub audio: AudioStreamSpec,
    pub container: String,
    pub mux_key: String,
}

pub const VIDEO_STREAM_KEY: &str = "video-stream0";
pub const AUDIO_STREAM_KEY: &str = "audio-stream0";

impl Default for CloudStreamProfile {
    fn default() -> Self {
        Self {
            video: VideoStreamSpec {
                codec: "h264".to_string(),
                bitrate_bps: 2_500_000,
                frame_rate: 30.0,
                width_pixels: 1280,
                height_pixels: 720,
            },
            audio: AudioStreamSpec {
                codec: "aac".to_string(),
                bitrate_bps: 64_000,
                sample_rate_hertz: 48_000,
                channel_count: 2,
            },
            container: "mp4".to_string(),
            mux_key: "sd".to_string(),
        }
    }
}

impl CloudStreamProfile {
    /// Video spec for a given source: never upscale, keep dimensions even.
    pub fn video_for(&self, source: Option<&SourceCharacteristics>) -> VideoStreamSpec {
        let mut video = self.video.clone();
        let Some(source) = source else {
            return video;
        };

        if source.width > 0 && source.height > 0 {
            let scale = f64::min(
                1.0,
                f64::min(
                    video.width_pixels as f64 / source.width as f64,
                    video.height_pixels as f64 / source.height as f64,
                ),
            );
            video.width_pixels = even((source.width as f64 * scale).round() as u32);
            video.height_pixels = even((source.height as f64 * scale).round() as u32);
        }
        if let Some(fps) = source.frame_rate.filter(|fps| *fps > 0.0) {
            video.frame_rate = video.frame_rate.min(fps);
        }
        video
    }

    pub fn job_config(
        &self,
        input_uri: String,
        output_uri: String,
        source: Option<&SourceCharacteristics>,
    ) -> JobConfig {
        JobConfig {
            input_uri,
            output_uri,
            elementary_streams: vec![
                ElementaryStream {
                    key: VIDEO_STREAM_KEY.to_string(),
                    spec: StreamSpec::Video(self.video_for(source)),
                },
                ElementaryStream {
                    key: AUDIO_STREAM_KEY.to_string(),
                    spec: StreamSpec::Audio(self.audio.clone()),
                },
            ],
            mux_streams: vec![MuxStream {
                key: self.mux_key.clone(),
                container: self.container.clone(),
                elementary_streams: vec![VIDEO_STREAM_KEY.to_string(), AUDIO_STREAM_KEY.to_string()],
            }],
        }
    }
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Remote state of one in-flight cloud transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudJobHandle {
    /// Resource name returned by the service
    pub name: String,
    pub bucket: String,
    pub location: String,
    pub input_key: String,
    /// Always ends with `/`
    pub output_prefix: String,
}
