//! Configuration loaded from the environment (and `.env` when present).

use crate::application::cloud_client::{CloudSettings, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL};
use crate::application::ingest::DEFAULT_MAX_CONCURRENT_INGESTS;
use crate::application::local_worker::DEFAULT_THUMBNAIL_OFFSET;
use crate::domain::av::cmd::CodecPair;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Settings for the upload server and the local pipeline.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Where ingested videos and thumbnails are written
    pub upload_dir: PathBuf,
    /// Where incoming uploads wait for ingestion, under generated names
    pub staging_dir: PathBuf,
    /// Placeholder served for videos without a thumbnail
    pub default_thumbnail: PathBuf,
    pub max_concurrent_ingests: usize,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub codecs: CodecPair,
    pub thumbnail_offset: Duration,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let codecs = CodecPair::default();

        Self {
            addr: var("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: var("PORT").unwrap_or_else(|| String::from("3000")),
            upload_dir: var("UPLOAD_DIR")
                .unwrap_or_else(|| String::from("static/uploads"))
                .into(),
            staging_dir: var("STAGING_DIR")
                .unwrap_or_else(|| String::from("static/incoming"))
                .into(),
            default_thumbnail: var("DEFAULT_THUMBNAIL")
                .unwrap_or_else(|| String::from("static/default_thumb.jpg"))
                .into(),
            max_concurrent_ingests: parsed(&var, "MAX_CONCURRENT_INGESTS")
                .unwrap_or(DEFAULT_MAX_CONCURRENT_INGESTS),
            max_upload_bytes: parsed(&var, "MAX_UPLOAD_BYTES").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            ffmpeg_bin: var("FFMPEG_BIN").unwrap_or_else(|| String::from("ffmpeg")),
            ffprobe_bin: var("FFPROBE_BIN").unwrap_or_else(|| String::from("ffprobe")),
            codecs: CodecPair {
                video: var("VIDEO_CODEC").unwrap_or(codecs.video),
                audio: var("AUDIO_CODEC").unwrap_or(codecs.audio),
            },
            thumbnail_offset: parsed(&var, "THUMBNAIL_OFFSET_SECS")
                .filter(|secs: &f64| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_THUMBNAIL_OFFSET),
        }
    }
}

/// Google Cloud settings. Absent unless both a project and a bucket are set,
/// in which case conversions stay local.
#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub project_id: String,
    pub bucket: String,
    pub location: String,
    /// Fixed bearer token; the metadata server is used when unset
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl CloudConfig {
    pub fn from_env() -> Option<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let project_id = var("GCP_PROJECT_ID").filter(|v| !v.is_empty())?;
        let bucket = var("GCS_BUCKET").filter(|v| !v.is_empty())?;

        Some(Self {
            project_id,
            bucket,
            location: var("GCP_TRANSCODER_LOCATION")
                .unwrap_or_else(|| String::from("us-central1")),
            access_token: var("GCP_ACCESS_TOKEN").filter(|v| !v.is_empty()),
            poll_interval: parsed(&var, "TRANSCODER_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            max_polls: parsed(&var, "TRANSCODER_MAX_POLLS").unwrap_or(DEFAULT_MAX_POLLS),
        })
    }

    pub fn settings(&self) -> CloudSettings {
        CloudSettings {
            poll_interval: self.poll_interval,
            max_polls: self.max_polls,
            ..CloudSettings::default()
        }
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_ingest_defaults() {
        let config = IngestConfig::from_lookup(lookup(&[]));
        assert_eq!(config.addr, "127.0.0.1");
        assert_eq!(config.port, "3000");
        assert_eq!(config.upload_dir, PathBuf::from("static/uploads"));
        assert_eq!(config.staging_dir, PathBuf::from("static/incoming"));
        assert_eq!(config.max_concurrent_ingests, 2);
        assert_eq!(config.max_upload_bytes, 1 << 30);
        assert_eq!(config.codecs, CodecPair::default());
        assert_eq!(config.thumbnail_offset, Duration::from_secs(1));
    }

    #[test]
    fn test_ingest_overrides_and_bad_numbers() {
        let config = IngestConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("MAX_CONCURRENT_INGESTS", "lots"),
            ("VIDEO_CODEC", "libx265"),
            ("THUMBNAIL_OFFSET_SECS", "2.5"),
        ]));
        assert_eq!(config.port, "8080");
        assert_eq!(config.max_concurrent_ingests, 2);
        assert_eq!(config.codecs.video, "libx265");
        assert_eq!(config.codecs.audio, "aac");
        assert_eq!(config.thumbnail_offset, Duration::from_millis(2500));
    }

    #[test]
    fn test_unusable_thumbnail_offsets_fall_back() {
        for raw in ["-1", "nan", "inf", "-0.5"] {
            let config = IngestConfig::from_lookup(lookup(&[("THUMBNAIL_OFFSET_SECS", raw)]));
            assert_eq!(config.thumbnail_offset, DEFAULT_THUMBNAIL_OFFSET, "offset {}", raw);
        }
        let config = IngestConfig::from_lookup(lookup(&[("THUMBNAIL_OFFSET_SECS", "0")]));
        assert_eq!(config.thumbnail_offset, Duration::ZERO);
    }

    #[test]
    fn test_cloud_requires_project_and_bucket() {
        assert!(CloudConfig::from_lookup(lookup(&[])).is_none());
        assert!(CloudConfig::from_lookup(lookup(&[("GCP_PROJECT_ID", "zedtube")])).is_none());
        assert!(CloudConfig::from_lookup(lookup(&[("GCP_PROJECT_ID", "zedtube"), ("GCS_BUCKET", "")])).is_none());

        let cloud = CloudConfig::from_lookup(lookup(&[
            ("GCP_PROJECT_ID", "zedtube"),
            ("GCS_BUCKET", "zedtube-media"),
            ("TRANSCODER_MAX_POLLS", "5"),
        ]))
        .unwrap();
        assert_eq!(cloud.location, "us-central1");
        assert!(cloud.access_token.is_none());

        let settings = cloud.settings();
        assert_eq!(settings.max_polls, 5);
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert!(settings.cleanup_remote);
    }
}
