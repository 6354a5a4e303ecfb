use super::estimate::ProcessingEstimate;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extension of converted outputs.
pub const CONVERTED_EXTENSION: &str = "mp4";
pub const THUMBNAIL_SUFFIX: &str = "_thumb.jpg";

/// A saved upload waiting to be ingested.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub input_path: PathBuf,
    /// Sanitized name the user uploaded the file under
    pub original_filename: String,
    pub title: String,
    pub convert: bool,
    pub owner_id: i64,
}

impl UploadRequest {
    /// Build a request, defaulting an empty title to the filename without its extension.
    pub fn new(
        input_path: PathBuf,
        original_filename: String,
        title: Option<String>,
        convert: bool,
        owner_id: i64,
    ) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&original_filename));

        Self {
            input_path,
            original_filename,
            title,
            convert,
            owner_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscodeResult {
    pub video_path: PathBuf,
    pub thumbnail_path: PathBuf,
    #[serde(flatten)]
    pub resolution: Resolution,
    pub processing_estimate: ProcessingEstimate,
    #[serde(skip)]
    pub converted: bool,
}

/// Row persisted once ingestion succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub filename: String,
    pub original_filename: String,
    pub title: String,
    pub owner_id: i64,
    pub is_converted: bool,
    pub views: u64,
    pub upload_date: DateTime<Utc>,
}

impl VideoRecord {
    pub fn from_result(request: &UploadRequest, result: &TranscodeResult) -> Self {
        let filename = result
            .video_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            filename,
            original_filename: request.original_filename.clone(),
            title: request.title.clone(),
            owner_id: request.owner_id,
            is_converted: result.converted,
            views: 0,
            upload_date: Utc::now(),
        }
    }
}

/// Output paths for one ingestion, all derived from the same identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub video: PathBuf,
    pub thumbnail: PathBuf,
}

impl OutputNames {
    /// `extension` is the video extension without a dot; `None` leaves the
    /// video without one.
    pub fn new(output_dir: &Path, id: &str, extension: Option<&str>) -> Self {
        let video = match extension {
            Some(ext) if !ext.is_empty() => output_dir.join(format!("{}.{}", id, ext)),
            _ => output_dir.join(id),
        };
        Self {
            video,
            thumbnail: output_dir.join(format!("{}{}", id, THUMBNAIL_SUFFIX)),
        }
    }

    pub fn converted(output_dir: &Path, id: &str) -> Self {
        Self::new(output_dir, id, Some(CONVERTED_EXTENSION))
    }

    /// Keep the extension of `source`, as raw uploads are stored untouched.
    pub fn raw_copy(output_dir: &Path, id: &str, source: &Path) -> Self {
        let ext = source.extension().and_then(|e| e.to_str());
        Self::new(output_dir, id, ext)
    }
}

/// Where an upload is saved before ingestion: `id` plus the extension of the
/// client's file name. The client's name itself never reaches the disk.
pub fn staged_upload_path(staging_dir: &Path, id: &str, original_filename: &str) -> PathBuf {
    let ext = Path::new(original_filename).extension().and_then(|e| e.to_str());
    OutputNames::new(staging_dir, id, ext).video
}

fn default_title(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static regex"))
}

/// Reduce an uploaded filename to a flat, ASCII-only name safe to join onto
/// the upload directory. Returns `None` when nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    // Browsers on Windows may send the full client path.
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let joined = name.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = unsafe_chars().replace_all(&joined, "");
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_path_ignores_client_name() {
        let staging = Path::new("static/incoming");
        assert_eq!(
            staged_upload_path(staging, "a1", "holiday.mov"),
            staging.join("a1.mov")
        );
        assert_eq!(staged_upload_path(staging, "a2", "README"), staging.join("a2"));
        assert_eq!(
            staged_upload_path(staging, "a3", "3f2a_thumb.jpg"),
            staging.join("a3.jpg")
        );
    }

    #[test]
    fn test_title_defaults_to_file_stem() {
        let req = UploadRequest::new(
            PathBuf::from("/tmp/holiday.mov"),
            "holiday.mov".to_string(),
            Some("   ".to_string()),
            true,
            1,
        );
        assert_eq!(req.title, "holiday");

        let req = UploadRequest::new(
            PathBuf::from("/tmp/holiday.mov"),
            "holiday.mov".to_string(),
            Some(" Summer 2024 ".to_string()),
            true,
            1,
        );
        assert_eq!(req.title, "Summer 2024");
    }

    #[test]
    fn test_output_names_share_identifier() {
        let names = OutputNames::converted(Path::new("/uploads"), "abc");
        assert_eq!(names.video, PathBuf::from("/uploads/abc.mp4"));
        assert_eq!(names.thumbnail, PathBuf::from("/uploads/abc_thumb.jpg"));
    }

    #[test]
    fn test_raw_copy_keeps_extension() {
        let names = OutputNames::raw_copy(Path::new("/uploads"), "abc", Path::new("x/clip.webm"));
        assert_eq!(names.video, PathBuf::from("/uploads/abc.webm"));

        let names = OutputNames::raw_copy(Path::new("/uploads"), "abc", Path::new("x/clip"));
        assert_eq!(names.video, PathBuf::from("/uploads/abc"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My cool video.mp4").as_deref(), Some("My_cool_video.mp4"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\Users\\zed\\clip.mkv").as_deref(), Some("clip.mkv"));
        assert_eq!(sanitize_filename(".hidden.mp4").as_deref(), Some("hidden.mp4"));
        assert_eq!(sanitize_filename("vidéo.mp4").as_deref(), Some("vido.mp4"));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("***"), None);
    }

    #[test]
    fn test_record_from_result() {
        let req = UploadRequest::new(
            PathBuf::from("/uploads/clip.mov"),
            "clip.mov".to_string(),
            None,
            false,
            7,
        );
        let result = TranscodeResult {
            video_path: PathBuf::from("/uploads/0f3a.mov"),
            thumbnail_path: PathBuf::from("/uploads/0f3a_thumb.jpg"),
            resolution: Resolution { width: 640, height: 360 },
            processing_estimate: ProcessingEstimate::fallback(),
            converted: false,
        };
        let record = VideoRecord::from_result(&req, &result);
        assert_eq!(record.filename, "0f3a.mov");
        assert_eq!(record.original_filename, "clip.mov");
        assert_eq!(record.title, "clip");
        assert_eq!(record.views, 0);
        assert!(!record.is_converted);
    }

    #[test]
    fn test_result_serializes_flat_resolution() {
        let result = TranscodeResult {
            video_path: PathBuf::from("a.mp4"),
            thumbnail_path: PathBuf::from("a_thumb.jpg"),
            resolution: Resolution { width: 1280, height: 720 },
            processing_estimate: ProcessingEstimate::from_size(0),
            converted: true,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["width"], 1280);
        assert_eq!(json["height"], 720);
        assert_eq!(json["processing_estimate"]["estimated_seconds"], 10);
        assert!(json.get("converted").is_none());
    }
}
