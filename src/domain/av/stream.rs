use serde_json::Value;

pub trait FromStream {
    fn from_stream(stream_data: &Value) -> Option<Self>
    where
        Self: Sized;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// `avg_frame_rate` evaluated, when ffprobe reports a usable one
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

impl FromStream for VideoStream {
    fn from_stream(stream_data: &Value) -> Option<Self> {
        if stream_data.get("codec_type")?.as_str()? != "video" {
            return None;
        }

        let dimension = |key: &str| {
            stream_data
                .get(key)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32
        };

        Some(VideoStream {
            codec: stream_data.get("codec_name")?.as_str()?.to_string(),
            width: dimension("width"),
            height: dimension("height"),
            frame_rate: stream_data
                .get("avg_frame_rate")
                .and_then(|v| v.as_str())
                .and_then(parse_rational),
        })
    }
}

impl FromStream for AudioStream {
    fn from_stream(stream_data: &Value) -> Option<Self> {
        if stream_data.get("codec_type")?.as_str()? != "audio" {
            return None;
        }

        Some(AudioStream {
            codec: stream_data.get("codec_name")?.as_str()?.to_string(),
            // ffprobe reports sample_rate as a string
            sample_rate: stream_data
                .get("sample_rate")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
            channels: stream_data
                .get("channels")
                .and_then(|v| v.as_u64())
                .map(|c| c as u32),
        })
    }
}

/// Parsed `ffprobe -show_format -show_streams` output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub duration: Option<f64>,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
}

impl ProbeReport {
    pub fn from_json(v: &Value) -> Self {
        let duration = v
            .get("format")
            .and_then(|format| format.get("duration"))
            .and_then(|duration| match duration {
                Value::String(s) => s.parse().ok(),
                other => other.as_f64(),
            });

        let streams = v
            .get("streams")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();

        ProbeReport {
            duration,
            video_streams: streams.iter().filter_map(VideoStream::from_stream).collect(),
            audio_streams: streams.iter().filter_map(AudioStream::from_stream).collect(),
        }
    }

    pub fn first_video(&self) -> Option<&VideoStream> {
        self.video_streams.first()
    }
}

fn parse_rational(s: &str) -> Option<f64> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.parse::<f64>().ok()?, d.parse::<f64>().ok()?),
        None => (s.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_stream_valid_video() {
        let stream_data = json!({
            "codec_type": "video",
            "codec_name": "h264",
            "width": 1920,
            "height": 1080,
            "avg_frame_rate": "30000/1001"
        });
        let stream = VideoStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.codec, "h264");
        assert_eq!((stream.width, stream.height), (1920, 1080));
        let fps = stream.frame_rate.unwrap();
        assert!((fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_from_stream_bad_dimensions_default_to_zero() {
        let stream_data = json!({
            "codec_type": "video",
            "codec_name": "vp9",
            "width": "not_a_number",
            "avg_frame_rate": "0/0"
        });
        let stream = VideoStream::from_stream(&stream_data).unwrap();
        assert_eq!((stream.width, stream.height), (0, 0));
        assert_eq!(stream.frame_rate, None);
    }

    #[test]
    fn test_from_stream_non_video_codec_type() {
        let stream_data = json!({ "codec_type": "audio", "codec_name": "aac" });
        assert!(VideoStream::from_stream(&stream_data).is_none());
    }

    #[test]
    fn test_from_stream_missing_codec_name() {
        let stream_data = json!({ "codec_type": "audio" });
        assert!(AudioStream::from_stream(&stream_data).is_none());
    }

    #[test]
    fn test_from_stream_valid_audio() {
        let stream_data = json!({
            "codec_type": "audio",
            "codec_name": "aac",
            "sample_rate": "48000",
            "channels": 2
        });
        let stream = AudioStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.codec, "aac");
        assert_eq!(stream.sample_rate, Some(48000));
        assert_eq!(stream.channels, Some(2));
    }

    #[test]
    fn test_probe_report_from_ffprobe_json() {
        let probe = json!({
            "streams": [
                { "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "avg_frame_rate": "30/1" },
                { "codec_type": "audio", "codec_name": "aac", "sample_rate": "44100", "channels": 2 },
                { "codec_type": "data", "codec_name": "bin_data" }
            ],
            "format": { "duration": "12.480000" }
        });
        let report = ProbeReport::from_json(&probe);
        assert_eq!(report.duration, Some(12.48));
        assert_eq!(report.video_streams.len(), 1);
        assert_eq!(report.audio_streams.len(), 1);
        assert_eq!(report.first_video().unwrap().frame_rate, Some(30.0));
    }

    #[test]
    fn test_probe_report_without_streams() {
        let report = ProbeReport::from_json(&json!({}));
        assert_eq!(report, ProbeReport::default());
        assert!(report.first_video().is_none());
    }
}
