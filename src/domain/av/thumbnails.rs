use ffmpeg_next as ffmpeg;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 640;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 360;
const DEFAULT_BACKGROUND: Rgb<u8> = Rgb([0x1a, 0x1a, 0x1a]);

/// Decode the first video frame at or after `offset` and save it as a JPEG.
///
/// Clips shorter than `offset` fall back to their last decodable frame.
pub async fn extract_frame(source: &Path, output: &Path, offset: Duration) -> Result<(), BoxError> {
    let source = source.to_path_buf();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), BoxError> {
        ffmpeg::init()?;

        let mut ictx = ffmpeg::format::input(&source)?;
        let (stream_index, time_base, parameters) = {
            let input_stream = ictx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(ffmpeg::Error::StreamNotFound)?;
            (
                input_stream.index(),
                input_stream.time_base(),
                input_stream.parameters(),
            )
        };

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?;
        let mut decoder = context_decoder.decoder().video()?;

        // Seek lands on the keyframe before the offset; exact frame is found by decoding.
        let seek_target = offset.as_micros() as i64;
        if seek_target > 0 && ictx.seek(seek_target, ..seek_target).is_err() {
            tracing::debug!(source = %source.display(), "Seek failed, decoding from start");
        }

        let target_pts = if time_base.numerator() > 0 {
            (offset.as_secs_f64() * time_base.denominator() as f64 / time_base.numerator() as f64)
                as i64
        } else {
            0
        };

        let mut decoded = ffmpeg::util::frame::Video::empty();
        let mut chosen: Option<ffmpeg::util::frame::Video> = None;
        let mut last: Option<ffmpeg::util::frame::Video> = None;

        'packets: for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                if decoded.timestamp().map_or(true, |ts| ts >= target_pts) {
                    chosen = Some(decoded.clone());
                    break 'packets;
                }
                last = Some(decoded.clone());
            }
        }

        if chosen.is_none() {
            decoder.send_eof()?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                if decoded.timestamp().map_or(true, |ts| ts >= target_pts) {
                    chosen = Some(decoded.clone());
                    break;
                }
                last = Some(decoded.clone());
            }
        }

        let frame = chosen.or(last).ok_or("No decodable video frame")?;

        let mut rgb_frame = ffmpeg::util::frame::Video::empty();
        let mut scaler = ffmpeg::software::scaling::context::Context::get(
            frame.format(),
            frame.width(),
            frame.height(),
            ffmpeg::format::Pixel::RGB24,
            frame.width(),
            frame.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )?;
        scaler.run(&frame, &mut rgb_frame)?;

        let img_buffer = RgbImage::from_raw(
            rgb_frame.width(),
            rgb_frame.height(),
            packed_rgb(&rgb_frame),
        )
        .ok_or("Failed to create image buffer")?;

        img_buffer.save_with_format(&output, ImageFormat::Jpeg)?;
        tracing::debug!(output = %output.display(), "Saved thumbnail");

        Ok(())
    })
    .await?
}

/// Copy RGB24 plane rows without the line padding ffmpeg adds.
fn packed_rgb(frame: &ffmpeg::util::frame::Video) -> Vec<u8> {
    let row_len = frame.width() as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut packed = Vec::with_capacity(row_len * frame.height() as usize);
    for row in 0..frame.height() as usize {
        let start = row * stride;
        packed.extend_from_slice(&data[start..start + row_len]);
    }
    packed
}

/// Placeholder served for videos without a thumbnail: dark 16:9 frame with a
/// white play glyph.
pub fn default_thumbnail() -> RgbImage {
    let (width, height) = (DEFAULT_THUMBNAIL_WIDTH, DEFAULT_THUMBNAIL_HEIGHT);
    let mut img = RgbImage::from_pixel(width, height, DEFAULT_BACKGROUND);

    let half = (height / 7) as i64;
    let (cx, cy) = (width as i64 / 2, height as i64 / 2);
    let left = cx - half * 2 / 3;
    for y in (cy - half)..=(cy + half) {
        let span = ((half - (y - cy).abs()) as f64 * 1.7) as i64;
        for x in left..=left + span {
            img.put_pixel(x as u32, y as u32, Rgb([0xff, 0xff, 0xff]));
        }
    }
    img
}

pub fn write_default_thumbnail(path: &Path) -> Result<(), BoxError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    default_thumbnail().save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_thumbnail_layout() {
        let img = default_thumbnail();
        assert_eq!(img.dimensions(), (640, 360));
        assert_eq!(*img.get_pixel(0, 0), DEFAULT_BACKGROUND);
        assert_eq!(*img.get_pixel(320, 180), Rgb([0xff, 0xff, 0xff]));
    }

    #[test]
    fn test_write_default_thumbnail_creates_jpeg() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("static").join("default_thumb.jpg");
        write_default_thumbnail(&path).unwrap();

        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), 640);
        assert_eq!(loaded.height(), 360);
    }

    #[tokio::test]
    async fn test_extract_frame_from_non_video_fails() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("not_a_video.mp4");
        std::fs::write(&source, b"definitely not a video").unwrap();

        let result = extract_frame(&source, &dir.path().join("t.jpg"), Duration::from_secs(1)).await;
        assert!(result.is_err());
        assert!(!dir.path().join("t.jpg").exists());
    }
}
