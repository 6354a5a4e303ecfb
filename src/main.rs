use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    BoxError, Router,
};
use futures::{Stream, TryStreamExt};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zedtube::adapters::local::InMemoryVideoRepository;
use zedtube::application::local_worker::{remove_partial, LocalTranscodeWorker};
use zedtube::application::orchestrator::IngestionOrchestrator;
use zedtube::av::cmd::FfmpegToolkit;
use zedtube::av::thumbnails::write_default_thumbnail;
use zedtube::domain::media::{
    sanitize_filename, staged_upload_path, UploadRequest, VideoRecord, THUMBNAIL_SUFFIX,
};
use zedtube::ports::ids::{IdGenerator, UuidGenerator};
use zedtube::ports::repository::VideoRepository;
use zedtube::{FailureKind, IngestConfig, IngestService};

type Service = IngestService<FfmpegToolkit, UuidGenerator, InMemoryVideoRepository>;
type Orchestrator = IngestionOrchestrator<FfmpegToolkit, UuidGenerator>;

const UPLOAD_ACCEPTED: &str = "Upload en cours de traitement";
const UPLOAD_FAILED: &str = "Erreur d'upload";

struct AppState {
    service: Service,
    ids: UuidGenerator,
    upload_dir: PathBuf,
    staging_dir: PathBuf,
    default_thumbnail: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = IngestConfig::from_env();

    for dir in [&config.upload_dir, &config.staging_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Cannot create upload directory");
            return;
        }
    }
    if !config.default_thumbnail.exists() {
        match write_default_thumbnail(&config.default_thumbnail) {
            Ok(()) => info!(path = %config.default_thumbnail.display(), "Default thumbnail created"),
            Err(e) => warn!(error = %e, "Could not create default thumbnail"),
        }
    }

    let local = LocalTranscodeWorker::new(
        FfmpegToolkit::new(&config.ffmpeg_bin, &config.ffprobe_bin),
        UuidGenerator,
    )
    .with_codecs(config.codecs.clone())
    .with_thumbnail_offset(config.thumbnail_offset);
    let orchestrator = attach_cloud(IngestionOrchestrator::new(local));
    if !orchestrator.uses_cloud() {
        info!("No cloud transcoder configured, conversions run locally");
    }

    let state = Arc::new(AppState {
        service: IngestService::new(
            orchestrator,
            InMemoryVideoRepository::new(),
            config.upload_dir.clone(),
            config.max_concurrent_ingests,
        ),
        ids: UuidGenerator,
        upload_dir: config.upload_dir.clone(),
        staging_dir: config.staging_dir.clone(),
        default_thumbnail: config.default_thumbnail.clone(),
    });

    let app = Router::new()
        .route("/upload", post(upload_video))
        .route("/videos", get(list_videos))
        .route("/thumbnail/:filename", get(serve_thumbnail))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("Server failed to start");
}

#[cfg(feature = "gcp")]
fn attach_cloud(orchestrator: Orchestrator) -> Orchestrator {
    use zedtube::adapters::gcp::{AccessTokenSource, GcpTranscoderApi, GcsStorage};
    use zedtube::application::cloud_client::CloudTranscodeClient;
    use zedtube::CloudConfig;

    let Some(cloud) = CloudConfig::from_env() else {
        return orchestrator;
    };
    let http = match reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client, conversions run locally");
            return orchestrator;
        }
    };

    let auth = Arc::new(match &cloud.access_token {
        Some(token) => AccessTokenSource::from_static(token.clone()),
        None => AccessTokenSource::metadata(http.clone()),
    });
    let storage = GcsStorage::new(http.clone(), cloud.bucket.clone(), auth.clone());
    let jobs = GcpTranscoderApi::new(http, cloud.project_id.clone(), cloud.location.clone(), auth);

    info!(project = %cloud.project_id, bucket = %cloud.bucket, location = %cloud.location, "Using cloud transcoder");
    orchestrator.with_cloud(Arc::new(CloudTranscodeClient::new(storage, jobs, cloud.settings())))
}

#[cfg(not(feature = "gcp"))]
fn attach_cloud(orchestrator: Orchestrator) -> Orchestrator {
    orchestrator
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down, cancelling in-flight ingestions");
    state.service.shutdown();
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    file_size: f64,
    estimated_time: String,
}

#[derive(Debug, Serialize)]
struct VideoEntry {
    id: i64,
    #[serde(flatten)]
    record: VideoRecord,
}

#[derive(Default)]
struct UploadForm {
    video: Option<(PathBuf, String)>,
    title: Option<String>,
    convert: Option<bool>,
    owner_id: Option<i64>,
}

fn bad_request() -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, UPLOAD_FAILED.to_owned())
}

// Accepts a multipart upload, saves the file and ingests it.
async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut form = UploadForm::default();
    if let Err(rejection) = read_form(&state, &mut multipart, &mut form).await {
        if let Some((path, _)) = &form.video {
            remove_partial(path).await;
        }
        return Err(rejection);
    }

    let Some((path, filename)) = form.video else {
        return Err(bad_request());
    };
    let request = UploadRequest::new(
        path,
        filename,
        form.title,
        form.convert.unwrap_or(true),
        form.owner_id.unwrap_or_default(),
    );

    match state.service.ingest(request).await {
        Ok(receipt) => {
            let estimate = receipt.result.processing_estimate;
            Ok(Json(UploadResponse {
                message: UPLOAD_ACCEPTED,
                file_size: estimate.file_size_mb,
                estimated_time: estimate.estimated_human_readable,
            }))
        }
        Err(e) if e.kind() == FailureKind::Input => {
            warn!(error = %e, "Upload rejected");
            Err(bad_request())
        }
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "Ingestion failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn read_form(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), (StatusCode, String)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Malformed multipart body");
        bad_request()
    })? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("video") => {
                if form.video.is_some() {
                    warn!("Upload rejected: more than one video field");
                    return Err(bad_request());
                }
                let Some(filename) = field.file_name().and_then(sanitize_filename) else {
                    warn!("Upload rejected: missing or unusable file name");
                    return Err(bad_request());
                };
                let path = staged_upload_path(&state.staging_dir, &state.ids.next_id(), &filename);
                info!(path = %path.display(), original = %filename, "Saving upload");
                save_upload(&path, field).await?;
                form.video = Some((path, filename));
            }
            Some("title") => form.title = Some(field.text().await.map_err(|_| bad_request())?),
            Some("convert") => {
                form.convert = parse_flag(&field.text().await.map_err(|_| bad_request())?)
            }
            Some("owner_id") => {
                let raw = field.text().await.map_err(|_| bad_request())?;
                form.owner_id = Some(raw.trim().parse().map_err(|_| bad_request())?);
            }
            _ => continue,
        }
    }
    Ok(())
}

async fn list_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VideoEntry>>, (StatusCode, String)> {
    let videos = state
        .service
        .repository()
        .list_videos()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(
        videos
            .into_iter()
            .map(|(id, record)| VideoEntry { id, record })
            .collect(),
    ))
}

async fn serve_thumbnail(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Response {
    let candidate = thumbnail_path(&state.upload_dir, &filename);
    let bytes = match candidate {
        Some(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(_) => tokio::fs::read(&state.default_thumbnail).await,
        },
        None => tokio::fs::read(&state.default_thumbnail).await,
    };

    match bytes {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `<dir>/<stem>_thumb.jpg` for a stored video name.
fn thumbnail_path(upload_dir: &Path, video_filename: &str) -> Option<PathBuf> {
    let safe = sanitize_filename(video_filename)?;
    let stem = Path::new(&safe).file_stem()?.to_string_lossy().into_owned();
    Some(upload_dir.join(format!("{}{}", stem, THUMBNAIL_SUFFIX)))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "0" | "false" | "off" | "no" => Some(false),
        _ => Some(true),
    }
}

/// Stream an upload to `path`, leaving nothing behind when the body breaks off.
async fn save_upload<S, E>(path: &PathBuf, stream: S) -> Result<(), (StatusCode, String)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let saved = stream_to_file(path, stream).await;
    if saved.is_err() {
        remove_partial(path).await;
    }
    saved
}

// Save a `Stream` to a file
async fn stream_to_file<S, E>(path: &PathBuf, stream: S) -> Result<(), (StatusCode, String)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    async {
        let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        tokio::io::copy(&mut body_reader, &mut file).await?;
        file.flush().await?;

        Ok::<_, io::Error>(())
    }
    .await
    .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}
