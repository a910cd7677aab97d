use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

use crate::error::ApiError;
use crate::models::{Formats, MediaType, VideoFormat, VideoInfo, VideoUrls};

const YT_DLP_PROGRAM: &str = "yt-dlp";
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(180);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Seam between the service and the external tool, so tests can count and
/// fake invocations without spawning processes.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Raw-URL mode (`-g`): resolve the direct stream URL(s) for `url`.
    async fn stream_urls(&self, url: &str) -> Result<VideoUrls, ApiError>;

    /// Metadata mode (`-J`): full JSON probe of a single item.
    async fn probe(&self, url: &str) -> Result<Probe, ApiError>;

    /// Download mode: fetch, merge, and write the media to
    /// `job.output_path`.
    async fn download(&self, job: &DownloadJob) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub quality: String,
    pub media_type: MediaType,
    pub container: String,
    pub output_path: PathBuf,
}

/// Adapter around the yt-dlp binary. One invocation per call, never retried;
/// the child is spawned with `kill_on_drop` so an expired deadline (or a
/// disconnected caller) terminates it instead of leaking the process.
pub struct YtDlp {
    cookie_path: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(cookie_path: Option<PathBuf>) -> Self {
        Self { cookie_path }
    }

    async fn run<F>(&self, args: Vec<String>, deadline: Duration, fail: F) -> Result<Output, ApiError>
    where
        F: FnOnce(String) -> ApiError,
    {
        let mut command = Command::new(YT_DLP_PROGRAM);
        command.args(&args).kill_on_drop(true);

        let output = timeout(deadline, command.output())
            .await
            .map_err(|_| ApiError::timeout("yt-dlp did not finish before the deadline"))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ApiError::internal("yt-dlp is not installed or not on PATH")
                } else {
                    ApiError::internal(format!("failed to spawn yt-dlp: {error}"))
                }
            })?;

        if !output.status.success() {
            return Err(fail(combined_output(&output)));
        }

        Ok(output)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn stream_urls(&self, url: &str) -> Result<VideoUrls, ApiError> {
        let args = stream_url_args(url, self.cookie_path.as_deref());
        let output = self
            .run(args, EXTRACT_TIMEOUT, |out| {
                ApiError::extraction_failed("Failed to extract download URLs", out)
            })
            .await?;

        parse_stream_urls(&String::from_utf8_lossy(&output.stdout))
    }

    async fn probe(&self, url: &str) -> Result<Probe, ApiError> {
        let args = probe_args(url, self.cookie_path.as_deref());
        let output = self
            .run(args, EXTRACT_TIMEOUT, |out| {
                ApiError::extraction_failed("Failed to extract video metadata", out)
            })
            .await?;

        serde_json::from_slice(&output.stdout).map_err(|error| {
            ApiError::extraction_failed(
                "Failed to parse yt-dlp JSON output",
                format!("{error} (output: {})", String::from_utf8_lossy(&output.stdout)),
            )
        })
    }

    async fn download(&self, job: &DownloadJob) -> Result<(), ApiError> {
        let args = download_args(job, self.cookie_path.as_deref());
        self.run(args, DOWNLOAD_TIMEOUT, |out| {
            ApiError::download_failed("Failed to download and merge media", out)
        })
        .await?;

        Ok(())
    }
}

/// Quick PATH probe for the health endpoint.
pub async fn ytdlp_available() -> bool {
    let mut command = Command::new(YT_DLP_PROGRAM);
    command.arg("--version").kill_on_drop(true);
    matches!(
        timeout(Duration::from_secs(5), command.output()).await,
        Ok(Ok(output)) if output.status.success()
    )
}

fn common_tail(args: &mut Vec<String>, cookie_path: Option<&std::path::Path>, url: &str) {
    if let Some(path) = cookie_path {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args.push(url.to_string());
}

fn stream_url_args(url: &str, cookie_path: Option<&std::path::Path>) -> Vec<String> {
    let mut args = vec![
        "-g".to_string(),
        "--no-warnings".to_string(),
        "--no-cache-dir".to_string(),
        "--no-playlist".to_string(),
    ];
    common_tail(&mut args, cookie_path, url);
    args
}

fn probe_args(url: &str, cookie_path: Option<&std::path::Path>) -> Vec<String> {
    let mut args = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-cache-dir".to_string(),
    ];
    common_tail(&mut args, cookie_path, url);
    args
}

fn download_args(job: &DownloadJob, cookie_path: Option<&std::path::Path>) -> Vec<String> {
    let mut args = vec!["-f".to_string()];

    match job.media_type {
        MediaType::Video => {
            args.push(format_selector(&job.quality).to_string());
            args.push("--merge-output-format".to_string());
            args.push(job.container.clone());
        }
        MediaType::Audio => {
            args.push("bestaudio/best".to_string());
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            args.push("--audio-quality".to_string());
            args.push("0".to_string());
        }
    }

    args.push("--no-playlist".to_string());
    args.push("--no-warnings".to_string());
    args.push("--no-cache-dir".to_string());
    args.push("-o".to_string());
    args.push(job.output_path.to_string_lossy().into_owned());
    common_tail(&mut args, cookie_path, &job.url);
    args
}

/// Format selector by quality tier. Unknown tiers fall back to best
/// available.
pub fn format_selector(quality: &str) -> &'static str {
    match quality {
        "720p" => "bestvideo[height<=720]+bestaudio/best[height<=720]",
        "1080p" => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
        _ => "bestvideo+bestaudio/best",
    }
}

/// Raw-URL mode output is newline-delimited: first line is the video (or
/// muxed) stream, the optional second line a separate audio stream.
pub fn parse_stream_urls(stdout: &str) -> Result<VideoUrls, ApiError> {
    let mut lines = stdout.lines().map(str::trim).filter(|line| !line.is_empty());

    let video_url = lines
        .next()
        .ok_or_else(|| {
            ApiError::extraction_failed("yt-dlp returned no stream URLs", stdout.to_string())
        })?
        .to_string();

    Ok(VideoUrls {
        video_url,
        audio_url: lines.next().map(str::to_string),
    })
}

fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim_end());
    }
    combined
}

/// Deserialized `-J` document. Every field is optional: yt-dlp omits or
/// nulls fields freely across extractors, and a missing field must default
/// instead of failing the whole extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct Probe {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    #[serde(default)]
    pub formats: Vec<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub format_note: Option<String>,
    pub filesize: Option<f64>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
}

impl Probe {
    pub fn into_video_info(self) -> VideoInfo {
        VideoInfo {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            duration: self.duration.unwrap_or_default() as u64,
            thumbnail: self.thumbnail.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            uploader: self.uploader.unwrap_or_default(),
            view_count: self.view_count.unwrap_or_default(),
            upload_date: self.upload_date.unwrap_or_default(),
        }
    }

    /// Formats keep the document's original order.
    pub fn into_formats(self) -> Formats {
        Formats {
            video_id: self.id.unwrap_or_default(),
            formats: self.formats.into_iter().map(ProbeFormat::into_format).collect(),
        }
    }
}

impl ProbeFormat {
    fn into_format(self) -> VideoFormat {
        VideoFormat {
            format_id: self.format_id.unwrap_or_default(),
            ext: self.ext.unwrap_or_default(),
            resolution: self.resolution.unwrap_or_default(),
            quality: self.format_note.unwrap_or_default(),
            filesize: self.filesize.unwrap_or_default().max(0.0) as u64,
            fps: self.fps.unwrap_or_default(),
            vcodec: self.vcodec.unwrap_or_default(),
            acodec: self.acodec.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn stream_url_args_disable_playlist_and_tool_cache() {
        let args = stream_url_args("https://example.com/v1", None);
        assert_eq!(args[0], "-g");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--no-warnings".to_string()));
        assert!(args.contains(&"--no-cache-dir".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/v1");
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn cookie_path_is_forwarded_before_the_url() {
        let args = stream_url_args("https://example.com/v1", Some(Path::new("/etc/cookies.txt")));
        let cookie_pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[cookie_pos + 1], "/etc/cookies.txt");
        assert_eq!(args.last().unwrap(), "https://example.com/v1");
    }

    #[test]
    fn format_selector_caps_height_and_falls_back_to_best() {
        assert_eq!(
            format_selector("720p"),
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
        assert_eq!(
            format_selector("1080p"),
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        );
        assert_eq!(format_selector("best"), "bestvideo+bestaudio/best");
        assert_eq!(format_selector("4k-ultra"), "bestvideo+bestaudio/best");
    }

    #[test]
    fn video_download_args_merge_into_requested_container() {
        let job = DownloadJob {
            url: "https://example.com/v1".to_string(),
            quality: "720p".to_string(),
            media_type: MediaType::Video,
            container: "mkv".to_string(),
            output_path: PathBuf::from("/tmp/vidgate/a.mkv"),
        };
        let args = download_args(&job, None);
        assert_eq!(args[0], "-f");
        assert_eq!(args[1], format_selector("720p"));
        let merge_pos = args.iter().position(|a| a == "--merge-output-format").unwrap();
        assert_eq!(args[merge_pos + 1], "mkv");
        let out_pos = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[out_pos + 1], "/tmp/vidgate/a.mkv");
        assert_eq!(args.last().unwrap(), "https://example.com/v1");
    }

    #[test]
    fn audio_download_args_extract_to_mp3() {
        let job = DownloadJob {
            url: "https://example.com/v1".to_string(),
            quality: "best".to_string(),
            media_type: MediaType::Audio,
            container: "mp4".to_string(),
            output_path: PathBuf::from("/tmp/vidgate/a.mp3"),
        };
        let args = download_args(&job, None);
        assert_eq!(args[1], "bestaudio/best");
        assert!(args.contains(&"-x".to_string()));
        let fmt_pos = args.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(args[fmt_pos + 1], "mp3");
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn two_line_output_yields_separate_audio_url() {
        let urls = parse_stream_urls("https://cdn/video.mp4\nhttps://cdn/audio.m4a").unwrap();
        assert_eq!(urls.video_url, "https://cdn/video.mp4");
        assert_eq!(urls.audio_url.as_deref(), Some("https://cdn/audio.m4a"));
    }

    #[test]
    fn single_line_output_is_premuxed() {
        let urls = parse_stream_urls("https://cdn/muxed.mp4\n").unwrap();
        assert_eq!(urls.video_url, "https://cdn/muxed.mp4");
        assert_eq!(urls.audio_url, None);
    }

    #[test]
    fn empty_output_is_an_extraction_failure() {
        let error = parse_stream_urls("  \n").unwrap_err();
        assert_eq!(error.code, "EXTRACTION_FAILED");
    }

    const SAMPLE_PROBE: &str = r#"{
        "id": "abc123",
        "title": "Sample",
        "duration": 123.4,
        "thumbnail": "https://cdn/thumb.jpg",
        "description": null,
        "uploader": "someone",
        "view_count": 4200,
        "upload_date": "20240102",
        "formats": [
            {"format_id": "18", "ext": "mp4", "resolution": "640x360",
             "format_note": "360p", "filesize": 1048576, "fps": 30,
             "vcodec": "avc1", "acodec": "mp4a"},
            {"format_id": "22", "ext": "mp4", "resolution": "1280x720",
             "format_note": "720p", "filesize": null,
             "vcodec": "avc1", "acodec": "mp4a"},
            {"format_id": "140", "ext": "m4a", "resolution": "audio only",
             "format_note": "medium", "filesize": 524288, "fps": null,
             "vcodec": "none", "acodec": "mp4a"}
        ]
    }"#;

    #[test]
    fn probe_parses_defensively_and_preserves_format_order() {
        let probe: Probe = serde_json::from_str(SAMPLE_PROBE).unwrap();
        let formats = probe.into_formats();

        assert_eq!(formats.video_id, "abc123");
        assert_eq!(formats.formats.len(), 3);
        let ids: Vec<&str> = formats.formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, ["18", "22", "140"]);

        // missing fps / null filesize default instead of failing
        assert_eq!(formats.formats[1].fps, 0.0);
        assert_eq!(formats.formats[1].filesize, 0);
        assert_eq!(formats.formats[2].fps, 0.0);
        assert_eq!(formats.formats[0].filesize, 1_048_576);
        assert_eq!(formats.formats[0].quality, "360p");
    }

    #[test]
    fn probe_maps_into_video_info_with_defaults() {
        let probe: Probe = serde_json::from_str(SAMPLE_PROBE).unwrap();
        let info = probe.into_video_info();

        assert_eq!(info.id, "abc123");
        assert_eq!(info.title, "Sample");
        assert_eq!(info.duration, 123);
        assert_eq!(info.view_count, 4200);
        // null description defaults to empty
        assert_eq!(info.description, "");
    }

    #[test]
    fn minimal_probe_document_still_parses() {
        let probe: Probe = serde_json::from_str(r#"{"id": "xyz"}"#).unwrap();
        let info = probe.clone().into_video_info();
        assert_eq!(info.id, "xyz");
        assert_eq!(info.duration, 0);
        assert!(probe.into_formats().formats.is_empty());
    }
}
