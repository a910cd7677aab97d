use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::{Duration, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::ExpiringCache;
use crate::error::ApiError;
use crate::extractor::{DownloadJob, Extractor};
use crate::gate::ExtractorGate;
use crate::models::{Formats, MediaType, Uploaded, VideoInfo, VideoUrls};
use crate::storage::StorageGateway;

/// Longest a request may queue for a gate slot before timing out.
const GATE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upload results stay cached longer than metadata; the object itself lives
/// in the bucket until the retention sweep removes it.
const UPLOAD_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Composes the result cache, the concurrency gate, the yt-dlp adapter, and
/// the storage gateway. Every operation follows the same protocol: validate,
/// cache lookup, gate acquire, adapter invoke, cache fill. Failures are
/// never cached.
pub struct ExtractionService {
    extractor: Arc<dyn Extractor>,
    gate: ExtractorGate,
    storage: Option<Arc<StorageGateway>>,
    scratch_dir: PathBuf,
    urls_cache: ExpiringCache<VideoUrls>,
    info_cache: ExpiringCache<VideoInfo>,
    formats_cache: ExpiringCache<Formats>,
    upload_cache: ExpiringCache<Uploaded>,
}

impl ExtractionService {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        gate: ExtractorGate,
        storage: Option<Arc<StorageGateway>>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            gate,
            storage,
            scratch_dir,
            urls_cache: ExpiringCache::with_defaults(),
            info_cache: ExpiringCache::with_defaults(),
            formats_cache: ExpiringCache::with_defaults(),
            upload_cache: ExpiringCache::with_defaults(),
        }
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub async fn download_urls(&self, url: &str) -> Result<VideoUrls, ApiError> {
        let url = validate_url(url)?;

        let cache_key = format!("dl_{url}");
        if let Some(cached) = self.urls_cache.get(&cache_key) {
            debug!(url, "stream URLs served from cache");
            return Ok(cached);
        }

        let _slot = self.acquire_slot().await?;
        let urls = self.extractor.stream_urls(url).await?;

        self.urls_cache.set(cache_key, urls.clone());
        Ok(urls)
    }

    pub async fn video_info(&self, url: &str) -> Result<VideoInfo, ApiError> {
        let url = validate_url(url)?;

        let cache_key = format!("info_{url}");
        if let Some(cached) = self.info_cache.get(&cache_key) {
            debug!(url, "video info served from cache");
            return Ok(cached);
        }

        let _slot = self.acquire_slot().await?;
        let info = self.extractor.probe(url).await?.into_video_info();

        self.info_cache.set(cache_key, info.clone());
        Ok(info)
    }

    pub async fn formats(&self, url: &str) -> Result<Formats, ApiError> {
        let url = validate_url(url)?;

        let cache_key = format!("fmt_{url}");
        if let Some(cached) = self.formats_cache.get(&cache_key) {
            debug!(url, "format list served from cache");
            return Ok(cached);
        }

        let _slot = self.acquire_slot().await?;
        let formats = self.extractor.probe(url).await?.into_formats();

        self.formats_cache.set(cache_key, formats.clone());
        Ok(formats)
    }

    /// Downloads and remuxes via yt-dlp into a scratch file, uploads it
    /// under a fresh object key, and returns the public URL. The scratch
    /// file is removed on every exit path. Idempotent per request
    /// fingerprint within the cache window.
    pub async fn download_and_upload(
        &self,
        url: &str,
        quality: &str,
        media_type: MediaType,
        container: &str,
    ) -> Result<Uploaded, ApiError> {
        let url = validate_url(url)?;
        let storage = self.storage.as_ref().ok_or_else(ApiError::storage_unavailable)?;

        let cache_key = format!(
            "upload_{url}_{quality}_{}_{container}",
            media_type.as_str()
        );
        if let Some(cached) = self.upload_cache.get(&cache_key) {
            debug!(url, "upload served from cache");
            return Ok(cached);
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|error| {
                ApiError::internal(format!("failed to create scratch directory: {error}"))
            })?;

        let ext = match media_type {
            MediaType::Audio => "mp3",
            MediaType::Video => container,
        };
        let filename = format!("{}.{ext}", Uuid::new_v4());
        let scratch_path = self.scratch_dir.join(&filename);
        let _scratch = ScratchFile::new(scratch_path.clone());

        let job = DownloadJob {
            url: url.to_string(),
            quality: quality.to_string(),
            media_type,
            container: container.to_string(),
            output_path: scratch_path.clone(),
        };

        {
            let _slot = self.acquire_slot().await?;
            self.extractor.download(&job).await?;
        }

        let object_key = format!("{}/{filename}", media_type.folder());
        let public_url = storage.upload_file(&scratch_path, &object_key).await?;

        let uploaded = Uploaded {
            url: public_url,
            filename,
        };
        self.upload_cache
            .set_with_ttl(cache_key, uploaded.clone(), UPLOAD_CACHE_TTL);
        Ok(uploaded)
    }

    async fn acquire_slot(&self) -> Result<crate::gate::GatePermit, ApiError> {
        timeout(GATE_WAIT_TIMEOUT, self.gate.acquire())
            .await
            .map_err(|_| ApiError::timeout("Timed out waiting for an extraction slot"))?
    }
}

/// Removes the scratch file when dropped, success or failure alike. Missing
/// files are fine: the download may have failed before writing anything.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), %error, "failed to remove scratch file");
            }
        }
    }
}

/// Deliberately permissive pre-filter, not a URL parser: yt-dlp itself is
/// the authority on what it can handle.
fn validate_url(url: &str) -> Result<&str, ApiError> {
    let url = url.trim();
    if url.is_empty() || !(url.starts_with("http") || url.starts_with("www")) {
        return Err(ApiError::invalid_input("Invalid URL format"));
    }
    Ok(url)
}
