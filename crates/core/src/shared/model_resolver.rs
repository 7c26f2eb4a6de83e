use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Resolves a model file by name, downloading it into the platform cache
/// when neither the cache nor `bundled_dir` has it.
pub fn resolve(
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, name, url, bundled_dir, progress)
}

/// Like [`resolve`], with an explicit cache directory.
///
/// Resolution order:
/// 1. `cache_dir`
/// 2. `bundled_dir` (pre-packaged installs)
/// 3. Download from `url` into `cache_dir`
pub fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(found) = find_in(cache_dir, name, bundled_dir) {
        return Ok(found);
    }

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    let cached_path = cache_dir.join(name);
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Looks for `name` in `cache_dir`, then `bundled_dir`, without downloading.
pub fn find_in(cache_dir: &Path, name: &str, bundled_dir: Option<&Path>) -> Option<PathBuf> {
    std::iter::once(cache_dir)
        .chain(bundled_dir)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Vigil/models/`
/// - Linux: `$XDG_CACHE_HOME/Vigil/models/` or `~/.cache/Vigil/models/`
/// - Windows: `%LOCALAPPDATA%/Vigil/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Vigil").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Vigil").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let write_error = |source| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(temp_path).map_err(write_error)?;

    // Models run to hundreds of megabytes; stream instead of buffering.
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_error)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_error)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_error)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const UNREACHABLE: &str = "http://127.0.0.1:9/model.onnx";

    /// Answers one HTTP request with `status` and `body`, then closes.
    fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/model.onnx", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body);
        });
        url
    }

    #[test]
    fn test_cached_file_wins_over_bundled() {
        let tmp = TempDir::new().unwrap();
        let (cache, bundled) = (tmp.path().join("cache"), tmp.path().join("bundled"));
        fs::create_dir_all(&cache).unwrap();
        fs::create_dir_all(&bundled).unwrap();
        fs::write(cache.join("face.onnx"), b"cached").unwrap();
        fs::write(bundled.join("face.onnx"), b"bundled").unwrap();

        let path = resolve_in(&cache, "face.onnx", UNREACHABLE, Some(&bundled), None).unwrap();
        assert_eq!(path, cache.join("face.onnx"));
    }

    #[test]
    fn test_bundled_file_is_used_without_downloading() {
        let tmp = TempDir::new().unwrap();
        let bundled = tmp.path().join("bundled");
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("face.onnx"), b"bundled").unwrap();

        let cache = tmp.path().join("cache");
        let path = resolve_in(&cache, "face.onnx", UNREACHABLE, Some(&bundled), None).unwrap();
        assert_eq!(path, bundled.join("face.onnx"));
        assert!(!cache.exists());
    }

    #[test]
    fn test_find_without_any_copy_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(find_in(tmp.path(), "face.onnx", Some(tmp.path())).is_none());
    }

    #[test]
    fn test_download_lands_in_cache_with_progress() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let url = serve_once("200 OK", b"onnx-bytes");

        let seen = Arc::new(AtomicU64::new(0));
        let progress: ProgressFn = {
            let seen = Arc::clone(&seen);
            Box::new(move |done, total| {
                assert_eq!(total, 10);
                seen.store(done, Ordering::SeqCst);
            })
        };
        let path = resolve_in(&cache, "face.onnx", &url, None, Some(progress)).unwrap();

        assert_eq!(path, cache.join("face.onnx"));
        assert_eq!(fs::read(&path).unwrap(), b"onnx-bytes");
        assert_eq!(seen.load(Ordering::SeqCst), 10);
        assert!(!cache.join("face.part").exists());
    }

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let url = serve_once("404 Not Found", b"missing");

        let err = resolve_in(&cache, "face.onnx", &url, None, None).unwrap_err();
        assert!(matches!(err, ModelResolveError::Download { .. }));
        assert!(!cache.join("face.onnx").exists());
        assert!(!cache.join("face.part").exists());
    }

    #[test]
    fn test_model_cache_dir_is_app_scoped() {
        if let Ok(dir) = model_cache_dir() {
            assert!(dir.ends_with("Vigil/models"));
        }
    }
}
