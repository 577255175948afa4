//! Direct downloads: stream a file URL to disk under the size cap.

use crate::classify::path_extension;
use crate::error::FetchError;
use cecibot_types::FileInfo;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// MIME reported when the origin server sends no `Content-Type`.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Streams `url` to a fresh file under `download_path`.
///
/// The origin must answer `200 OK` and declare its size via
/// `Content-Length`; a declared size above `max_file_size` fails before a
/// single body byte is transferred. The declared size is advisory, so the
/// cap is enforced on actual bytes as well.
///
/// # Errors
///
/// The expected failures (`not 200 OK`, `file size unknown`,
/// `file is too big`) map to their wire messages; anything else is an
/// internal error. No partial file is left behind on any failure.
pub async fn fetch_file(
    client: &reqwest::Client,
    url: &str,
    download_path: &Path,
    max_file_size: u64,
) -> Result<FileInfo, FetchError> {
    let response = client.get(url).send().await.map_err(FetchError::Http)?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::BadStatus(status.as_u16()));
    }

    let declared = response.content_length().ok_or(FetchError::SizeUnknown)?;
    if declared > max_file_size {
        return Err(FetchError::TooBig {
            size: declared,
            max: max_file_size,
        });
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(FALLBACK_MIME)
        .to_string();

    let title = basename(url);
    let extension = path_extension(url)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let path = download_path.join(format!("{}{}", Uuid::new_v4(), extension));

    if let Err(e) = write_body(response, &path, max_file_size).await {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    let size = tokio::fs::metadata(&path)
        .await
        .map_err(FetchError::Io)?
        .len();

    Ok(FileInfo {
        title,
        path,
        extension,
        mime,
        size,
    })
}

async fn write_body(
    response: reqwest::Response,
    path: &PathBuf,
    max_file_size: u64,
) -> Result<(), FetchError> {
    let mut file = tokio::fs::File::create(path).await.map_err(FetchError::Io)?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Http)?;
        written += chunk.len() as u64;
        if written > max_file_size {
            return Err(FetchError::TooBig {
                size: written,
                max: max_file_size,
            });
        }
        file.write_all(&chunk).await.map_err(FetchError::Io)?;
    }

    file.flush().await.map_err(FetchError::Io)?;
    Ok(())
}

/// The final path segment of the URL, as the artefact's display title.
fn basename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(str::to_string)
        })
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_is_the_last_path_segment() {
        assert_eq!(basename("https://example.com/a/b/file.pdf"), "file.pdf");
        assert_eq!(basename("https://example.com/file.pdf?x=1"), "file.pdf");
        assert_eq!(
            basename("https://example.com/"),
            "https://example.com/",
            "no segment falls back to the URL itself"
        );
    }
}
