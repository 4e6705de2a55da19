//! Remote probe: resolves a URL's canonical form, filename, MIME type and
//! size before any range is ever requested.

use std::path::Path;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::{header, Client, StatusCode};

use crate::constants::PROBE_MAX_RETRIES;
use crate::error::{DownloadError, Result};

/// Everything resolved about the remote object before fetching it.
#[derive(Debug, Clone)]
pub struct RemoteFileInfo {
    /// Canonical URL after redirects, percent-decoded.
    pub url: String,
    /// Resolved filename.
    pub filename: String,
    /// First token of the `Content-Type` header, or
    /// `application/octet-stream` if absent.
    pub mimetype: String,
    /// Size in bytes. Always positive — unknown size is rejected upstream.
    pub size: u64,
}

async fn backoff_sleep(attempt: u32) {
    let base_ms = 1000u64 * 2u64.pow(attempt.saturating_sub(1));
    let capped = base_ms.min(10_000);
    tokio::time::sleep(Duration::from_millis(capped)).await;
}

fn parse_size_from_headers(headers: &header::HeaderMap) -> Option<i64> {
    if let Some(cr) = headers.get(header::CONTENT_RANGE).and_then(|v| v.to_str().ok()) {
        if let Some(total) = cr.rsplit('/').next() {
            if let Ok(n) = total.parse::<i64>() {
                return Some(n);
            }
        }
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
}

fn parse_filename_from_content_disposition(value: &str) -> Option<String> {
    // filename*=UTF-8''<percent-encoded>
    if let Some(idx) = value.to_ascii_lowercase().find("filename*=") {
        let rest = &value[idx + "filename*=".len()..];
        let rest = rest.trim_start();
        if let Some(stripped) = rest
            .strip_prefix("UTF-8''")
            .or_else(|| rest.strip_prefix("utf-8''"))
        {
            let raw = stripped.split(';').next().unwrap_or(stripped).trim().trim_matches('"');
            if let Ok(decoded) = percent_decode_str(raw).decode_utf8() {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        }
    }

    // filename="..."
    if let Some(idx) = value.to_ascii_lowercase().find("filename=") {
        let rest = &value[idx + "filename=".len()..];
        let raw = rest.split(';').next().unwrap_or(rest).trim().trim_matches('"').trim_matches('\'');
        if !raw.is_empty() {
            return Some(raw.to_string());
        }
    }

    None
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return None;
    }
    let basename = Path::new(path).file_name()?.to_str()?;
    let decoded = percent_decode_str(basename).decode_utf8().ok()?;
    if decoded.is_empty() {
        None
    } else {
        Some(decoded.into_owned())
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Issues a HEAD request (falling back to a `Range: bytes=0-0` GET if the
/// server chokes on HEAD), retried up to `PROBE_MAX_RETRIES` times with
/// exponential backoff on transient failures, and resolves a
/// [`RemoteFileInfo`] from the response.
pub async fn fetch_file_info(client: &Client, url: &str, headers: &header::HeaderMap) -> Result<RemoteFileInfo> {
    if url.trim().is_empty() {
        return Err(DownloadError::InvalidArgument("URL must be a non-empty string".into()));
    }

    let mut last_err: Option<DownloadError> = None;

    for attempt in 1..=PROBE_MAX_RETRIES {
        match probe_once(client, url, headers).await {
            Ok(info) => return Ok(info),
            Err(ProbeError::Transient(msg)) => {
                tracing::warn!(attempt, %msg, "probe attempt failed, retrying");
                last_err = Some(DownloadError::RemoteFile(msg));
                if attempt < PROBE_MAX_RETRIES {
                    backoff_sleep(attempt).await;
                }
            }
            Err(ProbeError::Terminal(err)) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| DownloadError::RemoteFile("probe failed".into())))
}

enum ProbeError {
    Transient(String),
    Terminal(DownloadError),
}

async fn probe_once(client: &Client, url: &str, headers: &header::HeaderMap) -> std::result::Result<RemoteFileInfo, ProbeError> {
    let head_resp = client.head(url).headers(headers.clone()).send().await;

    let resp = match head_resp {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) if resp.status() == StatusCode::METHOD_NOT_ALLOWED || resp.status() == StatusCode::NOT_IMPLEMENTED => {
            probe_via_ranged_get(client, url, headers).await?
        }
        Ok(resp) => {
            return Err(ProbeError::Terminal(DownloadError::RemoteFile(format!(
                "server returned {}",
                resp.status()
            ))))
        }
        Err(e) if is_retryable(&e) => return Err(ProbeError::Transient(e.to_string())),
        Err(e) => return Err(ProbeError::Terminal(DownloadError::RemoteFile(e.to_string()))),
    };

    build_remote_file_info(resp)
}

async fn probe_via_ranged_get(
    client: &Client,
    url: &str,
    headers: &header::HeaderMap,
) -> std::result::Result<reqwest::Response, ProbeError> {
    let resp = client
        .get(url)
        .headers(headers.clone())
        .header(header::RANGE, "bytes=0-0")
        .send()
        .await;

    match resp {
        Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::PARTIAL_CONTENT => Ok(resp),
        Ok(resp) => Err(ProbeError::Terminal(DownloadError::RemoteFile(format!(
            "ranged probe returned {}",
            resp.status()
        )))),
        Err(e) if is_retryable(&e) => Err(ProbeError::Transient(e.to_string())),
        Err(e) => Err(ProbeError::Terminal(DownloadError::RemoteFile(e.to_string()))),
    }
}

fn build_remote_file_info(resp: reqwest::Response) -> std::result::Result<RemoteFileInfo, ProbeError> {
    let final_url = percent_decode_str(resp.url().as_str())
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| resp.url().to_string());

    let headers = resp.headers().clone();

    let size = match parse_size_from_headers(&headers) {
        Some(n) if n > 0 => n as u64,
        // A header was present and parsed but is non-positive/garbage.
        Some(n) => return Err(ProbeError::Terminal(DownloadError::InvalidFileSize(Some(n)))),
        // Neither `Content-Range` nor `Content-Length` yielded anything: the
        // size is genuinely unknown, not merely invalid.
        None => {
            return Err(ProbeError::Terminal(DownloadError::UnidentifiedFileSize {
                url: final_url.clone(),
            }))
        }
    };

    let mimetype = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut filename = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_filename_from_content_disposition);

    if filename.is_none() {
        filename = filename_from_url(&final_url);
    }

    let mut filename = filename.unwrap_or_else(|| "unknown_file".to_string());

    if !filename.contains('.') {
        if let Some(ext) = mime_guess::get_mime_extensions_str(&mimetype).and_then(|exts| exts.first()) {
            filename = format!("{filename}.{ext}");
        }
    }

    Ok(RemoteFileInfo {
        url: final_url,
        filename,
        mimetype,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extended_utf8_filename() {
        let v = "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf";
        assert_eq!(parse_filename_from_content_disposition(v).as_deref(), Some("résumé.pdf"));
    }

    #[test]
    fn parses_plain_filename() {
        let v = "attachment; filename=\"report.csv\"";
        assert_eq!(parse_filename_from_content_disposition(v).as_deref(), Some("report.csv"));
    }

    #[test]
    fn prefers_extended_over_plain_when_both_present() {
        let v = "attachment; filename=\"fallback.bin\"; filename*=UTF-8''real.bin";
        assert_eq!(parse_filename_from_content_disposition(v).as_deref(), Some("real.bin"));
    }

    #[test]
    fn filename_from_percent_encoded_url_path() {
        let f = filename_from_url("https://example.com/path/My%20File.zip").unwrap();
        assert_eq!(f, "My File.zip");
    }

    #[test]
    fn filename_from_url_without_path_is_none() {
        assert!(filename_from_url("https://example.com").is_none());
    }

    #[test]
    fn content_range_total_wins_over_content_length() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_RANGE, "bytes 0-0/12345".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "1".parse().unwrap());
        assert_eq!(parse_size_from_headers(&headers), Some(12345));
    }

    #[test]
    fn missing_size_headers_yields_none_not_a_garbage_value() {
        // No Content-Range, no Content-Length: distinct from "present but
        // invalid" — build_remote_file_info maps this to
        // DownloadError::UnidentifiedFileSize rather than InvalidFileSize.
        let headers = header::HeaderMap::new();
        assert_eq!(parse_size_from_headers(&headers), None);
    }
}
