//! Best-effort object storage upload for generated audio.
//!
//! Uploads never fail the request: every error is folded into
//! [`UploadOutcome::Failed`] and reported alongside the audio.

use std::time::Duration;

use reqwest::Url;

use crate::audio::CONTENT_TYPE;
use crate::config::StorageConfig;
use crate::{Error, Result};

/// Where an uploaded object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub path: String,
    pub filename: String,
}

/// Result of an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored(StoredObject),
    Failed(String),
}

/// Storage backend seam.
pub trait StorageUploader: Send {
    /// Upload `bytes` for `destination_id`. `name_hint` seeds the filename.
    fn upload(&self, bytes: &[u8], destination_id: &str, name_hint: &str) -> UploadOutcome;
}

/// Uploader used when no storage credentials are configured.
#[derive(Debug, Default)]
pub struct DisabledUploader;

impl StorageUploader for DisabledUploader {
    fn upload(&self, _bytes: &[u8], _destination_id: &str, _name_hint: &str) -> UploadOutcome {
        UploadOutcome::Failed("storage upload is not configured".into())
    }
}

/// Build the configured uploader, or [`DisabledUploader`] when storage is off.
pub fn uploader_from_config(config: &StorageConfig) -> Result<Box<dyn StorageUploader>> {
    match (&config.bucket, &config.access_token) {
        (Some(bucket), Some(token)) => {
            tracing::info!(bucket = %bucket, endpoint = %config.endpoint, "storage upload enabled");
            Ok(Box::new(GcsUploader::new(bucket, token, &config.endpoint)?))
        }
        _ => {
            tracing::info!("storage credentials not set, upload disabled");
            Ok(Box::new(DisabledUploader))
        }
    }
}

/// Google Cloud Storage JSON API uploader (works for Firebase Storage buckets).
pub struct GcsUploader {
    client: reqwest::blocking::Client,
    bucket: String,
    access_token: String,
    endpoint: Url,
}

impl GcsUploader {
    pub fn new(bucket: &str, access_token: &str, endpoint: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("storage client: {e}")))?;
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("storage endpoint {endpoint:?}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Config(format!("storage endpoint {endpoint} is not a base URL")));
        }
        Ok(Self {
            client,
            bucket: bucket.to_string(),
            access_token: access_token.to_string(),
            endpoint,
        })
    }

    /// `endpoint` with `segments` appended, each percent-encoded.
    fn endpoint_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Public URL of an object; every path segment is escaped separately.
    pub fn public_url(&self, path: &str) -> Url {
        self.endpoint_url(std::iter::once(self.bucket.as_str()).chain(path.split('/')))
    }

    fn put_object(&self, bytes: &[u8], path: &str) -> Result<()> {
        let url = self.endpoint_url(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("uploadType", "media"),
                ("name", path),
                ("predefinedAcl", "publicRead"),
            ])
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| Error::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Upload(format!("storage returned {status}: {body}")));
        }
        Ok(())
    }
}

impl StorageUploader for GcsUploader {
    fn upload(&self, bytes: &[u8], destination_id: &str, name_hint: &str) -> UploadOutcome {
        let filename = object_filename(name_hint, unix_millis());
        let path = object_path(destination_id, &filename);
        match self.put_object(bytes, &path) {
            Ok(()) => {
                let url = self.public_url(&path).to_string();
                tracing::info!(path = %path, bytes = bytes.len(), "uploaded audio");
                UploadOutcome::Stored(StoredObject {
                    url,
                    path,
                    filename,
                })
            }
            Err(error) => {
                tracing::warn!(%error, path = %path, "audio upload failed");
                UploadOutcome::Failed(error.to_string())
            }
        }
    }
}

/// `tts_{millis}_{sanitized}.wav` from the first 30 characters of `hint`.
pub fn object_filename(hint: &str, millis: u128) -> String {
    let kept: String = hint
        .chars()
        .take(30)
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    let sanitized = kept.trim().replace(' ', "_");
    format!("tts_{millis}_{sanitized}.wav")
}

/// `users/{destination_id}/tts/{filename}`.
pub fn object_path(destination_id: &str, filename: &str) -> String {
    format!("users/{destination_id}/tts/{filename}")
}

fn unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_filename_sanitizes() {
        assert_eq!(
            object_filename("Hello, world! <laugh> yes", 1700000000000),
            "tts_1700000000000_Hello_world_laugh_yes.wav"
        );
        assert_eq!(object_filename("  ", 5), "tts_5_.wav");
    }

    #[test]
    fn test_object_filename_uses_first_30_chars() {
        let hint = "abcdefghij abcdefghij abcdefghXYZ_tail";
        assert_eq!(
            object_filename(hint, 1),
            "tts_1_abcdefghij_abcdefghij_abcdefgh.wav"
        );
    }

    #[test]
    fn test_object_path() {
        assert_eq!(
            object_path("user123", "tts_1_a.wav"),
            "users/user123/tts/tts_1_a.wav"
        );
    }

    #[test]
    fn test_disabled_uploader_reports_failure() {
        let outcome = DisabledUploader.upload(b"RIFF", "user", "hi");
        assert_eq!(
            outcome,
            UploadOutcome::Failed("storage upload is not configured".into())
        );
    }

    #[test]
    fn test_uploader_from_config_without_credentials() {
        let uploader = uploader_from_config(&StorageConfig::default()).unwrap();
        assert!(matches!(
            uploader.upload(b"", "u", "t"),
            UploadOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_unreachable_endpoint_folds_into_failure() {
        let uploader = GcsUploader::new("bucket", "token", "http://127.0.0.1:9").unwrap();
        match uploader.upload(b"RIFF", "user", "hello") {
            UploadOutcome::Failed(message) => assert!(message.starts_with("upload:")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    /// Accepts one HTTP request, answers 200 and returns the request head.
    fn serve_once() -> (String, std::thread::JoinHandle<String>) {
        use std::io::{BufRead, BufReader, Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            reader
                .get_mut()
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}")
                .unwrap();
            head
        });
        (endpoint, handle)
    }

    #[test]
    fn test_stored_object_url_is_percent_encoded() {
        let (endpoint, server) = serve_once();
        let uploader = GcsUploader::new("bkt", "token", &endpoint).unwrap();

        let stored = match uploader.upload(b"RIFF", "team #1", "Héllo wörld") {
            UploadOutcome::Stored(stored) => stored,
            other => panic!("expected stored object, got {other:?}"),
        };
        let head = server.join().unwrap();

        assert!(stored.filename.starts_with("tts_"));
        assert!(stored.filename.ends_with("_Héllo_wörld.wav"));
        assert_eq!(stored.path, format!("users/team #1/tts/{}", stored.filename));

        assert!(stored.url.is_ascii(), "{}", stored.url);
        assert!(!stored.url.contains(' ') && !stored.url.contains('#') && !stored.url.contains('?'));
        assert!(stored.url.starts_with(&format!("{endpoint}/bkt/users/team%20%231/tts/tts_")));
        assert!(stored.url.ends_with("_H%C3%A9llo_w%C3%B6rld.wav"), "{}", stored.url);

        assert!(head.starts_with("POST /upload/storage/v1/b/bkt/o?uploadType=media&name="));
        assert!(head.to_ascii_lowercase().contains("authorization: bearer token"));
    }

    #[test]
    fn test_public_url_keeps_endpoint_path() {
        let uploader = GcsUploader::new("bkt", "t", "https://storage.example.com/base/").unwrap();
        assert_eq!(
            uploader.public_url("users/a?b/tts/x.wav").as_str(),
            "https://storage.example.com/base/bkt/users/a%3Fb/tts/x.wav"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_a_config_error() {
        assert!(matches!(
            GcsUploader::new("bkt", "t", "not a url"),
            Err(Error::Config(_))
        ));
    }
}
