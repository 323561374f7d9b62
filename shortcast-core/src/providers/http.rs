use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::error::{ProviderError, ProviderResult};

pub fn build_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("shortcast/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Reads an api key from the environment at call time.
pub fn api_key(provider: &str, variable: &str) -> ProviderResult<String> {
    match std::env::var(variable) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ProviderError::MissingApiKey {
            provider: provider.to_string(),
            variable: variable.to_string(),
        }),
    }
}

/// Turns a non-2xx response into `ProviderError::Status`, keeping the body
/// text for the job's error message.
pub async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

pub async fn write_bytes(path: &Path, bytes: &[u8]) -> ProviderResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| ProviderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|source| ProviderError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Streams an `http`/`https` result url into `path`. Any other scheme is
/// rejected before the request is made.
pub async fn fetch_to_file(client: &reqwest::Client, url: &str, path: &Path) -> ProviderResult<()> {
    let parsed = Url::parse(url)
        .map_err(|err| ProviderError::Decode(format!("invalid result url {url}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProviderError::Decode(format!(
            "unsupported result url scheme {}",
            parsed.scheme()
        )));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| ProviderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let response = client.get(parsed).send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut file = fs::File::create(path)
        .await
        .map_err(|source| ProviderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    while let Some(chunk) = stream.next().await {
        let data = chunk?;
        file.write_all(&data)
            .await
            .map_err(|source| ProviderError::Io {
                path: path.to_path_buf(),
                source,
            })?;
    }
    file.flush().await.map_err(|source| ProviderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn http_results_are_streamed_to_disk() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 6\r\nconnection: close\r\n\r\nframes")
                .await
                .unwrap();
        });

        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/job_video.mp4");
        let client = reqwest::Client::new();
        fetch_to_file(&client, &format!("http://{addr}/clip.mp4"), &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"frames");
    }

    #[tokio::test]
    async fn local_and_unknown_schemes_are_rejected() {
        let dir = tempdir().unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, b"host data").unwrap();
        let target = dir.path().join("job_video.mp4");
        let client = reqwest::Client::new();

        let file_url = Url::from_file_path(&secret).unwrap();
        for url in [file_url.as_str(), "ftp://example.com/clip.mp4", "not a url"] {
            let err = fetch_to_file(&client, url, &target).await.unwrap_err();
            assert!(matches!(err, ProviderError::Decode(_)), "{url}: {err}");
        }
        assert!(!target.exists());
    }

    #[test]
    fn missing_api_key_names_variable() {
        let err = api_key("muapi", "SHORTCAST_TEST_UNSET_KEY").unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingApiKey { ref variable, .. } if variable == "SHORTCAST_TEST_UNSET_KEY"
        ));
    }
}
