use bytes::Bytes;
use http::header;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{net::TcpStream, time};

/// A minimal HTTP/1 JSON client for broker and router management endpoints.
///
/// Each request uses its own connection; management requests are infrequent
/// and the endpoints come and go with their pods.
#[derive(Clone, Debug)]
pub(crate) struct ManagementClient {
    timeout: time::Duration,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ManagementError {
    #[error("failed to connect to {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{authority} responded with {status}")]
    Status {
        authority: String,
        status: http::StatusCode,
    },

    #[error("invalid response from {authority}: {source}")]
    Decode {
        authority: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request to {0} timed out")]
    Timeout(String),
}

// === impl ManagementClient ===

impl ManagementClient {
    pub(crate) fn new(timeout: time::Duration) -> Self {
        Self { timeout }
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        authority: &str,
        path: &str,
    ) -> Result<T, ManagementError> {
        let req = http::Request::get(path)
            .header(header::HOST, authority)
            .header(header::ACCEPT, "application/json")
            .body(Full::new(Bytes::new()))?;
        self.send(authority, req).await
    }

    pub(crate) async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        authority: &str,
        path: &str,
        body: &B,
    ) -> Result<T, ManagementError> {
        let body = serde_json::to_vec(body).map_err(ManagementError::Encode)?;
        let req = http::Request::post(path)
            .header(header::HOST, authority)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))?;
        self.send(authority, req).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        authority: &str,
        req: http::Request<Full<Bytes>>,
    ) -> Result<T, ManagementError> {
        let body = time::timeout(self.timeout, exchange(authority, req))
            .await
            .map_err(|_| ManagementError::Timeout(authority.to_string()))??;
        serde_json::from_slice(&body).map_err(|source| ManagementError::Decode {
            authority: authority.to_string(),
            source,
        })
    }
}

async fn exchange(
    authority: &str,
    req: http::Request<Full<Bytes>>,
) -> Result<Bytes, ManagementError> {
    let stream = TcpStream::connect(authority)
        .await
        .map_err(|source| ManagementError::Connect {
            authority: authority.to_string(),
            source,
        })?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(error) = conn.await {
            tracing::debug!(%error, "Management connection failed");
        }
    });

    let rsp = sender.send_request(req).await?;
    if !rsp.status().is_success() {
        return Err(ManagementError::Status {
            authority: authority.to_string(),
            status: rsp.status(),
        });
    }
    Ok(rsp.into_body().collect().await?.to_bytes())
}
