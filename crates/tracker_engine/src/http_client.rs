use std::time::Duration;

use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{
    AuxiliaryPayload, CatalogClient, Credentials, Delivery, PayloadStream, Session,
};
use crate::{CatalogError, FailureKind};

const DEVICE_ID_HEADER: &str = "X-Device-Id";

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Total timeout for authentication and metadata requests. Payload
    /// downloads are only bounded by `connect_timeout`.
    pub request_timeout: Duration,
}

impl CatalogSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum AuthRequest<'a> {
    Password {
        email: &'a str,
        password: &'a str,
    },
    Token {
        #[serde(rename = "authToken")]
        auth_token: &'a str,
        #[serde(rename = "deviceId")]
        device_id: &'a str,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    auth_token: String,
    device_id: String,
}

#[derive(Serialize)]
struct BulkDetailsRequest<'a> {
    handles: &'a [String],
}

#[derive(Deserialize)]
struct BulkDetailsResponse {
    entries: Vec<Option<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryResponse {
    doc_id: String,
    download_url: String,
    #[serde(default)]
    additional_files: Vec<AdditionalFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdditionalFile {
    #[serde(rename = "type")]
    kind: String,
    version_code: i64,
    download_url: String,
}

/// Catalog client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    base: Url,
    api: reqwest::Client,
    downloads: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(settings: CatalogSettings) -> Result<Self, CatalogError> {
        let mut base_url = settings.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base = Url::parse(&base_url)
            .map_err(|err| CatalogError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let api = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        let downloads = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(map_reqwest_error)?;

        Ok(Self {
            base,
            api,
            downloads,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base
            .join(path)
            .map_err(|err| CatalogError::new(FailureKind::InvalidUrl, err.to_string()))
    }
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, CatalogError> {
        let body = match credentials {
            Credentials::Password { email, password } => AuthRequest::Password { email, password },
            Credentials::Token {
                auth_token,
                device_id,
            } => AuthRequest::Token {
                auth_token,
                device_id,
            },
        };
        let response = self
            .api
            .post(self.endpoint("auth")?)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let auth: AuthResponse = read_json(response).await?;

        Ok(Session {
            auth_token: auth.auth_token,
            device_id: auth.device_id,
        })
    }

    async fn bulk_details(
        &self,
        session: &Session,
        handles: &[String],
    ) -> Result<Vec<Option<Value>>, CatalogError> {
        let response = self
            .api
            .post(self.endpoint("bulkDetails")?)
            .bearer_auth(&session.auth_token)
            .header(DEVICE_ID_HEADER, &session.device_id)
            .json(&BulkDetailsRequest { handles })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let details: BulkDetailsResponse = read_json(response).await?;
        Ok(details.entries)
    }

    async fn delivery(
        &self,
        session: &Session,
        handle: &str,
        version_code: i64,
    ) -> Result<Delivery, CatalogError> {
        let mut url = self.endpoint("delivery")?;
        url.query_pairs_mut()
            .append_pair("doc", handle)
            .append_pair("vc", &version_code.to_string());

        let response = self
            .api
            .get(url)
            .bearer_auth(&session.auth_token)
            .header(DEVICE_ID_HEADER, &session.device_id)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let delivery: DeliveryResponse = read_json(response).await?;

        let primary = self.download_stream(session, &delivery.download_url)?;
        let auxiliary = delivery
            .additional_files
            .into_iter()
            .map(|file| {
                Ok(AuxiliaryPayload {
                    stream: self.download_stream(session, &file.download_url)?,
                    kind: file.kind,
                    version_code: file.version_code,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        Ok(Delivery {
            doc_id: delivery.doc_id,
            primary,
            auxiliary,
        })
    }
}

impl HttpCatalogClient {
    /// The request is only sent once the stream is first polled.
    fn download_stream(&self, session: &Session, url: &str) -> Result<PayloadStream, CatalogError> {
        let url = self.endpoint(url)?;
        let request = self
            .downloads
            .get(url)
            .bearer_auth(&session.auth_token)
            .header(DEVICE_ID_HEADER, &session.device_id);

        let body = async move {
            let response = request.send().await.map_err(map_reqwest_error)?;
            let response = check_status(response)?;
            Ok::<_, CatalogError>(response.bytes_stream().map_err(map_reqwest_error))
        };
        Ok(stream::once(body).try_flatten().boxed())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CatalogError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CatalogError::new(
            FailureKind::Unauthorized,
            format!("{} returned {status}", response.url()),
        ));
    }
    if !status.is_success() {
        return Err(CatalogError::new(
            FailureKind::HttpStatus(status.as_u16()),
            format!("{} returned {status}", response.url()),
        ));
    }
    Ok(response)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CatalogError> {
    let response = check_status(response)?;
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|err| CatalogError::new(FailureKind::Decode, err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> CatalogError {
    if err.is_timeout() {
        return CatalogError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return CatalogError::new(FailureKind::Decode, err.to_string());
    }
    CatalogError::new(FailureKind::Network, err.to_string())
}
