use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::CatalogError;

/// Byte stream of one payload file.
pub type PayloadStream = BoxStream<'static, Result<Bytes, CatalogError>>;

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { email: String, password: String },
    Token { auth_token: String, device_id: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .finish_non_exhaustive(),
            Credentials::Token { device_id, .. } => f
                .debug_struct("Token")
                .field("device_id", device_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Authenticated session, shared by the poll loop and the retrieval worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub auth_token: String,
    pub device_id: String,
}

pub struct AuxiliaryPayload {
    pub kind: String,
    pub version_code: i64,
    pub stream: PayloadStream,
}

/// Everything needed to store one retrieved version.
pub struct Delivery {
    pub doc_id: String,
    pub primary: PayloadStream,
    pub auxiliary: Vec<AuxiliaryPayload>,
}

#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, CatalogError>;

    /// Raw details for each handle, aligned with `handles`; `None` where the
    /// catalog has nothing for a handle.
    async fn bulk_details(
        &self,
        session: &Session,
        handles: &[String],
    ) -> Result<Vec<Option<Value>>, CatalogError>;

    async fn delivery(
        &self,
        session: &Session,
        handle: &str,
        version_code: i64,
    ) -> Result<Delivery, CatalogError>;
}
