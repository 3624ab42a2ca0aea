#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use tracker_engine::{
    AuxiliaryPayload, CatalogClient, CatalogError, Credentials, Delivery, FailureKind,
    PayloadStream, RetrievalEvent, RetrievalSink, Session,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub fn details(handle: &str, upload_date: &str, version_code: i64) -> Value {
    json!({
        "docid": handle,
        "details": {
            "appDetails": {
                "versionString": format!("v{version_code}"),
                "versionCode": version_code,
                "uploadDate": upload_date,
            }
        }
    })
}

pub fn session() -> Session {
    Session {
        auth_token: "token-1".to_string(),
        device_id: "device-1".to_string(),
    }
}

pub fn credentials() -> Credentials {
    Credentials::Token {
        auth_token: "token-1".to_string(),
        device_id: "device-1".to_string(),
    }
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
pub struct TestSink {
    events: Mutex<Vec<RetrievalEvent>>,
}

impl TestSink {
    pub fn events(&self) -> Vec<RetrievalEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn completed(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, RetrievalEvent::Completed { .. }))
            .count()
    }
}

impl RetrievalSink for TestSink {
    fn emit(&self, event: RetrievalEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory catalog that records what the tracker asked for.
#[derive(Default)]
pub struct FakeCatalog {
    pub details: Mutex<Vec<Option<Value>>>,
    pub details_error: Mutex<Option<CatalogError>>,
    pub auth_error: Option<CatalogError>,
    pub deliveries: Mutex<Vec<(String, i64)>>,
    pub failing: Mutex<HashSet<String>>,
    pub broken_streams: Mutex<HashSet<String>>,
    pub delivery_delay: Duration,
    pub bulk_calls: AtomicUsize,
    pub active: Arc<AtomicUsize>,
    pub max_active: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_delay(delivery_delay: Duration) -> Self {
        Self {
            delivery_delay,
            ..Self::default()
        }
    }

    pub fn set_details(&self, details: Vec<Option<Value>>) {
        *self.details.lock().unwrap() = details;
    }

    pub fn deliveries(&self) -> Vec<(String, i64)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn payload(chunks: Vec<Result<Bytes, CatalogError>>, guard: Arc<ActiveGuard>) -> PayloadStream {
        stream::iter(chunks)
            .map(move |chunk| {
                let _ = &guard;
                chunk
            })
            .boxed()
    }
}

#[async_trait::async_trait]
impl CatalogClient for FakeCatalog {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, CatalogError> {
        match &self.auth_error {
            Some(err) => Err(err.clone()),
            None => Ok(session()),
        }
    }

    async fn bulk_details(
        &self,
        _session: &Session,
        handles: &[String],
    ) -> Result<Vec<Option<Value>>, CatalogError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.details_error.lock().unwrap().clone() {
            return Err(err);
        }
        let details = self.details.lock().unwrap().clone();
        assert!(details.len() <= handles.len());
        Ok(details)
    }

    async fn delivery(
        &self,
        _session: &Session,
        handle: &str,
        version_code: i64,
    ) -> Result<Delivery, CatalogError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((handle.to_string(), version_code));
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let guard = Arc::new(ActiveGuard(self.active.clone()));

        tokio::time::sleep(self.delivery_delay).await;

        if self.failing.lock().unwrap().contains(handle) {
            return Err(CatalogError::new(FailureKind::HttpStatus(500), "boom"));
        }

        let primary = if self.broken_streams.lock().unwrap().contains(handle) {
            vec![
                Ok(Bytes::from_static(b"partial")),
                Err(CatalogError::new(FailureKind::Network, "connection reset")),
            ]
        } else {
            vec![
                Ok(Bytes::from(format!("primary-{handle}-"))),
                Ok(Bytes::from(format!("{version_code}"))),
            ]
        };

        Ok(Delivery {
            doc_id: handle.to_string(),
            primary: Self::payload(primary, guard.clone()),
            auxiliary: vec![AuxiliaryPayload {
                kind: "main".to_string(),
                version_code: version_code - 1,
                stream: Self::payload(vec![Ok(Bytes::from_static(b"expansion"))], guard),
            }],
        })
    }
}
