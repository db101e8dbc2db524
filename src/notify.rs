//! Push notifications for stored codes.
//!
//! Each target is an HTTP endpoint that accepts `{"title": ..., "body": ...}`.
//! A batch is sent concurrently and a failing target never affects the others.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::NotifyError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct PushBody<'a> {
    title: &'a str,
    body: &'a str,
}

/// Posts notifications as JSON to webhook-style targets.
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::SendFailed {
                target: "<client>".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, target: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(target)
            .json(&PushBody { title, body })
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed {
                target: target.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(NotifyError::Status {
                target: target.into(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Notify every target concurrently. Returns how many succeeded.
pub async fn fan_out(notifier: &dyn Notifier, targets: &[String], title: &str, body: &str) -> usize {
    let sends = targets
        .iter()
        .map(|target| async move { (target, notifier.notify(target, title, body).await) });

    let mut delivered = 0;
    for (target, result) in join_all(sends).await {
        match result {
            Ok(()) => {
                debug!(target = %target, "notification delivered");
                delivered += 1;
            }
            Err(e) => warn!(target = %target, error = %e, "notification failed"),
        }
    }
    delivered
}
