//! Progress and status reporting back to the platform.
//!
//! The platform exposes a per-operation callback URL; progress and terminal
//! status are POSTed to its `/response` resource as query parameters. A 409
//! from the callback means the operation was canceled out from under us.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::ErrorLevel;

#[derive(Debug, Clone)]
pub enum StatusUpdate {
  Progress { percent: u8 },
  Error { message: String, level: ErrorLevel },
}

/// The callback refused the update. `canceled` means the platform no longer
/// wants this operation's results.
#[derive(Debug, thiserror::Error)]
#[error("status callback rejected: {message}")]
pub struct CallbackRejection {
  pub message: String,
  pub canceled: bool,
}

#[async_trait]
pub trait StatusNotifier: Send + Sync {
  async fn notify(&self, update: StatusUpdate) -> Result<(), CallbackRejection>;
}

/// Swallows updates. Used offline and when the message carries no callback.
pub struct NoopNotifier;

#[async_trait]
impl StatusNotifier for NoopNotifier {
  async fn notify(&self, update: StatusUpdate) -> Result<(), CallbackRejection> {
    debug!(?update, "status update suppressed");
    Ok(())
  }
}

pub struct HttpStatusNotifier {
  client: reqwest::Client,
  base: String,
}

impl HttpStatusNotifier {
  pub fn new(callback: &str, user_agent: &str) -> Self {
    let client = reqwest::Client::builder()
      .user_agent(user_agent.to_string())
      .build()
      .unwrap_or_default();
    HttpStatusNotifier {
      client,
      base: callback.trim_end_matches('/').to_string(),
    }
  }
}

#[async_trait]
impl StatusNotifier for HttpStatusNotifier {
  async fn notify(&self, update: StatusUpdate) -> Result<(), CallbackRejection> {
    let url = format!("{}/response", self.base);
    let request = self.client.post(&url);
    let request = match &update {
      StatusUpdate::Progress { percent } => {
        request.query(&[("progress", percent.to_string())])
      }
      StatusUpdate::Error { message, level } => request.query(&[
        ("error", message.clone()),
        ("level", level.to_string()),
      ]),
    };

    let response = request.send().await.map_err(|e| CallbackRejection {
      message: e.to_string(),
      canceled: false,
    })?;

    let status = response.status();
    if status.is_success() {
      debug!(?update, "status update delivered");
      return Ok(());
    }
    Err(CallbackRejection {
      message: format!("callback returned {status}"),
      canceled: status == StatusCode::CONFLICT,
    })
  }
}
