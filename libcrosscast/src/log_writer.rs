//! Single-writer sink for publication logs
//!
//! Sibling publish tasks hand their log rows to a channel and move on; one
//! background task appends them to the store in arrival order. The store
//! therefore never sees concurrent appends, and a slow store never holds up
//! a network call.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{CrosscastError, DbError, Result};
use crate::store::PublicationLogStore;
use crate::types::PublicationLog;

pub struct LogWriter {
    sender: mpsc::UnboundedSender<PublicationLog>,
    handle: JoinHandle<Result<usize>>,
}

impl LogWriter {
    pub fn spawn(store: Arc<dyn PublicationLogStore>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<PublicationLog>();

        let handle = tokio::spawn(async move {
            let mut written = 0usize;
            let mut first_error: Option<CrosscastError> = None;

            while let Some(log) = receiver.recv().await {
                match store.append_log(&log).await {
                    Ok(()) => written += 1,
                    Err(e) => {
                        tracing::error!(
                            post_id = %log.post_id,
                            platform = %log.platform,
                            error = %e,
                            "Failed to append publication log"
                        );
                        first_error.get_or_insert(e);
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(written),
            }
        });

        Self { sender, handle }
    }

    /// A handle for one producer
    pub fn sender(&self) -> LogSender {
        LogSender {
            sender: self.sender.clone(),
        }
    }

    /// Close the channel and wait until every queued log has been written
    ///
    /// Every [`LogSender`] handed out must have been dropped, otherwise this
    /// waits for them.
    ///
    /// Returns the number of logs written, or the first append error. Logs
    /// after a failed append are still attempted.
    pub async fn finish(self) -> Result<usize> {
        drop(self.sender);
        self.handle
            .await
            .map_err(|e| DbError::Unavailable(format!("log writer stopped: {}", e)))?
    }
}

#[derive(Clone)]
pub struct LogSender {
    sender: mpsc::UnboundedSender<PublicationLog>,
}

impl LogSender {
    pub fn send(&self, log: PublicationLog) -> Result<()> {
        self.sender
            .send(log)
            .map_err(|_| DbError::Unavailable("log writer is closed".to_string()).into())
    }
}
