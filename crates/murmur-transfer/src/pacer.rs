//! Paced delivery: release ready messages in batches with a pause between
//! batches, so a large transfer does not flood the relay or starve chat
//! traffic on the same socket.
//!
//! The pacer knows nothing about volumes; it drives any iterator through an
//! async send function. There are no acknowledgements and no retries. Dropping
//! the future stops delivery after the current item.

use murmur_core::TransferConfig;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    batch_size: usize,
    interval: Duration,
}

impl Pacer {
    pub fn new(batch_size: usize, interval: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            interval,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.batch_size, config.batch_interval())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Send every item, sleeping `interval` after each full batch.
    /// Stops at the first send error. Returns the number of items sent.
    pub async fn run<T, I, F, Fut, E>(&self, items: I, mut send: F) -> Result<usize, E>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut sent = 0usize;
        for item in items {
            if sent > 0 && sent % self.batch_size == 0 {
                tokio::time::sleep(self.interval).await;
            }
            send(item).await?;
            sent += 1;
        }
        Ok(sent)
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}
