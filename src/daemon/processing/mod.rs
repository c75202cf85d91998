use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::notification::NotificationMessage;

pub mod mark_done;
pub mod module;

/// Receives messages relayed from shown notifications and hands them to a processor one by one.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<NotificationMessage>,
    processor: Processor,
    shutdown: CancellationToken,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(
        receiver: Receiver<NotificationMessage>,
        processor: P,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            processor,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            debug!("Processing message {:?}", message);
            match self.processor.process_next(message.clone()).await {
                Ok(_) => {
                    info!("Processed message {:?}", message)
                }
                Err(e) => {
                    error!("Error processing message {:?}: {e:?}", message)
                }
            }
        }

        self.receiver.close();
        self.processor.finalize().await
    }
}
