use anyhow::Result;

use crate::notification::NotificationMessage;

/// Represents something that reacts to messages coming back from notifications. Right now the
/// only message is a picked action, but the daemon may receive more kinds later.
pub trait EventProcessor {
    fn process_next(
        &mut self,
        message: NotificationMessage,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
}
