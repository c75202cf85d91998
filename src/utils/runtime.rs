use anyhow::Result;

/// Runtime of the daemon. Everything it does is waiting on timers and files.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
