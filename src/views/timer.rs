use std::time::Duration;

use tokio::task::JoinHandle;

/// How long a freshly mounted view shows its splash.
pub const DEFAULT_SPLASH: Duration = Duration::from_millis(1500);

/// One-shot splash timer owned by a mounted view. Dropping it (unmounting
/// the view) cancels the pending callback.
pub struct LoadingTimer {
    handle: JoinHandle<()>,
}

impl LoadingTimer {
    pub fn start<F>(duration: Duration, on_done: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_done();
        });
        Self { handle }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for LoadingTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
