use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::foundation::error::{ExportError, ExportResult};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress of a running export, reported once per sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Sample about to be rendered (0-based).
    pub current: u64,
    /// Total samples in the job.
    pub total: u64,
}

/// Progress reporting and cooperative cancellation for a long-running export.
#[derive(Default)]
pub struct TaskCtx<'a> {
    cancel: CancelToken,
    on_progress: Option<Box<dyn FnMut(&Progress) + 'a>>,
}

impl<'a> TaskCtx<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(&Progress) + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Report progress, then fail with [`ExportError::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&mut self, progress: Progress) -> ExportResult<()> {
        if let Some(f) = self.on_progress.as_mut() {
            f(&progress);
        }
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_reports_then_observes_cancellation() {
        let token = CancelToken::new();
        let mut seen = Vec::new();
        {
            let t = token.clone();
            let mut task = TaskCtx::new()
                .with_cancel(token.clone())
                .on_progress(|p: &Progress| {
                    seen.push(p.current);
                    if p.current == 2 {
                        t.cancel();
                    }
                });
            for i in 0..5 {
                let res = task.checkpoint(Progress {
                    current: i,
                    total: 5,
                });
                if i < 2 {
                    assert!(res.is_ok());
                } else {
                    assert!(matches!(res, Err(ExportError::Cancelled)));
                    break;
                }
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(token.is_cancelled());
    }
}
