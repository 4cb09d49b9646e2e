//! Per-query state shared by every block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::block_manager::BlockManager;
use super::options::ExecOptions;
use crate::error::{ExecError, Result};

/// State shared by every block of one query pipeline.
#[derive(Clone, Debug)]
pub struct ExecContext {
    options: Arc<ExecOptions>,
    block_manager: BlockManager,
    kill_flag: Arc<AtomicBool>,
}

impl ExecContext {
    /// Context with its own block pool and kill flag.
    pub fn new(options: ExecOptions) -> Self {
        Self::with_kill_flag(options, Arc::new(AtomicBool::new(false)))
    }

    /// Context observing an externally owned kill flag.
    pub fn with_kill_flag(options: ExecOptions, kill_flag: Arc<AtomicBool>) -> Self {
        let block_manager = BlockManager::new(options.pool_capacity);
        Self {
            options: Arc::new(options),
            block_manager,
            kill_flag,
        }
    }

    /// Driver options.
    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Block allocator of the pipeline.
    pub fn block_manager(&self) -> &BlockManager {
        &self.block_manager
    }

    /// Handle to the kill flag, for cancelling from elsewhere.
    pub fn kill_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.kill_flag)
    }

    /// Requests cancellation; blocks notice it at their next poll.
    pub fn kill(&self) {
        self.kill_flag.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    pub fn is_killed(&self) -> bool {
        self.kill_flag.load(Ordering::SeqCst)
    }

    /// Fails with [`ExecError::Killed`] once cancellation was requested.
    pub fn check_killed(&self) -> Result<()> {
        if self.is_killed() {
            debug!("kill flag observed");
            return Err(ExecError::Killed);
        }
        Ok(())
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(ExecOptions::default())
    }
}
