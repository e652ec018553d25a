//! The in-flight token exchange shared by concurrent callers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;

use crate::error::SdkError;

pub type TokenResult = Result<String, SdkError>;

/// Handle on a token exchange running in its own task.
///
/// Cloning is cheap and every clone resolves to the same result. Dropping
/// every clone does not stop the task: the exchange runs to completion and
/// whatever it persisted stays persisted.
#[derive(Clone)]
pub struct PendingAuthentication {
    generation: u64,
    user_id: Arc<str>,
    failed: Arc<AtomicBool>,
    settled: Arc<AtomicBool>,
    result: Shared<BoxFuture<'static, TokenResult>>,
}

impl PendingAuthentication {
    /// Spawn `fetch` on `runtime`. Callable from any thread.
    pub fn spawn<F>(runtime: &Handle, generation: u64, user_id: &str, fetch: F) -> Self
    where
        F: Future<Output = TokenResult> + Send + 'static,
    {
        let failed = Arc::new(AtomicBool::new(false));
        let settled = Arc::new(AtomicBool::new(false));

        let task_failed = Arc::clone(&failed);
        let task_settled = SettledOnDrop(Arc::clone(&settled));
        let task = runtime.spawn(async move {
            let _settled = task_settled;
            let result = fetch.await;
            if result.is_err() {
                task_failed.store(true, Ordering::SeqCst);
            }
            result
        });

        let join_failed = Arc::clone(&failed);
        let result = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    join_failed.store(true, Ordering::SeqCst);
                    Err(SdkError::Unknown(format!("authentication task failed: {}", e)))
                }
            }
        }
        .boxed()
        .shared();

        Self {
            generation,
            user_id: Arc::from(user_id),
            failed,
            settled,
            result,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// User id the exchange was started for.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// True once the exchange has finished with an error.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// True once the task is done, successfully or not. Anything the
    /// exchange persisted is visible by then.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    pub async fn wait(self) -> TokenResult {
        self.result.await
    }
}

/// Marks the exchange settled when the task ends, including by panic or
/// runtime shutdown.
struct SettledOnDrop(Arc<AtomicBool>);

impl Drop for SettledOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
