//! Persistence boundary: the store hands a full dump to a caller-supplied hook.

use std::future::Future;

use futures::future::BoxFuture;

pub use crate::application::error::SaveError;

pub type SaveFuture = BoxFuture<'static, Result<(), SaveError>>;

/// Caller-supplied asynchronous persistence.
///
/// Receives the serialized tree after every structural change. Failures are
/// captured into the snapshot error; they never reach the mutating caller.
pub trait SaveHook: Send + Sync {
    fn save(&self, dump: String) -> SaveFuture;
}

impl<F, Fut> SaveHook for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SaveError>> + Send + 'static,
{
    fn save(&self, dump: String) -> SaveFuture {
        Box::pin(self(dump))
    }
}
