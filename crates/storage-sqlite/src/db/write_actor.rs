use super::DbPool;
use std::any::Any;
use tokio::sync::{mpsc, oneshot};
use vnquote_core::CoreResult;

// Type alias for the job to be executed by the writer actor. rusqlite's
// query/execute methods take `&self`, so a shared reference into the
// active transaction is enough.
type Job<T> = Box<dyn FnOnce(&rusqlite::Connection) -> CoreResult<T> + Send + 'static>;

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    #[allow(clippy::type_complexity)]
    tx: mpsc::Sender<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<CoreResult<Box<dyn Any + Send + 'static>>>,
    )>,
}

impl WriteHandle {
    /// Executes a database job on the writer actor's dedicated connection,
    /// wrapped in a transaction that commits on success and rolls back on
    /// error.
    pub async fn exec<F, T>(&self, job: F) -> CoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> CoreResult<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)), ret_tx))
            .await
            .map_err(|_| vnquote_core::CoreError::ServiceUnavailable("db writer actor stopped".into()))?;

        ret_rx
            .await
            .map_err(|_| vnquote_core::CoreError::ServiceUnavailable("db writer actor dropped reply".into()))?
            .map(|boxed: Box<dyn Any + Send + 'static>| {
                *boxed
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("failed to downcast writer actor result"))
            })
    }
}

/// Spawns a background task that owns one connection from the pool and
/// serializes all writes through it, avoiding `SQLITE_BUSY` contention
/// between concurrent callers.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<CoreResult<Box<dyn Any + Send + 'static>>>,
    )>(1024);

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().expect("failed to get a connection from the db pool for the writer actor");

        while let Some((job, reply_tx)) = rx.blocking_recv() {
            let result: CoreResult<Box<dyn Any + Send + 'static>> = (|| {
                let tx = conn.transaction().map_err(crate::errors::StorageError::from)?;
                match job(&tx) {
                    Ok(v) => {
                        tx.commit().map_err(crate::errors::StorageError::from)?;
                        Ok(v)
                    }
                    Err(e) => {
                        let _ = tx.rollback();
                        Err(e)
                    }
                }
            })();
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}
