//! Dedicated writer thread serializing all database writes.
//!
//! SQLite allows one writer at a time; funneling every write through a single
//! thread avoids busy-timeout churn under concurrent async callers. Each job
//! runs inside an immediate transaction, so a job that returns an error
//! rolls back atomically.

use std::sync::mpsc;
use std::thread;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{error, warn};
use tokio::sync::oneshot;

use centavo_core::errors::{DatabaseError, Error, Result};

use crate::db::DbPool;

type Job = Box<dyn FnOnce(&DbPool) + Send + 'static>;

// Lets application errors pass through `immediate_transaction`, which
// requires its error type to absorb diesel rollback errors.
enum TxError {
    App(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Diesel(err)
    }
}

/// Cloneable handle submitting write jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Job>,
}

impl WriteHandle {
    /// Run `job` on the writer thread inside an immediate transaction and
    /// await its result. Returning an error from the job rolls the
    /// transaction back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move |pool| {
            let result = run_write(pool, job);
            let _ = reply_tx.send(result);
        });

        self.tx.send(boxed).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer thread is gone".to_string(),
            ))
        })?;
        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer dropped the reply".to_string(),
            ))
        })?
    }
}

fn run_write<T, F>(pool: &DbPool, job: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T>,
{
    let mut conn = pool
        .get()
        .map_err(|e| Error::Database(DatabaseError::Connection(e.to_string())))?;
    conn.immediate_transaction(|tx| job(tx).map_err(TxError::App))
        .map_err(|err| match err {
            TxError::App(e) => e,
            TxError::Diesel(e) => Error::Database(DatabaseError::Query(e.to_string())),
        })
}

/// Spawn the writer thread and return its submission handle.
///
/// The thread exits when every `WriteHandle` clone is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, rx) = mpsc::channel::<Job>();
    let spawned = thread::Builder::new()
        .name("centavo-db-writer".to_string())
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                job(&pool);
            }
        });
    if let Err(e) = spawned {
        error!("[DB] failed to spawn writer thread: {e}");
        warn!("[DB] writes will fail until the process restarts");
    }
    WriteHandle { tx }
}
