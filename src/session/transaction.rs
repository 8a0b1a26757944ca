//! Transactions
//!
//! A transaction session shares one open transaction between all of its
//! clones. `commit` and `rollback` empty the shared slot, so statements
//! issued afterwards fail with `InvalidTransaction`.

use super::{Connection, Session};
use crate::database::TxOptions;
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline for starting a transaction
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Session {
    /// Start a transaction with the session's context, if any
    pub async fn begin(&self) -> Result<Session> {
        let context = self.context.clone().unwrap_or_default();
        self.begin_tx(context, None).await
    }

    /// Start a transaction, giving up when `context` is cancelled or its
    /// deadline passes first
    pub async fn begin_tx(&self, context: TxContext, options: Option<TxOptions>) -> Result<Session> {
        self.check()?;
        let adapter = match &self.conn {
            Connection::Pool(adapter) => adapter.clone(),
            Connection::Transaction { .. } => {
                return Err(Error::CantStartTransaction(
                    "a transaction is already open".to_string(),
                ))
            }
        };

        let begin = async {
            match context.timeout {
                Some(limit) => tokio::time::timeout(limit, adapter.begin(options))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::CantStartTransaction(
                            "context deadline exceeded".to_string(),
                        ))
                    }),
                None => adapter.begin(options).await,
            }
        };

        let tx = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => {
                return Err(Error::CantStartTransaction("context canceled".to_string()));
            }
            result = begin => result?,
        };

        log::debug!("Transaction started on {}", adapter.name());

        let mut session = self.clone();
        session.conn = Connection::Transaction {
            adapter,
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        Ok(session)
    }

    pub async fn commit(&self) -> Result<()> {
        let Connection::Transaction { tx, .. } = &self.conn else {
            return Err(Error::InvalidTransaction);
        };
        let tx = tx.lock().await.take().ok_or(Error::InvalidTransaction)?;
        tx.commit().await?;
        log::debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        let Connection::Transaction { tx, .. } = &self.conn else {
            return Err(Error::InvalidTransaction);
        };
        let tx = tx.lock().await.take().ok_or(Error::InvalidTransaction)?;
        tx.rollback().await?;
        log::debug!("Transaction rolled back");
        Ok(())
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self.conn, Connection::Transaction { .. })
    }

    /// Whether this transaction was committed or rolled back
    pub async fn is_finished(&self) -> bool {
        match &self.conn {
            Connection::Transaction { tx, .. } => tx.lock().await.is_none(),
            Connection::Pool(_) => false,
        }
    }

    /// Run `f` inside a transaction
    ///
    /// Commits when `f` succeeds and rolls back when it fails. If `f`
    /// panics the transaction is dropped, which rolls it back.
    pub async fn transaction<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let tx = self.begin().await?;
        match f(tx.clone()).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Rollback after {} failed: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrmConfig;
    use crate::database::SqliteAdapter;

    async fn session() -> Session {
        let config = OrmConfig::with_url("sqlite::memory:");
        let adapter = SqliteAdapter::new("test", "sqlite::memory:", &config.database)
            .await
            .unwrap();
        Session::new(Arc::new(adapter), config)
    }

    #[tokio::test]
    async fn test_commit_outside_transaction() {
        let db = session().await;
        assert_eq!(db.commit().await, Err(Error::InvalidTransaction));
        assert_eq!(db.rollback().await, Err(Error::InvalidTransaction));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let db = session().await;
        let context = TxContext::new();
        context.cancel();
        let err = db.begin_tx(context, None).await.err().unwrap();
        assert_eq!(err, Error::CantStartTransaction("context canceled".into()));
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_statements() {
        let db = session().await;
        db.exec("CREATE TABLE t (id INTEGER)", vec![]).await.unwrap();

        let tx = db.begin().await.unwrap();
        assert!(tx.is_transaction());
        tx.exec("INSERT INTO t (id) VALUES (1)", vec![]).await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.is_finished().await);
        assert_eq!(
            tx.exec("INSERT INTO t (id) VALUES (2)", vec![]).await,
            Err(Error::InvalidTransaction)
        );
        assert_eq!(db.table("t").count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closure_rolls_back_on_error() {
        let db = session().await;
        db.exec("CREATE TABLE t (id INTEGER)", vec![]).await.unwrap();

        let result: Result<()> = db
            .transaction(|tx| async move {
                tx.exec("INSERT INTO t (id) VALUES (1)", vec![]).await?;
                Err(Error::invalid_input("abort"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(db.clone().table("t").count().await.unwrap(), 0);

        db.transaction(|tx| async move {
            tx.exec("INSERT INTO t (id) VALUES (1)", vec![]).await?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(db.table("t").count().await.unwrap(), 1);
    }
}
