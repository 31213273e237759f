use std::ops::{Deref, DerefMut};

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard};

/// Queue for write transactions.
///
/// SQLite admits one writer at a time, and a deferred transaction that has
/// already read cannot wait for the write lock: it fails with
/// `SQLITE_BUSY` as soon as another connection holds it. Writers therefore
/// take this gate before `BEGIN`; readers never touch it.
#[derive(Debug, Default)]
pub struct WriteGate(Mutex<()>);

/// A transaction that holds the write gate until it is committed or dropped.
pub struct WriteTx<'a> {
    // Declared first so an uncommitted transaction starts its rollback
    // before the next writer is let in.
    tx: Transaction<'static, Sqlite>,
    _permit: MutexGuard<'a, ()>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, pool: &SqlitePool) -> Result<WriteTx<'_>, sqlx::Error> {
        let permit = self.0.lock().await;
        let tx = pool.begin().await?;
        Ok(WriteTx {
            tx,
            _permit: permit,
        })
    }
}

impl WriteTx<'_> {
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        let WriteTx { tx, _permit } = self;
        tx.commit().await
    }
}

impl Deref for WriteTx<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for WriteTx<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back_and_releases_gate() {
        let pool = pool().await;
        let gate = WriteGate::new();

        {
            let mut tx = gate.begin(&pool).await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (1)")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        let mut tx = gate.begin(&pool).await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (2)")
            .execute(&mut *tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let values: Vec<i64> = sqlx::query_scalar("SELECT v FROM t")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(values, vec![2]);
    }
}
