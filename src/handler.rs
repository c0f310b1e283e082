use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::SqliteConnection;
use log::error;

use crate::errors::DBError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub trait WithDB {
    fn dbpool(&self) -> &DbPool;

    fn handle_errors(&self, e: diesel::result::Error) -> DBError {
        error!("{:?}", e);
        match e {
            diesel::result::Error::NotFound => DBError::not_found(),
            _ => DBError::new(),
        }
    }

    fn dbconn(&self) -> Result<DbConn, DBError> {
        self.dbpool().get().map_err(|e| {
            error!("{:?}", e);
            DBError::new()
        })
    }

    fn run_txn<T, F>(&self, f: F) -> Result<T, DBError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, diesel::result::Error>,
    {
        let mut conn = self.dbconn()?;
        conn.transaction(|conn| f(conn)).map_err(|e| self.handle_errors(e))
    }
}

pub struct BooksDB {
    dbpool: Arc<DbPool>,
}

impl BooksDB {
    pub fn new(dbpool: Arc<DbPool>) -> Self {
        Self { dbpool }
    }
}

impl WithDB for BooksDB {
    fn dbpool(&self) -> &DbPool {
        &self.dbpool
    }
}
