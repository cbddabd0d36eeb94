use crate::application::repos::RepoError;

// Primary SQLite result codes; extended codes carry these in the low byte.
const SQLITE_PERM: i32 = 3;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_READONLY: i32 = 8;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_CONSTRAINT: i32 = 19;
const SQLITE_AUTH: i32 = 23;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            RepoError::Connection(err.to_string())
        }
        sqlx::Error::Database(ref db) => {
            let message = db.message().to_string();
            match primary_code(db.code().as_deref()) {
                Some(SQLITE_CANTOPEN) => RepoError::MissingDatabase(message),
                Some(SQLITE_AUTH | SQLITE_PERM | SQLITE_READONLY) => {
                    RepoError::Authorization(message)
                }
                Some(SQLITE_BUSY | SQLITE_LOCKED) => RepoError::Timeout,
                Some(SQLITE_CONSTRAINT) => RepoError::Validation {
                    row: None,
                    reason: message,
                },
                _ => RepoError::Persistence(message),
            }
        }
        other => RepoError::from_persistence(other),
    }
}

fn primary_code(code: Option<&str>) -> Option<i32> {
    code?.parse::<i32>().ok().map(|code| code & 0xff)
}
