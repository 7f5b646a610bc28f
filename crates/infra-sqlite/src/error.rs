// sqlx::Error -> AppError mapping
//
// Orphan rules forbid `From<sqlx::Error> for AppError` here, so every call site
// maps explicitly.

use drover_core::error::AppError;

/// Convert a sqlx error into a transport error with structured detail
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite result codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Transport(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Transport(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Transport(format!("Database full: {}", db_err.message())),
                    _ => AppError::Transport(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Transport(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Transport("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Transport(format!("Column not found: {}", col))
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Transport("Connection pool timed out".to_string())
        }
        _ => AppError::Transport(format!("Database unavailable: {}", err)),
    }
}
