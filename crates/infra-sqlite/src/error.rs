// sqlx::Error -> AppError with SQLite result codes classified

use conveyor_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return AppError::Persistence(format!("Database error: {}", db_err.message()));
            };
            let code_str = code.as_ref();

            // SQLite result codes: https://www.sqlite.org/rescode.html
            match code_str {
                "2067" | "1555" => AppError::Conflict(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code_str
                )),
                "275" => AppError::Validation(format!(
                    "Check constraint violation: {}",
                    db_err.message()
                )),
                "5" | "517" => AppError::Persistence(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Persistence(format!("Database full: {}", db_err.message())),
                _ => AppError::Persistence(format!(
                    "Database error [{}]: {}",
                    code_str,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Internal(format!("Column not found: {}", col))
        }
        // Connection, pool and protocol errors are transient from the caller's view
        _ => AppError::Persistence(err.to_string()),
    }
}
