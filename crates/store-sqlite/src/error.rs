// sqlx::Error -> EngineError mapping, classified by SQLite error code.
// https://www.sqlite.org/rescode.html

use taskmesh_core::EngineError;

pub fn map_sqlx_error(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();
                match code_str {
                    "2067" | "1555" => EngineError::Store(format!(
                        "unique constraint violation: {} ({code_str})",
                        db_err.message()
                    )),
                    "5" => EngineError::Store(format!(
                        "database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => EngineError::Store(format!("database full: {}", db_err.message())),
                    _ => EngineError::Store(format!(
                        "database error [{code_str}]: {}",
                        db_err.message()
                    )),
                }
            } else {
                EngineError::Store(format!("database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => EngineError::Store("row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => EngineError::Store(format!("column not found: {col}")),
        _ => EngineError::Store(err.to_string()),
    }
}
