//! SQL scalar functions registered on every connection.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::model::embedding::decode_vector;
use crate::vector;

/// Register the vector distance functions used by
/// [`scan_with_distance`](crate::store::RecordStore::scan_with_distance).
///
/// `cosine_distance(a BLOB, b BLOB) -> REAL` returns `NULL` if either
/// argument is `NULL`, and fails on blobs of different lengths.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "cosine_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: Option<Vec<u8>> = ctx.get(0)?;
            let b: Option<Vec<u8>> = ctx.get(1)?;
            let (Some(a), Some(b)) = (a, b) else {
                return Ok(None);
            };

            let a = decode_vector(&a).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            let b = decode_vector(&b).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;

            vector::cosine_distance(&a, &b).map(Some).ok_or_else(|| {
                rusqlite::Error::UserFunctionError(
                    format!("dimension mismatch: {} vs {}", a.len(), b.len()).into(),
                )
            })
        },
    )
}
