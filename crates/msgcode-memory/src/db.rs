use rusqlite::Connection;

/// Create the hybrid-recall schema. Safe to call on every open (idempotent).
/// Returns whether the vector extension loaded successfully — callers use
/// this to set `vectorAvailable` on the owning [`crate::manager::MemoryStore`].
pub fn init_db(conn: &Connection) -> rusqlite::Result<bool> {
    create_chunks_table(conn)?;
    create_fts_index(conn)?;
    create_embed_cache_table(conn)?;
    let vector_available = try_create_vector_table(conn);
    Ok(vector_available)
}

fn create_chunks_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            text        TEXT NOT NULL,
            text_digest TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL
        );",
    )
}

/// FTS5 virtual table over chunk text, synced manually on write
/// (`content=''` means it is not auto-maintained by SQLite).
fn create_fts_index(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts
            USING fts5(text, content='chunks', content_rowid='id');",
    )
}

fn create_embed_cache_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS embed_cache (
            text_digest TEXT NOT NULL,
            model       TEXT NOT NULL,
            embedding   BLOB NOT NULL,
            PRIMARY KEY (text_digest, model)
        );",
    )
}

/// Register the `sqlite-vec` loadable extension process-wide (idempotent —
/// `sqlite3_auto_extension` de-dupes repeat registrations) and create
/// `chunks_vec`. Failure is not fatal — it just means this workspace's
/// memory store degrades to FTS-only search, reporting
/// `vectorAvailable=false` to callers.
fn try_create_vector_table(conn: &Connection) -> bool {
    unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    }

    let created = conn
        .execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_vec USING vec0(
                embedding float[1536]
            );",
        )
        .is_ok();
    if !created {
        tracing::warn!("chunks_vec virtual table creation failed, degrading to FTS-only");
    }
    created
}
