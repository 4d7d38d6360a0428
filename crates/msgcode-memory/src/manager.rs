use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use msgcode_core::error::{Result, RuntimeError};

use crate::types::{Chunk, FusionWeights, SearchHit, SearchReason};

const CHUNK_CHAR_SIZE: usize = 800;
const EMBEDDING_DIMENSIONS: usize = 1536;

/// Per-workspace hybrid-recall memory store. SQLite under
/// `<ws>/.msgcode/memory/memory.db`. If the file's directory doesn't
/// exist or open fails outright, callers should treat the store as absent
/// and degrade to empty results rather than propagate the error up to the
/// main reply — memory lookups must never block a reply.
pub struct MemoryStore {
    db: Mutex<Connection>,
    vector_available: bool,
    embed_base_url: String,
    embed_model: String,
    http: reqwest::Client,
}

impl MemoryStore {
    pub fn open(workspace_path: &Path, embed_base_url: String, embed_model: String) -> Result<Self> {
        let dir = workspace_path.join(".msgcode").join("memory");
        std::fs::create_dir_all(&dir)?;
        let conn = Connection::open(dir.join("memory.db"))
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let vector_available =
            crate::db::init_db(&conn).map_err(|e| RuntimeError::Database(e.to_string()))?;
        if !vector_available {
            warn!(workspace = %workspace_path.display(), "vector search unavailable for this workspace, using FTS-only");
        }
        Ok(Self {
            db: Mutex::new(conn),
            vector_available,
            embed_base_url,
            embed_model,
            http: reqwest::Client::new(),
        })
    }

    pub fn vector_available(&self) -> bool {
        self.vector_available
    }

    /// Split `text` into fixed-size chunks, embed and persist each one.
    /// Writes to `chunks`/`chunks_fts` and, if available, `chunks_vec`
    /// happen inside the same SQLite transaction so a crash never leaves
    /// the FTS and vector indexes disagreeing about what chunks exist.
    pub async fn ingest(&self, text: &str) -> Result<usize> {
        let chunks = split_into_chunks(text, CHUNK_CHAR_SIZE);
        let mut written = 0;
        for chunk_text in chunks {
            let digest = digest_of(&chunk_text);
            let embedding = if self.vector_available {
                match self.embed_cached(&chunk_text, &digest).await {
                    Ok(vec) => Some(vec),
                    Err(e) => {
                        warn!(error = %e, "embedding request failed, storing chunk as text-only");
                        None
                    }
                }
            } else {
                None
            };
            self.write_chunk(&chunk_text, &digest, embedding.as_deref())?;
            written += 1;
        }
        Ok(written)
    }

    fn write_chunk(&self, text: &str, digest: &str, embedding: Option<&[f32]>) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction().map_err(|e| RuntimeError::Database(e.to_string()))?;
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT OR IGNORE INTO chunks (text, text_digest, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![text, digest, now],
        )
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let id: i64 = tx
            .query_row(
                "SELECT id FROM chunks WHERE text_digest = ?1",
                rusqlite::params![digest],
                |row| row.get(0),
            )
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        tx.execute(
            "INSERT INTO chunks_fts(rowid, text) VALUES (?1, ?2)",
            rusqlite::params![id, text],
        )
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
        if let Some(embedding) = embedding {
            let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
            tx.execute(
                "INSERT OR REPLACE INTO chunks_vec(rowid, embedding) VALUES (?1, ?2)",
                rusqlite::params![id, blob],
            )
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        }
        tx.commit().map_err(|e| RuntimeError::Database(e.to_string()))?;
        Ok(())
    }

    /// Hybrid search: vector kNN (if available) fused with FTS5 `MATCH`,
    /// weighted sum by default. Never errors out to the caller — any
    /// internal failure degrades to an empty result set.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        match self.search_inner(query, top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "memory search failed, returning empty");
                Vec::new()
            }
        }
    }

    async fn search_inner(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let text_hits = self.search_fts(query, top_k)?;
        if !self.vector_available {
            return Ok(text_hits
                .into_iter()
                .map(|(text, score)| SearchHit {
                    text,
                    score,
                    reasons: vec![SearchReason::Text],
                })
                .collect());
        }

        let digest = digest_of(query);
        let query_embedding = self.embed_cached(query, &digest).await?;
        let vector_hits = self.search_vector(&query_embedding, top_k)?;

        Ok(fuse(vector_hits, text_hits, FusionWeights::default(), top_k))
    }

    fn search_fts(&self, query: &str, top_k: usize) -> Result<Vec<(String, f64)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT text, bm25(chunks_fts) FROM chunks_fts WHERE chunks_fts MATCH ?1
                 ORDER BY bm25(chunks_fts) LIMIT ?2",
            )
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![query, top_k as i64], |row| {
                let text: String = row.get(0)?;
                let raw_score: f64 = row.get(1)?;
                Ok((text, -raw_score))
            })
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn search_vector(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<(String, f64)>> {
        let db = self.db.lock().unwrap();
        let blob: Vec<u8> = query_embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let mut stmt = db
            .prepare(
                "SELECT c.text, v.distance FROM chunks_vec v
                 JOIN chunks c ON c.id = v.rowid
                 WHERE v.embedding MATCH ?1 AND k = ?2
                 ORDER BY v.distance",
            )
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![blob, top_k as i64], |row| {
                let text: String = row.get(0)?;
                let distance: f64 = row.get(1)?;
                Ok((text, 1.0 / (1.0 + distance)))
            })
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn embed_cached(&self, text: &str, digest: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.lookup_embed_cache(digest)? {
            return Ok(cached);
        }
        let embedding = self.request_embedding(text).await?;
        self.store_embed_cache(digest, &embedding)?;
        Ok(embedding)
    }

    fn lookup_embed_cache(&self, digest: &str) -> Result<Option<Vec<f32>>> {
        let db = self.db.lock().unwrap();
        let blob: Option<Vec<u8>> = db
            .query_row(
                "SELECT embedding FROM embed_cache WHERE text_digest = ?1 AND model = ?2",
                rusqlite::params![digest, self.embed_model],
                |row| row.get(0),
            )
            .ok();
        Ok(blob.map(|b| bytes_to_f32_vec(&b)))
    }

    fn store_embed_cache(&self, digest: &str, embedding: &[f32]) -> Result<()> {
        let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO embed_cache (text_digest, model, embedding) VALUES (?1, ?2, ?3)",
            rusqlite::params![digest, self.embed_model, blob],
        )
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
        Ok(())
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(serde::Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedDatum>,
        }
        #[derive(serde::Deserialize)]
        struct EmbedDatum {
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.embed_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&EmbedRequest {
                model: &self.embed_model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| RuntimeError::ProviderError {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RuntimeError::ProviderError {
                message: format!("embedding endpoint returned {}", response.status()),
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::ProviderError {
                message: e.to_string(),
            })?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(RuntimeError::EmptyResponse)?;
        debug!(dims = embedding.len(), "embedding computed");
        Ok(embedding)
    }
}

fn digest_of(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<char>>()
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .filter(|s: &String| !s.trim().is_empty())
        .collect()
}

fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Weighted-sum fusion of vector and text candidate lists. Candidates that
/// appear in both lists get both scores summed; the result is sorted
/// descending and truncated to `top_k`.
fn fuse(
    vector_hits: Vec<(String, f64)>,
    text_hits: Vec<(String, f64)>,
    weights: FusionWeights,
    top_k: usize,
) -> Vec<SearchHit> {
    use std::collections::HashMap;
    let mut combined: HashMap<String, (f64, Vec<SearchReason>)> = HashMap::new();

    for (text, score) in vector_hits {
        let entry = combined
            .entry(text)
            .or_insert((0.0, Vec::new()));
        entry.0 += score * weights.vector;
        entry.1.push(SearchReason::Vector);
    }
    for (text, score) in text_hits {
        let entry = combined
            .entry(text)
            .or_insert((0.0, Vec::new()));
        entry.0 += score * weights.text;
        entry.1.push(SearchReason::Text);
    }

    let mut ranked: Vec<SearchHit> = combined
        .into_iter()
        .map(|(text, (score, reasons))| SearchHit {
            text,
            score,
            reasons,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_splits_on_char_boundary() {
        let text = "a".repeat(1000);
        let chunks = split_into_chunks(&text, 400);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 400);
    }

    #[test]
    fn chunking_drops_whitespace_only_chunks() {
        let chunks = split_into_chunks("   ", 400);
        assert!(chunks.is_empty());
    }

    #[test]
    fn fuse_combines_scores_for_shared_hits() {
        let vector = vec![("shared".to_string(), 1.0), ("vector-only".to_string(), 0.5)];
        let text = vec![("shared".to_string(), 1.0), ("text-only".to_string(), 0.8)];
        let hits = fuse(vector, text, FusionWeights::default(), 10);
        let shared = hits.iter().find(|h| h.text == "shared").unwrap();
        assert!((shared.score - (0.7 + 0.3)).abs() < 1e-9);
        assert_eq!(shared.reasons.len(), 2);
    }

    #[test]
    fn fuse_respects_top_k() {
        let vector = vec![
            ("a".to_string(), 0.9),
            ("b".to_string(), 0.8),
            ("c".to_string(), 0.7),
        ];
        let hits = fuse(vector, Vec::new(), FusionWeights::default(), 2);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn digest_is_stable_for_same_text() {
        assert_eq!(digest_of("hello"), digest_of("hello"));
        assert_ne!(digest_of("hello"), digest_of("world"));
    }
}
