//! SQLite persistence for documents, vectors and the sync queue.
//!
//! One `Store` owns the connection and is shared as `Arc<Store>` between
//! the web handlers and the sync worker. Row-level atomicity comes from
//! SQLite's `INSERT ... ON CONFLICT` upserts; no cross-talent locking is
//! needed. Profile tables are owned by the external HR system and are
//! read-only here.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::profile::{Education, Experience, Profile, Skill};

/// A ranked similarity match. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub talent_id: i64,
    pub summary: String,
    pub similarity: f64,
}

/// A pending obligation to resynchronize one talent.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueueEntry {
    pub talent_id: i64,
    pub enqueued_at: i64,
}

pub struct Store {
    conn: Mutex<Connection>,
    dimensions: usize,
}

pub type StoreResult<T> = Result<T, rusqlite::Error>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS talents (
        id          INTEGER PRIMARY KEY,
        first_name  TEXT NOT NULL,
        last_name   TEXT NOT NULL,
        biography   TEXT
    );
    CREATE TABLE IF NOT EXISTS talent_skills (
        talent_id   INTEGER NOT NULL REFERENCES talents(id),
        skill       TEXT NOT NULL,
        proficiency TEXT
    );
    CREATE TABLE IF NOT EXISTS talent_experience (
        talent_id   INTEGER NOT NULL REFERENCES talents(id),
        company     TEXT,
        title       TEXT,
        years       INTEGER
    );
    CREATE TABLE IF NOT EXISTS talent_education (
        talent_id   INTEGER NOT NULL REFERENCES talents(id),
        program     TEXT,
        level       TEXT
    );
    CREATE TABLE IF NOT EXISTS talent_languages (
        talent_id   INTEGER NOT NULL REFERENCES talents(id),
        language    TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS talent_documents (
        talent_id   INTEGER PRIMARY KEY,
        summary     TEXT NOT NULL,
        metadata    TEXT
    );
    CREATE TABLE IF NOT EXISTS talent_vectors (
        talent_id   INTEGER PRIMARY KEY REFERENCES talent_documents(talent_id),
        vector      BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sync_queue (
        talent_id   INTEGER NOT NULL UNIQUE,
        enqueued_at INTEGER NOT NULL
    );
";

impl Store {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                        Some(format!("creating {}: {err}", parent.display())),
                    )
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory(dimensions: usize) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    // ------------------------------------------------------------------
    // Profiles (read-only)

    /// Assemble a profile with deterministically ordered sub-lists.
    /// The ordering feeds straight into summary synthesis, so it must
    /// never depend on insertion order.
    pub fn fetch_profile(&self, talent_id: i64) -> StoreResult<Option<Profile>> {
        let conn = self.conn();

        let base = conn
            .query_row(
                "SELECT first_name || ' ' || last_name, biography
                 FROM talents WHERE id = ?1",
                params![talent_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, biography)) = base else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT DISTINCT skill, proficiency FROM talent_skills
             WHERE talent_id = ?1 ORDER BY skill",
        )?;
        let skills = stmt
            .query_map(params![talent_id], |row| {
                Ok(Skill {
                    name: row.get(0)?,
                    proficiency: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT company, title, years FROM talent_experience
             WHERE talent_id = ?1 ORDER BY years DESC, company",
        )?;
        let experience = stmt
            .query_map(params![talent_id], |row| {
                Ok(Experience {
                    company: row.get(0)?,
                    title: row.get(1)?,
                    years: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT program, level FROM talent_education
             WHERE talent_id = ?1 ORDER BY level, program",
        )?;
        let education = stmt
            .query_map(params![talent_id], |row| {
                Ok(Education {
                    program: row.get(0)?,
                    level: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT language FROM talent_languages
             WHERE talent_id = ?1 ORDER BY language",
        )?;
        let languages = stmt
            .query_map(params![talent_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let years_of_experience: i64 = conn.query_row(
            "SELECT COALESCE(SUM(years), 0) FROM talent_experience WHERE talent_id = ?1",
            params![talent_id],
            |row| row.get(0),
        )?;

        Ok(Some(Profile {
            id: talent_id,
            name,
            biography,
            skills,
            experience,
            education,
            languages,
            years_of_experience,
        }))
    }

    /// Every talent id, ordered. Drives full resyncs.
    pub fn all_talent_ids(&self) -> StoreResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM talents ORDER BY id")?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect();
        ids
    }

    /// One page of profiles, ordered by last then first name as the
    /// listing surface expects.
    pub fn list_profiles(&self, page: u32, page_size: u32) -> StoreResult<Vec<Profile>> {
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;
        let ids: Vec<i64> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id FROM talents ORDER BY last_name, first_name LIMIT ?1 OFFSET ?2",
            )?;
            let ids = stmt
                .query_map(params![page_size as i64, offset], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let mut profiles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(profile) = self.fetch_profile(id)? {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    pub fn count_profiles(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM talents", [], |row| row.get(0))
    }

    // ------------------------------------------------------------------
    // Documents

    pub fn document_summary(&self, talent_id: i64) -> StoreResult<Option<String>> {
        self.conn()
            .query_row(
                "SELECT summary FROM talent_documents WHERE talent_id = ?1",
                params![talent_id],
                |row| row.get(0),
            )
            .optional()
    }

    /// Insert or replace the document row. Returns true when the summary
    /// actually changed (first write, or text differs) — the caller only
    /// re-embeds in that case.
    pub fn upsert_document(&self, talent_id: i64, summary: &str) -> StoreResult<bool> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO talent_documents (talent_id, summary) VALUES (?1, ?2)
             ON CONFLICT(talent_id) DO UPDATE SET summary = excluded.summary
             WHERE talent_documents.summary IS NOT excluded.summary",
            params![talent_id, summary],
        )?;
        Ok(conn.changes() > 0)
    }

    // ------------------------------------------------------------------
    // Vectors

    pub fn upsert_vector(&self, talent_id: i64, vector: &[f32]) -> StoreResult<()> {
        if vector.len() != self.dimensions {
            return Err(rusqlite::Error::ToSqlConversionFailure(
                format!(
                    "expected {}-dimensional vector, got {}",
                    self.dimensions,
                    vector.len()
                )
                .into(),
            ));
        }
        self.conn().execute(
            "INSERT INTO talent_vectors (talent_id, vector) VALUES (?1, ?2)
             ON CONFLICT(talent_id) DO UPDATE SET vector = excluded.vector",
            params![talent_id, vector_to_blob(vector)],
        )?;
        Ok(())
    }

    pub fn vector_count(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM talent_vectors", [], |row| row.get(0))
    }

    /// Rank stored vectors against `query` by cosine similarity.
    ///
    /// `candidates`, when given, restricts the scan before ranking, so
    /// `limit` always yields up to `limit` qualifying hits. Results are
    /// ordered by descending similarity with ascending talent_id as the
    /// tiebreak.
    pub fn query_vectors(
        &self,
        query: &[f32],
        candidates: Option<&[i64]>,
        limit: usize,
        min_similarity: f64,
    ) -> StoreResult<Vec<SearchHit>> {
        let candidate_set: Option<HashSet<i64>> =
            candidates.map(|ids| ids.iter().copied().collect());

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tv.talent_id, tv.vector, COALESCE(td.summary, '')
             FROM talent_vectors tv
             LEFT JOIN talent_documents td ON td.talent_id = tv.talent_id",
        )?;

        let mut hits: Vec<SearchHit> = Vec::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        for row in rows {
            let (talent_id, blob, summary) = row?;
            if let Some(set) = &candidate_set {
                if !set.contains(&talent_id) {
                    continue;
                }
            }
            let Some(vector) = blob_to_vector(&blob, self.dimensions) else {
                log::error!("talent {talent_id}: stored vector has wrong size, skipping");
                continue;
            };
            let similarity = cosine_similarity(query, &vector);
            if similarity >= min_similarity {
                hits.push(SearchHit {
                    talent_id,
                    summary,
                    similarity,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.talent_id.cmp(&b.talent_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    // ------------------------------------------------------------------
    // Sync queue

    /// Record a pending resync marker. Idempotent while an entry for the
    /// same talent is already queued.
    pub fn enqueue(&self, talent_id: i64) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO sync_queue (talent_id, enqueued_at) VALUES (?1, ?2)
             ON CONFLICT(talent_id) DO NOTHING",
            params![talent_id, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn pending(&self, limit: usize) -> StoreResult<Vec<SyncQueueEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT talent_id, enqueued_at FROM sync_queue
             ORDER BY enqueued_at, talent_id LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncQueueEntry {
                    talent_id: row.get(0)?,
                    enqueued_at: row.get(1)?,
                })
            })?
            .collect();
        entries
    }

    /// Delete exactly the given entries; siblings stay queued.
    pub fn remove_queued(&self, talent_ids: &[i64]) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM sync_queue WHERE talent_id = ?1")?;
            for id in talent_ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()
    }

    pub fn queue_len(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))
    }

    // ------------------------------------------------------------------
    // Test fixtures

    /// Insert a profile into the external tables. The running system
    /// never writes these; tests need a way to seed them.
    #[cfg(test)]
    pub fn seed_profile(&self, profile: &Profile) -> StoreResult<()> {
        let (first, last) = profile.name.split_once(' ').unwrap_or((&profile.name, ""));
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO talents (id, first_name, last_name, biography)
             VALUES (?1, ?2, ?3, ?4)",
            params![profile.id, first, last, profile.biography],
        )?;
        conn.execute(
            "DELETE FROM talent_skills WHERE talent_id = ?1",
            params![profile.id],
        )?;
        conn.execute(
            "DELETE FROM talent_experience WHERE talent_id = ?1",
            params![profile.id],
        )?;
        conn.execute(
            "DELETE FROM talent_education WHERE talent_id = ?1",
            params![profile.id],
        )?;
        conn.execute(
            "DELETE FROM talent_languages WHERE talent_id = ?1",
            params![profile.id],
        )?;
        for skill in &profile.skills {
            conn.execute(
                "INSERT INTO talent_skills (talent_id, skill, proficiency) VALUES (?1, ?2, ?3)",
                params![profile.id, skill.name, skill.proficiency],
            )?;
        }
        for exp in &profile.experience {
            conn.execute(
                "INSERT INTO talent_experience (talent_id, company, title, years)
                 VALUES (?1, ?2, ?3, ?4)",
                params![profile.id, exp.company, exp.title, exp.years],
            )?;
        }
        for edu in &profile.education {
            conn.execute(
                "INSERT INTO talent_education (talent_id, program, level) VALUES (?1, ?2, ?3)",
                params![profile.id, edu.program, edu.level],
            )?;
        }
        for language in &profile.languages {
            conn.execute(
                "INSERT INTO talent_languages (talent_id, language) VALUES (?1, ?2)",
                params![profile.id, language],
            )?;
        }
        Ok(())
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8], dimensions: usize) -> Option<Vec<f32>> {
    if blob.len() != dimensions * 4 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect(),
    )
}

/// Cosine similarity at double precision. Zero-norm input scores 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
