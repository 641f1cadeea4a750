// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LanceDB-backed memory store.
//!
//! One logical table `memories` with an ANN index on the vector column and a
//! full-text index over the combined text of `content`, `summary`,
//! `headline`, and `tags` (maintained in a derived `search_text` column so
//! the lexical index covers all four fields). `tags` and `metadata` are
//! persisted as JSON-encoded strings so the engine treats them as opaque
//! scalars; reads fall back to empty list / empty map on malformed cells.
//!
//! All mutations are funnelled through the FIFO write queue. Updates and
//! access bumps are delete-then-insert with an in-memory rollback image; a
//! process crash between delete and re-insert loses the row (documented
//! limitation).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, Float32Array, Float64Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use futures::TryStreamExt;
use lancedb::index::scalar::{FtsIndexBuilder, FullTextSearchQuery};
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use tracing::{debug, warn};

use memoir_core::{now_ms, MemoirError, MemoryCategory, MemoryScope};

use crate::predicate::PredicateBuilder;
use crate::types::{
    metadata_from_json, metadata_to_json, tags_from_json, tags_to_json, ListFilter, Memory,
    MemoryDelta, MemoryStats, OrderBy, OrderDir,
};
use crate::writer::WriteQueue;

const TABLE_NAME: &str = "memories";

/// Engine-provided result columns.
const DISTANCE_COL: &str = "_distance";
const SCORE_COL: &str = "_score";

/// Vector recall over-fetches to compensate for post-filtering.
const OVERFETCH_FACTOR: usize = 3;

/// Scalar projection used by `list` (vectors excluded).
const SCALAR_COLUMNS: [&str; 13] = [
    "id",
    "headline",
    "summary",
    "content",
    "category",
    "scope",
    "importance",
    "tags",
    "metadata",
    "created_at",
    "updated_at",
    "last_accessed_at",
    "access_count",
];

/// Persistent store for memories. One handle per (path, dimensionality).
pub struct MemoryStore {
    table: Table,
    dimensions: usize,
    writes: WriteQueue,
    fts_ready: AtomicBool,
}

impl MemoryStore {
    /// Opens (or creates) the store at `db_path` with a fixed vector
    /// dimensionality.
    ///
    /// Re-opening an existing table with a different dimensionality fails
    /// with `InvalidArgument` instead of deferring to the engine's write
    /// rejection.
    pub async fn open(db_path: impl AsRef<Path>, dimensions: usize) -> Result<Self, MemoirError> {
        if dimensions == 0 {
            return Err(MemoirError::InvalidArgument(
                "embedding dimensionality must be greater than zero".to_string(),
            ));
        }

        let db_path = db_path.as_ref();
        tokio::fs::create_dir_all(db_path).await.map_err(|e| {
            MemoirError::store_with(
                format!("failed to create store directory {}", db_path.display()),
                e,
            )
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| MemoirError::store_with(format!("failed to connect to {uri}"), e))?;

        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoirError::store_with("failed to list tables", e))?;

        let table = if names.iter().any(|n| n == TABLE_NAME) {
            let table = conn
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| MemoirError::store_with("failed to open memories table", e))?;
            check_dimensions(&table, dimensions).await?;
            table
        } else {
            conn.create_empty_table(TABLE_NAME, table_schema(dimensions))
                .execute()
                .await
                .map_err(|e| MemoirError::store_with("failed to create memories table", e))?
        };

        let store = Self {
            table,
            dimensions,
            writes: WriteQueue::new(),
            fts_ready: AtomicBool::new(false),
        };

        // The full-text index is only built once at least one real row
        // exists; on a fresh table this is deferred to the first insert.
        if store.count().await.unwrap_or(0) > 0 {
            store.ensure_fts_index().await;
        }

        Ok(store)
    }

    /// Configured vector dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Atomic single-row append. Returns the populated record.
    pub async fn insert(&self, memory: Memory) -> Result<Memory, MemoirError> {
        self.validate_row(&memory)?;
        let _write = self.writes.acquire().await;
        self.add_rows(std::slice::from_ref(&memory)).await?;
        self.ensure_fts_index().await;
        Ok(memory)
    }

    /// Ordered append of several rows in a single critical section.
    /// An empty slice performs no engine call and returns 0.
    pub async fn bulk_insert(&self, memories: &[Memory]) -> Result<usize, MemoirError> {
        if memories.is_empty() {
            return Ok(0);
        }
        for m in memories {
            self.validate_row(m)?;
        }
        let _write = self.writes.acquire().await;
        self.add_rows(memories).await?;
        self.ensure_fts_index().await;
        Ok(memories.len())
    }

    /// Zero-or-one lookup by id. An id failing UUID validation is an
    /// `InvalidArgument` error, not a miss.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Memory>, MemoirError> {
        let predicate = PredicateBuilder::new()
            .id(id)?
            .build()
            .expect("id clause always present");
        self.fetch_one(&predicate).await
    }

    /// Read-modify-write of a single row. Returns the post-image, or `None`
    /// for an unknown id. The caller observes this as atomic; internally it
    /// is delete-then-insert with rollback under the write queue.
    pub async fn update(
        &self,
        id: &str,
        delta: MemoryDelta,
    ) -> Result<Option<Memory>, MemoirError> {
        let predicate = PredicateBuilder::new()
            .id(id)?
            .build()
            .expect("id clause always present");
        if let Some(vector) = &delta.vector {
            self.validate_vector(vector)?;
        }

        let _write = self.writes.acquire().await;
        let Some(original) = self.fetch_one(&predicate).await? else {
            return Ok(None);
        };

        let mut updated = original.clone();
        apply_delta(&mut updated, delta);
        updated.updated_at = now_ms();

        self.replace_row(&predicate, &original, &updated).await?;
        Ok(Some(updated))
    }

    /// Best-effort access bump: increments `access_count` and stamps
    /// `last_accessed_at`. Returns false for an unknown id.
    pub async fn increment_access_count(&self, id: &str) -> Result<bool, MemoirError> {
        let predicate = PredicateBuilder::new()
            .id(id)?
            .build()
            .expect("id clause always present");

        let _write = self.writes.acquire().await;
        let Some(original) = self.fetch_one(&predicate).await? else {
            return Ok(false);
        };

        let mut updated = original.clone();
        updated.access_count += 1;
        updated.last_accessed_at = Some(now_ms());

        self.replace_row(&predicate, &original, &updated).await?;
        Ok(true)
    }

    /// Deletes one row. Returns whether a row was actually removed.
    pub async fn delete(&self, id: &str) -> Result<bool, MemoirError> {
        let predicate = PredicateBuilder::new()
            .id(id)?
            .build()
            .expect("id clause always present");
        let _write = self.writes.acquire().await;
        let existing = self.count_where(Some(&predicate)).await?;
        if existing == 0 {
            return Ok(false);
        }
        self.delete_where(&predicate).await?;
        Ok(true)
    }

    /// Deletes several rows; returns the count actually removed.
    /// An empty id list performs no engine call.
    pub async fn delete_many(&self, ids: &[String]) -> Result<usize, MemoirError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(predicate) = PredicateBuilder::new().ids(ids)?.build() else {
            return Ok(0);
        };
        let _write = self.writes.acquire().await;
        let existing = self.count_where(Some(&predicate)).await?;
        if existing > 0 {
            self.delete_where(&predicate).await?;
        }
        Ok(existing)
    }

    /// Deletes every row in a scope; returns the count removed.
    pub async fn delete_by_scope(&self, scope: &MemoryScope) -> Result<usize, MemoirError> {
        let predicate = PredicateBuilder::new()
            .scope(scope)
            .build()
            .expect("scope clause always present");
        let _write = self.writes.acquire().await;
        let existing = self.count_where(Some(&predicate)).await?;
        if existing > 0 {
            self.delete_where(&predicate).await?;
        }
        Ok(existing)
    }

    /// ANN search. Returns up to `limit` rows ordered by ascending cosine
    /// distance, each carrying its raw distance. Over-fetches 3x `limit`
    /// to compensate for scope/category post-filtering, then truncates.
    /// `min_score` filters on similarity (1 - distance).
    pub async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: Option<&MemoryScope>,
        categories: Option<&[MemoryCategory]>,
        min_score: Option<f32>,
    ) -> Result<Vec<(Memory, f32)>, MemoirError> {
        self.validate_vector(vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = PredicateBuilder::new();
        if let Some(scope) = scope {
            builder = builder.scope(scope);
        }
        if let Some(categories) = categories {
            builder = builder.categories(categories);
        }
        let predicate = builder.build();

        let mut query = self.table.query();
        if let Some(predicate) = &predicate {
            query = query.only_if(predicate.clone());
        }
        let mut stream = query
            .nearest_to(vector)
            .map_err(|e| MemoirError::store_with("failed to build vector query", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit * OVERFETCH_FACTOR)
            .execute()
            .await
            .map_err(|e| MemoirError::store_with("vector search failed", e))?;

        let mut out: Vec<(Memory, f32)> = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| MemoirError::store_with("vector search stream failed", e))?
        {
            out.extend(parse_scored_rows(&batch, DISTANCE_COL, true));
        }

        if let Some(min_score) = min_score {
            out.retain(|(_, distance)| 1.0 - *distance >= min_score);
        }
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(limit);
        Ok(out)
    }

    /// Lexical search over the full-text index. Returns up to `limit` rows
    /// with their provider-scale relevance score, descending. An empty or
    /// not-yet-indexed table yields an empty list, not an error.
    pub async fn full_text_search(
        &self,
        query_text: &str,
        limit: usize,
        scope: Option<&MemoryScope>,
        categories: Option<&[MemoryCategory]>,
    ) -> Result<Vec<(Memory, f32)>, MemoirError> {
        if query_text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = PredicateBuilder::new();
        if let Some(scope) = scope {
            builder = builder.scope(scope);
        }
        if let Some(categories) = categories {
            builder = builder.categories(categories);
        }
        let predicate = builder.build();

        let mut query = self
            .table
            .query()
            .full_text_search(FullTextSearchQuery::new(query_text.to_string()));
        if let Some(predicate) = &predicate {
            query = query.only_if(predicate.clone());
        }

        let stream = match query.limit(limit).execute().await {
            Ok(stream) => stream,
            Err(e) => {
                // Empty table or FTS warm-up: vector search still covers
                // these rows.
                debug!("full-text search unavailable: {e}");
                return Ok(Vec::new());
            }
        };

        let batches: Vec<RecordBatch> = match stream.try_collect().await {
            Ok(batches) => batches,
            Err(e) => {
                debug!("full-text search stream failed: {e}");
                return Ok(Vec::new());
            }
        };

        let mut out: Vec<(Memory, f32)> = Vec::new();
        for batch in &batches {
            out.extend(parse_scored_rows(batch, SCORE_COL, false));
        }
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(limit);
        Ok(out)
    }

    /// Administrative paging over scalar projections (vectors excluded).
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<Memory>, MemoirError> {
        let mut builder = PredicateBuilder::new();
        if let Some(scope) = &filter.scope {
            builder = builder.scope(scope);
        }
        if let Some(category) = filter.category {
            builder = builder.categories(std::slice::from_ref(&category));
        }
        let predicate = builder.build();

        let mut query = self
            .table
            .query()
            .select(Select::columns(&SCALAR_COLUMNS));
        if let Some(predicate) = &predicate {
            query = query.only_if(predicate.clone());
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| MemoirError::store_with("list query failed", e))?;

        let mut rows: Vec<Memory> = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| MemoirError::store_with("list stream failed", e))?
        {
            rows.extend(parse_rows(&batch, false));
        }

        sort_rows(&mut rows, filter.order_by, filter.order_dir);

        let rows: Vec<Memory> = rows
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(rows)
    }

    /// Aggregate counts. Projects only the needed scalar columns; vectors
    /// are never loaded.
    pub async fn get_stats(&self) -> Result<MemoryStats, MemoirError> {
        let mut stream = self
            .table
            .query()
            .select(Select::columns(&["category", "scope", "importance", "created_at"]))
            .execute()
            .await
            .map_err(|e| MemoirError::store_with("stats query failed", e))?;

        let mut parts: Vec<(MemoryCategory, String, f32, i64)> = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| MemoirError::store_with("stats stream failed", e))?
        {
            parts.extend(parse_stat_rows(&batch));
        }
        Ok(MemoryStats::from_parts(parts))
    }

    /// Total row count.
    pub async fn count(&self) -> Result<usize, MemoirError> {
        self.count_where(None).await
    }

    // --- internals ---

    fn validate_row(&self, memory: &Memory) -> Result<(), MemoirError> {
        crate::predicate::validate_id(&memory.id)?;
        let vector = memory.vector.as_ref().ok_or_else(|| {
            MemoirError::InvalidArgument("persisted rows require a vector".to_string())
        })?;
        self.validate_vector(vector)
    }

    fn validate_vector(&self, vector: &[f32]) -> Result<(), MemoirError> {
        if vector.len() != self.dimensions {
            return Err(MemoirError::InvalidArgument(format!(
                "vector dimensionality mismatch: got {}, table fixed at {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }

    async fn count_where(&self, predicate: Option<&str>) -> Result<usize, MemoirError> {
        self.table
            .count_rows(predicate.map(str::to_string))
            .await
            .map_err(|e| MemoirError::store_with("count failed", e))
    }

    async fn delete_where(&self, predicate: &str) -> Result<(), MemoirError> {
        self.table
            .delete(predicate)
            .await
            .map_err(|e| MemoirError::store_with("delete failed", e))
    }

    async fn fetch_one(&self, predicate: &str) -> Result<Option<Memory>, MemoirError> {
        let mut stream = self
            .table
            .query()
            .only_if(predicate.to_string())
            .limit(1)
            .execute()
            .await
            .map_err(|e| MemoirError::store_with("lookup query failed", e))?;

        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| MemoirError::store_with("lookup stream failed", e))?
        {
            if let Some(memory) = parse_rows(&batch, true).into_iter().next() {
                return Ok(Some(memory));
            }
        }
        Ok(None)
    }

    async fn add_rows(&self, rows: &[Memory]) -> Result<(), MemoirError> {
        let batch = build_batch(self.dimensions, rows)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new([Ok(batch)], schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| MemoirError::store_with("append failed", e))
    }

    /// Delete-then-insert with in-memory rollback. Caller must hold the
    /// write queue.
    async fn replace_row(
        &self,
        predicate: &str,
        original: &Memory,
        updated: &Memory,
    ) -> Result<(), MemoirError> {
        self.delete_where(predicate).await?;
        if let Err(insert_err) = self.add_rows(std::slice::from_ref(updated)).await {
            match self.add_rows(std::slice::from_ref(original)).await {
                Ok(()) => debug!(id = %original.id, "rolled back failed row replace"),
                Err(rollback_err) => warn!(
                    id = %original.id,
                    "rollback after failed replace also failed: {rollback_err}"
                ),
            }
            return Err(insert_err);
        }
        Ok(())
    }

    /// Builds the full-text index once at least one real row exists.
    /// Creation failures (including an already-indexed column) are
    /// swallowed: lexical search degrades to empty results and vector
    /// search still covers the rows.
    async fn ensure_fts_index(&self) {
        if self.fts_ready.load(Ordering::Acquire) {
            return;
        }
        match self
            .table
            .create_index(&["search_text"], Index::FTS(FtsIndexBuilder::default()))
            .execute()
            .await
        {
            Ok(()) => {
                self.fts_ready.store(true, Ordering::Release);
            }
            Err(e) => {
                debug!("full-text index creation skipped: {e}");
                self.fts_ready.store(true, Ordering::Release);
            }
        }
    }
}

async fn check_dimensions(table: &Table, dimensions: usize) -> Result<(), MemoirError> {
    let schema = table
        .schema()
        .await
        .map_err(|e| MemoirError::store_with("failed to read table schema", e))?;
    let field = schema.field_with_name("vector").map_err(|e| {
        MemoirError::store_with("memories table is missing its vector column", e)
    })?;
    match field.data_type() {
        DataType::FixedSizeList(_, width) if *width as usize == dimensions => Ok(()),
        DataType::FixedSizeList(_, width) => Err(MemoirError::InvalidArgument(format!(
            "store was created with dimensionality {width}, config asks for {dimensions}"
        ))),
        other => Err(MemoirError::store(format!(
            "unexpected vector column type: {other:?}"
        ))),
    }
}

fn table_schema(dimensions: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("headline", DataType::Utf8, false),
        Field::new("summary", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("scope", DataType::Utf8, false),
        Field::new("importance", DataType::Float32, false),
        Field::new("tags", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Int64, false),
        Field::new("updated_at", DataType::Int64, false),
        Field::new("last_accessed_at", DataType::Int64, true),
        Field::new("access_count", DataType::Int64, false),
        Field::new("search_text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimensions as i32,
            ),
            true,
        ),
    ]))
}

/// Combined text the lexical index covers.
fn search_text(memory: &Memory) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        memory.headline,
        memory.summary,
        memory.content,
        memory.tags.join(" ")
    )
}

fn apply_delta(memory: &mut Memory, delta: MemoryDelta) {
    if let Some(headline) = delta.headline {
        memory.headline = headline;
    }
    if let Some(summary) = delta.summary {
        memory.summary = summary;
    }
    if let Some(content) = delta.content {
        memory.content = content;
    }
    if let Some(category) = delta.category {
        memory.category = category;
    }
    if let Some(scope) = delta.scope {
        memory.scope = scope;
    }
    if let Some(importance) = delta.importance {
        memory.importance = importance.clamp(0.0, 1.0);
    }
    if let Some(tags) = delta.tags {
        memory.tags = tags;
    }
    if let Some(metadata) = delta.metadata {
        memory.metadata = metadata;
    }
    if let Some(vector) = delta.vector {
        memory.vector = Some(vector);
    }
}

fn build_batch(dimensions: usize, rows: &[Memory]) -> Result<RecordBatch, MemoirError> {
    let ids = StringArray::from(rows.iter().map(|m| m.id.as_str()).collect::<Vec<_>>());
    let headlines =
        StringArray::from(rows.iter().map(|m| m.headline.as_str()).collect::<Vec<_>>());
    let summaries =
        StringArray::from(rows.iter().map(|m| m.summary.as_str()).collect::<Vec<_>>());
    let contents =
        StringArray::from(rows.iter().map(|m| m.content.as_str()).collect::<Vec<_>>());
    let categories = StringArray::from(
        rows.iter()
            .map(|m| m.category.to_string())
            .collect::<Vec<_>>(),
    );
    let scopes = StringArray::from(
        rows.iter()
            .map(|m| m.scope.to_string())
            .collect::<Vec<_>>(),
    );
    let importances = Float32Array::from(rows.iter().map(|m| m.importance).collect::<Vec<_>>());
    let tags = StringArray::from(
        rows.iter()
            .map(|m| tags_to_json(&m.tags))
            .collect::<Vec<_>>(),
    );
    let metadata = StringArray::from(
        rows.iter()
            .map(|m| metadata_to_json(&m.metadata))
            .collect::<Vec<_>>(),
    );
    let created = Int64Array::from(rows.iter().map(|m| m.created_at).collect::<Vec<_>>());
    let updated = Int64Array::from(rows.iter().map(|m| m.updated_at).collect::<Vec<_>>());
    let accessed = Int64Array::from(
        rows.iter()
            .map(|m| m.last_accessed_at)
            .collect::<Vec<Option<i64>>>(),
    );
    let access_counts = Int64Array::from(
        rows.iter()
            .map(|m| m.access_count as i64)
            .collect::<Vec<_>>(),
    );
    let search = StringArray::from(rows.iter().map(search_text).collect::<Vec<_>>());

    let mut vectors = FixedSizeListBuilder::new(Float32Builder::new(), dimensions as i32);
    for row in rows {
        let vector = row.vector.as_ref().ok_or_else(|| {
            MemoirError::InvalidArgument("persisted rows require a vector".to_string())
        })?;
        vectors.values().append_slice(vector);
        vectors.append(true);
    }
    let vectors = vectors.finish();

    RecordBatch::try_new(
        table_schema(dimensions),
        vec![
            Arc::new(ids),
            Arc::new(headlines),
            Arc::new(summaries),
            Arc::new(contents),
            Arc::new(categories),
            Arc::new(scopes),
            Arc::new(importances),
            Arc::new(tags),
            Arc::new(metadata),
            Arc::new(created),
            Arc::new(updated),
            Arc::new(accessed),
            Arc::new(access_counts),
            Arc::new(search),
            Arc::new(vectors),
        ],
    )
    .map_err(|e| MemoirError::store_with("failed to build record batch", e))
}

fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn f32_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
}

fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
}

/// Parses full memory rows. Rows with corrupt category or scope cells are
/// skipped with a warning rather than failing the whole read.
fn parse_rows(batch: &RecordBatch, with_vector: bool) -> Vec<Memory> {
    parse_rows_indexed(batch, with_vector)
        .into_iter()
        .map(|(_, memory)| memory)
        .collect()
}

/// As `parse_rows`, keeping each memory's batch row index so callers can
/// pair rows with engine-provided score columns even when rows are skipped.
fn parse_rows_indexed(batch: &RecordBatch, with_vector: bool) -> Vec<(usize, Memory)> {
    let (Some(ids), Some(headlines), Some(summaries), Some(contents)) = (
        str_col(batch, "id"),
        str_col(batch, "headline"),
        str_col(batch, "summary"),
        str_col(batch, "content"),
    ) else {
        return Vec::new();
    };
    let (Some(categories), Some(scopes), Some(importances)) = (
        str_col(batch, "category"),
        str_col(batch, "scope"),
        f32_col(batch, "importance"),
    ) else {
        return Vec::new();
    };
    let (Some(tags), Some(metadata)) = (str_col(batch, "tags"), str_col(batch, "metadata"))
    else {
        return Vec::new();
    };
    let (Some(created), Some(updated), Some(accessed), Some(access_counts)) = (
        i64_col(batch, "created_at"),
        i64_col(batch, "updated_at"),
        i64_col(batch, "last_accessed_at"),
        i64_col(batch, "access_count"),
    ) else {
        return Vec::new();
    };

    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<arrow_array::FixedSizeListArray>());

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if ids.is_null(i) {
            continue;
        }
        let category: MemoryCategory = match categories.value(i).parse() {
            Ok(c) => c,
            Err(_) => {
                warn!(id = %ids.value(i), "skipping row with unknown category");
                continue;
            }
        };
        let scope = match MemoryScope::parse(scopes.value(i)) {
            Ok(s) => s,
            Err(_) => {
                warn!(id = %ids.value(i), "skipping row with malformed scope");
                continue;
            }
        };
        let vector = if with_vector {
            vectors.and_then(|col| {
                if col.is_null(i) {
                    return None;
                }
                let values = col.value(i);
                values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|v| v.iter().map(|x| x.unwrap_or(0.0)).collect::<Vec<f32>>())
            })
        } else {
            None
        };

        out.push((
            i,
            Memory {
                id: ids.value(i).to_string(),
                headline: headlines.value(i).to_string(),
                summary: summaries.value(i).to_string(),
                content: contents.value(i).to_string(),
                category,
                scope,
                importance: importances.value(i),
                tags: tags_from_json(tags.value(i)),
                metadata: metadata_from_json(metadata.value(i)),
                created_at: created.value(i),
                updated_at: updated.value(i),
                last_accessed_at: if accessed.is_null(i) {
                    None
                } else {
                    Some(accessed.value(i))
                },
                access_count: access_counts.value(i).max(0) as u64,
                vector,
            },
        ));
    }
    out
}

/// Parses rows paired with an engine-provided score column (`_distance`
/// or `_score`, f32 or f64 depending on the provider).
fn parse_scored_rows(
    batch: &RecordBatch,
    score_col: &str,
    with_vector: bool,
) -> Vec<(Memory, f32)> {
    let scores_f32 = f32_col(batch, score_col);
    let scores_f64 = batch
        .column_by_name(score_col)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>());

    parse_rows_indexed(batch, with_vector)
        .into_iter()
        .map(|(i, memory)| {
            let score = if let Some(col) = scores_f32 {
                col.value(i)
            } else if let Some(col) = scores_f64 {
                col.value(i) as f32
            } else {
                0.0
            };
            (memory, score)
        })
        .collect()
}

fn parse_stat_rows(batch: &RecordBatch) -> Vec<(MemoryCategory, String, f32, i64)> {
    let (Some(categories), Some(scopes), Some(importances), Some(created)) = (
        str_col(batch, "category"),
        str_col(batch, "scope"),
        f32_col(batch, "importance"),
        i64_col(batch, "created_at"),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let Ok(category) = categories.value(i).parse::<MemoryCategory>() else {
            continue;
        };
        out.push((
            category,
            scopes.value(i).to_string(),
            importances.value(i),
            created.value(i),
        ));
    }
    out
}

fn sort_rows(rows: &mut [Memory], order_by: OrderBy, order_dir: OrderDir) {
    rows.sort_by(|a, b| {
        let ordering = match order_by {
            OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            OrderBy::Importance => a
                .importance
                .partial_cmp(&b.importance)
                .unwrap_or(std::cmp::Ordering::Equal),
            OrderBy::AccessCount => a.access_count.cmp(&b.access_count),
        };
        match order_dir {
            OrderDir::Asc => ordering,
            OrderDir::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    const DIMS: usize = 4;

    async fn open_store(dir: &TempDir) -> MemoryStore {
        MemoryStore::open(dir.path(), DIMS).await.unwrap()
    }

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        v[axis] = 1.0;
        v
    }

    fn make_memory(headline: &str, category: MemoryCategory, vector: Vec<f32>) -> Memory {
        let now = now_ms();
        Memory {
            id: uuid::Uuid::new_v4().to_string(),
            headline: headline.to_string(),
            summary: format!("{headline} (summary)"),
            content: format!("{headline} (full narrative)"),
            category,
            scope: MemoryScope::Global,
            importance: 0.5,
            tags: vec!["test".to_string()],
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            vector: Some(vector),
        }
    }

    #[tokio::test]
    async fn open_fresh_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert_eq!(store.count().await.unwrap(), 0);
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.oldest_created_at.is_none());
    }

    #[tokio::test]
    async fn reopen_with_other_dimensionality_fails_fast() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir).await;
            store
                .insert(make_memory("seed", MemoryCategory::Profile, unit(0)))
                .await
                .unwrap();
        }
        let err = MemoryStore::open(dir.path(), DIMS + 1).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn insert_and_get_by_id_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut memory = make_memory("User has a dog named Max", MemoryCategory::Entities, unit(0));
        memory.tags = vec!["pets".to_string(), "dog".to_string()];
        memory
            .metadata
            .insert("origin".to_string(), json!("unit-test"));
        let inserted = store.insert(memory.clone()).await.unwrap();

        let fetched = store.get_by_id(&inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.headline, memory.headline);
        assert_eq!(fetched.category, MemoryCategory::Entities);
        assert_eq!(fetched.tags, vec!["pets", "dog"]);
        assert_eq!(fetched.metadata.get("origin").unwrap(), "unit-test");
        assert_eq!(fetched.access_count, 0);
        assert!(fetched.last_accessed_at.is_none());
        assert_eq!(fetched.vector.unwrap().len(), DIMS);
    }

    #[tokio::test]
    async fn get_by_id_unknown_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let missing = store
            .get_by_id("00000000-0000-0000-0000-000000000000")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn get_by_id_rejects_malformed_id_before_engine() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .insert(make_memory("seed", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();

        let err = store
            .get_by_id("'; DROP TABLE memories; --")
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        // The table is intact.
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimensionality() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let memory = make_memory("bad", MemoryCategory::Profile, vec![0.0; DIMS + 2]);
        let err = store.insert(memory).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn vector_search_orders_by_distance_and_filters() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let near = store
            .insert(make_memory("near", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();
        store
            .insert(make_memory("far", MemoryCategory::Profile, unit(1)))
            .await
            .unwrap();
        let other_cat = store
            .insert(make_memory("other", MemoryCategory::Cases, unit(0)))
            .await
            .unwrap();

        let results = store
            .vector_search(&unit(0), 10, None, None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        // near and other are equidistant at 0; both precede far
        let first = &results[0].0.id;
        assert!(first == &near.id || first == &other_cat.id);
        assert!(results[0].1 < results[2].1);

        let profiles_only = store
            .vector_search(&unit(0), 10, None, Some(&[MemoryCategory::Profile]), None)
            .await
            .unwrap();
        assert_eq!(profiles_only.len(), 2);
        assert!(profiles_only.iter().all(|(m, _)| m.category == MemoryCategory::Profile));
    }

    #[tokio::test]
    async fn vector_search_min_score_one_keeps_only_exact() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .insert(make_memory("exact", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();
        store
            .insert(make_memory("orthogonal", MemoryCategory::Profile, unit(1)))
            .await
            .unwrap();

        let results = store
            .vector_search(&unit(0), 10, None, None, Some(1.0))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.headline, "exact");
        assert!(results[0].1.abs() < 1e-5);
    }

    #[tokio::test]
    async fn vector_search_scope_filter() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut scoped = make_memory("scoped", MemoryCategory::Profile, unit(0));
        scoped.scope = MemoryScope::parse("agent:a1").unwrap();
        store.insert(scoped).await.unwrap();
        store
            .insert(make_memory("global", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();

        let scope = MemoryScope::parse("agent:a1").unwrap();
        let results = store
            .vector_search(&unit(0), 10, Some(&scope), None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.headline, "scoped");
    }

    #[tokio::test]
    async fn full_text_search_empty_table_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let results = store
            .full_text_search("anything", 10, None, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn full_text_search_finds_inserted_text() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .insert(make_memory(
                "The user has a golden retriever",
                MemoryCategory::Entities,
                unit(0),
            ))
            .await
            .unwrap();
        store
            .insert(make_memory("Likes pizza", MemoryCategory::Preferences, unit(1)))
            .await
            .unwrap();

        let results = store
            .full_text_search("golden retriever", 10, None, None)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0.headline, "The user has a golden retriever");
    }

    #[tokio::test]
    async fn update_applies_delta_and_bumps_updated_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let inserted = store
            .insert(make_memory("original", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();

        let updated = store
            .update(
                &inserted.id,
                MemoryDelta {
                    headline: Some("edited".to_string()),
                    importance: Some(0.9),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.headline, "edited");
        assert!((updated.importance - 0.9).abs() < f32::EPSILON);
        assert!(updated.updated_at >= inserted.updated_at);
        assert_eq!(updated.created_at, inserted.created_at);

        // Exactly one row with that id exists after the update.
        let fetched = store.get_by_id(&inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.headline, "edited");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_unknown_id_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let result = store
            .update(
                "00000000-0000-0000-0000-000000000000",
                MemoryDelta {
                    headline: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn increment_access_count_bumps_and_stamps() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let inserted = store
            .insert(make_memory("hit me", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();

        assert!(store.increment_access_count(&inserted.id).await.unwrap());
        assert!(store.increment_access_count(&inserted.id).await.unwrap());
        let fetched = store.get_by_id(&inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 2);
        assert!(fetched.last_accessed_at.unwrap() >= fetched.created_at);

        assert!(!store
            .increment_access_count("00000000-0000-0000-0000-000000000000")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_and_delete_many() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let a = store
            .insert(make_memory("a", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();
        let b = store
            .insert(make_memory("b", MemoryCategory::Profile, unit(1)))
            .await
            .unwrap();
        store
            .insert(make_memory("c", MemoryCategory::Profile, unit(2)))
            .await
            .unwrap();

        assert!(store.delete(&a.id).await.unwrap());
        assert!(!store.delete(&a.id).await.unwrap());

        assert_eq!(store.delete_many(&[]).await.unwrap(), 0);
        let removed = store
            .delete_many(&[b.id.clone(), "00000000-0000-0000-0000-000000000000".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_scope_counts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let scope = MemoryScope::parse("project:p1").unwrap();
        for i in 0..3 {
            let mut m = make_memory(&format!("m{i}"), MemoryCategory::Events, unit(i % DIMS));
            m.scope = scope.clone();
            store.insert(m).await.unwrap();
        }
        store
            .insert(make_memory("keep", MemoryCategory::Events, unit(0)))
            .await
            .unwrap();

        assert_eq!(store.delete_by_scope(&scope).await.unwrap(), 3);
        assert_eq!(store.delete_by_scope(&scope).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bulk_insert_is_ordered_and_counted() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let rows: Vec<Memory> = (0..5)
            .map(|i| make_memory(&format!("bulk {i}"), MemoryCategory::Cases, unit(i % DIMS)))
            .collect();
        assert_eq!(store.bulk_insert(&rows).await.unwrap(), 5);
        assert_eq!(store.bulk_insert(&[]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn list_orders_and_pages() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        for (i, importance) in [0.2_f32, 0.9, 0.5].iter().enumerate() {
            let mut m = make_memory(&format!("m{i}"), MemoryCategory::Profile, unit(i));
            m.importance = *importance;
            m.created_at = 1_000 + i as i64;
            m.updated_at = m.created_at;
            store.insert(m).await.unwrap();
        }

        let by_importance = store
            .list(&ListFilter {
                order_by: OrderBy::Importance,
                order_dir: OrderDir::Desc,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_importance[0].headline, "m1");
        // List projections never carry vectors.
        assert!(by_importance.iter().all(|m| m.vector.is_none()));

        let paged = store
            .list(&ListFilter {
                order_by: OrderBy::CreatedAt,
                order_dir: OrderDir::Asc,
                limit: Some(1),
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].headline, "m1");
    }

    #[tokio::test]
    async fn stats_buckets_by_category_and_scope() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let mut a = make_memory("a", MemoryCategory::Profile, unit(0));
        a.importance = 0.4;
        let mut b = make_memory("b", MemoryCategory::Cases, unit(1));
        b.importance = 0.8;
        b.scope = MemoryScope::parse("agent:x").unwrap();
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category[&MemoryCategory::Profile], 1);
        assert_eq!(stats.by_category[&MemoryCategory::Cases], 1);
        assert_eq!(stats.by_category[&MemoryCategory::Patterns], 0);
        assert_eq!(stats.by_scope["global"], 1);
        assert_eq!(stats.by_scope["agent:x"], 1);
        assert!((stats.avg_importance - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn concurrent_updates_and_bumps_quiesce_to_one_row() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir).await);
        let inserted = store
            .insert(make_memory("contended", MemoryCategory::Profile, unit(0)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let id = inserted.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(
                        &id,
                        MemoryDelta {
                            headline: Some(format!("edit {i}")),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
            }));
        }
        for _ in 0..10 {
            let store = store.clone();
            let id = inserted.id.clone();
            handles.push(tokio::spawn(async move {
                assert!(store.increment_access_count(&id).await.unwrap());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Exactly one row with that id at quiescence; every bump counted.
        let predicate = format!("id = '{}'", inserted.id);
        assert_eq!(store.count_where(Some(&predicate)).await.unwrap(), 1);
        let row = store.get_by_id(&inserted.id).await.unwrap().unwrap();
        assert_eq!(row.access_count, 10);
        assert!(row.headline.starts_with("edit "));
    }

    #[tokio::test]
    async fn concurrent_inserts_are_serialized_without_loss() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir).await);

        let mut handles = Vec::new();
        for i in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(make_memory(
                        &format!("concurrent {i}"),
                        MemoryCategory::Cases,
                        unit(i % DIMS),
                    ))
                    .await
                    .unwrap()
            }));
        }
        let mut ids = std::collections::HashSet::new();
        for h in handles {
            let inserted = h.await.unwrap();
            ids.insert(inserted.id);
        }
        assert_eq!(ids.len(), 100);
        assert_eq!(store.count().await.unwrap(), 100);
    }
}
