use crate::actors::messages::{AppError, SearchHit};
use crate::actors::traits::{Embedder, VectorIndex};
use crate::brain::semantic::cosine_similarity;
use crate::models::clamp_confidence;
use arrow::array::{
    Array, FixedSizeListBuilder, Float32Array, Float32Builder, RecordBatch, RecordBatchIterator,
    StringArray, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

const FAQ_TABLE: &str = "faq_qa";

/// One question/answer pair of the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub faq_id: String,
    #[serde(default)]
    pub category: Option<String>,
    pub question: String,
    pub answer: String,
}

impl FaqEntry {
    fn hit(&self, score: f32) -> SearchHit {
        SearchHit {
            candidate_id: self.faq_id.clone(),
            score: clamp_confidence(score),
            question: self.question.clone(),
            answer: self.answer.clone(),
            category: self.category.clone(),
        }
    }
}

async fn embed_questions(entries: &[FaqEntry], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>, AppError> {
    let mut vectors = Vec::with_capacity(entries.len());
    for entry in entries {
        vectors.push(embedder.embed(entry.question.clone()).await?);
    }
    Ok(vectors)
}

// --- In-memory index ---

/// Brute-force cosine index. Used when no vector store is reachable and in tests.
#[derive(Default)]
pub struct InMemoryFaqIndex {
    rows: RwLock<Vec<(FaqEntry, Vec<f32>)>>,
}

impl InMemoryFaqIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: FaqEntry, vector: Vec<f32>) {
        match self.rows.write() {
            Ok(mut rows) => rows.push((entry, vector)),
            Err(poisoned) => poisoned.into_inner().push((entry, vector)),
        }
    }

    /// Embeds each question and stores the pair. Returns the number of rows added.
    pub async fn ingest(&self, entries: &[FaqEntry], embedder: &dyn Embedder) -> Result<usize, AppError> {
        let vectors = embed_questions(entries, embedder).await?;
        for (entry, vector) in entries.iter().cloned().zip(vectors) {
            self.insert(entry, vector);
        }
        Ok(entries.len())
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryFaqIndex {
    async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<SearchHit>, AppError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| AppError::Internal("FAQ index lock poisoned".to_string()))?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|(entry, emb)| entry.hit(cosine_similarity(&vector, emb)))
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

// --- LanceDB index ---

/// FAQ table stored in LanceDB, searched by cosine distance.
pub struct LanceFaqIndex {
    connection: Connection,
    table_name: String,
}

impl LanceFaqIndex {
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| AppError::Config(format!("Vector store path is not valid UTF-8: {:?}", path)))?;
        let connection = connect(path_str).execute().await?;
        info!("Connected to LanceDB at {:?}", path);
        Ok(Self {
            connection,
            table_name: FAQ_TABLE.to_string(),
        })
    }

    async fn table_exists(&self) -> Result<bool, AppError> {
        Ok(self
            .connection
            .table_names()
            .execute()
            .await?
            .contains(&self.table_name))
    }

    /// Embeds each question and appends the rows, creating the table on first use.
    pub async fn ingest(&self, entries: &[FaqEntry], embedder: &dyn Embedder) -> Result<usize, AppError> {
        if entries.is_empty() {
            warn!("FAQ ingestion skipped: no entries");
            return Ok(0);
        }

        let vectors = embed_questions(entries, embedder).await?;
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            return Err(AppError::Validation("Embeddings have inconsistent dimensions".to_string()));
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new("faq_id", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, true),
            Field::new("question", DataType::Utf8, false),
            Field::new("answer", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
                true,
            ),
        ]));

        let total = entries.len();
        let mut id_builder = StringBuilder::with_capacity(total, total * 36);
        let mut category_builder = StringBuilder::with_capacity(total, total * 16);
        let mut question_builder = StringBuilder::with_capacity(total, total * 64);
        let mut answer_builder = StringBuilder::with_capacity(total, total * 256);
        let values_builder = Float32Builder::with_capacity(total * dim);
        let mut vector_builder = FixedSizeListBuilder::new(values_builder, dim as i32);

        for (entry, vector) in entries.iter().zip(&vectors) {
            id_builder.append_value(&entry.faq_id);
            category_builder.append_option(entry.category.as_deref());
            question_builder.append_value(&entry.question);
            answer_builder.append_value(&entry.answer);
            vector_builder.values().append_slice(vector);
            vector_builder.append(true);
        }

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(id_builder.finish()),
                Arc::new(category_builder.finish()),
                Arc::new(question_builder.finish()),
                Arc::new(answer_builder.finish()),
                Arc::new(vector_builder.finish()),
            ],
        )?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema.clone());

        if self.table_exists().await? {
            let table = self.connection.open_table(&self.table_name).execute().await?;
            table.add(Box::new(reader)).execute().await?;
        } else {
            self.connection
                .create_table(&self.table_name, Box::new(reader))
                .execute()
                .await?;
        }

        info!("Ingested {} FAQ entries into LanceDB", total);
        Ok(total)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, AppError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| AppError::SearchUnavailable(format!("Column '{}' not found", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| AppError::SearchUnavailable(format!("Failed to downcast column '{}'", name)))
}

#[async_trait]
impl VectorIndex for LanceFaqIndex {
    async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<SearchHit>, AppError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.connection.open_table(&self.table_name).execute().await?;
        let mut results = table
            .query()
            .limit(top_k)
            .nearest_to(vector)?
            .distance_type(DistanceType::Cosine)
            .execute()
            .await?;

        let mut hits = Vec::new();
        while let Some(batch) = results.try_next().await? {
            let ids = string_column(&batch, "faq_id")?;
            let categories = string_column(&batch, "category")?;
            let questions = string_column(&batch, "question")?;
            let answers = string_column(&batch, "answer")?;
            let distances = batch
                .column_by_name("_distance")
                .ok_or_else(|| AppError::SearchUnavailable("Column '_distance' not found".to_string()))?
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| AppError::SearchUnavailable("Failed to downcast distance column".to_string()))?;

            for i in 0..ids.len() {
                if ids.is_null(i) || distances.is_null(i) {
                    continue;
                }
                hits.push(SearchHit {
                    candidate_id: ids.value(i).to_string(),
                    // Cosine distance is 1 - cosine similarity.
                    score: clamp_confidence(1.0 - distances.value(i)),
                    question: questions.value(i).to_string(),
                    answer: answers.value(i).to_string(),
                    category: (!categories.is_null(i)).then(|| categories.value(i).to_string()),
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}
