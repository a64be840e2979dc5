// FaqDesk entry point: one utterance per stdin line, one JSON response per stdout line.

use anyhow::{Context, Result};
use faqdesk_core::actors::embedder::FastEmbedEmbedder;
use faqdesk_core::actors::traits::{Embedder, VectorIndex};
use faqdesk_core::actors::vector_index::{FaqEntry, InMemoryFaqIndex, LanceFaqIndex};
use faqdesk_core::database::{self, SqliteTurnStore};
use faqdesk_core::fs_manager::PortablePathManager;
use faqdesk_core::{telemetry, DialogPipeline, PipelineConfig};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct TurnRequest {
    text: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Plain lines continue the previous session; JSON lines choose their own.
fn parse_line(line: &str, current: Option<&str>) -> TurnRequest {
    if line.trim_start().starts_with('{') {
        match serde_json::from_str::<TurnRequest>(line) {
            Ok(request) => return request,
            Err(e) => warn!("Treating malformed JSON request as plain text: {}", e),
        }
    }
    TurnRequest {
        text: line.to_string(),
        session_id: current.map(str::to_string),
    }
}

async fn ingest(file: &Path, paths: &PortablePathManager, embedder: &dyn Embedder) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let entries: Vec<FaqEntry> = serde_json::from_str(&raw).context("FAQ file must be a JSON array of entries")?;

    let index = LanceFaqIndex::connect(&paths.vectors_dir()).await?;
    let count = index.ingest(&entries, embedder).await?;
    info!("Ingestion complete: {} entries from {:?}", count, file);
    Ok(())
}

async fn open_index(paths: &PortablePathManager) -> Arc<dyn VectorIndex> {
    match LanceFaqIndex::connect(&paths.vectors_dir()).await {
        Ok(index) => Arc::new(index),
        Err(e) => {
            error!("Vector store unavailable ({}), answering without FAQ search", e);
            Arc::new(InMemoryFaqIndex::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = PipelineConfig::from_env().context("Invalid configuration")?;
    telemetry::init_tracing("faqdesk");

    let paths = PortablePathManager::new(config.data_dir.clone());
    paths.init().context("Failed to create data directories")?;
    info!("Data directory: {:?}", paths.data_dir());

    let embedder = Arc::new(FastEmbedEmbedder::load(paths.embeddings_dir()).await);
    if !embedder.is_loaded() {
        warn!("Embedding model not loaded; every FAQ lookup will escalate");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [flag, file] = args.as_slice() {
        if flag == "--ingest" {
            return ingest(Path::new(file), &paths, embedder.as_ref()).await;
        }
    }
    if !args.is_empty() {
        anyhow::bail!("usage: faqdesk [--ingest <faqs.json>]");
    }

    let pool = database::init_db(&paths.db_path()).await?;
    let store = Arc::new(SqliteTurnStore::new(pool));
    let index = open_index(&paths).await;
    let pipeline = DialogPipeline::new(config, embedder, index, store);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut current: Option<String> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let request = parse_line(&line, current.as_deref());
        match pipeline.process(&request.text, request.session_id.as_deref()).await {
            Ok(response) => {
                if response.session_id.is_some() {
                    current = response.session_id.clone();
                }
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
            Err(e) => error!("Turn failed: {}", e),
        }
    }

    let snapshot = pipeline.shutdown().await?;
    info!("Analytics: {}", serde_json::to_string(&snapshot)?);
    Ok(())
}
