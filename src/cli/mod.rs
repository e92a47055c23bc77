// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Command-line interface
//!
//! `build` indexes a PDF directory, `chat` runs the interactive loop, `ask`
//! answers a single question, `eval` replays a JSONL dataset. All commands
//! share the pipeline wiring: config file → providers → health checks.

use crate::config::{RagConfig, RerankPolicy};
use crate::embeddings::OllamaEmbeddings;
use crate::errors::RagError;
use crate::eval;
use crate::generate::OllamaGenerator;
use crate::pipeline::RagPipeline;
use crate::rerank::{CrossEncoderClient, Reranker};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncBufReadExt;
use tracing::info;

/// Exits the chat loop
const CHAT_SENTINEL: &str = "sair";

/// Gazette RAG node CLI
#[derive(Parser, Debug)]
#[command(name = "gazette-rag")]
#[command(about = "Question answering over official gazette contract notices", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, env = "RAG_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the vector index from the configured PDF directory
    Build {
        /// Override the configured PDF directory
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
    },

    /// Interactive question loop
    Chat {
        /// Rebuild the index even if a persisted one exists
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a single question and exit
    Ask { question: String },

    /// Replay a JSONL evaluation dataset
    Eval {
        /// Dataset of {id, question, answer} records, one JSON object per line
        dataset: PathBuf,

        /// CSV report destination
        #[arg(long, default_value = "evaluation_results.csv")]
        report: PathBuf,

        /// Only evaluate the first N questions
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = RagConfig::from_file(&cli.config)?;
    let pipeline = build_pipeline(config)?;

    pipeline.health_check().await?;

    match cli.command {
        Commands::Build { pdf_dir } => {
            let dir = pdf_dir.unwrap_or_else(|| pipeline.config().pdf_dir.clone());
            let chunks = pipeline.build_index(&dir).await?;
            let index_path = pipeline.config().index_path.clone();
            pipeline.save_index(&index_path).await?;
            println!("Índice criado: {} chunks em {}", chunks, index_path.display());
            Ok(())
        }
        Commands::Chat { rebuild } => {
            ensure_index(&pipeline, rebuild).await?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            run_chat_loop(&pipeline, stdin).await
        }
        Commands::Ask { question } => {
            ensure_index(&pipeline, false).await?;
            let answer = pipeline.answer(&question).await?;
            println!("{}", answer.text);
            print_sources(&answer.supporting_chunks);
            Ok(())
        }
        Commands::Eval {
            dataset,
            report,
            limit,
        } => {
            ensure_index(&pipeline, false).await?;
            let summary = eval::run_eval(&pipeline, &dataset, &report, limit).await?;
            println!(
                "Avaliação: {}/{} corretas ({:.1}%), {} falhas — relatório em {}",
                summary.correct,
                summary.total,
                summary.accuracy() * 100.0,
                summary.failed,
                report.display()
            );
            Ok(())
        }
    }
}

/// Wire providers from the configuration
fn build_pipeline(config: RagConfig) -> Result<RagPipeline, RagError> {
    let timeout = config.request_timeout();

    let provider = Arc::new(OllamaEmbeddings::new(
        &config.embedding.url,
        &config.embedding.model,
        config.embedding_dimension,
        timeout,
    )?);

    let generation = Arc::new(OllamaGenerator::new(
        &config.generation.url,
        &config.generation.model,
        config.deterministic,
        timeout,
    )?);

    let reranker: Option<Arc<dyn Reranker>> =
        if matches!(config.retrieval.rerank, RerankPolicy::Never) {
            None
        } else {
            // validate() guarantees the endpoint is present
            let endpoint = config
                .cross_encoder
                .as_ref()
                .ok_or_else(|| RagError::Config("missing [cross_encoder] endpoint".into()))?;
            Some(Arc::new(CrossEncoderClient::new(
                &endpoint.url,
                &endpoint.model,
                timeout,
            )?))
        };

    Ok(RagPipeline::new(config, provider, generation, reranker))
}

/// Load the persisted index, or build (and persist) one from the corpus
async fn ensure_index(pipeline: &RagPipeline, rebuild: bool) -> Result<()> {
    let index_path = pipeline.config().index_path.clone();
    if !rebuild && index_path.exists() {
        let size = pipeline.load_index(&index_path).await?;
        info!(chunks = size, "loaded persisted index");
        return Ok(());
    }
    let pdf_dir = pipeline.config().pdf_dir.clone();
    let size = pipeline.build_index(&pdf_dir).await?;
    pipeline.save_index(&index_path).await?;
    info!(chunks = size, "built and persisted new index");
    Ok(())
}

async fn run_chat_loop<R>(pipeline: &RagPipeline, input: R) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    println!("--- ChatBot do Diário Oficial ---");
    println!("Digite '{}' para terminar o chat.", CHAT_SENTINEL);

    let examples = &pipeline.config().example_questions;
    if !examples.is_empty() {
        println!("\nExperimente uma das seguintes perguntas:");
        for (i, question) in examples.iter().enumerate() {
            println!("  {}. {}", i + 1, question);
        }
    }
    println!("{}", "-".repeat(30));

    let mut lines = input.lines();
    loop {
        print!("\nSua pergunta: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case(CHAT_SENTINEL) {
            println!("Encerrando o chat. Até logo!");
            break;
        }
        if question.is_empty() {
            continue;
        }

        let started = Instant::now();
        match pipeline.answer(question).await {
            Ok(answer) => {
                println!("\nResposta ({:.2}s):", started.elapsed().as_secs_f64());
                println!("{}", answer.text);
                print_sources(&answer.supporting_chunks);
            }
            Err(e) => {
                // Per-query failure: report and keep the session alive
                eprintln!("ERRO [{}]: {}", e.error_code(), e);
            }
        }
    }
    Ok(())
}

fn print_sources(chunks: &[crate::segment::Chunk]) {
    if chunks.is_empty() {
        return;
    }
    println!("\nFontes:");
    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "  {}. {} (pág. {})",
            i + 1,
            chunk.source_document,
            chunk.page_label()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::embeddings::HashEmbeddings;
    use crate::generate::GenerationModel;
    use async_trait::async_trait;

    struct StaticModel;

    #[async_trait]
    impl GenerationModel for StaticModel {
        async fn generate(&self, _prompt: &str) -> Result<String, RagError> {
            Ok("ok".to_string())
        }
        async fn health_check(&self) -> Result<(), RagError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chat_loop_skips_blank_survives_errors_and_exits_on_sentinel() {
        let pipeline = RagPipeline::new(
            test_config(),
            Arc::new(HashEmbeddings::new(64)),
            Arc::new(StaticModel),
            None,
        );
        // Blank line ignored; the question fails (no index loaded) without
        // ending the session; the sentinel match is case-insensitive
        let input = tokio::io::BufReader::new(&b"\nqual o valor?\nSAIR\n"[..]);
        run_chat_loop(&pipeline, input).await.unwrap();
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["gazette-rag", "ask", "Qual o valor do contrato?"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { .. }));

        let cli = Cli::try_parse_from([
            "gazette-rag",
            "--config",
            "custom.toml",
            "eval",
            "dataset.jsonl",
            "--limit",
            "100",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Commands::Eval { limit, .. } => assert_eq!(limit, Some(100)),
            _ => panic!("expected eval subcommand"),
        }
    }
}
