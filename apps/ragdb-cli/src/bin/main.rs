use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;

use ragdb_cli::{format_report, init_tracing, parse_args, parse_questions, report_file_name, Command, EvalRow, USAGE};
use ragdb_core::chunker::Chunker;
use ragdb_core::config::{Config, Settings};
use ragdb_core::loader::load_documents;
use ragdb_core::traits::VectorIndex;
use ragdb_embed::get_default_embedder;
use ragdb_rerank::get_default_reranker;
use ragdb_retrieve::{build_context, render_prompt, Retriever, NOT_AVAILABLE};
use ragdb_vector::{BuildOutcome, FlatIndex, IndexWriter, EMBEDDER_ID_KEY};

fn open_index(settings: &Settings) -> anyhow::Result<FlatIndex> {
    Ok(FlatIndex::open(&settings.persist_dir(), &settings.data.collection)?)
}

fn open_retriever(settings: &Settings) -> anyhow::Result<Arc<Retriever<FlatIndex>>> {
    let index = open_index(settings)?;
    let embedder = get_default_embedder(&settings.embedding)?;
    let reranker = get_default_reranker(&settings.rerank)?;
    Ok(Arc::new(Retriever::new(index, embedder, reranker)?))
}

fn ingest(settings: &Settings, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let data_dir = data_dir.unwrap_or_else(|| settings.corpus_dir());
    println!("Ingesting from {}", data_dir.display());

    let index = open_index(settings)?;
    let existing = index.count()?;
    if existing > 0 {
        println!("Collection '{}' already holds {existing} entries, skipping build", settings.data.collection);
        return Ok(());
    }

    let report = load_documents(&data_dir)?;
    for failure in &report.failures {
        eprintln!("Skipped {}: {}", failure.path.display(), failure.reason);
    }
    let chunks = Chunker::from_settings(&settings.chunking)?.chunk(&report.documents);
    let embedder = get_default_embedder(&settings.embedding)?;
    let outcome = IndexWriter::new(&index, embedder.as_ref())
        .with_batch_size(settings.embedding.batch_size)
        .with_progress(true)
        .build(&chunks)?;
    match outcome {
        BuildOutcome::Built { entries } => println!(
            "Ingest complete: {} documents, {} chunks, {entries} entries in {}",
            report.documents.len(),
            chunks.len(),
            index.dir().display()
        ),
        BuildOutcome::Skipped { existing } => println!("Collection already holds {existing} entries, skipping build"),
    }
    Ok(())
}

fn query(
    settings: &Settings,
    question: &str,
    retrieve_k: Option<usize>,
    final_k: Option<usize>,
    template: ragdb_retrieve::PromptTemplate,
    json: bool,
) -> anyhow::Result<()> {
    let retrieve_k = retrieve_k.unwrap_or(settings.retrieval.retrieve_k);
    let final_k = final_k.unwrap_or(settings.retrieval.final_k);
    let timeout = Duration::from_millis(settings.retrieval.timeout_ms);
    let retriever = open_retriever(settings)?;

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(retriever.retrieve_with_timeout(question.to_string(), retrieve_k, final_k, timeout))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No relevant evidence found. {NOT_AVAILABLE}");
        return Ok(());
    }
    println!("Top {} of {retrieve_k} candidates for: \"{question}\"", results.len());
    for (i, r) in results.iter().enumerate() {
        println!("\n  {}. score={:.4}  [{}]  {}  ({})", i + 1, r.rerank_score, r.source_label(), r.source_doc(), r.doc_id());
        let preview: String = r.text.chars().take(200).collect();
        println!("     {}", preview.replace('\n', " "));
    }
    println!("\n{}", render_prompt(template, &build_context(&results), question));
    Ok(())
}

fn search(settings: &Settings, question: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(settings.retrieval.final_k);
    let retriever = open_retriever(settings)?;
    let hits = retriever.search(question, limit)?;
    println!("Found {} results for: \"{question}\"", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.metadata.get("source_doc").map_or("", String::as_str);
        println!("\n  {}. distance={:.4}  id={}  {}", i + 1, hit.distance, hit.id, source);
        let preview: String = hit.text.chars().take(200).collect();
        println!("     {}", preview.replace('\n', " "));
    }
    Ok(())
}

fn eval(settings: &Settings, questions_path: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(questions_path)
        .with_context(|| format!("failed to read {}", questions_path.display()))?;
    let questions = parse_questions(&raw);
    if questions.is_empty() {
        anyhow::bail!("no questions in {}", questions_path.display());
    }
    let retriever = open_retriever(settings)?;
    let timeout = Duration::from_millis(settings.retrieval.timeout_ms);
    let (retrieve_k, final_k) = (settings.retrieval.retrieve_k, settings.retrieval.final_k);

    let rt = tokio::runtime::Runtime::new()?;
    let outcomes = rt.block_on(futures::future::join_all(
        questions
            .iter()
            .map(|q| Arc::clone(&retriever).retrieve_with_timeout(q.question.clone(), retrieve_k, final_k, timeout)),
    ));
    let rows: Vec<EvalRow> = questions
        .into_iter()
        .zip(outcomes)
        .map(|(q, outcome)| (q, outcome.map_err(|e| e.to_string())))
        .collect();

    let now = Local::now();
    let path = output.unwrap_or_else(|| PathBuf::from(report_file_name(now)));
    std::fs::write(&path, format_report(now, &settings.data.collection, &rows))?;
    let failed = rows.iter().filter(|(_, r)| r.is_err()).count();
    println!("Evaluated {} questions ({failed} failed). Results saved to {}", rows.len(), path.display());
    Ok(())
}

fn status(settings: &Settings) -> anyhow::Result<()> {
    let index = open_index(settings)?;
    println!("Collection: {}", settings.data.collection);
    println!("Path:       {}", index.index_path().display());
    println!("Entries:    {}", index.count()?);
    println!("Dimension:  {}", index.dim()?);
    println!("Embedder:   {}", index.get_meta(EMBEDDER_ID_KEY)?.unwrap_or_else(|| "-".to_string()));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;

    match command {
        Command::Ingest { data_dir } => ingest(&settings, data_dir),
        Command::Query { question, retrieve_k, final_k, template, json } => {
            query(&settings, &question, retrieve_k, final_k, template, json)
        }
        Command::Search { question, limit } => search(&settings, &question, limit),
        Command::Eval { questions, output } => eval(&settings, &questions, output),
        Command::Status => status(&settings),
        Command::Help => Ok(()),
    }
}
