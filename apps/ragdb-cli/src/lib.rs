//! Argument parsing and evaluation-report helpers for the `ragdb` binary.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Local};

use ragdb_core::types::RetrievalResult;
use ragdb_retrieve::{PromptTemplate, NOT_AVAILABLE};

pub const USAGE: &str = "Usage: ragdb <command> [args...]

Commands:
  ingest [data_dir]                          load, chunk and index the corpus (skipped if already built)
  query \"<question>\" [--retrieve-k N] [--final-k N] [--template NAME] [--json]
  search \"<question>\" [--limit N]            dense search without reranking
  eval <questions.txt> [--output FILE]       one question per line, optional TAB + expected label
  status                                     show collection details";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ingest { data_dir: Option<PathBuf> },
    Query { question: String, retrieve_k: Option<usize>, final_k: Option<usize>, template: PromptTemplate, json: bool },
    Search { question: String, limit: Option<usize> },
    Eval { questions: PathBuf, output: Option<PathBuf> },
    Status,
    Help,
}

fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i).map(String::as_str).ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn number(value: &str, flag: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| anyhow!("{flag} requires a number, got '{value}'"))
}

/// Parse the arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((cmd, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };
    let mut positional: Vec<&str> = Vec::new();
    let (mut retrieve_k, mut final_k, mut limit) = (None, None, None);
    let mut json = false;
    let mut template = PromptTemplate::default();
    let mut output = None;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--retrieve-k" => retrieve_k = Some(number(flag_value(rest, &mut i, "--retrieve-k")?, "--retrieve-k")?),
            "--final-k" => final_k = Some(number(flag_value(rest, &mut i, "--final-k")?, "--final-k")?),
            "--limit" => limit = Some(number(flag_value(rest, &mut i, "--limit")?, "--limit")?),
            "--template" => template = flag_value(rest, &mut i, "--template")?.parse().map_err(|e: String| anyhow!(e))?,
            "--output" | "-o" => output = Some(PathBuf::from(flag_value(rest, &mut i, "--output")?)),
            "--json" => json = true,
            other if other.starts_with("--") => bail!("unknown option '{other}'"),
            other => positional.push(other),
        }
        i += 1;
    }

    let question = || -> Result<String> {
        let q = positional.join(" ");
        if q.trim().is_empty() {
            bail!("{cmd} requires a question");
        }
        Ok(q)
    };

    Ok(match cmd.as_str() {
        "ingest" => Command::Ingest { data_dir: positional.first().map(PathBuf::from) },
        "query" => Command::Query { question: question()?, retrieve_k, final_k, template, json },
        "search" => Command::Search { question: question()?, limit },
        "eval" => {
            let file = positional.first().ok_or_else(|| anyhow!("eval requires a questions file"))?;
            Command::Eval { questions: PathBuf::from(file), output }
        }
        "status" => Command::Status,
        "help" | "--help" | "-h" => Command::Help,
        other => bail!("unknown command '{other}'"),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalQuestion {
    pub question: String,
    pub expected: Option<String>,
}

/// One question per line, `question<TAB>expected` optional. Blank lines and
/// `#` comments are skipped.
pub fn parse_questions(text: &str) -> Vec<EvalQuestion> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| match l.split_once('\t') {
            Some((q, e)) => EvalQuestion { question: q.trim().to_string(), expected: Some(e.trim().to_string()) },
            None => EvalQuestion { question: l.to_string(), expected: None },
        })
        .collect()
}

pub fn report_file_name(now: DateTime<Local>) -> String {
    format!("eval_report_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

pub type EvalRow = (EvalQuestion, std::result::Result<Vec<RetrievalResult>, String>);

pub fn format_report(now: DateTime<Local>, collection: &str, rows: &[EvalRow]) -> String {
    let rule = "-".repeat(80);
    let mut out = String::new();
    out.push_str("RAG Evaluation Output\n");
    out.push_str(&"=".repeat(80));
    out.push('\n');
    out.push_str(&format!("Run time: {}\n", now.to_rfc3339()));
    out.push_str(&format!("Collection: {collection}\n\n"));
    for (q, result) in rows {
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("Question: {}\n", q.question));
        if let Some(expected) = &q.expected {
            out.push_str(&format!("Expected: {expected}\n"));
        }
        match result {
            Ok(results) if results.is_empty() => out.push_str(&format!("Retrieved: none ({NOT_AVAILABLE})\n")),
            Ok(results) => {
                out.push_str(&format!("Retrieved: {}\n", results.len()));
                for r in results {
                    out.push_str(&format!(
                        "  [{}] {} ({}) score={:.4}\n",
                        r.source_label(),
                        r.source_doc(),
                        r.doc_id(),
                        r.rerank_score
                    ));
                }
            }
            Err(e) => out.push_str(&format!("Error: {e}\n")),
        }
        out.push('\n');
    }
    out
}

/// Install the `tracing` subscriber: `RUST_LOG` if set, `info` otherwise.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
