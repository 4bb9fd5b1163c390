use std::path::PathBuf;

use chrono::{Local, TimeZone};

use ragdb_cli::{format_report, parse_args, parse_questions, report_file_name, Command, EvalQuestion, EvalRow};
use ragdb_core::types::{Meta, RetrievalResult};
use ragdb_retrieve::PromptTemplate;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_query_with_flags() {
    let cmd = parse_args(&args(&["query", "refund", "window?", "--retrieve-k", "30", "--final-k", "7", "--json"])).unwrap();
    assert_eq!(
        cmd,
        Command::Query {
            question: "refund window?".into(),
            retrieve_k: Some(30),
            final_k: Some(7),
            template: PromptTemplate::CitedJson,
            json: true,
        }
    );
}

#[test]
fn parses_other_commands() {
    assert_eq!(parse_args(&[]).unwrap(), Command::Help);
    assert_eq!(parse_args(&args(&["ingest"])).unwrap(), Command::Ingest { data_dir: None });
    assert_eq!(
        parse_args(&args(&["ingest", "corpus"])).unwrap(),
        Command::Ingest { data_dir: Some(PathBuf::from("corpus")) }
    );
    assert_eq!(
        parse_args(&args(&["search", "leave", "--limit", "3"])).unwrap(),
        Command::Search { question: "leave".into(), limit: Some(3) }
    );
    assert_eq!(
        parse_args(&args(&["eval", "q.txt", "-o", "out.txt"])).unwrap(),
        Command::Eval { questions: PathBuf::from("q.txt"), output: Some(PathBuf::from("out.txt")) }
    );
    assert_eq!(parse_args(&args(&["status"])).unwrap(), Command::Status);
    match parse_args(&args(&["query", "x", "--template", "grounded"])).unwrap() {
        Command::Query { template, .. } => assert_eq!(template, PromptTemplate::Grounded),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn rejects_bad_input() {
    assert!(parse_args(&args(&["query"])).is_err());
    assert!(parse_args(&args(&["query", "x", "--final-k", "seven"])).is_err());
    assert!(parse_args(&args(&["query", "x", "--final-k"])).is_err());
    assert!(parse_args(&args(&["query", "x", "--bogus"])).is_err());
    assert!(parse_args(&args(&["frobnicate"])).is_err());
    assert!(parse_args(&args(&["eval"])).is_err());
}

#[test]
fn questions_file_format() {
    let text = "# railway FAQ\nWhat if a train is cancelled?\tAnswerable\n\nCan I reschedule?\n";
    assert_eq!(
        parse_questions(text),
        vec![
            EvalQuestion { question: "What if a train is cancelled?".into(), expected: Some("Answerable".into()) },
            EvalQuestion { question: "Can I reschedule?".into(), expected: None },
        ]
    );
}

#[test]
fn report_lists_sources_and_failures() {
    let now = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(report_file_name(now), "eval_report_20260102_030405.txt");

    let mut metadata = Meta::new();
    metadata.insert("source_id".into(), "Source 4".into());
    metadata.insert("source_doc".into(), "refunds.txt".into());
    metadata.insert("doc_id".into(), "refunds_0".into());
    let hit = RetrievalResult { id: "chunk_3".into(), text: "Refunds take 7 days.".into(), metadata, rerank_score: 3.5 };
    let rows: Vec<EvalRow> = vec![
        (EvalQuestion { question: "How long?".into(), expected: Some("Answerable".into()) }, Ok(vec![hit])),
        (EvalQuestion { question: "Unknown?".into(), expected: None }, Ok(vec![])),
        (EvalQuestion { question: "Broken?".into(), expected: None }, Err("Retrieval timed out after 1s".into())),
    ];
    let report = format_report(now, "policy_docs", &rows);
    assert!(report.starts_with("RAG Evaluation Output\n"));
    assert!(report.contains("Collection: policy_docs"));
    assert!(report.contains("Expected: Answerable"));
    assert!(report.contains("[Source 4] refunds.txt (refunds_0) score=3.5000"));
    assert!(report.contains("Retrieved: none"));
    assert!(report.contains("Error: Retrieval timed out after 1s"));
}
