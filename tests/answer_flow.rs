mod common;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use docsage_backend::core::errors::{FailureKind, RagError};
use docsage_backend::llm::ChatMessage;
use docsage_backend::orchestrator::{
    QuestionRequest, SearchMode, SourcesRecord, StreamEvent, WebSource,
};
use docsage_backend::rag::{Chunk, Chunker, SourceLiveness};

fn sources(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn invoice_question_streams_answer_then_cites_the_invoice() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = memory_index(embedder.clone());
    let chunks = Chunker::default().chunk("Invoice #1234\nVendor: Acme Corp\nTotal: $500", "invoice.txt");
    index.add(chunks).await.expect("add");

    let completion = Arc::new(ScriptedCompletion::tokens(&["The total ", "is $500."]));
    let web = Arc::new(CountingWebSearch::returning(5));
    let orchestrator = orchestrator(index, completion.clone()).with_web_search(web.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("What is the total in my invoice?"))
            .expect("ask"),
    )
    .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Token("The total ".to_string()),
            StreamEvent::Token("is $500.".to_string()),
            StreamEvent::SourcesKnown(SourcesRecord {
                document_sources: sources(&["invoice.txt"]),
                web_sources: Vec::new(),
                search_mode: SearchMode::DocumentsOnly,
            }),
            StreamEvent::Done,
        ]
    );
    assert_eq!(web.calls(), 0);
    assert_eq!(embedder.calls(), 2);

    let request = completion.last_request().expect("completion request");
    let prompt = &request.messages.last().expect("user message").content;
    assert!(prompt.contains("Total: $500"));
    assert!(prompt.ends_with("My question: What is the total in my invoice?"));
}

#[tokio::test]
async fn greeting_is_answered_without_any_retrieval() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = memory_index(embedder.clone());
    index
        .add(vec![Chunk::new("Invoice total: $500", "invoice.txt", 0)])
        .await
        .expect("add");
    let embed_calls = embedder.calls();

    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let web = Arc::new(CountingWebSearch::returning(5));
    let orchestrator = orchestrator(index, completion.clone()).with_web_search(web.clone());

    let events = collect(orchestrator.ask(QuestionRequest::new("hello")).expect("ask")).await;

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], StreamEvent::Token(reply) if !reply.is_empty()));
    assert_eq!(events[1], StreamEvent::SourcesKnown(SourcesRecord::empty()));
    assert_eq!(events[2], StreamEvent::Done);

    assert_eq!(embedder.calls(), embed_calls);
    assert_eq!(web.calls(), 0);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn document_question_without_documents_asks_for_an_upload() {
    let embedder = Arc::new(CountingEmbedder::default());
    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let orchestrator = orchestrator(memory_index(embedder.clone()), completion.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("What is the total in my invoice?"))
            .expect("ask"),
    )
    .await;

    assert_eq!(
        tokens(&events),
        "I don't have any documents to search through yet. Please upload some documents first!"
    );
    assert_eq!(embedder.calls(), 0);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn empty_question_is_rejected_before_any_work() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let orchestrator = orchestrator(
        memory_index(Arc::new(CountingEmbedder::default())),
        completion.clone(),
    );

    let err = orchestrator
        .ask(QuestionRequest::new("   \n"))
        .expect_err("blank question");

    assert!(matches!(err, RagError::Validation(_)));
    assert_eq!(err.user_message(), "Question cannot be empty.");
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn scoped_question_only_cites_the_scoped_source() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = memory_index(embedder);
    index
        .add(vec![
            Chunk::new("Invoice total: $500, vendor Acme", "invoice.txt", 0),
            Chunk::new("Cats and dogs are pets", "pets.txt", 0),
        ])
        .await
        .expect("add");

    let completion = Arc::new(ScriptedCompletion::tokens(&["Pets are covered."]));
    let orchestrator = orchestrator(index, completion);

    let request = QuestionRequest {
        sources: Some(vec!["pets.txt".to_string()]),
        ..QuestionRequest::new("summarize my document")
    };
    let events = collect(orchestrator.ask(request).expect("ask")).await;

    let Some(StreamEvent::SourcesKnown(record)) = events.iter().rev().nth(1) else {
        panic!("expected sources before done: {events:?}");
    };
    assert_eq!(record.document_sources, sources(&["pets.txt"]));
    assert_eq!(record.search_mode, SearchMode::DocumentsOnly);
}

#[tokio::test]
async fn deleted_scope_never_widens_to_other_documents() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = memory_index(embedder.clone());
    index
        .add(vec![
            Chunk::new("Invoice total: $500", "deleted.txt", 0),
            Chunk::new("Cats and dogs are pets", "pets.txt", 0),
        ])
        .await
        .expect("add");
    let embed_calls = embedder.calls();

    let completion = Arc::new(ScriptedCompletion::tokens(&["Only pets."]));
    let liveness: Arc<dyn SourceLiveness> = Arc::new(|source: &str| source != "deleted.txt");
    let orchestrator = orchestrator(index, completion.clone()).with_liveness(liveness);

    let gone = QuestionRequest {
        sources: Some(vec!["deleted.txt".to_string()]),
        ..QuestionRequest::new("summarize my document")
    };
    let events = collect(orchestrator.ask(gone).expect("ask")).await;

    assert!(tokens(&events).contains("no longer exist"));
    assert_eq!(events[1], StreamEvent::SourcesKnown(SourcesRecord::empty()));
    assert_eq!(embedder.calls(), embed_calls);
    assert_eq!(completion.calls(), 0);

    let mixed = QuestionRequest {
        sources: Some(vec!["deleted.txt".to_string(), "pets.txt".to_string()]),
        ..QuestionRequest::new("summarize my document")
    };
    let events = collect(orchestrator.ask(mixed).expect("ask")).await;
    let Some(StreamEvent::SourcesKnown(record)) = events.iter().rev().nth(1) else {
        panic!("expected sources before done: {events:?}");
    };
    assert_eq!(record.document_sources, sources(&["pets.txt"]));
}

/// A single chunk along axis 0 and queries pinned at known similarities.
async fn weak_match_setup(
    completion: Arc<ScriptedCompletion>,
) -> docsage_backend::orchestrator::QueryOrchestrator {
    let embedder = Arc::new(
        CountingEmbedder::default()
            .pin("Revenue grew in the third quarter.", axis(0))
            .pin("quarterly revenue figures", at_similarity(0.1))
            .pin("summarize my document", at_similarity(0.1))
            .pin("quarterly revenue totals", at_similarity(0.5)),
    );
    let index = memory_index(embedder);
    index
        .add(vec![Chunk::new("Revenue grew in the third quarter.", "report.txt", 0)])
        .await
        .expect("add");
    orchestrator(index, completion)
}

#[tokio::test]
async fn weak_matches_escalate_to_the_web_and_are_dropped() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["From the web."]));
    let web = Arc::new(CountingWebSearch::returning(5));
    let orchestrator = weak_match_setup(completion.clone())
        .await
        .with_web_search(web.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("quarterly revenue figures"))
            .expect("ask"),
    )
    .await;

    assert_eq!(web.calls(), 1);
    let expected_web: Vec<WebSource> = (0..3)
        .map(|i| WebSource {
            title: format!("Result {i}"),
            url: format!("https://example.com/{i}"),
        })
        .collect();
    assert_eq!(
        events[events.len() - 2],
        StreamEvent::SourcesKnown(SourcesRecord {
            document_sources: BTreeSet::new(),
            web_sources: expected_web,
            search_mode: SearchMode::WebOnly,
        })
    );

    let prompt = completion.last_request().expect("request").messages[1].content.clone();
    assert!(!prompt.contains("Revenue grew"));
    assert!(prompt.contains("Snippet number 0"));
}

#[tokio::test]
async fn weak_matches_without_web_end_in_a_no_results_reply() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let orchestrator = weak_match_setup(completion.clone()).await;

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("quarterly revenue figures"))
            .expect("ask"),
    )
    .await;

    assert!(tokens(&events).starts_with("Web search is disabled"));
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn explicit_document_questions_keep_weak_matches() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["Revenue grew."]));
    let web = Arc::new(CountingWebSearch::returning(5));
    let orchestrator = weak_match_setup(completion.clone())
        .await
        .with_web_search(web.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("summarize my document"))
            .expect("ask"),
    )
    .await;

    assert_eq!(web.calls(), 0);
    assert_eq!(
        events[events.len() - 2],
        StreamEvent::SourcesKnown(SourcesRecord {
            document_sources: sources(&["report.txt"]),
            web_sources: Vec::new(),
            search_mode: SearchMode::DocumentsOnly,
        })
    );
}

#[tokio::test]
async fn strong_matches_do_not_escalate() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["Revenue grew."]));
    let web = Arc::new(CountingWebSearch::returning(5));
    let orchestrator = weak_match_setup(completion)
        .await
        .with_web_search(web.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("quarterly revenue totals"))
            .expect("ask"),
    )
    .await;

    assert_eq!(web.calls(), 0);
    let Some(StreamEvent::SourcesKnown(record)) = events.iter().rev().nth(1) else {
        panic!("expected sources before done: {events:?}");
    };
    assert_eq!(record.document_sources, sources(&["report.txt"]));
}

#[tokio::test]
async fn failing_web_search_degrades_when_documents_were_searched() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let web = Arc::new(CountingWebSearch::failing(FailureKind::RateLimited));
    let orchestrator = weak_match_setup(completion.clone())
        .await
        .with_web_search(web.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("quarterly revenue figures"))
            .expect("ask"),
    )
    .await;

    assert_eq!(web.calls(), 1);
    assert!(events.iter().all(|e| !matches!(e, StreamEvent::Error(_))));
    assert!(tokens(&events).starts_with("I couldn't find information"));
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn failing_web_search_is_fatal_for_web_only_questions() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let web = Arc::new(CountingWebSearch::failing(FailureKind::Timeout));
    let orchestrator = orchestrator(
        memory_index(Arc::new(CountingEmbedder::default())),
        completion.clone(),
    )
    .with_web_search(web.clone());

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("how to bake bread"))
            .expect("ask"),
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::Error(msg) if msg.contains("took too long")));
    assert_eq!(events[1], StreamEvent::Done);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn skipping_web_search_leaves_web_questions_unanswered() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["unused"]));
    let web = Arc::new(CountingWebSearch::returning(5));
    let orchestrator = orchestrator(
        memory_index(Arc::new(CountingEmbedder::default())),
        completion.clone(),
    )
    .with_web_search(web.clone());

    let request = QuestionRequest {
        skip_web_search: true,
        ..QuestionRequest::new("how to bake bread")
    };
    let events = collect(orchestrator.ask(request).expect("ask")).await;

    assert_eq!(web.calls(), 0);
    assert!(tokens(&events).starts_with("Web search is disabled"));
}

async fn invoice_orchestrator(
    completion: Arc<ScriptedCompletion>,
) -> docsage_backend::orchestrator::QueryOrchestrator {
    let index = memory_index(Arc::new(CountingEmbedder::default()));
    index
        .add(vec![Chunk::new("Invoice total: $500", "invoice.txt", 0)])
        .await
        .expect("add");
    orchestrator(index, completion)
}

#[tokio::test]
async fn unavailable_completion_yields_error_then_done() {
    let completion = Arc::new(ScriptedCompletion::new(Script::Unavailable(
        FailureKind::Connection,
    )));
    let orchestrator = invoice_orchestrator(completion).await;

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("What is the total in my invoice?"))
            .expect("ask"),
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        StreamEvent::Error(msg) if msg.contains("Could not reach the completion service")
    ));
    assert_eq!(events[1], StreamEvent::Done);
}

#[tokio::test]
async fn mid_stream_failure_keeps_tokens_then_errors() {
    let completion = Arc::new(ScriptedCompletion::new(Script::FailAfter(
        vec!["The total ".to_string()],
        FailureKind::BadResponse,
    )));
    let orchestrator = invoice_orchestrator(completion).await;

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("What is the total in my invoice?"))
            .expect("ask"),
    )
    .await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], StreamEvent::Token("The total ".to_string()));
    assert!(matches!(events[1], StreamEvent::Error(_)));
    assert_eq!(events[2], StreamEvent::Done);
}

#[tokio::test]
async fn not_found_answers_drop_their_citations() {
    let completion = Arc::new(ScriptedCompletion::tokens(&[
        "I couldn't find ",
        "that in your documents.",
    ]));
    let orchestrator = invoice_orchestrator(completion).await;

    let events = collect(
        orchestrator
            .ask(QuestionRequest::new("What is the vendor address in my invoice?"))
            .expect("ask"),
    )
    .await;

    assert_eq!(events.len(), 4);
    assert_eq!(events[2], StreamEvent::SourcesKnown(SourcesRecord::empty()));
    assert_eq!(events[3], StreamEvent::Done);
}

#[tokio::test]
async fn prior_turns_sit_between_system_prompt_and_question() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["$500."]));
    let orchestrator = invoice_orchestrator(completion.clone()).await;

    let history = vec![
        ChatMessage::user("Who is the vendor on my invoice?"),
        ChatMessage::assistant("Acme."),
    ];
    let request = QuestionRequest {
        history: history.clone(),
        ..QuestionRequest::new("And what is the total in my invoice?")
    };
    collect(orchestrator.ask(request).expect("ask")).await;

    let sent = completion.last_request().expect("request");
    assert_eq!(sent.messages.len(), 4);
    assert_eq!(sent.messages[0].role, "system");
    assert_eq!(&sent.messages[1..3], &history[..]);
    assert_eq!(sent.messages[3].role, "user");
}

#[tokio::test]
async fn dropping_the_receiver_stops_the_producer() {
    let completion = Arc::new(ScriptedCompletion::new(Script::Endless(
        Duration::from_millis(5),
    )));
    let orchestrator = invoice_orchestrator(completion.clone()).await;

    let mut events = orchestrator
        .ask(QuestionRequest::new("What is the total in my invoice?"))
        .expect("ask");
    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("first token");
    assert!(matches!(first, Some(StreamEvent::Token(_))));
    drop(events);

    let stopped = completion.producer_stopped.clone();
    tokio::time::timeout(Duration::from_secs(5), async move {
        while !stopped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("producer should notice the disconnect");
}
