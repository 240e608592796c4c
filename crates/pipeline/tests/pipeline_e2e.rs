use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notewise_core::{PipelineConfig, Segment, SourceRequest};
use notewise_llm::mock::MockLlmProvider;
use notewise_llm::{ErrorClass, LlmError, Message};
use notewise_pipeline::{
    CancellationToken, FailureReason, FixedJitter, PipelineOutcome, RecordingSleeper, Summarizer,
};

fn transcript(n: usize) -> SourceRequest {
    let segments = (0..n)
        .map(|i| Segment::new(i as f64 * 4.0, i as f64 * 4.0 + 3.5, format!("sentence {i}")))
        .collect();
    let mut request = SourceRequest::new("Distributed systems lecture", segments);
    request.tags = vec!["systems".into()];
    request
}

fn summarizer(
    mock: Arc<MockLlmProvider>,
    config: PipelineConfig,
) -> (Summarizer, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let summarizer = Summarizer::builder(mock)
        .config(config)
        .sleeper(sleeper.clone())
        .jitter(Arc::new(FixedJitter(0.0)))
        .build()
        .unwrap();
    (summarizer, sleeper)
}

/// Part number from a chunk prompt title (`... - part 3/10`), `None` for the merge.
fn part_of(messages: &[Message]) -> Option<usize> {
    let text = messages[0].text();
    let title = text.lines().find(|l| l.starts_with("Title: "))?;
    let (_, rest) = title.rsplit_once(" - part ")?;
    rest.split('/').next()?.parse().ok()
}

fn is_merge(messages: &[Message]) -> bool {
    messages[0].text().contains("Integrate them into a single")
}

#[tokio::test]
async fn short_transcript_is_one_call() {
    let mock = Arc::new(MockLlmProvider::new());
    mock.push_ok("# Note\n\nEverything.");
    let (summarizer, sleeper) = summarizer(mock.clone(), PipelineConfig::default());

    let outcome = summarizer.summarize(&transcript(200)).await;

    assert_eq!(
        outcome,
        PipelineOutcome::MergedDocument {
            text: "# Note\n\nEverything.".into(),
            chunk_count: 1,
            failed_chunks: vec![],
        }
    );
    assert_eq!(mock.call_count(), 1);
    assert!(sleeper.recorded().is_empty());
    assert!(mock.prompts()[0].contains("13:16 - sentence 199"));
}

#[tokio::test]
async fn long_transcript_is_chunked_and_merged() {
    let mock = Arc::new(MockLlmProvider::with_handler(|messages| {
        if is_merge(messages) {
            return Ok("# Merged".into());
        }
        let part = part_of(messages).expect("chunk prompt");
        Ok(format!("summary of part {part}"))
    }));
    let (summarizer, _) = summarizer(mock.clone(), PipelineConfig::default());

    let outcome = summarizer.summarize(&transcript(620)).await;

    assert_eq!(outcome.text(), Some("# Merged"));
    assert_eq!(outcome.chunk_count(), 3);
    assert_eq!(mock.call_count(), 4);

    let prompts = mock.prompts();
    assert!(prompts[0].contains("part 1/3") && prompts[0].contains("sentence 206"));
    assert!(!prompts[0].contains("sentence 207"));
    assert!(prompts[1].contains("sentence 207") && prompts[1].contains("sentence 413"));
    assert!(prompts[2].contains("sentence 414") && prompts[2].contains("sentence 619"));
    let merge = &prompts[3];
    let p1 = merge.find("summary of part 1").unwrap();
    let p3 = merge.find("summary of part 3").unwrap();
    assert!(p1 < p3);
}

#[tokio::test]
async fn chunk_requests_carry_no_images() {
    let mock = Arc::new(MockLlmProvider::with_handler(|_| Ok("ok".into())));
    let (summarizer, _) = summarizer(mock.clone(), PipelineConfig::default());
    let mut request = transcript(300);
    request.image_urls = vec!["https://frames/grid.jpg".into()];

    summarizer.summarize(&request).await;

    assert!(mock
        .calls()
        .iter()
        .all(|messages| messages[0].image_urls().next().is_none()));
}

#[tokio::test]
async fn two_failed_chunks_are_named_in_merge_note() {
    let mock = Arc::new(MockLlmProvider::with_handler(|messages| {
        if is_merge(messages) {
            return Ok("# Merged".into());
        }
        match part_of(messages) {
            Some(4) | Some(9) => Err(LlmError::Connection("reset by peer".into())),
            Some(part) => Ok(format!("summary {part}")),
            None => Ok("?".into()),
        }
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(100)).await;

    match &outcome {
        PipelineOutcome::MergedDocument {
            text,
            chunk_count,
            failed_chunks,
        } => {
            assert_eq!(*chunk_count, 10);
            assert_eq!(failed_chunks, &vec![3, 8]);
            assert!(text.contains("parts 4, 9 of 10"));
        }
        other => panic!("expected merged document, got {other:?}"),
    }
    // 8 good chunks, 2 chunks x 5 attempts, 1 merge.
    assert_eq!(mock.call_count(), 8 + 10 + 1);
}

#[tokio::test]
async fn four_failed_chunks_abort_the_run() {
    let mock = Arc::new(MockLlmProvider::with_handler(|messages| {
        match part_of(messages) {
            Some(part) if part <= 4 => Err(LlmError::ApiError {
                status: 503,
                body: "unavailable".into(),
            }),
            _ => Ok("fine".into()),
        }
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(100)).await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.failed_chunks, vec![0, 1, 2, 3]);
            assert_eq!(report.dominant_class, Some(ErrorClass::ServerFault));
            assert!(report.suggestions.iter().any(|s| s.contains("wait and retry")));
        }
        other => panic!("expected total failure, got {other:?}"),
    }
    assert!(mock.prompts().iter().all(|p| !p.contains("part 5/10")));
}

#[tokio::test]
async fn merge_failure_degrades_to_ordered_concatenation() {
    let mock = Arc::new(MockLlmProvider::with_handler(|messages| {
        if is_merge(messages) {
            return Err(LlmError::Timeout("merge took too long".into()));
        }
        Ok(format!("summary {}", part_of(messages).unwrap_or(0)))
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        ..PipelineConfig::default()
    };
    let (summarizer, sleeper) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(100)).await;

    match outcome {
        PipelineOutcome::DegradedConcatenation {
            text,
            chunk_count,
            missing_chunks,
            merge_error,
        } => {
            assert_eq!(chunk_count, 10);
            assert!(missing_chunks.is_empty());
            assert_eq!(merge_error.class(), Some(ErrorClass::Timeout));
            let positions: Vec<usize> = (1..=10)
                .map(|i| text.find(&format!("### Part {i}\n\nsummary {i}")).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
            assert!(text.contains("final merge step failed"));
        }
        other => panic!("expected degraded concatenation, got {other:?}"),
    }
    // Merge retried with standard backoff: 4 sleeps of 2 * 2^n seconds.
    assert_eq!(
        sleeper.recorded(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16),
        ]
    );
}

#[tokio::test]
async fn every_chunk_failing_is_total_failure_even_with_lenient_ratio() {
    let mock = Arc::new(MockLlmProvider::with_handler(|_| {
        Err(LlmError::Connection("offline".into()))
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        max_failed_chunks_ratio: 1.0,
        max_retries: 1,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(30)).await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.reason, FailureReason::AllChunksFailed);
            assert_eq!(report.failed_chunks, vec![0, 1, 2]);
            assert_eq!(report.dominant_class, Some(ErrorClass::Network));
        }
        other => panic!("expected total failure, got {other:?}"),
    }
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn transient_single_shot_failure_falls_back_to_chunks() {
    let single_calls = Arc::new(AtomicUsize::new(0));
    let seen = single_calls.clone();
    let mock = Arc::new(MockLlmProvider::with_handler(move |messages| {
        if is_merge(messages) {
            return Ok("# Recovered".into());
        }
        match part_of(messages) {
            Some(part) => Ok(format!("summary {part}")),
            None => {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::ApiError {
                    status: 429,
                    body: "slow down".into(),
                })
            }
        }
    }));
    let config = PipelineConfig {
        max_retries: 2,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(40)).await;

    assert_eq!(outcome.text(), Some("# Recovered"));
    assert_eq!(single_calls.load(Ordering::SeqCst), 2);
    // Two single attempts, one chunk, one merge.
    assert_eq!(mock.call_count(), 4);
}

#[tokio::test]
async fn client_fault_never_falls_back() {
    let mock = Arc::new(MockLlmProvider::with_handler(|_| {
        Err(LlmError::ApiError {
            status: 401,
            body: "invalid api key".into(),
        })
    }));
    let (summarizer, sleeper) = summarizer(mock.clone(), PipelineConfig::default());

    let outcome = summarizer.summarize(&transcript(20)).await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.reason, FailureReason::SingleShotFailed);
            assert!(report.explanation.contains("the API key was rejected"));
            assert!(report
                .suggestions
                .iter()
                .any(|s| s.contains("Verify the API key")));
        }
        other => panic!("expected total failure, got {other:?}"),
    }
    assert_eq!(mock.call_count(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn failed_fallback_reports_both_attempts() {
    let mock = Arc::new(MockLlmProvider::with_handler(|messages| {
        match part_of(messages) {
            Some(_) => Err(LlmError::Timeout("chunk".into())),
            None => Err(LlmError::ApiError {
                status: 500,
                body: "internal".into(),
            }),
        }
    }));
    let config = PipelineConfig {
        max_retries: 1,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(10)).await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.errors.len(), 2);
            assert!(report.explanation.starts_with("The single request failed"));
            assert!(report.explanation.contains("HTTP 500"));
            assert!(report.explanation.contains("did not respond in time"));
        }
        other => panic!("expected total failure, got {other:?}"),
    }
}

#[tokio::test]
async fn fallback_can_be_disabled() {
    let mock = Arc::new(MockLlmProvider::with_handler(|_| {
        Err(LlmError::Connection("down".into()))
    }));
    let config = PipelineConfig {
        max_retries: 1,
        fallback_to_chunks: false,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(10)).await;

    assert!(outcome.is_failure());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn cancellation_stops_chunk_processing() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mock = Arc::new(MockLlmProvider::with_handler(move |messages| {
        let part = part_of(messages).unwrap_or(0);
        if part == 2 {
            trigger.cancel();
        }
        Ok(format!("summary {part}"))
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer
        .summarize_with_cancel(&transcript(50), &cancel)
        .await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.reason, FailureReason::Cancelled);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn bounded_concurrency_keeps_part_order() {
    let mock = Arc::new(MockLlmProvider::with_handler(|messages| {
        if is_merge(messages) {
            return Ok("# Merged".into());
        }
        Ok(format!("summary {}", part_of(messages).unwrap_or(0)))
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        concurrency: 4,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(80)).await;

    assert_eq!(outcome.text(), Some("# Merged"));
    let merge_prompt = mock
        .prompts()
        .into_iter()
        .find(|p| p.contains("Integrate them into a single"))
        .unwrap();
    let positions: Vec<usize> = (1..=8)
        .map(|i| merge_prompt.find(&format!("### Part {i}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn concurrent_chunks_stop_once_ratio_is_exceeded() {
    let mock = Arc::new(MockLlmProvider::with_handler(|_| {
        Err(LlmError::Connection("refused".into()))
    }));
    let config = PipelineConfig {
        max_segments_per_chunk: 10,
        max_retries: 1,
        concurrency: 3,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(100)).await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.chunk_count, 10);
            assert_eq!(report.failed_chunks, vec![0, 1, 2, 3]);
            assert!(matches!(
                report.reason,
                FailureReason::FailureRatioExceeded { .. }
            ));
        }
        other => panic!("expected total failure, got {other:?}"),
    }
    assert_eq!(mock.call_count(), 4);
    let prompts = mock.prompts();
    assert!((5..=10).all(|part| {
        let marker = format!("part {part}/10");
        prompts.iter().all(|p| !p.contains(&marker))
    }));
}

#[tokio::test]
async fn empty_transcript_cannot_be_chunked() {
    let mock = Arc::new(MockLlmProvider::with_handler(|_| {
        Err(LlmError::Connection("down".into()))
    }));
    let config = PipelineConfig {
        max_retries: 1,
        ..PipelineConfig::default()
    };
    let (summarizer, _) = summarizer(mock.clone(), config);

    let outcome = summarizer.summarize(&transcript(0)).await;

    match outcome {
        PipelineOutcome::TotalFailure(report) => {
            assert_eq!(report.reason, FailureReason::SingleShotFailed);
        }
        other => panic!("expected total failure, got {other:?}"),
    }
}
