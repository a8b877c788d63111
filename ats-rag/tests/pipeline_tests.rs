//! End-to-end rating tests with deterministic providers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ats_rag::{
    CompletionProvider, CompletionRequest, EmbeddingProvider, FailurePolicy, MatchLevel,
    RatingConfig, RatingError, RatingPipeline, RatingRequest, Result,
};

const RESUME: &str = "JANE DOE\nSenior Backend Engineer\n\n\
    EXPERIENCE\nAcme Corp (2019-2024). Five years building backend services in Go and Python. \
    Led a team of 4 engineers through two platform migrations.\n\n\
    EDUCATION\nBSc Computer Science.\n\n\
    Skills:\nGo, Python, PostgreSQL, Kafka";

const KEYWORDS: [&str; 5] = ["backend", "team", "led", "mandarin", "python"];

/// Multi-hot keyword embedding with a bias component so no vector is zero.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut v: Vec<f32> =
            KEYWORDS.iter().map(|k| if lower.contains(k) { 1.0 } else { 0.0 }).collect();
        v.push(0.2);
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len() + 1
    }
}

/// The requirement text quoted on the second line of a judgment prompt.
fn requirement_of(prompt: &str) -> String {
    prompt.lines().nth(1).unwrap_or_default().trim_matches('"').to_string()
}

/// The first excerpt id shown in a judgment prompt.
fn first_excerpt(prompt: &str) -> Option<String> {
    let start = prompt.find("\n[chunk_")? + 2;
    let end = prompt[start..].find(']')? + start;
    Some(prompt[start..end].to_string())
}

/// Judges by keyword: requirements mentioning Mandarin get NONE, the rest
/// STRONG. Always adds a citation that was never shown.
#[derive(Default)]
struct KeywordJudge {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for KeywordJudge {
    fn name(&self) -> &str {
        "keyword-judge"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let requirement = requirement_of(&request.prompt);
        let cited = first_excerpt(&request.prompt).unwrap_or_default();
        let (level, cited) = if requirement.contains("Mandarin") {
            ("NONE", Vec::new())
        } else {
            ("STRONG", vec![cited, "chunk_99".to_string()])
        };
        Ok(serde_json::json!({
            "match_level": level,
            "rationale": format!("judged {requirement}"),
            "cited_chunk_ids": cited,
        })
        .to_string())
    }
}

/// Fails every requirement whose text contains `needle`.
struct FlakyJudge {
    needle: &'static str,
}

#[async_trait]
impl CompletionProvider for FlakyJudge {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if requirement_of(&request.prompt).contains(self.needle) {
            return Err(RatingError::Completion {
                provider: "flaky".into(),
                message: "connection reset".into(),
            });
        }
        Ok(r#"{"match_level": "STRONG", "rationale": "ok", "cited_chunk_ids": []}"#.to_string())
    }
}

/// Returns queued responses in order, then prose forever.
struct ScriptedJudge {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedJudge {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.lock().unwrap().pop().unwrap_or_else(|| "I think so.".to_string()))
    }
}

/// Never answers.
struct HangingJudge;

#[async_trait]
impl CompletionProvider for HangingJudge {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        std::future::pending().await
    }
}

/// Records the peak number of overlapping calls.
#[derive(Default)]
struct CountingJudge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for CountingJudge {
    fn name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(r#"{"match_level": "PARTIAL", "rationale": "", "cited_chunk_ids": []}"#.to_string())
    }
}

fn small_chunks() -> RatingConfig {
    RatingConfig::builder().chunk_size(120).chunk_overlap(16).top_k(2).build().unwrap()
}

fn pipeline(
    config: RatingConfig,
    embedder: Arc<KeywordEmbedder>,
    judge: Arc<dyn CompletionProvider>,
) -> RatingPipeline {
    RatingPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .completion_provider(judge)
        .build()
        .unwrap()
}

fn request(requirements: &[&str]) -> RatingRequest {
    RatingRequest {
        resume_text: RESUME.to_string(),
        requirements: requirements.iter().map(|r| r.to_string()).collect(),
    }
}

fn scenario() -> RatingRequest {
    request(&["3+ years backend experience", "team leadership experience", "fluent in Mandarin"])
}

#[tokio::test]
async fn backend_leadership_mandarin_scenario_scores_67() {
    let judge = Arc::new(KeywordJudge::default());
    let pipeline = pipeline(small_chunks(), Arc::new(KeywordEmbedder::default()), judge.clone());

    let report = pipeline.rate(&scenario()).await.unwrap();

    assert_eq!(report.overall_score(), 67);
    let levels: Vec<_> = report.verdicts().iter().map(|v| v.match_level).collect();
    assert_eq!(levels, vec![MatchLevel::Strong, MatchLevel::Strong, MatchLevel::None]);
    let ids: Vec<_> = report.verdicts().iter().map(|v| v.requirement_id.as_str()).collect();
    assert_eq!(ids, vec!["req_1", "req_2", "req_3"]);
    assert_eq!(report.summary().gaps, vec!["fluent in Mandarin"]);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn report_ids_follow_input_positions_and_carry_requirement_texts() {
    let judge = Arc::new(KeywordJudge::default());
    let pipeline = pipeline(small_chunks(), Arc::new(KeywordEmbedder::default()), judge);

    let report = pipeline
        .rate(&request(&["3+ years backend experience", "  ", "fluent in Mandarin"]))
        .await
        .unwrap();

    let ids: Vec<_> = report.verdicts().iter().map(|v| v.requirement_id.as_str()).collect();
    assert_eq!(ids, vec!["req_1", "req_3"]);
    assert_eq!(report.requirement_text("req_3"), Some("fluent in Mandarin"));
    assert_eq!(report.requirement_text("req_2"), None);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["requirements"][1]["id"], "req_3");
    assert_eq!(json["requirements"][1]["text"], "fluent in Mandarin");
}

#[tokio::test]
async fn citations_never_leave_the_supplied_evidence() {
    let judge = Arc::new(KeywordJudge::default());
    let pipeline = pipeline(small_chunks(), Arc::new(KeywordEmbedder::default()), judge.clone());

    let report = pipeline.rate(&scenario()).await.unwrap();

    let prompts = judge.prompts.lock().unwrap().clone();
    for verdict in report.verdicts() {
        assert!(!verdict.cited_chunk_ids.contains(&"chunk_99".to_string()));
        let prompt = prompts
            .iter()
            .find(|p| {
                let requirement = requirement_of(p);
                verdict.rationale.ends_with(requirement.as_str())
            })
            .unwrap();
        for id in &verdict.cited_chunk_ids {
            assert!(prompt.contains(&format!("[{id}]")), "{id} was not shown to the model");
        }
    }
}

#[tokio::test]
async fn judgment_prompt_carries_only_top_k_excerpts() {
    let judge = Arc::new(KeywordJudge::default());
    let pipeline = pipeline(small_chunks(), Arc::new(KeywordEmbedder::default()), judge.clone());

    pipeline.rate(&scenario()).await.unwrap();

    for prompt in judge.prompts.lock().unwrap().iter() {
        assert_eq!(prompt.matches("\n[chunk_").count(), 2);
        assert!(!prompt.contains("JANE DOE\nSenior Backend Engineer\n\nEXPERIENCE"));
    }
}

#[tokio::test]
async fn rating_is_idempotent() {
    let pipeline = pipeline(
        small_chunks(),
        Arc::new(KeywordEmbedder::default()),
        Arc::new(KeywordJudge::default()),
    );

    let first = pipeline.rate(&scenario()).await.unwrap();
    let second = pipeline.rate(&scenario()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn empty_resume_fails_before_any_model_call() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let judge = Arc::new(KeywordJudge::default());
    let pipeline = pipeline(RatingConfig::default(), embedder.clone(), judge.clone());

    for resume_text in ["", "  \n\t\u{00A0}\r\n "] {
        let err = pipeline
            .rate(&RatingRequest {
                resume_text: resume_text.to_string(),
                requirements: vec!["3+ years backend experience".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RatingError::EmptyDocument));
    }

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_requirements_is_an_error_not_a_score() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let judge = Arc::new(KeywordJudge::default());
    let pipeline = pipeline(RatingConfig::default(), embedder.clone(), judge.clone());

    for requirements in [vec![], vec!["   ", ""]] {
        let err = pipeline.rate(&request(&requirements)).await.unwrap_err();
        assert!(matches!(err, RatingError::NoRequirements));
    }
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_judgment_fails_the_whole_report_by_default() {
    let pipeline = pipeline(
        small_chunks(),
        Arc::new(KeywordEmbedder::default()),
        Arc::new(FlakyJudge { needle: "Mandarin" }),
    );

    let err = pipeline.rate(&scenario()).await.unwrap_err();
    match err {
        RatingError::ModelUnavailable { requirement_id, evidence_ids, message } => {
            assert_eq!(requirement_id, "req_3");
            assert_eq!(evidence_ids.len(), 2);
            assert!(message.contains("connection reset"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_judgment_is_reported_in_place_when_configured() {
    let config = RatingConfig::builder()
        .chunk_size(120)
        .chunk_overlap(16)
        .top_k(2)
        .failure_policy(FailurePolicy::MarkUnknown)
        .build()
        .unwrap();
    let pipeline = pipeline(
        config,
        Arc::new(KeywordEmbedder::default()),
        Arc::new(FlakyJudge { needle: "team" }),
    );

    let report = pipeline.rate(&scenario()).await.unwrap();

    let levels: Vec<_> = report.verdicts().iter().map(|v| v.match_level).collect();
    assert_eq!(levels, vec![MatchLevel::Strong, MatchLevel::Unknown, MatchLevel::Strong]);
    assert_eq!(report.overall_score(), 100);
    assert_eq!(report.summary().unknown, 1);
}

#[tokio::test]
async fn malformed_answer_is_retried_once() {
    let judge = Arc::new(ScriptedJudge::new(&[
        "Sure! The candidate is a strong match.",
        r#"```json
{"match_level": "PARTIAL", "rationale": "Backend work, no years stated", "cited_chunk_ids": []}
```"#,
    ]));
    let pipeline = pipeline(small_chunks(), Arc::new(KeywordEmbedder::default()), judge.clone());

    let report = pipeline.rate(&request(&["3+ years backend experience"])).await.unwrap();

    assert_eq!(report.verdicts()[0].match_level, MatchLevel::Partial);
    assert_eq!(report.overall_score(), 50);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistently_malformed_answer_is_unparsable() {
    let judge = Arc::new(ScriptedJudge::new(&[]));
    let pipeline = pipeline(small_chunks(), Arc::new(KeywordEmbedder::default()), judge.clone());

    let err = pipeline.rate(&request(&["3+ years backend experience"])).await.unwrap_err();

    match err {
        RatingError::UnparsableJudgment { requirement_id, response, .. } => {
            assert_eq!(requirement_id, "req_1");
            assert_eq!(response, "I think so.");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_model_times_out_as_unavailable() {
    let config = RatingConfig::builder()
        .completion_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let pipeline =
        pipeline(config, Arc::new(KeywordEmbedder::default()), Arc::new(HangingJudge));

    let err = pipeline.rate(&request(&["3+ years backend experience"])).await.unwrap_err();
    assert!(matches!(err, RatingError::ModelUnavailable { .. }));
}

#[tokio::test(start_paused = true)]
async fn cancellation_yields_no_partial_report() {
    let pipeline = pipeline(
        RatingConfig::default(),
        Arc::new(KeywordEmbedder::default()),
        Arc::new(HangingJudge),
    );

    let err = pipeline
        .rate_until(&scenario(), tokio::time::sleep(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, RatingError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn judgments_respect_the_concurrency_bound() {
    let judge = Arc::new(CountingJudge::default());
    let config = RatingConfig::builder().max_concurrency(2).build().unwrap();
    let pipeline = pipeline(config, Arc::new(KeywordEmbedder::default()), judge.clone());

    let report = pipeline
        .rate(&request(&["backend", "python", "team", "kafka", "postgres", "go"]))
        .await
        .unwrap();

    assert_eq!(report.verdicts().len(), 6);
    assert_eq!(judge.peak.load(Ordering::SeqCst), 2);
}

#[test]
fn builder_requires_both_providers() {
    let err = RatingPipeline::builder()
        .embedding_provider(Arc::new(KeywordEmbedder::default()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RatingError::Config(_)));
}
