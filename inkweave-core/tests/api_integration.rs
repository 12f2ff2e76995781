//! Integration tests that call the real Gemini API.
//!
//! These tests require GEMINI_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p inkweave-core --test api_integration -- --ignored`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no API key is available
//! - Slow test runs (API calls take seconds)

use inkweave_core::testing::sample_work;
use inkweave_core::{
    references_for_ids, ConsistencyAuditor, ContextSelector, Drafter, EvolutionAnalyzer,
};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("GEMINI_API_KEY").is_ok()
}

#[tokio::test]
#[ignore] // Run with: cargo test -p inkweave-core --test api_integration -- --ignored
async fn test_smart_retrieval_with_real_api() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let provider = gemini::Gemini::from_env().expect("Failed to create client");
    let (work, aria, _blade, _plot) = sample_work();

    let selector = ContextSelector::new(provider);
    let ids = selector.smart_select(&work, "写 Aria 在月光下拔剑的场景").await;

    println!("Selected ids: {ids:?}");
    let pack = references_for_ids(&work, &ids);
    for reference in &pack.references {
        println!("Reference:\n{reference}\n");
    }

    // The model should pick Aria for an Aria-centric instruction; at minimum
    // the response must parse into valid entry ids rather than erroring
    assert!(ids.iter().any(|id| id == &aria.to_string()) || ids.is_empty());
    assert_eq!(pack.references.len(), ids.len());
}

#[tokio::test]
#[ignore]
async fn test_streaming_draft_with_real_api() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let provider = gemini::Gemini::from_env().expect("Failed to create client");
    let (work, _aria, _blade, _plot) = sample_work();

    let drafter = Drafter::new(provider);
    let mut chunks = 0;
    let mut streamed = String::new();
    let segment = drafter
        .draft_segment(
            &work,
            1,
            "用两三段续写：Aria 离开废墟，在河边扎营。",
            &[],
            Some(300),
            &mut |chunk: &str| {
                chunks += 1;
                streamed.push_str(chunk);
            },
        )
        .await
        .expect("Draft should succeed");

    println!("Received {chunks} chunks, {} chars", segment.chars().count());
    println!("{segment}");

    assert!(!segment.is_empty(), "Draft should produce text");
    assert_eq!(streamed, segment, "Sink must see exactly the returned text");
    assert!(chunks >= 1);
}

#[tokio::test]
#[ignore]
async fn test_evolution_analysis_with_real_api() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let provider = gemini::Gemini::from_env().expect("Failed to create client");
    let (work, _aria, _blade, _plot) = sample_work();

    let chapter = "Aria 在废墟深处发现了一枚黑色的星核，它散发着微弱的热量。\
                   据幸存者说，星核是旧时代的能源核心，整个废土只剩下七枚。";

    let analyzer = EvolutionAnalyzer::new(provider);
    let suggestions = analyzer
        .analyze(chapter, &work)
        .await
        .expect("Analysis should succeed");

    for suggestion in &suggestions {
        println!(
            "{:?} {:?}: {} - {}",
            suggestion.kind, suggestion.entity_type, suggestion.name, suggestion.reason
        );
    }

    // The model's judgment varies, but a chapter introducing a named artifact
    // should normally yield at least one usable suggestion
    assert!(
        suggestions.iter().all(|s| !s.name.trim().is_empty()),
        "Parsed suggestions must carry names"
    );
}

#[tokio::test]
#[ignore]
async fn test_consistency_audit_with_real_api() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let provider = gemini::Gemini::from_env().expect("Failed to create client");
    let (mut work, aria, _blade, _plot) = sample_work();
    work.entry_mut(aria).unwrap().content = "少女剑士。从小怕水，完全不会游泳。".to_string();

    let auditor = ConsistencyAuditor::new(provider);
    let report = auditor
        .audit("Aria 纵身跃入湍急的河流，轻松游到了对岸。", &work)
        .await
        .expect("Audit should succeed");

    println!("Audit report:\n{report}");
    assert!(!report.is_empty(), "Audit should produce a report");
}
