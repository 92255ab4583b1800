mod helpers;

use ctxmem::fusion::{
    estimate_tokens, DedupeStrategy, FuseOptions, Fuser, OutputFormat, SourceCount,
    SourceDescriptor,
};
use ctxmem::memory::RecordType;

fn parse_sources(json: &str) -> Vec<SourceDescriptor> {
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn identical_sessions_collapse_to_one_chunk() {
    let result = Fuser::without_store()
        .fuse(&FuseOptions {
            sources: parse_sources(
                r#"[{"type": "session", "data": "Same"}, {"type": "session", "data": "Same"}]"#,
            ),
            dedupe: DedupeStrategy::Exact,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(
        result.sources,
        vec![SourceCount {
            source_type: "session".into(),
            count: 1
        }]
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["sources"][0]["type"], "session");
}

#[tokio::test]
async fn exact_dedupe_ignores_case_and_surrounding_whitespace() {
    let result = Fuser::without_store()
        .fuse(&FuseOptions {
            sources: parse_sources(
                r#"[{"type": "inline", "data": "Use tabs"}, {"type": "session", "data": "  use TABS\n"}]"#,
            ),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.content, "[inline] Use tabs");
}

#[tokio::test]
async fn semantic_dedupe_drops_near_duplicates_only() {
    let sources = parse_sources(
        r#"[
            {"type": "session", "data": "the build uses cargo workspaces with five member crates"},
            {"type": "inline", "data": "the build uses cargo workspaces with five member crates today"},
            {"type": "inline", "data": "tests run in parallel on CI"}
        ]"#,
    );

    let semantic = Fuser::without_store()
        .fuse(&FuseOptions {
            sources: sources.clone(),
            dedupe: DedupeStrategy::Semantic,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(semantic.sources.iter().map(|s| s.count).sum::<usize>(), 2);
    assert!(!semantic.content.contains("today"));

    let none = Fuser::without_store()
        .fuse(&FuseOptions {
            sources,
            dedupe: DedupeStrategy::None,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(none.sources.iter().map(|s| s.count).sum::<usize>(), 3);
}

#[tokio::test]
async fn output_never_exceeds_budget_in_any_format() {
    let long = "context ".repeat(400);
    let sources: Vec<SourceDescriptor> = (0..4)
        .map(|i| SourceDescriptor::Inline {
            data: format!("{i}: {long}"),
            weight: Some(1.0 + i as f64),
        })
        .collect();

    for format in [OutputFormat::Text, OutputFormat::Markdown, OutputFormat::Json] {
        for max_tokens in [10, 120, 900, 2000] {
            let result = Fuser::without_store()
                .fuse(&FuseOptions {
                    sources: sources.clone(),
                    max_tokens,
                    format,
                    ..Default::default()
                })
                .await
                .unwrap();
            assert!(
                result.token_count <= max_tokens,
                "{format:?} at {max_tokens}: {}",
                result.token_count
            );
            assert_eq!(result.token_count, estimate_tokens(&result.content));
        }
    }
}

#[tokio::test]
async fn oversized_chunk_is_cut_with_ellipsis() {
    let long = "x".repeat(4000);
    let result = Fuser::without_store()
        .fuse(&FuseOptions {
            sources: vec![SourceDescriptor::Inline {
                data: long,
                weight: None,
            }],
            max_tokens: 200,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(result.content.starts_with("[inline] xxx"));
    assert!(result.content.ends_with("..."));
    assert!(result.token_count <= 200);
    assert!(result.savings_percentage > 0);
}

#[tokio::test]
async fn weight_orders_output() {
    let result = Fuser::without_store()
        .fuse(&FuseOptions {
            sources: parse_sources(
                r#"[
                    {"type": "inline", "data": "background", "weight": 0.2},
                    {"type": "session", "data": "current conversation", "weight": 3}
                ]"#,
            ),
            format: OutputFormat::Markdown,
            ..Default::default()
        })
        .await
        .unwrap();

    let session = result.content.find("### SESSION").unwrap();
    let inline = result.content.find("### INLINE").unwrap();
    assert!(session < inline);
}

#[tokio::test]
async fn file_sources_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let readme = dir.path().join("README.md");
    std::fs::write(&readme, "Run `make dev` to start").unwrap();

    let sources = vec![
        SourceDescriptor::File {
            path: readme,
            weight: None,
        },
        SourceDescriptor::File {
            path: dir.path().join("missing.md"),
            weight: None,
        },
    ];
    let result = Fuser::without_store()
        .fuse(&FuseOptions {
            sources,
            format: OutputFormat::Json,
            ..Default::default()
        })
        .await
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&result.content).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], "file");
    assert_eq!(items[0]["content"], "Run `make dev` to start");
}

#[tokio::test]
async fn store_sources_respect_project_scope() {
    let mut store = helpers::project_store("p");
    helpers::add(&mut store, "Feature flags live in LaunchDarkly", RecordType::Config, &[]);

    let result = Fuser::new(&store)
        .fuse(&FuseOptions {
            sources: parse_sources(
                r#"[
                    {"type": "memory", "query": "feature flags"},
                    {"type": "memory", "query": "nonexistent topic"}
                ]"#,
            ),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.content, "[memory] [config] Feature flags live in LaunchDarkly");
    assert_eq!(result.sources.len(), 1);
}
