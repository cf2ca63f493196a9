//! Integration tests for the content classification pipeline.

use aura::classifier::{ArtifactKind, ClassifyOptions, ContentClassifier};
use aura::config::ArtifactFlags;

fn classify(text: &str) -> aura::classifier::Classification {
    ContentClassifier::new().classify(text, &ClassifyOptions::default())
}

#[test]
fn code_block_and_table_extract_in_order() {
    let text = "Here are both:\n\
        ```python\n\
        def f(): pass\n\
        ```\n\
        \n\
        | id | name | score |\n\
        |----|------|-------|\n\
        | 1  | ana  | 90    |\n\
        | 2  | bo   | 85    |\n\
        | 3  | cy   | 70    |\n";

    let result = classify(text);

    assert_eq!(result.artifacts.len(), 2);
    assert_eq!(result.artifacts[0].kind, ArtifactKind::Code);
    assert_eq!(result.artifacts[0].language.as_deref(), Some("python"));
    assert_eq!(result.artifacts[1].kind, ArtifactKind::Table);
    assert_eq!(result.artifacts[1].metadata["row_count"], 3);
    // Artifacts are additive: the text itself is untouched
    assert_eq!(result.cleaned_text, text);
}

#[test]
fn detection_order_is_stable() {
    let text = "```rust\nfn main() {}\n```\n\
        \n\
        | a | b | c |\n\
        |---|---|---|\n\
        | 1 | 2 | 3 |\n\
        | 4 | 5 | 6 |\n\
        | 7 | 8 | 9 |\n\
        \n\
        ```mermaid\ngraph TD\n  A --> B\n```\n\
        \n\
        The identity $$x^2 - y^2 = (x-y)(x+y)$$ holds.\n";

    let result = classify(text);
    let kinds: Vec<ArtifactKind> = result.artifacts.iter().map(|a| a.kind).collect();

    // code first, then tables, diagrams, then math
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::Code,
            ArtifactKind::Table,
            ArtifactKind::Mermaid,
            ArtifactKind::Markdown,
        ]
    );
}

#[test]
fn cap_preserves_detection_order() {
    let mut text = String::new();
    for i in 0..4 {
        text.push_str(&format!("```python\ndef f{}(): pass\n```\n", i));
    }
    text.push_str("\n| a | b | c |\n|---|---|---|\n| 1 | 2 | 3 |\n| 4 | 5 | 6 |\n| 7 | 8 | 9 |\n");

    let classifier = ContentClassifier::new();
    let opts = ClassifyOptions {
        max_artifacts: 4,
        ..Default::default()
    };
    let result = classifier.classify(&text, &opts);

    assert_eq!(result.artifacts.len(), 4);
    // The four code blocks fill the cap before the table is reached
    assert!(result.artifacts.iter().all(|a| a.kind == ArtifactKind::Code));
}

#[test]
fn each_stage_independently_togglable() {
    let text = "```python\ndef f(): pass\n```\n\
        \n\
        | a | b | c |\n\
        |---|---|---|\n\
        | 1 | 2 | 3 |\n\
        | 4 | 5 | 6 |\n\
        | 7 | 8 | 9 |\n";

    let classifier = ContentClassifier::new();

    let code_only = ClassifyOptions {
        flags: ArtifactFlags {
            tables: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = classifier.classify(text, &code_only);
    assert!(result.artifacts.iter().all(|a| a.kind == ArtifactKind::Code));

    let tables_only = ClassifyOptions {
        flags: ArtifactFlags {
            code: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = classifier.classify(text, &tables_only);
    assert!(result.artifacts.iter().all(|a| a.kind == ArtifactKind::Table));
}

#[test]
fn context_stage_requires_user_trigger() {
    // An endpoint listing is only extractable by the context stage
    let response = "Use GET /stats/monthly to fetch the numbers.";
    let classifier = ContentClassifier::new();

    let without = classifier.classify(response, &ClassifyOptions::default());
    assert!(without.artifacts.is_empty());

    let with = classifier.classify(
        response,
        &ClassifyOptions {
            user_message: Some("document the api for me".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(with.artifacts.len(), 1);
    assert_eq!(with.artifacts[0].kind, ArtifactKind::Markdown);
    assert_eq!(with.artifacts[0].metadata["endpoint_count"], 1);
}

#[test]
fn number_array_is_data_without_trigger_and_not_duplicated_with_one() {
    let response = "Quarterly numbers: [10, 20, 30, 40]";
    let classifier = ContentClassifier::new();

    // The data stage already claims a substantial array
    let without = classifier.classify(response, &ClassifyOptions::default());
    assert_eq!(without.artifacts.len(), 1);
    assert_eq!(without.artifacts[0].kind, ArtifactKind::Json);

    // With a chart trigger the context stage would fire too, but the
    // overlapping extraction is deduplicated
    let with = classifier.classify(
        response,
        &ClassifyOptions {
            user_message: Some("plot the quarterly numbers".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(with.artifacts.len(), 1);
}

#[test]
fn confidence_is_bounded_and_monotone_ish() {
    let empty = classify("plain prose with nothing structured in it");
    assert_eq!(empty.confidence, 0.0);

    let one = classify("```python\ndef f(): pass\n```");
    let many = classify(
        "```python\ndef f(): pass\n```\n```mermaid\ngraph TD\n  A --> B\n```\n$$a^2+b^2=c^2$$",
    );
    assert!(one.confidence > 0.0);
    assert!(many.confidence > one.confidence);
    assert!(many.confidence <= 1.0);
}

#[test]
fn classifier_never_panics_on_adversarial_input() {
    let classifier = ContentClassifier::new();
    let inputs = [
        String::new(),
        "`".repeat(500),
        "|".repeat(500),
        "$".repeat(501),
        "{".repeat(300) + &"}".repeat(100),
        "```json\n".repeat(40),
        "a --> b\n".repeat(1000),
        "🦀".repeat(2000),
    ];

    for input in &inputs {
        let result = classifier.classify(input, &ClassifyOptions::default());
        assert!(result.artifacts.len() <= 8);
        assert!((0.0..=1.0).contains(&result.confidence));
    }
}
