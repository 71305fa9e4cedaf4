use proptest::prelude::*;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use logscan::indexing::{IndexOperation, LineIndex, OperationContext, OperationResult};
use logscan::search::{CompileOptions, CompiledExpression, Pattern};
use logscan::IndexingConfig;

fn run(operation: IndexOperation, path: &Path, index: &LineIndex, block_size: usize) -> OperationResult {
    let interrupt = AtomicBool::new(false);
    let config = IndexingConfig {
        block_size,
        ..IndexingConfig::default()
    };
    let ctx = OperationContext {
        path,
        index,
        interrupt: &interrupt,
        config: &config,
    };
    operation.run(&ctx, &mut |_| {})
}

fn full_index(path: &Path, block_size: usize) -> LineIndex {
    let index = LineIndex::new();
    let result = run(
        IndexOperation::FullIndex { forced_encoding: None },
        path,
        &index,
        block_size,
    );
    assert_eq!(result, OperationResult::Completed(true));
    index
}

/// Everything observable about an index
fn snapshot(index: &LineIndex) -> (Vec<u64>, u64, u64, blake3::Hash) {
    let reader = index.read();
    let ends = (0..reader.line_count())
        .map(|n| reader.position_of_line(n).unwrap())
        .collect();
    (
        ends,
        reader.max_line_length(),
        reader.indexed_size(),
        reader.hash().full_digest,
    )
}

fn log_text() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec("[a-z\t é€]{0,12}(\n|\r\n)", 0..20)
        .prop_map(|lines| lines.concat().into_bytes())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn block_size_does_not_change_the_index(
        content in log_text(),
        tail in "[a-z]{0,5}",
        block_size in 1usize..40,
    ) {
        let mut content = content;
        content.extend_from_slice(tail.as_bytes());
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, &content).unwrap();

        let reference = snapshot(&full_index(&path, 1 << 20));
        let blocked = snapshot(&full_index(&path, block_size));
        prop_assert_eq!(blocked, reference);
    }

    #[test]
    fn partial_index_equals_full_index(
        head in log_text(),
        appended in log_text(),
        block_size in 1usize..40,
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, &head).unwrap();
        let index = full_index(&path, block_size);

        let mut whole = head.clone();
        whole.extend_from_slice(&appended);
        std::fs::write(&path, &whole).unwrap();
        let result = run(IndexOperation::PartialIndex, &path, &index, block_size);
        prop_assert_eq!(result, OperationResult::Completed(true));

        prop_assert_eq!(snapshot(&index), snapshot(&full_index(&path, block_size)));
    }

    #[test]
    fn exclude_is_the_negation_of_include(
        pattern in "[a-c]{1,3}|[a-c]\\.[a-c]|\\^?[a-c]+\\$?",
        case_sensitive in any::<bool>(),
        line in "[a-cA-C. ]{0,16}",
    ) {
        let include = Pattern::with_flags(pattern.as_str(), case_sensitive, false);
        let exclude = Pattern::with_flags(pattern.as_str(), case_sensitive, true);
        let mut include = CompiledExpression::compile(&include).unwrap().create_matcher();
        let mut exclude = CompiledExpression::compile(&exclude).unwrap().create_matcher();
        prop_assert_eq!(exclude.has_match_str(&line), !include.has_match_str(&line));
    }

    #[test]
    fn engines_agree_on_literals(
        literals in prop::collection::vec(("[a-dA-D ]{1,4}", any::<bool>()), 1..4),
        case_sensitive in any::<bool>(),
        line in "[a-dA-D ]{0,24}",
    ) {
        let patterns: Vec<Pattern> = literals
            .iter()
            .map(|(text, exclude)| Pattern::with_flags(text.as_str(), case_sensitive, *exclude))
            .collect();
        let fast = CompiledExpression::compile_with(&patterns, CompileOptions { allow_automaton: true }).unwrap();
        let slow = CompiledExpression::compile_with(&patterns, CompileOptions { allow_automaton: false }).unwrap();
        prop_assert_eq!(
            fast.create_matcher().has_match_str(&line),
            slow.create_matcher().has_match_str(&line)
        );
    }
}
