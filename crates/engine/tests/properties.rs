// Property-based tests for document invariants, undo/redo and filters.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use promptgrid_engine::filter::{self, Filter, FilterKind, FilterOperator};
use promptgrid_engine::{Document, Spreadsheet};

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    AddRow,
    AddColumn,
    DeleteRow(usize),
    DeleteColumn(usize),
    Update(usize, usize, String),
    Rename(usize, String),
    Resize(usize, u32),
    Prompt(usize, String),
}

fn arb_value() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"-?[0-9]{1,4}(\.[0-9]{1,2})?",
        2 => r"[a-zA-Z ]{0,8}",
        1 => Just(String::new()),
        1 => prop_oneof![Just("true".to_string()), Just("FALSE".to_string())],
        1 => r"202[0-4]-0[1-9]-[12][0-8]",
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::AddRow),
        1 => Just(Op::AddColumn),
        2 => (0usize..16).prop_map(Op::DeleteRow),
        1 => (0usize..16).prop_map(Op::DeleteColumn),
        5 => (0usize..16, 0usize..16, arb_value()).prop_map(|(r, c, v)| Op::Update(r, c, v)),
        1 => (0usize..16, "[A-Z][a-z]{0,6}").prop_map(|(c, n)| Op::Rename(c, n)),
        1 => (0usize..16, 1u32..500).prop_map(|(c, w)| Op::Resize(c, w)),
        1 => (0usize..16, "[a-z ]{0,12}").prop_map(|(c, p)| Op::Prompt(c, p)),
    ]
}

fn arb_operator() -> impl Strategy<Value = FilterOperator> {
    prop_oneof![
        Just(FilterOperator::Contains),
        Just(FilterOperator::Equals),
        Just(FilterOperator::StartsWith),
        Just(FilterOperator::EndsWith),
        Just(FilterOperator::GreaterThan),
        Just(FilterOperator::LessThan),
        Just(FilterOperator::Between),
        Just(FilterOperator::Empty),
        Just(FilterOperator::NotEmpty),
    ]
}

fn arb_kind() -> impl Strategy<Value = FilterKind> {
    prop_oneof![
        Just(FilterKind::Text),
        Just(FilterKind::Number),
        Just(FilterKind::Date),
        Just(FilterKind::Boolean),
    ]
}

fn arb_filter(cols: usize) -> impl Strategy<Value = Filter> {
    (0..cols, arb_kind(), arb_operator(), arb_value(), proptest::option::of(arb_value())).prop_map(
        |(column_index, kind, operator, value, value2)| Filter {
            column_index,
            kind,
            operator,
            value,
            value2,
        },
    )
}

/// Apply an op with indices wrapped into range, so most ops hit real cells.
fn apply(sheet: &mut Spreadsheet, op: &Op) {
    let rows = sheet.row_count();
    let cols = sheet.column_count();
    match op {
        Op::AddRow => {
            sheet.add_row();
        }
        Op::AddColumn => {
            sheet.add_column();
        }
        Op::DeleteRow(r) => {
            sheet.delete_row(r % rows).unwrap();
        }
        Op::DeleteColumn(c) => {
            sheet.delete_column(c % cols).unwrap();
        }
        Op::Update(r, c, v) => {
            sheet.update_cell(r % rows, c % cols, v).unwrap();
        }
        Op::Rename(c, n) => {
            sheet.rename_column(c % cols, n).unwrap();
        }
        Op::Resize(c, w) => {
            sheet.resize_column(c % cols, *w).unwrap();
        }
        Op::Prompt(c, p) => {
            sheet.set_prompt(c % cols, p).unwrap();
        }
    }
}

// ---------------------------------------------------------------------------
// Document + history
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn document_invariants_hold(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut sheet = Spreadsheet::new(Document::new(2, 2));
        for op in &ops {
            apply(&mut sheet, op);
            let doc = sheet.document();
            prop_assert!(doc.row_count() >= 1);
            prop_assert!(doc.column_count() >= 1);
            prop_assert!(doc.rows().iter().all(|r| r.len() == doc.column_count()));
        }
    }

    #[test]
    fn undo_redo_round_trip(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let mut sheet = Spreadsheet::new(Document::new(3, 2));
        let initial = sheet.document().clone();
        for op in &ops {
            apply(&mut sheet, op);
        }
        let final_state = sheet.document().clone();

        for _ in 0..ops.len() {
            sheet.undo();
        }
        prop_assert_eq!(sheet.document(), &initial);

        for _ in 0..ops.len() {
            sheet.redo();
        }
        prop_assert_eq!(sheet.document(), &final_state);
    }

    #[test]
    fn commit_after_undo_discards_future(
        ops in proptest::collection::vec(arb_op(), 1..20),
        value in arb_value(),
    ) {
        let mut sheet = Spreadsheet::new(Document::new(3, 2));
        for op in &ops {
            apply(&mut sheet, op);
        }
        sheet.undo();
        sheet.update_cell(0, 0, &value).unwrap();
        let after_commit = sheet.document().clone();

        prop_assert!(!sheet.redo());
        prop_assert_eq!(sheet.document(), &after_commit);
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn filtering_is_idempotent(
        cells in proptest::collection::vec(proptest::collection::vec(arb_value(), 3), 0..30),
        filters in proptest::collection::vec(arb_filter(3), 0..4),
    ) {
        let mut doc = Document::new(cells.len().max(1), 3);
        for (r, row) in cells.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                doc = doc.update_cell(r, c, v).unwrap();
            }
        }

        let once = filter::evaluate(doc.rows(), doc.columns(), &filters);
        let twice = filter::evaluate(&once, doc.columns(), &filters);
        prop_assert_eq!(&once, &twice);

        // Same inputs, same output
        let again = filter::evaluate(doc.rows(), doc.columns(), &filters);
        prop_assert_eq!(&once, &again);
    }

    #[test]
    fn filtering_keeps_input_order(
        cells in proptest::collection::vec(proptest::collection::vec(arb_value(), 2), 1..30),
        filters in proptest::collection::vec(arb_filter(2), 0..3),
    ) {
        let mut doc = Document::new(cells.len(), 2);
        for (r, row) in cells.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                doc = doc.update_cell(r, c, v).unwrap();
            }
        }

        let indices = filter::matching_rows(doc.rows(), doc.columns(), &filters);
        prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));

        // AND semantics: a row passes iff it passes every filter alone
        for (i, row) in doc.rows().iter().enumerate() {
            let all = filters.iter().all(|f| f.matches(row));
            prop_assert_eq!(indices.contains(&i), all);
        }
    }
}
