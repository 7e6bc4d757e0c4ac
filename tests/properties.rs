use proptest::prelude::*;
use regex_tree::{check_pattern, parse, DialectConfig, Pattern, TermId, TermKind};

fn atom() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-c]",
        Just(".".to_owned()),
        Just("\\d".to_owned()),
        Just("\\.".to_owned()),
        Just("[x-z_]".to_owned()),
        Just("[^[:digit:]]".to_owned()),
        Just("^".to_owned()),
        Just("\\b".to_owned()),
        Just("é".to_owned()),
    ]
}

fn quantifier() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["", "", "", "*", "+", "?", "{2}", "{1,}", "{1,3}", "*?"])
}

/// Syntactically valid patterns built from the supported construct set.
fn pattern_source() -> impl Strategy<Value = String> {
    let leaf = (atom(), quantifier()).prop_map(|(atom, q)| format!("{atom}{q}"));
    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|items| items.concat()),
            prop::collection::vec(inner.clone(), 2..4).prop_map(|branches| branches.join("|")),
            (inner.clone(), quantifier()).prop_map(|(body, q)| format!("({body}){q}")),
            (inner, quantifier()).prop_map(|(body, q)| format!("(?:{body}){q}")),
        ]
    })
}

fn assert_spans_nest(pattern: &Pattern, id: TermId) {
    let span = pattern.term(id).span();
    let mut previous_end = span.start;
    for (index, child) in pattern.children(id).enumerate() {
        let child_span = pattern.term(child).span();
        assert!(span.contains(child_span), "{child_span:?} outside {span:?}");
        assert!(previous_end <= child_span.start, "children overlap");
        assert_eq!(pattern.parent(child), Some(id));
        assert_eq!(pattern.term(child).child_index(), Some(index));
        assert_eq!(pattern.get_child(id, index), Some(child));
        previous_end = child_span.end;
    }
}

proptest! {
    #[test]
    fn parsed_trees_are_well_formed(source in pattern_source()) {
        let pattern = parse(&source, &DialectConfig::default()).unwrap();
        let root = pattern.root();

        prop_assert_eq!(check_pattern(&pattern).count(), 0);
        prop_assert_eq!(pattern.text(root), source.as_str());
        prop_assert_eq!(pattern.descendants(root).count(), pattern.len() - 1);
        prop_assert!(pattern.descendants(root).all(|id| id != root));

        assert_spans_nest(&pattern, root);
        for id in pattern.descendants(root) {
            assert_spans_nest(&pattern, id);
        }
    }

    #[test]
    fn literal_spans_cover_one_character(source in pattern_source()) {
        let pattern = parse(&source, &DialectConfig::default()).unwrap();

        for (id, term) in pattern.terms() {
            if let TermKind::Literal(c) = term.kind() {
                let text = pattern.text(id);
                prop_assert!(
                    text.chars().count() == 1 || text.starts_with('\\'),
                    "literal {:?} spans {:?}", c, text
                );
                if !text.starts_with('\\') {
                    prop_assert_eq!(text.chars().next(), Some(*c));
                }
            }
        }
    }

    #[test]
    fn groups_are_numbered_in_opening_order(source in pattern_source()) {
        let pattern = parse(&source, &DialectConfig::default()).unwrap();

        let groups: Vec<_> = pattern.groups().collect();
        for (position, (number, _)) in groups.iter().enumerate() {
            prop_assert_eq!(*number as usize, position + 1);
        }
        for pair in groups.windows(2) {
            let first = pattern.term(pair[0].1).span().start;
            let second = pattern.term(pair[1].1).span().start;
            prop_assert!(first < second);
        }
    }

    #[test]
    fn arbitrary_input_never_panics(source in "\\PC{0,40}") {
        if let Ok(pattern) = parse(&source, &DialectConfig::default()) {
            prop_assert_eq!(check_pattern(&pattern).count(), 0);
            prop_assert_eq!(pattern.text(pattern.root()), source.as_str());
        }
    }
}
