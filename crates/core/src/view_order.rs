use std::collections::{BTreeMap, BTreeSet};

use crate::ViewDefinition;

#[derive(Debug, Default)]
pub(crate) struct ViewOrder<'a> {
    pub(crate) drop_order: Vec<&'a ViewDefinition>,
    pub(crate) create_order: Vec<&'a ViewDefinition>,
}

/// Dependents are dropped before the views they select from and recreated after them.
pub(crate) fn plan_view_order(views: &[ViewDefinition]) -> ViewOrder<'_> {
    if views.is_empty() {
        return ViewOrder::default();
    }

    let by_key = views
        .iter()
        .map(|view| (view_key(&view.name), view))
        .collect::<BTreeMap<_, _>>();
    let dependency_graph = build_dependency_graph(&by_key);
    let nodes = by_key.keys().cloned().collect::<BTreeSet<_>>();

    let create_keys = topological_order(&nodes, &dependency_graph);
    let create_order = create_keys
        .iter()
        .filter_map(|key| by_key.get(key).copied())
        .collect::<Vec<_>>();
    let mut drop_order = create_order.clone();
    drop_order.reverse();

    ViewOrder {
        drop_order,
        create_order,
    }
}

fn view_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn build_dependency_graph(
    views_by_key: &BTreeMap<String, &ViewDefinition>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut dependency_graph = BTreeMap::new();

    for (key, view) in views_by_key {
        let dependencies = extract_relation_references(query_body(&view.create_sql))
            .into_iter()
            .filter(|reference| reference != key && views_by_key.contains_key(reference))
            .collect::<BTreeSet<_>>();
        dependency_graph.insert(key.clone(), dependencies);
    }

    dependency_graph
}

fn topological_order(
    nodes: &BTreeSet<String>,
    dependency_graph: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<String> {
    let mut dependency_count = BTreeMap::new();
    let mut reverse_edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for node in nodes {
        let dependencies = dependency_graph
            .get(node)
            .map(|dependencies| {
                dependencies
                    .iter()
                    .filter(|dependency| nodes.contains(*dependency))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        dependency_count.insert(node.clone(), dependencies.len());
        for dependency in dependencies {
            reverse_edges
                .entry(dependency.clone())
                .or_default()
                .insert(node.clone());
        }
    }

    let mut ready = dependency_count
        .iter()
        .filter_map(|(node, count)| (*count == 0).then_some(node.clone()))
        .collect::<BTreeSet<_>>();
    let mut ordered = Vec::new();
    let mut visited = BTreeSet::new();

    while let Some(node) = ready.pop_first() {
        if !visited.insert(node.clone()) {
            continue;
        }
        ordered.push(node.clone());

        for dependent in reverse_edges.get(&node).into_iter().flatten() {
            if let Some(count) = dependency_count.get_mut(dependent)
                && *count > 0
            {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent.clone());
                }
            }
        }
    }

    // cycles cannot be created by the engines, but keep every view either way
    for node in nodes {
        if !visited.contains(node) {
            ordered.push(node.clone());
        }
    }

    ordered
}

fn query_body(create_sql: &str) -> &str {
    let lowered = create_sql.to_ascii_lowercase();
    lowered
        .find(" as ")
        .map_or(create_sql, |offset| &create_sql[offset + 4..])
}

fn extract_relation_references(query: &str) -> Vec<String> {
    let mut references = Vec::new();
    let mut expect_relation = false;

    for token in query.split_whitespace() {
        if expect_relation {
            if is_relation_modifier(token) {
                continue;
            }
            if let Some(reference) = parse_relation_token(token) {
                references.push(reference);
            }
            expect_relation = false;
            continue;
        }

        if is_relation_keyword(token) {
            expect_relation = true;
        }
    }

    references
}

fn is_relation_keyword(token: &str) -> bool {
    let normalized = normalize_token(token);
    normalized.eq_ignore_ascii_case("from") || normalized.eq_ignore_ascii_case("join")
}

fn is_relation_modifier(token: &str) -> bool {
    let normalized = normalize_token(token);
    normalized.eq_ignore_ascii_case("only") || normalized.eq_ignore_ascii_case("lateral")
}

fn parse_relation_token(token: &str) -> Option<String> {
    let normalized = normalize_token(token);
    if normalized.is_empty() || normalized.starts_with('(') {
        return None;
    }

    let name = normalized.rsplit('.').next()?;
    let unquoted = name
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .or_else(|| {
            name.strip_prefix('`')
                .and_then(|value| value.strip_suffix('`'))
        })
        .unwrap_or(name);

    (!unquoted.is_empty()).then(|| view_key(unquoted))
}

fn normalize_token(token: &str) -> &str {
    token.trim_matches(|ch: char| matches!(ch, ',' | ';' | ')' | '('))
}
