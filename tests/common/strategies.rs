use proptest::prelude::*;

/// Strategy for generating valid service names
pub fn service_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Acyclic service graphs as `(name, dependencies)` in a shuffled
/// registration order.
///
/// Node `i` may only depend on nodes with a lower index, which rules out
/// cycles; shuffling keeps registration order independent of that index.
pub fn acyclic_service_graph_strategy() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1usize..24)
        .prop_flat_map(|size| {
            let edges = (0..size)
                .map(|index| prop::collection::vec(0..index.max(1), 0..=index.min(4)))
                .collect::<Vec<_>>();
            (Just(size), edges)
        })
        .prop_map(|(size, edges)| {
            (0..size)
                .map(|index| {
                    let mut dependencies: Vec<String> = edges[index]
                        .iter()
                        .filter(|dependency| **dependency < index)
                        .map(|dependency| format!("svc_{dependency}"))
                        .collect();
                    dependencies.sort();
                    dependencies.dedup();
                    (format!("svc_{index}"), dependencies)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Strategy for generating retry budgets
pub fn retry_count_strategy() -> impl Strategy<Value = u32> {
    0u32..=4
}
