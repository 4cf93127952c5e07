//! Strongly connected components over shape-ID graphs.

use std::collections::{BTreeMap, BTreeSet};

use trellis_core::ShapeId;

/// Tarjan's algorithm, iterative so deep containment chains cannot overflow
/// the call stack. Nodes are the map's keys; edges to nodes outside the key
/// set are ignored. Components come out with members sorted, and the
/// component list itself is sorted by first member, so diagnostic order is
/// stable.
pub fn strongly_connected_components(
    edges: &BTreeMap<ShapeId, Vec<ShapeId>>,
) -> Vec<Vec<ShapeId>> {
    let mut index_of: BTreeMap<ShapeId, usize> = BTreeMap::new();
    let mut lowlink: BTreeMap<ShapeId, usize> = BTreeMap::new();
    let mut on_stack: BTreeSet<ShapeId> = BTreeSet::new();
    let mut stack: Vec<ShapeId> = Vec::new();
    let mut components: Vec<Vec<ShapeId>> = Vec::new();
    let mut next_index = 0usize;

    for start in edges.keys() {
        if index_of.contains_key(start) {
            continue;
        }
        let mut frames: Vec<(ShapeId, usize)> = Vec::new();
        visit(start.clone(), &mut next_index, &mut index_of, &mut lowlink, &mut stack, &mut on_stack);
        frames.push((start.clone(), 0));

        while let Some((node, cursor)) = frames.last().cloned() {
            let successors = &edges[&node];
            if cursor < successors.len() {
                frames.last_mut().unwrap().1 += 1;
                let succ = &successors[cursor];
                if !edges.contains_key(succ) {
                    continue;
                }
                if !index_of.contains_key(succ) {
                    visit(
                        succ.clone(),
                        &mut next_index,
                        &mut index_of,
                        &mut lowlink,
                        &mut stack,
                        &mut on_stack,
                    );
                    frames.push((succ.clone(), 0));
                } else if on_stack.contains(succ) {
                    let succ_index = index_of[succ];
                    let low = lowlink.get_mut(&node).unwrap();
                    *low = (*low).min(succ_index);
                }
            } else {
                frames.pop();
                let node_low = lowlink[&node];
                if let Some((parent, _)) = frames.last() {
                    let low = lowlink.get_mut(parent).unwrap();
                    *low = (*low).min(node_low);
                }
                if node_low == index_of[&node] {
                    let mut component = Vec::new();
                    loop {
                        let popped = stack.pop().expect("scc stack underflow");
                        on_stack.remove(&popped);
                        let done = popped == node;
                        component.push(popped);
                        if done {
                            break;
                        }
                    }
                    component.sort();
                    components.push(component);
                }
            }
        }
    }

    components.sort();
    components
}

fn visit(
    node: ShapeId,
    next_index: &mut usize,
    index_of: &mut BTreeMap<ShapeId, usize>,
    lowlink: &mut BTreeMap<ShapeId, usize>,
    stack: &mut Vec<ShapeId>,
    on_stack: &mut BTreeSet<ShapeId>,
) {
    index_of.insert(node.clone(), *next_index);
    lowlink.insert(node.clone(), *next_index);
    *next_index += 1;
    stack.push(node.clone());
    on_stack.insert(node);
}

/// Whether a component is an actual cycle: more than one member, or a
/// single member with a self-edge.
pub fn is_cycle(component: &[ShapeId], edges: &BTreeMap<ShapeId, Vec<ShapeId>>) -> bool {
    match component {
        [single] => edges
            .get(single)
            .map(|succs| succs.contains(single))
            .unwrap_or(false),
        _ => component.len() > 1,
    }
}
