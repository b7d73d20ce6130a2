// src/cycle.rs

//! C3 CycleFinder: Tarjan's strongly-connected-components algorithm over
//! the "replicates-from" relation (§4.3).

use crate::node::Node;

struct TarjanState {
    index_counter: usize,
    indices: Vec<Option<usize>>,
    low_links: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    sccs: Vec<Vec<usize>>,
}

/// Finds every strongly-connected component of size >= 2 in the
/// "replicates-from" graph (i.e. following `parents` edges) and assigns
/// each member a shared cycle id, numbered starting at 1 for this run.
/// Single-node "cycles" are not of interest (§GLOSSARY "Cycle").
///
/// Members of each cycle are sorted by `config_index` for deterministic
/// reporting (§4.3).
pub fn find_cycles(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        node.cycle_id = None;
    }

    let n = nodes.len();
    let mut state = TarjanState {
        index_counter: 0,
        indices: vec![None; n],
        low_links: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        sccs: Vec::new(),
    };

    for start in 0..n {
        if state.indices[start].is_none() {
            strong_connect(nodes, start, &mut state);
        }
    }

    let mut next_cycle_id: u32 = 1;
    for mut members in state.sccs {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|&idx| nodes[idx].config_index);
        for &idx in &members {
            nodes[idx].cycle_id = Some(next_cycle_id);
        }
        next_cycle_id += 1;
    }
}

/// Recursive Tarjan visit. Cluster sizes monitored by this component are
/// small (tens of nodes), so recursion depth is not a practical concern;
/// see Design Note in §9 about addressing nodes by index.
fn strong_connect(nodes: &[Node], v: usize, state: &mut TarjanState) {
    state.indices[v] = Some(state.index_counter);
    state.low_links[v] = state.index_counter;
    state.index_counter += 1;
    state.stack.push(v);
    state.on_stack[v] = true;

    for &w in &nodes[v].parents {
        if state.indices[w].is_none() {
            strong_connect(nodes, w, state);
            state.low_links[v] = state.low_links[v].min(state.low_links[w]);
        } else if state.on_stack[w] {
            state.low_links[v] = state.low_links[v].min(state.indices[w].expect("visited"));
        }
    }

    if state.low_links[v] == state.indices[v].expect("visited") {
        let mut members = Vec::new();
        loop {
            let w = state.stack.pop().expect("scc root must be on stack");
            state.on_stack[w] = false;
            members.push(w);
            if w == v {
                break;
            }
        }
        state.sccs.push(members);
    }
}
