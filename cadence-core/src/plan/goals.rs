use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use super::models::{Goal, GoalArena, Program};

/// Seed ids plus every goal reachable from them through `children`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalClosure {
    ids: BTreeSet<String>,
}

impl GoalClosure {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Goals of the closure as found in `arena`, in id order.
    pub fn goals<'a>(&'a self, arena: &'a GoalArena) -> impl Iterator<Item = &'a Goal> + 'a {
        self.ids.iter().filter_map(move |id| arena.get(id))
    }
}

/// Resolves the closure of `seeds` over `arena`.
///
/// One visited set spans all seeds, so cycles and diamonds are walked once.
/// Seeds or children missing from the arena are left out.
pub fn resolve_closure<'a, I>(arena: &GoalArena, seeds: I) -> GoalClosure
where
    I: IntoIterator<Item = &'a str>,
{
    let mut visited: HashSet<&str> = HashSet::new();
    let mut ids = BTreeSet::new();
    let mut stack: Vec<&str> = Vec::new();

    for seed in seeds {
        stack.push(seed);
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(goal) = arena.get(id) else {
                debug!(target: "engine.goals", goal_id = %id, "goal not in tree, skipping");
                continue;
            };
            ids.insert(goal.id.clone());
            for child in goal.children.iter().rev() {
                if !visited.contains(child.as_str()) {
                    stack.push(child.as_str());
                }
            }
        }
    }

    GoalClosure { ids }
}

/// Closure seeded by the program's goals and every block's goals.
pub fn program_closure(program: &Program, arena: &GoalArena) -> GoalClosure {
    let seeds = program
        .goal_ids
        .iter()
        .chain(program.blocks.iter().flat_map(|block| block.goal_ids.iter()))
        .map(String::as_str);
    resolve_closure(arena, seeds)
}
