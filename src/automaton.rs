//! Multi-pattern string matching (Aho-Corasick).
//!
//! The automaton is built once from the full pattern set and frozen; after
//! `build()` it is read-only and safe to share across threads. Matching is a
//! single linear pass over the text regardless of how many patterns are
//! loaded, which is what makes scanning every transcript against a large
//! banned-phrase list cheap.
//!
//! Case-insensitivity is handled by lowercasing patterns at insertion and
//! text at search time, not by folding inside the automaton.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

const ROOT: usize = 0;

/// One trie node: child transitions, a failure link, and the ids of every
/// pattern that ends at this node or at one of its suffixes.
struct Node {
    children: HashMap<char, usize>,
    failure: usize,
    output: Vec<usize>,
}

impl Node {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            failure: ROOT,
            output: Vec::new(),
        }
    }
}

/// Mutable trie under construction. Consumed by [`AutomatonBuilder::build`],
/// so the type system guarantees no pattern is added after the failure links
/// exist.
pub struct AutomatonBuilder {
    nodes: Vec<Node>,
    patterns: Vec<String>,
}

impl Default for AutomatonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomatonBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            patterns: Vec::new(),
        }
    }

    /// Insert a pattern, lowercased. Empty patterns are skipped: a terminal
    /// root would otherwise report a match at every position of every text.
    pub fn add_pattern(&mut self, pattern: &str) {
        let pattern = pattern.to_lowercase();
        if pattern.is_empty() {
            debug!("skipping empty pattern");
            return;
        }

        let mut curr = ROOT;
        for c in pattern.chars() {
            curr = match self.nodes[curr].children.get(&c) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::new());
                    self.nodes[curr].children.insert(c, next);
                    next
                }
            };
        }

        let id = self.patterns.len();
        self.patterns.push(pattern);
        self.nodes[curr].output.push(id);
    }

    /// Compute failure links breadth-first and freeze the automaton.
    ///
    /// Each node's failure link points at the node for the longest proper
    /// suffix of its prefix that is itself a prefix of some pattern. Output
    /// sets are unioned down the failure chain, so a match of "lava chicken"
    /// also reports "chicken" when both are loaded.
    pub fn build(mut self) -> PatternAutomaton {
        let mut queue = VecDeque::new();

        // Depth-1 nodes fail to the root.
        for &child in self.nodes[ROOT].children.values() {
            queue.push_back(child);
        }

        while let Some(curr) = queue.pop_front() {
            let transitions: Vec<(char, usize)> = self.nodes[curr]
                .children
                .iter()
                .map(|(&c, &n)| (c, n))
                .collect();

            for (c, child) in transitions {
                queue.push_back(child);

                // Walk the parent's failure chain until a node with a
                // matching transition turns up, or the root is reached.
                let mut failure = self.nodes[curr].failure;
                let link = loop {
                    if let Some(&next) = self.nodes[failure].children.get(&c) {
                        break next;
                    }
                    if failure == ROOT {
                        break ROOT;
                    }
                    failure = self.nodes[failure].failure;
                };

                self.nodes[child].failure = link;

                // Inherit the link's outputs. BFS order guarantees the link
                // (strictly shallower) already has its full output set.
                let inherited = self.nodes[link].output.clone();
                self.nodes[child].output.extend(inherited);
            }
        }

        debug!(
            patterns = self.patterns.len(),
            nodes = self.nodes.len(),
            "pattern automaton built"
        );

        PatternAutomaton {
            nodes: self.nodes,
            patterns: self.patterns,
        }
    }
}

/// Frozen matching automaton. All methods take `&self`; concurrent searches
/// from multiple threads are safe.
pub struct PatternAutomaton {
    nodes: Vec<Node>,
    patterns: Vec<String>,
}

impl PatternAutomaton {
    /// Build an automaton directly from a pattern list.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = AutomatonBuilder::new();
        for pattern in patterns {
            builder.add_pattern(pattern.as_ref());
        }
        builder.build()
    }

    /// Find every occurrence of every pattern in `text`, case-insensitively.
    ///
    /// Overlapping occurrences and patterns that are suffixes of other
    /// matched patterns are all reported; the same pattern occurring at
    /// several positions appears once per position.
    pub fn find_all(&self, text: &str) -> Vec<&str> {
        let mut matches = Vec::new();
        if self.patterns.is_empty() {
            return matches;
        }

        let mut curr = ROOT;
        for c in text.to_lowercase().chars() {
            // Follow failure links until a transition for `c` exists, or we
            // bottom out at the root.
            loop {
                if let Some(&next) = self.nodes[curr].children.get(&c) {
                    curr = next;
                    break;
                }
                if curr == ROOT {
                    break;
                }
                curr = self.nodes[curr].failure;
            }

            for &id in &self.nodes[curr].output {
                matches.push(self.patterns[id].as_str());
            }
        }

        matches
    }

    /// Number of patterns loaded into the automaton.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}
