//! Prefix map: a trie over dot-separated address segments.
//!
//! Every routing table in the node is built on this. Each trie node is one
//! address segment, so `resolve("g.a.b.c")` costs at most four steps no
//! matter how many prefixes are stored.
//!
//! `g.a` and `g.a.b` are independent entries, and `g.a` is NOT a prefix of
//! `g.ab`: containment is always on whole segments.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Node<V> {
    value: Option<V>,
    children: BTreeMap<String, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<V> Node<V> {
    fn is_vacant(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }
}

/// Map from hierarchical address prefixes to values.
///
/// The empty string is the root prefix and matches every address.
#[derive(Debug, Clone)]
pub struct PrefixMap<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for PrefixMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PrefixMap<V> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }

    /// Number of stored prefixes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` at exactly `prefix`. Returns the value it replaced.
    pub fn insert(&mut self, prefix: &str, value: V) -> Option<V> {
        let mut node = &mut self.root;
        for segment in segments(prefix) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Remove the entry stored at exactly `prefix`. No-op if absent.
    ///
    /// Trie nodes left without a value or children are pruned.
    pub fn remove(&mut self, prefix: &str) -> Option<V> {
        let path: Vec<&str> = segments(prefix).collect();
        let removed = remove_at(&mut self.root, &path);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Exact lookup.
    pub fn get(&self, prefix: &str) -> Option<&V> {
        self.node(prefix)?.value.as_ref()
    }

    pub fn get_mut(&mut self, prefix: &str) -> Option<&mut V> {
        let mut node = &mut self.root;
        for segment in segments(prefix) {
            node = node.children.get_mut(segment)?;
        }
        node.value.as_mut()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.get(prefix).is_some()
    }

    /// Longest-prefix match: the value stored at the longest prefix of
    /// `address`, if any.
    pub fn resolve(&self, address: &str) -> Option<&V> {
        self.resolve_entry(address).map(|(_, value)| value)
    }

    /// Like [`resolve`](Self::resolve) but also returns the matched prefix.
    pub fn resolve_entry<'a, 'b>(&'a self, address: &'b str) -> Option<(&'b str, &'a V)> {
        let mut node = &self.root;
        let mut best = node.value.as_ref().map(|value| (0, value));
        let mut end = 0;

        for (i, segment) in segments(address).enumerate() {
            let Some(child) = node.children.get(segment) else {
                break;
            };
            end += segment.len() + usize::from(i > 0);
            node = child;
            if let Some(value) = node.value.as_ref() {
                best = Some((end, value));
            }
        }

        best.map(|(end, value)| (&address[..end], value))
    }

    /// Every stored prefix, in segment order.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len);
        collect(&self.root, String::new(), 0, &mut |key, _| out.push(key));
        out
    }

    /// Every stored prefix equal to or below `prefix`.
    pub fn keys_starting_with(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.node(prefix) {
            collect(node, prefix.to_string(), depth(prefix), &mut |key, _| out.push(key));
        }
        out
    }

    /// Every (prefix, value) pair, in segment order.
    pub fn entries(&self) -> Vec<(String, &V)> {
        let mut out = Vec::with_capacity(self.len);
        collect(&self.root, String::new(), 0, &mut |key, value| out.push((key, value)));
        out
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
        self.len = 0;
    }

    fn node(&self, prefix: &str) -> Option<&Node<V>> {
        let mut node = &self.root;
        for segment in segments(prefix) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }
}

fn remove_at<V>(node: &mut Node<V>, path: &[&str]) -> Option<V> {
    let Some((head, rest)) = path.split_first() else {
        return node.value.take();
    };
    let child = node.children.get_mut(*head)?;
    let removed = remove_at(child, rest);
    if child.is_vacant() {
        node.children.remove(*head);
    }
    removed
}

/// Walk `node` depth first. `depth` is the number of segments in `key`;
/// segments may be empty, so the key string alone cannot tell.
fn collect<'a, V>(
    node: &'a Node<V>,
    key: String,
    depth: usize,
    out: &mut impl FnMut(String, &'a V),
) {
    if let Some(value) = node.value.as_ref() {
        out(key.clone(), value);
    }
    for (segment, child) in &node.children {
        let child_key = if depth == 0 {
            segment.clone()
        } else {
            format!("{key}.{segment}")
        };
        collect(child, child_key, depth + 1, out);
    }
}

// ── Address helpers ───────────────────────────────────────────────────────────

/// Split a prefix into segments. The empty prefix has none.
pub fn segments(prefix: &str) -> impl Iterator<Item = &str> {
    (!prefix.is_empty())
        .then(|| prefix.split('.'))
        .into_iter()
        .flatten()
}

/// Number of segments in `prefix`.
pub fn depth(prefix: &str) -> usize {
    segments(prefix).count()
}

/// True if `prefix` equals `address` or is a whole-segment prefix of it.
pub fn is_prefix_of(prefix: &str, address: &str) -> bool {
    if prefix.is_empty() || prefix == address {
        return true;
    }
    address.len() > prefix.len()
        && address.starts_with(prefix)
        && address.as_bytes()[prefix.len()] == b'.'
}

/// Strictly less specific prefixes of `prefix`, longest first.
///
/// `g.a.b` yields `g.a` then `g`.
pub fn ancestors(prefix: &str) -> impl Iterator<Item = &str> {
    prefix.rmatch_indices('.').map(move |(i, _)| &prefix[..i])
}

/// Well-formed address: non-empty segments of `[A-Za-z0-9_~-]`.
pub fn is_valid_address(address: &str) -> bool {
    !address.is_empty()
        && address.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'~' | b'-'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_longest_prefix() {
        let mut map = PrefixMap::new();
        map.insert("g.a", 1);
        map.insert("g.a.b", 2);

        assert_eq!(map.resolve("g.a.b.c"), Some(&2));
        assert_eq!(map.resolve("g.a.b"), Some(&2));
        assert_eq!(map.resolve("g.a.x"), Some(&1));
        assert_eq!(map.resolve("g.a"), Some(&1));
        assert_eq!(map.resolve("g.z"), None);
    }

    #[test]
    fn resolve_matches_whole_segments_only() {
        let mut map = PrefixMap::new();
        map.insert("g.a", 1);

        assert_eq!(map.resolve("g.ab"), None);
        assert_eq!(map.resolve_entry("g.a.c.d"), Some(("g.a", &1)));
    }

    #[test]
    fn empty_prefix_is_catch_all() {
        let mut map = PrefixMap::new();
        map.insert("", 0);
        map.insert("g.a", 1);

        assert_eq!(map.resolve("test.b"), Some(&0));
        assert_eq!(map.resolve_entry("g.a.b"), Some(("g.a", &1)));
        assert_eq!(map.resolve_entry("g.b"), Some(("", &0)));
    }

    #[test]
    fn overlapping_entries_are_independent() {
        let mut map = PrefixMap::new();
        map.insert("g.a", "a");
        map.insert("g.a.b", "ab");

        assert_eq!(map.remove("g.a"), Some("a"));
        assert_eq!(map.get("g.a"), None);
        assert_eq!(map.get("g.a.b"), Some(&"ab"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_overwrites_and_counts_once() {
        let mut map = PrefixMap::new();
        assert_eq!(map.insert("g.a", 1), None);
        assert_eq!(map.insert("g.a", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("g.a"), Some(&2));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut map: PrefixMap<u32> = PrefixMap::new();
        map.insert("g.a.b", 1);

        assert_eq!(map.remove("g.a"), None);
        assert_eq!(map.remove("g.x.y"), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.keys(), vec!["g.a.b".to_string()]);
    }

    #[test]
    fn remove_prunes_empty_branches() {
        let mut map = PrefixMap::new();
        map.insert("g.a.b.c", 1);
        map.remove("g.a.b.c");

        assert!(map.is_empty());
        assert!(map.keys_starting_with("g").is_empty());
        assert!(map.root.children.is_empty());
    }

    #[test]
    fn keys_starting_with_returns_descendants() {
        let mut map = PrefixMap::new();
        for key in ["g.a", "g.a.b", "g.a.b.c", "g.ab", "g.b"] {
            map.insert(key, ());
        }

        assert_eq!(map.keys_starting_with("g.a"), vec!["g.a", "g.a.b", "g.a.b.c"]);
        assert_eq!(map.keys_starting_with("g.a.b.c.d"), Vec::<String>::new());
        assert_eq!(map.keys().len(), 5);
    }

    #[test]
    fn keys_starting_with_includes_unstored_branch_points() {
        let mut map = PrefixMap::new();
        map.insert("g.x.y", 1);
        map.insert("g.x.z", 2);

        assert_eq!(map.keys_starting_with("g.x"), vec!["g.x.y", "g.x.z"]);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut map = PrefixMap::new();
        map.insert("g.a", 1);
        *map.get_mut("g.a").unwrap() += 10;
        assert_eq!(map.get("g.a"), Some(&11));
        assert!(map.get_mut("g.b").is_none());
    }

    #[test]
    fn prefix_containment() {
        assert!(is_prefix_of("g.a", "g.a"));
        assert!(is_prefix_of("g.a", "g.a.b"));
        assert!(!is_prefix_of("g.a", "g.ab"));
        assert!(!is_prefix_of("g.a.b", "g.a"));
        assert!(is_prefix_of("", "g.a"));
    }

    #[test]
    fn ancestors_longest_first() {
        let found: Vec<&str> = ancestors("g.a.b").collect();
        assert_eq!(found, vec!["g.a", "g"]);
        assert_eq!(ancestors("g").count(), 0);
    }

    #[test]
    fn keys_keep_empty_segments() {
        let mut map = PrefixMap::new();
        map.insert(".a", 1);
        map.insert("g..b", 2);

        assert_eq!(map.keys(), vec![".a", "g..b"]);
        assert_eq!(map.keys_starting_with(".a"), vec![".a"]);
        assert_eq!(map.get(".a"), Some(&1));
    }

    #[test]
    fn resolved_value_outlives_address() {
        let mut map = PrefixMap::new();
        map.insert("g.a", 1);

        let value = {
            let address = format!("g.a.{}", 7);
            map.resolve(&address)
        };
        assert_eq!(value, Some(&1));

        let address = "g.a.b".to_string();
        assert_eq!(map.resolve_entry(&address), Some(("g.a", &1)));
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_address("g.alice"));
        assert!(is_valid_address("test.bob-1.~x_y"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("g..a"));
        assert!(!is_valid_address("g.a."));
        assert!(!is_valid_address("g.a b"));
        assert_eq!(depth("g.a.b"), 3);
        assert_eq!(depth(""), 0);
    }
}
