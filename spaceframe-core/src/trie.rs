//! Subscription trie for prefix matching on SUB-family sockets.
//!
//! A compressed (radix) trie of subscribed prefixes. Each node carries a
//! compressed path fragment, a sparse child table keyed by the next byte,
//! and a count of subscriptions terminating at the node, so the same prefix
//! may be subscribed more than once. Matching walks at most as many bytes
//! as the message offers.
//!
//! Subscribing splits nodes as needed; unsubscribing compacts them again, so
//! a subscribe/unsubscribe round trip restores the previous structure
//! exactly.

use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    /// Compressed path fragment, including the byte that keys this node in
    /// its parent's child table.
    prefix: Bytes,
    /// Number of subscriptions terminating exactly here.
    count: u32,
    /// Children sorted by their first path byte.
    children: SmallVec<[(u8, Box<Node>); 2]>,
}

impl Node {
    fn leaf(prefix: &[u8], count: u32) -> Box<Self> {
        Box::new(Self {
            prefix: Bytes::copy_from_slice(prefix),
            count,
            children: SmallVec::new(),
        })
    }

    fn child_index(&self, byte: u8) -> Result<usize, usize> {
        self.children.binary_search_by_key(&byte, |(b, _)| *b)
    }

    /// Fold a lone child into this node when no subscription terminates here.
    fn compact(&mut self) {
        if self.count == 0 && self.children.len() == 1 {
            let (_, child) = self.children.remove(0);
            let child = *child;
            let mut joined = BytesMut::with_capacity(self.prefix.len() + child.prefix.len());
            joined.put_slice(&self.prefix);
            joined.put_slice(&child.prefix);
            self.prefix = joined.freeze();
            self.count = child.count;
            self.children = child.children;
        }
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Prefix index for subscription matching.
///
/// # Examples
///
/// ```
/// use spaceframe_core::trie::SubscriptionTrie;
///
/// let mut trie = SubscriptionTrie::new();
/// trie.subscribe(b"BTC");
/// assert!(trie.matches(b"BTC:10"));
/// assert!(!trie.matches(b"ETH:2"));
/// trie.unsubscribe(b"BTC");
/// assert!(!trie.matches(b"BTC:10"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTrie {
    root: Option<Box<Node>>,
    distinct: usize,
}

impl SubscriptionTrie {
    /// Create an empty trie.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            distinct: 0,
        }
    }

    /// Number of distinct subscribed prefixes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.distinct
    }

    /// True when nothing is subscribed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.distinct == 0
    }

    /// Add a subscription for `prefix`. The empty prefix subscribes to
    /// everything.
    ///
    /// Returns true when the prefix was not subscribed before.
    pub fn subscribe(&mut self, prefix: &[u8]) -> bool {
        let fresh = match self.root.as_mut() {
            None => {
                self.root = Some(Node::leaf(prefix, 1));
                true
            }
            Some(root) => Self::insert(root, prefix),
        };
        if fresh {
            self.distinct += 1;
        }
        fresh
    }

    fn insert(node: &mut Node, key: &[u8]) -> bool {
        let common = common_prefix(&node.prefix, key);

        if common < node.prefix.len() {
            // Diverges inside this node's fragment: split it.
            let rest = node.prefix.slice(common..);
            let moved = Box::new(Node {
                prefix: rest.clone(),
                count: node.count,
                children: std::mem::take(&mut node.children),
            });
            node.prefix = node.prefix.slice(..common);
            node.count = 0;
            node.children.push((rest[0], moved));

            if key.len() == common {
                node.count = 1;
            } else {
                let new_rest = &key[common..];
                match node.child_index(new_rest[0]) {
                    Ok(_) => unreachable!("split node has one child"),
                    Err(pos) => node
                        .children
                        .insert(pos, (new_rest[0], Node::leaf(new_rest, 1))),
                }
            }
            return true;
        }

        if key.len() == common {
            node.count += 1;
            return node.count == 1;
        }

        let rest = &key[common..];
        match node.child_index(rest[0]) {
            Ok(idx) => Self::insert(&mut node.children[idx].1, rest),
            Err(pos) => {
                node.children.insert(pos, (rest[0], Node::leaf(rest, 1)));
                true
            }
        }
    }

    /// Remove one subscription for `prefix`.
    ///
    /// Returns true when this removed the last subscription for the prefix;
    /// false when the prefix stays subscribed or was never subscribed.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        let Some(root) = self.root.as_mut() else {
            return false;
        };
        let last = match Self::remove(root, prefix) {
            Removal::NotFound => return false,
            Removal::Removed { last } => last,
        };
        if root.count == 0 && root.children.is_empty() {
            self.root = None;
        }
        if last {
            self.distinct -= 1;
        }
        last
    }

    fn remove(node: &mut Node, key: &[u8]) -> Removal {
        let common = common_prefix(&node.prefix, key);
        if common < node.prefix.len() {
            return Removal::NotFound;
        }

        if key.len() == common {
            if node.count == 0 {
                return Removal::NotFound;
            }
            node.count -= 1;
            let last = node.count == 0;
            if last {
                node.compact();
            }
            return Removal::Removed { last };
        }

        let rest = &key[common..];
        let Ok(idx) = node.child_index(rest[0]) else {
            return Removal::NotFound;
        };
        let result = Self::remove(&mut node.children[idx].1, rest);
        if matches!(result, Removal::Removed { last: true }) {
            let child = &node.children[idx].1;
            if child.count == 0 && child.children.is_empty() {
                node.children.remove(idx);
            }
            node.compact();
        }
        result
    }

    /// True when some subscribed prefix is a prefix of `data`.
    ///
    /// Walks at most `data.len()` bytes of the trie.
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        let mut node = match self.root.as_deref() {
            Some(node) => node,
            None => return false,
        };
        let mut offset = 0;
        loop {
            if !data[offset..].starts_with(&node.prefix) {
                return false;
            }
            offset += node.prefix.len();
            if node.count > 0 {
                return true;
            }
            if offset == data.len() {
                return false;
            }
            node = match node.child_index(data[offset]) {
                Ok(idx) => &node.children[idx].1,
                Err(_) => return false,
            };
        }
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.root = None;
        self.distinct = 0;
    }
}

enum Removal {
    NotFound,
    Removed { last: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_matches_nothing() {
        let trie = SubscriptionTrie::new();
        assert!(!trie.matches(b"anything"));
        assert!(!trie.matches(b""));
        assert!(trie.is_empty());
    }

    #[test]
    fn empty_prefix_matches_everything() {
        let mut trie = SubscriptionTrie::new();
        assert!(trie.subscribe(b""));
        assert!(trie.matches(b"anything"));
        assert!(trie.matches(b""));
    }

    #[test]
    fn prefix_matching() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(b"topic.");
        assert!(trie.matches(b"topic.foo"));
        assert!(trie.matches(b"topic."));
        assert!(!trie.matches(b"topi"));
        assert!(!trie.matches(b"other.foo"));
    }

    #[test]
    fn shared_prefixes_split_nodes() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(b"BTC:spot");
        trie.subscribe(b"BTC:futs");
        trie.subscribe(b"BTC");
        assert_eq!(trie.len(), 3);

        assert!(trie.matches(b"BTC:spot:XBTUSD"));
        assert!(trie.matches(b"BTC:futs"));
        assert!(trie.matches(b"BTC:perp")); // via the bare "BTC" terminal
        assert!(!trie.matches(b"ETH:spot"));

        trie.unsubscribe(b"BTC");
        assert!(!trie.matches(b"BTC:perp"));
        assert!(trie.matches(b"BTC:spot"));
    }

    #[test]
    fn duplicate_subscription_is_counted() {
        let mut trie = SubscriptionTrie::new();
        assert!(trie.subscribe(b"a"));
        assert!(!trie.subscribe(b"a"));
        assert_eq!(trie.len(), 1);

        assert!(!trie.unsubscribe(b"a"));
        assert!(trie.matches(b"ab"));
        assert!(trie.unsubscribe(b"a"));
        assert!(!trie.matches(b"ab"));
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(b"abc");
        assert!(!trie.unsubscribe(b"ab"));
        assert!(!trie.unsubscribe(b"abcd"));
        assert!(!trie.unsubscribe(b"x"));
        assert!(trie.matches(b"abcdef"));
    }

    #[test]
    fn subscribe_unsubscribe_restores_structure() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(b"alpha");
        trie.subscribe(b"albatross");
        trie.subscribe(b"beta");
        let snapshot = trie.clone();

        // Round trips through splits and merges.
        for extra in [&b"al"[..], b"alphabet", b"", b"beta", b"gamma"] {
            trie.subscribe(extra);
            trie.unsubscribe(extra);
            assert_eq!(trie, snapshot, "round trip for {extra:?}");
        }
    }

    #[test]
    fn deep_compaction() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(b"aaaa");
        trie.subscribe(b"aabb");
        trie.subscribe(b"aacc");
        let snapshot = trie.clone();

        trie.subscribe(b"aab");
        trie.unsubscribe(b"aab");
        assert_eq!(trie, snapshot);

        trie.unsubscribe(b"aabb");
        trie.unsubscribe(b"aacc");
        trie.unsubscribe(b"aaaa");
        assert!(trie.is_empty());
        assert_eq!(trie, SubscriptionTrie::new());
    }
}
