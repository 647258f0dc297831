use std::collections::HashMap;

/// A node in the subscription trie.
#[derive(Debug, Default)]
struct TrieNode {
  children: HashMap<u8, TrieNode>,
  /// Count of subscriptions ending exactly at this node.
  count: usize,
}

impl TrieNode {
  fn is_empty(&self) -> bool {
    self.count == 0 && self.children.is_empty()
  }
}

/// Topic subscriptions held in a prefix trie.
///
/// Subscriptions are reference counted: subscribing twice to the same topic
/// needs two unsubscribes to remove it. The empty topic matches everything.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTrie {
  root: TrieNode,
  topics: usize,
}

impl SubscriptionTrie {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds one reference to `topic`. Returns true if the topic is new.
  pub fn add(&mut self, topic: &[u8]) -> bool {
    let mut node = &mut self.root;
    for &byte in topic {
      node = node.children.entry(byte).or_default();
    }
    node.count += 1;
    let is_new = node.count == 1;
    if is_new {
      self.topics += 1;
    }
    is_new
  }

  /// Drops one reference to `topic`. Returns true if that was the last one.
  pub fn remove(&mut self, topic: &[u8]) -> bool {
    let removed = Self::remove_from(&mut self.root, topic);
    if removed {
      self.topics -= 1;
    }
    removed
  }

  fn remove_from(node: &mut TrieNode, topic: &[u8]) -> bool {
    match topic.split_first() {
      None => {
        if node.count == 0 {
          return false;
        }
        node.count -= 1;
        node.count == 0
      }
      Some((byte, rest)) => {
        let Some(child) = node.children.get_mut(byte) else {
          return false;
        };
        let removed = Self::remove_from(child, rest);
        if child.is_empty() {
          node.children.remove(byte);
        }
        removed
      }
    }
  }

  /// True if any subscription is a prefix of `data`.
  pub fn matches(&self, data: &[u8]) -> bool {
    let mut node = &self.root;
    if node.count > 0 {
      return true;
    }
    for byte in data {
      match node.children.get(byte) {
        Some(next) => node = next,
        None => return false,
      }
      if node.count > 0 {
        return true;
      }
    }
    false
  }

  /// True if `topic` itself is subscribed.
  pub fn contains(&self, topic: &[u8]) -> bool {
    let mut node = &self.root;
    for byte in topic {
      match node.children.get(byte) {
        Some(next) => node = next,
        None => return false,
      }
    }
    node.count > 0
  }

  /// All distinct subscribed topics (order unspecified).
  pub fn topics(&self) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(self.topics);
    let mut prefix = Vec::new();
    Self::collect(&self.root, &mut prefix, &mut out);
    out
  }

  fn collect(node: &TrieNode, prefix: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
    if node.count > 0 {
      out.push(prefix.clone());
    }
    for (byte, child) in &node.children {
      prefix.push(*byte);
      Self::collect(child, prefix, out);
      prefix.pop();
    }
  }
}
