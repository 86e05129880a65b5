use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// One link in the append-only value chain shared between the engine and
/// every listener cursor.
///
/// Once a node is published (made reachable as some other node's `next`, or
/// as the chain tail), its `next` transitions from empty to `Some` exactly
/// once and is never mutated again — only the engine ever calls `link`, and
/// only on the node it last published itself, so there is no concurrent
/// writer to race against a listener's lock-free `next()` read.
pub(crate) struct Node<T> {
    value: T,
    next: ArcSwapOption<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            value,
            next: ArcSwapOption::from(None),
        })
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    /// Publishes `node` as this node's successor.
    pub(crate) fn link(self: &Arc<Self>, node: Arc<Node<T>>) {
        self.next.store(Some(node));
    }

    /// Lock-free read of the successor, if one has been published yet.
    pub(crate) fn next(&self) -> Option<Arc<Node<T>>> {
        self.next.load_full()
    }
}

/// A listener's position in the chain: `Some` means there is a value it
/// hasn't been delivered yet (the listener is active); `None` means it has
/// caught up to the tail (starved).
pub(crate) type Cursor<T> = Option<Arc<Node<T>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_visible_through_next() {
        let head = Node::new(1);
        let tail = Node::new(2);
        head.link(tail.clone());
        assert_eq!(*head.next().unwrap().value(), 2);
        let _ = tail;
    }

    #[test]
    fn fresh_node_has_no_successor() {
        let node = Node::new("x");
        assert!(node.next().is_none());
    }
}
