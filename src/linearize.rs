use std::slice;

use crate::error::ConvertError;
use crate::importer::{Conversation, Message, MessageGraph, Node, Thread};

/// The active thread of one conversation, ready to be walked in order.
///
/// Graph conversations are resolved to the root-to-leaf chain of the active
/// branch up front; messages are picked out of it lazily. Iterating again
/// starts over from the first message.
pub struct Linearized<'a> {
    steps: Steps<'a>,
}

enum Steps<'a> {
    Path(Vec<&'a Node>),
    Flat(&'a [Message]),
}

impl<'a> Linearized<'a> {
    pub fn iter(&self) -> Messages<'_, 'a> {
        match &self.steps {
            Steps::Path(nodes) => Messages::Path(nodes.iter()),
            Steps::Flat(messages) => {
                let messages: &'a [Message] = *messages;
                Messages::Flat(messages.iter())
            }
        }
    }
}

impl<'s, 'a> IntoIterator for &'s Linearized<'a> {
    type Item = &'a Message;
    type IntoIter = Messages<'s, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the messages of a [`Linearized`] conversation.
pub enum Messages<'s, 'a> {
    Path(slice::Iter<'s, &'a Node>),
    Flat(slice::Iter<'a, Message>),
}

impl<'a> Iterator for Messages<'_, 'a> {
    type Item = &'a Message;

    fn next(&mut self) -> Option<&'a Message> {
        match self {
            // Nodes without a message (the hidden root, for instance) and
            // messages with nothing to render are skipped.
            Self::Path(nodes) => nodes.find_map(|&node| {
                node.message
                    .as_ref()
                    .filter(|message| message.is_renderable())
            }),
            Self::Flat(messages) => messages.next(),
        }
    }
}

/// Order a conversation's messages as they were exchanged.
///
/// For graph conversations this follows parent links from the active leaf
/// (`current_node`, or the most recent leaf when the export has none) up to
/// the root. The order of the node mapping itself is never consulted, since it
/// may hold abandoned edit branches.
pub fn linearize(conversation: &Conversation) -> Result<Linearized<'_>, ConvertError> {
    let steps = match &conversation.thread {
        Thread::Graph(graph) => {
            let path = active_path(graph)?;
            tracing::debug!(
                conversation = %conversation.title,
                nodes = graph.nodes.len(),
                active = path.len(),
                "linearized message graph"
            );
            Steps::Path(path)
        }
        Thread::Flat(messages) => Steps::Flat(messages),
    };
    Ok(Linearized { steps })
}

fn active_path(graph: &MessageGraph) -> Result<Vec<&Node>, ConvertError> {
    let leaf = match graph.current_node.as_deref() {
        Some(id) => id,
        None => latest_leaf(graph)
            .ok_or_else(|| ConvertError::Structural("message graph has no leaf node".into()))?,
    };

    let mut path = Vec::new();
    let mut cursor = Some(leaf);
    while let Some(id) = cursor {
        // A chain longer than the graph itself can only be a cycle.
        if path.len() == graph.nodes.len() {
            return Err(ConvertError::Structural(format!(
                "parent links form a cycle through node {id:?}"
            )));
        }
        let node = graph.nodes.get(id).ok_or_else(|| {
            ConvertError::Structural(format!("node {id:?} is referenced but missing"))
        })?;
        path.push(node);
        cursor = node.parent.as_deref();
    }

    path.reverse();
    Ok(path)
}

/// The leaf with the newest message; ties go to the deepest leaf, then to the
/// greatest id, so the choice never depends on map iteration order.
fn latest_leaf(graph: &MessageGraph) -> Option<&str> {
    graph
        .nodes
        .values()
        .filter(|node| node.children.is_empty())
        .max_by_key(|&node| {
            let created = node
                .message
                .as_ref()
                .and_then(|message| message.create_time.instant());
            (created, depth(graph, node), node.id.as_str())
        })
        .map(|node| node.id.as_str())
}

fn depth(graph: &MessageGraph, node: &Node) -> usize {
    let mut depth = 0;
    let mut cursor = node.parent.as_deref();
    while let Some(id) = cursor
        && depth < graph.nodes.len()
    {
        depth += 1;
        cursor = graph.nodes.get(id).and_then(|n| n.parent.as_deref());
    }
    depth
}
