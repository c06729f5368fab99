/// Bidirectional graph assembly and text projections.
///
/// Links are stored directed on the server but displayed undirected: for every
/// link (a, b) the view exposes b among a's neighbors and a among b's. The
/// remote graph payload historically arrived in more than one shape; all of
/// them are normalized here, once, into the canonical [`GraphView`] so nothing
/// downstream ever inspects raw payloads.
use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Deserialize;

use crate::models::{Note, NoteId};

/// Matrix projection renders at most this many notes.
pub const MATRIX_NODE_CAP: usize = 10;

/// Neighbor titles in the tree projection are truncated to this many chars.
const NEIGHBOR_TITLE_WIDTH: usize = 20;

/// One node of the assembled view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: NoteId,
    pub title: String,
    /// Short content excerpt; empty when the source payload carried none.
    pub preview: String,
    /// Neighbor IDs in insertion order. Duplicates are kept as-is: two links
    /// between the same pair show up twice, matching what is stored.
    pub neighbors: Vec<NoteId>,
}

/// Symmetric adjacency view over one owner's notes.
///
/// Built either from real link data ([`GraphView::from_links`] /
/// [`GraphView::from_adjacency`]) or approximated from note titles when link
/// data is unavailable ([`GraphView::approximate_from_notes`]). Approximate
/// views say so in their matrix rendering; the heuristic carries no
/// correctness guarantee.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphView {
    nodes: Vec<GraphNode>,
    approximate: bool,
}

impl GraphView {
    /// Assembles a view from a node set and directed link pairs.
    ///
    /// Every link is materialized in both directions. Links whose endpoints
    /// are not in the node set are dropped.
    pub fn from_links(nodes: Vec<(NoteId, String)>, links: &[(NoteId, NoteId)]) -> Self {
        let mut view = Self {
            nodes: nodes
                .into_iter()
                .map(|(id, title)| GraphNode {
                    id,
                    title,
                    preview: String::new(),
                    neighbors: Vec::new(),
                })
                .collect(),
            approximate: false,
        };

        for &(from, to) in links {
            let (Some(a), Some(b)) = (view.position(from), view.position(to)) else {
                continue;
            };
            view.nodes[a].neighbors.push(to);
            view.nodes[b].neighbors.push(from);
        }

        view
    }

    /// Assembles a view from a node set and ready-made adjacency lists.
    ///
    /// Used for payloads where the server already materialized symmetric
    /// adjacency; the lists are attached verbatim, no second symmetrization.
    pub fn from_adjacency(
        nodes: Vec<(NoteId, String)>,
        adjacency: BTreeMap<NoteId, Vec<NoteId>>,
    ) -> Self {
        let mut adjacency = adjacency;
        Self {
            nodes: nodes
                .into_iter()
                .map(|(id, title)| GraphNode {
                    id,
                    title,
                    preview: String::new(),
                    neighbors: adjacency.remove(&id).unwrap_or_default(),
                })
                .collect(),
            approximate: false,
        }
    }

    /// Builds an approximate view from cached notes when no link data exists.
    ///
    /// Two notes count as adjacent when their titles share at least one
    /// case-insensitive whitespace-delimited token. This stands in for real
    /// links only while the remote store is unreachable.
    pub fn approximate_from_notes(notes: &[Note]) -> Self {
        let mut view = Self {
            nodes: notes
                .iter()
                .map(|n| GraphNode {
                    id: n.id,
                    title: n.title.clone(),
                    preview: n.content_preview(),
                    neighbors: Vec::new(),
                })
                .collect(),
            approximate: true,
        };

        for i in 0..view.nodes.len() {
            for j in (i + 1)..view.nodes.len() {
                if titles_share_token(&view.nodes[i].title, &view.nodes[j].title) {
                    let (id_i, id_j) = (view.nodes[i].id, view.nodes[j].id);
                    view.nodes[i].neighbors.push(id_j);
                    view.nodes[j].neighbors.push(id_i);
                }
            }
        }

        view
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether adjacency was derived heuristically rather than from links.
    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    fn position(&self, id: NoteId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    fn title_of(&self, id: NoteId) -> String {
        match self.position(id) {
            Some(idx) => truncate(&self.nodes[idx].title, NEIGHBOR_TITLE_WIDTH),
            None => format!("#{id}"),
        }
    }

    /// Tree projection: one line per note, neighbors listed beneath.
    ///
    /// Returns `None` when there are no notes, so callers show an explicit
    /// "no notes" message instead of an empty tree.
    pub fn render_tree(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut out = String::new();
        for node in &self.nodes {
            out.push_str(&node.title);
            out.push('\n');
            if !node.neighbors.is_empty() {
                let titles: Vec<String> =
                    node.neighbors.iter().map(|&id| self.title_of(id)).collect();
                let _ = writeln!(out, "  linked: {}", titles.join(", "));
            }
        }
        Some(out)
    }

    /// Matrix projection: N×N grid over the first [`MATRIX_NODE_CAP`] notes.
    ///
    /// Diagonal cells carry the self-marker `*`; off-diagonal cells are `1`
    /// when the row note lists the column note as a neighbor, `0` otherwise.
    /// A legend maps row numbers back to titles. Returns `None` when there
    /// are no notes.
    pub fn render_matrix(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let shown = &self.nodes[..self.nodes.len().min(MATRIX_NODE_CAP)];
        let mut out = String::new();
        if self.approximate {
            out.push_str("approximate: derived from title overlap, not stored links\n");
        }

        out.push_str("   ");
        for col in 1..=shown.len() {
            let _ = write!(out, "{col:>3}");
        }
        out.push('\n');

        for (i, row) in shown.iter().enumerate() {
            let _ = write!(out, "{:>3}", i + 1);
            for (j, col) in shown.iter().enumerate() {
                let cell = if i == j {
                    "*"
                } else if row.neighbors.contains(&col.id) {
                    "1"
                } else {
                    "0"
                };
                let _ = write!(out, "{cell:>3}");
            }
            out.push('\n');
        }

        out.push('\n');
        for (i, node) in shown.iter().enumerate() {
            let _ = writeln!(out, "{}: {}", i + 1, truncate(&node.title, NEIGHBOR_TITLE_WIDTH));
        }
        Some(out)
    }
}

/// Raw `GET /api/notes/{owner}/graph` payload.
///
/// The `notes` field has shipped in three shapes over the service's life:
/// a map of id to title, a map of id to a detailed object with directed
/// links, and a plain list of note rows. [`GraphPayload::into_view`] is the
/// single place any of them is interpreted.
#[derive(Debug, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    notes: NodeSet,
    /// Symmetric adjacency keyed by note id, present alongside the title-map
    /// and list shapes.
    #[serde(default)]
    graph: BTreeMap<String, Vec<NoteId>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeSet {
    Titled(BTreeMap<String, String>),
    Detailed(BTreeMap<String, NodeDetail>),
    Listed(Vec<NodeRow>),
}

impl Default for NodeSet {
    fn default() -> Self {
        NodeSet::Titled(BTreeMap::new())
    }
}

#[derive(Debug, Deserialize)]
struct NodeDetail {
    title: String,
    #[serde(default)]
    links: Vec<NoteId>,
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    id: NoteId,
    title: String,
}

impl GraphPayload {
    /// Normalizes the payload into the canonical [`GraphView`].
    ///
    /// Fails only on malformed IDs; the error string feeds the client's
    /// decode-error classification.
    pub fn into_view(self) -> Result<GraphView, String> {
        let adjacency = self
            .graph
            .into_iter()
            .map(|(key, neighbors)| parse_id(&key).map(|id| (id, neighbors)))
            .collect::<Result<BTreeMap<_, _>, String>>()?;

        match self.notes {
            NodeSet::Titled(map) => {
                let nodes = map
                    .into_iter()
                    .map(|(key, title)| parse_id(&key).map(|id| (id, title)))
                    .collect::<Result<Vec<_>, String>>()?;
                Ok(GraphView::from_adjacency(nodes, adjacency))
            }
            NodeSet::Detailed(map) => {
                let mut nodes = Vec::with_capacity(map.len());
                let mut links = Vec::new();
                for (key, detail) in map {
                    let id = parse_id(&key)?;
                    nodes.push((id, detail.title));
                    links.extend(detail.links.into_iter().map(|to| (id, to)));
                }
                Ok(GraphView::from_links(nodes, &links))
            }
            NodeSet::Listed(rows) => {
                let nodes = rows.into_iter().map(|row| (row.id, row.title)).collect();
                Ok(GraphView::from_adjacency(nodes, adjacency))
            }
        }
    }
}

fn parse_id(raw: &str) -> Result<NoteId, String> {
    raw.parse::<i64>()
        .map(NoteId::new)
        .map_err(|_| format!("non-numeric note id in graph payload: {raw:?}"))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn titles_share_token(a: &str, b: &str) -> bool {
    a.split_whitespace().any(|token_a| {
        b.split_whitespace()
            .any(|token_b| token_a.eq_ignore_ascii_case(token_b))
    })
}
