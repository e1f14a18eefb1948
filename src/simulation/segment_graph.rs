//! Track segment graph used for train movement and lookahead
//!
//! Segments are nodes of a petgraph directed graph. Each connection between
//! two segment endpoints is stored as a pair of directed edges, so the
//! neighbours reachable from either end of a segment are a plain edge scan.

use anyhow::{bail, Context, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use super::signal::{SignalProgram, SignalSite, SignalTable};
use super::types::{Endpoint, SegmentId, SimId};

/// A piece of track in the built graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    pub length: f32,
    /// Level crossing (trains sound the horn when approaching)
    pub crossing: bool,
}

/// Edge data: which end of the source touches which end of the target
#[derive(Debug, Clone, Copy)]
pub struct LinkEdge {
    pub from_end: Endpoint,
    pub to_end: Endpoint,
}

/// One hop of a walk along the track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub segment: SegmentId,
    /// The end of `segment` through which it is entered
    pub entry: Endpoint,
}

impl Step {
    /// Heading of a train that has just made this step
    pub fn heading(&self) -> Endpoint {
        self.entry.opposite()
    }
}

/// What kind of segment a layout entry describes
pub enum SegmentKind {
    Track,
    Crossing,
    /// A signal governing trains that enter through `approach`
    Signal {
        approach: Endpoint,
        program: Box<dyn SignalProgram>,
    },
}

/// A segment as described by a map, before the graph is built
pub struct LayoutSegment {
    pub id: SegmentId,
    pub length: f32,
    pub kind: SegmentKind,
}

/// A connection between two segment endpoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackLink {
    pub a: SegmentId,
    pub a_end: Endpoint,
    pub b: SegmentId,
    pub b_end: Endpoint,
}

/// Mutable description of a track network.
///
/// Scripts receive the layout through `modify_segments` before it is frozen
/// into a [`SegmentGraph`] and a [`SignalTable`].
#[derive(Default)]
pub struct TrackLayout {
    pub segments: Vec<LayoutSegment>,
    pub links: Vec<TrackLink>,
    /// Initial switch selections: (segment, end, index into the links at that end)
    pub switches: Vec<(SegmentId, Endpoint, usize)>,
}

impl TrackLayout {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> SegmentId {
        let next = self
            .segments
            .iter()
            .map(|s| s.id.0 .0 + 1)
            .max()
            .unwrap_or(0);
        SegmentId(SimId(next))
    }

    pub fn add_segment(&mut self, length: f32, kind: SegmentKind) -> SegmentId {
        let id = self.next_id();
        self.segments.push(LayoutSegment { id, length, kind });
        id
    }

    pub fn add_track(&mut self, length: f32) -> SegmentId {
        self.add_segment(length, SegmentKind::Track)
    }

    pub fn add_crossing(&mut self, length: f32) -> SegmentId {
        self.add_segment(length, SegmentKind::Crossing)
    }

    pub fn add_signal(
        &mut self,
        length: f32,
        approach: Endpoint,
        program: Box<dyn SignalProgram>,
    ) -> SegmentId {
        self.add_segment(length, SegmentKind::Signal { approach, program })
    }

    /// Joins `a_end` of `a` to `b_end` of `b`
    pub fn connect(&mut self, a: SegmentId, a_end: Endpoint, b: SegmentId, b_end: Endpoint) {
        self.links.push(TrackLink { a, a_end, b, b_end });
    }

    /// Convenience for the common case: `a`'s End joins `b`'s Begin
    pub fn chain(&mut self, a: SegmentId, b: SegmentId) {
        self.connect(a, Endpoint::End, b, Endpoint::Begin);
    }

    pub fn set_switch(&mut self, segment: SegmentId, end: Endpoint, index: usize) {
        self.switches.push((segment, end, index));
    }

    /// Freezes the layout into an immutable topology plus the signal programs
    pub fn build(self) -> Result<(SegmentGraph, SignalTable)> {
        let mut graph = SegmentGraph::default();
        let mut signals = SignalTable::default();

        for layout_segment in self.segments {
            if !(layout_segment.length > 0.0) {
                bail!(
                    "{} has non-positive length {}",
                    layout_segment.id,
                    layout_segment.length
                );
            }
            if graph.segment_to_node.contains_key(&layout_segment.id) {
                bail!("{} is defined twice", layout_segment.id);
            }

            let crossing = matches!(layout_segment.kind, SegmentKind::Crossing);
            let node = graph.graph.add_node(Segment {
                id: layout_segment.id,
                length: layout_segment.length,
                crossing,
            });
            graph.segment_to_node.insert(layout_segment.id, node);

            if let SegmentKind::Signal { approach, program } = layout_segment.kind {
                signals.insert(layout_segment.id, SignalSite::new(approach, program));
            }
        }

        for link in self.links {
            let a = graph
                .node(link.a)
                .with_context(|| format!("link references unknown {}", link.a))?;
            let b = graph
                .node(link.b)
                .with_context(|| format!("link references unknown {}", link.b))?;
            graph.graph.add_edge(
                a,
                b,
                LinkEdge {
                    from_end: link.a_end,
                    to_end: link.b_end,
                },
            );
            graph.graph.add_edge(
                b,
                a,
                LinkEdge {
                    from_end: link.b_end,
                    to_end: link.a_end,
                },
            );
        }

        for (segment, end, index) in self.switches {
            graph
                .set_switch(segment, end, index)
                .with_context(|| format!("invalid initial switch on {}", segment))?;
        }

        Ok((graph, signals))
    }
}

/// Immutable segment topology with per-endpoint switch selection
#[derive(Default)]
pub struct SegmentGraph {
    graph: DiGraph<Segment, LinkEdge>,
    segment_to_node: HashMap<SegmentId, NodeIndex>,
    switches: HashMap<(SegmentId, Endpoint), usize>,
}

impl SegmentGraph {
    fn node(&self, id: SegmentId) -> Option<NodeIndex> {
        self.segment_to_node.get(&id).copied()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.node(id).map(|node| &self.graph[node])
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.segment_to_node.contains_key(&id)
    }

    /// Length of a segment. Ids always come from this graph.
    pub fn length(&self, id: SegmentId) -> f32 {
        self.graph[self.segment_to_node[&id]].length
    }

    pub fn is_crossing(&self, id: SegmentId) -> bool {
        self.segment(id).is_some_and(|s| s.crossing)
    }

    pub fn segment_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.graph.node_weights()
    }

    /// Neighbours linked at `end` of `segment`, in the order they were linked
    pub fn links(&self, segment: SegmentId, end: Endpoint) -> Vec<Step> {
        let Some(node) = self.node(segment) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges(node)
            .filter(|edge| edge.weight().from_end == end)
            .collect();
        // petgraph yields the newest edge first
        edges.sort_by_key(|edge| edge.id().index());
        edges
            .into_iter()
            .map(|edge| Step {
                segment: self.graph[edge.target()].id,
                entry: edge.weight().to_end,
            })
            .collect()
    }

    /// The next segment travelling toward `heading`, following the switch
    pub fn step(&self, segment: SegmentId, heading: Endpoint) -> Option<Step> {
        let links = self.links(segment, heading);
        if links.is_empty() {
            return None;
        }
        let selected = self
            .switches
            .get(&(segment, heading))
            .copied()
            .unwrap_or(0)
            .min(links.len() - 1);
        Some(links[selected])
    }

    /// The last reachable segment toward `heading`, ignoring the switch.
    /// Lookahead follows this branch at junctions.
    pub fn step_far(&self, segment: SegmentId, heading: Endpoint) -> Option<Step> {
        self.links(segment, heading).last().copied()
    }

    /// Heading of a train on `segment` that arrived from `origin`.
    /// Without an origin the train heads toward `End`.
    pub fn heading_from(&self, segment: SegmentId, origin: Option<SegmentId>) -> Endpoint {
        let Some(origin) = origin else {
            return Endpoint::End;
        };
        if self
            .links(segment, Endpoint::Begin)
            .iter()
            .any(|step| step.segment == origin)
        {
            Endpoint::End
        } else {
            Endpoint::Begin
        }
    }

    /// The segment a train heading toward `heading` came from
    pub fn origin(&self, segment: SegmentId, heading: Endpoint) -> Option<SegmentId> {
        self.step(segment, heading.opposite()).map(|step| step.segment)
    }

    /// Destination reached from `segment` when arriving from `origin`
    pub fn dest(&self, segment: SegmentId, origin: Option<SegmentId>) -> Option<SegmentId> {
        let heading = self.heading_from(segment, origin);
        self.step(segment, heading).map(|step| step.segment)
    }

    /// Every non-null destination reachable from `segment` when arriving from `origin`
    pub fn dest_nz(&self, segment: SegmentId, origin: Option<SegmentId>) -> Vec<SegmentId> {
        let heading = self.heading_from(segment, origin);
        self.links(segment, heading)
            .into_iter()
            .map(|step| step.segment)
            .collect()
    }

    /// Selects which linked neighbour `step` follows at `end` of `segment`
    pub fn set_switch(&mut self, segment: SegmentId, end: Endpoint, index: usize) -> Result<()> {
        let available = self.links(segment, end).len();
        if index >= available {
            bail!(
                "{} has {} links at {:?}, cannot select {}",
                segment,
                available,
                end,
                index
            );
        }
        self.switches.insert((segment, end), index);
        Ok(())
    }
}
