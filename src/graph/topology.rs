// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Blocks and edges, with the validation rules for editing them.
//!
//! The topology owns no execution state. It answers structural questions
//! (who feeds this port, is this block part of the running graph) and rejects
//! edits that would produce an invalid graph before anything is changed.

use crate::errors::GraphError;
use crate::graph::block_handle::{BlockCore, BlockId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl Display for PortDirection {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// One port of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Endpoint {
    pub block: BlockId,
    pub port: usize,
}

impl Endpoint {
    pub fn new(block: BlockId, port: usize) -> Self {
        Self { block, port }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.block, self.port)
    }
}

/// Producer output port to consumer input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub src: Endpoint,
    pub dst: Endpoint,
}

#[derive(Debug, Default)]
pub(crate) struct Topology {
    blocks: BTreeMap<BlockId, Arc<BlockCore>>,
    edges: Vec<Edge>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_block(&mut self, core: Arc<BlockCore>) {
        self.blocks.insert(core.id(), core);
    }

    pub fn block(&self, id: BlockId) -> Result<&Arc<BlockCore>, GraphError> {
        self.blocks.get(&id).ok_or(GraphError::UnknownBlock(id))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Arc<BlockCore>> {
        self.blocks.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn producer_of(&self, dst: Endpoint) -> Option<Endpoint> {
        self.edges.iter().find(|e| e.dst == dst).map(|e| e.src)
    }

    pub fn consumers_of(&self, src: Endpoint) -> Vec<Endpoint> {
        self.edges
            .iter()
            .filter(|e| e.src == src)
            .map(|e| e.dst)
            .collect()
    }

    /// Every edge touching `block`, in either direction.
    pub fn edges_of(&self, block: BlockId) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| e.src.block == block || e.dst.block == block)
            .copied()
            .collect()
    }

    /// A block is part of the running graph while it has at least one edge.
    pub fn is_attached(&self, block: BlockId) -> bool {
        self.edges
            .iter()
            .any(|e| e.src.block == block || e.dst.block == block)
    }

    fn check_port(
        &self,
        endpoint: Endpoint,
        direction: PortDirection,
    ) -> Result<usize, GraphError> {
        let core = self.block(endpoint.block)?;
        let sizes = match direction {
            PortDirection::Input => &core.signature().input_sizes,
            PortDirection::Output => &core.signature().output_sizes,
        };
        sizes
            .get(endpoint.port)
            .copied()
            .ok_or_else(|| GraphError::PortOutOfRange {
                block: core.name().to_string(),
                direction,
                port: endpoint.port,
                available: sizes.len(),
            })
    }

    /// Everything `connect` must reject, checked without changing anything.
    pub fn validate_new_edge(&self, src: Endpoint, dst: Endpoint) -> Result<(), GraphError> {
        let src_size = self.check_port(src, PortDirection::Output)?;
        let dst_size = self.check_port(dst, PortDirection::Input)?;
        if src.block == dst.block {
            return Err(GraphError::SelfLoop {
                block: self.block(src.block)?.name().to_string(),
            });
        }
        if src_size != dst_size {
            return Err(GraphError::ItemSizeMismatch {
                src,
                dst,
                src_size,
                dst_size,
            });
        }
        if let Some(existing) = self.producer_of(dst) {
            return Err(GraphError::InputAlreadyConnected { dst, existing });
        }
        Ok(())
    }

    pub fn add_edge(&mut self, src: Endpoint, dst: Endpoint) {
        self.edges.push(Edge { src, dst });
    }

    pub fn remove_edge(&mut self, src: Endpoint, dst: Endpoint) -> Result<Edge, GraphError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.src == src && e.dst == dst)
            .ok_or(GraphError::EdgeNotFound { src, dst })?;
        Ok(self.edges.remove(index))
    }

    /// Point every edge of `old` at `new`, keeping port numbers.
    pub fn replace_block(&mut self, old: BlockId, new: BlockId) {
        for edge in &mut self.edges {
            if edge.src.block == old {
                edge.src.block = new;
            }
            if edge.dst.block == old {
                edge.dst.block = new;
            }
        }
    }

    /// Refresh every block's attached flag from the edge list.
    pub fn sync_attached(&self) {
        for core in self.blocks.values() {
            core.set_attached(self.is_attached(core.id()));
        }
    }

    /// Every attached block must have all of its ports connected.
    pub fn validate_runnable(&self) -> Result<(), GraphError> {
        for core in self.blocks.values() {
            if !self.is_attached(core.id()) {
                continue;
            }
            for port in 0..core.signature().inputs() {
                if self.producer_of(Endpoint::new(core.id(), port)).is_none() {
                    return Err(GraphError::UnconnectedPort {
                        block: core.name().to_string(),
                        direction: PortDirection::Input,
                        port,
                    });
                }
            }
            for port in 0..core.signature().outputs() {
                if self.consumers_of(Endpoint::new(core.id(), port)).is_empty() {
                    return Err(GraphError::UnconnectedPort {
                        block: core.name().to_string(),
                        direction: PortDirection::Output,
                        port,
                    });
                }
            }
        }
        Ok(())
    }

    /// Attached blocks without a live execution loop.
    pub fn blocks_needing_loops(&self) -> Vec<Arc<BlockCore>> {
        self.blocks
            .values()
            .filter(|core| core.needs_loop())
            .cloned()
            .collect()
    }
}
