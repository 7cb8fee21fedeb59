use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{
        lineage_resolver::{
            Direction, FrontierItem, LineageResolver, NodeRef, ProductionBoundary,
            ResolveContext, TraceEdge, TraceNode,
        },
        reconciliation::MassBalance,
        unit_conversion::{convert, convert_symbols, Unit},
    },
};

/// Genealogy graph returned by a trace
#[derive(Debug, Clone, Serialize)]
pub struct TraceResult {
    pub start_node_id: String,
    pub direction: Direction,
    pub nodes: Vec<TraceNode>,
    pub edges: Vec<TraceEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_balance: Option<MassBalance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TraceResult {
    pub fn node(&self, id: &str) -> Option<&TraceNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_labels(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.label.as_str()).collect()
    }
}

/// Nodes and edges collected so far. Insertion is idempotent.
#[derive(Default)]
struct GraphAccumulator {
    nodes: Vec<TraceNode>,
    seen_nodes: HashSet<String>,
    edges: Vec<TraceEdge>,
    edge_index: HashMap<(String, String, &'static str), usize>,
}

impl GraphAccumulator {
    fn add_node(&mut self, node: TraceNode) {
        if self.seen_nodes.insert(node.id.clone()) {
            self.nodes.push(node);
        }
    }

    /// A repeated (from, to, label) adds its quantity to the existing edge.
    fn add_edge(&mut self, edge: TraceEdge) {
        let key = (edge.from.clone(), edge.to.clone(), edge.label.as_str());
        match self.edge_index.get(&key) {
            Some(&idx) => {
                let existing = &mut self.edges[idx];
                if let (Some(total), Some(extra)) = (existing.quantity, edge.quantity) {
                    let extra = match (&existing.unit, &edge.unit) {
                        (Some(into), Some(from)) if into != from => {
                            convert_symbols(extra, from, into).map(|q| q.value).ok()
                        }
                        _ => Some(extra),
                    };
                    if let Some(extra) = extra {
                        existing.quantity = Some(total + extra);
                    }
                }
            }
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(edge);
            }
        }
    }
}

/// Running input/output totals in the start batch's unit
struct BalanceAccumulator {
    unit: Option<Unit>,
    unit_symbol: String,
    total_input: Decimal,
    total_output: Decimal,
}

impl BalanceAccumulator {
    fn new(unit_symbol: &str) -> Self {
        Self {
            unit: Unit::parse(unit_symbol).ok(),
            unit_symbol: unit_symbol.to_string(),
            total_input: Decimal::ZERO,
            total_output: Decimal::ZERO,
        }
    }

    fn to_start_unit(&self, quantity: Decimal, unit: &str) -> Result<Decimal, ServiceError> {
        let target = self.unit.ok_or_else(|| {
            ServiceError::ValidationError(format!("Unknown unit '{}'", self.unit_symbol))
        })?;
        Ok(convert(quantity, Unit::parse(unit)?, target)?.value)
    }

    fn add_boundary(&mut self, boundary: &ProductionBoundary, warnings: &mut Vec<String>) {
        for input in &boundary.inputs {
            match self.to_start_unit(input.quantity, &input.unit) {
                Ok(q) => self.total_input += q,
                Err(e) => warnings.push(format!(
                    "Skipped input {} {} of production batch {} in mass balance: {}",
                    input.quantity, input.unit, boundary.production_batch_id, e
                )),
            }
        }
        for output in &boundary.outputs {
            match self.to_start_unit(output.quantity, &output.unit) {
                Ok(q) => self.total_output += q,
                Err(e) => warnings.push(format!(
                    "Skipped output {} {} of production batch {} in mass balance: {}",
                    output.quantity, output.unit, boundary.production_batch_id, e
                )),
            }
        }
    }

    fn finish(self) -> Option<MassBalance> {
        MassBalance::from_totals(self.total_input, self.total_output, &self.unit_symbol)
    }
}

/// Builds backward and forward genealogy graphs from a starting stock batch
#[derive(Clone)]
pub struct TraceabilityService {
    resolver: LineageResolver,
    max_depth: usize,
}

impl TraceabilityService {
    pub fn new(db: Arc<DatabaseConnection>, max_depth: usize) -> Self {
        Self {
            resolver: LineageResolver::new(db),
            max_depth,
        }
    }

    pub fn resolver(&self) -> &LineageResolver {
        &self.resolver
    }

    /// Traces from a batch identified by its human code
    pub async fn trace_by_code(
        &self,
        batch_code: &str,
        direction: Direction,
    ) -> Result<TraceResult, ServiceError> {
        let batch = self.resolver.find_batch_by_code(batch_code).await?;
        self.trace(batch.id, direction).await
    }

    /// Reconstructs the genealogy graph reachable from `start_batch_id`.
    ///
    /// Every node is expanded at most once. Referenced rows that no longer
    /// exist end their branch; database failures abort the trace.
    #[instrument(skip(self))]
    pub async fn trace(
        &self,
        start_batch_id: Uuid,
        direction: Direction,
    ) -> Result<TraceResult, ServiceError> {
        let started = Instant::now();
        let start = self.resolver.stock_batch(start_batch_id).await?;
        let start_node = self.resolver.stock_batch_node(&start).await?;
        let start_node_id = start_node.id.clone();

        let mut graph = GraphAccumulator::default();
        let mut balance = BalanceAccumulator::new(&start.unit);
        let mut warnings = Vec::new();
        graph.add_node(start_node);

        let start_ref = NodeRef::StockBatch(start.id);
        let mut visited: HashSet<NodeRef> = HashSet::new();
        let mut queue: VecDeque<(FrontierItem, usize)> = VecDeque::new();
        let mut depth_limited = false;
        queue.push_back((
            FrontierItem {
                node: start_ref,
                via_rework: false,
            },
            0,
        ));

        while let Some((item, depth)) = queue.pop_front() {
            if !visited.insert(item.node) {
                continue;
            }

            let ctx = ResolveContext {
                include_dispatches: direction == Direction::Forward || item.node == start_ref,
                via_rework: item.via_rework,
            };

            let neighbors = match self
                .resolver
                .resolve_neighbors(item.node, direction, ctx)
                .await
            {
                Ok(n) => n,
                Err(e) if e.is_not_found() => {
                    debug!(node = ?item.node, error = %e, "Dead end in lineage");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for node in neighbors.nodes {
                graph.add_node(node);
            }
            for edge in neighbors.edges {
                graph.add_edge(edge);
            }
            warnings.extend(neighbors.warnings);
            if let Some(boundary) = &neighbors.boundary {
                balance.add_boundary(boundary, &mut warnings);
            }

            for next in neighbors.frontier {
                if visited.contains(&next.node) {
                    continue;
                }
                if depth + 1 > self.max_depth {
                    depth_limited = true;
                    continue;
                }
                queue.push_back((next, depth + 1));
            }
        }

        if depth_limited {
            warn!(batch_id = %start_batch_id, max_depth = self.max_depth, "Trace truncated at depth limit");
            warnings.push(format!(
                "Trace truncated at depth limit of {}",
                self.max_depth
            ));
        }

        let result = TraceResult {
            start_node_id,
            direction,
            nodes: graph.nodes,
            edges: graph.edges,
            mass_balance: balance.finish(),
            warnings,
        };

        counter!("batchtrace.traces.computed", 1);
        histogram!("batchtrace.traces.nodes", result.nodes.len() as f64);
        histogram!(
            "batchtrace.traces.duration_seconds",
            started.elapsed().as_secs_f64()
        );
        info!(
            batch_id = %start_batch_id,
            ?direction,
            nodes = result.nodes.len(),
            edges = result.edges.len(),
            "Trace computed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lineage_resolver::{BoundaryQuantity, EdgeLabel, NodeType};
    use rust_decimal_macros::dec;

    fn edge(from: &str, to: &str, qty: Decimal, unit: &str) -> TraceEdge {
        TraceEdge {
            from: from.into(),
            to: to.into(),
            label: EdgeLabel::Dispatched,
            quantity: Some(qty),
            unit: Some(unit.into()),
        }
    }

    #[test]
    fn repeated_edges_accumulate_quantity() {
        let mut graph = GraphAccumulator::default();
        graph.add_edge(edge("a", "b", dec!(10), "kg"));
        graph.add_edge(edge("a", "b", dec!(500), "g"));
        graph.add_edge(edge("a", "c", dec!(1), "kg"));

        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].quantity, Some(dec!(10.5)));
    }

    #[test]
    fn node_insertion_is_idempotent() {
        let mut graph = GraphAccumulator::default();
        let node = TraceNode {
            id: "customer-1".into(),
            entity_id: Uuid::nil(),
            node_type: NodeType::Customer,
            label: "CaféX".into(),
            sublabel: None,
            date: None,
            quantity: None,
            unit: None,
            allergens: None,
            status: None,
        };
        graph.add_node(node.clone());
        graph.add_node(node);
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn unconvertible_boundary_quantities_become_warnings() {
        let mut balance = BalanceAccumulator::new("kg");
        let mut warnings = Vec::new();
        let boundary = ProductionBoundary {
            production_batch_id: Uuid::nil(),
            inputs: vec![
                BoundaryQuantity {
                    quantity: dec!(48),
                    unit: "kg".into(),
                },
                BoundaryQuantity {
                    quantity: dec!(2),
                    unit: "L".into(),
                },
            ],
            outputs: vec![BoundaryQuantity {
                quantity: dec!(45000),
                unit: "g".into(),
            }],
        };
        balance.add_boundary(&boundary, &mut warnings);
        assert_eq!(warnings.len(), 1);

        let mb = balance.finish().unwrap();
        assert_eq!(mb.total_input, dec!(48));
        assert_eq!(mb.total_output, dec!(45));
        assert_eq!(mb.variance_percent, dec!(6.25));
    }
}
