use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    entities::{
        delivery, delivery_line, dispatch_record, production_batch, production_batch_input,
        stock_batch::{self, Provenance},
        stock_item, supplier,
    },
    errors::ServiceError,
};

/// Which way a trace walks the genealogy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards suppliers
    Backward,
    /// Towards customers
    Forward,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self, ServiceError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backward" | "back" | "up" => Ok(Direction::Backward),
            "forward" | "fwd" | "down" => Ok(Direction::Forward),
            other => Err(ServiceError::ValidationError(format!(
                "Unknown trace direction '{}'",
                other
            ))),
        }
    }
}

/// Entities the traversal can expand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    StockBatch(Uuid),
    ProductionBatch(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Supplier,
    RawMaterialBatch,
    ProductionBatch,
    FinishedProductBatch,
    Customer,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Supplier => "supplier",
            NodeType::RawMaterialBatch => "raw_material_batch",
            NodeType::ProductionBatch => "production_batch",
            NodeType::FinishedProductBatch => "finished_product_batch",
            NodeType::Customer => "customer",
        }
    }

    /// Raw or finished, depending on where the batch came from
    pub fn for_provenance(provenance: &Provenance) -> Self {
        if provenance.is_produced() {
            NodeType::FinishedProductBatch
        } else {
            NodeType::RawMaterialBatch
        }
    }
}

/// Stable graph id, `"{type}-{uuid}"`
pub fn node_id(node_type: NodeType, id: Uuid) -> String {
    format!("{}-{}", node_type.as_str(), id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub id: String,
    pub entity_id: Uuid,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sublabel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergens: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TraceNode {
    fn bare(node_type: NodeType, id: Uuid, label: impl Into<String>) -> Self {
        Self {
            id: node_id(node_type, id),
            entity_id: id,
            node_type,
            label: label.into(),
            sublabel: None,
            date: None,
            quantity: None,
            unit: None,
            allergens: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    Supplied,
    Input,
    #[serde(rename = "Rework Input")]
    ReworkInput,
    Output,
    #[serde(rename = "Rework Output")]
    ReworkOutput,
    Dispatched,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Supplied => "Supplied",
            EdgeLabel::Input => "Input",
            EdgeLabel::ReworkInput => "Rework Input",
            EdgeLabel::Output => "Output",
            EdgeLabel::ReworkOutput => "Rework Output",
            EdgeLabel::Dispatched => "Dispatched",
        }
    }

    fn input(is_rework: bool) -> Self {
        if is_rework {
            EdgeLabel::ReworkInput
        } else {
            EdgeLabel::Input
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEdge {
    pub from: String,
    pub to: String,
    pub label: EdgeLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A node still to be expanded, with how it was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierItem {
    pub node: NodeRef,
    pub via_rework: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundaryQuantity {
    pub quantity: Decimal,
    pub unit: String,
}

/// Everything that went into and came out of one production run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionBoundary {
    pub production_batch_id: Uuid,
    pub inputs: Vec<BoundaryQuantity>,
    pub outputs: Vec<BoundaryQuantity>,
}

#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    pub nodes: Vec<TraceNode>,
    pub edges: Vec<TraceEdge>,
    pub frontier: Vec<FrontierItem>,
    pub boundary: Option<ProductionBoundary>,
    pub warnings: Vec<String>,
}

/// How the node being resolved was reached
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveContext {
    pub include_dispatches: bool,
    pub via_rework: bool,
}

/// Read-only lookups of a node's immediate neighbours
#[derive(Clone)]
pub struct LineageResolver {
    db: Arc<DatabaseConnection>,
}

impl LineageResolver {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_batch_by_code(&self, code: &str) -> Result<stock_batch::Model, ServiceError> {
        let trimmed = code.trim();
        let found = stock_batch::Entity::find()
            .filter(
                Condition::any()
                    .add(stock_batch::Column::BatchCode.eq(trimmed))
                    .add(stock_batch::Column::BatchCode.eq(trimmed.to_uppercase())),
            )
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        found.ok_or_else(|| ServiceError::NotFound(format!("Stock batch '{}' not found", trimmed)))
    }

    pub async fn stock_batch(&self, id: Uuid) -> Result<stock_batch::Model, ServiceError> {
        stock_batch::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock batch {} not found", id)))
    }

    async fn production_batch(&self, id: Uuid) -> Result<production_batch::Model, ServiceError> {
        production_batch::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Production batch {} not found", id)))
    }

    /// Graph node for a stock batch, with the item name as sublabel
    pub async fn stock_batch_node(
        &self,
        batch: &stock_batch::Model,
    ) -> Result<TraceNode, ServiceError> {
        let node_type = match batch.provenance() {
            Ok(p) => NodeType::for_provenance(&p),
            Err(_) => NodeType::RawMaterialBatch,
        };
        let item = stock_item::Entity::find_by_id(batch.stock_item_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let mut node = TraceNode::bare(node_type, batch.id, batch.batch_code.clone());
        node.sublabel = item.map(|i| i.name);
        node.date = batch.use_by_date.or(batch.best_before_date);
        node.quantity = Some(batch.quantity_received);
        node.unit = Some(batch.unit.clone());
        node.allergens = Some(batch.allergen_list());
        node.status = Some(batch.status.clone());
        Ok(node)
    }

    fn production_node(pb: &production_batch::Model) -> TraceNode {
        let mut node = TraceNode::bare(NodeType::ProductionBatch, pb.id, pb.batch_code.clone());
        node.date = Some(pb.production_date);
        node.status = Some(pb.status.clone());
        node
    }

    async fn outputs_of(&self, pb_id: Uuid) -> Result<Vec<stock_batch::Model>, ServiceError> {
        stock_batch::Entity::find()
            .filter(stock_batch::Column::ProductionBatchId.eq(pb_id))
            .order_by_asc(stock_batch::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn inputs_of(
        &self,
        pb: &production_batch::Model,
    ) -> Result<Vec<production_batch_input::Model>, ServiceError> {
        pb.find_related(production_batch_input::Entity)
            .order_by_asc(production_batch_input::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// All input and output quantities of a production run
    pub async fn production_boundary(
        &self,
        pb: &production_batch::Model,
    ) -> Result<ProductionBoundary, ServiceError> {
        let inputs = self.inputs_of(pb).await?;
        let outputs = self.outputs_of(pb.id).await?;
        Ok(ProductionBoundary {
            production_batch_id: pb.id,
            inputs: inputs
                .iter()
                .map(|i| BoundaryQuantity {
                    quantity: i.effective_quantity(),
                    unit: i.unit.clone(),
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|o| BoundaryQuantity {
                    quantity: o.quantity_received,
                    unit: o.unit.clone(),
                })
                .collect(),
        })
    }

    /// Immediate neighbours of `node` in `direction`.
    ///
    /// Fails with `NotFound` only when `node` itself does not exist; dangling
    /// references further out are skipped and reported in `warnings`.
    pub async fn resolve_neighbors(
        &self,
        node: NodeRef,
        direction: Direction,
        ctx: ResolveContext,
    ) -> Result<Neighbors, ServiceError> {
        match (node, direction) {
            (NodeRef::StockBatch(id), Direction::Backward) => self.batch_backward(id, ctx).await,
            (NodeRef::StockBatch(id), Direction::Forward) => self.batch_forward(id, ctx).await,
            (NodeRef::ProductionBatch(id), Direction::Backward) => {
                self.production_backward(id).await
            }
            (NodeRef::ProductionBatch(id), Direction::Forward) => {
                self.production_forward(id).await
            }
        }
    }

    async fn push_dispatches(
        &self,
        batch: &stock_batch::Model,
        from: &str,
        out: &mut Neighbors,
    ) -> Result<(), ServiceError> {
        let dispatches = dispatch_record::Entity::find()
            .filter(dispatch_record::Column::StockBatchId.eq(batch.id))
            .order_by_asc(dispatch_record::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        for dispatch in dispatches {
            let mut customer =
                TraceNode::bare(NodeType::Customer, dispatch.customer_id, dispatch.customer_name);
            customer.date = Some(dispatch.dispatch_date);
            out.edges.push(TraceEdge {
                from: from.to_string(),
                to: customer.id.clone(),
                label: EdgeLabel::Dispatched,
                quantity: Some(dispatch.quantity),
                unit: Some(dispatch.unit),
            });
            out.nodes.push(customer);
        }
        Ok(())
    }

    async fn batch_backward(&self, id: Uuid, ctx: ResolveContext) -> Result<Neighbors, ServiceError> {
        let batch = self.stock_batch(id).await?;
        let this = self.stock_batch_node(&batch).await?;
        let mut out = Neighbors::default();

        if ctx.include_dispatches {
            self.push_dispatches(&batch, &this.id, &mut out).await?;
        }

        let provenance = match batch.provenance() {
            Ok(p) => p,
            Err(e) => {
                out.warnings.push(format!("{}: {}", batch.batch_code, e));
                return Ok(out);
            }
        };

        match provenance {
            Provenance::Produced(pb_id) => {
                let pb = match self.production_batch(pb_id).await {
                    Ok(pb) => pb,
                    Err(e) if e.is_not_found() => {
                        debug!(batch_id = %id, production_batch_id = %pb_id, "Producing run missing");
                        out.warnings.push(e.to_string());
                        return Ok(out);
                    }
                    Err(e) => return Err(e),
                };
                let pb_node = Self::production_node(&pb);
                out.edges.push(TraceEdge {
                    from: pb_node.id.clone(),
                    to: this.id.clone(),
                    label: if ctx.via_rework {
                        EdgeLabel::ReworkOutput
                    } else {
                        EdgeLabel::Output
                    },
                    quantity: Some(batch.quantity_received),
                    unit: Some(batch.unit.clone()),
                });
                out.nodes.push(pb_node);
                out.frontier.push(FrontierItem {
                    node: NodeRef::ProductionBatch(pb.id),
                    via_rework: false,
                });
            }
            Provenance::Delivered(line_id) => {
                let Some(supplier_node) = self.supplier_node(line_id).await? else {
                    out.warnings.push(format!(
                        "{}: delivery line {} has no supplier",
                        batch.batch_code, line_id
                    ));
                    return Ok(out);
                };
                out.edges.push(TraceEdge {
                    from: supplier_node.id.clone(),
                    to: this.id.clone(),
                    label: EdgeLabel::Supplied,
                    quantity: Some(batch.quantity_received),
                    unit: Some(batch.unit.clone()),
                });
                out.nodes.push(supplier_node);
            }
        }

        Ok(out)
    }

    async fn supplier_node(&self, line_id: Uuid) -> Result<Option<TraceNode>, ServiceError> {
        let db = self.db.as_ref();
        let Some(line) = delivery_line::Entity::find_by_id(line_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };
        let Some(delivery) = line
            .find_related(delivery::Entity)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };
        let supplier = delivery
            .find_related(supplier::Entity)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(supplier.map(|s| {
            let mut node = TraceNode::bare(NodeType::Supplier, s.id, s.name);
            node.sublabel = Some(s.approval_status);
            node.date = Some(delivery.delivery_date);
            node
        }))
    }

    async fn production_backward(&self, id: Uuid) -> Result<Neighbors, ServiceError> {
        let pb = self.production_batch(id).await?;
        let pb_node_id = node_id(NodeType::ProductionBatch, pb.id);
        let mut out = Neighbors::default();

        for input in self.inputs_of(&pb).await? {
            // The consumed batch is always part of the lineage
            self.push_input_source(
                &pb_node_id,
                input.stock_batch_id,
                EdgeLabel::input(input.is_rework),
                Some((input.effective_quantity(), input.unit.clone())),
                &mut out,
            )
            .await?;

            if let Some(source_id) = input.rework_source() {
                self.push_input_source(&pb_node_id, source_id, EdgeLabel::ReworkInput, None, &mut out)
                    .await?;
            }
        }

        out.boundary = Some(self.production_boundary(&pb).await?);
        Ok(out)
    }

    /// Adds a batch feeding a run. A missing batch ends the branch with a warning.
    async fn push_input_source(
        &self,
        pb_node_id: &str,
        batch_id: Uuid,
        label: EdgeLabel,
        amount: Option<(Decimal, String)>,
        out: &mut Neighbors,
    ) -> Result<(), ServiceError> {
        let source = match self.stock_batch(batch_id).await {
            Ok(b) => b,
            Err(e) if e.is_not_found() => {
                debug!(production_node = %pb_node_id, source_id = %batch_id, "Input source missing");
                out.warnings.push(e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let source_node = self.stock_batch_node(&source).await?;
        let (quantity, unit) = amount.unzip();
        out.edges.push(TraceEdge {
            from: source_node.id.clone(),
            to: pb_node_id.to_string(),
            label,
            quantity,
            unit,
        });
        out.nodes.push(source_node);
        out.frontier.push(FrontierItem {
            node: NodeRef::StockBatch(source.id),
            via_rework: label == EdgeLabel::ReworkInput,
        });
        Ok(())
    }

    async fn batch_forward(&self, id: Uuid, ctx: ResolveContext) -> Result<Neighbors, ServiceError> {
        let batch = self.stock_batch(id).await?;
        let this_id = self.stock_batch_node(&batch).await?.id;
        let mut out = Neighbors::default();

        if ctx.include_dispatches {
            self.push_dispatches(&batch, &this_id, &mut out).await?;
        }

        let consuming = production_batch_input::Entity::find()
            .filter(
                Condition::any()
                    .add(production_batch_input::Column::StockBatchId.eq(id))
                    .add(production_batch_input::Column::ReworkSourceBatchId.eq(id)),
            )
            .order_by_asc(production_batch_input::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        for input in consuming {
            let pb = match self.production_batch(input.production_batch_id).await {
                Ok(pb) => pb,
                Err(e) if e.is_not_found() => {
                    out.warnings.push(e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };
            let pb_node = Self::production_node(&pb);
            out.edges.push(TraceEdge {
                from: this_id.clone(),
                to: pb_node.id.clone(),
                label: EdgeLabel::input(input.is_rework),
                quantity: Some(input.effective_quantity()),
                unit: Some(input.unit.clone()),
            });
            out.nodes.push(pb_node);
            out.frontier.push(FrontierItem {
                node: NodeRef::ProductionBatch(pb.id),
                via_rework: input.is_rework,
            });
        }

        Ok(out)
    }

    async fn production_forward(&self, id: Uuid) -> Result<Neighbors, ServiceError> {
        let pb = self.production_batch(id).await?;
        let pb_node_id = node_id(NodeType::ProductionBatch, pb.id);
        let mut out = Neighbors::default();

        for output in self.outputs_of(pb.id).await? {
            let node = self.stock_batch_node(&output).await?;
            out.edges.push(TraceEdge {
                from: pb_node_id.clone(),
                to: node.id.clone(),
                label: EdgeLabel::Output,
                quantity: Some(output.quantity_received),
                unit: Some(output.unit.clone()),
            });
            out.nodes.push(node);
            out.frontier.push(FrontierItem {
                node: NodeRef::StockBatch(output.id),
                via_rework: false,
            });
        }

        out.boundary = Some(self.production_boundary(&pb).await?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_embed_type_and_uuid() {
        let id = Uuid::nil();
        assert_eq!(
            node_id(NodeType::FinishedProductBatch, id),
            "finished_product_batch-00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn edge_labels_serialize_for_display() {
        assert_eq!(
            serde_json::to_string(&EdgeLabel::ReworkInput).unwrap(),
            "\"Rework Input\""
        );
        assert_eq!(EdgeLabel::input(false), EdgeLabel::Input);
    }

    #[test]
    fn direction_parses_aliases() {
        assert_eq!(Direction::parse("Forward").unwrap(), Direction::Forward);
        assert_eq!(Direction::parse("back").unwrap(), Direction::Backward);
        assert!(Direction::parse("sideways").is_err());
    }
}
