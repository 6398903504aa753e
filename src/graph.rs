use std::collections::{HashMap, HashSet};
use tabbycat::{GraphBuilder, GraphType, Identity, Edge, StmtList, AttrList, AttrType};
use tabbycat::attributes::{shape, label, Shape, RankDir, rankdir};
use crate::engine::{Operation, Value};
use crate::error::{Error, Result};

fn trace(root: &Value) -> (HashMap<usize, Value>, HashSet<(usize, usize)>) {
    let mut nodes = HashMap::new();
    let mut edges = HashSet::new();

    for node in root.topological_order() {
        for producer in node.producers() {
            edges.insert((producer.id(), node.id()));
        }
        nodes.insert(node.id(), node);
    }

    (nodes, edges)
}

fn identity(id: String) -> Result<Identity> {
    Identity::id(id).map_err(|e| Error::Graph(e.to_string()))
}

fn operation_identity(node_id: usize) -> Result<Identity> {
    identity(format!("node_{}_op", node_id))
}

/// Renders every node reachable from `root` as a Graphviz record
/// (`label | data | grad`), with an operation bubble in front of each
/// non-leaf node. Edges run from producers to the consuming operation.
pub fn create_graph(root: &Value) -> Result<tabbycat::Graph> {
    let (nodes, edges) = trace(root);

    // Sorted so repeated renders of the same graph are identical.
    let mut node_ids: Vec<&usize> = nodes.keys().collect();
    node_ids.sort();
    let mut edge_list: Vec<&(usize, usize)> = edges.iter().collect();
    edge_list.sort();

    let mut node_statements = StmtList::new();
    for node_id in node_ids {
        let node = &nodes[node_id];
        let node_identity = identity(format!("node_{}", node_id))?;

        node_statements = node_statements.add_node(
            node_identity.clone(),
            None,
            Some(
                AttrList::new()
                    .add_pair(label(&format!(
                        "{} | data: {:.4} | grad: {:.4}",
                        node.label().unwrap_or_else(|| "?".to_string()),
                        node.data(),
                        node.grad()
                    )))
            ),
        );

        if node.operation() != Operation::Input {
            let node_operation_identity = operation_identity(*node_id)?;

            node_statements = node_statements
                .add_node(
                    node_operation_identity.clone(),
                    None,
                    Some(
                        AttrList::new()
                            .add_pair(label(&node.operation().symbol()))
                            .add_pair(shape(Shape::Circle))
                    ),
                )
                .add_edge(
                    Edge::head_node(node_operation_identity, None)
                        .arrow_to_node(node_identity, None)
                );
        }
    }

    let mut edge_statements = StmtList::new();
    for (producer_id, consumer_id) in edge_list {
        edge_statements = edge_statements.add_edge(
            Edge::head_node(identity(format!("node_{}", producer_id))?, None)
                .arrow_to_node(operation_identity(*consumer_id)?, None)
        );
    }

    GraphBuilder::default()
        .strict(true)
        .graph_type(GraphType::DiGraph)
        .id(identity("G".to_string())?)
        .stmts(
            StmtList::new()
                .add_attr(
                    AttrType::Graph,
                    AttrList::new()
                        .add_pair(rankdir(RankDir::LR))
                )
                .add_attr(
                    AttrType::Node,
                    AttrList::new()
                        // Tabbycat doesn't seem to support: `shape(Shape::Mrecord)`
                        .add_pair((
                            identity("shape".to_string())?,
                            identity("Mrecord".to_string())?,
                        ))
                )
                .extend(node_statements)
                .extend(edge_statements)
        )
        .build()
        .map_err(|e| Error::Graph(e.to_string()))
}
