use thiserror::Error;

use crate::descriptor::LayerGroup;

/// Failures a [`crate::descriptor::NodeFactory`] can return while
/// building a configured node instance: a flat set of `#[error("...")]`
/// variants, each naming the offending node type.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node config for \"{type_name}\" is invalid: {source}")]
    InvalidConfig {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("node \"{type_name}\" rejected its configuration: {reason}")]
    Rejected {
        type_name: &'static str,
        reason: String,
    },
}

/// Failures that can occur while assembling a chain from node
/// instances, before any event is ever dispatched through it
///
/// Every variant here is a static property of the chain's node list
/// that a correctly written configuration never violates; they exist so
/// a misconfigured chain is rejected at build time with a precise
/// diagnostic rather than surfacing as an obscure panic the first time
/// an event reaches the offending node.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("chain must have at least one node")]
    EmptyChain,

    #[error(
        "node {index} (\"{type_name}\") requires chain position {expected:?} but is not positioned there"
    )]
    BadPosition {
        index: usize,
        type_name: &'static str,
        expected: &'static str,
    },

    #[error(
        "node {index} (\"{type_name}\", layer {layer:?}) is not compatible with its neighbor node {neighbor_index} (\"{neighbor_type_name}\", layer {neighbor_layer:?})"
    )]
    IncompatibleLayers {
        index: usize,
        type_name: &'static str,
        layer: LayerGroup,
        neighbor_index: usize,
        neighbor_type_name: &'static str,
        neighbor_layer: LayerGroup,
    },

    #[error("node {index} (\"{type_name}\") failed to build: {source}")]
    Factory {
        index: usize,
        type_name: &'static str,
        #[source]
        source: NodeError,
    },
}
