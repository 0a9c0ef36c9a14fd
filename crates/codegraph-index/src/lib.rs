//! Code graph construction and multi-hop retrieval.
//!
//! Source files are parsed with tree-sitter into typed entities, linked by
//! containment, call, import, inheritance and reference edges, and embedded
//! for similarity search. Questions are answered by seeding a frontier from
//! the embedding index and expanding it along graph edges, producing an
//! answer with line-exact citations and a reasoning trace.

pub mod composer;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod indexer;
pub mod languages;
pub mod reasoning;
pub mod relations;
pub mod service;
pub mod status;
pub mod store;

pub use composer::{Citation, QueryResponse};
pub use entity::{EdgeKind, Entity, EntityKind, Relationship};
pub use error::{IndexError, ParseError, QueryError, Result};
pub use indexer::{FileTree, IndexReport, IndexerConfig};
pub use reasoning::{ReasoningConfig, ReasoningStep, StopReason};
pub use service::CodeGraphService;
pub use store::GraphStore;
