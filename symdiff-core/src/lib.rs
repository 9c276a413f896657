//! # symdiff-core
//!
//! symdiff-core is core part of symdiff, a library for building symbolic
//! expression graphs over multi-dimensional arrays and differentiating them.
//! symdiff-core contains definitions of nodes and their operators, the graph
//! arena, topological sort, shape inference, reverse-mode gradient
//! construction and generic executor for backends.
//!
//! Gradients are nodes in the same graph, so they can be differentiated again.
//! ```rust
//! use symdiff_core::Graph;
//! let mut graph = Graph::new();
//! let x = graph.placeholder("x");
//! let y = graph.mul(x, x)?;
//! let dx = graph.gradients(y, &[x])?;
//! let ddx = graph.gradients(dx[0], &[x])?;
//! assert_eq!(ddx.len(), 1);
//! # Ok::<(), symdiff_core::SymdiffError>(())
//! ```
#![forbid(unsafe_code)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::missing_crate_level_docs)]
#![forbid(rustdoc::private_doc_tests)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::invalid_html_tags)]
#![forbid(rustdoc::invalid_rust_codeblocks)]
#![forbid(rustdoc::bare_urls)]
#![forbid(rustdoc::unescaped_backticks)]
#![forbid(rustdoc::redundant_explicit_links)]

mod autograd;
/// See [Config](config::Config)
pub mod config;
/// See [SymdiffError](error::SymdiffError)
pub mod error;
/// See [Graph](graph::Graph)
pub mod graph;
/// See [Node](node::Node)
pub mod node;
/// See [Executor](runtime::Executor)
pub mod runtime;
/// See [Shape](shape::Shape)
pub mod shape;
mod utils;

pub use config::Config;
pub use error::SymdiffError;
pub use graph::Graph;
pub use node::{id, Id, Node, Op};
pub use runtime::{evaluate, Bindings, Executor, RuntimeBackend};
pub use shape::Shape;
