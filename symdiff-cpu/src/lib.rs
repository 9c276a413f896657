//! CPU only, pure rust backend for symdiff
//!
//! Initialize backend and evaluate graph.
//! ```rust
//! use symdiff_cpu::{Executor, Graph};
//! use ndarray::arr1;
//! use std::collections::BTreeMap;
//!
//! let mut dev = symdiff_cpu::device()?;
//! let mut graph = Graph::new();
//! let x = graph.placeholder("x");
//! let y = graph.mul_const(x, 5.)?;
//! let mut executor = Executor::new(&graph, &[y])?;
//! let values = executor.run(&graph, &mut dev, &BTreeMap::from([(x, arr1(&[1f32, 2.]).into_dyn())]))?;
//! assert_eq!(values[0], arr1(&[5f32, 10.]).into_dyn());
//! # Ok::<(), symdiff_cpu::SymdiffError>(())
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

mod interpreter;

pub use crate::interpreter::Interpreter;
pub use symdiff_core::{
    evaluate, Bindings, Config, Executor, Graph, Id, Node, Op, RuntimeBackend, Shape,
    SymdiffError,
};

/// Create new CPU backend
pub fn device() -> Result<Interpreter, SymdiffError> {
    Ok(Interpreter::new())
}
