//! klangkern - realtime DSP nodes for block-based audio graphs
//!
//! Design principles:
//! - `process()` never allocates, locks or fails; everything is sized at construction
//! - Parameters are typed, range-checked properties with revision counters
//! - Control-side writes travel through `rtrb` queues and land between blocks
//! - Scheduling is someone else's job; nodes plug into `dasp_graph` or anything
//!   that can call [`NodeRunner::run_block`]
//!
//! ```
//! use dasp_graph::Buffer;
//! use klangkern::nodes::FilteredDelayNode;
//! use klangkern::{AudioNode, NodeRunner, ProcessContext};
//!
//! let ctx = ProcessContext::new(48_000)?;
//! let node = FilteredDelayNode::new(&ctx, 1.0, 2)?;
//! let (mut runner, mut handle) = NodeRunner::new(node, ctx);
//!
//! handle.set_float(FilteredDelayNode::DELAY, 0.25)?;
//! handle.set_float(FilteredDelayNode::FEEDBACK, 0.4)?;
//!
//! let inputs = vec![Buffer::SILENT; 2];
//! let mut outputs = vec![Buffer::SILENT; 2];
//! runner.run_block(&inputs, &mut outputs);
//! assert_eq!(runner.node().properties().float(FilteredDelayNode::DELAY), 0.25);
//! # Ok::<(), klangkern::Error>(())
//! ```

extern crate alloc;

pub mod dsp;
mod error;
mod node;
pub mod nodes;
mod property;
mod runner;

pub use error::{Error, Result};
pub use node::{AudioNode, Control, ProcessContext};
pub use property::{Properties, Property, PropertyDescriptor, PropertyId, PropertyKind, PropertyValue, ValueType};
pub use runner::{BoxedNode, Handle, NodeRunner, DEFAULT_QUEUE_CAPACITY};
