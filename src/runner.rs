//! Drives one node from a scheduler and feeds it control messages.
//!
//! A [`NodeRunner`] lives on the audio thread next to the node it owns. The
//! matching [`Handle`] stays on the control thread. Every control call is
//! validated on the control side, then travels through a lock-free `rtrb` queue
//! and is applied at the top of the next block, so a property never changes
//! while a block is being rendered.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use dasp_graph::{Buffer, Input, NodeData};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::node::{AudioNode, Control, ProcessContext};
use crate::property::{PropertyDescriptor, PropertyId, PropertyValue};

/// Default number of control messages that can be pending for one node.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A type-erased node as stored in a `dasp_graph` graph.
///
/// Lets runners for different node types, and plain `dasp_graph` nodes such
/// as `Sum`, share one graph.
pub struct BoxedNode(Box<dyn dasp_graph::Node + Send>);

impl BoxedNode {
    pub fn new(node: impl dasp_graph::Node + Send + 'static) -> Self {
        Self(Box::new(node))
    }
}

impl dasp_graph::Node for BoxedNode {
    #[inline]
    fn process(&mut self, inputs: &[Input], output: &mut [Buffer]) {
        self.0.process(inputs, output);
    }
}

/// Owns a node and the receiving end of its control queue.
pub struct NodeRunner<N: AudioNode> {
    node: N,
    receiver: Consumer<Control<N::Message>>,
    ctx: ProcessContext,
    /// Flattened scheduler inputs, sized once to `node.num_inputs()`.
    scratch: Vec<Buffer>,
}

impl<N: AudioNode> NodeRunner<N> {
    pub fn new(node: N, ctx: ProcessContext) -> (Self, Handle<N::Message>) {
        Self::with_queue_capacity(node, ctx, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(node: N, ctx: ProcessContext, capacity: usize) -> (Self, Handle<N::Message>) {
        let (producer, consumer) = RingBuffer::new(capacity);
        let descriptors = node.properties().descriptors();
        let scratch = vec![Buffer::SILENT; node.num_inputs()];
        debug!(
            inputs = node.num_inputs(),
            outputs = node.num_outputs(),
            capacity,
            "node runner created"
        );

        let runner = Self {
            node,
            receiver: consumer,
            ctx,
            scratch,
        };
        let handle = Handle {
            sender: producer,
            descriptors,
        };
        (runner, handle)
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut N {
        &mut self.node
    }

    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    /// Apply everything that is queued. Called by [`run_block`](Self::run_block).
    pub fn apply_pending(&mut self) {
        // Split borrow so the queue can be drained while the node is mutated
        let receiver = &mut self.receiver;
        let node = &mut self.node;

        while let Ok(control) = receiver.pop() {
            match control {
                Control::SetProperty(id, value) => {
                    if let Err(e) = node.properties_mut().set(id, value) {
                        warn!(error = %e, "dropping property write");
                    }
                }
                Control::Reset => node.reset(),
                Control::Node(message) => node.handle_message(message),
            }
        }
    }

    /// Apply pending control messages, then render one block.
    ///
    /// `inputs` and `outputs` are flat channel lists, see [`AudioNode`].
    pub fn run_block(&mut self, inputs: &[Buffer], outputs: &mut [Buffer]) {
        self.apply_pending();
        self.node.process(&self.ctx, inputs, outputs);
    }

    /// Output buffers for this node, ready to be added to a `dasp_graph` graph.
    pub fn node_data(self) -> NodeData<Self> {
        let buffers = vec![Buffer::SILENT; self.node.num_outputs()];
        NodeData::new(self, buffers)
    }

    /// Like [`node_data`](Self::node_data), boxed so nodes of different types
    /// can share one graph.
    pub fn into_boxed(self) -> NodeData<BoxedNode> {
        let buffers = vec![Buffer::SILENT; self.node.num_outputs()];
        NodeData::new(BoxedNode::new(self), buffers)
    }
}

impl<N: AudioNode> dasp_graph::Node for NodeRunner<N> {
    /// Channels of every incoming edge are laid out one after another, in the
    /// order the scheduler lists the edges. Surplus channels are ignored and
    /// missing ones read as silence.
    fn process(&mut self, inputs: &[Input], output: &mut [Buffer]) {
        let mut slots = self.scratch.iter_mut();
        for buffer in inputs.iter().flat_map(|input| input.buffers()) {
            match slots.next() {
                Some(slot) => slot.copy_from_slice(buffer),
                None => break,
            }
        }
        slots.for_each(Buffer::silence);

        self.apply_pending();
        self.node.process(&self.ctx, &self.scratch, output);
    }
}

/// Control-thread side of a [`NodeRunner`].
///
/// Property writes are checked here against a snapshot of the node's
/// descriptors, so a bad value is reported to the caller immediately instead
/// of being discovered on the audio thread.
pub struct Handle<M: Send + 'static> {
    sender: Producer<Control<M>>,
    descriptors: Vec<PropertyDescriptor>,
}

impl<M: Send + 'static> Handle<M> {
    /// Look a property up by name.
    pub fn find(&self, name: &str) -> Option<PropertyId> {
        self.descriptors
            .iter()
            .position(|d| d.name == name)
            .map(PropertyId::new)
    }

    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    /// Validate and queue a property write.
    pub fn set(&mut self, id: PropertyId, value: impl Into<PropertyValue>) -> Result<()> {
        let descriptor = self
            .descriptors
            .get(id.index())
            .ok_or(Error::UnknownProperty(id.index()))?;
        if descriptor.read_only {
            return Err(Error::ReadOnly(descriptor.name));
        }
        let value = descriptor.validate(value.into())?;
        self.push(Control::SetProperty(id, value))
    }

    pub fn set_float(&mut self, id: PropertyId, value: f32) -> Result<()> {
        self.set(id, value)
    }

    pub fn set_int(&mut self, id: PropertyId, value: i32) -> Result<()> {
        self.set(id, value)
    }

    /// Ask the node to clear its filter and delay memory.
    pub fn reset(&mut self) -> Result<()> {
        self.push(Control::Reset)
    }

    /// Send a node-specific message (applied next process cycle).
    pub fn send(&mut self, message: M) -> Result<()> {
        self.push(Control::Node(message))
    }

    /// Free space in the control queue.
    pub fn slots(&self) -> usize {
        self.sender.slots()
    }

    fn push(&mut self, control: Control<M>) -> Result<()> {
        self.sender.push(control).map_err(|_| Error::QueueFull)
    }
}
