use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dasp_graph::node::Sum;
use dasp_graph::{Buffer, Input, Node, NodeData};
use klangkern::dsp::BiquadType;
use klangkern::nodes::{CrossfaderMessage, CrossfaderNode, FilteredDelayNode, ThreeBandEqNode};
use klangkern::{AudioNode, BoxedNode, Error, NodeRunner, ProcessContext};
use petgraph::prelude::NodeIndex;

type Graph = petgraph::graph::Graph<NodeData<BoxedNode>, ()>;
type Processor = dasp_graph::Processor<Graph>;

const SR: u32 = 48_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ctx() -> ProcessContext {
    ProcessContext::new(SR).unwrap()
}

/// Outputs a fixed level on every channel.
struct Constant(f32);

impl Node for Constant {
    fn process(&mut self, _inputs: &[Input], output: &mut [Buffer]) {
        for buffer in output.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = self.0);
        }
    }
}

/// A single 1.0 at the very first sample, silence afterwards.
struct Impulse {
    fired: bool,
}

impl Node for Impulse {
    fn process(&mut self, _inputs: &[Input], output: &mut [Buffer]) {
        output[0].silence();
        if !self.fired {
            output[0][0] = 1.0;
            self.fired = true;
        }
    }
}

fn source(g: &mut Graph, node: impl Node + Send + 'static) -> NodeIndex {
    g.add_node(NodeData::new1(BoxedNode::new(node)))
}

/// Process `blocks` blocks up to `endpoint`, collecting its first output channel.
fn render(p: &mut Processor, g: &mut Graph, endpoint: NodeIndex, blocks: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(blocks * Buffer::LEN);
    for _ in 0..blocks {
        p.process(g, endpoint);
        out.extend_from_slice(&g[endpoint].buffers[0]);
    }
    out
}

#[test]
/// An impulse comes out of the delay exactly `delay` samples later, then
/// again scaled by the feedback.
fn filtered_delay_in_graph() {
    init_tracing();
    let mut g = Graph::with_capacity(8, 8);
    let mut p = Processor::with_capacity(8);

    let (runner, mut handle) = NodeRunner::new(FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap(), ctx());
    let i_in = source(&mut g, Impulse { fired: false });
    let i_delay = g.add_node(runner.into_boxed());
    g.add_edge(i_in, i_delay, ());

    handle.set_int(FilteredDelayNode::FILTER_TYPE, BiquadType::Identity as i32).unwrap();
    handle.set_float(FilteredDelayNode::INTERPOLATION_TIME, 0.0).unwrap();
    handle.set_float(FilteredDelayNode::DELAY, 100.0 / SR as f32).unwrap();
    handle.set_float(FilteredDelayNode::FEEDBACK, 0.5).unwrap();

    let out = render(&mut p, &mut g, i_delay, 5);
    for (t, &s) in out.iter().enumerate() {
        let expected = match t {
            100 => 1.0,
            200 => 0.5,
            300 => 0.25,
            _ => 0.0,
        };
        assert_eq!(s, expected, "sample {}", t);
    }
}

#[test]
/// The control side gets errors back immediately; the audio side keeps going.
fn handle_rejects_bad_writes() {
    init_tracing();
    let node = FilteredDelayNode::new(&ctx(), 0.1, 2).unwrap();
    let (mut runner, mut handle) = NodeRunner::new(node, ctx());

    assert!(matches!(
        handle.set_float(FilteredDelayNode::DELAY, 0.2),
        Err(Error::Range { name: "delay", .. })
    ));
    assert_eq!(
        handle.set_float(FilteredDelayNode::DELAY_MAX, 0.2),
        Err(Error::ReadOnly("delay_max"))
    );
    assert_eq!(handle.find("feedback"), Some(FilteredDelayNode::FEEDBACK));

    handle.set_float(FilteredDelayNode::DELAY, 0.05).unwrap();
    let inputs = vec![Buffer::SILENT; 2];
    let mut outputs = vec![Buffer::SILENT; 2];
    runner.run_block(&inputs, &mut outputs);
    assert_eq!(runner.node().properties().float(FilteredDelayNode::DELAY), 0.05);
    assert_eq!(runner.node().delay_samples(), 2_400);
}

#[test]
/// Two sources summed into an equalizer cut by 6 dB across all bands.
fn eq_after_sum() {
    init_tracing();
    let mut g = Graph::with_capacity(8, 8);
    let mut p = Processor::with_capacity(8);

    let (runner, mut handle) = NodeRunner::new(ThreeBandEqNode::new(&ctx(), 1).unwrap(), ctx());
    let i_a = source(&mut g, Constant(0.5));
    let i_b = source(&mut g, Constant(0.5));
    let i_mix = source(&mut g, Sum);
    let i_eq = g.add_node(runner.into_boxed());
    g.add_edge(i_a, i_mix, ());
    g.add_edge(i_b, i_mix, ());
    g.add_edge(i_mix, i_eq, ());

    for id in [
        ThreeBandEqNode::LOWBAND_DBGAIN,
        ThreeBandEqNode::MIDBAND_DBGAIN,
        ThreeBandEqNode::HIGHBAND_DBGAIN,
    ] {
        handle.set_float(id, -6.0).unwrap();
    }

    let out = render(&mut p, &mut g, i_eq, 50);
    let settled = out[out.len() - 1];
    assert!((settled - 0.501).abs() < 1e-3, "settled at {}", settled);
}

#[test]
/// Crossfading between two constant sources ends on the other source, moves
/// monotonically and reports completion once.
fn crossfade_between_sources() {
    init_tracing();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    let node = CrossfaderNode::new(&ctx(), 1, 2).unwrap().with_finished_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut g = Graph::with_capacity(8, 8);
    let mut p = Processor::with_capacity(8);
    let (runner, mut handle) = NodeRunner::new(node, ctx());
    let i_low = source(&mut g, Constant(0.25));
    let i_high = source(&mut g, Constant(0.75));
    let i_fade = g.add_node(runner.into_boxed());
    g.add_edge(i_low, i_fade, ());
    g.add_edge(i_high, i_fade, ());

    // Input order is up to the scheduler; only rely on "one, then the other".
    let idle = render(&mut p, &mut g, i_fade, 2);
    let from = idle[0];
    assert!(from == 0.25 || from == 0.75);
    assert!(idle.iter().all(|&s| s == from));
    let to = 1.0 - from;

    handle
        .send(CrossfaderMessage::Crossfade { duration: 0.01, input: 1 })
        .unwrap();
    let fade = render(&mut p, &mut g, i_fade, 10);
    for t in 1..fade.len() {
        assert!((fade[t] - fade[t - 1]) * (to - from) >= -1e-6, "sample {}", t);
    }
    assert!((fade[fade.len() - 1] - to).abs() < 1e-6);
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // Fading back instantly completes on the next block
    handle
        .send(CrossfaderMessage::Crossfade { duration: 0.0, input: 0 })
        .unwrap();
    let back = render(&mut p, &mut g, i_fade, 1);
    assert!(back.iter().all(|&s| (s - from).abs() < 1e-6));
    assert_eq!(finished.load(Ordering::SeqCst), 2);
}

#[test]
fn reset_through_handle() {
    init_tracing();
    let (mut runner, mut handle) = NodeRunner::new(FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap(), ctx());
    handle.set_float(FilteredDelayNode::FEEDBACK, 0.9).unwrap();

    let mut loud = vec![Buffer::SILENT; 1];
    loud[0].iter_mut().for_each(|s| *s = 1.0);
    let mut out = vec![Buffer::SILENT; 1];
    for _ in 0..10 {
        runner.run_block(&loud, &mut out);
    }
    assert!(out[0].iter().any(|&s| s != 0.0));

    handle.reset().unwrap();
    runner.run_block(&[Buffer::SILENT], &mut out);
    assert!(out[0].iter().all(|&s| s == 0.0));
}
