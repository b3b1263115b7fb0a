use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ember_graphics::pipeline::compute_indices;
use ember_graphics::{
    BufferDescriptor, BufferUsage, DummyBackend, GraphicsConfig, GraphicsResult, Pass,
    PassBuilder, PassContext, PassType, RenderGraph, ResourceState,
};

/// Compute pass that writes `output` and reads every buffer in `inputs`.
struct Stage {
    name: String,
    inputs: Vec<String>,
    output: String,
}

impl Stage {
    fn new(name: String, inputs: Vec<String>) -> Arc<dyn Pass> {
        Arc::new(Self {
            output: format!("{name}_out"),
            name,
            inputs,
        })
    }
}

impl Pass for Stage {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass_type(&self) -> PassType {
        PassType::Compute
    }

    fn setup(&self, builder: &mut PassBuilder<'_>) -> GraphicsResult<()> {
        for input in &self.inputs {
            if let Some(handle) = builder.lookup(input) {
                builder.read_buffer(handle, ResourceState::NON_PIXEL_SHADER_RESOURCE);
            }
        }
        let output = builder.create_transient_buffer(
            &self.output,
            &BufferDescriptor::new(1024, BufferUsage::STORAGE),
            ResourceState::COMMON,
        )?;
        builder.write_buffer(output, ResourceState::UNORDERED_ACCESS);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassContext<'_>) -> GraphicsResult<()> {
        ctx.commands().dispatch(8, 8, 1);
        Ok(())
    }
}

fn chain(len: usize) -> Vec<Arc<dyn Pass>> {
    (0..len)
        .map(|i| {
            let inputs = if i == 0 {
                Vec::new()
            } else {
                vec![format!("pass_{}_out", i - 1)]
            };
            Stage::new(format!("pass_{i}"), inputs)
        })
        .collect()
}

fn fan_out(width: usize) -> Vec<Arc<dyn Pass>> {
    let mut passes = vec![Stage::new("source".into(), Vec::new())];
    for i in 0..width {
        passes.push(Stage::new(format!("branch_{i}"), vec!["source_out".into()]));
    }
    let branches = (0..width).map(|i| format!("branch_{i}_out")).collect();
    passes.push(Stage::new("combine".into(), branches));
    passes
}

fn run_frames(c: &mut Criterion, id: &str, passes: Vec<Arc<dyn Pass>>) {
    let backend = DummyBackend::new();
    let mut graph = RenderGraph::new(backend.context(), GraphicsConfig::default());
    let mut frame = 0u64;
    c.bench_function(id, |b| {
        b.iter(|| {
            graph.reset(frame, frame as usize % 3);
            for pass in &passes {
                graph.add_pass(pass.clone()).unwrap();
            }
            graph.build().unwrap();
            graph.execute().unwrap();
            frame += 1;
            // The event log would otherwise grow without bound.
            backend.take_events();
            black_box(graph.completion_signal());
        });
    });
}

// ---------------------------------------------------------------------------
// Render graph frames
// ---------------------------------------------------------------------------

fn bench_graph_chain_32(c: &mut Criterion) {
    run_frames(c, "render_graph_frame_32_pass_chain", chain(32));
}

fn bench_graph_fan_out_32(c: &mut Criterion) {
    run_frames(c, "render_graph_frame_32_pass_fan_out", fan_out(32));
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

fn bench_compute_indices(c: &mut Criterion) {
    c.bench_function("compute_indices_1024_frames", |b| {
        b.iter(|| {
            for frame in 0..1024u64 {
                black_box(compute_indices(black_box(frame), 1, 3));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_graph_chain_32,
    bench_graph_fan_out_32,
    bench_compute_indices,
);
criterion_main!(benches);
