use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use shnn_runtime::{LigandType, NeuralSignal, Neuron, NeuronId, OutputCallback, SynapseId, Timestamp};

struct CountingOutput {
    target: NeuronId,
    count: Arc<AtomicU64>,
}

impl OutputCallback for CountingOutput {
    fn transmit_message(&self, _signal: &NeuralSignal) -> Result<(), String> {
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn get_target_id(&self) -> NeuronId {
        self.target
    }
    fn get_weight(&self) -> f64 {
        1.0
    }
    fn get_delay(&self) -> Timestamp {
        Timestamp::from_millis(1)
    }
}

fn build_neuron(output_count: u32) -> (Neuron, Arc<AtomicU64>) {
    let neuron = Neuron::new(
        NeuronId::new(0),
        1.0,
        0.9,
        Duration::from_micros(500),
        1.0,
        5.0,
        1.0,
    )
    .expect("valid configuration");
    let count = Arc::new(AtomicU64::new(0));
    for i in 0..output_count {
        neuron.add_output_callback(
            SynapseId::new(i as u64),
            Arc::new(CountingOutput {
                target: NeuronId::new(i + 1),
                count: Arc::clone(&count),
            }),
        );
    }
    (neuron, count)
}

fn bench_receive_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("neuron_receive");

    for &fanout in &[1u32, 4u32, 16u32] {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("fanout", fanout), &fanout, |b, &fanout| {
            b.iter_batched(
                || {
                    let (neuron, count) = build_neuron(fanout);
                    neuron.start().expect("start");
                    (neuron, count)
                },
                |(neuron, _count)| {
                    for i in 0..1000u64 {
                        let signal = NeuralSignal::new(
                            1.5,
                            Timestamp::from_nanos(i * 100_000),
                            NeuronId::new(99),
                            NeuronId::new(0),
                            SynapseId::new(0),
                            LigandType::Glutamate,
                        );
                        let _ = neuron.receive(signal);
                    }
                    neuron.stop().expect("stop");
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_receive_throughput);
criterion_main!(benches);
