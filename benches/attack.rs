use carlini_wagner::aff;
use carlini_wagner::attack::loss::LossEvaluator;
use carlini_wagner::attack::optimizer::Adam;
use carlini_wagner::attack::step::AttackStep;
use carlini_wagner::attack::transform::SpaceTransform;
use carlini_wagner::attack::{AttackConfig, CarliniWagnerL2};
use carlini_wagner::model::arch::TensorShape;
use carlini_wagner::model::network::Network;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array2, ArrayD, IxDyn};

fn small_network() -> Network {
    let mut network = Network::new(TensorShape::Image {
        height: 2,
        width: 2,
        channels: 1,
    });
    network
        .linear(aff!([[1, -1, 0.5, 2], [0, 1, 1, -1], [-2, 0.3, 1, 1]] + [0.1, -0.2, 0]))
        .unwrap();
    network.relu();
    network
        .linear(aff!([[1, 2, -1], [0.5, -1, 1], [-1, 0, 1]] + [0, 0.5, 0]))
        .unwrap();
    network
}

fn inputs(n: usize) -> ArrayD<f64> {
    ArrayD::from_shape_fn(IxDyn(&[n, 2, 2, 1]), |idx| {
        ((idx[0] * 7 + idx[1] * 3 + idx[2]) % 10) as f64 / 10.
    })
}

pub fn step_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("attack-step");
    group.sample_size(500);

    let model = small_network();
    let x = inputs(64);
    let labels = Array2::from_shape_fn((64, 3), |(i, j)| if i % 3 == j { 1. } else { 0. });
    let consts = ndarray::Array1::from_elem(64, 0.1);
    let step = AttackStep::new(
        &model,
        SpaceTransform::new(0., 1.),
        LossEvaluator::new(false, 0.),
        x.view(),
        labels.view(),
        None,
    );
    let mut modifier = ArrayD::zeros(x.raw_dim());
    let mut adam = Adam::new(0.005, x.shape());

    group.bench_function("step (batch 64)", |b| {
        b.iter(|| {
            step.step(&mut modifier, &mut adam, black_box(consts.view()))
                .unwrap()
        })
    });
}

pub fn attack_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("attack");
    group.sample_size(10);

    let model = small_network();
    let x = inputs(16);
    let config = AttackConfig {
        batch_size: 8,
        binary_search_steps: 3,
        max_iterations: 100,
        ..AttackConfig::default()
    };
    let attack = CarliniWagnerL2::new(&model, config).unwrap();

    group.bench_function("untargeted (16 samples)", |b| {
        b.iter(|| attack.attack(black_box(x.view())).unwrap())
    });
}

criterion_group!(benches, step_benchmark, attack_benchmark);
criterion_main!(benches);
