use kernel_estimator::config::EstimatorConfig;
use kernel_estimator::generator::Generator;
use kernel_estimator::kernel::extract_kernel;
use kernel_estimator::ComputeContext;
use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_generator(structure: &[usize], channels: usize, sf: usize, seed: u64) -> Generator {
    let mut rng = StdRng::seed_from_u64(seed);
    let last = structure.len() - 1;
    let weights: Vec<Array4<f32>> = structure
        .iter()
        .enumerate()
        .map(|(i, &k)| {
            let in_c = if i == 0 { 1 } else { channels };
            let out_c = if i == last { 1 } else { channels };
            Array4::from_shape_fn((out_c, in_c, k, k), |_| rng.gen_range(-0.5f32..0.5))
        })
        .collect();
    Generator::from_weights(&ComputeContext::cpu(), weights, sf).expect("generator")
}

#[test]
fn generator_equals_one_strided_correlation_with_its_kernel() {
    let g = random_generator(&[7, 5, 3, 1, 1, 1], 3, 2, 11);
    let kernel = extract_kernel(&g);
    assert_eq!(kernel.size(), 13);

    let mut rng = StdRng::seed_from_u64(5);
    let input = Array2::from_shape_fn((40, 40), |_| rng.gen_range(0.0f32..1.0));
    let (output, _) = g.forward(input.view());
    assert_eq!(output.dim(), (14, 14));
    assert_eq!(g.output_size(40), 14);

    let k = kernel.values();
    let scale = output.iter().fold(0.0f32, |m, v| m.max(v.abs())).max(1e-6);
    for ((y, x), &out) in output.indexed_iter() {
        let mut direct = 0.0f64;
        for ((r, c), &w) in k.indexed_iter() {
            direct += w * input[[2 * y + r, 2 * x + c]] as f64;
        }
        assert!(
            ((out as f64 - direct) / scale as f64).abs() < 1e-4,
            "({y}, {x}): generator {out} vs kernel {direct}"
        );
    }
}

#[test]
fn default_generator_kernel_has_configured_size() {
    let config = EstimatorConfig::default();
    let mut rng = StdRng::seed_from_u64(0);
    let g = Generator::new(&ComputeContext::cpu(), &config, &mut rng);
    assert_eq!(g.kernel_size(), config.kernel_size);
    assert_eq!(extract_kernel(&g).size(), config.kernel_size);
    assert_eq!(g.output_size(config.input_crop_size), config.generator_output_size());
}
