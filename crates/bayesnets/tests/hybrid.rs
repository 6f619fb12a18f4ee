//! Networks mixing discrete and continuous variables, and parameter fitting.

use bayesnets::{
    infer, sprinkler_network, weighted_factor, Assignment, BayesNet, ConditionalLinearGaussian,
    Cpd, CpdFamily, DirectSampler, Distribution, GibbsConfig, GibbsSampler, LikelihoodWeighting,
    LinearGaussian, Sampler,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// a ~ Bernoulli-like [0.5, 0.5]; x | a ~ N(2a, 1).
fn mixture() -> BayesNet {
    let clg = ConditionalLinearGaussian::new(
        vec![2],
        vec![
            LinearGaussian::new(vec![], 0.0, 1.0).unwrap(),
            LinearGaussian::new(vec![], 2.0, 1.0).unwrap(),
        ],
    )
    .unwrap();
    BayesNet::from_cpds([
        Cpd::new_static("a", Distribution::categorical(vec![0.5, 0.5]).unwrap()).unwrap(),
        Cpd::conditional_linear_gaussian("x", &["a"], &[] as &[&str], clg).unwrap(),
    ])
    .unwrap()
}

/// P(a = 1 | x) for the mixture above.
fn posterior_a1(x: f64) -> f64 {
    let l0 = (-0.5 * x * x).exp();
    let l1 = (-0.5 * (x - 2.0) * (x - 2.0)).exp();
    l1 / (l0 + l1)
}

#[test]
fn likelihood_weighting_with_continuous_evidence() {
    let net = mixture();
    let evidence = Assignment::new().with("x", 1.5);
    let samples = LikelihoodWeighting::new(evidence)
        .sample(&net, 50_000, &mut StdRng::seed_from_u64(31))
        .unwrap();
    let estimate = weighted_factor(&net, &["a"], &samples).unwrap().to_probs().unwrap();
    assert!((estimate[1] - posterior_a1(1.5)).abs() < 0.02);
}

#[test]
fn gibbs_with_continuous_evidence() {
    let net = mixture();
    let config = GibbsConfig::default()
        .with_evidence(Assignment::new().with("x", 0.5))
        .with_burn_in(10);
    let samples = GibbsSampler::new(config)
        .sample(&net, 20_000, &mut StdRng::seed_from_u64(32))
        .unwrap();
    let ones = samples
        .iter()
        .filter(|s| s.discrete("a").unwrap() == 1)
        .count() as f64;
    assert!((ones / samples.len() as f64 - posterior_a1(0.5)).abs() < 0.02);
}

#[test]
fn mixture_is_not_exactly_solvable() {
    let net = mixture();
    assert!(infer(&net, &["a"], &Assignment::new()).is_err());
}

#[test]
fn refit_sprinkler_from_samples() {
    let truth = sprinkler_network().unwrap();
    let data = DirectSampler
        .sample(&truth, 40_000, &mut StdRng::seed_from_u64(77))
        .unwrap();

    let edges = [
        ("cloudy", "sprinkler"),
        ("cloudy", "rain"),
        ("sprinkler", "wet_grass"),
        ("rain", "wet_grass"),
    ];
    let fitted = BayesNet::fit(&data, &edges, |_| CpdFamily::Categorical).unwrap();
    assert_eq!(fitted.len(), 4);
    assert_eq!(fitted.parents("wet_grass").unwrap(), truth.parents("wet_grass").unwrap());

    let evidence = Assignment::new().with("wet_grass", 1usize);
    let want = infer(&truth, &["rain"], &evidence).unwrap();
    let got = infer(&fitted, &["rain"], &evidence).unwrap();
    assert!(want.approx_eq(&got, 0.02), "{:?} vs {:?}", want, got);

    // The generating model cannot be much less likely than the fitted one.
    let ll_truth = truth.log_likelihood(&data).unwrap();
    let ll_fitted = fitted.log_likelihood(&data).unwrap();
    assert!(ll_fitted >= ll_truth);
}

#[test]
fn fit_linear_gaussian_chain() {
    let truth = BayesNet::from_cpds([
        Cpd::new_static("x", Distribution::normal(1.0, 2.0).unwrap()).unwrap(),
        Cpd::linear_gaussian("y", &["x"], vec![-0.5], 3.0, 0.5).unwrap(),
    ])
    .unwrap();
    let data = DirectSampler
        .sample(&truth, 5_000, &mut StdRng::seed_from_u64(5))
        .unwrap();

    let fitted = BayesNet::fit(&data, &[("x", "y")], |name| match name.as_str() {
        "x" => CpdFamily::Static(bayesnets::DistributionFamily::Normal),
        _ => CpdFamily::LinearGaussian,
    })
    .unwrap();

    let given = Assignment::new().with("x", 2.0);
    match fitted.cpd("y").unwrap().distribution_given(&given).unwrap() {
        Distribution::Normal { mean, std } => {
            assert!((mean - 2.0).abs() < 0.05, "mean {}", mean);
            assert!((std - 0.5).abs() < 0.05, "std {}", std);
        }
        other => panic!("unexpected {:?}", other),
    }
}
