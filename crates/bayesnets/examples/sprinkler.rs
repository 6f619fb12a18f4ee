//! The sprinkler network, queried exactly and by every sampler.
//!
//! Run with: cargo run -p bayesnets --example sprinkler
//!
//! This example demonstrates:
//! - Building a network from CPDs
//! - Exact posteriors by variable elimination
//! - "Explaining away" between sprinkler and rain
//! - Rejection, likelihood-weighted, Gibbs and loopy-belief estimates of the same posterior

use bayesnets::{
    empirical_factor, infer, probability_of_evidence, sprinkler_network, weighted_factor,
    Assignment, BayesNetError, Factor, GibbsConfig, GibbsSampler, LikelihoodWeighting,
    LoopyBelief, RejectionSampler, Sampler, VariableOrder,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn show(label: &str, f: &Factor) {
    let p = f.values();
    println!("  {:<40} [false: {:.4}, true: {:.4}]", label, p[0], p[1]);
}

fn main() -> Result<(), BayesNetError> {
    println!("=== The Sprinkler Network ===\n");

    // -------------------------------------------------------------------------
    // 1. Structure
    // -------------------------------------------------------------------------
    println!("1. Structure");
    println!("------------");
    println!("        cloudy");
    println!("       ↙     ↘");
    println!(" sprinkler   rain");
    println!("       ↘     ↙");
    println!("      wet_grass");
    println!();

    let net = sprinkler_network()?;
    let names = net.topological_order();
    let order: Vec<&str> = names.iter().map(|v| v.as_str()).collect();
    println!("Topological order: {:?}", order);
    println!("Free parameters:   {}", net.n_params());
    println!();

    // -------------------------------------------------------------------------
    // 2. Exact inference
    // -------------------------------------------------------------------------
    println!("2. Exact inference (variable elimination)");
    println!("-----------------------------------------");
    let none = Assignment::new();
    let wet = Assignment::new().with("wet_grass", 1usize);
    let wet_and_rain = wet.clone().with("rain", 1usize);

    show("P(wet_grass)", &infer(&net, &["wet_grass"], &none)?);
    show("P(rain | wet_grass)", &infer(&net, &["rain"], &wet)?);
    show("P(sprinkler | wet_grass)", &infer(&net, &["sprinkler"], &wet)?);
    show(
        "P(sprinkler | wet_grass, rain)",
        &infer(&net, &["sprinkler"], &wet_and_rain)?,
    );
    println!("  (rain explains the wet grass, so the sprinkler becomes less likely)");
    println!(
        "  P(wet_grass = true) = {:.4}",
        probability_of_evidence(&net, &wet)?
    );
    println!();

    // -------------------------------------------------------------------------
    // 3. Sampling
    // -------------------------------------------------------------------------
    println!("3. Approximate inference of P(rain | wet_grass)");
    println!("-----------------------------------------------");
    let mut rng = StdRng::seed_from_u64(42);
    let n = 20_000;

    let rejected = RejectionSampler::new(wet.clone()).sample(&net, n, &mut rng)?;
    show("rejection", &empirical_factor(&net, &["rain"], &rejected)?);

    let weighted = LikelihoodWeighting::new(wet.clone()).sample(&net, n, &mut rng)?;
    show("likelihood weighting", &weighted_factor(&net, &["rain"], &weighted)?);

    let config = GibbsConfig::default()
        .with_evidence(wet.clone())
        .with_burn_in(500)
        .with_thinning(2);
    let chain = GibbsSampler::new(config).sample(&net, n, &mut rng)?;
    show("gibbs", &empirical_factor(&net, &["rain"], &chain)?);

    let sweep = GibbsConfig::default()
        .with_evidence(wet.clone())
        .with_order(VariableOrder::Sweep);
    let chain = GibbsSampler::new(sweep).sample(&net, n, &mut rng)?;
    show("gibbs (full sweep)", &empirical_factor(&net, &["rain"], &chain)?);

    show("loopy belief", &LoopyBelief::new(&net).infer(&["rain"], &wet)?);
    println!("  (the graph has a loop, so loopy belief is only approximate)");

    show("exact", &infer(&net, &["rain"], &wet)?);
    Ok(())
}
