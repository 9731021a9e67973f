//! ANN Benchmark: synthetic clustered vectors (cosine)
//! Measures build time, Recall@10 and QPS for every codec/topology pair
//! against exact brute-force ground truth.
//!
//! Usage: cargo bench --bench synthetic_recall

use nearstore_core::{DistanceMetric, Index, IndexParams, IndexType, QuantizationType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Instant;

const DIM: usize = 128;
const CLUSTERS: usize = 200;
const POINTS: usize = 20_000;
const QUERIES: usize = 500;
const K: usize = 10;

fn normal(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

fn clustered(rng: &mut StdRng, n: usize, centers: &[Vec<f32>]) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| {
            let c = &centers[rng.gen_range(0..centers.len())];
            c.iter().map(|&x| x + 0.7 * normal(rng)).collect()
        })
        .collect()
}

/// Exact top-k ids per query.
fn brute_force(points: &[Vec<f32>], queries: &[Vec<f32>]) -> Vec<Vec<u64>> {
    let metric = DistanceMetric::Cos;
    queries
        .iter()
        .map(|q| {
            let mut scored: Vec<(f32, u64)> = points
                .iter()
                .enumerate()
                .map(|(i, p)| (metric.distance(q, p), i as u64))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            scored.truncate(K);
            scored.into_iter().map(|(_, id)| id).collect()
        })
        .collect()
}

fn main() {
    println!("=== ANN Benchmark: synthetic clustered, {POINTS} x {DIM}d, cosine ===");
    println!();

    let mut rng = StdRng::seed_from_u64(2024);
    let centers: Vec<Vec<f32>> = (0..CLUSTERS)
        .map(|_| (0..DIM).map(|_| normal(&mut rng)).collect())
        .collect();
    let points = clustered(&mut rng, POINTS, &centers);
    let queries = clustered(&mut rng, QUERIES, &centers);

    print!("Computing ground truth...");
    let t0 = Instant::now();
    let truth = brute_force(&points, &queries);
    println!(" {:.2}s", t0.elapsed().as_secs_f64());

    let modes = [
        (QuantizationType::None, IndexType::Nsg),
        (QuantizationType::Sq8, IndexType::Nsg),
        (QuantizationType::Sq8, IndexType::Fusion),
        (QuantizationType::Sq4, IndexType::Nsg),
        (QuantizationType::Sq4, IndexType::Fusion),
    ];
    let threads = std::thread::available_parallelism().map_or(1, |n| n.get());

    for (quant, topo) in modes {
        println!();
        println!("--- {quant} / {topo} (max_nbrs=32, ef_c=100) ---");

        let params = IndexParams::default()
            .with_metric(DistanceMetric::Cos)
            .with_quantization(quant)
            .with_index_type(topo);
        let index = Index::new("bench", params).expect("valid params");

        let t0 = Instant::now();
        index.fit(points.clone()).expect("build");
        let build_time = t0.elapsed();
        println!(
            "  Build time: {:.2}s ({:.0} inserts/s)",
            build_time.as_secs_f64(),
            POINTS as f64 / build_time.as_secs_f64()
        );

        println!("  ef_search | Recall@10 |  QPS (1t)  |  QPS ({threads}t)");
        println!("  ----------+-----------+------------+-----------");
        for ef in [10, 20, 40, 80, 160] {
            let t0 = Instant::now();
            let results = index.batch_query(&queries, K, ef, 1).expect("query");
            let single = t0.elapsed();

            let t0 = Instant::now();
            let _ = index.batch_query(&queries, K, ef, threads).expect("query");
            let parallel = t0.elapsed();

            let found: usize = results
                .iter()
                .zip(&truth)
                .map(|(hits, want)| {
                    let want: HashSet<u64> = want.iter().copied().collect();
                    hits.iter().filter(|h| want.contains(&h.id)).count()
                })
                .sum();
            let recall = found as f64 / (QUERIES * K) as f64;
            println!(
                "  {:>9} | {:.4}    | {:>10.1} | {:>9.1}",
                ef,
                recall,
                QUERIES as f64 / single.as_secs_f64(),
                QUERIES as f64 / parallel.as_secs_f64()
            );
        }
    }

    println!();
    println!("=== Benchmark complete ===");
}
