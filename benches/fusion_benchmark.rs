//! Decision fusion and learner training timings
//!
//! Runs without the test harness:
//! `cargo bench --bench fusion_benchmark [-- --full]`

use std::time::{Duration, Instant};

use lccde::ml::{
    collect_votes, BaseLearnerPool, DecisionConfig, DecisionEngine, DecisionStats, LeaderAssigner, LearnerKind,
    LearnerSpec, PerClassScorer,
};
use lccde::{FeatureMatrix, LabelSet};

fn synthetic(rows: usize, classes: usize) -> (FeatureMatrix, Vec<usize>) {
    let mut data = FeatureMatrix::new(4);
    let mut labels = Vec::with_capacity(rows);
    for i in 0..rows {
        let label = i % classes;
        let noise = ((i * 2654435761) % 1000) as f32 / 1000.0;
        let row = [
            label as f32 + noise * 1.5,
            (label * label) as f32 * 0.3 + noise,
            noise * 10.0,
            ((i * 31) % 17) as f32,
        ];
        if data.push_row(&row).is_ok() {
            labels.push(label);
        }
    }
    (data, labels)
}

fn specs(rounds: usize) -> [LearnerSpec; 3] {
    [
        LearnerSpec::new(LearnerKind::LeafWise).with_param("n_estimators", rounds),
        LearnerSpec::new(LearnerKind::DepthWise).with_param("n_estimators", rounds),
        LearnerSpec::new(LearnerKind::Oblivious).with_param("n_estimators", rounds),
    ]
}

fn per_second(n: usize, elapsed: Duration) -> f64 {
    n as f64 / elapsed.as_secs_f64().max(1e-9)
}

fn main() {
    let full = std::env::args().any(|a| a == "--full");
    let sizes: &[usize] = if full { &[1_000, 10_000, 50_000] } else { &[1_000, 5_000] };
    let rounds = if full { 100 } else { 20 };
    let classes = 7;

    println!("LCCDE Benchmark\n");
    println!(
        "{:>8} {:>9} | {:>12} {:>12} | {:>14} {:>14}",
        "rows", "parallel", "fit (ms)", "votes (ms)", "fuse (rows/s)", "disagree (%)"
    );
    println!("{:-<80}", "");

    for &rows in sizes {
        let (x, y) = synthetic(rows, classes);
        let Ok(label_set) = LabelSet::new(classes) else { return };

        for parallel in [false, true] {
            let Ok(pool) = BaseLearnerPool::new(specs(rounds), 7) else { return };
            let mut pool = pool.with_parallel(parallel);

            let start = Instant::now();
            if let Err(e) = pool.fit(&x, &y, &label_set) {
                eprintln!("fit failed: {e}");
                return;
            }
            let fit = start.elapsed();

            let start = Instant::now();
            let votes = match collect_votes(&pool, &x, parallel) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("prediction failed: {e}");
                    return;
                }
            };
            let vote_time = start.elapsed();

            let Ok(scores) = PerClassScorer::score_votes(&votes, &y, &label_set) else { return };
            let engine =
                DecisionEngine::new(LeaderAssigner::assign(&scores), DecisionConfig::default()).with_parallel(parallel);

            let start = Instant::now();
            let fused = engine.fuse(&votes);
            let fuse_time = start.elapsed();
            let stats = DecisionStats::from_predictions(&fused);

            println!(
                "{:>8} {:>9} | {:>12.1} {:>12.1} | {:>14.0} {:>14.2}",
                rows,
                parallel,
                fit.as_secs_f64() * 1000.0,
                vote_time.as_secs_f64() * 1000.0,
                per_second(fused.len(), fuse_time),
                stats.disagreement_rate() * 100.0
            );
        }
    }
}
