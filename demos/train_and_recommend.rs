use cadence::artifact::{save_catalog, save_pipeline};
use cadence::tuning::{DbscanGrid, GmmGrid, HierarchicalGrid, KmeansGrid, SpectralGrid};
use cadence::{train, Catalog, Config, Mode, Recommender, Track};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Four "genres", each a Gaussian blob in (energy, valence, tempo, acousticness).
    let centres = [
        [0.9, 0.7, 128.0, 0.05],
        [0.3, 0.2, 72.0, 0.80],
        [0.6, 0.8, 100.0, 0.30],
        [0.8, 0.3, 170.0, 0.10],
    ];
    let spread = [0.05, 0.05, 4.0, 0.05];
    let names = ["energy", "valence", "tempo", "acousticness"];

    let mut rng = StdRng::seed_from_u64(7);
    let mut tracks = Vec::new();
    for (g, centre) in centres.iter().enumerate() {
        for i in 0..150 {
            let mut track = Track::new(format!("g{g}-{i:03}")).with_name(format!("Genre {g} #{i}"));
            for f in 0..names.len() {
                let value = Normal::new(centre[f], spread[f])?.sample(&mut rng);
                track = track.with_feature(names[f], value);
            }
            tracks.push(track);
        }
    }
    let mut catalog = Catalog::new(tracks)?;

    // Small grids so the demo finishes quickly.
    let config = Config {
        features: names.iter().map(|s| s.to_string()).collect(),
        kmeans: KmeansGrid { k_min: 2, k_max: 8, ..Default::default() },
        dbscan: DbscanGrid { n_trials: 10, ..Default::default() },
        hierarchical: HierarchicalGrid { k_min: 2, k_max: 6, ..Default::default() },
        gmm: GmmGrid { k_min: 2, k_max: 6, ..Default::default() },
        spectral: SpectralGrid { k_min: 3, k_max: 5, ..Default::default() },
        ..Default::default()
    };

    let report = train(&mut catalog, &config)?;
    for family in &report.families {
        match &family.best {
            Some(best) => println!(
                "{:<13} best {:?} silhouette={:.3}",
                family.algorithm,
                best.params,
                best.scores.cohesion_separation.unwrap_or(f64::NAN)
            ),
            None => println!("{:<13} no valid clustering", family.algorithm),
        }
    }

    let dir = std::env::temp_dir().join("cadence-demo");
    save_pipeline(&report.pipeline, dir.join("pipeline.json"))?;
    save_catalog(&catalog, dir.join("catalog.json"))?;

    let rec = Recommender::load(dir.join("pipeline.json"), dir.join("catalog.json"), &config)?;
    for mode in [Mode::Cluster, Mode::Knn, Mode::ClusterKnn] {
        let out = rec.recommend_with("g1-010", "kmeans", 5, mode)?;
        println!("{mode}:");
        for r in out {
            println!("  {} ({:.4})", r.track_id, r.score);
        }
    }

    Ok(())
}
