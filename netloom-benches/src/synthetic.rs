//! Seeded synthetic networks for benchmarking.
//!
//! [`SyntheticConfig::declare`] produces an unbuilt [`Network`] of
//! excitatory and inhibitory nodes with random positions, wired by a
//! pairwise rule whose decisions depend only on the seed and the node ids.

use netloom_core::{ConnectionRule, DType, EdgeDeclaration, Network, NodeDeclaration, Value};
use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::error::BenchSetupError;

/// Configuration for synthetic network generation.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Network name.
    pub name: String,
    /// Number of nodes; the first half is excitatory.
    pub node_count: usize,
    /// Probability that an ordered pair is connected.
    pub connection_probability: f64,
    /// RNG seed for reproducibility.
    pub seed: u64,
}

impl SyntheticConfig {
    /// Declares the network without building it.
    ///
    /// # Errors
    ///
    /// Returns [`BenchSetupError::ZeroValue`] if `node_count` is zero and
    /// [`BenchSetupError::Probability`] if the probability is not in `[0, 1]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use netloom_benches::synthetic::SyntheticConfig;
    ///
    /// let config = SyntheticConfig {
    ///     name: "bench".to_owned(),
    ///     node_count: 20,
    ///     connection_probability: 0.25,
    ///     seed: 42,
    /// };
    /// let mut network = config.declare().expect("valid config");
    /// assert_eq!(network.nnodes().expect("nodes build"), 20);
    /// ```
    pub fn declare(&self) -> Result<Network, BenchSetupError> {
        if self.node_count == 0 {
            return Err(BenchSetupError::ZeroValue {
                context: "node_count",
            });
        }
        if !(0.0..=1.0).contains(&self.connection_probability) {
            return Err(BenchSetupError::Probability(self.connection_probability));
        }

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut network = Network::new(self.name.as_str())?;
        let excitatory = self.node_count.div_ceil(2);
        for (count, label) in [(excitatory, "e"), (self.node_count - excitatory, "i")] {
            if count == 0 {
                continue;
            }
            let positions: Vec<[f64; 3]> = (0..count)
                .map(|_| {
                    [
                        rng.gen_range(0.0..100.0),
                        rng.gen_range(0.0..100.0),
                        rng.gen_range(0.0..100.0),
                    ]
                })
                .collect();
            network.add_nodes(
                NodeDeclaration::new(count)
                    .with_attribute("ei", label)
                    .with_attribute("positions", positions),
            )?;
        }

        let seed = self.seed;
        let probability = self.connection_probability;
        network
            .add_edges(
                EdgeDeclaration::new()
                    .with_rule(ConnectionRule::pairwise(move |source, target| {
                        let mut pair_rng = pair_rng(seed, source.node_id(), target.node_id());
                        i64::from(pair_rng.gen_bool(probability))
                    }))
                    .with_attribute("model_template", "exp2syn"),
            )?
            .add_property("delay", DType::Float, move |source, target| {
                let mut pair_rng = pair_rng(seed, target.node_id(), source.node_id());
                Value::Float(pair_rng.gen_range(0.5..2.0))
            })?;
        Ok(network)
    }
}

fn pair_rng(seed: u64, first: u64, second: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed ^ first.rotate_left(32) ^ second)
}
