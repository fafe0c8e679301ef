use netloom_core::{Network, NodeDeclaration};

/// Builds an unbuilt network with `excitatory` nodes labelled `ei = "e"`
/// followed by `inhibitory` nodes labelled `ei = "i"`.
///
/// Every node carries an `x` position equal to its declaration row.
#[must_use]
pub fn layered_network(name: &str, excitatory: usize, inhibitory: usize) -> Network {
    let mut net = Network::new(name).expect("valid network name");
    for (count, label, offset) in [(excitatory, "e", 0), (inhibitory, "i", excitatory)] {
        if count == 0 {
            continue;
        }
        let positions: Vec<f64> = (offset..offset + count).map(|row| row as f64).collect();
        net.add_nodes(
            NodeDeclaration::new(count)
                .with_attribute("ei", label)
                .with_attribute("x", positions),
        )
        .expect("nodes declared");
    }
    net
}
