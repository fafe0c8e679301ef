//! Verifies the spans and events emitted while saving.

mod common;

use common::layered_network;
use netloom_core::EdgeDeclaration;
use netloom_providers_columnar::{EdgeFiles, NodeFiles, SaveOptions, save_edges, save_nodes};
use netloom_test_support::tracing::RecordingLayer;

#[test]
fn saving_records_storage_spans() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut net = layered_network("V1", 3, 2);
    net.add_edges(EdgeDeclaration::new().with_rule(1))
        .expect("edges declared");
    let options = SaveOptions::new(dir.path());

    let (result, layer) = RecordingLayer::capture(|| {
        save_nodes(&mut net, &NodeFiles::new(), &options)?;
        save_edges(&mut net, &EdgeFiles::new(), &options)
    });
    assert_eq!(result.expect("save succeeds").len(), 1);

    let nodes = layer.span("storage.save_nodes").expect("node span recorded");
    assert_eq!(nodes.field("network"), Some("V1"));
    let edges = layer.span("storage.save_edges").expect("edge span recorded");
    assert_eq!(edges.field("populations"), Some("1"));

    let saved = layer.events_with_message("saved population");
    assert_eq!(saved.len(), 2);
    assert!(
        saved
            .iter()
            .any(|event| event.field("population") == Some("V1_to_V1")
                && event.field("rows") == Some("25"))
    );
}

#[test]
fn failed_saves_record_the_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut net = layered_network("V1", 2, 0);
    let options = SaveOptions::new(dir.path()).with_force_build(false);

    let (result, layer) =
        RecordingLayer::capture(|| save_nodes(&mut net, &NodeFiles::new(), &options));
    assert!(result.is_err());

    let failure = layer
        .events()
        .into_iter()
        .find(|event| event.level == tracing::Level::ERROR)
        .expect("error event recorded");
    assert!(
        failure
            .field("error")
            .is_some_and(|message| message.contains("has not been built"))
    );
}
