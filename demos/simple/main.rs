use std::sync::Arc;

use nodeflow::{ChannelEvent, ChannelOptions, EdgeModel, EngineBuilder, NodeBundle};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> nodeflow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let node_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/simple/nodes");
    let engine = Arc::new(EngineBuilder::new().node_dir(node_dir).build()?);

    for bundle in engine.bundles()? {
        println!("found node {} ({})", bundle.manifest.name, bundle.manifest.description);
    }

    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_log(|log| {
        println!("[{}] {}: {}", log.severity.as_ref(), log.nid, log.content);
    });
    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_error(|e| {
        println!("flow error: {:?}", e.event);
    });
    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_complete(|rid| {
        println!("run {} complete", rid);
    });

    let mut state = engine.subscribe();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let running = state.borrow_and_update().clone();
            println!("running: {} {:?}", running.is_running, running.node_ids);
        }
    });

    let nodes = vec![
        NodeBundle::load(format!("{node_dir}/heartbeat"))?.instantiate("heartbeat"),
        NodeBundle::load(format!("{node_dir}/init"))?.instantiate("init"),
        NodeBundle::load(format!("{node_dir}/calc"))?.instantiate("calc"),
    ];
    let edges = vec![EdgeModel::new("init", "output-0", "calc", "input-0"), EdgeModel::new("init", "output-1", "calc", "input-1")];

    let report = engine.launch(nodes, edges).await.map_err(|e| nodeflow::NodeflowError::Engine(e.to_string()))??;
    println!("order: {:?}", report.order);
    println!("outputs: {:#?}", report.outputs);

    // the heartbeat task keeps running until stopped
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    engine.force_stop();
    engine.shutdown();

    Ok(())
}
