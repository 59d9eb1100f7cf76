//! scene-client: in-process replication demo.
//!
//! Runs two participants against a shared in-memory store with a loopback
//! notification fan-out, and walks through the full lifecycle: participant A
//! authors a mesh entity, edits it, and removes it; participant B's engine
//! replicates every step through remote notifications.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scene_sync::codec::{BitmapPayload, MeshCodec, MeshPayload, PixelFormat};
use scene_sync::engine::SyncEngine;
use scene_sync::entity::{PropertySet, Transform, Vec3};
use scene_sync::object::{BasicObject, ObjectRegistry};
use scene_sync::store::{InMemoryStore, RemoteStore};
use scene_sync::{InMemoryChannel, SceneEvent, WorldObject};

#[derive(Parser, Debug)]
#[command(name = "scene-client")]
#[command(about = "World-object replication demo (two in-process participants)")]
struct Args {
    /// Name of the demo entity
    #[arg(long, default_value = "Box1")]
    entity: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn registry() -> ObjectRegistry {
    let mut registry = ObjectRegistry::new();
    registry.register_basic("Mesh");
    registry.register_basic("Bitmap");
    registry
}

/// A textured unit quad, encoded into a property set.
fn quad_properties() -> Result<PropertySet> {
    let mesh = MeshPayload {
        primitive: "Triangles".into(),
        vertices: vec![
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
        uv: Some(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]),
        texture: Some(BitmapPayload {
            width: 2,
            height: 2,
            format: PixelFormat::Rgb,
            pixels: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 0],
        }),
    };

    let mut properties = PropertySet::new();
    MeshCodec::default().encode(&mesh, &mut properties)?;
    Ok(properties)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "debug,scene_sync=debug"
    } else {
        "info,scene_sync=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let session = uuid::Uuid::new_v4();
    info!("Starting scene-client demo, session {}", session);

    // One authoritative store; every mutation fans out to both participants,
    // the originator included, exercising the engines' echo handling.
    let store = Arc::new(InMemoryStore::new());

    let (tx_a, channel_a) = InMemoryChannel::pair();
    let (tx_b, channel_b) = InMemoryChannel::pair();
    store.attach_notifier(tx_a);
    store.attach_notifier(tx_b);

    let engine_a = SyncEngine::new(store.clone() as Arc<dyn RemoteStore>, registry());
    let engine_b = SyncEngine::new(store.clone() as Arc<dyn RemoteStore>, registry());

    // Narrate what participant B's engine applies.
    let bus_b = engine_b.events();
    let _sub = bus_b.subscribe(|event: SceneEvent| {
        info!("participant B applied: {:?}", event);
    });

    let runner_a = {
        let engine = Arc::clone(&engine_a);
        tokio::spawn(async move { engine.run(channel_a).await })
    };
    let runner_b = {
        let engine = Arc::clone(&engine_b);
        tokio::spawn(async move { engine.run(channel_b).await })
    };

    // Participant A authors a textured quad.
    let object = BasicObject::new(&args.entity, "Mesh");
    object.apply_properties(&quad_properties()?)?;
    engine_a.add_entity(object.clone()).await?;
    info!("participant A added '{}'", args.entity);

    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("participant B directory: {:?}", engine_b.directory().names());

    // A local edit propagates through the change reporter.
    object.edit_transform(Transform {
        position: Vec3::new(0.0, 1.0, -2.0),
        rotation: Vec3::new(0.0, 45.0, 0.0),
        scale: Vec3::ONE,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some(replica) = engine_b.directory().get(&args.entity) {
        info!(
            "participant B replica position: {:?}",
            replica.transform().position
        );
    }

    // Simulate B reconnecting: full resync from the store.
    let registered = engine_b.load_all_from_remote().await?;
    info!("participant B resynced {} replica(s)", registered);

    // Participant A removes the entity; B deregisters via notification.
    engine_a.remove_entity(&args.entity).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(
        "participant B still stores '{}': {}",
        args.entity,
        engine_b.directory().is_stored(&args.entity)
    );

    engine_a.shutdown();
    engine_b.shutdown();
    runner_a.await?;
    runner_b.await?;

    info!("Demo finished");
    Ok(())
}
