//! Engine behaviour for the built-in kinds against the in-memory control plane.

use std::sync::Arc;
use std::time::Duration;

use oxide_api::{ApiError, ControlPlane, MemoryControlPlane};
use oxide_provider::schema::{AttributeType, Mutability};
use oxide_provider::{Attributes, Engine, ProviderConfig, Refresh, Registry};
use serde_json::{Value, json};

const PROJECT: &str = "prod";

fn config() -> ProviderConfig {
    ProviderConfig::resolve_with(None, Some("test-token".into()), |_| None).unwrap()
}

fn setup() -> (Arc<MemoryControlPlane>, Registry) {
    let api = Arc::new(MemoryControlPlane::new());
    let registry = Registry::builtin(config(), api.clone()).unwrap();
    (api, registry)
}

fn attrs(value: Value) -> Attributes {
    Attributes::from_json(value).unwrap()
}

fn blank_disk(name: &str) -> Attributes {
    attrs(json!({
        "project_id": PROJECT,
        "name": name,
        "description": "scratch space",
        "size": 1073741824u64,
        "block_size": 512,
    }))
}

fn url_image(name: &str) -> Attributes {
    attrs(json!({
        "project_id": PROJECT,
        "name": name,
        "description": "base image",
        "os": "alpine",
        "version": "3.19",
        "source_url": "https://images.example.com/alpine.raw",
        "block_size": 512,
    }))
}

fn instance(name: &str) -> Attributes {
    attrs(json!({
        "project_id": PROJECT,
        "name": name,
        "description": "web server",
        "host_name": name,
        "memory": 1073741824u64,
        "ncpus": 2,
    }))
}

fn ip_pool(name: &str) -> Attributes {
    attrs(json!({"name": name, "description": "public addresses"}))
}

/// Desired configuration matching a recorded state.
fn config_of(engine: &Engine, state: &Attributes) -> Attributes {
    let mut desired = state.clone();
    for attr in engine.schema().attributes.iter().filter(|a| a.is_computed()) {
        desired.remove(attr.name);
    }
    desired
}

fn changed(ty: &AttributeType, current: Option<&Value>) -> Value {
    match (ty, current) {
        (AttributeType::String, Some(Value::String(s))) => json!(format!("{}-changed", s)),
        (AttributeType::String, _) => json!("changed"),
        (AttributeType::Int64, Some(v)) => json!(v.as_i64().unwrap_or(0) + 512),
        (AttributeType::Int64, None) => json!(4096),
        (AttributeType::Bool, Some(Value::Bool(b))) => json!(!b),
        (AttributeType::Bool, _) => json!(false),
        (ty, _) => panic!("no change rule for {:?}", ty),
    }
}

async fn create(engine: &Engine, desired: &Attributes) -> Attributes {
    let outcome = engine.create(desired).await;
    assert!(!outcome.has_error(), "{:?}", outcome.diagnostics);
    outcome.value.unwrap()
}

#[tokio::test]
async fn test_blank_disk() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    let state = create(&engine, &blank_disk("data")).await;

    assert!(!state.id().unwrap().is_empty());
    assert_eq!(state.require_unsigned("size"), Ok(1073741824));
    assert!(!state.is_set("source_snapshot_id"));
    assert!(!state.is_set("source_image_id"));
    assert_eq!(state.require_string("state"), Ok("detached"));
    assert_eq!(api.calls("disk_create").await, 1);
}

#[tokio::test]
async fn test_source_union_violations_make_no_remote_call() {
    let (api, registry) = setup();
    let disks = registry.resolve("oxide_disk").unwrap();
    let images = registry.resolve("oxide_image").unwrap();

    let mut no_source = blank_disk("a");
    no_source.remove("block_size");
    let mut two_sources = blank_disk("b");
    two_sources.set("source_snapshot_id", "snap-1");
    let mut all_sources = two_sources.clone();
    all_sources.set("source_image_id", "img-1");

    for desired in [no_source, two_sources, all_sources] {
        let outcome = disks.create(&desired).await;
        assert!(outcome.value.is_none());
        assert!(
            outcome
                .diagnostics
                .errors()
                .any(|d| d.summary == "Invalid attribute combination: exactly-one-of"),
            "{:?}",
            outcome.diagnostics
        );
    }

    let mut image_none = url_image("a");
    image_none.remove("source_url");
    image_none.remove("block_size");
    let mut image_both = url_image("b");
    image_both.set("source_snapshot_id", "snap-1");

    for desired in [image_none, image_both] {
        let outcome = images.create(&desired).await;
        assert!(outcome.value.is_none());
        assert!(outcome.has_error());
    }

    assert_eq!(api.total_calls().await, 0);
}

#[tokio::test]
async fn test_image_url_requires_block_size() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_image").unwrap();

    let mut desired = url_image("alpine");
    desired.remove("block_size");

    let outcome = engine.create(&desired).await;
    assert!(outcome.value.is_none());
    let errors: Vec<_> = outcome.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].summary, "Invalid attribute combination: also-requires");
    assert_eq!(errors[0].attribute.as_deref(), Some("source_url"));
    assert_eq!(api.total_calls().await, 0);
}

#[tokio::test]
async fn test_image_snapshot_conflicts_with_block_size() {
    let (_, registry) = setup();
    let engine = registry.resolve("oxide_image").unwrap();

    let mut desired = url_image("alpine");
    desired.remove("source_url");
    desired.set("source_snapshot_id", "snap-1");

    let outcome = engine.create(&desired).await;
    assert!(
        outcome
            .diagnostics
            .errors()
            .any(|d| d.summary == "Invalid attribute combination: conflicts-with")
    );
}

#[tokio::test]
async fn test_create_then_read_is_stable() {
    let (_, registry) = setup();

    let cases = [
        ("oxide_disk", blank_disk("data")),
        ("oxide_image", url_image("alpine")),
        ("oxide_instance", instance("web")),
        ("oxide_ip_pool", ip_pool("public")),
    ];

    for (kind, desired) in cases {
        let engine = registry.resolve(kind).unwrap();
        let state = create(&engine, &desired).await;

        let outcome = engine.read(&state).await;
        assert!(outcome.diagnostics.is_empty(), "{}: {:?}", kind, outcome.diagnostics);
        assert_eq!(outcome.value, Some(Refresh::Present(state)), "{}", kind);
    }
}

#[tokio::test]
async fn test_create_keeps_timeouts_in_state() {
    let (_, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    let mut desired = blank_disk("data");
    desired.set("timeouts", json!({"create": "2m", "delete": "5m"}));
    let state = create(&engine, &desired).await;
    assert_eq!(state.get("timeouts"), desired.get("timeouts"));
}

#[tokio::test]
async fn test_read_after_out_of_band_delete_is_absent() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_instance").unwrap();

    let state = create(&engine, &instance("web")).await;
    assert!(api.forget(state.id().unwrap()).await);

    let outcome = engine.read(&state).await;
    assert_eq!(outcome.value, Some(Refresh::Absent));
    assert!(!outcome.has_error());
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn test_read_failure_is_error_without_state() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    let state = create(&engine, &blank_disk("data")).await;
    api.fail_next("disk_view", ApiError::Transport("connection reset".into()))
        .await;

    let outcome = engine.read(&state).await;
    assert!(outcome.value.is_none());
    let d = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Error reading disk");
    assert_eq!(d.detail, "API error: transport: connection reset");
}

#[tokio::test]
async fn test_image_read_keeps_project_when_remote_omits_it() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_image").unwrap();

    let state = create(&engine, &url_image("alpine")).await;
    api.hide_image_project(true).await;

    let outcome = engine.read(&state).await;
    let Some(Refresh::Present(fresh)) = outcome.value else {
        panic!("image should still exist");
    };
    assert_eq!(fresh.require_string("project_id"), Ok(PROJECT));
    assert_eq!(fresh, state);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    let state = create(&engine, &blank_disk("data")).await;
    assert!(engine.delete(&state).await.is_empty());
    assert!(engine.delete(&state).await.is_empty());
    assert_eq!(api.calls("disk_delete").await, 2);

    let never_existed = attrs(json!({"id": "7d1e0a52-0000-4000-8000-000000000000"}));
    assert!(!engine.delete(&never_existed).await.has_error());
}

#[tokio::test]
async fn test_delete_failure_is_reported() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_ip_pool").unwrap();

    let state = create(&engine, &ip_pool("public")).await;
    api.fail_next(
        "ip_pool_delete",
        ApiError::invalid_state("IP pool cannot be deleted while it contains ranges"),
    )
    .await;

    let diagnostics = engine.delete(&state).await;
    let d = diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Error deleting IP pool");
    assert_eq!(
        d.detail,
        "API error: HTTP 400: IP pool cannot be deleted while it contains ranges"
    );
}

#[tokio::test]
async fn test_image_delete_unsupported() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_image").unwrap();

    let state = create(&engine, &url_image("alpine")).await;
    let diagnostics = engine.delete(&state).await;

    let d = diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Error deleting image");
    assert_eq!(d.detail, "the oxide API currently does not support deleting images");
    assert_eq!(api.calls("image_delete").await, 0);
}

#[tokio::test]
async fn test_unsupported_update_returns_prior_state() {
    let (api, registry) = setup();

    let cases = [
        ("oxide_disk", blank_disk("data"), "disks"),
        ("oxide_image", url_image("alpine"), "images"),
        ("oxide_instance", instance("web"), "instances"),
    ];

    for (kind, desired, plural) in cases {
        let engine = registry.resolve(kind).unwrap();
        let prior = create(&engine, &desired).await;
        let before = api.total_calls().await;

        let mut changed = desired.clone();
        changed.set("description", "something else");
        let outcome = engine.update(&changed, &prior).await;

        assert_eq!(outcome.value.as_ref(), Some(&prior), "{}", kind);
        let d = outcome.diagnostics.errors().next().unwrap();
        assert_eq!(
            d.detail,
            format!("the oxide API currently does not support updating {}", plural)
        );
        assert_eq!(api.total_calls().await, before);
    }
}

#[tokio::test]
async fn test_every_immutable_change_is_rejected() {
    let (api, registry) = setup();

    let cases = [
        ("oxide_disk", blank_disk("data")),
        ("oxide_image", url_image("alpine")),
        ("oxide_instance", instance("web")),
        ("oxide_ip_pool", ip_pool("public")),
    ];

    for (kind, desired) in cases {
        let engine = registry.resolve(kind).unwrap();
        let prior = create(&engine, &desired).await;
        let base = config_of(&engine, &prior);
        assert!(engine.requires_replace(&base, &prior).is_empty(), "{}", kind);

        for attr in engine
            .schema()
            .attributes
            .iter()
            .filter(|a| a.mutability == Mutability::Immutable)
        {
            let mut desired = base.clone();
            desired.set(attr.name, changed(&attr.ty, prior.get(attr.name)));
            let before = api.total_calls().await;

            assert_eq!(
                engine.requires_replace(&desired, &prior),
                vec![attr.name],
                "{}.{}",
                kind,
                attr.name
            );

            let outcome = engine.update(&desired, &prior).await;
            assert!(outcome.has_error(), "{}.{}", kind, attr.name);
            assert_eq!(outcome.value.as_ref(), Some(&prior));
            assert_eq!(api.total_calls().await, before, "{}.{}", kind, attr.name);
        }
    }
}

#[tokio::test]
async fn test_ip_pool_update_in_place() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_ip_pool").unwrap();

    let prior = create(&engine, &ip_pool("public")).await;
    let desired = attrs(json!({"name": "internet", "description": "public addresses"}));

    let outcome = engine.update(&desired, &prior).await;
    assert!(!outcome.has_error(), "{:?}", outcome.diagnostics);
    let state = outcome.value.unwrap();
    assert_eq!(state.id(), prior.id());
    assert_eq!(state.require_string("name"), Ok("internet"));
    assert_eq!(api.calls("ip_pool_update").await, 1);

    let remote = api.ip_pool_view(prior.id().unwrap()).await.unwrap();
    assert_eq!(remote.name, "internet");
}

#[tokio::test]
async fn test_update_of_missing_object_is_error() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_ip_pool").unwrap();

    let prior = create(&engine, &ip_pool("public")).await;
    api.forget(prior.id().unwrap()).await;

    let desired = attrs(json!({"name": "public", "description": "changed"}));
    let outcome = engine.update(&desired, &prior).await;
    assert!(outcome.has_error());
    assert_eq!(outcome.value, Some(prior));
    assert_eq!(
        outcome.diagnostics.errors().next().unwrap().summary,
        "Error updating IP pool"
    );
}

#[tokio::test]
async fn test_remote_error_is_verbatim() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    api.fail_next(
        "disk_create",
        ApiError::Status {
            status: 507,
            error_code: Some("InsufficientCapacity".into()),
            message: "not enough storage in silo \"default\"".into(),
        },
    )
    .await;

    let outcome = engine.create(&blank_disk("data")).await;
    assert!(outcome.value.is_none());
    let d = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Error creating disk");
    assert_eq!(
        d.detail,
        "API error: HTTP 507: not enough storage in silo \"default\""
    );
}

#[tokio::test]
async fn test_invalid_disk_size_reported_by_control_plane() {
    let (_, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    let mut desired = blank_disk("odd");
    desired.set("size", 1000);

    let outcome = engine.create(&desired).await;
    assert!(outcome.value.is_none());
    assert_eq!(
        outcome.diagnostics.errors().next().unwrap().detail,
        "API error: HTTP 400: disk size 1000 must be a multiple of block size 512"
    );
}

#[tokio::test]
async fn test_out_of_range_input_is_invalid_configuration() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_instance").unwrap();

    let mut desired = instance("wide");
    desired.set("ncpus", 70000);

    let outcome = engine.create(&desired).await;
    assert!(outcome.value.is_none());
    let d = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Invalid configuration");
    assert_eq!(d.attribute.as_deref(), Some("ncpus"));
    assert_eq!(d.detail, "attribute \"ncpus\" is out of range: 70000");
    assert_eq!(api.total_calls().await, 0);
}

#[tokio::test]
async fn test_create_timeout() {
    let api = Arc::new(MemoryControlPlane::new().with_latency(Duration::from_millis(500)));
    let registry = Registry::builtin(config(), api).unwrap();
    let engine = registry.resolve("oxide_disk").unwrap();

    let mut desired = blank_disk("slow");
    desired.set("timeouts", json!({"create": "20ms"}));

    let outcome = engine.create(&desired).await;
    assert!(outcome.value.is_none());
    let d = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Error creating disk");
    assert_eq!(d.detail, "API error: timed out after 20ms");
}

#[tokio::test]
async fn test_unsupported_timeout_override() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_image").unwrap();

    let mut desired = url_image("alpine");
    desired.set("timeouts", json!({"delete": "1m"}));

    let outcome = engine.create(&desired).await;
    assert!(outcome.has_error());
    assert_eq!(
        outcome.diagnostics.errors().next().unwrap().attribute.as_deref(),
        Some("timeouts.delete")
    );
    assert_eq!(api.total_calls().await, 0);
}

#[tokio::test]
async fn test_import() {
    let (_, registry) = setup();
    let engine = registry.resolve("oxide_ip_pool").unwrap();

    let state = create(&engine, &ip_pool("public")).await;

    let outcome = engine.import(state.id().unwrap()).await;
    assert!(!outcome.has_error());
    assert_eq!(outcome.value, Some(state));

    let outcome = engine.import("3f9a2b64-0000-4000-8000-000000000000").await;
    assert!(outcome.value.is_none());
    let d = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(d.summary, "Error importing IP pool");
    assert!(d.detail.starts_with("API error: not found"));
}

#[tokio::test]
async fn test_imported_disk_round_trips() {
    let (_, registry) = setup();
    let engine = registry.resolve("oxide_disk").unwrap();

    let state = create(&engine, &blank_disk("data")).await;
    let imported = engine.import(state.id().unwrap()).await.value.unwrap();

    assert_eq!(imported, state);
    assert!(engine.requires_replace(&blank_disk("data"), &imported).is_empty());
}

#[tokio::test]
async fn test_running_instance_is_stopped_before_delete() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_instance").unwrap();

    let state = create(&engine, &instance("web")).await;
    assert_eq!(state.require_string("run_state"), Ok("running"));

    let diagnostics = engine.delete(&state).await;
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert_eq!(api.calls("instance_stop").await, 1);
    assert_eq!(api.calls("instance_delete").await, 1);
    assert!(
        api.instance_view(state.id().unwrap())
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn test_stopped_instance_is_deleted_directly() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_instance").unwrap();

    let mut desired = instance("batch");
    desired.set("start_on_create", false);
    let state = create(&engine, &desired).await;
    assert_eq!(state.require_string("run_state"), Ok("stopped"));

    assert!(engine.delete(&state).await.is_empty());
    assert_eq!(api.calls("instance_stop").await, 0);
}

#[tokio::test]
async fn test_concurrent_creates_share_engine() {
    let (api, registry) = setup();
    let engine = registry.resolve("oxide_ip_pool").unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.create(&ip_pool(&format!("pool-{}", i))).await })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(!outcome.has_error());
        ids.push(outcome.value.unwrap().id().unwrap().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(api.ip_pool_list().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_duplicate_name_is_remote_error() {
    let (_, registry) = setup();
    let engine = registry.resolve("oxide_ip_pool").unwrap();

    create(&engine, &ip_pool("public")).await;
    let outcome = engine.create(&ip_pool("public")).await;
    assert_eq!(
        outcome.diagnostics.errors().next().unwrap().detail,
        "API error: HTTP 400: already exists: ip-pool \"public\""
    );
}
