mod common;

use std::fs;
use std::sync::Arc;

use common::{
    avatar_bundle, read_data, world_bundle, Behaviour, CacheFixture, TestPlugin, MIRROR_PATH_ID,
    PORTAL_PATH_ID,
};
use cw_bundle::{class, Bundle};
use cw_content::{
    layout, BlockRule, Content, ContentIndex, PatchOutcome, PatchPipeline, PluginRegistry,
    RuleSet, Scanner, Settings, BLOCKLIST_MARKER,
};

const WORLD: &str = "wrld_abc";

/// Index one world at `abc123/01` and return it.
fn indexed_world(cache: &CacheFixture, index: &ContentIndex) -> Content {
    cache.add("abc123", "01", &world_bundle(WORLD, "2022.3.6f1"));
    Scanner::new(index).scan(&cache.root).unwrap();
    index.lookup_by_id(WORLD).unwrap()
}

fn registry(plugins: &[&Arc<TestPlugin>]) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        registry.register_arc((*plugin).clone());
    }
    registry
}

fn mirror_remover() -> TestPlugin {
    TestPlugin::new("mirror-remover", Behaviour::Remove(MIRROR_PATH_ID))
}

fn portal_blocklist() -> Arc<RuleSet> {
    Arc::new(RuleSet::new().with_rules(
        WORLD,
        vec![BlockRule::new("portals")
            .with_class(class::BEHAVIOUR)
            .with_field("m_Name", "Portal")],
    ))
}

fn path_ids(bundle: &Bundle) -> Vec<i64> {
    bundle.records().iter().map(|r| r.path_id).collect()
}

#[test]
fn rewrite_keeps_backup_and_records_patchers() {
    common::init_tracing();
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);
    let original = read_data(content.path());

    let plugin = Arc::new(mirror_remover().tracking());
    let pipeline = PatchPipeline::new(Settings::default())
        .with_plugins(registry(&[&plugin]))
        .with_blocklist(portal_blocklist());

    let report = pipeline.patch(&index, &content).unwrap();
    assert!(report.is_written(), "unexpected outcome {:?}", report.outcome);
    assert_eq!(report.patched_by, vec!["mirror-remover".to_string()]);
    assert!(report.blocklist_applied);

    let data = layout::data_file(content.path());
    let patched = Bundle::open(&data).unwrap();
    assert!(!path_ids(&patched).contains(&MIRROR_PATH_ID));
    assert!(!path_ids(&patched).contains(&PORTAL_PATH_ID));

    let backup = layout::sibling(&data, layout::BACKUP_SUFFIX);
    assert_eq!(fs::read(&backup).unwrap(), original);
    assert!(!layout::sibling(&data, layout::CLEAN_SUFFIX).as_std_path().exists());

    let stored = index.lookup_by_id(WORLD).unwrap();
    assert!(stored.version_meta.is_patched_by("mirror-remover"));
    assert!(stored.version_meta.is_patched_by(BLOCKLIST_MARKER));
    assert_eq!(plugin.disk_writes(), 1);
}

#[test]
fn oversized_bundle_is_never_decoded() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);
    let original = read_data(content.path());

    let plugin = Arc::new(mirror_remover());
    let settings = Settings {
        max_decompressed_mb: 0,
        ..Default::default()
    };
    let pipeline = PatchPipeline::new(settings)
        .with_plugins(registry(&[&plugin]))
        .with_blocklist(portal_blocklist());

    let report = pipeline.patch(&index, &content).unwrap();
    assert_eq!(
        report.outcome,
        PatchOutcome::Rejected {
            estimated_mb: 1,
            limit_mb: 0
        }
    );
    assert_eq!(plugin.patches(), 0);
    assert_eq!(read_data(content.path()), original);
    assert!(index.lookup_by_id(WORLD).unwrap().version_meta.patched_by.is_empty());
}

#[test]
fn no_mutation_leaves_disk_and_index_untouched() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);
    let original = read_data(content.path());

    let plugin = Arc::new(TestPlugin::new("inspector", Behaviour::NoOp).tracking());
    let pipeline = PatchPipeline::new(Settings::default()).with_plugins(registry(&[&plugin]));

    let report = pipeline.patch(&index, &content).unwrap();
    assert_eq!(report.outcome, PatchOutcome::Unchanged);
    assert_eq!(plugin.patches(), 1);
    assert_eq!(plugin.post_patches(), 1);
    assert_eq!(plugin.disk_writes(), 0);

    assert_eq!(read_data(content.path()), original);
    assert!(!layout::sibling(&content.data_path(), layout::BACKUP_SUFFIX)
        .as_std_path()
        .exists());
    assert!(index.lookup_by_id(WORLD).unwrap().version_meta.patched_by.is_empty());
}

#[test]
fn dry_run_writes_nothing() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);
    let original = read_data(content.path());

    let plugin = Arc::new(mirror_remover().tracking());
    let settings = Settings {
        dry_run: true,
        ..Default::default()
    };
    let pipeline = PatchPipeline::new(settings)
        .with_plugins(registry(&[&plugin]))
        .with_blocklist(portal_blocklist());

    let report = pipeline.patch(&index, &content).unwrap();
    assert_eq!(report.outcome, PatchOutcome::DryRun);
    assert_eq!(plugin.patches(), 1);
    assert_eq!(plugin.disk_writes(), 0);
    assert_eq!(read_data(content.path()), original);
    assert!(index.lookup_by_id(WORLD).unwrap().version_meta.patched_by.is_empty());
}

#[test]
fn failing_plugins_are_isolated() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);

    let panicking = Arc::new(TestPlugin::new("panicker", Behaviour::Panic).tracking());
    let failing = Arc::new(TestPlugin::new("failer", Behaviour::Fail).tracking());
    let working =
        Arc::new(TestPlugin::new("portal-remover", Behaviour::Remove(PORTAL_PATH_ID)).tracking());
    let pipeline = PatchPipeline::new(Settings::default())
        .with_plugins(registry(&[&panicking, &failing, &working]));

    let report = pipeline.patch(&index, &content).unwrap();
    assert!(report.is_written());
    assert_eq!(report.failed, vec!["panicker".to_string(), "failer".to_string()]);
    assert_eq!(report.patched_by, vec!["portal-remover".to_string()]);

    // The failed hooks' partial edits were rolled back.
    let patched = Bundle::open(content.data_path()).unwrap();
    assert!(path_ids(&patched).contains(&MIRROR_PATH_ID));
    assert!(!path_ids(&patched).contains(&PORTAL_PATH_ID));

    // Tracking follows the request, not the hook's result.
    let stored = index.lookup_by_id(WORLD).unwrap();
    assert!(stored.version_meta.is_patched_by("portal-remover"));
    assert!(stored.version_meta.is_patched_by("panicker"));
    assert!(stored.version_meta.is_patched_by("failer"));
    assert_eq!(panicking.post_patches(), 1);
    assert_eq!(failing.post_patches(), 1);
    assert_eq!(working.disk_writes(), 1);
    assert_eq!(panicking.disk_writes(), 0);
}

#[test]
fn tracked_plugins_run_once_per_version() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);

    let plugin = Arc::new(mirror_remover().tracking());
    let pipeline = PatchPipeline::new(Settings::default())
        .with_plugins(registry(&[&plugin]))
        .with_blocklist(portal_blocklist());

    assert!(pipeline.patch(&index, &content).unwrap().is_written());
    let backup = layout::sibling(&content.data_path(), layout::BACKUP_SUFFIX);
    let first_backup = fs::read(&backup).unwrap();

    let again = pipeline.patch(&index, &content).unwrap();
    assert_eq!(again.outcome, PatchOutcome::Unchanged);
    assert!(!again.blocklist_applied);
    assert_eq!(plugin.patches(), 1);
    assert_eq!(fs::read(&backup).unwrap(), first_backup);
}

#[test]
fn applicability_and_verification_gate_patching() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);

    let elsewhere = Arc::new(
        TestPlugin::new("elsewhere", Behaviour::Remove(MIRROR_PATH_ID)).only(&["wrld_other"]),
    );
    let unverified = Arc::new(TestPlugin::new("unverified", Behaviour::Reject));
    let uninitialized = Arc::new(TestPlugin::new("uninitialized", Behaviour::FailInit));
    let targeted = Arc::new(TestPlugin::new("targeted", Behaviour::NoOp).only(&[WORLD]));
    let pipeline = PatchPipeline::new(Settings::default()).with_plugins(registry(&[
        &elsewhere,
        &unverified,
        &uninitialized,
        &targeted,
    ]));

    let report = pipeline.patch(&index, &content).unwrap();
    assert_eq!(report.outcome, PatchOutcome::Unchanged);
    assert_eq!(report.failed, vec!["uninitialized".to_string()]);
    assert_eq!(targeted.patches(), 1);

    // Only `patch` is gated; the other hooks run exactly once each.
    for plugin in [&elsewhere, &unverified, &uninitialized] {
        assert_eq!(plugin.patches(), 0, "{} should not patch", plugin.name);
        assert_eq!(plugin.initializations(), 1, "{} initialize", plugin.name);
        assert_eq!(plugin.post_patches(), 1, "{} post_patch", plugin.name);
    }
    assert_eq!(targeted.post_patches(), 1);
}

#[test]
fn non_applicable_plugin_can_still_override_blocklist() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);

    let elsewhere = Arc::new(
        TestPlugin::new("elsewhere", Behaviour::NoOp)
            .only(&["wrld_other"])
            .overriding_blocklist(),
    );
    let pipeline = PatchPipeline::new(Settings::default())
        .with_plugins(registry(&[&elsewhere]))
        .with_blocklist(portal_blocklist());

    let report = pipeline.patch(&index, &content).unwrap();
    assert_eq!(report.blocklist_overridden_by.as_deref(), Some("elsewhere"));
    assert!(!report.blocklist_applied);
    assert_eq!(report.outcome, PatchOutcome::Unchanged);
}

#[test]
fn tracking_is_recorded_even_when_verification_fails() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);

    let unverified = Arc::new(TestPlugin::new("unverified", Behaviour::Reject).tracking());
    let remover = Arc::new(mirror_remover());
    let pipeline =
        PatchPipeline::new(Settings::default()).with_plugins(registry(&[&unverified, &remover]));

    let report = pipeline.patch(&index, &content).unwrap();
    assert!(report.is_written());
    assert_eq!(report.patched_by, vec!["mirror-remover".to_string()]);
    assert_eq!(unverified.patches(), 0);
    assert_eq!(unverified.post_patches(), 1);
    assert_eq!(unverified.disk_writes(), 0);

    let stored = index.lookup_by_id(WORLD).unwrap();
    assert!(stored.version_meta.is_patched_by("unverified"));
    assert!(!stored.version_meta.is_patched_by("mirror-remover"));

    // The recorded plugin is skipped on the next run.
    pipeline.patch(&index, &content).unwrap();
    assert_eq!(unverified.initializations(), 1);
}

#[test]
fn plugin_can_override_blocklist() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let content = indexed_world(&cache, &index);

    let plugin = Arc::new(mirror_remover().overriding_blocklist());
    let pipeline = PatchPipeline::new(Settings::default())
        .with_plugins(registry(&[&plugin]))
        .with_blocklist(portal_blocklist());

    let report = pipeline.patch(&index, &content).unwrap();
    assert!(report.is_written());
    assert!(!report.blocklist_applied);
    assert_eq!(report.blocklist_overridden_by.as_deref(), Some("mirror-remover"));

    let patched = Bundle::open(content.data_path()).unwrap();
    assert!(path_ids(&patched).contains(&PORTAL_PATH_ID));
}

#[test]
fn avatars_are_not_patched() {
    let cache = CacheFixture::new();
    let index = ContentIndex::in_memory();
    let dir = cache.add("avatar", "01", &avatar_bundle("avtr_1", false));
    Scanner::new(&index).scan(&cache.root).unwrap();

    let plugin = Arc::new(TestPlugin::new("any", Behaviour::NoOp));
    let pipeline = PatchPipeline::new(Settings::default()).with_plugins(registry(&[&plugin]));
    let content = index.lookup_by_id("avtr_1").unwrap();

    let report = pipeline.patch(&index, &content).unwrap();
    assert_eq!(report.outcome, PatchOutcome::NotApplicable);
    assert_eq!(plugin.patches(), 0);
    assert!(!layout::sibling(&layout::data_file(&dir), layout::BACKUP_SUFFIX)
        .as_std_path()
        .exists());
}

#[test]
fn scan_runs_pipeline_once_per_identity() {
    let cache = CacheFixture::new();
    cache.add("aaa", "01", &world_bundle(WORLD, "2021.4.1f1"));
    cache.add("bbb", "01", &world_bundle(WORLD, "2022.3.6f1"));
    cache.add("ccc", "01", &avatar_bundle("avtr_1", false));

    let plugin = Arc::new(mirror_remover().tracking());
    let pipeline = PatchPipeline::new(Settings::default()).with_plugins(registry(&[&plugin]));
    let index = ContentIndex::in_memory();

    let report = Scanner::new(&index)
        .with_pipeline(&pipeline)
        .scan(&cache.root)
        .unwrap();
    assert_eq!(report.patches.len(), 1);
    assert_eq!(plugin.patches(), 1);

    // The winning duplicate under `bbb` is the one that got patched.
    let stored = index.lookup_by_id(WORLD).unwrap();
    assert_eq!(stored.stable_name, "bbb");
    assert!(stored.version_meta.is_patched_by("mirror-remover"));
    assert!(layout::sibling(&stored.data_path(), layout::BACKUP_SUFFIX)
        .as_std_path()
        .exists());
}
