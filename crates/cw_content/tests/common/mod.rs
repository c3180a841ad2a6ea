#![allow(dead_code)]

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use cw_bundle::{class, Bundle, BundleCompression, Record};
use cw_content::identify::{
    BLUEPRINT_ID_FIELD, CONTENT_TYPE_FIELD, ENGINE_VERSION_FIELD, IMPOSTER_CLASS,
    SCRIPT_CLASS_FIELD,
};
use cw_content::{Applicability, Content, PatchStatus, Plugin, Verification};
use tempfile::TempDir;

pub const PORTAL_PATH_ID: i64 = 20;
pub const MIRROR_PATH_ID: i64 = 21;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scratch cache root laid out as `<root>/<stable>/<version>/__data`.
pub struct CacheFixture {
    _temp: TempDir,
    pub root: Utf8PathBuf,
}

impl CacheFixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        fs::create_dir_all(&root).unwrap();
        Self { _temp: temp, root }
    }

    /// Write `bundle` as `<root>/<stable>/<version>/__data` and return the version directory.
    pub fn add(&self, stable: &str, version: &str, bundle: &Bundle) -> Utf8PathBuf {
        let dir = self.root.join(stable).join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("__data"),
            bundle.to_bytes(BundleCompression::Zstd).unwrap(),
        )
        .unwrap();
        dir
    }

    pub fn add_empty_dir(&self, stable: &str, version: &str) -> Utf8PathBuf {
        let dir = self.root.join(stable).join(version);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn index_path(&self) -> Utf8PathBuf {
        self.root.parent().unwrap().join("index.json")
    }
}

fn descriptor(id: &str, content_type: i64) -> Record {
    Record::new(1, class::BEHAVIOUR)
        .with_field(BLUEPRINT_ID_FIELD, id)
        .with_field(CONTENT_TYPE_FIELD, content_type)
}

fn manifest(engine: &str) -> Record {
    Record::new(2, class::ASSET_BUNDLE).with_field(ENGINE_VERSION_FIELD, engine)
}

pub fn world_bundle(id: &str, engine: &str) -> Bundle {
    Bundle::new()
        .with_record(manifest(engine))
        .with_record(descriptor(id, 1))
        .with_record(Record::new(PORTAL_PATH_ID, class::BEHAVIOUR).with_field("m_Name", "Portal"))
        .with_record(Record::new(MIRROR_PATH_ID, class::BEHAVIOUR).with_field("m_Name", "Mirror"))
}

pub fn avatar_bundle(id: &str, imposter: bool) -> Bundle {
    let script = if imposter { IMPOSTER_CLASS } else { "AvatarDescriptor" };
    Bundle::new()
        .with_record(manifest("2022.3.6f1"))
        .with_record(descriptor(id, 0))
        .with_record(Record::new(3, class::SCRIPT).with_field(SCRIPT_CLASS_FIELD, script))
}

pub fn read_data(version_dir: &Utf8Path) -> Vec<u8> {
    fs::read(version_dir.join("__data")).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Remove the record with this path id.
    Remove(i64),
    NoOp,
    Fail,
    Panic,
    /// Verification reports the content as unknown.
    Reject,
    /// `initialize` returns an error.
    FailInit,
}

/// Plugin with call counters, shared with the test through an `Arc`.
pub struct TestPlugin {
    pub name: &'static str,
    pub applicability: Applicability,
    pub tracking: bool,
    pub override_blocklist: bool,
    pub behaviour: Behaviour,
    pub init_calls: AtomicUsize,
    pub patch_calls: AtomicUsize,
    pub post_patch_calls: AtomicUsize,
    pub disk_write_calls: AtomicUsize,
}

impl TestPlugin {
    pub fn new(name: &'static str, behaviour: Behaviour) -> Self {
        Self {
            name,
            applicability: Applicability::Global,
            tracking: false,
            override_blocklist: false,
            behaviour,
            init_calls: AtomicUsize::new(0),
            patch_calls: AtomicUsize::new(0),
            post_patch_calls: AtomicUsize::new(0),
            disk_write_calls: AtomicUsize::new(0),
        }
    }

    pub fn tracking(mut self) -> Self {
        self.tracking = true;
        self
    }

    pub fn only(mut self, ids: &[&str]) -> Self {
        self.applicability = Applicability::only(ids.iter().copied());
        self
    }

    pub fn overriding_blocklist(mut self) -> Self {
        self.override_blocklist = true;
        self
    }

    pub fn initializations(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn patches(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }

    pub fn post_patches(&self) -> usize {
        self.post_patch_calls.load(Ordering::SeqCst)
    }

    pub fn disk_writes(&self) -> usize {
        self.disk_write_calls.load(Ordering::SeqCst)
    }
}

impl Plugin for TestPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn maintainer(&self) -> &str {
        "integration-tests"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn applicability(&self) -> Applicability {
        self.applicability.clone()
    }

    fn wants_tracking(&self) -> bool {
        self.tracking
    }

    fn overrides_blocklist(&self, _content: &Content) -> bool {
        self.override_blocklist
    }

    fn initialize(&self, _content: &Content) -> anyhow::Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.behaviour == Behaviour::FailInit {
            anyhow::bail!("{} could not initialize", self.name);
        }
        Ok(())
    }

    fn verify(&self, _content: &Content, _bundle: &Bundle) -> anyhow::Result<Verification> {
        Ok(match self.behaviour {
            Behaviour::Reject => Verification::Failure,
            _ => Verification::Success,
        })
    }

    fn patch(&self, _content: &Content, bundle: &mut Bundle) -> anyhow::Result<PatchStatus> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Remove(path_id) => Ok(match bundle.remove_record(path_id) {
                Some(_) => PatchStatus::Success,
                None => PatchStatus::NoOp,
            }),
            Behaviour::NoOp | Behaviour::Reject | Behaviour::FailInit => Ok(PatchStatus::NoOp),
            // Both failure modes edit first so the pipeline has something to roll back.
            Behaviour::Fail => {
                bundle.remove_record(PORTAL_PATH_ID);
                anyhow::bail!("{} failed on purpose", self.name)
            }
            Behaviour::Panic => {
                bundle.remove_record(MIRROR_PATH_ID);
                panic!("{} panicked on purpose", self.name)
            }
        }
    }

    fn post_patch(&self, _content: &Content) -> anyhow::Result<()> {
        self.post_patch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn post_disk_write(&self, _content: &Content) -> anyhow::Result<()> {
        self.disk_write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
