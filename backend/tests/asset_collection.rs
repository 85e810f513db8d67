//! Orphan scanning and collection over a real asset directory.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use inventory::domain::{
    AssetGarbageCollector, AssetUpload, CaptionedUpload, CatalogRecordService, CodeFormat,
    CreateOutcome, CreateRecordRequest, DEFAULT_ALLOWED_EXTENSIONS, IdentifierAllocator,
    RecordDraft, RecordId,
};
use inventory::outbound::assets::DirectoryAssetStore;
use inventory::test_support::cap_fs::ScratchDir;
use inventory::test_support::{InMemoryCatalogRepository, MutableClock};
use rstest::{fixture, rstest};

struct Workspace {
    scratch: ScratchDir,
    service: CatalogRecordService<InMemoryCatalogRepository, DirectoryAssetStore>,
    collector: AssetGarbageCollector<InMemoryCatalogRepository, DirectoryAssetStore>,
}

#[fixture]
fn workspace() -> Workspace {
    let scratch = ScratchDir::new().expect("scratch dir");
    let store = Arc::new(DirectoryAssetStore::new(
        scratch.open().expect("dir handle"),
        "database/uploads",
    ));
    let repository = Arc::new(InMemoryCatalogRepository::new());
    let now = Utc
        .with_ymd_and_hms(2026, 4, 14, 16, 45, 0)
        .single()
        .expect("valid timestamp");
    let service = CatalogRecordService::new(
        repository.clone(),
        store.clone(),
        IdentifierAllocator::new(repository.clone(), CodeFormat::default()),
        Arc::new(MutableClock::new(now)),
    );
    let collector = AssetGarbageCollector::new(repository, store, DEFAULT_ALLOWED_EXTENSIONS);
    Workspace {
        scratch,
        service,
        collector,
    }
}

async fn create_with_images(workspace: &Workspace) -> RecordId {
    let request = CreateRecordRequest {
        draft: RecordDraft {
            name: "Philips 930A".to_owned(),
            category: "Radios".to_owned(),
            inventory_code: Some("INV_IC2_0000".to_owned()),
            ..RecordDraft::default()
        },
        primary_upload: Some(AssetUpload::new("front.jpg", b"front".to_vec())),
        additional_uploads: vec![CaptionedUpload {
            upload: AssetUpload::new("back.png", b"back-panel".to_vec()),
            caption: "rear panel".to_owned(),
        }],
    };
    match workspace.service.create(request).await.expect("create succeeds") {
        CreateOutcome::Created { id, .. } => id,
        other => panic!("expected creation, got {other:?}"),
    }
}

fn names(files: &[inventory::domain::StoredAsset]) -> Vec<&str> {
    files.iter().map(|file| file.name.as_str()).collect()
}

#[rstest]
#[tokio::test]
async fn scan_is_repeatable_and_ignores_other_files(workspace: Workspace) {
    create_with_images(&workspace).await;
    workspace.scratch.write("stray.png", b"stray").expect("write");
    workspace.scratch.write("notes.txt", b"not an image").expect("write");

    let first = workspace.collector.scan().await.expect("scan");
    let second = workspace.collector.scan().await.expect("scan");

    assert_eq!(first, second);
    assert_eq!(names(&first.orphans), vec!["stray.png"]);
    assert_eq!(first.files_in_store.len(), 3);
    assert!(!names(&first.files_in_store).contains(&"notes.txt"));
    assert_eq!(first.orphan_bytes(), 5);
    assert_eq!(workspace.scratch.file_names().expect("listing").len(), 4);
}

#[rstest]
#[tokio::test]
async fn collect_deletes_only_unreferenced_images(workspace: Workspace) {
    create_with_images(&workspace).await;
    workspace.scratch.write("stray.png", b"stray").expect("write");
    workspace.scratch.write("ORPHAN.JPEG", b"upper").expect("write");
    workspace.scratch.write("notes.txt", b"not an image").expect("write");
    let scan = workspace.collector.scan().await.expect("scan");
    let orphans: BTreeSet<&str> = names(&scan.orphans).into_iter().collect();
    let referenced: BTreeSet<&str> = scan.files_referenced.iter().map(String::as_str).collect();
    assert!(orphans.is_disjoint(&referenced));

    let report = workspace.collector.collect().await;

    assert_eq!(report.deleted, vec!["ORPHAN.JPEG".to_owned(), "stray.png".to_owned()]);
    assert_eq!(report.bytes_freed, 10);
    assert!(report.errors.is_empty());
    for name in &referenced {
        assert!(workspace.scratch.exists(name), "{name} must survive collection");
    }
    assert!(workspace.scratch.exists("notes.txt"));
}

#[rstest]
#[tokio::test]
async fn collecting_twice_finds_nothing_new(workspace: Workspace) {
    create_with_images(&workspace).await;
    workspace.scratch.write("stray.gif", b"gif").expect("write");

    let first = workspace.collector.collect().await;
    let second = workspace.collector.collect().await;

    assert_eq!(first.deleted, vec!["stray.gif".to_owned()]);
    assert!(second.deleted.is_empty());
    assert!(second.errors.is_empty());
}

#[rstest]
#[tokio::test]
async fn deleting_a_record_frees_its_blobs_immediately(workspace: Workspace) {
    let id = create_with_images(&workspace).await;
    assert_eq!(workspace.scratch.file_names().expect("listing").len(), 2);

    workspace.service.delete(id).await.expect("delete succeeds");

    assert!(workspace.scratch.file_names().expect("listing").is_empty());
    let scan = workspace.collector.scan().await.expect("scan");
    assert!(scan.orphans.is_empty());
}
