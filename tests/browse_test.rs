//! Action dispatch against both backends.

mod common;

use common::TestHarness;
use mediacat::browse::{ActionArgs, ActionOutputs};
use mediacat::config::{BackendKind, NonContainerBrowse};
use mediacat::didl::{from_result_document, to_result_document};
use mediacat_common::{BrowseWindow, CatalogEntry, ObjectId};

fn args(pairs: &[(&str, &str)]) -> ActionArgs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn browse_args(id: &str, flag: &str, start: u32, count: u32) -> ActionArgs {
    args(&[
        ("ObjectID", id),
        ("BrowseFlag", flag),
        ("StartingIndex", &start.to_string()),
        ("RequestedCount", &count.to_string()),
        ("Filter", "*"),
        ("SortCriteria", ""),
    ])
}

fn output<'a>(outputs: &'a ActionOutputs, name: &str) -> &'a str {
    outputs
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.as_str())
        .unwrap()
}

fn entries(outputs: &ActionOutputs) -> Vec<CatalogEntry> {
    from_result_document(output(outputs, "Result")).unwrap()
}

#[tokio::test]
async fn browse_walks_the_tree() {
    for harness in [TestHarness::scanning().await, TestHarness::indexed().await] {
        let cd = harness.service.directory();

        let root = cd
            .dispatch("Browse", &browse_args("0", "BrowseMetadata", 3, 1))
            .unwrap();
        assert_eq!(output(&root, "NumberReturned"), "1");
        let root = entries(&root).remove(0);
        assert_eq!(root.id, ObjectId::root());
        assert_eq!(root.parent_id, ObjectId::root_parent());
        assert_eq!(root.as_container().unwrap().child_count, 3);

        let page = cd
            .dispatch("Browse", &browse_args("0", "BrowseDirectChildren", 1, 1))
            .unwrap();
        assert_eq!(output(&page, "NumberReturned"), "1");
        assert_eq!(output(&page, "TotalMatches"), "3");
        let videos = entries(&page).remove(0);
        assert_eq!(videos.title, "Videos");
        assert_eq!(videos.parent_id, ObjectId::root());

        let clips = cd
            .dispatch(
                "Browse",
                &browse_args(videos.id.as_str(), "BrowseDirectChildren", 0, 0),
            )
            .unwrap();
        let clip = entries(&clips).remove(0);
        assert_eq!(clip.title, "clip.mp4");
        assert_eq!(clip.class_name(), "object.item.videoItem.movie");
        assert!(clip.resource().unwrap().url.is_some());

        let err = cd
            .dispatch(
                "Browse",
                &browse_args(clip.id.as_str(), "BrowseDirectChildren", 0, 0),
            )
            .unwrap_err();
        assert_eq!(err.code, 710);
    }
}

#[tokio::test]
async fn children_of_item_can_be_empty() {
    let harness = TestHarness::start(BackendKind::Indexed, NonContainerBrowse::Empty).await;
    let cd = harness.service.directory();

    let hits = cd
        .search(
            &ObjectId::root(),
            r#"upnp:class derivedfrom "object.item.imageItem""#,
            BrowseWindow::all(),
        )
        .unwrap();
    let cover = from_result_document(&hits.result).unwrap().remove(0);

    let out = cd
        .dispatch(
            "Browse",
            &browse_args(cover.id.as_str(), "BrowseDirectChildren", 0, 0),
        )
        .unwrap();
    assert_eq!(output(&out, "TotalMatches"), "0");
    assert!(entries(&out).is_empty());
}

#[tokio::test]
async fn metadata_documents_round_trip() {
    let harness = TestHarness::indexed().await;
    let cd = harness.service.directory();

    let all = cd.search(&ObjectId::root(), "*", BrowseWindow::all()).unwrap();
    for entry in from_result_document(&all.result).unwrap() {
        let meta = cd.browse_metadata(&entry.id).unwrap();
        let parsed = from_result_document(&meta.result).unwrap();
        assert_eq!(parsed.len(), 1);

        let again = to_result_document(&parsed, true, cd.base_url());
        assert_eq!(again, meta.result, "{}", entry.title);
        assert_eq!(from_result_document(&again).unwrap(), parsed);
    }
}

#[tokio::test]
async fn search_action_filters_by_class() {
    let harness = TestHarness::scanning().await;
    let cd = harness.service.directory();

    let out = cd
        .dispatch(
            "Search",
            &args(&[
                ("ContainerID", "0"),
                ("SearchCriteria", r#"upnp:class derivedfrom "object.item.audioItem""#),
                ("Filter", "*"),
                ("StartingIndex", "0"),
                ("RequestedCount", "1"),
                ("SortCriteria", "+dc:title"),
            ]),
        )
        .unwrap();
    assert_eq!(output(&out, "NumberReturned"), "1");
    assert_eq!(output(&out, "TotalMatches"), "2");
    assert_eq!(entries(&out)[0].title, "b-side.flac");
}

#[tokio::test]
async fn rebuilding_the_catalog_bumps_the_update_id() {
    let harness = TestHarness::indexed().await;
    let cd = harness.service.directory();
    let update_id = || {
        let out = cd.dispatch("GetSystemUpdateID", &ActionArgs::new()).unwrap();
        output(&out, "Id").to_string()
    };
    assert_eq!(update_id(), "1");

    std::fs::write(harness.media_root().join("Videos/extra.mkv"), b"matroska").unwrap();
    let id = harness
        .service
        .rebuild_catalog(&harness.config.catalog)
        .await
        .unwrap();
    assert_eq!(id, 2);
    assert_eq!(update_id(), "2");

    let videos = cd
        .search(
            &ObjectId::root(),
            r#"upnp:class derivedfrom "object.item.videoItem""#,
            BrowseWindow::all(),
        )
        .unwrap();
    assert_eq!(videos.total_matches, 2);
    assert_eq!(videos.update_id, 2);

    harness
        .service
        .rebuild_catalog(&harness.config.catalog)
        .await
        .unwrap();
    assert_eq!(update_id(), "3");
}
