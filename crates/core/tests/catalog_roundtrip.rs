//! End-to-end lifecycle tests: create, build, save, reopen, query, delete.

use nearstore_core::config;
use nearstore_core::{
    Catalog, DistanceMetric, Document, DocumentId, Error, FilterClause, IndexParams, IndexType,
    MetadataValue, QuantizationType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn random_rows(rng: &mut StdRng, n: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

#[test]
fn test_two_document_collection_survives_reload() {
    let tmp = TempDir::new().unwrap();
    let query = vec![vec![0.1f32, 0.2, 0.3]];

    let before = {
        let catalog = Catalog::open(tmp.path()).unwrap();
        let coll = catalog
            .create_collection("coll", IndexParams::default(), None)
            .unwrap();
        let report = coll
            .insert(vec![
                Document::new(1, "first", vec![0.1, 0.2, 0.3]),
                Document::new(2, "second", vec![0.4, 0.5, 0.6]),
            ])
            .unwrap();
        assert!(report.all_accepted());
        catalog.save_collection("coll").unwrap();
        coll.batch_query(&query, 2, 10, 1).unwrap()
    };
    assert_eq!(before[0][0].document.id, DocumentId::Int(1));

    let catalog = Catalog::open(tmp.path()).unwrap();
    assert_eq!(catalog.list_collections(), vec!["coll"]);
    let coll = catalog.get_collection("coll").unwrap();
    let after = coll.batch_query(&query, 2, 10, 1).unwrap();

    assert_eq!(after[0].len(), 2);
    for (a, b) in before[0].iter().zip(&after[0]) {
        assert_eq!(a.document.id, b.document.id);
        assert_eq!(a.distance, b.distance);
        assert_eq!(a.document.text, b.document.text);
        assert_eq!(a.document.vector, b.document.vector);
    }
}

#[test]
fn test_index_roundtrip_is_identical_for_every_mode() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let rows = random_rows(&mut rng, 300, 16);
    let queries = random_rows(&mut rng, 20, 16);

    let modes = [
        ("raw_l2", DistanceMetric::L2, QuantizationType::None, IndexType::Nsg),
        ("sq8_ip", DistanceMetric::Ip, QuantizationType::Sq8, IndexType::Nsg),
        ("sq4_cos", DistanceMetric::Cos, QuantizationType::Sq4, IndexType::Fusion),
    ];

    let mut expected = Vec::new();
    {
        let catalog = Catalog::open(tmp.path()).unwrap();
        for (name, metric, quant, topo) in modes {
            let params = IndexParams::default()
                .with_metric(metric)
                .with_quantization(quant)
                .with_index_type(topo)
                .with_max_nbrs(12);
            let index = catalog.create_index(name, params).unwrap();
            index.fit(rows.clone()).unwrap();
            catalog.save_index(name).unwrap();
            expected.push(index.batch_query(&queries, 10, 40, 2).unwrap());
        }
    }

    let catalog = Catalog::open(tmp.path()).unwrap();
    assert_eq!(catalog.list_indices(), vec!["raw_l2", "sq4_cos", "sq8_ip"]);
    for ((name, ..), want) in modes.iter().zip(&expected) {
        let index = catalog.get_index(name).unwrap();
        assert!(index.is_built());
        assert_eq!(index.len(), 300);
        assert_eq!(&index.batch_query(&queries, 10, 40, 2).unwrap(), want);
    }
}

#[test]
fn test_second_fit_fails_and_keeps_first_build() {
    let tmp = TempDir::new().unwrap();
    let catalog = Catalog::open(tmp.path()).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let index = catalog.create_index("idx", IndexParams::default()).unwrap();
    index.fit(random_rows(&mut rng, 100, 8)).unwrap();
    let probe = random_rows(&mut rng, 1, 8).remove(0);
    let first = index.query(&probe, 5, 20).unwrap();

    let err = index.fit(random_rows(&mut rng, 50, 8)).unwrap_err();
    assert!(matches!(err, Error::State(_)));
    assert_eq!(index.len(), 100);
    assert_eq!(index.query(&probe, 5, 20).unwrap(), first);
}

#[test]
fn test_max_nbrs_ceiling() {
    let tmp = TempDir::new().unwrap();
    let catalog = Catalog::open(tmp.path()).unwrap();
    let err = catalog
        .create_index("wide", IndexParams::default().with_max_nbrs(1000))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(catalog.list_indices().is_empty());

    catalog
        .create_index("wide", IndexParams::default().with_max_nbrs(100))
        .unwrap();
    assert_eq!(catalog.list_indices(), vec!["wide"]);
}

#[test]
fn test_save_before_build_is_state_error() {
    let tmp = TempDir::new().unwrap();
    let catalog = Catalog::open(tmp.path()).unwrap();
    catalog.create_index("idx", IndexParams::default()).unwrap();
    assert!(matches!(catalog.save_index("idx"), Err(Error::State(_))));
    assert!(matches!(catalog.save_index("other"), Err(Error::NotFound(_))));
}

#[test]
fn test_delete_reset_and_listing_after_reopen() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    {
        let catalog = Catalog::open(tmp.path()).unwrap();
        for name in ["a", "b", "c"] {
            let index = catalog.create_index(name, IndexParams::default()).unwrap();
            index.fit(random_rows(&mut rng, 20, 4)).unwrap();
            catalog.save_index(name).unwrap();
        }
        catalog.delete_index("a", true).unwrap();
        catalog.delete_index("b", false).unwrap();
        assert_eq!(catalog.list_indices(), vec!["c"]);
        assert!(matches!(catalog.delete_index("a", true), Err(Error::NotFound(_))));
    }
    assert!(!tmp.path().join("a").exists());

    let catalog = Catalog::open(tmp.path()).unwrap();
    assert_eq!(catalog.list_indices(), vec!["b", "c"]);

    fs::write(tmp.path().join("keep.txt"), b"unrelated").unwrap();
    assert_eq!(catalog.reset().unwrap(), 2);
    assert!(catalog.list_indices().is_empty());
    assert!(tmp.path().join("keep.txt").exists());

    let reopened = Catalog::open(tmp.path()).unwrap();
    assert!(reopened.list_indices().is_empty());
}

#[test]
fn test_truncated_block_is_corruption() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    {
        let catalog = Catalog::open(tmp.path()).unwrap();
        let index = catalog.create_index("idx", IndexParams::default()).unwrap();
        index.fit(random_rows(&mut rng, 50, 8)).unwrap();
        catalog.save_index("idx").unwrap();
    }

    let graph = tmp.path().join("idx").join(config::GRAPH_FILE);
    let bytes = fs::read(&graph).unwrap();
    fs::write(&graph, &bytes[..bytes.len() / 2]).unwrap();

    let catalog = Catalog::open(tmp.path()).unwrap();
    assert!(catalog.list_indices().is_empty());
    assert!(matches!(catalog.load_index("idx"), Err(Error::Corruption(_))));
}

#[test]
fn test_load_missing_directory_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let catalog = Catalog::open(tmp.path()).unwrap();
    assert!(matches!(catalog.load_index("ghost"), Err(Error::NotFound(_))));
    assert!(matches!(
        catalog.load_collection("ghost"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_collection_mutations_persist() {
    let tmp = TempDir::new().unwrap();
    let params = IndexParams::default()
        .with_quantization(QuantizationType::Sq8)
        .with_max_nbrs(8);
    {
        let catalog = Catalog::open(tmp.path()).unwrap();
        let coll = catalog.create_collection("docs", params, Some(2)).unwrap();
        let docs: Vec<Document> = (0..50)
            .map(|i| {
                let lang = if i < 25 { "en" } else { "de" };
                Document::new(i, format!("doc {i}"), vec![i as f32, (50 - i) as f32])
                    .with_metadata("lang", MetadataValue::String(lang.to_string()))
            })
            .collect();
        coll.insert(docs).unwrap();

        coll.upsert(vec![Document::new(10, "moved", vec![40.0, 10.0])])
            .unwrap();
        assert_eq!(coll.delete_by_id(&[DocumentId::Int(11), DocumentId::Int(999)]), 1);
        let dropped = coll.delete_by_filter(&FilterClause::default().where_eq("lang", json!("de")));
        assert_eq!(dropped.len(), 25);
        catalog.save_collection("docs").unwrap();
    }

    let catalog = Catalog::open(tmp.path()).unwrap();
    let coll = catalog.get_collection("docs").unwrap();
    assert_eq!(coll.len(), 24);
    assert_eq!(coll.deleted_count(), 27);

    let moved = coll.get_by_id(&[DocumentId::Int(10)]);
    assert_eq!(moved[0].text, "moved");
    assert!(coll.get_by_id(&[DocumentId::Int(11)]).is_empty());

    let hits = coll.batch_query(&[vec![40.0, 10.0]], 1, 16, 1).unwrap();
    assert_eq!(hits[0][0].document.id, DocumentId::Int(10));

    let everything = coll.batch_query(&[vec![0.0, 50.0]], 24, 64, 1).unwrap();
    assert_eq!(everything[0].len(), 24);
    assert!(everything[0]
        .iter()
        .all(|h| h.document.id != DocumentId::Int(11)));

    assert_eq!(coll.reindex().unwrap(), 24);
    assert_eq!(coll.deleted_count(), 0);
}

#[test]
fn test_batch_order_independent_of_thread_count() {
    let tmp = TempDir::new().unwrap();
    let catalog = Catalog::open(tmp.path()).unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    let params = IndexParams::default()
        .with_metric(DistanceMetric::Cos)
        .with_quantization(QuantizationType::Sq8)
        .with_max_nbrs(16);
    let index = catalog.create_index("par", params).unwrap();
    index.fit(random_rows(&mut rng, 500, 24)).unwrap();

    let queries = random_rows(&mut rng, 64, 24);
    let single = index.batch_query(&queries, 10, 50, 1).unwrap();
    let multi = index.batch_query(&queries, 10, 50, 4).unwrap();
    assert_eq!(single, multi);
    for (q, hits) in queries.iter().zip(&single) {
        assert_eq!(&index.query(q, 10, 50).unwrap(), hits);
    }
}

#[test]
fn test_handle_save_outside_catalog() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(13);
    let index = nearstore_core::Index::new("standalone", IndexParams::default()).unwrap();
    index.fit(random_rows(&mut rng, 40, 6)).unwrap();

    let dir = tmp.path().join("exports").join("standalone");
    let schema = index.save(&dir).unwrap();
    assert_eq!(schema.count, 40);
    assert!(dir.join(config::SCHEMA_FILE).is_file());

    let restored = nearstore_core::storage::load_index(&dir).unwrap();
    let probe = random_rows(&mut rng, 1, 6).remove(0);
    assert_eq!(
        restored.query(&probe, 5, 20).unwrap(),
        index.query(&probe, 5, 20).unwrap()
    );
}
