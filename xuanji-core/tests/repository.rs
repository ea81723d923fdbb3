use serde_json::json;
use tempfile::TempDir;
use xuanji_core::{
    CacheConfig, CacheLayer, DivinationCase, DivinationMethod, Filter, Hexagram, PageRequest,
    Repository, Setting, Store, Trigram, Value,
};

async fn open(dir: &TempDir) -> (Store, CacheLayer) {
    let store = Store::open(dir.path().join("nested").join("xuanji.db"))
        .await
        .unwrap();
    (store, CacheLayer::new(&CacheConfig::default()))
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let original = DivinationCase::new(DivinationMethod::Meihua, "Plum blossom reading")
        .with_question("Move this year?")
        .with_payload(json!({"upper": 3, "lower": 5, "moving": 2}))
        .with_hexagram(38)
        .with_tags(vec!["move".into(), "family".into()]);

    {
        let (store, cache) = open(&dir).await;
        let repo: Repository<DivinationCase> = Repository::new(store, cache);
        assert!(repo.save(&original).await);
    }

    let (store, cache) = open(&dir).await;
    assert!(store.schema_version().await.unwrap() > 0);
    let repo: Repository<DivinationCase> = Repository::new(store, cache);
    assert_eq!(repo.find_by_id(&original.id).await.unwrap(), Some(original));
}

#[tokio::test]
async fn test_repositories_share_one_cache_without_collisions() {
    let dir = TempDir::new().unwrap();
    let (store, cache) = open(&dir).await;
    let trigrams: Repository<Trigram> = Repository::new(store.clone(), cache.clone());
    let hexagrams: Repository<Hexagram> = Repository::new(store.clone(), cache.clone());

    assert!(trigrams.save(&Trigram::new(1, "Qian", "111")).await);
    assert!(hexagrams.save(&Hexagram::new(1, "Qian", "111111", 1, 1)).await);

    assert_eq!(trigrams.find_by_id(&1).await.unwrap().unwrap().binary_code, "111");
    assert_eq!(
        hexagrams.find_by_id(&1).await.unwrap().unwrap().binary_code,
        "111111"
    );
    assert_eq!(cache.len(), 2);

    // A trigram write leaves cached hexagrams alone.
    assert!(trigrams.save(&Trigram::new(1, "Heaven", "111")).await);
    assert_eq!(cache.len(), 1);
    assert_eq!(trigrams.find_by_id(&1).await.unwrap().unwrap().name, "Heaven");
}

#[tokio::test]
async fn test_reads_follow_writes_through_the_cache() {
    let dir = TempDir::new().unwrap();
    let (store, cache) = open(&dir).await;
    let repo: Repository<Trigram> = Repository::new(store, cache);
    let all = PageRequest::new();

    assert!(repo
        .save_all(&[
            Trigram::new(1, "Qian", "111").with_element("metal"),
            Trigram::new(2, "Dui", "110").with_element("metal"),
            Trigram::new(3, "Li", "101").with_element("fire"),
        ])
        .await);
    let metal = Filter::new("element = ?", vec![Value::from("metal")]);
    assert_eq!(repo.find_all(&all).await.unwrap().len(), 3);
    assert_eq!(repo.count(Some(&metal)).await.unwrap(), 2);

    assert!(repo.delete(&2).await);
    assert_eq!(repo.find_all(&all).await.unwrap().len(), 2);
    assert_eq!(repo.count(Some(&metal)).await.unwrap(), 1);
    assert!(repo.find_by_id(&2).await.unwrap().is_none());

    let mut li = repo.find_by_id(&3).await.unwrap().unwrap();
    li.element = "metal".into();
    assert!(repo.update(&li).await);
    assert_eq!(repo.count(Some(&metal)).await.unwrap(), 2);

    let page = repo.find_paged(1, 1, Some(&metal)).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 2);
    assert!(page.has_next);
    assert_eq!(page.items[0].name, "Qian");
}

#[tokio::test]
async fn test_settings_are_keyed_by_name() {
    let dir = TempDir::new().unwrap();
    let (store, cache) = open(&dir).await;
    let repo: Repository<Setting> = Repository::new(store, cache);

    assert!(repo.save(&Setting::new("theme", "dark")).await);
    assert!(repo.save(&Setting::new("theme", "light")).await);

    let theme = repo.find_by_id(&"theme".to_string()).await.unwrap().unwrap();
    assert_eq!(theme.value, "light");
    assert_eq!(repo.count(None).await.unwrap(), 1);
    assert!(repo.delete(&"theme".to_string()).await);
    assert!(!repo.delete(&"theme".to_string()).await);
}
