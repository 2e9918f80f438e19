//! Integration tests for the aggregate store on a file-backed database
//!
//! - Concurrent writers on one key never lose an update
//! - Detail deletion rebuilds the owning summary
//! - Listing filters, sorts and pagination

#[cfg(test)]
mod aggregate_store_tests {
    use arena_stats::aggregate_core::LoadoutEntry;
    use arena_stats::query::{DetailListFilter, ListFilter, PageRequest, Sort, SortDirection, SortKey};
    use arena_stats::retry::{retry_transient, ExponentialBackoff};
    use arena_stats::{AggregateStore, DetailDelta, SqliteAggregateStore, SummaryDelta};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");

    fn open_store(dir: &TempDir) -> SqliteAggregateStore {
        let store = SqliteAggregateStore::open_path(db_path(dir), Duration::from_secs(10)).unwrap();
        store.migrate(SCHEMA_DIR).unwrap();
        store
    }

    fn db_path(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("arena.db")
    }

    fn delta(
        scope: &str,
        atk: &[i64],
        def: &[i64],
        wins: i64,
        losses: i64,
        timestamp: i64,
    ) -> SummaryDelta {
        SummaryDelta {
            scope: scope.to_string(),
            season: 9,
            tag: String::new(),
            attacker: atk.to_vec(),
            defender: def.to_vec(),
            wins_delta: wins,
            losses_delta: losses,
            timestamp,
        }
    }

    fn detail(star: i32, wins: i64, losses: i64, timestamp: i64) -> DetailDelta {
        DetailDelta {
            base: delta("global", &[10001, 10002], &[10003], wins, losses, timestamp),
            attacker_loadout: vec![LoadoutEntry {
                id: 10001,
                star,
                weapon_star: 0,
            }],
            defender_loadout: vec![],
        }
    }

    fn detail_filter() -> DetailListFilter {
        DetailListFilter {
            attacker_signature: "10001,10002".to_string(),
            defender_signature: "10003".to_string(),
            filter: ListFilter::default(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_shared_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir));
        let n = 32;

        let mut handles = Vec::new();
        for i in 0..n {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .apply_summary_deltas(&[delta("global", &[1, 2], &[3], 1, 0, 1_000 + i)])
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }

        let page = store
            .list_summaries(&ListFilter::default(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].total_battles, n);
        assert_eq!(page.rows[0].total_wins, n);
        assert_eq!(page.rows[0].last_seen, 1_000 + n - 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_separate_connections() {
        let dir = TempDir::new().unwrap();
        let reader = open_store(&dir);
        let n = 16;

        let mut handles = Vec::new();
        for _ in 0..n {
            let path = db_path(&dir);
            handles.push(tokio::spawn(async move {
                let store = SqliteAggregateStore::open_path(path, Duration::from_secs(10))?;
                let deltas = [delta("global", &[1, 2], &[3], 1, 0, 1_000)];
                let mut backoff = ExponentialBackoff::new(10, 200, 10);
                retry_transient(&mut backoff, || store.apply_summary_deltas(&deltas)).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }

        let page = reader
            .list_summaries(&ListFilter::default(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(page.rows[0].total_battles, n);
    }

    #[tokio::test]
    async fn test_delete_details_recalculates_summary() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .apply_detail_deltas(&[detail(3, 5, 3, 100), detail(5, 2, 0, 200)])
            .await
            .unwrap();
        // Summary deliberately out of step with its details
        store
            .apply_summary_deltas(&[delta("global", &[10001, 10002], &[10003], 99, 99, 50)])
            .await
            .unwrap();

        let details = store
            .list_details(&detail_filter(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(details.total_count, 2);
        let star5 = details
            .rows
            .iter()
            .find(|row| row.attacker_loadout[0].star == 5)
            .unwrap()
            .key
            .clone();

        let deleted = store.delete_details_and_recalc(&[star5.clone()]).await.unwrap();
        assert_eq!(deleted, 1);

        let summaries = store
            .list_summaries(&ListFilter::default(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(summaries.total_count, 1);
        let summary = &summaries.rows[0];
        assert_eq!(summary.total_battles, 8);
        assert_eq!(summary.total_wins, 5);
        assert_eq!(summary.last_seen, 100);
        assert_eq!(summary.attacker_roster, vec![10001, 10002]);

        // Deleting an already-missing key still recalculates, nothing else changes
        assert_eq!(store.delete_details_and_recalc(&[star5]).await.unwrap(), 0);

        let remaining = store
            .list_details(&detail_filter(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        let last = remaining.rows[0].key.clone();
        store.delete_details_and_recalc(&[last]).await.unwrap();

        let summaries = store
            .list_summaries(&ListFilter::default(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(summaries.total_count, 0);
    }

    async fn seeded_store(dir: &TempDir) -> SqliteAggregateStore {
        let store = open_store(dir);
        store
            .apply_summary_deltas(&[
                // 10 battles, 9 wins
                delta("global", &[10001, 20001], &[10005], 9, 1, 300),
                // 3 battles, 3 wins
                delta("global", &[10002, 10001], &[10006], 3, 0, 500),
                // 40 battles, 20 wins
                delta("global", &[10003], &[10001, 10005], 20, 20, 100),
                delta("jp", &[10001, 20001], &[10005], 1, 1, 900),
            ])
            .await
            .unwrap();
        store
    }

    fn battles_of(rows: &[arena_stats::SummaryRow]) -> Vec<i64> {
        rows.iter().map(|r| r.total_battles).collect()
    }

    #[tokio::test]
    async fn test_listing_scope_and_sorts() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let all = store
            .list_summaries(&ListFilter::default(), PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(all.total_count, 4);
        assert_eq!(battles_of(&all.rows), vec![40, 10, 3, 2]);

        let global = ListFilter {
            scope: ListFilter::scope_from_param("global"),
            ..ListFilter::default()
        };
        let newest = store
            .list_summaries(&global, PageRequest::default(), Sort::parse("newest"))
            .await
            .unwrap();
        assert_eq!(newest.total_count, 3);
        assert_eq!(newest.rows[0].last_seen, 500);

        let by_confidence = store
            .list_summaries(&global, PageRequest::default(), Sort::parse("composite"))
            .await
            .unwrap();
        // 9/10 outranks a perfect 3/3 once sample size is accounted for
        assert_eq!(battles_of(&by_confidence.rows), vec![10, 3, 40]);

        let by_mean_asc = store
            .list_summaries(
                &global,
                PageRequest::default(),
                Sort::new(SortKey::MeanEstimate, SortDirection::Asc),
            )
            .await
            .unwrap();
        assert_eq!(battles_of(&by_mean_asc.rows), vec![40, 3, 10]);
    }

    #[tokio::test]
    async fn test_listing_roster_filters() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let contains = ListFilter {
            attacker_contains: vec![10001],
            ..ListFilter::default()
        };
        let page = store
            .list_summaries(&contains, PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(battles_of(&page.rows), vec![10, 3, 2]);

        let mut slots = BTreeMap::new();
        slots.insert(0, 10002);
        let slotted = ListFilter {
            attacker_slots: slots,
            ..ListFilter::default()
        };
        let page = store
            .list_summaries(&slotted, PageRequest::default(), Sort::default())
            .await
            .unwrap();
        // [10002, 10001] canonicalizes with 10002 still first
        assert_eq!(battles_of(&page.rows), vec![3]);

        let defended = ListFilter {
            defender_contains: vec![10001, 10005],
            ..ListFilter::default()
        };
        let page = store
            .list_summaries(&defended, PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(battles_of(&page.rows), vec![40]);
    }

    #[tokio::test]
    async fn test_listing_thresholds_and_pagination() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let thresholds = ListFilter {
            min_battles: Some(3),
            min_win_rate: Some(0.6),
            ..ListFilter::default()
        };
        let page = store
            .list_summaries(&thresholds, PageRequest::default(), Sort::default())
            .await
            .unwrap();
        assert_eq!(battles_of(&page.rows), vec![10, 3]);

        let second = store
            .list_summaries(&ListFilter::default(), PageRequest::new(2, 3), Sort::default())
            .await
            .unwrap();
        assert_eq!(second.total_count, 4);
        assert_eq!(second.total_pages(), 2);
        assert_eq!(battles_of(&second.rows), vec![2]);

        let past_end = store
            .list_summaries(&ListFilter::default(), PageRequest::new(5, 3), Sort::default())
            .await
            .unwrap();
        assert!(past_end.rows.is_empty());
        assert_eq!(past_end.total_count, 4);
    }
}
