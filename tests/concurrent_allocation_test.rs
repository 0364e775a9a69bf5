// ==========================================
// 并发分配测试
// ==========================================
// 职责: 验证名额不超发、单小组单记录、FCFS 顺序与提交顺序一致、并发释放
// ==========================================


#[cfg(test)]
mod concurrent_allocation_test {
    use chrono::{DateTime, Utc};
    use group_allocation::domain::{AllocationReceipt, NewSelection, QueueFilter, ResourceKind};
    use group_allocation::engine::{
        AllocationEngine, AllocationError, AllocationErrorKind, QueueReporter,
    };
    use group_allocation::repository::{LedgerRepository, SelectionRepository};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::test_helpers::*;

    /// 所有线程在屏障处同时出发
    fn run_concurrently<T, F>(count: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        let barrier = Arc::new(Barrier::new(count));
        let f = Arc::new(f);
        let handles: Vec<_> = (0..count)
            .map(|i| {
                let barrier = barrier.clone();
                let f = f.clone();
                thread::spawn(move || {
                    barrier.wait();
                    f(i)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    // ==========================================
    // 测试1: 50 个并发请求争抢 max=3 的导师
    // ==========================================

    #[test]
    fn test_fifty_concurrent_requests_against_faculty_max_three() {
        group_allocation::logging::init_test();
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        insert_domain(&conn, "D1", "Machine Learning");
        insert_faculty(&conn, "F1", "Dr. Rao", 3);
        insert_topic(&conn, "T1", "D1", "Graph Learning", 100);
        let groups = Arc::new(insert_groups(&conn, "G", 50));

        let engine = Arc::new(build_engine(shared_connection(&db_path), 10_000));

        let results = {
            let engine = engine.clone();
            let groups = groups.clone();
            run_concurrently(50, move |i| {
                engine.allocate(&request(&groups[i], "F1", "D1", "T1"))
            })
        };

        let mut accepted: Vec<AllocationReceipt> = Vec::new();
        for result in results {
            match result {
                Ok(receipt) => accepted.push(receipt),
                Err(AllocationError::FacultyFull { current, max, .. }) => {
                    assert_eq!((current, max), (3, 3));
                }
                Err(other) => panic!("意外错误: {:?}", other),
            }
        }

        assert_eq!(accepted.len(), 3, "恰好 3 个请求成功");
        assert_eq!(faculty_used(&conn, "F1"), 3);
        assert_eq!(topic_used(&conn, "T1"), 3);
        assert!(!faculty_available(&conn, "F1"));
        assert_ledgers_consistent(&conn);

        // 排位与提交顺序一致
        accepted.sort_by_key(|r| r.selection.submitted_at);
        let positions: Vec<i64> = accepted.iter().map(|r| r.queue_position).collect();
        assert_eq!(positions, vec![1, 2, 3]);

        let reporter = QueueReporter::new(shared_connection(&db_path));
        let ranked = reporter.rank(&QueueFilter::all()).unwrap();
        let ranked_groups: Vec<&str> = ranked.iter().map(|r| r.selection.group_id.as_str()).collect();
        let commit_groups: Vec<&str> = accepted.iter().map(|r| r.selection.group_id.as_str()).collect();
        assert_eq!(ranked_groups, commit_groups);

        println!("✅ 50 并发 / max=3: 成功 {:?}", commit_groups);
    }

    // ==========================================
    // 测试2: 最后一个名额，两个课题同时争抢
    // ==========================================

    #[test]
    fn test_last_slot_race_on_shared_faculty() {
        for _ in 0..10 {
            let (_temp_file, db_path) = create_test_db().unwrap();
            let conn = open_test_connection(&db_path).unwrap();
            insert_domain(&conn, "D1", "Machine Learning");
            insert_faculty(&conn, "F1", "Dr. Rao", 2);
            insert_topic(&conn, "T1", "D1", "Graph Learning", 3);
            insert_topic(&conn, "T2", "D1", "Federated Learning", 3);
            insert_groups(&conn, "G", 3);

            let engine = Arc::new(build_engine(shared_connection(&db_path), 5_000));
            engine.allocate(&request("G01", "F1", "D1", "T1")).unwrap();

            let results = {
                let engine = engine.clone();
                run_concurrently(2, move |i| {
                    let (group_id, topic_id) = if i == 0 { ("G02", "T1") } else { ("G03", "T2") };
                    engine.allocate(&request(group_id, "F1", "D1", topic_id))
                })
            };

            let ok = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(ok, 1, "最后一个名额只能给一个小组");
            let loser = results.into_iter().find_map(|r| r.err()).unwrap();
            match loser {
                AllocationError::FacultyFull { current, max, .. } => assert_eq!((current, max), (2, 2)),
                other => panic!("期望 FacultyFull，实际: {:?}", other),
            }

            assert_eq!(faculty_used(&conn, "F1"), 2);
            assert_eq!(topic_used(&conn, "T1") + topic_used(&conn, "T2"), 2);
            assert_ledgers_consistent(&conn);
        }
    }

    // ==========================================
    // 测试3: 同一小组并发提交到不同导师/课题
    // ==========================================

    #[test]
    fn test_same_group_concurrent_submissions_yield_single_selection() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        seed_standard_catalog(&conn, 5, 5);
        insert_group(&conn, "G1");

        let engine = Arc::new(build_engine(shared_connection(&db_path), 5_000));
        let combos = [("F1", "D1", "T1"), ("F2", "D1", "T2"), ("F1", "D2", "T3"), ("F2", "D1", "T1")];

        let results = {
            let engine = engine.clone();
            run_concurrently(combos.len(), move |i| {
                let (f, d, t) = combos[i];
                engine.allocate(&request("G1", f, d, t))
            })
        };

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        for err in results.into_iter().filter_map(|r| r.err()) {
            // Conflict 对调用方等同于 AlreadyAssigned
            assert!(err.is_already_assigned(), "实际: {:?}", err);
        }

        assert_eq!(selection_count(&conn), 1);
        assert_eq!(faculty_used(&conn, "F1") + faculty_used(&conn, "F2"), 1);
        assert_ledgers_consistent(&conn);
    }

    // ==========================================
    // 测试4: 两个引擎实例（独立连接、独立行锁表）共享同一数据库
    // ==========================================

    #[test]
    fn test_two_engine_instances_never_oversubscribe() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        insert_domain(&conn, "D1", "Machine Learning");
        insert_faculty(&conn, "F1", "Dr. Rao", 3);
        insert_topic(&conn, "T1", "D1", "Graph Learning", 50);
        let groups = Arc::new(insert_groups(&conn, "G", 20));

        let engines: Arc<Vec<AllocationEngine>> = Arc::new(vec![
            build_engine(shared_connection(&db_path), 10_000),
            build_engine(shared_connection(&db_path), 10_000),
        ]);

        let results = {
            let engines = engines.clone();
            let groups = groups.clone();
            run_concurrently(20, move |i| {
                engines[i % 2].allocate(&request(&groups[i], "F1", "D1", "T1"))
            })
        };

        let ok = results.iter().filter(|r| r.is_ok()).count();
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err.kind(), AllocationErrorKind::FacultyFull | AllocationErrorKind::Busy),
                "实际: {:?}",
                err
            );
        }
        assert_eq!(ok, 3);
        assert_eq!(faculty_used(&conn, "F1"), 3);
        assert_eq!(selection_count(&conn), 3);
        assert_ledgers_consistent(&conn);
    }

    // ==========================================
    // 测试5: 行锁等待超时返回 Busy，且不修改状态
    // ==========================================

    #[test]
    fn test_row_lock_timeout_returns_busy_without_mutation() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        seed_standard_catalog(&conn, 3, 3);
        insert_group(&conn, "G1");

        let engine = build_engine(shared_connection(&db_path), 50);
        let slot = engine.locks().slot(ResourceKind::Faculty, "F1");

        {
            let _held = slot.lock();
            let err = engine.allocate(&request("G1", "F1", "D1", "T1")).unwrap_err();
            match &err {
                AllocationError::Busy { resource, waited_ms } => {
                    assert_eq!(resource, "FACULTY:F1");
                    assert!(*waited_ms >= 50, "waited_ms={}", waited_ms);
                }
                other => panic!("期望 Busy，实际: {:?}", other),
            }
            assert!(err.is_retryable());
            assert_eq!(selection_count(&conn), 0);
            assert_eq!(faculty_used(&conn, "F1"), 0);
        }

        // 锁释放后重试成功
        let receipt = engine.allocate(&request("G1", "F1", "D1", "T1")).unwrap();
        assert_eq!(receipt.queue_position, 1);
    }

    #[test]
    fn test_engines_sharing_lock_table_contend_on_same_slot() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        seed_standard_catalog(&conn, 3, 3);
        insert_group(&conn, "G1");

        let first = build_engine(shared_connection(&db_path), 50);
        let second = build_engine(shared_connection(&db_path), 50).with_lock_table(first.locks().clone());
        assert!(Arc::ptr_eq(first.locks(), second.locks()));

        let slot = first.locks().slot(ResourceKind::Topic, "T1");
        let held = slot.lock();
        let err = second.allocate(&request("G1", "F1", "D1", "T1")).unwrap_err();
        assert_eq!(err.kind(), AllocationErrorKind::Busy);
        drop(held);

        second.allocate(&request("G1", "F1", "D1", "T1")).unwrap();
        assert_eq!(topic_used(&conn, "T1"), 1);
    }

    #[test]
    fn test_waiter_proceeds_once_lock_released_within_timeout() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        seed_standard_catalog(&conn, 3, 3);
        insert_group(&conn, "G1");

        let engine = Arc::new(build_engine(shared_connection(&db_path), 2_000));
        let slot = engine.locks().slot(ResourceKind::Topic, "T1");
        let held = slot.lock();

        let waiter = {
            let engine = engine.clone();
            thread::spawn(move || engine.allocate(&request("G1", "F1", "D1", "T1")))
        };

        thread::sleep(Duration::from_millis(100));
        drop(held);

        let receipt = waiter.join().unwrap().unwrap();
        assert_eq!(receipt.selection.topic_id, "T1");
        assert_eq!(topic_used(&conn, "T1"), 1);
    }

    #[test]
    fn test_busy_reports_elapsed_wait_across_both_locks() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        seed_standard_catalog(&conn, 3, 3);
        insert_group(&conn, "G1");

        let engine = build_engine(shared_connection(&db_path), 80);
        let slot = engine.locks().slot(ResourceKind::Topic, "T1");
        let _held = slot.lock();

        let call_started = Instant::now();
        let err = engine.allocate(&request("G1", "F1", "D1", "T1")).unwrap_err();
        let call_ms = call_started.elapsed().as_millis() as u64;

        // 导师锁立即获得，课题锁等到共享截止时间
        match err {
            AllocationError::Busy { resource, waited_ms } => {
                assert_eq!(resource, "TOPIC:T1");
                assert!(waited_ms >= 80, "waited_ms={}", waited_ms);
                assert!(waited_ms <= call_ms, "waited_ms={} call_ms={}", waited_ms, call_ms);
            }
            other => panic!("期望 Busy，实际: {:?}", other),
        }
        assert_eq!(faculty_used(&conn, "F1"), 0);
        assert_eq!(selection_count(&conn), 0);
    }

    // ==========================================
    // 测试6: 其他实例写入了时间戳更晚的记录
    // ==========================================

    #[test]
    fn test_commit_ranks_after_peer_row_with_later_timestamp() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let conn = open_test_connection(&db_path).unwrap();
        seed_standard_catalog(&conn, 3, 3);
        insert_groups(&conn, "G", 2);

        // 引擎先启动，时钟无从得知之后由其他实例写入的记录
        let engine = build_engine(shared_connection(&db_path), 5_000);

        // 时钟快 60 秒的实例先提交 G01
        let peer_us = Utc::now().timestamp_micros() + 60_000_000;
        SelectionRepository::insert(
            &conn,
            &NewSelection {
                selection_id: "S-peer".to_string(),
                group_id: "G01".to_string(),
                faculty_id: "F1".to_string(),
                domain_id: "D1".to_string(),
                topic_id: "T1".to_string(),
                submitted_at: DateTime::<Utc>::from_timestamp_micros(peer_us).unwrap(),
            },
        )
        .unwrap();
        assert!(LedgerRepository::try_reserve(&conn, ResourceKind::Faculty, "F1").unwrap());
        assert!(LedgerRepository::try_reserve(&conn, ResourceKind::Topic, "T1").unwrap());
        assert_ledgers_consistent(&conn);

        let receipt = engine.allocate(&request("G02", "F1", "D1", "T1")).unwrap();
        assert_eq!(receipt.queue_position, 2);
        assert!(receipt.selection.submitted_at.timestamp_micros() > peer_us);

        let reporter = QueueReporter::new(shared_connection(&db_path));
        let ranked = reporter.rank(&QueueFilter::all()).unwrap();
        let order: Vec<(i64, &str)> = ranked
            .iter()
            .map(|r| (r.position, r.selection.group_id.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "G01"), (2, "G02")]);
        assert_ledgers_consistent(&conn);
    }

    // ==========================================
    // 测试7: 并发释放
    // ==========================================

    #[test]
    fn test_release_racing_allocate_on_full_faculty() {
        for _ in 0..20 {
            let (_temp_file, db_path) = create_test_db().unwrap();
            let conn = open_test_connection(&db_path).unwrap();
            seed_standard_catalog(&conn, 1, 3);
            insert_groups(&conn, "G", 2);

            let engine = Arc::new(build_engine(shared_connection(&db_path), 5_000));
            engine.allocate(&request("G01", "F1", "D1", "T1")).unwrap();
            assert!(!faculty_available(&conn, "F1"));

            let results = {
                let engine = engine.clone();
                run_concurrently(2, move |i| {
                    if i == 0 {
                        engine.release("G01").map(|r| r.selection.group_id)
                    } else {
                        engine
                            .allocate(&request("G02", "F1", "D1", "T2"))
                            .map(|r| r.selection.group_id)
                    }
                })
            };
            let mut results = results.into_iter();
            let released = results.next().unwrap();
            let allocated = results.next().unwrap();

            assert_eq!(released.unwrap(), "G01", "唯一的释放必须成功");
            match allocated {
                // 释放先提交: 名额被 G02 接手
                Ok(group_id) => {
                    assert_eq!(group_id, "G02");
                    assert_eq!(selection_count(&conn), 1);
                    assert_eq!(faculty_used(&conn, "F1"), 1);
                    assert_eq!(topic_used(&conn, "T2"), 1);
                }
                // 分配先校验: 看到的是满额
                Err(AllocationError::FacultyFull { current, max, .. }) => {
                    assert_eq!((current, max), (1, 1));
                    assert_eq!(selection_count(&conn), 0);
                    assert_eq!(faculty_used(&conn, "F1"), 0);
                }
                Err(other) => panic!("意外错误: {:?}", other),
            }
            assert_eq!(topic_used(&conn, "T1"), 0);
            assert_ledgers_consistent(&conn);
        }
    }

    #[test]
    fn test_double_release_succeeds_once() {
        for _ in 0..20 {
            let (_temp_file, db_path) = create_test_db().unwrap();
            let conn = open_test_connection(&db_path).unwrap();
            seed_standard_catalog(&conn, 1, 1);
            insert_group(&conn, "G1");

            let engine = Arc::new(build_engine(shared_connection(&db_path), 5_000));
            engine.allocate(&request("G1", "F1", "D1", "T1")).unwrap();

            let results = {
                let engine = engine.clone();
                run_concurrently(2, move |_| engine.release("G1"))
            };

            let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(ok.len(), 1, "同一记录只能释放一次");
            assert_eq!((ok[0].faculty_used_after, ok[0].topic_used_after), (0, 0));
            for err in results.iter().filter_map(|r| r.as_ref().err()) {
                assert_eq!(err.kind(), AllocationErrorKind::NotFound, "实际: {:?}", err);
            }

            assert_eq!(selection_count(&conn), 0);
            assert_eq!(faculty_used(&conn, "F1"), 0);
            assert_eq!(topic_used(&conn, "T1"), 0);
            assert!(faculty_available(&conn, "F1"));
            assert_ledgers_consistent(&conn);
        }
    }
}
