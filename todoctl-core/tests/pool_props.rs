use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use todoctl_core::pool::{PoolState, WorkerPool};

#[derive(Debug, Clone)]
enum Op {
    Submit(usize),
    Resize(usize),
}

// Total submitted items stay below the queue bound, so submits never
// block while the pool is resized to zero.
fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (1usize..10).prop_map(Op::Submit),
            (0usize..6).prop_map(Op::Resize),
        ],
        0..10,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: every submitted item runs exactly once across interleaved resizes
    #[test]
    fn prop_items_run_exactly_once(initial in 0usize..4, ops in arb_ops(), last in 1usize..5) {
        let runs = runtime().block_on(async move {
            let pool = WorkerPool::new(initial);
            let mut counters: Vec<Arc<AtomicUsize>> = Vec::new();

            for op in ops {
                match op {
                    Op::Submit(n) => {
                        for _ in 0..n {
                            let counter = Arc::new(AtomicUsize::new(0));
                            counters.push(Arc::clone(&counter));
                            let _handle = pool
                                .submit(move || async move {
                                    tokio::task::yield_now().await;
                                    counter.fetch_add(1, Ordering::SeqCst);
                                })
                                .await
                                .unwrap();
                        }
                    }
                    Op::Resize(n) => pool.resize(n).await.unwrap(),
                }
            }

            pool.resize(last).await.unwrap();
            pool.wait().await;

            assert_eq!(pool.outstanding(), 0);
            assert_eq!(pool.worker_count(), last);
            assert_eq!(pool.live_workers(), last);

            pool.close().await;
            counters
                .iter()
                .map(|c| c.load(Ordering::SeqCst))
                .collect::<Vec<_>>()
        });

        // Invariant: no item lost, none run twice
        prop_assert!(runs.iter().all(|&n| n == 1), "runs: {:?}", runs);
    }

    /// Property: close runs the whole backlog, whatever the worker count
    #[test]
    fn prop_close_drains_backlog(workers in 0usize..4, items in 0usize..50) {
        let done = runtime().block_on(async move {
            let pool = WorkerPool::new(workers);
            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..items {
                let counter = Arc::clone(&counter);
                let _handle = pool
                    .submit(move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }
            pool.close().await;
            assert_eq!(pool.state(), PoolState::Closed);
            assert_eq!(pool.live_workers(), 0);
            counter.load(Ordering::SeqCst)
        });

        prop_assert_eq!(done, items);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resizes_serialize() {
    let pool = WorkerPool::new(2);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..40 {
        let counter = Arc::clone(&counter);
        let _handle = pool
            .submit(move || async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
    }

    let a = pool.clone();
    let b = pool.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.resize(5).await }),
        tokio::spawn(async move { b.resize(1).await }),
    );
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();

    pool.wait().await;
    let final_count = pool.worker_count();
    assert!(final_count == 5 || final_count == 1);
    assert_eq!(pool.live_workers(), final_count);
    assert_eq!(counter.load(Ordering::SeqCst), 40);
    assert_eq!(pool.state(), PoolState::Running);

    pool.close().await;
}

#[tokio::test]
async fn fifty_items_on_two_workers() {
    let pool = WorkerPool::new(2);
    let mut handles = Vec::new();
    for i in 0..50u32 {
        handles.push(pool.submit(move || async move { i * 2 }).await.unwrap());
    }
    pool.wait().await;

    let mut outputs = Vec::new();
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }
    assert_eq!(outputs, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    pool.close().await;
}
