use futures::future::join_all;
use provider_registrar::config::DEFAULT_RECORD_NAME;
use provider_registrar::mock::MockStorage;
use provider_registrar::{
    registrar, GenericRegistrar, InMemoryStorage, Operation, OperationError, Registrar,
    RegistrarConfig, RegistrarError, Registry, State, StoreError,
};
use std::sync::Arc;
use std::time::Duration;

async fn persisted(storage: &InMemoryStorage, name: &str) -> (u64, Registry) {
    let variable = State::new(Arc::new(storage.clone()))
        .fetch::<Registry>(name)
        .await
        .expect("Failed to fetch registry");
    (variable.version(), variable.into_inner())
}

fn ids(registry: &Registry) -> Vec<&str> {
    registry.ids().map(|id| id.as_str()).collect()
}

/// Lets every runnable task on the test runtime run until it blocks.
///
/// Only meaningful under a paused clock: the sleep completes once the runtime
/// has nothing left to do.
async fn let_actor_run() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_admit_twice_is_rejected() {
    let storage = InMemoryStorage::new();
    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));
    registrar.recover().await.expect("Failed to recover");

    let first = registrar.apply(Operation::admit("rp-1")).await;
    assert_eq!(first, Ok(true));

    let second = registrar.apply(Operation::admit("rp-1")).await;
    let err = second.expect_err("Duplicate admit should fail");
    assert_eq!(
        err,
        RegistrarError::Rejected(OperationError::AlreadyAdmitted("rp-1".into()))
    );
    assert!(err.to_string().contains("already admitted"));

    registrar.shutdown().await.expect("Failed to shutdown");

    let (_, registry) = persisted(&storage, DEFAULT_RECORD_NAME).await;
    assert_eq!(ids(&registry), vec!["rp-1"]);
}

#[tokio::test]
async fn test_remove_unknown_is_rejected() {
    let storage = InMemoryStorage::new();
    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));
    registrar.recover().await.unwrap();

    let result = registrar.apply(Operation::remove("ghost")).await;
    assert_eq!(
        result,
        Err(RegistrarError::Rejected(
            OperationError::UnknownResourceProvider("ghost".into())
        ))
    );
    assert!(result.unwrap_err().to_string().contains("unknown resource provider"));

    registrar.shutdown().await.unwrap();

    let (_, registry) = persisted(&storage, DEFAULT_RECORD_NAME).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_recovery_round_trip() {
    let storage = InMemoryStorage::new();

    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));
    registrar.recover().await.unwrap();
    assert_eq!(registrar.apply(Operation::admit("rp-1")).await, Ok(true));
    registrar.shutdown().await.unwrap();

    // A fresh registrar over the same storage sees exactly what was committed.
    let restarted = GenericRegistrar::new(Arc::new(storage.clone()));
    restarted.recover().await.unwrap();

    let (version, registry) = persisted(&storage, DEFAULT_RECORD_NAME).await;
    assert_eq!(version, 1);
    assert_eq!(ids(&registry), vec!["rp-1"]);

    assert!(matches!(
        restarted.apply(Operation::admit("rp-1")).await,
        Err(RegistrarError::Rejected(OperationError::AlreadyAdmitted(_)))
    ));
    assert_eq!(restarted.apply(Operation::remove("rp-1")).await, Ok(true));
    restarted.shutdown().await.unwrap();

    let (_, registry) = persisted(&storage, DEFAULT_RECORD_NAME).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_apply_before_recover_is_usage_error() {
    let storage = InMemoryStorage::new();
    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));

    let result = registrar.apply(Operation::admit("rp-1")).await;
    assert_eq!(result, Err(RegistrarError::NotRecovered));
    assert_eq!(storage.writes(), 0);

    // Recovering afterwards makes the registrar usable.
    registrar.recover().await.unwrap();
    assert_eq!(registrar.apply(Operation::admit("rp-1")).await, Ok(true));
    registrar.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_recovery_is_cached() {
    let mock = MockStorage::new();
    mock.fail_next_get(StoreError::Backend("unreachable".into()));

    let registrar = GenericRegistrar::new(Arc::new(mock.clone()));
    let first = registrar.recover().await;
    let expected = Err(RegistrarError::Recovery(StoreError::Backend(
        "unreachable".into(),
    )));
    assert_eq!(first, expected);

    // The store would answer now, but recovery is not retried.
    assert_eq!(registrar.recover().await, expected);
    assert_eq!(
        registrar.apply(Operation::admit("rp-1")).await,
        Err(RegistrarError::Recovery(StoreError::Backend(
            "unreachable".into()
        )))
    );
    assert_eq!(mock.set_attempts(), 0);
    mock.verify();
}

#[tokio::test]
async fn test_concurrent_recovers_share_one_outcome() {
    let storage = InMemoryStorage::new();
    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));

    let (a, b, c) = tokio::join!(registrar.recover(), registrar.recover(), registrar.recover());
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(c, Ok(()));

    assert_eq!(registrar.apply(Operation::admit("rp-1")).await, Ok(true));
    registrar.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_operations_behind_inflight_write_share_one_commit() {
    let mock = MockStorage::new();
    let gate = mock.expect_set().hold();

    let registrar = Arc::new(GenericRegistrar::new(Arc::new(mock.clone())));
    registrar.recover().await.unwrap();

    // The first admit starts a write that stays open.
    let first = tokio::spawn({
        let registrar = registrar.clone();
        async move { registrar.apply(Operation::admit("first")).await }
    });
    let_actor_run().await;
    assert_eq!(mock.set_attempts(), 1);

    let ids_in: Vec<String> = (0..5).map(|i| format!("rp-{i}")).collect();
    let queued = ids_in
        .iter()
        .map(|id| registrar.apply(Operation::admit(id.as_str())))
        .collect::<Vec<_>>();

    let (results, _) = tokio::join!(join_all(queued), async {
        let_actor_run().await;
        gate.release();
    });

    assert_eq!(first.await.unwrap(), Ok(true));
    for result in results {
        assert_eq!(result, Ok(true));
    }

    // One write for "first", one for the whole queued burst.
    assert_eq!(mock.set_attempts(), 2);
    assert_eq!(mock.storage().writes(), 2);

    let (version, registry) = persisted(mock.storage(), DEFAULT_RECORD_NAME).await;
    assert_eq!(version, 2);
    assert_eq!(
        ids(&registry),
        vec!["first", "rp-0", "rp-1", "rp-2", "rp-3", "rp-4"]
    );
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_rejection_does_not_affect_siblings_in_batch() {
    let mock = MockStorage::new();
    let gate = mock.expect_set().hold();

    let registrar = Arc::new(GenericRegistrar::new(Arc::new(mock.clone())));
    registrar.recover().await.unwrap();

    let first = tokio::spawn({
        let registrar = registrar.clone();
        async move { registrar.apply(Operation::admit("a")).await }
    });
    let_actor_run().await;

    let batch = vec![
        registrar.apply(Operation::admit("a")),
        registrar.apply(Operation::admit("b")),
        registrar.apply(Operation::remove("ghost")),
        registrar.apply(Operation::remove("a")),
    ];
    let (results, _) = tokio::join!(join_all(batch), async {
        let_actor_run().await;
        gate.release();
    });

    assert_eq!(first.await.unwrap(), Ok(true));
    assert_eq!(
        results,
        vec![
            Err(RegistrarError::Rejected(OperationError::AlreadyAdmitted(
                "a".into()
            ))),
            Ok(true),
            Err(RegistrarError::Rejected(
                OperationError::UnknownResourceProvider("ghost".into())
            )),
            Ok(true),
        ]
    );

    assert_eq!(mock.storage().writes(), 2);
    let (_, registry) = persisted(mock.storage(), DEFAULT_RECORD_NAME).await;
    assert_eq!(ids(&registry), vec!["b"]);
}

#[tokio::test]
async fn test_failed_write_aborts_registrar_for_good() {
    let mock = MockStorage::new();
    mock.expect_set().fail("disk on fire");

    let registrar = GenericRegistrar::new(Arc::new(mock.clone()));
    registrar.recover().await.unwrap();

    let aborted = RegistrarError::Aborted("Failed to update registry: disk on fire".into());
    assert_eq!(
        registrar.apply(Operation::admit("rp-1")).await,
        Err(aborted.clone())
    );

    // Well-formed and distinct, but never applied or written.
    assert_eq!(
        registrar.apply(Operation::admit("rp-2")).await,
        Err(aborted.clone())
    );
    assert_eq!(
        registrar.apply(Operation::remove("rp-1")).await,
        Err(aborted)
    );

    assert_eq!(mock.set_attempts(), 1);
    assert_eq!(mock.storage().writes(), 0);
    registrar.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_discarded_write_aborts_registrar() {
    let mock = MockStorage::new();
    mock.expect_set().discard();

    let registrar = GenericRegistrar::new(Arc::new(mock.clone()));
    registrar.recover().await.unwrap();

    let expected = Err(RegistrarError::Aborted(
        "Failed to update registry: discarded".into(),
    ));
    assert_eq!(registrar.apply(Operation::admit("rp-1")).await, expected);
    assert_eq!(registrar.apply(Operation::admit("rp-2")).await, expected);
    assert_eq!(mock.set_attempts(), 1);
}

#[tokio::test]
async fn test_panicked_write_aborts_registrar() {
    let mock = MockStorage::new();
    mock.expect_set().panic();

    let registrar = GenericRegistrar::new(Arc::new(mock.clone()));
    registrar.recover().await.unwrap();

    let expected = Err(RegistrarError::Aborted(
        "Failed to update registry: discarded".into(),
    ));
    assert_eq!(registrar.apply(Operation::admit("a")).await, expected);
    assert_eq!(registrar.apply(Operation::admit("b")).await, expected);
    assert_eq!(registrar.apply(Operation::remove("a")).await, expected);

    assert_eq!(mock.set_attempts(), 1);
    assert_eq!(mock.storage().writes(), 0);
    mock.verify();
    registrar.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_panicked_fetch_fails_recovery() {
    let mock = MockStorage::new();
    mock.panic_next_get();

    let registrar = GenericRegistrar::new(Arc::new(mock.clone()));
    let expected = Err(RegistrarError::Recovery(StoreError::Discarded));
    assert_eq!(registrar.recover().await, expected);
    assert_eq!(registrar.recover().await, expected);
    assert_eq!(
        registrar.apply(Operation::admit("a")).await,
        Err(RegistrarError::Recovery(StoreError::Discarded))
    );

    assert_eq!(mock.set_attempts(), 0);
    mock.verify();
    registrar.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_foreign_writer_causes_version_mismatch() {
    let storage = InMemoryStorage::new();
    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));
    registrar.recover().await.unwrap();

    // Someone else writes the record after we recovered it.
    storage.force_set(DEFAULT_RECORD_NAME, br#"{"resource_providers":[]}"#.to_vec());

    let expected = Err(RegistrarError::Aborted(
        "Failed to update registry: version mismatch".into(),
    ));
    assert_eq!(registrar.apply(Operation::admit("rp-1")).await, expected);
    assert_eq!(registrar.apply(Operation::admit("rp-2")).await, expected);
    assert_eq!(storage.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queued_operations_fail_with_aborted_batch() {
    let mock = MockStorage::new();
    let gate = mock.expect_set().hold();

    let registrar = Arc::new(GenericRegistrar::new(Arc::new(mock.clone())));
    registrar.recover().await.unwrap();

    let first = tokio::spawn({
        let registrar = registrar.clone();
        async move { registrar.apply(Operation::admit("first")).await }
    });
    let_actor_run().await;

    // The held write will lose its compare-and-swap once released.
    mock.storage().force_set(DEFAULT_RECORD_NAME, b"{}".to_vec());

    let queued = vec![
        registrar.apply(Operation::admit("second")),
        registrar.apply(Operation::admit("third")),
    ];
    let (results, _) = tokio::join!(join_all(queued), async {
        let_actor_run().await;
        gate.release();
    });

    let expected = Err(RegistrarError::Aborted(
        "Failed to update registry: version mismatch".into(),
    ));
    assert_eq!(first.await.unwrap(), expected);
    assert_eq!(results, vec![expected.clone(), expected.clone()]);
    assert_eq!(registrar.apply(Operation::admit("fourth")).await, expected);
    assert_eq!(mock.set_attempts(), 1);
}

#[tokio::test]
async fn test_custom_record_name() {
    let storage = InMemoryStorage::new();
    let config = RegistrarConfig {
        record_name: "rp-registry-test".to_string(),
        mailbox_capacity: 2,
    };
    let registrar = GenericRegistrar::with_config(Arc::new(storage.clone()), config);
    registrar.recover().await.unwrap();

    let results = join_all((0..6).map(|i| registrar.apply(Operation::admit(format!("rp-{i}"))))).await;
    assert!(results.iter().all(|r| r == &Ok(true)));
    registrar.shutdown().await.unwrap();

    let (_, registry) = persisted(&storage, "rp-registry-test").await;
    assert_eq!(registry.len(), 6);
    let (version, default) = persisted(&storage, DEFAULT_RECORD_NAME).await;
    assert_eq!(version, 0);
    assert!(default.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_factory_registrar_shuts_down_after_held_write() {
    let mock = MockStorage::new();
    let gate = mock.expect_set().hold();

    let registrar = registrar::with_storage(Arc::new(mock.clone()));
    registrar.recover().await.unwrap();

    let (result, _) = tokio::join!(registrar.apply(Operation::admit("rp-1")), async {
        let_actor_run().await;
        assert_eq!(mock.storage().writes(), 0);
        gate.release();
    });
    assert_eq!(result, Ok(true));

    registrar.shutdown().await.expect("Failed to shutdown");

    assert_eq!(mock.storage().writes(), 1);
    let (version, registry) = persisted(mock.storage(), DEFAULT_RECORD_NAME).await;
    assert_eq!(version, 1);
    assert_eq!(ids(&registry), vec!["rp-1"]);
    mock.verify();
}
