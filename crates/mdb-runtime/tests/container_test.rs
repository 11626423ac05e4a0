use mdb_runtime::mock::{
    BeanRecorder, InterceptorLog, MockListener, MockResourceAdapter, MockTransactionManager, Outcome, PropertySpec,
    RecordingInterceptor, TxEvent,
};
use mdb_runtime::{
    BeanDeployment, BeanDeploymentBuilder, Bindings, ContainerConfig, DeploymentId, MdbContainer, MdbError, Method,
    TransactionError, TransactionManager, TransactionStatus, TransactionType,
};
use std::sync::Arc;

struct Harness {
    container: Arc<MdbContainer<MockListener>>,
    adapter: Arc<MockResourceAdapter<MockListener>>,
    tm: Arc<MockTransactionManager>,
}

fn harness(config: ContainerConfig) -> Harness {
    let adapter = Arc::new(MockResourceAdapter::new());
    let tm = Arc::new(MockTransactionManager::new());
    let container = MdbContainer::builder()
        .config(config)
        .resource_adapter(adapter.clone())
        .transaction_manager(tm.clone())
        .activation_spec(PropertySpec::factory(&["maxSessions"]))
        .injection_source(Arc::new(
            Bindings::new().bind("java:comp/env/auditTopic", String::from("audit")),
        ))
        .build()
        .unwrap();
    Harness { container, adapter, tm }
}

fn audit_bean(recorder: &BeanRecorder) -> BeanDeploymentBuilder<MockListener> {
    BeanDeployment::builder("OrderAudit", "org.example.OrderAuditBean", recorder.factory())
}

fn audit_id() -> DeploymentId {
    DeploymentId::from("OrderAudit")
}

// --- Deployment ---

#[tokio::test]
async fn test_interface_mismatch_leaves_registry_untouched() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();

    let err = h
        .container
        .deploy(audit_bean(&recorder).message_listener_interface("jakarta.jms.MessageListener").build())
        .await
        .unwrap_err();

    assert!(matches!(err, MdbError::Deployment { .. }));
    assert!(!h.container.is_deployed(&audit_id()));
    assert!(h.container.deployment_ids().is_empty());
    assert!(h.adapter.activations().is_empty());
    assert_eq!(recorder.created(), 0);
}

#[tokio::test]
async fn test_configured_interface_overrides_listener_default() {
    let h = harness(ContainerConfig {
        message_listener_interface: Some("jakarta.jms.MessageListener".to_string()),
        ..ContainerConfig::default()
    });
    let recorder = BeanRecorder::default();
    assert_eq!(h.container.message_listener_interface(), "jakarta.jms.MessageListener");

    assert!(h.container.deploy(audit_bean(&recorder).build()).await.is_err());
    h.container
        .deploy(audit_bean(&recorder).message_listener_interface("jakarta.jms.MessageListener").build())
        .await
        .unwrap();
    assert!(h.container.is_deployed(&audit_id()));
}

#[tokio::test]
async fn test_activation_failure_rolls_back_deployment() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.adapter.fail_activation(true);

    let err = h.container.deploy(audit_bean(&recorder).build()).await.unwrap_err();
    assert!(matches!(err, MdbError::Deployment { .. }));
    assert!(!h.container.is_deployed(&audit_id()));
    assert!(matches!(
        h.container.is_delivery_active(&audit_id()),
        Err(MdbError::UnknownDeployment(_))
    ));

    h.adapter.fail_activation(false);
    h.container.deploy(audit_bean(&recorder).build()).await.unwrap();
    assert!(h.container.is_delivery_active(&audit_id()).unwrap());
}

#[tokio::test]
async fn test_invalid_activation_spec_is_rejected() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();

    let err = h
        .container
        .deploy(audit_bean(&recorder).activation_property("maxSessions", "0").build())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid activation spec"));
    assert!(h.adapter.activations().is_empty());
}

#[tokio::test]
async fn test_shutdown_undeploys_everything() {
    let h = harness(ContainerConfig::default());
    let audit = BeanRecorder::default();
    let billing = BeanRecorder::default();
    let method = Method::new("onMessage");

    h.container.deploy(audit_bean(&audit).build()).await.unwrap();
    h.container
        .deploy(BeanDeployment::builder("Billing", "org.example.BillingBean", billing.factory()).build())
        .await
        .unwrap();
    h.container.invoke(&audit_id(), &method, "a".into()).await.unwrap();
    h.container
        .invoke(&DeploymentId::from("Billing"), &method, "b".into())
        .await
        .unwrap();

    h.container.shutdown().await;

    assert!(h.container.deployment_ids().is_empty());
    assert_eq!(h.adapter.deactivations().len(), 2);
    assert_eq!(audit.destroyed(), 1);
    assert_eq!(billing.destroyed(), 1);
    assert_eq!(audit.lifecycle(), vec!["post_construct", "ejb_create", "pre_destroy"]);
}

// --- Bean services ---

#[tokio::test]
async fn test_interceptor_chain_order_and_lifecycle() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    let log = InterceptorLog::default();

    h.container
        .deploy(
            audit_bean(&recorder)
                .interceptor("Outer", RecordingInterceptor::factory("Outer", &log))
                .interceptor("Inner", RecordingInterceptor::factory("Inner", &log))
                .method_interceptors("onAudit", ["Inner"])
                .build(),
        )
        .await
        .unwrap();

    h.container
        .invoke(&audit_id(), &Method::new("onMessage"), "m".into())
        .await
        .unwrap();
    h.container
        .invoke(&audit_id(), &Method::new("onAudit"), "m".into())
        .await
        .unwrap();
    h.container.undeploy(&audit_id()).await.unwrap();

    assert_eq!(
        log.lock().unwrap().clone(),
        vec![
            "Outer:post_construct",
            "Inner:post_construct",
            "Outer:before",
            "Inner:before",
            "Inner:after",
            "Outer:after",
            "Outer:pre_destroy",
            "Inner:pre_destroy",
            "Outer:post_construct",
            "Inner:post_construct",
            "Inner:before",
            "Inner:after",
            "Outer:pre_destroy",
            "Inner:pre_destroy",
        ]
    );
}

#[tokio::test]
async fn test_injection_tolerates_missing_names() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();

    h.container
        .deploy(
            audit_bean(&recorder)
                .inject("java:comp/env/auditTopic", "topic")
                .inject("java:comp/env/missing", "optional")
                .build(),
        )
        .await
        .unwrap();
    h.container
        .invoke(&audit_id(), &Method::new("onMessage"), "m".into())
        .await
        .unwrap();

    assert_eq!(recorder.injected(), vec!["topic".to_string()]);
}

// --- Transactions ---

#[tokio::test]
async fn test_bean_managed_transaction_left_open_is_a_system_fault() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.container.deploy(audit_bean(&recorder).bean_managed().build()).await.unwrap();
    recorder.push(Outcome::LeaveTransactionOpen);

    let err = h
        .container
        .invoke(&audit_id(), &Method::new("onMessage"), "m".into())
        .await
        .unwrap_err();

    assert!(err.is_system());
    assert!(matches!(
        h.tm.events().as_slice(),
        [TxEvent::Begin(a), TxEvent::Rollback(b)] if a == b
    ));
    assert_eq!(h.tm.active_count(), 0);
    assert_eq!(h.container.instance_stats(&audit_id()).unwrap().live, 0);
}

#[tokio::test]
async fn test_bean_managed_bean_cannot_mark_container_rollback() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.container.deploy(audit_bean(&recorder).bean_managed().build()).await.unwrap();
    recorder.push(Outcome::MarkRollback);

    let err = h
        .container
        .invoke(&audit_id(), &Method::new("onMessage"), "m".into())
        .await
        .unwrap_err();

    assert_eq!(err.bean_exception().map(|e| e.type_name()), Some("IllegalStateException"));
    assert!(h.tm.events().is_empty());
}

#[tokio::test]
async fn test_requires_new_suspends_and_resumes_caller() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.container
        .deploy(audit_bean(&recorder).default_transaction(TransactionType::RequiresNew).build())
        .await
        .unwrap();

    let caller = h.tm.begin().unwrap();
    h.container
        .invoke_in_transaction(&audit_id(), Some(caller), &Method::new("onMessage"), "m".into())
        .await
        .unwrap();

    let events = h.tm.events();
    assert!(matches!(
        events.as_slice(),
        [
            TxEvent::Begin(a),
            TxEvent::Suspend(b),
            TxEvent::Begin(inner),
            TxEvent::Commit(c),
            TxEvent::Resume(d),
        ] if a == &caller && b == &caller && inner != &caller && c == inner && d == &caller
    ));
    assert_eq!(h.tm.status(caller), TransactionStatus::Active);
    h.tm.commit(caller).unwrap();
}

#[tokio::test]
async fn test_required_joins_caller_without_completing_it() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.container.deploy(audit_bean(&recorder).build()).await.unwrap();
    recorder.push(Outcome::MarkRollback);

    let caller = h.tm.begin().unwrap();
    h.container
        .invoke_in_transaction(&audit_id(), Some(caller), &Method::new("onMessage"), "m".into())
        .await
        .unwrap();

    assert_eq!(h.tm.status(caller), TransactionStatus::MarkedRollback);
    assert_eq!(h.tm.active_count(), 1);
    h.tm.rollback(caller).unwrap();
}

#[tokio::test]
async fn test_mandatory_without_caller_is_rejected() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.container
        .deploy(
            audit_bean(&recorder)
                .method_transaction("onMessage", TransactionType::Mandatory)
                .build(),
        )
        .await
        .unwrap();

    let err = h
        .container
        .invoke(&audit_id(), &Method::new("onMessage"), "m".into())
        .await
        .unwrap_err();

    assert!(matches!(err, MdbError::Transaction(TransactionError::TransactionRequired)));
    assert_eq!(recorder.delivered(), 0);
    assert_eq!(recorder.destroyed(), 1);
    assert_eq!(h.container.instance_stats(&audit_id()).unwrap().live, 0);
}

#[tokio::test]
async fn test_failed_begin_keeps_instance_pooled() {
    let h = harness(ContainerConfig::default());
    let recorder = BeanRecorder::default();
    h.container.deploy(audit_bean(&recorder).build()).await.unwrap();
    h.tm.fail_begin(true);
    let mut endpoint = h
        .container
        .endpoint_factory(&audit_id())
        .unwrap()
        .create_endpoint(None)
        .unwrap();

    let err = endpoint.before_delivery(&Method::new("onMessage")).await.unwrap_err();

    assert!(matches!(err, MdbError::ApplicationServerInternal { .. }));
    assert!(matches!(
        err.root_cause().downcast_ref::<TransactionError>(),
        Some(TransactionError::Manager(_))
    ));
    assert!(h.tm.events().is_empty());
    let stats = h.container.instance_stats(&audit_id()).unwrap();
    assert_eq!((stats.live, stats.idle), (1, 1));
}
